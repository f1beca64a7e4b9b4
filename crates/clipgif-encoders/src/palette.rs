use color_quant::NeuQuant;

use crate::frame::{Frame, ALPHA_THRESHOLD};

const CACHE_EMPTY: u16 = u16::MAX;
const CACHE_SIZE: usize = 1 << 15;

/// A reduced color table built by NeuQuant, with an optional slot reserved
/// for transparent pixels.
pub(crate) struct Palette {
    quant:       NeuQuant,
    rgb:         Vec<u8>,
    transparent: Option<u8>,
    // 5 bits per channel -> palette index
    cache:       Vec<u16>,
}

impl Palette {
    /// `sample` is opaque RGBA; `sample_factor` is NeuQuant's 1 (exhaustive)
    /// to 30 (sparse) learning stride.
    pub(crate) fn build(sample: &[u8], sample_factor: i32, transparent: bool) -> Self {
        let colors = if transparent { 255 } else { 256 };
        let quant = NeuQuant::new(sample_factor.clamp(1, 30), colors, sample);
        let mut rgb = quant.color_map_rgb();
        let transparent = transparent.then(|| {
            let index = (rgb.len() / 3) as u8;
            rgb.extend_from_slice(&[0, 0, 0]);
            index
        });

        Self {
            quant,
            rgb,
            transparent,
            cache: vec![CACHE_EMPTY; CACHE_SIZE],
        }
    }

    pub(crate) fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    pub(crate) const fn transparent_index(&self) -> Option<u8> {
        self.transparent
    }

    fn exact_index(&self, r: u8, g: u8, b: u8) -> u8 {
        self.quant.index_of(&[r, g, b, 255]) as u8
    }

    fn cached_index(&mut self, r: u8, g: u8, b: u8) -> u8 {
        let key = (usize::from(r >> 3) << 10)
            | (usize::from(g >> 3) << 5)
            | usize::from(b >> 3);
        let hit = self.cache[key];
        if hit != CACHE_EMPTY {
            return hit as u8;
        }
        let index = self.exact_index(r, g, b);
        self.cache[key] = u16::from(index);
        index
    }

    /// Maps each pixel to its nearest palette entry through a coarse lookup
    /// cache.
    pub(crate) fn remap(&mut self, frame: &Frame) -> Vec<u8> {
        let mut indices = Vec::with_capacity(frame.pixel_count());
        for px in frame.data().chunks_exact(4) {
            let index = match self.transparent {
                Some(t) if px[3] < ALPHA_THRESHOLD => t,
                _ => self.cached_index(px[0], px[1], px[2]),
            };
            indices.push(index);
        }
        indices
    }

    /// Floyd-Steinberg error diffusion against the exact palette.
    pub(crate) fn remap_dithered(&self, frame: &Frame) -> Vec<u8> {
        let width = frame.width() as usize;
        let mut indices = Vec::with_capacity(frame.pixel_count());
        // one column of padding on each side
        let mut current = vec![[0f32; 3]; width + 2];
        let mut next = vec![[0f32; 3]; width + 2];

        for row in frame.data().chunks_exact(width * 4) {
            for (x, px) in row.chunks_exact(4).enumerate() {
                if let Some(t) = self.transparent.filter(|_| px[3] < ALPHA_THRESHOLD)
                {
                    indices.push(t);
                    continue;
                }

                let err = current[x + 1];
                let want = [
                    (f32::from(px[0]) + err[0]).clamp(0.0, 255.0),
                    (f32::from(px[1]) + err[1]).clamp(0.0, 255.0),
                    (f32::from(px[2]) + err[2]).clamp(0.0, 255.0),
                ];
                let index =
                    self.exact_index(want[0] as u8, want[1] as u8, want[2] as u8);
                indices.push(index);

                let at = usize::from(index) * 3;
                for c in 0..3 {
                    let diff = want[c] - f32::from(self.rgb[at + c]);
                    current[x + 2][c] += diff * 7.0 / 16.0;
                    next[x][c] += diff * 3.0 / 16.0;
                    next[x + 1][c] += diff * 5.0 / 16.0;
                    next[x + 2][c] += diff / 16.0;
                }
            }
            std::mem::swap(&mut current, &mut next);
            next.iter_mut().for_each(|e| *e = [0.0; 3]);
        }

        indices
    }
}

/// Collects opaque pixels across `frames` with a stride chosen so that at
/// most `budget` pixels are kept. Alpha is forced to 255.
pub(crate) fn sample_pixels<F: AsRef<Frame>>(frames: &[F], budget: usize) -> Vec<u8> {
    let total: usize = frames.iter().map(|f| f.as_ref().pixel_count()).sum();
    let stride = (total / budget.max(1)).max(1);

    let mut sample = Vec::with_capacity((total / stride + 1) * 4);
    let mut position = 0usize;
    for frame in frames {
        for px in frame.as_ref().data().chunks_exact(4) {
            if position % stride == 0 && px[3] >= ALPHA_THRESHOLD {
                sample.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            position += 1;
        }
    }

    if sample.is_empty() {
        sample.extend_from_slice(&[0, 0, 0, 255]);
    }
    sample
}
