use std::sync::Arc;

use crate::error::Error;

/// Alpha values below this are written as the transparent palette entry.
pub const ALPHA_THRESHOLD: u8 = 128;

/// One RGBA bitmap sampled from the source.
///
/// The pixel buffer is shared and immutable; back-ends that need a different
/// size work on a resampled copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width:     u32,
    height:    u32,
    data:      Arc<[u8]>,
    timestamp: f64,
    delay_ms:  u32,
}

impl Frame {
    /// `data` must hold exactly `width * height` tightly packed RGBA pixels.
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: f64,
        delay_ms: u32,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::invalid(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::invalid(format!(
                "frame buffer holds {} bytes, {width}x{height} RGBA needs \
                 {expected}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data: data.into(),
            timestamp,
            delay_ms,
        })
    }

    /// A frame filled with a single color.
    pub fn solid(
        width: u32,
        height: u32,
        rgba: [u8; 4],
        timestamp: f64,
        delay_ms: u32,
    ) -> Result<Self, Error> {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, data, timestamp, delay_ms)
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Capture time in seconds, relative to the start of the source.
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// How long the frame stays on screen, in milliseconds.
    pub const fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn has_transparency(&self) -> bool {
        self.data
            .chunks_exact(4)
            .any(|px| px[3] < ALPHA_THRESHOLD)
    }

    /// Nearest-neighbour copy at a new size. The original is left untouched.
    pub fn resampled(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(height))
                as usize;
            let row = sy * self.width as usize * 4;
            for x in 0..width {
                let sx = (u64::from(x) * u64::from(self.width)
                    / u64::from(width)) as usize;
                let at = row + sx * 4;
                data.extend_from_slice(&self.data[at..at + 4]);
            }
        }

        Self {
            width,
            height,
            data: data.into(),
            timestamp: self.timestamp,
            delay_ms: self.delay_ms,
        }
    }
}

impl AsRef<Frame> for Frame {
    fn as_ref(&self) -> &Frame {
        self
    }
}
