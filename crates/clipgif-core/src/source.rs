//! Where pixels come from.
//!
//! A [`PixelSource`] is anything with a timeline that can be seeked and
//! painted into an offscreen [`Surface`]. The sampler only talks to this
//! trait; [`TestPattern`] is a deterministic implementation used by the CLI
//! and the tests.

use clipgif_encoders::Frame;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Source pixels cannot be read back")]
    Tainted,

    #[error("Cannot seek to {time:.3}s, source is {duration:.3}s long")]
    Seek { time: f64, duration: f64 },

    #[error("Painting failed: {0}")]
    Paint(String),
}

pub trait PixelSource: Send {
    /// Natural size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Length of the timeline in seconds.
    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn set_paused(&mut self, paused: bool);

    fn seek(&mut self, time: f64) -> Result<(), SourceError>;

    /// Draws the picture at the current time, scaled to fill `surface`.
    fn paint(&self, surface: &mut Surface) -> Result<(), SourceError>;

    /// Whether painted pixels may be read back. Sources that cannot be read
    /// are still sampled, but only into synthetic frames.
    fn can_sample(&self) -> bool {
        true
    }
}

/// Offscreen RGBA raster that sources paint into.
#[derive(Debug, Clone)]
pub struct Surface {
    width:  u32,
    height: u32,
    data:   Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copies the current contents out as a frame.
    pub fn read_frame(
        &self,
        timestamp: f64,
        delay_ms: u32,
    ) -> Result<Frame, clipgif_encoders::Error> {
        Frame::new(self.width, self.height, self.data.clone(), timestamp, delay_ms)
    }
}

/// A moving test card: horizontal bars that scroll with time over a vertical
/// gradient, plus a checker in the corner. Every pixel is a pure function of
/// position and time, so two samples of the same instant are identical.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width:    u32,
    height:   u32,
    duration: f64,
    time:     f64,
    paused:   bool,
    readable: bool,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, duration: f64) -> Self {
        Self {
            width,
            height,
            duration,
            time: 0.0,
            paused: false,
            readable: true,
        }
    }

    /// A pattern whose pixels cannot be read back.
    #[must_use]
    pub fn tainted(mut self) -> Self {
        self.readable = false;
        self
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let shift = (self.time * 120.0) as u32;
        let band = (y + shift) / 8 % 2;
        let r = (x * 255 / self.width.max(1)) as u8;
        let g = (y * 255 / self.height.max(1)) as u8;
        let b = if band == 0 { 64 } else { 192 };

        let corner = self.width.min(self.height) / 4;
        if x < corner && y < corner && (x / 4 + y / 4) % 2 == 0 {
            return [255, 255, 255, 255];
        }
        [r, g, b, 255]
    }
}

impl PixelSource for TestPattern {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn seek(&mut self, time: f64) -> Result<(), SourceError> {
        if !(0.0..=self.duration).contains(&time) {
            return Err(SourceError::Seek {
                time,
                duration: self.duration,
            });
        }
        self.time = time;
        Ok(())
    }

    fn paint(&self, surface: &mut Surface) -> Result<(), SourceError> {
        if !self.readable {
            return Err(SourceError::Tainted);
        }

        let (w, h) = (surface.width(), surface.height());
        let (sw, sh) = (self.width.max(1), self.height.max(1));
        let pixels = surface.pixels_mut();
        for y in 0..h {
            let sy = (u64::from(y) * u64::from(sh) / u64::from(h)) as u32;
            for x in 0..w {
                let sx = (u64::from(x) * u64::from(sw) / u64::from(w)) as u32;
                let at = (y as usize * w as usize + x as usize) * 4;
                pixels[at..at + 4].copy_from_slice(&self.pixel(sx, sy));
            }
        }
        Ok(())
    }

    fn can_sample(&self) -> bool {
        self.readable
    }
}
