use std::{fmt::Display, thread};

use clipgif_encoders::{AbortSignal, Error as EncoderError, Frame, Quality};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::source::{PixelSource, SourceError, Surface};

pub const MAX_FRAME_RATE: u32 = 60;

/// Why a frame sequence holds synthetic pixels instead of sampled ones.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Degradation {
    /// The source could not be read directly.
    SamplingUnavailable,
    /// The relay failed or timed out.
    RelayDegraded,
}

impl Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(<&'static str>::from(self))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    /// Window start, in seconds.
    pub start:      f64,
    /// Window end (exclusive), in seconds.
    pub end:        f64,
    pub frame_rate: u32,
    pub quality:    Quality,
    /// Explicit output size. The quality factor only applies without one.
    pub target:     Option<(u32, u32)>,
    pub max_width:  Option<u32>,
    pub max_height: Option<u32>,
}

impl SampleRequest {
    pub fn new(start: f64, end: f64, frame_rate: u32) -> Self {
        Self {
            start,
            end,
            frame_rate,
            quality: Quality::default(),
            target: None,
            max_width: None,
            max_height: None,
        }
    }

    pub fn validate(&self) -> Result<(), EncoderError> {
        if !self.start.is_finite() || !self.end.is_finite() || self.start < 0.0 {
            return Err(EncoderError::InputValidation(format!(
                "invalid time window [{}, {})",
                self.start, self.end
            )));
        }
        if self.end < self.start {
            return Err(EncoderError::InputValidation(format!(
                "window ends before it starts: [{}, {})",
                self.start, self.end
            )));
        }
        if !(1..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(EncoderError::InputValidation(format!(
                "frame rate must be within 1..={MAX_FRAME_RATE}, got {}",
                self.frame_rate
            )));
        }
        if matches!(self.target, Some((0, _) | (_, 0))) {
            return Err(EncoderError::InputValidation(
                "target dimensions must be positive".to_owned(),
            ));
        }
        for (name, limit) in [("max width", self.max_width), ("max height", self.max_height)] {
            if let Some(limit @ 0..=1) = limit {
                return Err(EncoderError::InputValidation(format!(
                    "{name} must be at least 2, got {limit}"
                )));
            }
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        frame_count(self.start, self.end, self.frame_rate)
    }

    pub fn dimensions(&self, source: (u32, u32)) -> (u32, u32) {
        compute_dimensions(
            self.target.unwrap_or(source),
            if self.target.is_some() {
                1.0
            } else {
                self.quality.scale_factor()
            },
            self.max_width,
            self.max_height,
        )
    }

    /// Display time of one frame, in milliseconds.
    pub fn frame_delay_ms(&self) -> u32 {
        (1000.0 / f64::from(self.frame_rate.max(1))).round() as u32
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.start + index as f64 / f64::from(self.frame_rate.max(1))
    }
}

/// `ceil((end - start) * frame_rate)`, tolerant of float noise so that a
/// window of exactly N frames does not round up to N + 1.
pub fn frame_count(start: f64, end: f64, frame_rate: u32) -> usize {
    let span = (end - start).max(0.0) * f64::from(frame_rate);
    (span - 1e-6).ceil().max(0.0) as usize
}

/// Scales `base` by `factor`, clamps to the maxima keeping aspect ratio, and
/// rounds both sides down to an even number of at least 2.
pub fn compute_dimensions(
    base: (u32, u32),
    factor: f64,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    let mut w = f64::from(base.0.max(1)) * factor;
    let mut h = f64::from(base.1.max(1)) * factor;

    if let Some(max) = max_width.filter(|&m| f64::from(m) < w) {
        h *= f64::from(max) / w;
        w = f64::from(max);
    }
    if let Some(max) = max_height.filter(|&m| f64::from(m) < h) {
        w *= f64::from(max) / h;
        h = f64::from(max);
    }

    let even = |v: f64| ((v.round() as u32) & !1).max(2);
    (even(w), even(h))
}

/// Deterministic stand-in frames with the same count, size and timing as a
/// real capture would have had.
pub fn synthetic_frames(
    count: usize,
    width: u32,
    height: u32,
    start: f64,
    frame_rate: u32,
) -> Result<Vec<Frame>, EncoderError> {
    let frame_rate = frame_rate.max(1);
    let delay_ms = (1000.0 / f64::from(frame_rate)).round() as u32;

    (0..count)
        .map(|i| {
            let phase = (i * 255 / count.max(1)) as u8;
            let mut data = Vec::with_capacity(width as usize * height as usize * 4);
            for y in 0..height {
                for x in 0..width {
                    data.extend_from_slice(&[
                        (x * 255 / width.max(1)) as u8,
                        (y * 255 / height.max(1)) as u8,
                        phase,
                        255,
                    ]);
                }
            }
            Frame::new(
                width,
                height,
                data,
                start + i as f64 / f64::from(frame_rate),
                delay_ms,
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrames {
    pub frames:      Vec<Frame>,
    pub width:       u32,
    pub height:      u32,
    pub frame_rate:  u32,
    pub degradation: Option<Degradation>,
}

impl SampledFrames {
    pub(crate) fn synthetic(
        count: usize,
        width: u32,
        height: u32,
        start: f64,
        frame_rate: u32,
        degradation: Degradation,
    ) -> Result<Self, EncoderError> {
        Ok(Self {
            frames: synthetic_frames(count, width, height, start, frame_rate)?,
            width,
            height,
            frame_rate,
            degradation: Some(degradation),
        })
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / f64::from(self.frame_rate.max(1))
    }
}

/// Puts the source back where it was, whatever happens while sampling.
struct PlaybackGuard<'a> {
    source: &'a mut dyn PixelSource,
    time:   f64,
    paused: bool,
}

impl<'a> PlaybackGuard<'a> {
    fn new(source: &'a mut dyn PixelSource) -> Self {
        let time = source.current_time();
        let paused = source.is_paused();
        source.set_paused(true);
        Self {
            source,
            time,
            paused,
        }
    }
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.source.seek(self.time) {
            debug!("could not restore playback position: {e}");
        }
        self.source.set_paused(self.paused);
    }
}

enum CaptureError {
    Source(SourceError),
    Encoder(EncoderError),
}

/// Extracts a time window of a [`PixelSource`] as RGBA frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    yield_every: usize,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FrameSampler {
    pub fn new(yield_every: usize) -> Self {
        Self {
            yield_every: yield_every.max(1),
        }
    }

    /// Samples `request` from `source`.
    ///
    /// `progress` receives `(captured, total)` after every frame. If the
    /// source cannot be read, synthetic frames of the same count and size
    /// are returned instead, tagged with [`Degradation::SamplingUnavailable`].
    /// Errors are limited to invalid requests and cancellation.
    #[tracing::instrument(skip_all, fields(start = request.start, end = request.end))]
    pub fn sample(
        &self,
        source: &mut dyn PixelSource,
        request: &SampleRequest,
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
        abort: Option<&AbortSignal>,
    ) -> Result<SampledFrames, EncoderError> {
        request.validate()?;
        if abort.is_some_and(AbortSignal::is_aborted) {
            return Err(EncoderError::EncodingCancelled);
        }

        let count = request.frame_count();
        let (width, height) = request.dimensions(source.dimensions());
        debug!("sampling {count} frames at {width}x{height}");

        if count == 0 {
            return Ok(SampledFrames {
                frames: Vec::new(),
                width,
                height,
                frame_rate: request.frame_rate,
                degradation: None,
            });
        }

        if !source.can_sample() {
            warn!("source pixels cannot be read, using synthetic frames");
            return SampledFrames::synthetic(
                count,
                width,
                height,
                request.start,
                request.frame_rate,
                Degradation::SamplingUnavailable,
            );
        }

        let captured = {
            let guard = PlaybackGuard::new(source);
            self.capture(
                &mut *guard.source,
                request,
                count,
                (width, height),
                &mut progress,
                abort,
            )
        };

        match captured {
            Ok(frames) => Ok(SampledFrames {
                frames,
                width,
                height,
                frame_rate: request.frame_rate,
                degradation: None,
            }),
            Err(CaptureError::Encoder(e)) => Err(e),
            Err(CaptureError::Source(e)) => {
                warn!("sampling failed ({e}), using synthetic frames");
                SampledFrames::synthetic(
                    count,
                    width,
                    height,
                    request.start,
                    request.frame_rate,
                    Degradation::SamplingUnavailable,
                )
            },
        }
    }

    fn capture(
        &self,
        source: &mut dyn PixelSource,
        request: &SampleRequest,
        count: usize,
        (width, height): (u32, u32),
        progress: &mut Option<&mut dyn FnMut(usize, usize)>,
        abort: Option<&AbortSignal>,
    ) -> Result<Vec<Frame>, CaptureError> {
        let duration = source.duration();
        let delay_ms = request.frame_delay_ms();
        let mut surface = Surface::new(width, height);
        let mut frames = Vec::with_capacity(count);

        for index in 0..count {
            if abort.is_some_and(AbortSignal::is_aborted) {
                return Err(CaptureError::Encoder(EncoderError::EncodingCancelled));
            }

            let timestamp = request.timestamp(index);
            source
                .seek(timestamp.min(duration))
                .map_err(CaptureError::Source)?;
            source.paint(&mut surface).map_err(CaptureError::Source)?;
            frames.push(
                surface
                    .read_frame(timestamp, delay_ms)
                    .map_err(CaptureError::Encoder)?,
            );

            if let Some(progress) = progress.as_mut() {
                progress(index + 1, count);
            }
            if (index + 1) % self.yield_every == 0 {
                thread::yield_now();
            }
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests;
