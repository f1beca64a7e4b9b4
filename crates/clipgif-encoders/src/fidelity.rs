use std::{borrow::Cow, sync::Arc};

use sysinfo::System;
use tracing::{debug, warn};

use crate::{
    error::Error,
    frame::Frame,
    options::{EncodingOptions, OutputFormat, QualityScale},
    palette::{sample_pixels, Palette},
    progress::{AbortSignal, EncodingProgress, Stage},
    result::EncodingResult,
    session::{fit_frames, open_stream, AvailabilityProbe, BackendState, EncodeSession},
    traits::{
        Characteristics,
        Compatibility,
        FrameEncoder,
        MemoryUsage,
        Speed,
        VisualQuality,
    },
    Backend,
};

const QUALITY_SCALE: QualityScale = QualityScale {
    low:    90,
    medium: 95,
    high:   100,
};

/// Free memory required before the whole-sequence quantizer is offered.
const MIN_AVAILABLE_MEMORY: u64 = 256 * 1024 * 1024;

/// Learns one palette from every pixel of every frame, then dithers each
/// frame against it. Colors stay consistent across the clip at the cost of
/// time and memory; meant for short, small outputs.
pub struct FidelityEncoder {
    state: BackendState,
}

impl FidelityEncoder {
    pub fn with_probe(probe: AvailabilityProbe) -> Self {
        Self {
            state: BackendState::new(Backend::Fidelity, probe),
        }
    }
}

impl Default for FidelityEncoder {
    fn default() -> Self {
        Self::with_probe(Arc::new(memory_probe))
    }
}

fn memory_probe() -> Result<(), String> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return Ok(());
    }
    let mut system = System::new();
    system.refresh_memory();
    let available = system.available_memory();
    if available < MIN_AVAILABLE_MEMORY {
        return Err(format!(
            "only {} MiB of memory available",
            available / (1024 * 1024)
        ));
    }
    Ok(())
}

/// Quantizes and compresses the whole clip in one call.
///
/// This cannot be interrupted: a cancellation raised while it runs is only
/// seen once it returns.
fn compress_sequence<F: AsRef<Frame>>(
    frames: &[F],
    options: &EncodingOptions,
    quality: u8,
) -> Result<Vec<u8>, gif::EncodingError> {
    let transparent = frames.iter().any(|f| f.as_ref().has_transparency());
    let sample_factor = if quality >= 95 { 1 } else { 3 };

    let palette = {
        let everything = sample_pixels(frames, usize::MAX);
        Palette::build(&everything, sample_factor, transparent)
    };

    let mut bytes = Vec::new();
    {
        let mut stream = open_stream(&mut bytes, options, palette.rgb())?;
        for frame in frames {
            let frame = frame.as_ref();
            stream.write_frame(&gif::Frame {
                width: options.width as u16,
                height: options.height as u16,
                delay: options.delay_cs(frame),
                transparent: palette.transparent_index(),
                dispose: if transparent {
                    gif::DisposalMethod::Background
                } else {
                    gif::DisposalMethod::Keep
                },
                buffer: Cow::Owned(palette.remap_dithered(frame)),
                ..gif::Frame::default()
            })?;
        }
    }
    Ok(bytes)
}

impl FrameEncoder for FidelityEncoder {
    fn backend(&self) -> Backend {
        Backend::Fidelity
    }

    fn supported_formats(&self) -> &'static [OutputFormat] {
        &[OutputFormat::Gif]
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics {
            speed:         Speed::Slow,
            quality:       VisualQuality::Best,
            memory:        MemoryUsage::High,
            compatibility: Compatibility::Limited,
        }
    }

    fn probe(&self) -> Result<(), String> {
        self.state.probe()
    }

    fn initialize(&self) -> Result<(), Error> {
        self.state.initialize()
    }

    #[tracing::instrument(skip_all, fields(frames = frames.len()))]
    fn encode(
        &self,
        frames: &[Frame],
        options: &EncodingOptions,
        progress: Option<&mut dyn FnMut(&EncodingProgress)>,
        abort: Option<&AbortSignal>,
    ) -> Result<EncodingResult, Error> {
        let _busy = self.state.acquire()?;
        let mut session = EncodeSession::begin(
            Backend::Fidelity,
            frames,
            options,
            progress,
            abort,
        )?;
        self.initialize()?;

        let frames = fit_frames(frames, options);
        let quality = options.quality.scaled(QUALITY_SCALE);
        let total = frames.len();
        if total * frames[0].pixel_count() > 10_000_000 {
            warn!(
                "high-fidelity encode of {} frames at {}x{} will be slow",
                total, options.width, options.height
            );
        }

        session.checkpoint()?;
        session.report(Stage::Encoding, 10, "quantizing the full sequence");
        let bytes = compress_sequence(&frames, options, quality)
            .map_err(|e| Error::backend(Backend::Fidelity, e))?;
        debug!("fidelity stream assembled: {} bytes", bytes.len());

        // a cancellation raised during compression lands here
        session.checkpoint()?;
        session.frame_encoded(total - 1, total, 10, 90);

        Ok(session.finish(bytes, total, options))
    }
}
