use std::{borrow::Cow, sync::Arc};

use tracing::debug;

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
    low:    80,
    medium: 90,
    high:   100,
};

/// Upper bound on pixels fed to the palette learner.
const SAMPLE_BUDGET: usize = 1 << 18;

/// One shared palette learned from a pixel sample of the whole clip; every
/// frame is remapped against it and written as indexed data.
pub struct FastEncoder {
    state: BackendState,
}

impl FastEncoder {
    pub fn with_probe(probe: AvailabilityProbe) -> Self {
        Self {
            state: BackendState::new(Backend::Fast, probe),
        }
    }
}

impl Default for FastEncoder {
    fn default() -> Self {
        Self::with_probe(Arc::new(|| -> Result<(), String> { Ok(()) }))
    }
}

/// Maps quality 1..=100 onto NeuQuant's stride, 30 (coarse) down to 10.
fn sample_factor(quality: u8) -> i32 {
    10 + i32::from(100 - quality.min(100)) * 20 / 99
}

impl FrameEncoder for FastEncoder {
    fn backend(&self) -> Backend {
        Backend::Fast
    }

    fn supported_formats(&self) -> &'static [OutputFormat] {
        &[OutputFormat::Gif]
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics {
            speed:         Speed::Fast,
            quality:       VisualQuality::High,
            memory:        MemoryUsage::Moderate,
            compatibility: Compatibility::Standard,
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
        let mut session =
            EncodeSession::begin(Backend::Fast, frames, options, progress, abort)?;
        self.initialize()?;

        let frames = fit_frames(frames, options);
        let quality = options.quality.scaled(QUALITY_SCALE);
        let transparent = frames.iter().any(|f| f.has_transparency());

        session.report(Stage::Preparing, 5, "building shared palette");
        let sample = sample_pixels(&frames, SAMPLE_BUDGET);
        let mut palette = Palette::build(&sample, sample_factor(quality), transparent);
        drop(sample);
        debug!(
            "fast palette: {} colors from quality {}",
            palette.rgb().len() / 3,
            quality
        );
        session.checkpoint()?;

        let total = frames.len();
        let mut bytes = Vec::new();
        {
            let mut stream = open_stream(&mut bytes, options, palette.rgb())
                .map_err(|e| Error::backend(Backend::Fast, e))?;

            for (index, frame) in frames.iter().enumerate() {
                session.checkpoint()?;

                let indexed = gif::Frame {
                    width: options.width as u16,
                    height: options.height as u16,
                    delay: options.delay_cs(frame),
                    transparent: palette.transparent_index(),
                    dispose: if transparent {
                        gif::DisposalMethod::Background
                    } else {
                        gif::DisposalMethod::Keep
                    },
                    buffer: Cow::Owned(palette.remap(frame)),
                    ..gif::Frame::default()
                };
                stream
                    .write_frame(&indexed)
                    .map_err(|e| Error::backend(Backend::Fast, e))?;

                session.frame_encoded(index, total, 10, 90);
            }
        }

        Ok(session.finish(bytes, total, options))
    }
}
