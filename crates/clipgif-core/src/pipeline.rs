//! End-to-end orchestration: sample, select, encode, validate.
//!
//! [`Pipeline::run`] drives one job on the calling thread. [`Pipeline::spawn`]
//! moves the same job onto its own thread and hands back a [`ClipTask`] with a
//! bounded event stream and a cancel switch.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use clipgif_bitstream::{read_metadata, BitstreamMetadata};
use clipgif_encoders::{
    AbortSignal,
    Backend,
    EncodingOptions,
    EncodingProgress,
    EncodingResult,
    Error as EncoderError,
    OutputFormat,
    Quality,
};
use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    registry::{EncoderRegistry, Preference, SelectionPolicy, SelectionReason},
    relay::FrameRelay,
    sampler::{compute_dimensions, Degradation, FrameSampler, SampleRequest, SampledFrames},
    settings::PipelineSettings,
    source::PixelSource,
};

/// Events buffered between a spawned job and its consumer.
const EVENT_CAPACITY: usize = 64;

/// Everything a caller decides about one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub start:      f64,
    pub end:        f64,
    pub frame_rate: u32,
    pub quality:    Quality,
    pub target:     Option<(u32, u32)>,
    pub max_width:  Option<u32>,
    pub max_height: Option<u32>,
    pub looping:    bool,
    pub encoder:    Preference,
    pub fallback:   Option<Backend>,
    pub format:     OutputFormat,
}

impl ClipRequest {
    pub fn new(start: f64, end: f64, frame_rate: u32) -> Self {
        Self {
            start,
            end,
            frame_rate,
            quality: Quality::default(),
            target: None,
            max_width: None,
            max_height: None,
            looping: true,
            encoder: Preference::Auto,
            fallback: None,
            format: OutputFormat::Gif,
        }
    }

    /// Request limits win over the pipeline-wide ones.
    fn sample_request(&self, settings: &PipelineSettings) -> SampleRequest {
        SampleRequest {
            start:      self.start,
            end:        self.end,
            frame_rate: self.frame_rate,
            quality:    self.quality,
            target:     self.target,
            max_width:  self.max_width.or(settings.max_width),
            max_height: self.max_height.or(settings.max_height),
        }
    }

    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            primary:  self.encoder,
            fallback: self.fallback,
            format:   self.format,
        }
    }
}

/// How frames reach the pipeline.
pub enum Capture {
    /// Sample a source owned by this process.
    Direct(Box<dyn PixelSource>),
    /// Ask a relay. The request must carry explicit target dimensions.
    Relay(FrameRelay),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Sampling {
        captured: usize,
        total:    usize,
    },
    Sampled {
        frames:      usize,
        width:       u32,
        height:      u32,
        degradation: Option<Degradation>,
    },
    Selected {
        backend: Backend,
        reason:  SelectionReason,
    },
    Encoding(EncodingProgress),
    Validated(BitstreamMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipOutput {
    pub result:      EncodingResult,
    pub reason:      SelectionReason,
    pub degradation: Option<Degradation>,
    /// Present when output validation is enabled.
    pub validation:  Option<BitstreamMetadata>,
}

#[derive(Clone)]
pub struct Pipeline {
    settings: PipelineSettings,
    registry: Arc<EncoderRegistry>,
    sampler:  FrameSampler,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        let registry = Arc::new(EncoderRegistry::new(settings.priority.clone()));
        Self::with_registry(settings, registry)
    }

    pub fn with_registry(settings: PipelineSettings, registry: Arc<EncoderRegistry>) -> Self {
        Self {
            sampler: FrameSampler::new(settings.yield_every),
            settings,
            registry,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<EncoderRegistry> {
        &self.registry
    }

    /// Runs one job to completion on the calling thread.
    ///
    /// Sampling finishes before encoding starts. Frames are dropped once the
    /// encoder returns.
    #[tracing::instrument(skip_all, fields(start = request.start, end = request.end))]
    pub fn run(
        &self,
        capture: &mut Capture,
        request: &ClipRequest,
        events: &mut dyn FnMut(PipelineEvent),
        abort: Option<&AbortSignal>,
    ) -> Result<ClipOutput, Error> {
        if abort.is_some_and(AbortSignal::is_aborted) {
            return Err(EncoderError::EncodingCancelled.into());
        }

        let sampled = self.capture(capture, request, events, abort)?;
        events(PipelineEvent::Sampled {
            frames:      sampled.frames.len(),
            width:       sampled.width,
            height:      sampled.height,
            degradation: sampled.degradation,
        });
        if abort.is_some_and(AbortSignal::is_aborted) {
            return Err(EncoderError::EncodingCancelled.into());
        }

        let selection = self.registry.select(&request.policy())?;
        events(PipelineEvent::Selected {
            backend: selection.backend,
            reason:  selection.reason,
        });

        let options = EncodingOptions {
            width:      sampled.width,
            height:     sampled.height,
            frame_rate: sampled.frame_rate,
            quality:    request.quality,
            looping:    request.looping,
            format:     request.format,
        };
        let result = selection.encoder.encode(
            &sampled.frames,
            &options,
            Some(&mut |p: &EncodingProgress| events(PipelineEvent::Encoding(p.clone()))),
            abort,
        )?;
        let degradation = sampled.degradation;
        drop(sampled);

        let validation = if self.settings.validate_output {
            let meta = validate(&result)?;
            events(PipelineEvent::Validated(meta.clone()));
            Some(meta)
        } else {
            None
        };

        info!(
            "clip done: {} frames, {} bytes via {}",
            result.metadata.frame_count, result.metadata.file_size, selection.backend
        );
        Ok(ClipOutput {
            result,
            reason: selection.reason,
            degradation,
            validation,
        })
    }

    fn capture(
        &self,
        capture: &mut Capture,
        request: &ClipRequest,
        events: &mut dyn FnMut(PipelineEvent),
        abort: Option<&AbortSignal>,
    ) -> Result<SampledFrames, EncoderError> {
        let sample = request.sample_request(&self.settings);
        match capture {
            Capture::Direct(source) => self.sampler.sample(
                source.as_mut(),
                &sample,
                Some(&mut |captured: usize, total: usize| {
                    events(PipelineEvent::Sampling { captured, total })
                }),
                abort,
            ),
            Capture::Relay(relay) => {
                let target = sample.target.ok_or_else(|| {
                    EncoderError::InputValidation(
                        "relay capture needs explicit target dimensions".to_owned(),
                    )
                })?;
                let (width, height) =
                    compute_dimensions(target, 1.0, sample.max_width, sample.max_height);
                relay.request_frames(sample.start, sample.end, sample.frame_rate, width, height)
            },
        }
    }

    /// Runs the job on its own thread.
    pub fn spawn(&self, mut capture: Capture, request: ClipRequest) -> Result<ClipTask, Error> {
        let (tx, events) = bounded(EVENT_CAPACITY);
        let abort = AbortSignal::new();
        let pipeline = self.clone();
        let signal = abort.clone();

        let handle = thread::Builder::new()
            .name("clipgif-pipeline".into())
            .spawn(move || {
                let mut forward = |event: PipelineEvent| {
                    if tx.send(event).is_err() {
                        debug!("event consumer gone");
                    }
                };
                pipeline.run(&mut capture, &request, &mut forward, Some(&signal))
            })?;

        Ok(ClipTask {
            events,
            abort,
            handle,
        })
    }
}

/// Parses the encoder's output and checks it describes what was encoded.
fn validate(result: &EncodingResult) -> Result<BitstreamMetadata, Error> {
    let meta = read_metadata(&result.bytes)?;
    let expected = &result.metadata;
    if meta.frame_count != expected.frame_count
        || !meta.resolution_matches(expected.width, expected.height, 0)
    {
        warn!("encoder output failed validation: {meta:?}");
        return Err(Error::OutputMismatch {
            expected:     expected.frame_count,
            width:        expected.width,
            height:       expected.height,
            found_frames: meta.frame_count,
            found_width:  meta.width,
            found_height: meta.height,
        });
    }
    if !meta.file_size_plausible() {
        warn!("unusual file size {} for {} frames", meta.file_size, meta.frame_count);
    }
    Ok(meta)
}

/// A job running on its own thread.
///
/// Events must be drained (or the task waited on) for the job to make
/// progress once the event buffer is full.
pub struct ClipTask {
    events: Receiver<PipelineEvent>,
    abort:  AbortSignal,
    handle: JoinHandle<Result<ClipOutput, Error>>,
}

impl ClipTask {
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Asks the job to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the job ends. Undelivered events are discarded.
    pub fn wait(self) -> Result<ClipOutput, Error> {
        drop(self.events);
        self.handle.join().map_err(|_| Error::TaskPanicked)?
    }
}
