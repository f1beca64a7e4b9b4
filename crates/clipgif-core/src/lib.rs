//! Frame sampling, relay, encoder selection and job orchestration for
//! clipgif.
//!
//! The flow for one clip is: a [`PixelSource`] (or a [`FrameRelay`]) yields
//! frames, the [`EncoderRegistry`] resolves a back-end under a
//! [`SelectionPolicy`], the back-end encodes while streaming progress, and the
//! output is checked with the bitstream reader.

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod sampler;
pub mod settings;
pub mod source;

pub use clipgif_bitstream::{read_metadata, BitstreamMetadata};
pub use clipgif_encoders::{
    AbortSignal,
    Backend,
    EncodingOptions,
    EncodingProgress,
    EncodingResult,
    ErrorCode,
    Frame,
    OutputFormat,
    Quality,
    Stage,
};

pub use crate::{
    error::Error,
    pipeline::{Capture, ClipOutput, ClipRequest, ClipTask, Pipeline, PipelineEvent},
    registry::{
        BenchmarkResult,
        DefaultProvider,
        EncoderDescriptor,
        EncoderProvider,
        EncoderRegistry,
        Preference,
        Selection,
        SelectionPolicy,
        SelectionReason,
    },
    relay::{FrameRelay, RelayRequest, RelayResponse, RelayTransport, ThreadTransport},
    sampler::{Degradation, FrameSampler, SampleRequest, SampledFrames},
    settings::{PipelineSettings, DEFAULT_PRIORITY},
    source::{PixelSource, SourceError, Surface, TestPattern},
};
