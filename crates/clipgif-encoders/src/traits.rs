use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    frame::Frame,
    options::{EncodingOptions, OutputFormat},
    progress::{AbortSignal, EncodingProgress},
    result::EncodingResult,
    Backend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Slow,
    Moderate,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualQuality {
    Good,
    High,
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryUsage {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    Limited,
    Standard,
    Broad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristics {
    pub speed:         Speed,
    pub quality:       VisualQuality,
    pub memory:        MemoryUsage,
    pub compatibility: Compatibility,
}

/// A strategy turning a frame sequence into an animated bitstream.
///
/// Instances are shared between jobs but only run one `encode` at a time; a
/// concurrent call fails with [`Error::EncodingInProgress`] instead of
/// waiting.
pub trait FrameEncoder: Send + Sync {
    fn backend(&self) -> Backend;

    fn name(&self) -> &'static str {
        self.backend().into()
    }

    fn supported_formats(&self) -> &'static [OutputFormat];

    fn characteristics(&self) -> Characteristics;

    /// Capability check. `Err` carries the reason the back-end cannot run.
    fn probe(&self) -> Result<(), String>;

    fn is_available(&self) -> bool {
        self.probe().is_ok()
    }

    /// Idempotent. Fails with [`Error::EncoderUnavailable`] when the probe
    /// does.
    fn initialize(&self) -> Result<(), Error>;

    fn encode(
        &self,
        frames: &[Frame],
        options: &EncodingOptions,
        progress: Option<&mut dyn FnMut(&EncodingProgress)>,
        abort: Option<&AbortSignal>,
    ) -> Result<EncodingResult, Error>;
}
