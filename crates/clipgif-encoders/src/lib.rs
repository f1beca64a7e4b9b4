// crates/clipgif-encoders/src/lib.rs
pub mod error;
pub mod frame;
pub mod options;
pub mod progress;
pub mod result;
pub mod traits;

mod fast;
mod fidelity;
mod palette;
mod session;
mod worker;

use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

pub use error::{Error, ErrorCode};
pub use fast::FastEncoder;
pub use fidelity::FidelityEncoder;
pub use frame::Frame;
pub use options::{EncodingOptions, OutputFormat, Quality, QualityScale};
pub use progress::{AbortSignal, EncodingProgress, Stage};
pub use result::{EncodingMetadata, EncodingResult, PerformanceReport};
pub use session::{AvailabilityProbe, SLOW_ENCODE_THRESHOLD};
pub use traits::{
    Characteristics,
    Compatibility,
    FrameEncoder,
    MemoryUsage,
    Speed,
    VisualQuality,
};
pub use worker::WorkerEncoder;

/// The closed set of encoding back-ends.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shared palette, indexed frames, in-process.
    Fast,
    /// Per-frame palette and compression on an isolated worker thread.
    Worker,
    /// Whole-sequence quantization with error diffusion.
    Fidelity,
}

impl Backend {
    pub const ALL: [Self; 3] = [Self::Fast, Self::Worker, Self::Fidelity];

    pub fn instantiate(self) -> Arc<dyn FrameEncoder> {
        match self {
            Self::Fast => Arc::new(FastEncoder::default()),
            Self::Worker => Arc::new(WorkerEncoder::default()),
            Self::Fidelity => Arc::new(FidelityEncoder::default()),
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(<&'static str>::from(self))
    }
}
