use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Backend, OutputFormat};

/// Stable identifiers for every failure the pipeline can surface.
///
/// Callers match on these rather than on message text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InputValidation,
    EncoderUnavailable,
    EncodingInProgress,
    EncodingCancelled,
    BackendProcessing,
    FormatNotSupported,
    NoEncoderAvailable,
    RelayTimeout,
    RelayProtocol,
    BitstreamFormat,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Encoder {0} is not available: {1}")]
    EncoderUnavailable(Backend, String),

    #[error("Encoder {0} is already encoding")]
    EncodingInProgress(Backend),

    #[error("Encoding was cancelled")]
    EncodingCancelled,

    #[error("Encoder {backend} failed: {reason}")]
    BackendProcessing { backend: Backend, reason: String },

    #[error("Format {0} not yet supported")]
    FormatNotSupported(OutputFormat),

    #[error("No encoder available")]
    NoEncoderAvailable,
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InputValidation(_) => ErrorCode::InputValidation,
            Self::EncoderUnavailable(..) => ErrorCode::EncoderUnavailable,
            Self::EncodingInProgress(_) => ErrorCode::EncodingInProgress,
            Self::EncodingCancelled => ErrorCode::EncodingCancelled,
            Self::BackendProcessing { .. } => ErrorCode::BackendProcessing,
            Self::FormatNotSupported(_) => ErrorCode::FormatNotSupported,
            Self::NoEncoderAvailable => ErrorCode::NoEncoderAvailable,
        }
    }

    pub(crate) fn backend(backend: Backend, reason: impl Display) -> Self {
        Self::BackendProcessing {
            backend,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InputValidation(reason.into())
    }
}
