//! Structural reader for animated GIF output.
//!
//! Nothing here decodes pixels. The reader walks the block structure of an
//! encoded stream and reports what a player would see: logical screen size,
//! frame count, total display time and whether transparency is used. It is
//! used as an acceptance oracle for the encoders and for diagnostics.

mod checks;
mod reader;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use reader::read_metadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitstreamError {
    /// The first six bytes are neither `GIF87a` nor `GIF89a`.
    #[error("Not a GIF bitstream, signature was {0:?}")]
    Signature(String),
}

/// Everything the reader could recover from a stream.
///
/// A truncated stream still yields metadata for the part that was read;
/// `complete` tells whether the trailer was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitstreamMetadata {
    pub width:            u32,
    pub height:           u32,
    pub frame_count:      usize,
    /// Sum of all frame delays, in seconds.
    pub duration:         f64,
    /// `frame_count / duration`, or 0 when either is zero.
    pub fps:              f64,
    pub file_size:        usize,
    pub has_transparency: bool,
    /// A NETSCAPE2.0 application extension was present.
    pub looping:          bool,
    pub complete:         bool,
}

#[cfg(test)]
mod tests;
