use clipgif_bitstream::BitstreamError;
use clipgif_encoders::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Encoder(#[from] clipgif_encoders::Error),

    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    /// The encoder reported success but its output does not describe the
    /// frames it was given.
    #[error(
        "Output does not match the encoded clip: expected {expected} frames at \
         {width}x{height}, found {found_frames} at {found_width}x{found_height}"
    )]
    OutputMismatch {
        expected:     usize,
        width:        u32,
        height:       u32,
        found_frames: usize,
        found_width:  u32,
        found_height: u32,
    },

    #[error("Cannot start pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Pipeline task panicked")]
    TaskPanicked,
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Encoder(e) => e.code(),
            Self::Bitstream(_) | Self::OutputMismatch { .. } => ErrorCode::BitstreamFormat,
            Self::Spawn(_) | Self::TaskPanicked => ErrorCode::BackendProcessing,
        }
    }
}
