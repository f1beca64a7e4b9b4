//! Sampling on the far side of a process or thread boundary.
//!
//! The orchestrator sends one [`RelayRequest`] and waits a bounded time for a
//! [`RelayResponse`]. Whatever goes wrong on the way (timeouts, a responder
//! that hangs up, malformed frames) is absorbed here and turned into
//! synthetic frames, so callers only ever see input validation errors.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clipgif_encoders::{Error as EncoderError, ErrorCode, Frame, Quality};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    sampler::{
        compute_dimensions,
        frame_count,
        Degradation,
        FrameSampler,
        SampleRequest,
        SampledFrames,
        MAX_FRAME_RATE,
    },
    settings::PipelineSettings,
    source::PixelSource,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub id:         u64,
    pub start:      f64,
    pub end:        f64,
    pub frame_rate: u32,
    pub width:      u32,
    pub height:     u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub width:     u32,
    pub height:    u32,
    pub timestamp: f64,
    pub delay_ms:  u32,
    pub data:      Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayResponse {
    Frames {
        id:          u64,
        frames:      Vec<RelayFrame>,
        /// Set when the responder itself fell back to synthetic frames.
        degradation: Option<Degradation>,
    },
    Failed {
        id:     u64,
        reason: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("Relay did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Relay protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::RelayTimeout,
            Self::Protocol(_) => ErrorCode::RelayProtocol,
        }
    }
}

/// Carries a request to whoever can sample and hands back a channel that
/// will receive the single response.
pub trait RelayTransport: Send + Sync {
    fn dispatch(&self, request: RelayRequest) -> Result<Receiver<RelayResponse>, RelayError>;
}

pub struct FrameRelay {
    transport:     Box<dyn RelayTransport>,
    timeout:       Duration,
    frame_warning: usize,
    next_id:       AtomicU64,
}

impl FrameRelay {
    pub fn new(transport: Box<dyn RelayTransport>, settings: &PipelineSettings) -> Self {
        Self {
            transport,
            timeout: settings.relay_timeout(),
            frame_warning: settings.relay_frame_warning,
            next_id: AtomicU64::new(1),
        }
    }

    /// Requests `ceil((end - start) * frame_rate)` frames of `width` x
    /// `height`, each rounded down to an even size of at least 2.
    ///
    /// Only invalid input is returned as an error. Any relay failure is
    /// logged and answered with synthetic frames tagged
    /// [`Degradation::RelayDegraded`].
    #[tracing::instrument(skip(self))]
    pub fn request_frames(
        &self,
        start: f64,
        end: f64,
        frame_rate: u32,
        width: u32,
        height: u32,
    ) -> Result<SampledFrames, EncoderError> {
        if !(start.is_finite() && end.is_finite() && start >= 0.0 && start < end) {
            return Err(EncoderError::InputValidation(format!(
                "relay window must satisfy 0 <= start < end, got [{start}, {end})"
            )));
        }
        if frame_rate == 0 || frame_rate > MAX_FRAME_RATE {
            return Err(EncoderError::InputValidation(format!(
                "relay frame rate must be within 1..={MAX_FRAME_RATE}, got {frame_rate}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(EncoderError::InputValidation(format!(
                "relay dimensions must be positive, got {width}x{height}"
            )));
        }

        // sampled sizes are always even; ask for what the responder will send
        let (width, height) = compute_dimensions((width, height), 1.0, None, None);
        let expected = frame_count(start, end, frame_rate);
        if expected > self.frame_warning {
            warn!(
                "relay asked for {expected} frames, more than the usual limit of {}",
                self.frame_warning
            );
        }

        let request = RelayRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            start,
            end,
            frame_rate,
            width,
            height,
        };

        match self.round_trip(&request, expected) {
            Ok(sampled) => Ok(sampled),
            Err(e) => {
                warn!("relay degraded ({}): {e}", e.code());
                SampledFrames::synthetic(
                    expected,
                    width,
                    height,
                    start,
                    frame_rate,
                    Degradation::RelayDegraded,
                )
            },
        }
    }

    fn round_trip(
        &self,
        request: &RelayRequest,
        expected: usize,
    ) -> Result<SampledFrames, RelayError> {
        let responses = self.transport.dispatch(request.clone())?;
        let response = responses.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => RelayError::Timeout(self.timeout),
            RecvTimeoutError::Disconnected => {
                RelayError::Protocol("responder hung up without answering".to_owned())
            },
        })?;

        let (id, frames, degradation) = match response {
            RelayResponse::Frames {
                id,
                frames,
                degradation,
            } => (id, frames, degradation),
            RelayResponse::Failed { reason, .. } => {
                return Err(RelayError::Protocol(format!("responder failed: {reason}")));
            },
        };
        if id != request.id {
            return Err(RelayError::Protocol(format!(
                "response {id} does not answer request {}",
                request.id
            )));
        }
        if frames.len() != expected {
            return Err(RelayError::Protocol(format!(
                "expected {expected} frames, got {}",
                frames.len()
            )));
        }

        let frames = frames
            .into_iter()
            .map(|f| {
                if (f.width, f.height) != (request.width, request.height) {
                    return Err(RelayError::Protocol(format!(
                        "frame is {}x{}, requested {}x{}",
                        f.width, f.height, request.width, request.height
                    )));
                }
                Frame::new(f.width, f.height, f.data, f.timestamp, f.delay_ms)
                    .map_err(|e| RelayError::Protocol(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("relay delivered {} frames", frames.len());

        Ok(SampledFrames {
            frames,
            width: request.width,
            height: request.height,
            frame_rate: request.frame_rate,
            degradation,
        })
    }
}

/// Samples on a dedicated thread that owns the source, answering over a
/// channel like a remote context would.
pub struct ThreadTransport {
    source:  Arc<Mutex<Box<dyn PixelSource>>>,
    sampler: FrameSampler,
}

impl ThreadTransport {
    pub fn new(source: Box<dyn PixelSource>, sampler: FrameSampler) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            sampler,
        }
    }
}

impl RelayTransport for ThreadTransport {
    fn dispatch(&self, request: RelayRequest) -> Result<Receiver<RelayResponse>, RelayError> {
        let (tx, rx) = bounded(1);
        let source = Arc::clone(&self.source);
        let sampler = self.sampler;

        thread::Builder::new()
            .name(format!("clipgif-relay-{}", request.id))
            .spawn(move || {
                let sample = SampleRequest {
                    quality: Quality::High,
                    target: Some((request.width, request.height)),
                    ..SampleRequest::new(request.start, request.end, request.frame_rate)
                };
                let response = {
                    let mut source = source.lock();
                    match sampler.sample(source.as_mut(), &sample, None, None) {
                        Ok(sampled) => RelayResponse::Frames {
                            id:          request.id,
                            frames:      sampled
                                .frames
                                .iter()
                                .map(|f| RelayFrame {
                                    width:     f.width(),
                                    height:    f.height(),
                                    timestamp: f.timestamp(),
                                    delay_ms:  f.delay_ms(),
                                    data:      f.data().to_vec(),
                                })
                                .collect(),
                            degradation: sampled.degradation,
                        },
                        Err(e) => RelayResponse::Failed {
                            id:     request.id,
                            reason: e.to_string(),
                        },
                    }
                };
                if tx.send(response).is_err() {
                    debug!("relay request {} abandoned by the orchestrator", request.id);
                }
            })
            .map_err(|e| RelayError::Protocol(format!("cannot start relay thread: {e}")))?;

        Ok(rx)
    }
}
