use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preparing,
    Encoding,
    Finalizing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProgress {
    pub stage:      Stage,
    pub percentage: u8,
    pub message:    Option<String>,
}

/// Cooperative cancellation flag shared between a caller and a running job.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Forwards progress to an optional callback while keeping the reported
/// percentage non-decreasing. 100 is only ever sent once, with
/// [`Stage::Completed`].
pub(crate) struct ProgressReporter<'a> {
    sink:      Option<&'a mut dyn FnMut(&EncodingProgress)>,
    last:      u8,
    completed: bool,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: Option<&'a mut dyn FnMut(&EncodingProgress)>) -> Self {
        Self {
            sink,
            last: 0,
            completed: false,
        }
    }

    pub(crate) fn report(
        &mut self,
        stage: Stage,
        percentage: u8,
        message: Option<&str>,
    ) {
        if self.completed {
            return;
        }
        let percentage = if stage == Stage::Completed {
            self.completed = true;
            100
        } else {
            percentage.min(99).max(self.last)
        };
        self.last = percentage;

        if let Some(sink) = self.sink.as_mut() {
            sink(&EncodingProgress {
                stage,
                percentage,
                message: message.map(ToOwned::to_owned),
            });
        }
    }
}
