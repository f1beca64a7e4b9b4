use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{
    error::Error,
    frame::Frame,
    options::EncodingOptions,
    progress::{AbortSignal, EncodingProgress, ProgressReporter, Stage},
    result::{EncodingMetadata, EncodingResult, PerformanceReport},
    Backend,
};

/// Encodes slower than this get recommendations attached to the result.
pub const SLOW_ENCODE_THRESHOLD: Duration = Duration::from_secs(10);

/// Frames between cooperative yields to the scheduler.
const YIELD_EVERY: usize = 10;

/// Injected capability check for a back-end.
pub type AvailabilityProbe = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// State every back-end instance carries: its probe, whether it has been
/// initialized, and whether an encode is currently running.
pub(crate) struct BackendState {
    backend:     Backend,
    probe:       AvailabilityProbe,
    initialized: AtomicBool,
    in_flight:   AtomicBool,
}

impl BackendState {
    pub(crate) fn new(backend: Backend, probe: AvailabilityProbe) -> Self {
        Self {
            backend,
            probe,
            initialized: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    pub(crate) fn probe(&self) -> Result<(), String> {
        (self.probe)()
    }

    pub(crate) fn initialize(&self) -> Result<(), Error> {
        self.probe()
            .map_err(|reason| Error::EncoderUnavailable(self.backend, reason))?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!("initialized {} encoder", self.backend);
        }
        Ok(())
    }

    /// Marks the instance busy until the returned guard drops.
    pub(crate) fn acquire(&self) -> Result<InFlight<'_>, Error> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::EncodingInProgress(self.backend))?;
        Ok(InFlight {
            flag: &self.in_flight,
        })
    }
}

/// Clears the in-flight flag on every exit path.
pub(crate) struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Bookkeeping shared by all back-ends for a single `encode` call.
pub(crate) struct EncodeSession<'a> {
    backend:  Backend,
    started:  Instant,
    progress: ProgressReporter<'a>,
    abort:    Option<AbortSignal>,
}

impl<'a> EncodeSession<'a> {
    /// Checks cancellation and validates input before any work is done.
    pub(crate) fn begin(
        backend: Backend,
        frames: &[Frame],
        options: &EncodingOptions,
        progress: Option<&'a mut dyn FnMut(&EncodingProgress)>,
        abort: Option<&AbortSignal>,
    ) -> Result<Self, Error> {
        if abort.is_some_and(AbortSignal::is_aborted) {
            return Err(Error::EncodingCancelled);
        }
        options.validate()?;
        if frames.is_empty() {
            return Err(Error::invalid("no frames to encode"));
        }

        let mut session = Self {
            backend,
            started: Instant::now(),
            progress: ProgressReporter::new(progress),
            abort: abort.cloned(),
        };
        session.report(
            Stage::Preparing,
            0,
            &format!("preparing {} frames", frames.len()),
        );
        Ok(session)
    }

    pub(crate) fn checkpoint(&self) -> Result<(), Error> {
        if self.abort.as_ref().is_some_and(AbortSignal::is_aborted) {
            debug!("{} encode cancelled", self.backend);
            return Err(Error::EncodingCancelled);
        }
        Ok(())
    }

    pub(crate) fn report(&mut self, stage: Stage, percentage: u8, message: &str) {
        self.progress.report(stage, percentage, Some(message));
    }

    /// Reports frame `index` as done, mapping progress onto `[from, to]`, and
    /// yields periodically so the host is not starved.
    pub(crate) fn frame_encoded(
        &mut self,
        index: usize,
        total: usize,
        from: u8,
        to: u8,
    ) {
        let done = index + 1;
        let span = usize::from(to.saturating_sub(from));
        let percentage = from as usize + span * done / total.max(1);
        self.progress.report(Stage::Encoding, percentage as u8, None);

        if done % YIELD_EVERY == 0 {
            thread::yield_now();
        }
    }

    pub(crate) fn finish(
        mut self,
        bytes: Vec<u8>,
        frame_count: usize,
        options: &EncodingOptions,
    ) -> EncodingResult {
        self.report(Stage::Finalizing, 95, "collecting results");

        let encoding_time = self.started.elapsed();
        let file_size = bytes.len();
        let metadata = EncodingMetadata {
            frame_count,
            width: options.width,
            height: options.height,
            format: options.format,
            encoder: self.backend,
            encoding_time,
            average_frame_time: encoding_time / frame_count.max(1) as u32,
            file_size,
        };
        let performance = PerformanceReport::assess(
            frame_count,
            options.width,
            options.height,
            file_size,
            encoding_time,
            SLOW_ENCODE_THRESHOLD,
        );

        info!(
            "{} encoded {} frames ({}x{}) into {} bytes in {:.2?}",
            self.backend,
            frame_count,
            options.width,
            options.height,
            file_size,
            encoding_time
        );
        self.report(Stage::Completed, 100, "done");

        EncodingResult {
            bytes,
            metadata,
            performance,
        }
    }
}

/// Borrows frames already at the output size and resamples the rest.
pub(crate) fn fit_frames<'f>(
    frames: &'f [Frame],
    options: &EncodingOptions,
) -> Vec<Cow<'f, Frame>> {
    frames
        .iter()
        .map(|frame| {
            if frame.width() == options.width && frame.height() == options.height
            {
                Cow::Borrowed(frame)
            } else {
                Cow::Owned(frame.resampled(options.width, options.height))
            }
        })
        .collect()
}

/// Starts a GIF stream with the logical screen and optional global palette.
pub(crate) fn open_stream<'w>(
    out: &'w mut Vec<u8>,
    options: &EncodingOptions,
    global_palette: &[u8],
) -> Result<gif::Encoder<&'w mut Vec<u8>>, gif::EncodingError> {
    let mut encoder = gif::Encoder::new(
        out,
        options.width as u16,
        options.height as u16,
        global_palette,
    )?;
    if options.looping {
        encoder.set_repeat(gif::Repeat::Infinite)?;
    }
    Ok(encoder)
}
