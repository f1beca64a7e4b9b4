use std::{sync::Arc, thread};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::{
    error::Error,
    frame::{Frame, ALPHA_THRESHOLD},
    options::{EncodingOptions, OutputFormat, QualityScale},
    progress::{AbortSignal, EncodingProgress, Stage},
    result::EncodingResult,
    session::{fit_frames, open_stream, AvailabilityProbe, BackendState, EncodeSession},
    traits::{
        Characteristics,
        Compatibility,
        FrameEncoder,
        MemoryUsage,
        Speed,
        VisualQuality,
    },
    Backend,
};

const QUALITY_SCALE: QualityScale = QualityScale {
    low:    60,
    medium: 80,
    high:   100,
};

/// Frames in flight between the orchestrator and the worker thread.
const PIPELINE_DEPTH: usize = 4;

/// A frame copied across the thread boundary.
struct Job {
    index:  usize,
    width:  u16,
    height: u16,
    delay:  u16,
    speed:  i32,
    pixels: Vec<u8>,
}

type Done = (usize, gif::Frame<'static>);

/// Hands every frame to a dedicated thread, which builds a per-frame palette
/// and LZW-compresses it. The calling thread only assembles the stream.
pub struct WorkerEncoder {
    state: BackendState,
}

impl WorkerEncoder {
    pub fn with_probe(probe: AvailabilityProbe) -> Self {
        Self {
            state: BackendState::new(Backend::Worker, probe),
        }
    }
}

impl Default for WorkerEncoder {
    fn default() -> Self {
        Self::with_probe(Arc::new(|| {
            thread::available_parallelism()
                .map(|_| ())
                .map_err(|e| format!("cannot query thread support: {e}"))
        }))
    }
}

/// Maps quality 1..=100 onto the quantizer speed, 30 (fastest) down to 1.
fn quantizer_speed(quality: u8) -> i32 {
    1 + i32::from(100 - quality.min(100)) * 29 / 99
}

fn worker_loop(jobs: Receiver<Job>, done: Sender<Done>) {
    while let Ok(mut job) = jobs.recv() {
        let mut frame = gif::Frame::from_rgba_speed(
            job.width,
            job.height,
            &mut job.pixels,
            job.speed,
        );
        frame.delay = job.delay;
        frame.dispose = gif::DisposalMethod::Background;
        frame.make_lzw_pre_encoded();

        if done.send((job.index, frame)).is_err() {
            debug!("frame receiver gone, worker stopping at {}", job.index);
            return;
        }
    }
}

fn copy_job(index: usize, frame: &Frame, options: &EncodingOptions, speed: i32) -> Job {
    // gif only treats alpha == 0 as transparent
    let mut pixels = frame.data().to_vec();
    for px in pixels.chunks_exact_mut(4) {
        px[3] = if px[3] < ALPHA_THRESHOLD { 0 } else { 255 };
    }

    Job {
        index,
        width: options.width as u16,
        height: options.height as u16,
        delay: options.delay_cs(frame),
        speed,
        pixels,
    }
}

/// Feeds jobs to the worker and writes compressed frames back in order.
fn assemble<F: AsRef<Frame>>(
    session: &mut EncodeSession<'_>,
    frames: &[F],
    options: &EncodingOptions,
    speed: i32,
    jobs: &Sender<Job>,
    done: &Receiver<Done>,
    bytes: &mut Vec<u8>,
) -> Result<(), Error> {
    let total = frames.len();
    let mut stream = open_stream(bytes, options, &[])
        .map_err(|e| Error::backend(Backend::Worker, e))?;

    let dispatch = |index: usize| {
        jobs.send(copy_job(index, frames[index].as_ref(), options, speed))
            .map_err(|_| Error::backend(Backend::Worker, "worker exited"))
    };

    let mut sent = 0;
    while sent < total.min(PIPELINE_DEPTH) {
        dispatch(sent)?;
        sent += 1;
    }

    for expected in 0..total {
        let (index, frame) = done.recv().map_err(|_| {
            Error::backend(Backend::Worker, "worker exited before finishing")
        })?;
        debug_assert_eq!(index, expected);
        session.checkpoint()?;

        stream
            .write_lzw_pre_encoded_frame(&frame)
            .map_err(|e| Error::backend(Backend::Worker, e))?;
        session.frame_encoded(expected, total, 10, 90);

        if sent < total {
            dispatch(sent)?;
            sent += 1;
        }
    }

    Ok(())
}

impl FrameEncoder for WorkerEncoder {
    fn backend(&self) -> Backend {
        Backend::Worker
    }

    fn supported_formats(&self) -> &'static [OutputFormat] {
        &[OutputFormat::Gif]
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics {
            speed:         Speed::Moderate,
            quality:       VisualQuality::Good,
            memory:        MemoryUsage::High,
            compatibility: Compatibility::Broad,
        }
    }

    fn probe(&self) -> Result<(), String> {
        self.state.probe()
    }

    fn initialize(&self) -> Result<(), Error> {
        self.state.initialize()
    }

    #[tracing::instrument(skip_all, fields(frames = frames.len()))]
    fn encode(
        &self,
        frames: &[Frame],
        options: &EncodingOptions,
        progress: Option<&mut dyn FnMut(&EncodingProgress)>,
        abort: Option<&AbortSignal>,
    ) -> Result<EncodingResult, Error> {
        let _busy = self.state.acquire()?;
        let mut session =
            EncodeSession::begin(Backend::Worker, frames, options, progress, abort)?;
        self.initialize()?;

        let frames = fit_frames(frames, options);
        let speed = quantizer_speed(options.quality.scaled(QUALITY_SCALE));
        let total = frames.len();

        let (job_tx, job_rx) = bounded::<Job>(PIPELINE_DEPTH);
        let (done_tx, done_rx) = bounded::<Done>(PIPELINE_DEPTH);
        let handle = thread::Builder::new()
            .name("clipgif-worker".into())
            .spawn(move || worker_loop(job_rx, done_tx))
            .map_err(|e| Error::backend(Backend::Worker, e))?;

        session.report(Stage::Preparing, 5, "worker started");

        let mut bytes = Vec::new();
        let outcome = assemble(
            &mut session,
            &frames,
            options,
            speed,
            &job_tx,
            &done_rx,
            &mut bytes,
        );

        // closing both ends lets the worker drain and exit
        drop(job_tx);
        drop(done_rx);
        if handle.join().is_err() {
            error!("worker thread panicked");
            if outcome.is_ok() {
                return Err(Error::backend(Backend::Worker, "worker thread panicked"));
            }
        }
        if let Err(e) = &outcome {
            warn!("worker encode stopped: {e}");
        }
        outcome?;

        Ok(session.finish(bytes, total, options))
    }
}
