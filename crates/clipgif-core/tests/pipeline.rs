use std::sync::Arc;

use clipgif_core::{
    relay::RelayError,
    sampler::synthetic_frames,
    AbortSignal,
    Backend,
    Capture,
    ClipRequest,
    Degradation,
    EncodingOptions,
    ErrorCode,
    Frame,
    FrameRelay,
    Pipeline,
    PipelineEvent,
    PipelineSettings,
    Preference,
    RelayRequest,
    RelayResponse,
    RelayTransport,
    SelectionReason,
    Stage,
    TestPattern,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use quickcheck_macros::quickcheck;

fn pattern() -> Capture {
    Capture::Direct(Box::new(TestPattern::new(320, 240, 10.0)))
}

fn small_clip(end: f64) -> ClipRequest {
    ClipRequest {
        target: Some((64, 48)),
        ..ClipRequest::new(0.0, end, 10)
    }
}

#[test]
fn every_backend_round_trips_through_the_reader() {
    let frames = synthetic_frames(5, 40, 30, 0.0, 10).unwrap();
    let options = EncodingOptions::new(40, 30, 10);

    for backend in Backend::ALL {
        let result = backend
            .instantiate()
            .encode(&frames, &options, None, None)
            .unwrap();
        let meta = clipgif_core::read_metadata(&result.bytes).unwrap();

        assert_eq!(meta.frame_count, 5, "{backend}");
        assert!(meta.resolution_matches(40, 30, 0), "{backend}");
        assert!(meta.duration_matches(0.5, 1e-9), "{backend}");
        assert!(meta.fps_matches(10.0, 1e-6), "{backend}");
        assert!(meta.looping, "{backend}");
        assert!(meta.complete, "{backend}");
        assert!(meta.file_size_plausible(), "{backend}");
    }
}

#[test]
fn loop_flag_and_transparency_reach_the_stream() {
    let frames = vec![
        Frame::solid(16, 16, [10, 20, 30, 0], 0.0, 200).unwrap(),
        Frame::solid(16, 16, [200, 20, 30, 255], 0.2, 200).unwrap(),
    ];
    let options = EncodingOptions {
        looping: false,
        ..EncodingOptions::new(16, 16, 5)
    };

    for backend in Backend::ALL {
        let result = backend
            .instantiate()
            .encode(&frames, &options, None, None)
            .unwrap();
        let meta = clipgif_core::read_metadata(&result.bytes).unwrap();
        assert!(!meta.looping, "{backend}");
        assert!(meta.has_transparency, "{backend}");
        assert!(meta.duration_matches(0.4, 1e-9), "{backend}");
    }
}

#[test]
fn direct_capture_runs_end_to_end() {
    let pipeline = Pipeline::new(PipelineSettings::default());
    let mut events = Vec::new();

    let output = pipeline
        .run(
            &mut pattern(),
            &small_clip(0.5),
            &mut |event| events.push(event),
            None,
        )
        .unwrap();

    assert_eq!(output.result.metadata.frame_count, 5);
    assert_eq!(output.result.metadata.encoder, Backend::Worker);
    assert_eq!(output.reason, SelectionReason::AutoSelected);
    assert_eq!(output.degradation, None);
    assert_eq!(output.validation.as_ref().unwrap().frame_count, 5);

    let mut phases: Vec<&str> = events
        .iter()
        .map(|e| match e {
            PipelineEvent::Sampling { .. } => "sampling",
            PipelineEvent::Sampled { .. } => "sampled",
            PipelineEvent::Selected { .. } => "selected",
            PipelineEvent::Encoding(_) => "encoding",
            PipelineEvent::Validated(_) => "validated",
        })
        .collect();
    phases.dedup();
    assert_eq!(
        phases,
        ["sampling", "sampled", "selected", "encoding", "validated"]
    );

    let last_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            PipelineEvent::Encoding(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress.stage, Stage::Completed);
    assert_eq!(last_progress.percentage, 100);
}

#[test]
fn named_encoder_and_settings_limits_apply() {
    let pipeline = Pipeline::new(PipelineSettings {
        max_width: Some(100),
        validate_output: false,
        ..PipelineSettings::default()
    });
    let request = ClipRequest {
        encoder: Preference::Named(Backend::Fast),
        ..ClipRequest::new(1.0, 1.3, 10)
    };

    let output = pipeline
        .run(&mut pattern(), &request, &mut |_| {}, None)
        .unwrap();
    assert_eq!(output.reason, SelectionReason::UserPreference);
    assert_eq!(output.result.metadata.encoder, Backend::Fast);
    assert_eq!(
        (output.result.metadata.width, output.result.metadata.height),
        (100, 74)
    );
    assert!(output.validation.is_none());
}

#[test]
fn unsupported_format_is_reported() {
    let request = ClipRequest {
        format: clipgif_core::OutputFormat::Mp4,
        ..small_clip(0.5)
    };
    let err = Pipeline::new(PipelineSettings::default())
        .run(&mut pattern(), &request, &mut |_| {}, None)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FormatNotSupported);
    assert_eq!(err.to_string(), "Format mp4 not yet supported");
}

#[test]
fn empty_window_has_nothing_to_encode() {
    let err = Pipeline::new(PipelineSettings::default())
        .run(&mut pattern(), &small_clip(0.0), &mut |_| {}, None)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InputValidation);
}

#[test]
fn unreadable_source_still_produces_a_clip() {
    let mut capture = Capture::Direct(Box::new(TestPattern::new(320, 240, 5.0).tainted()));
    let output = Pipeline::new(PipelineSettings::default())
        .run(&mut capture, &small_clip(0.4), &mut |_| {}, None)
        .unwrap();
    assert_eq!(output.degradation, Some(Degradation::SamplingUnavailable));
    assert_eq!(output.result.metadata.frame_count, 4);
}

/// Never answers.
#[derive(Default)]
struct Stalled {
    pending: Mutex<Vec<Sender<RelayResponse>>>,
}

impl RelayTransport for Stalled {
    fn dispatch(&self, _: RelayRequest) -> Result<Receiver<RelayResponse>, RelayError> {
        let (tx, rx) = bounded(1);
        self.pending.lock().push(tx);
        Ok(rx)
    }
}

#[test]
fn stalled_relay_degrades_instead_of_failing() {
    let settings = PipelineSettings {
        relay_timeout_ms: 50,
        ..PipelineSettings::default()
    };
    let relay = FrameRelay::new(Box::<Stalled>::default(), &settings);
    let output = Pipeline::new(settings)
        .run(&mut Capture::Relay(relay), &small_clip(0.6), &mut |_| {}, None)
        .unwrap();

    assert_eq!(output.degradation, Some(Degradation::RelayDegraded));
    assert_eq!(output.result.metadata.frame_count, 6);
    assert_eq!(
        (output.result.metadata.width, output.result.metadata.height),
        (64, 48)
    );
}

#[test]
fn relay_capture_needs_a_target() {
    let settings = PipelineSettings::default();
    let relay = FrameRelay::new(Box::<Stalled>::default(), &settings);
    let err = Pipeline::new(settings)
        .run(
            &mut Capture::Relay(relay),
            &ClipRequest::new(0.0, 1.0, 10),
            &mut |_| {},
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InputValidation);
}

#[test]
fn abort_before_start() {
    let abort = AbortSignal::new();
    abort.abort();
    let mut events = 0;
    let err = Pipeline::new(PipelineSettings::default())
        .run(&mut pattern(), &small_clip(1.0), &mut |_| events += 1, Some(&abort))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncodingCancelled);
    assert_eq!(events, 0);
}

#[test]
fn spawned_task_streams_events() {
    let pipeline = Pipeline::new(PipelineSettings::default());
    let task = pipeline.spawn(pattern(), small_clip(0.3)).unwrap();

    let events: Vec<PipelineEvent> = task.events().iter().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Selected { backend: Backend::Worker, .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::Validated(_))));

    let output = task.wait().unwrap();
    assert_eq!(output.result.metadata.frame_count, 3);
}

#[test]
fn spawned_task_can_be_cancelled() {
    let pipeline = Pipeline::new(PipelineSettings::default());
    let request = ClipRequest {
        target: Some((320, 240)),
        encoder: Preference::Named(Backend::Fast),
        ..ClipRequest::new(0.0, 8.0, 30)
    };
    let task = pipeline.spawn(pattern(), request).unwrap();
    task.cancel();

    let err = task.wait().unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncodingCancelled);
}

#[test]
fn registry_is_shared_between_jobs() {
    let pipeline = Pipeline::new(PipelineSettings::default());
    let clone = pipeline.clone();
    assert!(Arc::ptr_eq(pipeline.registry(), clone.registry()));

    pipeline
        .run(&mut pattern(), &small_clip(0.2), &mut |_| {}, None)
        .unwrap();
    clone
        .run(&mut pattern(), &small_clip(0.2), &mut |_| {}, None)
        .unwrap();
}

#[quickcheck]
fn fast_round_trip_preserves_shape(count: u8, width: u8, height: u8) -> bool {
    let count = usize::from(count % 6) + 1;
    let width = u32::from(width % 32) + 1;
    let height = u32::from(height % 32) + 1;
    let frames = synthetic_frames(count, width, height, 0.0, 25).unwrap();

    Backend::Fast
        .instantiate()
        .encode(&frames, &EncodingOptions::new(width, height, 25), None, None)
        .ok()
        .and_then(|r| clipgif_core::read_metadata(&r.bytes).ok())
        .is_some_and(|m| m.frame_count == count && m.resolution_matches(width, height, 0))
}
