use clipgif_encoders::ErrorCode;
use quickcheck_macros::quickcheck;

use super::*;
use crate::source::TestPattern;

/// Paints fine for a few frames, then fails.
struct Flaky {
    inner:      TestPattern,
    paints_ok:  usize,
    paint_hits: std::cell::Cell<usize>,
}

impl PixelSource for Flaky {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    fn set_paused(&mut self, paused: bool) {
        self.inner.set_paused(paused);
    }

    fn seek(&mut self, time: f64) -> Result<(), SourceError> {
        self.inner.seek(time)
    }

    fn paint(&self, surface: &mut Surface) -> Result<(), SourceError> {
        let hits = self.paint_hits.get();
        self.paint_hits.set(hits + 1);
        if hits >= self.paints_ok {
            return Err(SourceError::Paint("decoder stalled".to_owned()));
        }
        self.inner.paint(surface)
    }
}

fn playing_at(time: f64) -> TestPattern {
    let mut source = TestPattern::new(100, 60, 5.0);
    source.seek(time).unwrap();
    source.set_paused(false);
    source
}

#[test]
fn frame_count_formula() {
    assert_eq!(frame_count(0.0, 1.0, 10), 10);
    assert_eq!(frame_count(0.0, 0.25, 10), 3);
    assert_eq!(frame_count(0.0, 0.0, 30), 0);
    assert_eq!(frame_count(1.0, 1.1, 30), 3);
    assert_eq!(frame_count(2.0, 1.0, 30), 0);
}

#[test]
fn dimensions_follow_quality_and_limits() {
    assert_eq!(compute_dimensions((1920, 1080), 0.75, None, None), (1440, 810));
    assert_eq!(compute_dimensions((1920, 1080), 0.5, None, None), (960, 540));
    assert_eq!(
        compute_dimensions((1920, 1080), 1.0, Some(500), None),
        (500, 280)
    );
    assert_eq!(
        compute_dimensions((1000, 1000), 1.0, Some(800), Some(401)),
        (400, 400)
    );
    assert_eq!(compute_dimensions((1, 1), 0.5, None, None), (2, 2));
}

#[test]
fn target_overrides_quality_factor() {
    let request = SampleRequest {
        quality: Quality::Low,
        target: Some((320, 240)),
        ..SampleRequest::new(0.0, 1.0, 10)
    };
    assert_eq!(request.dimensions((1920, 1080)), (320, 240));
}

#[test]
fn samples_window_and_restores_playback() {
    let mut source = playing_at(2.5);
    let request = SampleRequest {
        quality: Quality::High,
        ..SampleRequest::new(0.0, 1.0, 10)
    };
    let mut calls = Vec::new();

    let sampled = FrameSampler::default()
        .sample(
            &mut source,
            &request,
            Some(&mut |done: usize, total: usize| calls.push((done, total))),
            None,
        )
        .unwrap();

    assert_eq!(sampled.frames.len(), 10);
    assert_eq!((sampled.width, sampled.height), (100, 60));
    assert_eq!(sampled.degradation, None);
    assert!(sampled.frames.iter().all(|f| f.delay_ms() == 100));
    assert_eq!(calls.len(), 10);
    assert_eq!(calls.last(), Some(&(10, 10)));

    assert_eq!(source.current_time(), 2.5);
    assert!(!source.is_paused());
}

#[test]
fn same_instant_samples_identically() {
    let mut source = playing_at(0.0);
    let request = SampleRequest::new(0.5, 0.6, 10);
    let sampler = FrameSampler::default();
    let a = sampler.sample(&mut source, &request, None, None).unwrap();
    let b = sampler.sample(&mut source, &request, None, None).unwrap();
    assert_eq!(a.frames, b.frames);
}

#[test]
fn empty_window_is_not_an_error() {
    let mut source = playing_at(0.0);
    let sampled = FrameSampler::default()
        .sample(&mut source, &SampleRequest::new(0.0, 0.0, 30), None, None)
        .unwrap();
    assert!(sampled.frames.is_empty());
    assert_eq!(sampled.duration(), 0.0);
}

#[test]
fn unreadable_source_degrades_to_synthetic_frames() {
    let mut source = TestPattern::new(100, 60, 5.0).tainted();
    let request = SampleRequest::new(0.0, 0.5, 10);
    let sampled = FrameSampler::default()
        .sample(&mut source, &request, None, None)
        .unwrap();

    assert_eq!(sampled.degradation, Some(Degradation::SamplingUnavailable));
    assert_eq!(sampled.frames.len(), 5);
    assert!(sampled
        .frames
        .iter()
        .all(|f| (f.width(), f.height()) == (sampled.width, sampled.height)));
    assert_eq!(Degradation::SamplingUnavailable.to_string(), "sampling-unavailable");
}

#[test]
fn failure_midway_keeps_count_and_restores_playback() {
    let mut source = Flaky {
        inner:      playing_at(1.25),
        paints_ok:  3,
        paint_hits: std::cell::Cell::new(0),
    };
    let sampled = FrameSampler::default()
        .sample(&mut source, &SampleRequest::new(0.0, 1.0, 8), None, None)
        .unwrap();

    assert_eq!(sampled.frames.len(), 8);
    assert_eq!(sampled.degradation, Some(Degradation::SamplingUnavailable));
    assert_eq!(source.current_time(), 1.25);
    assert!(!source.is_paused());
}

#[test]
fn cancellation_restores_playback() {
    let mut source = playing_at(3.0);
    let abort = AbortSignal::new();
    let trigger = abort.clone();

    let err = FrameSampler::default()
        .sample(
            &mut source,
            &SampleRequest::new(0.0, 2.0, 30),
            Some(&mut |done: usize, _: usize| {
                if done == 4 {
                    trigger.abort();
                }
            }),
            Some(&abort),
        )
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::EncodingCancelled);
    assert_eq!(source.current_time(), 3.0);
    assert!(!source.is_paused());
}

#[test]
fn rejects_invalid_requests() {
    let mut source = playing_at(0.0);
    let sampler = FrameSampler::default();
    for request in [
        SampleRequest::new(1.0, 0.5, 10),
        SampleRequest::new(0.0, 1.0, 0),
        SampleRequest::new(0.0, 1.0, 61),
        SampleRequest::new(f64::NAN, 1.0, 10),
        SampleRequest {
            max_width: Some(1),
            ..SampleRequest::new(0.0, 1.0, 10)
        },
        SampleRequest {
            max_height: Some(0),
            ..SampleRequest::new(0.0, 1.0, 10)
        },
    ] {
        let err = sampler.sample(&mut source, &request, None, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InputValidation, "{request:?}");
    }
}

#[quickcheck]
fn sampled_count_matches_formula(start: u8, span: u8, fps: u8) -> bool {
    let start = f64::from(start % 20) / 10.0;
    let end = start + f64::from(span % 20) / 10.0;
    let fps = u32::from(fps % 60) + 1;
    let mut source = TestPattern::new(8, 8, 5.0);

    let expected = ((end - start) * f64::from(fps) - 1e-6).ceil().max(0.0) as usize;

    FrameSampler::default()
        .sample(&mut source, &SampleRequest::new(start, end, fps), None, None)
        .is_ok_and(|s| s.frames.len() == expected)
}

#[quickcheck]
fn dimensions_are_even_and_positive(
    w: u16,
    h: u16,
    max_w: Option<u16>,
    max_h: Option<u16>,
) -> bool {
    let (w, h) = compute_dimensions(
        (u32::from(w), u32::from(h)),
        0.75,
        max_w.map(u32::from),
        max_h.map(u32::from),
    );
    w >= 2 && h >= 2 && w % 2 == 0 && h % 2 == 0
}
