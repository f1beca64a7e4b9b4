//! Resolving, caching and benchmarking encoder back-ends.

use std::{
    fmt::Display,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};

use clipgif_encoders::{
    Backend,
    Characteristics,
    EncodingOptions,
    Error as EncoderError,
    FrameEncoder,
    OutputFormat,
    Quality,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{debug, info, warn};

use crate::sampler::synthetic_frames;

const BENCH_FRAMES: usize = 8;
const BENCH_SIZE: u32 = 64;
const BENCH_FRAME_RATE: u32 = 10;

/// Builds encoder instances. The registry asks at most once per back-end
/// until its cache is cleared.
pub trait EncoderProvider: Send + Sync {
    fn create(&self, backend: Backend) -> Arc<dyn FrameEncoder>;
}

/// Builds each back-end with its stock availability probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProvider;

impl EncoderProvider for DefaultProvider {
    fn create(&self, backend: Backend) -> Arc<dyn FrameEncoder> {
        backend.instantiate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Auto,
    Named(Backend),
}

impl Default for Preference {
    fn default() -> Self {
        Self::Auto
    }
}

impl FromStr for Preference {
    type Err = EncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse::<Backend>().map(Self::Named).map_err(|_| {
            EncoderError::InputValidation(format!(
                "unknown encoder {s:?}, expected auto, fast, worker or fidelity"
            ))
        })
    }
}

impl Display for Preference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Named(backend) => Display::fmt(backend, f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    pub primary:  Preference,
    pub fallback: Option<Backend>,
    pub format:   OutputFormat,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            primary:  Preference::Auto,
            fallback: None,
            format:   OutputFormat::Gif,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    UserPreference,
    Fallback,
    AutoSelected,
    EmergencyFallback,
}

impl Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UserPreference => "User preference",
            Self::Fallback => "Fallback (primary unavailable)",
            Self::AutoSelected => "Auto-selected based on performance characteristics",
            Self::EmergencyFallback => "Emergency fallback to any available encoder",
        })
    }
}

#[derive(Clone)]
pub struct Selection {
    pub encoder: Arc<dyn FrameEncoder>,
    pub backend: Backend,
    pub reason:  SelectionReason,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("backend", &self.backend)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// A live snapshot of one back-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderDescriptor {
    pub backend:            Backend,
    pub name:               String,
    pub supported_formats:  Vec<OutputFormat>,
    pub characteristics:    Characteristics,
    pub available:          bool,
    /// Why the probe failed, when it did.
    pub unavailable_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub backend:           Backend,
    pub elapsed:           Option<Duration>,
    pub frames_per_second: Option<f64>,
    /// Growth in used system memory across the run, when measurable.
    pub memory_delta:      Option<u64>,
    pub error:             Option<String>,
}

impl BenchmarkResult {
    /// The fastest back-end that completed its run.
    pub fn fastest(results: &[Self]) -> Option<Backend> {
        results
            .iter()
            .filter_map(|r| r.elapsed.map(|elapsed| (elapsed, r.backend)))
            .min_by_key(|&(elapsed, _)| elapsed)
            .map(|(_, backend)| backend)
    }
}

/// Owns one instance per back-end and picks among them.
///
/// Constructed once and shared by reference; nothing here is global.
pub struct EncoderRegistry {
    provider: Box<dyn EncoderProvider>,
    priority: Vec<Backend>,
    cache:    DashMap<Backend, Arc<dyn FrameEncoder>>,
}

impl EncoderRegistry {
    pub fn new(priority: Vec<Backend>) -> Self {
        Self::with_provider(Box::new(DefaultProvider), priority)
    }

    pub fn with_provider(provider: Box<dyn EncoderProvider>, priority: Vec<Backend>) -> Self {
        Self {
            provider,
            priority,
            cache: DashMap::new(),
        }
    }

    pub fn priority(&self) -> &[Backend] {
        &self.priority
    }

    /// The cached instance for `backend`, created on first use.
    pub fn get(&self, backend: Backend) -> Arc<dyn FrameEncoder> {
        self.cache
            .entry(backend)
            .or_insert_with(|| {
                debug!("creating {backend} encoder");
                self.provider.create(backend)
            })
            .value()
            .clone()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Every registered back-end, in priority order, followed by any the
    /// priority list leaves out.
    fn all_backends(&self) -> impl Iterator<Item = Backend> + '_ {
        self.priority.iter().copied().chain(
            Backend::ALL
                .into_iter()
                .filter(move |b| !self.priority.contains(b)),
        )
    }

    /// `Some` when `backend` can serve `format` and initializes cleanly.
    fn ready(&self, backend: Backend, format: OutputFormat) -> Option<Arc<dyn FrameEncoder>> {
        let encoder = self.get(backend);
        if !encoder.supported_formats().contains(&format) {
            debug!("{backend} cannot produce {format}");
            return None;
        }
        match encoder.initialize() {
            Ok(()) => Some(encoder),
            Err(e) => {
                debug!("{backend} skipped: {e}");
                None
            },
        }
    }

    fn first_ready(
        &self,
        format: OutputFormat,
        reason: SelectionReason,
    ) -> Option<Selection> {
        self.all_backends().find_map(|backend| {
            self.ready(backend, format).map(|encoder| Selection {
                encoder,
                backend,
                reason,
            })
        })
    }

    /// Resolves `policy` to an initialized encoder.
    ///
    /// The format is checked before anything is probed. A named primary is
    /// tried first, then the explicit fallback; `auto` scans the priority
    /// list. If all of that fails, any available back-end is taken.
    #[tracing::instrument(skip(self))]
    pub fn select(&self, policy: &SelectionPolicy) -> Result<Selection, EncoderError> {
        if !policy.format.is_supported() {
            return Err(EncoderError::FormatNotSupported(policy.format));
        }

        let chosen = match policy.primary {
            Preference::Named(primary) => self
                .ready(primary, policy.format)
                .map(|encoder| Selection {
                    encoder,
                    backend: primary,
                    reason: SelectionReason::UserPreference,
                })
                .or_else(|| {
                    let fallback = policy.fallback?;
                    self.ready(fallback, policy.format).map(|encoder| Selection {
                        encoder,
                        backend: fallback,
                        reason: SelectionReason::Fallback,
                    })
                }),
            Preference::Auto => self.first_ready(policy.format, SelectionReason::AutoSelected),
        };

        let selection = match chosen {
            Some(selection) => selection,
            None => {
                let emergency = self
                    .first_ready(policy.format, SelectionReason::EmergencyFallback)
                    .ok_or(EncoderError::NoEncoderAvailable)?;
                warn!(
                    "no preferred encoder for {}, falling back to {}",
                    policy.primary, emergency.backend
                );
                emergency
            },
        };

        info!("selected {} encoder: {}", selection.backend, selection.reason);
        Ok(selection)
    }

    /// Describes every back-end. Probe failures are reported, not raised.
    pub fn descriptors(&self) -> Vec<EncoderDescriptor> {
        self.all_backends()
            .map(|backend| {
                let encoder = self.get(backend);
                let probe = encoder.probe();
                EncoderDescriptor {
                    backend,
                    name: encoder.name().to_owned(),
                    supported_formats: encoder.supported_formats().to_vec(),
                    characteristics: encoder.characteristics(),
                    available: probe.is_ok(),
                    unavailable_reason: probe.err(),
                }
            })
            .collect()
    }

    /// Times a short synthetic encode on every available back-end.
    #[tracing::instrument(skip(self))]
    pub fn benchmark(&self) -> Vec<BenchmarkResult> {
        let frames = match synthetic_frames(
            BENCH_FRAMES,
            BENCH_SIZE,
            BENCH_SIZE,
            0.0,
            BENCH_FRAME_RATE,
        ) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("cannot build benchmark frames: {e}");
                return Vec::new();
            },
        };
        let options = EncodingOptions {
            quality: Quality::Medium,
            ..EncodingOptions::new(BENCH_SIZE, BENCH_SIZE, BENCH_FRAME_RATE)
        };
        let mut system = sysinfo::IS_SUPPORTED_SYSTEM.then(System::new);

        self.all_backends()
            .map(|backend| {
                let failed = |error: String| BenchmarkResult {
                    backend,
                    elapsed: None,
                    frames_per_second: None,
                    memory_delta: None,
                    error: Some(error),
                };

                let encoder = match self.ready(backend, options.format) {
                    Some(encoder) => encoder,
                    None => {
                        let reason = self
                            .get(backend)
                            .probe()
                            .err()
                            .unwrap_or_else(|| "failed to initialize".to_owned());
                        return failed(reason);
                    },
                };

                let before = used_memory(system.as_mut());
                let started = Instant::now();
                let outcome = encoder.encode(&frames, &options, None, None);
                let elapsed = started.elapsed();
                let after = used_memory(system.as_mut());

                match outcome {
                    Ok(result) => {
                        let fps = result.metadata.frame_count as f64 / elapsed.as_secs_f64().max(1e-9);
                        debug!("{backend}: {fps:.1} frames/s");
                        BenchmarkResult {
                            backend,
                            elapsed: Some(elapsed),
                            frames_per_second: Some(fps),
                            memory_delta: before.zip(after).map(|(b, a)| a.saturating_sub(b)),
                            error: None,
                        }
                    },
                    Err(e) => failed(e.to_string()),
                }
            })
            .collect()
    }

    /// Benchmarks and returns the fastest available back-end.
    pub fn recommended(&self) -> Option<Backend> {
        BenchmarkResult::fastest(&self.benchmark())
    }
}

fn used_memory(system: Option<&mut System>) -> Option<u64> {
    system.map(|system| {
        system.refresh_memory();
        system.used_memory()
    })
}
