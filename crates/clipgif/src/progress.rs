use std::{fmt::Write, time::Duration};

use clipgif_core::{PipelineEvent, Stage};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};

const SAMPLING_TEMPLATE: &str =
    "{spinner:.green.bold} [{elapsed_precise:.bold}] {msg:<10} [{wide_bar:.blue/white.dim}] {pos}";
const ENCODING_TEMPLATE: &str =
    "{spinner:.green.bold} [{elapsed_precise:.bold}] {msg:<10} [{wide_bar:.green/white.dim}] {percent}";
const PROGRESS_CHARS: &str = "#>-";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("pos", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{}/{}", state.pos(), state.len().unwrap_or(0));
        })
        .with_key("percent", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:>3.0}%", state.fraction() * 100_f32);
        })
        .progress_chars(PROGRESS_CHARS)
}

/// Renders pipeline events on stderr.
pub struct ClipProgress {
    bar:      ProgressBar,
    encoding: bool,
}

impl ClipProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = ProgressBar::new(0).with_style(style(SAMPLING_TEMPLATE));
        bar.set_draw_target(if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        });
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("sampling");
        Self {
            bar,
            encoding: false,
        }
    }

    pub fn update(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Sampling { captured, total } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(*captured as u64);
            },
            PipelineEvent::Sampled { frames, width, height, degradation } => {
                let note = degradation.map_or_else(String::new, |d| format!(" ({d})"));
                self.bar
                    .println(format!("sampled {frames} frames at {width}x{height}{note}"));
            },
            PipelineEvent::Selected { backend, reason } => {
                self.bar.println(format!("encoder: {backend} ({reason})"));
            },
            PipelineEvent::Encoding(progress) => {
                if !self.encoding {
                    self.encoding = true;
                    self.bar.set_style(style(ENCODING_TEMPLATE));
                    self.bar.set_length(100);
                    self.bar.reset();
                }
                self.bar.set_message(<&'static str>::from(progress.stage));
                self.bar.set_position(u64::from(progress.percentage));
                if progress.stage == Stage::Completed {
                    self.bar.finish();
                }
            },
            PipelineEvent::Validated(meta) => {
                self.bar.println(format!(
                    "validated: {} frames, {:.2}s, {} bytes",
                    meta.frame_count, meta.duration, meta.file_size
                ));
            },
        }
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
