use std::{
    fs,
    panic,
    path::{Path, PathBuf},
    process,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clipgif_core::{
    read_metadata,
    Backend,
    BenchmarkResult,
    Capture,
    ClipRequest,
    FrameRelay,
    FrameSampler,
    OutputFormat,
    Pipeline,
    PipelineSettings,
    Preference,
    Quality,
    TestPattern,
    ThreadTransport,
};
use clipgif_logging::init_logging;
use tracing::{info, instrument, warn};

use crate::progress::ClipProgress;

mod progress;

fn main() -> anyhow::Result<()> {
    let orig_hook = panic::take_hook();
    // Catch panics in child threads
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));
    run()
}

/// Turn a window of video frames into an animated GIF
#[derive(Parser, Debug)]
#[clap(name = "clipgif", version)]
pub struct CliOpts {
    /// Pipeline settings file (JSON)
    ///
    /// Missing keys keep their defaults.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to a daily rotated file in this directory
    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture a window of the built-in test pattern and encode it
    Render(RenderArgs),
    /// List every encoder back-end and whether it can run here
    Encoders,
    /// Time a short synthetic encode on every available back-end
    Benchmark,
    /// Print the metadata of an existing GIF file
    Inspect {
        /// File to read
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Output file
    #[clap(short, long)]
    pub output: PathBuf,

    /// Window start, in seconds
    #[clap(long, default_value_t = 0.0)]
    pub start: f64,

    /// Window end, in seconds
    #[clap(long, default_value_t = 3.0)]
    pub end: f64,

    /// Frames sampled per second of window
    #[clap(long, default_value_t = 15)]
    pub fps: u32,

    /// low, medium, high or a number from 1 to 100
    #[clap(short, long, default_value = "medium")]
    pub quality: Quality,

    /// auto, fast, worker or fidelity
    #[clap(short, long, default_value = "auto")]
    pub encoder: Preference,

    /// Back-end to use when the named encoder is unavailable
    #[clap(long)]
    pub fallback: Option<Backend>,

    /// Output container
    #[clap(long, default_value = "gif")]
    pub format: OutputFormat,

    /// Exact output width. Requires --height.
    #[clap(long, requires = "height")]
    pub width: Option<u32>,

    /// Exact output height. Requires --width.
    #[clap(long, requires = "width")]
    pub height: Option<u32>,

    #[clap(long)]
    pub max_width: Option<u32>,

    #[clap(long)]
    pub max_height: Option<u32>,

    /// Play once instead of looping forever
    #[clap(long)]
    pub no_loop: bool,

    /// Capture through a frame relay thread instead of sampling directly
    ///
    /// Needs explicit --width and --height.
    #[clap(long)]
    pub relay: bool,

    /// Size and length of the test pattern, as WIDTHxHEIGHT
    #[clap(long, default_value = "640x360")]
    pub source_size: String,

    #[clap(long, default_value_t = 10.0)]
    pub source_duration: f64,

    /// Hide the progress bar
    #[clap(long)]
    pub quiet: bool,
}

impl RenderArgs {
    fn clip_request(&self) -> ClipRequest {
        ClipRequest {
            quality: self.quality,
            target: self.width.zip(self.height),
            max_width: self.max_width,
            max_height: self.max_height,
            looping: !self.no_loop,
            encoder: self.encoder,
            fallback: self.fallback,
            format: self.format,
            ..ClipRequest::new(self.start, self.end, self.fps)
        }
    }
}

fn parse_size(size: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got {size:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .with_context(|| format!("invalid dimension {v:?} in {size:?}"))
    };
    Ok((parse(w)?, parse(h)?))
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<PipelineSettings> {
    let settings = match path {
        Some(path) => PipelineSettings::load(path)?,
        None => PipelineSettings::default(),
    };
    settings.validate().context("Invalid pipeline settings")?;
    Ok(settings)
}

#[instrument(skip_all)]
fn render(pipeline: &Pipeline, args: &RenderArgs) -> anyhow::Result<()> {
    let (width, height) = parse_size(&args.source_size)?;
    let source = Box::new(TestPattern::new(width, height, args.source_duration));
    let capture = if args.relay {
        let transport = ThreadTransport::new(source, FrameSampler::new(pipeline.settings().yield_every));
        Capture::Relay(FrameRelay::new(Box::new(transport), pipeline.settings()))
    } else {
        Capture::Direct(source)
    };

    let task = pipeline.spawn(capture, args.clip_request())?;
    let mut progress = ClipProgress::new(args.quiet);
    for event in task.events() {
        progress.update(&event);
    }

    let output = match task.wait() {
        Ok(output) => output,
        Err(e) => {
            progress.abandon();
            bail!("[{}] {e}", e.code());
        },
    };

    if let Some(degradation) = output.degradation {
        warn!("output uses placeholder frames: {degradation}");
    }
    for recommendation in &output.result.performance.recommendations {
        warn!("{recommendation}");
    }

    fs::write(&args.output, &output.result.bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let meta = &output.result.metadata;
    info!(
        "wrote {} ({} frames, {}x{}, {} bytes, {:.0}% smaller than raw) in {:.2?}",
        args.output.display(),
        meta.frame_count,
        meta.width,
        meta.height,
        meta.file_size,
        output.result.performance.efficiency * 100.0,
        meta.encoding_time
    );
    Ok(())
}

fn benchmark(pipeline: &Pipeline) -> anyhow::Result<()> {
    let results = pipeline.registry().benchmark();
    match BenchmarkResult::fastest(&results) {
        Some(fastest) => info!("fastest available encoder: {fastest}"),
        None => warn!("no encoder completed the benchmark"),
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let meta = read_metadata(&bytes)?;
    if !meta.complete {
        warn!("{} is truncated", file.display());
    }
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli_args = CliOpts::parse();

    let _guard = init_logging(&cli_args.log_level, cli_args.log_dir.as_deref())?;

    let settings = load_settings(cli_args.config.as_deref())?;
    let pipeline = Pipeline::new(settings);

    match &cli_args.command {
        Command::Render(args) => render(&pipeline, args),
        Command::Encoders => {
            let descriptors = pipeline.registry().descriptors();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
            Ok(())
        },
        Command::Benchmark => benchmark(&pipeline),
        Command::Inspect { file } => inspect(file),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        CliOpts::command().debug_assert();
    }

    #[test]
    fn render_args_become_a_request() {
        let opts = CliOpts::parse_from([
            "clipgif", "render", "-o", "out.gif", "--start", "1", "--end", "2.5", "--fps", "20",
            "--encoder", "fast", "--fallback", "fidelity", "--width", "320", "--height", "180",
            "--no-loop",
        ]);
        let Command::Render(args) = opts.command else {
            panic!("expected render");
        };
        let request = args.clip_request();
        assert_eq!(request.start, 1.0);
        assert_eq!(request.end, 2.5);
        assert_eq!(request.frame_rate, 20);
        assert_eq!(request.encoder, Preference::Named(Backend::Fast));
        assert_eq!(request.fallback, Some(Backend::Fidelity));
        assert_eq!(request.target, Some((320, 180)));
        assert!(!request.looping);
    }

    #[test]
    fn width_needs_height() {
        let parsed = CliOpts::try_parse_from(["clipgif", "render", "-o", "x.gif", "--width", "10"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("640x360").unwrap(), (640, 360));
        assert_eq!(parse_size("32X24").unwrap(), (32, 24));
        assert!(parse_size("640").is_err());
        assert!(parse_size("ax1").is_err());
    }
}
