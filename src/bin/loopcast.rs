use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use loopcast::{
    CountdownRenderer, FfmpegLauncher, FfmpegSourceOpener, FfplayLauncher, SourceOpener,
    StopSignal, StreamConfig, Supervisor, SystemClock, is_tool_on_path, letterbox, probe_video,
    run_preview,
};

#[derive(Parser, Debug)]
#[command(name = "loopcast", version, about = "Looping countdown streamer")]
struct Cli {
    /// JSON config file. Relative asset paths resolve against its directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `countdown_secs`.
    #[arg(long, global = true)]
    countdown_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish the looping show to the configured ingest URL (Ctrl-C to stop).
    Stream(StreamArgs),
    /// Play the loop in a local window (requires `ffplay`; q quits).
    Preview,
    /// Render one composited countdown frame as a PNG.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct StreamArgs {
    /// Ingest URL including the stream key; overrides `output_url`.
    #[arg(long)]
    url: Option<String>,

    /// Publish video only, even if the audio source has a track.
    #[arg(long)]
    no_audio: bool,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// Seconds shown by the overlay; defaults to the full countdown.
    #[arg(long, allow_hyphen_values = true)]
    secs: Option<i64>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(cli.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = match cli.config.as_deref() {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    if let Some(secs) = cli.countdown_secs {
        cfg.countdown_secs = secs;
    }
    if let Command::Stream(args) = &cli.cmd
        && let Some(url) = args.url.clone()
    {
        cfg.output_url = Some(url);
    }
    cfg.validate().context("invalid configuration")?;
    verify_assets(&cfg)?;

    let cfg = Arc::new(cfg);
    match cli.cmd {
        Command::Stream(args) => cmd_stream(cfg, args),
        Command::Preview => cmd_preview(cfg),
        Command::Snapshot(args) => cmd_snapshot(cfg, args),
    }
}

fn verify_assets(cfg: &StreamConfig) -> anyhow::Result<()> {
    let missing = cfg.missing_assets();
    for path in &missing {
        tracing::error!("missing file: {}", path.display());
    }
    cfg.verify_assets()?;
    Ok(())
}

fn require_tools(tools: &[&str]) -> anyhow::Result<()> {
    for tool in tools {
        anyhow::ensure!(is_tool_on_path(tool), "'{tool}' is required but was not found on PATH");
    }
    Ok(())
}

fn cmd_stream(cfg: Arc<StreamConfig>, args: StreamArgs) -> anyhow::Result<()> {
    require_tools(&[cfg.encoder.program.as_str(), "ffmpeg", "ffprobe"])?;
    // Fail on a broken font now rather than on every relaunch.
    CountdownRenderer::for_config(&cfg)?;

    let mut launcher = FfmpegLauncher::new(Arc::clone(&cfg))?;
    if args.no_audio {
        launcher = launcher.without_audio();
    } else {
        let audio = probe_video(cfg.audio_path())
            .with_context(|| format!("probe audio source '{}'", cfg.audio_path().display()))?;
        if !audio.has_audio {
            tracing::warn!(
                "'{}' has no audio track; streaming video only",
                cfg.audio_path().display()
            );
            launcher = launcher.without_audio();
        }
    }

    let stop = StopSignal::new();
    stop.install_ctrlc()?;

    tracing::info!(
        resolution = %cfg.resolution.to_ffmpeg_size(),
        fps = %cfg.fps.to_ffmpeg_rate(),
        countdown_secs = cfg.countdown_secs,
        "connecting (Ctrl-C to quit)"
    );
    let report = Supervisor::new(
        Arc::clone(&cfg),
        launcher,
        FfmpegSourceOpener,
        SystemClock,
        stop,
    )
    .run()?;
    tracing::info!(
        sessions = report.sessions,
        frames = report.frames_written,
        "stream ended"
    );
    Ok(())
}

fn cmd_preview(cfg: Arc<StreamConfig>) -> anyhow::Result<()> {
    require_tools(&["ffplay", "ffmpeg", "ffprobe"])?;
    let stop = StopSignal::new();
    stop.install_ctrlc()?;
    let shown = run_preview(
        Arc::clone(&cfg),
        FfplayLauncher::new(Arc::clone(&cfg)),
        FfmpegSourceOpener,
        SystemClock,
        &stop,
    )?;
    tracing::info!(frames = shown, "preview closed");
    Ok(())
}

fn cmd_snapshot(cfg: Arc<StreamConfig>, args: SnapshotArgs) -> anyhow::Result<()> {
    require_tools(&["ffmpeg", "ffprobe"])?;
    let secs = args
        .secs
        .unwrap_or_else(|| i64::try_from(cfg.countdown_secs).unwrap_or(i64::MAX));

    let mut source = FfmpegSourceOpener.open(&cfg.background_video)?;
    let raw = source
        .next_frame()?
        .with_context(|| format!("'{}' has no frames", cfg.background_video.display()))?;
    let mut frame = letterbox(raw, cfg.resolution)?;
    CountdownRenderer::for_config(&cfg)?.overlay(&mut frame, secs)?;

    ensure_parent_dir(&args.out)?;
    frame
        .into_image()?
        .save(&args.out)
        .with_context(|| format!("write '{}'", args.out.display()))?;
    tracing::info!(out = %args.out.display(), secs, "snapshot written");
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
