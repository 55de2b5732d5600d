//! City Eye edge runner.
//!
//! Reads frames, tracks and counts zone crossings, stores results locally
//! and syncs them in batches through the outbox channel.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use cityeye::channel::{CloudChannel, CommandRouter, DirObjectStore, InboxWatcher, SpoolChannel, Topics};
use cityeye::config::{AppConfig, SourceKind};
use cityeye::inference::{Detector, InferenceStage, NullClassifier, ReplayDetector};
use cityeye::lifecycle::ShutdownSignal;
use cityeye::pipeline::{CityEyeSolution, PipelineController, SolutionContext};
use cityeye::source::{BlankSource, FrameSource, PixelFormat, RawVideoSource};
use cityeye::sync::BatchSyncHandler;
use cityeye::telemetry::{LogFormat, init_tracing};
use cityeye::{LabelTable, LocalStore, ZoneCounter};

#[derive(Parser, Debug)]
#[command(author, version, about = "City Eye edge video analytics", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device identifier used in topics and capture keys
    #[arg(long)]
    device_id: Option<String>,

    /// Zone (xlines) configuration file
    #[arg(long)]
    xlines: Option<PathBuf>,

    /// SQLite result database
    #[arg(long)]
    db: Option<PathBuf>,

    /// Raw RGB24 video file; without it synthetic frames are used
    #[arg(long)]
    video: Option<PathBuf>,

    /// Recorded detections (JSON Lines) to replay
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Number of synthetic frames
    #[arg(long)]
    frames: Option<u64>,

    /// Log format: pretty or json (defaults to LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(device_id) = &self.device_id {
            config.device_id = device_id.clone();
        }
        if let Some(path) = &self.xlines {
            config.xlines_path = path.clone();
        }
        if let Some(path) = &self.db {
            config.db_path = path.clone();
        }
        if let Some(path) = &self.video {
            config.source.kind = SourceKind::Raw;
            config.source.path = Some(path.clone());
        }
        if let Some(path) = &self.detections {
            config.detections_path = Some(path.clone());
        }
        if let Some(frames) = self.frames {
            config.source.frames = frames;
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid CITYEYE_* environment override")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_source(config: &AppConfig) -> Result<Box<dyn FrameSource>> {
    let source = &config.source;
    let boxed: Box<dyn FrameSource> = match source.kind {
        SourceKind::Blank => Box::new(BlankSource::new(source.width, source.height, source.frames)),
        SourceKind::Raw => {
            let path = source
                .path
                .clone()
                .context("source.path is required for a raw source")?;
            let raw = RawVideoSource::new(path, source.width, source.height, PixelFormat::Rgb24);
            match source.fps {
                Some(fps) => Box::new(raw.with_fps(fps)),
                None => Box::new(raw),
            }
        }
    };
    Ok(boxed)
}

fn build_detector(config: &AppConfig) -> Result<Box<dyn Detector>> {
    match &config.detections_path {
        Some(path) => {
            let detector = ReplayDetector::load(path)
                .with_context(|| format!("Failed to load detections from {}", path.display()))?;
            Ok(Box::new(detector))
        }
        None => {
            warn!("No detections configured, running with an empty detector");
            Ok(Box::new(ReplayDetector::default()))
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_format.unwrap_or_else(LogFormat::from_env))
        .context("Failed to initialize logging")?;

    let config = load_config(&args)?;
    info!(
        device = %config.device_id,
        solution = %config.solution_id,
        xlines = %config.xlines_path.display(),
        db = %config.db_path.display(),
        "Starting City Eye"
    );

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        // SIGINT, SIGTERM and SIGHUP; a second signal forces the exit.
        if let Err(err) = ctrlc::set_handler(move || {
            if shutdown.request() >= 2 {
                eprintln!("Forced exit");
                std::process::exit(130);
            }
        }) {
            warn!("Failed to install termination signal handler: {err}");
        }
    }

    for dir in [&config.outbox_dir, &config.capture_dir, &config.inbox_dir] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let store = Arc::new(
        LocalStore::open(&config.db_path)
            .with_context(|| format!("Failed to open store {}", config.db_path.display()))?,
    );
    let channel: Arc<dyn CloudChannel> =
        Arc::new(SpoolChannel::open(&config.outbox_dir).context("Failed to open outbox")?);
    let objects = Arc::new(DirObjectStore::new(&config.capture_dir));
    let topics = Topics::for_device(&config.device_id);

    let counter = ZoneCounter::from_file(&config.xlines_path, LabelTable::standard(), config.counter.clone())
        .with_context(|| format!("Failed to load zones from {}", config.xlines_path.display()))?;

    let mut controller = PipelineController::new(
        config.pipeline.clone(),
        config.tracker.clone(),
        shutdown.clone(),
    );

    let ctx = SolutionContext {
        device_id: config.device_id.clone(),
        solution_id: config.solution_id.clone(),
        topics: topics.clone(),
        channel: channel.clone(),
        objects,
        store: store.clone(),
        latest_frame: controller.latest_frame(),
    };
    let solution = CityEyeSolution::new(ctx, counter, config.xlines_path.clone());
    let inference = InferenceStage::new(
        build_detector(&config)?,
        Box::new(NullClassifier),
        config.pipeline.inference_batch_size,
        config.pipeline.confidence_threshold,
    );

    controller
        .init(build_source(&config)?, inference, Box::new(solution))
        .context("Failed to initialize pipeline")?;

    let sync = BatchSyncHandler::start(store.clone(), channel.clone(), topics.sync.clone(), config.sync.clone())
        .context("Failed to start batch sync")?;
    let router = Arc::new(CommandRouter::new(controller.command_sender()));
    let mut inbox = InboxWatcher::new(
        &config.inbox_dir,
        router,
        Duration::from_millis(config.inbox_poll_ms),
    )
    .spawn()
    .context("Failed to start inbox watcher")?;

    controller.start().context("Failed to start pipeline")?;
    let outcome = controller.run();

    let timeout = config.pipeline.join_timeout();
    inbox.stop(timeout);
    if !sync.stop(timeout) {
        warn!("Batch sync did not stop cleanly");
    }

    match store.unsynced_count() {
        Ok(pending) => info!(pending, "Unsynced rows left for the next run"),
        Err(e) => error!("Failed to count unsynced rows: {}", e),
    }
    info!(?outcome, "City Eye stopped");

    let code = outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
