use crate::camera::{CameraSource, DirectorySource, FrameSource};
use crate::config::{load_config, save_config, CaptureConfig, Config, InferenceConfig, ScorerKind};
use crate::error::Error;
use crate::inference::{run_folders, OnnxTranslator};
use crate::persist::save_report;
use crate::scoring::{BlueIntensity, Clarity, Scorer};
use crate::session::{CaptureSession, SessionLimits};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "space-hawks",
    version,
    about = "Camera frame picker and folder inference runner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the camera and keep the best scoring frames
    Capture(CaptureArgs),
    /// Run the image-to-image model over image folders
    Infer(InferArgs),
    /// Print the effective configuration
    Config {
        /// Write the defaults to the config path instead
        #[arg(long)]
        write: bool,
    },
}

#[derive(clap::Args, Debug, Default, PartialEq)]
pub struct CaptureArgs {
    /// Session length in seconds
    #[arg(short, long)]
    pub duration: Option<u64>,
    /// Number of frames to keep
    #[arg(short = 'k', long)]
    pub capacity: Option<usize>,
    /// Camera index
    #[arg(short, long)]
    pub camera: Option<u32>,
    /// Read frames from a directory instead of the camera
    #[arg(long)]
    pub frames: Option<PathBuf>,
    /// How frames are scored
    #[arg(long, value_enum)]
    pub scorer: Option<ScorerKind>,
    /// Directory the kept frames are written to
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,
    /// Also write per-frame colour statistics
    #[arg(long)]
    pub stats: bool,
}

impl CaptureArgs {
    pub fn apply(&self, cfg: &mut CaptureConfig) {
        if let Some(d) = self.duration {
            cfg.duration_secs = d;
        }
        if let Some(k) = self.capacity {
            cfg.capacity = k;
        }
        if let Some(c) = self.camera {
            cfg.camera_index = c;
        }
        if let Some(s) = self.scorer {
            cfg.scorer = s;
        }
        if let Some(o) = &self.output {
            cfg.output_dir = o.clone();
        }
        if self.stats {
            cfg.frame_stats = true;
        }
    }
}

#[derive(clap::Args, Debug, Default, PartialEq)]
pub struct InferArgs {
    /// Path to the ONNX model
    #[arg(short, long)]
    pub model: Option<PathBuf>,
    /// Hugging Face repository to download the model from
    #[arg(long)]
    pub repo: Option<String>,
    /// Directory holding the image folders
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Directory the cropped inputs and results are written to
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Model input size in pixels
    #[arg(short, long)]
    pub size: Option<u32>,
    /// Folder to process, may be repeated
    #[arg(short, long = "folder")]
    pub folders: Vec<String>,
}

impl InferArgs {
    pub fn apply(&self, cfg: &mut InferenceConfig) {
        if let Some(m) = &self.model {
            cfg.model = m.clone();
        }
        if self.repo.is_some() {
            cfg.model_repo = self.repo.clone();
        }
        if let Some(i) = &self.input {
            cfg.input_dir = i.clone();
        }
        if let Some(o) = &self.output {
            cfg.output_dir = o.clone();
        }
        if let Some(s) = self.size {
            cfg.image_size = s;
        }
        if !self.folders.is_empty() {
            cfg.folders = self.folders.clone();
        }
    }
}

pub fn run_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

pub fn execute(cli: Cli) -> Result<(), Error> {
    let mut cfg = load_config();
    match cli.command {
        Commands::Capture(args) => {
            args.apply(&mut cfg.capture);
            capture(&cfg.capture, args.frames.as_deref(), args.max_frames)
        }
        Commands::Infer(args) => {
            args.apply(&mut cfg.inference);
            infer(&cfg.inference)
        }
        Commands::Config { write } => show_config(&cfg, write),
    }
}

fn scorer_for(kind: ScorerKind) -> Box<dyn Scorer> {
    match kind {
        ScorerKind::Blue => Box::new(BlueIntensity),
        ScorerKind::Clarity => Box::new(Clarity),
    }
}

fn capture(
    cfg: &CaptureConfig,
    frames: Option<&std::path::Path>,
    max_frames: Option<usize>,
) -> Result<(), Error> {
    let source: Box<dyn FrameSource> = match frames {
        Some(dir) => Box::new(DirectorySource::new(dir)?),
        None => Box::new(CameraSource::open(
            cfg.camera_index,
            cfg.width,
            cfg.height,
            cfg.fps,
        )?),
    };
    let mut session = CaptureSession::new(source, scorer_for(cfg.scorer), cfg.capacity)?
        .with_frame_stats(cfg.frame_stats);
    let stop = session.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
        warn!("Ctrl-C will not end the session early: {e}");
    }

    session.run(SessionLimits {
        duration: Duration::from_secs(cfg.duration_secs),
        max_frames,
    });
    let report = session.finish();
    let written = save_report(&cfg.output_dir, &report)?;
    info!(files = written.len(), dir = %cfg.output_dir.display(), "frames saved");
    Ok(())
}

fn infer(cfg: &InferenceConfig) -> Result<(), Error> {
    let mut translator = OnnxTranslator::load(cfg)?;
    for (folder, summary) in run_folders(&mut translator, cfg)? {
        info!(folder = %folder, processed = summary.processed, skipped = summary.skipped, "folder processed");
    }
    Ok(())
}

fn show_config(cfg: &Config, write: bool) -> Result<(), Error> {
    if write {
        let defaults = Config::default();
        let path = save_config(&defaults).map_err(|source| Error::Config {
            path: crate::config::config_path(),
            source,
        })?;
        info!(path = %path.display(), "default config written");
        return Ok(());
    }
    println!("{}", render_config(cfg)?);
    Ok(())
}

/// Pretty JSON for `config` output.
pub fn render_config(cfg: &Config) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(cfg)?)
}
