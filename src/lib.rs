pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod persist;
pub mod scoring;
pub mod session;
pub mod topk;

pub use cli::{execute, render_config, run_cli, CaptureArgs, Cli, Commands, InferArgs};
pub use config::{config_path, load_config, save_config, Config};
pub use error::{CaptureError, Error, InferenceError, PersistError, SelectError};
pub use session::{CaptureSession, CapturedFrame, FrameStats, SessionLimits, SessionReport};
pub use topk::{Candidate, Offer, TopK};
