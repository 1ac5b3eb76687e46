use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Precondition violations reported by [`crate::topk::TopK`].
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SelectError {
    #[error("top-k capacity must be positive, got {0}")]
    InvalidCapacity(usize),
    #[error("score {0} is not a finite number")]
    InvalidScore(f64),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open frame source: {0}")]
    Open(String),
    /// A single read failed; the caller may skip it and keep going.
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),
    #[error("frame source exhausted")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model {0} not found and no repository configured")]
    ModelMissing(PathBuf),
    #[error("failed to download model: {0}")]
    ModelFetch(String),
    #[error("model graph missing")]
    GraphMissing,
    #[error("model output {0} missing")]
    OutputMissing(String),
    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<usize>),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Everything a CLI command can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("failed to write config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode config: {0}")]
    ConfigEncode(#[from] serde_json::Error),
}
