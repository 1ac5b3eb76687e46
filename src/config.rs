use serde::{Deserialize, Serialize};
use std::{env, fs, io, path::PathBuf};
use tracing::{debug, warn};

/// How captured frames are scored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Sum of the blue channel
    Blue,
    /// Day/night colour clarity
    Clarity,
}

/// Memory order of the model input tensor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub duration_secs: u64,
    pub capacity: usize,
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub output_dir: PathBuf,
    pub scorer: ScorerKind,
    /// Write per-frame colour statistics next to the saved frames.
    pub frame_stats: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            capacity: 5,
            camera_index: 0,
            width: 1280,
            height: 720,
            fps: 30,
            output_dir: PathBuf::from("."),
            scorer: ScorerKind::Blue,
            frame_stats: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub model: PathBuf,
    /// Hugging Face repository to fetch `model` from when it is not on disk.
    pub model_repo: Option<String>,
    pub input_dir: PathBuf,
    pub folders: Vec<String>,
    pub output_dir: PathBuf,
    pub image_size: u32,
    pub layout: TensorLayout,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("pretrained_model/model.onnx"),
            model_repo: None,
            input_dir: PathBuf::from("."),
            folders: vec!["day".to_string(), "night".to_string()],
            output_dir: PathBuf::from("output"),
            image_size: 256,
            layout: TensorLayout::Nchw,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub inference: InferenceConfig,
}

pub fn config_path() -> PathBuf {
    env::var_os("SPACE_HAWKS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("space-hawks.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    let data = match fs::read(&path) {
        Ok(d) => d,
        Err(_) => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Config::default();
        }
    };
    match serde_json::from_slice(&data) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), "ignoring invalid config: {e}");
            Config::default()
        }
    }
}

pub fn save_config(cfg: &Config) -> io::Result<PathBuf> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    fs::write(&path, data)?;
    Ok(path)
}
