//! Image-to-image inference over folders of JPEG files.
//!
//! Every `*.jpg` in `<input>/<folder>` is centre-cropped to a square,
//! resized to the model input size and run through an [`ImageTranslator`].
//! The cropped input lands in `<output>/<folder>/originalCropped` and the
//! model output in `<output>/<folder>/inferenceResult`, both named by the
//! file's position in the sorted listing.

use crate::camera::list_files;
use crate::config::{InferenceConfig, TensorLayout};
use crate::error::InferenceError;
use crate::persist::{ensure_dir, save_jpeg};
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use hf_hub::api::sync::Api;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub trait ImageTranslator {
    fn translate(&mut self, input: &RgbImage) -> Result<RgbImage, InferenceError>;
}

/// Crops the central square along the longer axis, then resizes to `size`×`size`.
pub fn preprocess(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let side = w.min(h);
    let (x, y) = if h > w {
        (0, (h - w) / 2)
    } else {
        ((w - h) / 2, 0)
    };
    let square = imageops::crop_imm(img, x, y, side, side).to_image();
    imageops::resize(&square, size, size, FilterType::Triangle)
}

/// RGB bytes to a batched f32 tensor in [0, 1].
pub fn image_to_tensor(
    img: &RgbImage,
    layout: TensorLayout,
    device: &Device,
) -> Result<Tensor, InferenceError> {
    let (w, h) = img.dimensions();
    let t = Tensor::from_vec(img.as_raw().clone(), (h as usize, w as usize, 3), device)?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;
    let t = match layout {
        TensorLayout::Nchw => t.permute((2, 0, 1))?,
        TensorLayout::Nhwc => t,
    };
    Ok(t.unsqueeze(0)?)
}

/// Model output in [0, 1] back to RGB bytes, scaled by 255 and truncated.
/// Accepts HWC or CHW, with or without a leading batch dimension of one.
pub fn tensor_to_image(output: &Tensor) -> Result<RgbImage, InferenceError> {
    let t = if output.rank() == 4 {
        output.squeeze(0)?
    } else {
        output.clone()
    };
    let dims = t.dims().to_vec();
    let t = match dims.as_slice() {
        [_, _, 3] => t,
        [3, _, _] => t.permute((1, 2, 0))?,
        _ => return Err(InferenceError::OutputShape(output.dims().to_vec())),
    };
    let (h, w, _) = t.dims3()?;
    let data = t
        .to_dtype(DType::F32)?
        .affine(255.0, 0.0)?
        .clamp(0f32, 255f32)?
        .to_dtype(DType::U8)?
        .flatten_all()?
        .to_vec1::<u8>()?;
    RgbImage::from_raw(w as u32, h as u32, data).ok_or(InferenceError::OutputShape(dims))
}

/// Local model path, or a download from `repo` when the file is missing.
pub fn resolve_model(model: &Path, repo: Option<&str>) -> Result<PathBuf, InferenceError> {
    if model.exists() {
        return Ok(model.to_path_buf());
    }
    let repo = repo.ok_or_else(|| InferenceError::ModelMissing(model.to_path_buf()))?;
    debug!(repo, model = %model.display(), "downloading model");
    Api::new()
        .and_then(|api| api.model(repo.to_string()).get(&model.to_string_lossy()))
        .map_err(|e| InferenceError::ModelFetch(e.to_string()))
}

/// ONNX image-to-image model evaluated on the CPU with candle.
pub struct OnnxTranslator {
    model: onnx::ModelProto,
    input_name: String,
    output_name: String,
    layout: TensorLayout,
    device: Device,
}

impl OnnxTranslator {
    pub fn load(cfg: &InferenceConfig) -> Result<Self, InferenceError> {
        let path = resolve_model(&cfg.model, cfg.model_repo.as_deref())?;
        let model = read_file(&path)?;
        let graph = model.graph.as_ref().ok_or(InferenceError::GraphMissing)?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or(InferenceError::GraphMissing)?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or(InferenceError::GraphMissing)?;
        info!(path = %path.display(), input = %input_name, output = %output_name, "model loaded");
        Ok(Self {
            model,
            input_name,
            output_name,
            layout: cfg.layout,
            device: Device::Cpu,
        })
    }
}

impl ImageTranslator for OnnxTranslator {
    fn translate(&mut self, input: &RgbImage) -> Result<RgbImage, InferenceError> {
        let tensor = image_to_tensor(input, self.layout, &self.device)?;
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), tensor);
        let mut outputs = simple_eval(&self.model, inputs)?;
        let output = outputs
            .remove(&self.output_name)
            .ok_or_else(|| InferenceError::OutputMissing(self.output_name.clone()))?;
        tensor_to_image(&output)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// `*.jpg` files of `dir`, sorted by name.
pub fn jpeg_files(dir: &Path) -> Vec<PathBuf> {
    list_files(dir)
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "jpg"))
        .collect()
}

pub fn run_folder<T: ImageTranslator + ?Sized>(
    translator: &mut T,
    folder: &str,
    cfg: &InferenceConfig,
) -> Result<FolderSummary, InferenceError> {
    let input = cfg.input_dir.join(folder);
    if !input.is_dir() {
        warn!(folder = %input.display(), "input folder missing, skipping");
        return Ok(FolderSummary::default());
    }
    let cropped_dir = cfg.output_dir.join(folder).join("originalCropped");
    let result_dir = cfg.output_dir.join(folder).join("inferenceResult");
    ensure_dir(&cropped_dir)?;
    ensure_dir(&result_dir)?;

    let mut summary = FolderSummary::default();
    for (index, path) in jpeg_files(&input).iter().enumerate() {
        let img = match image::open(path) {
            Ok(i) => i.into_rgb8(),
            Err(e) => {
                error!(path = %path.display(), "failed to read image: {e}");
                summary.skipped += 1;
                continue;
            }
        };
        let cropped = preprocess(&img, cfg.image_size);
        save_jpeg(&cropped, &cropped_dir.join(format!("original_image_{index}.jpg")))?;
        let output = match translator.translate(&cropped) {
            Ok(o) => o,
            Err(e) => {
                error!(path = %path.display(), "inference failed: {e}");
                summary.skipped += 1;
                continue;
            }
        };
        let out_path = result_dir.join(format!("inference_result_{index}.jpg"));
        save_jpeg(&output, &out_path)?;
        info!(index, path = %out_path.display(), "inference result saved");
        summary.processed += 1;
    }
    Ok(summary)
}

/// Runs every configured folder, returning per-folder summaries in order.
pub fn run_folders<T: ImageTranslator + ?Sized>(
    translator: &mut T,
    cfg: &InferenceConfig,
) -> Result<Vec<(String, FolderSummary)>, InferenceError> {
    let mut summaries = Vec::with_capacity(cfg.folders.len());
    for folder in &cfg.folders {
        let summary = run_folder(translator, folder, cfg)?;
        debug!(folder = %folder, processed = summary.processed, skipped = summary.skipped, "folder done");
        summaries.push((folder.clone(), summary));
    }
    Ok(summaries)
}
