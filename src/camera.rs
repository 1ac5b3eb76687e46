use crate::error::CaptureError;
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace, warn};

/// Anything that yields RGB frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        (**self).next_frame()
    }
}

/// Live camera stream. The stream is stopped when the source is dropped.
pub struct CameraSource {
    cam: Camera,
}

impl CameraSource {
    pub fn open(index: u32, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        let mut cam = None;
        for (w, h) in [(width, height), (640, 480)] {
            for fmt in [FrameFormat::RAWRGB, FrameFormat::MJPEG, FrameFormat::YUYV] {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new_from(w, h, fmt, fps),
                ));
                match Camera::new(CameraIndex::Index(index), req) {
                    Ok(c) => {
                        cam = Some(c);
                        break;
                    }
                    Err(e) => trace!(width = w, height = h, ?fmt, "format rejected: {e}"),
                }
            }
            if cam.is_some() {
                break;
            }
        }
        let mut cam = match cam {
            Some(c) => c,
            None => {
                let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                Camera::new(CameraIndex::Index(index), format)
                    .map_err(|e| CaptureError::Open(e.to_string()))?
            }
        };
        cam.open_stream()
            .map_err(|e| CaptureError::Open(format!("stream: {e}")))?;
        debug!(index, format = ?cam.camera_format(), "camera stream opened");
        Ok(Self { cam })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| CaptureError::FrameUnavailable(format!("capture: {e}")))?;
        frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::FrameUnavailable(format!("decode: {e}")))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        match self.cam.stop_stream() {
            Ok(()) => debug!("camera stream released"),
            Err(e) => error!("failed to stop camera stream: {e}"),
        }
    }
}

/// Sorted list of regular files in `dir`; empty when it cannot be read.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut paths: Vec<PathBuf> = rd
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            paths.sort();
            paths
        }
        Err(e) => {
            warn!(dir = %dir.display(), "failed to list directory: {e}");
            Vec::new()
        }
    }
}

/// Replays the image files of a directory once, in name order.
pub struct DirectorySource {
    frames: Vec<PathBuf>,
    index: usize,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Result<Self, CaptureError> {
        if !dir.is_dir() {
            return Err(CaptureError::Open(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        let frames = list_files(dir);
        if frames.is_empty() {
            warn!(dir = %dir.display(), "no frames found");
        }
        Ok(Self { frames, index: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let path = self.frames.get(self.index).ok_or(CaptureError::Exhausted)?;
        self.index += 1;
        trace!(path = %path.display(), "reading frame");
        image::open(path)
            .map(|img| img.into_rgb8())
            .map_err(|e| CaptureError::FrameUnavailable(format!("{}: {e}", path.display())))
    }
}
