use crate::error::PersistError;
use crate::session::{FrameStats, SessionReport};
use image::RgbImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the JSON-lines log holding one [`FrameStats`] record per frame.
pub const FRAME_STATS_FILE: &str = "frame_stats.jsonl";

/// File name used for a retained frame: `{label}_{slot + 1}.jpg`.
pub fn frame_file_name(label: &str, slot: usize) -> String {
    format!("{label}_{}.jpg", slot + 1)
}

pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

pub fn save_jpeg(img: &RgbImage, path: &Path) -> Result<(), PersistError> {
    img.save_with_format(path, image::ImageFormat::Jpeg)
        .map_err(|source| PersistError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes `records` to `path`, one JSON object per line.
pub fn save_frame_stats(path: &Path, records: &[FrameStats]) -> Result<(), PersistError> {
    let write = || -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for record in records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    };
    write().map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes every populated slot of the report into `dir`, plus the frame
/// statistics log when the report carries any.
pub fn save_report(dir: &Path, report: &SessionReport) -> Result<Vec<PathBuf>, PersistError> {
    ensure_dir(dir)?;
    let mut written = Vec::new();
    for (label, slots) in &report.selections {
        for (slot, candidate) in slots.iter().enumerate() {
            let Some(candidate) = candidate else {
                continue;
            };
            let path = dir.join(frame_file_name(label, slot));
            save_jpeg(&candidate.payload.image, &path)?;
            info!(
                path = %path.display(),
                score = candidate.score,
                captured_at = %candidate.payload.captured_at,
                "saved frame"
            );
            written.push(path);
        }
    }
    if !report.frame_stats.is_empty() {
        let path = dir.join(FRAME_STATS_FILE);
        save_frame_stats(&path, &report.frame_stats)?;
        info!(path = %path.display(), frames = report.frame_stats.len(), "saved frame statistics");
        written.push(path);
    }
    Ok(written)
}
