//! Detection snapshot artifacts.

use anyhow::{Context, Result};
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::{Path, PathBuf};

use crate::detect::{annotate, Detection};
use crate::frame::Frame;

const JPEG_QUALITY: u8 = 95;

/// Write `frame`, with detection boxes burned in, as a JPEG under `dir`.
/// Returns the path of the written artifact.
pub fn save_snapshot(frame: &Frame, detections: &[Detection], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create artifact directory {}", dir.display()))?;
    let path = dir.join(artifact_name(frame.seq));

    let annotated = annotate(frame, detections);
    let mut jpeg = Vec::with_capacity(annotated.len() / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode(&annotated, frame.width, frame.height, ExtendedColorType::Rgb8)
        .context("encode snapshot jpeg")?;
    std::fs::write(&path, &jpeg)
        .with_context(|| format!("write snapshot {}", path.display()))?;
    Ok(path)
}

/// `detection_YYYYmmdd_HHMMSS_<seq>.jpg`. The frame sequence number keeps
/// names unique when two alerts land within the same second.
fn artifact_name(seq: u64) -> String {
    format!(
        "detection_{}_{}.jpg",
        Local::now().format("%Y%m%d_%H%M%S"),
        seq
    )
}
