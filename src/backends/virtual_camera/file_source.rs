// SPDX-License-Identifier: GPL-3.0-only

//! Image files as virtual camera frames

use crate::backends::camera::types::{BackendError, BackendResult};
use crate::constants::file_formats;
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load an image file as a greyscale frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<GrayImage> {
    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        BackendError::Other(format!("Failed to load image '{}': {}", path.display(), e))
    })?;

    let gray = img.to_luma8();
    debug!(width = gray.width(), height = gray.height(), "Image loaded successfully");
    Ok(gray)
}

/// Check if a path has a supported image extension
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(file_formats::is_image_extension)
        .unwrap_or(false)
}

/// Expand files and directories into a sorted list of image paths
pub fn collect_image_paths(inputs: &[PathBuf]) -> BackendResult<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for path in inputs {
        if path.is_dir() {
            let entries = std::fs::read_dir(path)
                .map_err(|e| BackendError::Other(format!("{}: {}", path.display(), e)))?;
            for entry in entries {
                let entry = entry.map_err(|e| BackendError::Other(e.to_string()))?;
                let file_path = entry.path();
                if is_supported_image(&file_path) {
                    paths.push(file_path);
                }
            }
        } else if is_supported_image(path) {
            paths.push(path.clone());
        }
    }

    // Sort by filename for consistent ordering
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Load every image in `paths`, in order
pub fn load_frames(paths: &[PathBuf]) -> BackendResult<Vec<GrayImage>> {
    paths.iter().map(|path| load_image_as_frame(path)).collect()
}
