// SPDX-License-Identifier: GPL-3.0-only

//! Scan engine configuration
//!
//! Persisted as JSON in the user's config directory. Missing fields take
//! their defaults, so older files keep loading as options are added.

use crate::backends::camera::types::FocusMode;
use crate::constants::{self, decode, preview, timing};
use crate::errors::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Re-trigger auto-focus periodically while scanning
    pub auto_focus: bool,
    /// Delay between auto-focus cycles in milliseconds
    pub auto_focus_interval_ms: u64,
    /// Focus modes that need explicit auto-focus calls
    pub focus_modes_calling_af: Vec<FocusMode>,
    /// Bound on waiting for the decode worker during stop, in milliseconds
    pub worker_join_timeout_ms: u64,
    /// Render a thumbnail of the scan window on success
    pub thumbnails: bool,
    /// JPEG quality of success thumbnails (1-100)
    pub thumbnail_quality: u8,
    /// Smallest preview size (in pixels) considered when negotiating
    pub min_preview_pixels: u64,
    /// Fraction of the rotated frame covered by the default scan window
    pub frame_ratio: f32,
    /// Keep the default scan window square
    pub square_frame: bool,
    /// Target height album images are downsampled to
    pub album_target_height: u32,
    /// Frame interval of the virtual camera in milliseconds
    pub virtual_frame_interval_ms: u64,
}

/// Alias used throughout the engine
pub type ScanConfig = Config;

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_focus: true,
            auto_focus_interval_ms: timing::AUTO_FOCUS_INTERVAL.as_millis() as u64,
            focus_modes_calling_af: constants::FOCUS_MODES_CALLING_AF.to_vec(),
            worker_join_timeout_ms: timing::WORKER_JOIN_TIMEOUT.as_millis() as u64,
            thumbnails: true,
            thumbnail_quality: decode::THUMBNAIL_QUALITY,
            min_preview_pixels: preview::MIN_PREVIEW_PIXELS,
            frame_ratio: preview::FRAME_RATIO,
            square_frame: true,
            album_target_height: decode::ALBUM_TARGET_HEIGHT,
            virtual_frame_interval_ms: timing::VIRTUAL_FRAME_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn auto_focus_interval(&self) -> Duration {
        Duration::from_millis(self.auto_focus_interval_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }

    pub fn virtual_frame_interval(&self) -> Duration {
        Duration::from_millis(self.virtual_frame_interval_ms)
    }

    /// Default location: `<config dir>/scan/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::APP_NAME)
                .join(constants::CONFIG_FILE_NAME)
        })
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> ScanResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default location
    pub fn load_default() -> ScanResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> ScanResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> ScanResult<()> {
        if !(1..=100).contains(&self.thumbnail_quality) {
            return Err(ScanError::Config(format!(
                "thumbnail_quality must be 1-100, got {}",
                self.thumbnail_quality
            )));
        }
        if !(self.frame_ratio > 0.0 && self.frame_ratio <= 1.0) {
            return Err(ScanError::Config(format!(
                "frame_ratio must be in (0, 1], got {}",
                self.frame_ratio
            )));
        }
        if self.album_target_height == 0 {
            return Err(ScanError::Config(
                "album_target_height must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
