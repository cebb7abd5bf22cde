// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

use crate::backends::camera::types::FocusMode;
use std::time::Duration;

/// Application name used for the config directory
pub const APP_NAME: &str = "scan";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Timing constants for the capture pipeline
pub mod timing {
    use super::Duration;

    /// Delay between auto-focus cycles
    pub const AUTO_FOCUS_INTERVAL: Duration = Duration::from_millis(2000);

    /// How long `stop()` waits for the decode worker to acknowledge quit
    pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

    /// Frame interval of the virtual camera (~30 fps)
    pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Time the virtual camera takes to report a focus cycle as complete
    pub const VIRTUAL_FOCUS_DURATION: Duration = Duration::from_millis(100);
}

/// Decode and thumbnail defaults
pub mod decode {
    /// Thumbnails sample every Nth pixel of the crop in each direction
    pub const THUMBNAIL_SCALE_FACTOR: u32 = 2;

    /// JPEG quality of success thumbnails
    pub const THUMBNAIL_QUALITY: u8 = 50;

    /// Album images are downsampled towards this height before decoding
    pub const ALBUM_TARGET_HEIGHT: u32 = 200;
}

/// Preview geometry defaults
pub mod preview {
    /// Preview sizes smaller than this are never chosen
    pub const MIN_PREVIEW_PIXELS: u64 = 480 * 320;

    /// Fraction of the rotated frame covered by the default scan window
    pub const FRAME_RATIO: f32 = 0.6;
}

/// Focus modes in which the device expects explicit auto-focus calls
///
/// Continuous modes focus on their own and must not be re-triggered.
pub const FOCUS_MODES_CALLING_AF: [FocusMode; 2] = [FocusMode::Auto, FocusMode::Macro];

/// Supported still image extensions for album decoding
pub mod file_formats {
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff"];

    /// Check if an extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}
