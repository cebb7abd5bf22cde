// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Raw preview buffer as delivered by the device
///
/// The first `width * height` bytes are the luminance plane. Devices that
/// deliver semi-planar YUV (NV21 and friends) may append chroma planes, which
/// the scan pipeline ignores.
pub type FrameData = Arc<[u8]>;

/// One-shot frame delivery callback
pub type FrameCallback = Box<dyn FnOnce(FrameData) + Send>;

/// Auto-focus completion callback (`true` when focus was achieved)
pub type FocusCallback = Box<dyn FnOnce(bool) + Send>;

/// Rotation in degrees (clockwise)
///
/// Camera sensors are usually mounted at 90° or 270° relative to the natural
/// display orientation, so preview frames need rotating before the scan
/// window can be cropped out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Create rotation from a degree value, normalised to 0-360.
    ///
    /// Returns `None` for angles that are not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }

    /// Compose two clockwise rotations
    pub fn then(self, other: Rotation) -> Rotation {
        // Both operands are multiples of 90, so the sum always maps back.
        Rotation::from_degrees((self.degrees() + other.degrees()) as i32).unwrap_or_default()
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    /// Same resolution with the axes exchanged
    pub fn swapped(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Landscape-normalised form (long side first)
    pub fn landscape(&self) -> Self {
        if self.is_portrait() {
            self.swapped()
        } else {
            *self
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sub-region of a frame, in pixels
///
/// The preview rectangle is the part of the (rotated) camera frame that lies
/// under the on-screen scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl PreviewRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge, saturating at `u32::MAX`
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    /// Bottom edge, saturating at `u32::MAX`
    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Whether the rectangle lies entirely inside a `width` x `height` area
    ///
    /// A rectangle whose edges overflow `u32` never fits.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.left.checked_add(self.width);
        let bottom = self.top.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }

    /// Translate by a signed offset, clamping to `0..=u32::MAX`
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        let shift = |origin: u32, delta: i32| {
            let moved = (origin as i64 + delta as i64).max(0);
            u32::try_from(moved).unwrap_or(u32::MAX)
        };
        Self {
            left: shift(self.left, dx),
            top: shift(self.top, dy),
            width: self.width,
            height: self.height,
        }
    }

    /// Rectangle centred in `area`, sized by `ratio` of each side
    ///
    /// With `square` set, both sides take the smaller of the two.
    pub fn centered(area: Resolution, ratio: f32, square: bool) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        let mut width = (area.width as f32 * ratio) as u32;
        let mut height = (area.height as f32 * ratio) as u32;
        if square {
            let side = width.min(height);
            width = side;
            height = side;
        }
        Self {
            left: (area.width - width) / 2,
            top: (area.height - height) / 2,
            width,
            height,
        }
    }
}

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

/// Device information reported when a camera is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device index
    pub index: u32,
    /// Human readable name
    pub name: String,
    pub facing: CameraFacing,
    /// Sensor mounting angle relative to the natural display orientation
    pub orientation: u32,
}

/// Focus modes a device may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    Auto,
    Macro,
    ContinuousPicture,
    ContinuousVideo,
    Edof,
    Fixed,
    Infinity,
}

/// Immutable snapshot of device capabilities and current settings
///
/// Devices are never mutated field by field: read a snapshot, derive the
/// desired one, apply it with a single call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraParameters {
    /// Currently configured preview size
    pub preview_size: Option<Resolution>,
    /// Preview sizes the device can deliver
    pub supported_preview_sizes: Vec<Resolution>,
    /// Currently configured focus mode
    pub focus_mode: Option<FocusMode>,
    /// Focus modes the device supports
    pub supported_focus_modes: Vec<FocusMode>,
}

impl CameraParameters {
    /// Serialize to a string that can later be restored with [`Self::unflatten`]
    pub fn flatten(&self) -> String {
        // Plain data with string keys, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Restore a snapshot produced by [`Self::flatten`]
    pub fn unflatten(flattened: &str) -> BackendResult<Self> {
        serde_json::from_str(flattened).map_err(|e| BackendError::Other(e.to_string()))
    }

    /// Copy with a different preview size
    pub fn with_preview_size(&self, size: Resolution) -> Self {
        Self {
            preview_size: Some(size),
            ..self.clone()
        }
    }
}

/// Geometry negotiated when the camera was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConfig {
    /// Frame size as delivered by the device
    pub resolution: Resolution,
    /// Size of the on-screen preview (resolution swapped to match the screen)
    pub preview_resolution: Resolution,
    /// Rotation to apply to frames before decoding
    pub rotation: Rotation,
    /// Scan window inside the rotated frame
    pub preview_rect: Option<PreviewRect>,
}

impl CameraConfig {
    /// Frame size after rotation has been applied
    pub fn rotated_resolution(&self) -> Resolution {
        if self.rotation.swaps_dimensions() {
            self.resolution.swapped()
        } else {
            self.resolution
        }
    }
}

/// A single preview frame from the camera
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Luminance plane (optionally followed by chroma)
    pub data: FrameData,
    /// Rotation to apply before decoding
    pub rotation: Rotation,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: FrameData, width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            data,
            rotation,
            captured_at: Instant::now(),
        }
    }

    /// Number of bytes in the luminance plane
    pub fn luminance_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Device refused a parameter set
    ParametersRejected(String),
    /// Device was not opened
    NotOpened,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::ParametersRejected(msg) => write!(f, "Parameters rejected: {}", msg),
            BackendError::NotOpened => write!(f, "Camera not opened"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
