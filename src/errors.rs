// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scan engine
//!
//! Only [`ScanError::DeviceUnavailable`] ever reaches the host as a terminal
//! condition. Everything raised on the decode path is folded back into the
//! continuous scanning loop as a [`DecodeResult::Failure`].
//!
//! [`DecodeResult::Failure`]: crate::frame_processor::DecodeResult::Failure

use crate::backends::camera::types::BackendError;
use std::fmt;
use std::time::Duration;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Main scan engine error type
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// No camera, or the camera could not be opened or configured
    DeviceUnavailable(String),
    /// Crop rectangle does not fit the frame (or the frame is malformed)
    FrameRejected(FrameRejection),
    /// The decoder found no symbol in the frame
    DecodeFailure(String),
    /// The decoder ran out of memory while decoding
    ResourceExhaustion,
    /// The decode worker did not acknowledge quit within the bound
    WorkerShutdownTimeout(Duration),
    /// The decode worker could not be started
    WorkerUnavailable(String),
    /// Configuration errors
    Config(String),
    /// Image loading or encoding errors
    Image(String),
    /// Filesystem errors
    Io(String),
}

/// Why a frame never reached the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    /// No preview rectangle has been configured yet
    NoPreviewRect,
    /// The preview rectangle fits neither frame orientation
    CropOutOfBounds {
        frame_width: u32,
        frame_height: u32,
    },
    /// The buffer holds fewer bytes than `width * height`
    ShortBuffer { expected: usize, actual: usize },
}

/// Errors reported by a [`BarcodeDecoder`](crate::frame_processor::BarcodeDecoder)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No barcode was located
    NotFound,
    /// A symbol was located but could not be read
    Unreadable(String),
    /// Allocation failed inside the decoder
    ResourceExhausted,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::DeviceUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            ScanError::FrameRejected(reason) => write!(f, "Frame rejected: {}", reason),
            ScanError::DecodeFailure(msg) => write!(f, "Decode failed: {}", msg),
            ScanError::ResourceExhaustion => write!(f, "Decoder ran out of memory"),
            ScanError::WorkerShutdownTimeout(timeout) => write!(
                f,
                "Decode worker did not stop within {}ms",
                timeout.as_millis()
            ),
            ScanError::WorkerUnavailable(msg) => write!(f, "Decode worker unavailable: {}", msg),
            ScanError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ScanError::Image(msg) => write!(f, "Image error: {}", msg),
            ScanError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRejection::NoPreviewRect => write!(f, "no preview rectangle"),
            FrameRejection::CropOutOfBounds {
                frame_width,
                frame_height,
            } => write!(
                f,
                "preview rectangle outside {}x{} frame",
                frame_width, frame_height
            ),
            FrameRejection::ShortBuffer { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotFound => write!(f, "no barcode found"),
            DecodeError::Unreadable(msg) => write!(f, "unreadable barcode: {}", msg),
            DecodeError::ResourceExhausted => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for ScanError {}
impl std::error::Error for DecodeError {}

impl ScanError {
    /// Whether the error ends the scan session rather than the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanError::DeviceUnavailable(_) | ScanError::WorkerUnavailable(_)
        )
    }
}

impl From<DecodeError> for ScanError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::ResourceExhausted => ScanError::ResourceExhaustion,
            other => ScanError::DecodeFailure(other.to_string()),
        }
    }
}

impl From<FrameRejection> for ScanError {
    fn from(reason: FrameRejection) -> Self {
        ScanError::FrameRejected(reason)
    }
}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        ScanError::DeviceUnavailable(err.to_string())
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::Image(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err.to_string())
    }
}
