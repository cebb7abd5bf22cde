// SPDX-License-Identifier: GPL-3.0-only

//! Core types for scan results
//!
//! These types carry decode outcomes from the worker back to the capture
//! orchestrator, and successful scans on to the host.

use crate::errors::ScanError;

/// Small JPEG rendering of the scan window at the moment of a successful decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// JPEG-encoded greyscale image
    pub jpeg: Vec<u8>,
}

/// A successfully decoded barcode
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeResult {
    /// Decoded text
    pub text: String,
    /// Rendering of the scan window, if one could be produced
    pub thumbnail: Option<Thumbnail>,
    /// Thumbnail width divided by scan window width (0 without a thumbnail)
    pub scale_factor: f32,
}

impl BarcodeResult {
    /// Result with text only
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thumbnail: None,
            scale_factor: 0.0,
        }
    }
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeResult {
    Success(BarcodeResult),
    Failure(ScanError),
}

impl DecodeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DecodeResult::Success(_))
    }
}

/// Scan session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Never started
    #[default]
    Idle,
    /// One frame request is outstanding
    AwaitingFrame,
    /// One frame is with the decode worker
    Decoding,
    /// A result was delivered; no more frames until restart
    Success,
    /// Torn down; `start()` may begin a new session
    Stopped,
}

impl CaptureState {
    /// Whether a session is live
    pub fn is_running(&self) -> bool {
        !matches!(self, CaptureState::Idle | CaptureState::Stopped)
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingFrame => "awaiting-frame",
            CaptureState::Decoding => "decoding",
            CaptureState::Success => "success",
            CaptureState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Receives scan outcomes
///
/// Methods are called from the capture dispatcher thread (or the album
/// thread), never while engine locks are held.
pub trait ScanListener: Send + Sync {
    /// A barcode was decoded; called once per successful scan
    fn on_scan_result(&self, result: &BarcodeResult);

    /// Scanning (re)started and frames are being requested
    fn on_preview_restarted(&self) {}

    /// A still image yielded no barcode
    fn on_decode_failure(&self) {}
}
