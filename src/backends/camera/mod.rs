// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! The scan engine never talks to hardware directly. A device implements
//! [`FrameSource`] (preview lifecycle and one-shot frame delivery) and
//! [`FocusControl`] (auto-focus), and is driven through the coarse-locked
//! [`CameraManager`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ CaptureOrchestrator  │  ← Scan state machine
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐     ┌────────────────────┐
//! │    CameraManager     │ ◄── │ AutoFocusScheduler │
//! └──────────┬───────────┘     └────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ FrameSource +        │  ← Device implementation
//! │ FocusControl traits  │
//! └──────────────────────┘
//! ```

pub mod autofocus;
pub mod config_manager;
pub mod manager;
pub mod types;

pub use autofocus::AutoFocusScheduler;
pub use config_manager::{CameraConfigManager, DisplayInfo};
pub use manager::CameraManager;
pub use types::*;

/// Camera preview contract consumed by the scan pipeline
///
/// Callbacks may be invoked from any thread, including synchronously from
/// within the call that armed them.
pub trait FrameSource: Send {
    /// Open the device
    ///
    /// # Returns
    /// * `Ok(DeviceInfo)` - Facing and sensor orientation of the opened camera
    /// * `Err(BackendError)` - No camera, or the camera is in use
    fn open(&mut self) -> BackendResult<DeviceInfo>;

    /// Snapshot of the device's current parameters and capabilities
    fn parameters(&self) -> BackendResult<CameraParameters>;

    /// Apply a full parameter set in one call
    fn apply_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()>;

    /// Start streaming preview frames
    fn start_preview(&mut self) -> BackendResult<()>;

    /// Stop streaming preview frames
    fn stop_preview(&mut self);

    /// Arm a one-shot frame callback
    ///
    /// The device invokes `callback` at most once with the next preview
    /// buffer. Arming again before delivery is not supported.
    fn request_one_frame(&mut self, callback: FrameCallback);

    /// Release the device
    fn close(&mut self);
}

/// Auto-focus contract
pub trait FocusControl: Send {
    /// Start a focus cycle; `callback` fires once when it completes
    fn auto_focus(&mut self, callback: FocusCallback) -> BackendResult<()>;

    /// Abort an in-flight focus cycle
    fn cancel_auto_focus(&mut self) -> BackendResult<()>;
}

/// A complete camera device
pub trait CameraDevice: FrameSource + FocusControl {}

impl<T: FrameSource + FocusControl> CameraDevice for T {}
