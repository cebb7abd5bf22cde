// SPDX-License-Identifier: GPL-3.0-only

//! Camera lifecycle manager
//!
//! The manager provides:
//! - Device lifecycle (open, configure, preview, close)
//! - The single outstanding one-shot frame arm
//! - Thread-safe device access behind one coarse lock
//!
//! Device callbacks never take the manager lock. A frame callback captures
//! the negotiated geometry at arm time and only clears the arm flag before
//! handing the frame on.

use super::config_manager::{CameraConfigManager, DisplayInfo, camera_rotation};
use super::types::*;
use super::CameraDevice;
use crate::config::ScanConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Internal manager state
struct ManagerState {
    /// The device implementation
    device: Box<dyn CameraDevice>,
    config_manager: CameraConfigManager,
    display: DisplayInfo,
    /// Reported by the device on open
    info: Option<DeviceInfo>,
    /// Negotiated geometry, present while open
    config: Option<CameraConfig>,
    previewing: bool,
}

/// Camera device manager
///
/// Thread-safe and can be shared across threads.
#[derive(Clone)]
pub struct CameraManager {
    state: Arc<Mutex<ManagerState>>,
    /// Token of the outstanding one-shot frame request, 0 when none
    frame_armed: Arc<AtomicU64>,
    next_token: Arc<AtomicU64>,
}

impl CameraManager {
    /// Create a new manager around `device`
    pub fn new(device: Box<dyn CameraDevice>, config: &ScanConfig, display: DisplayInfo) -> Self {
        let (screen, screen_rotation) = (display.resolution, display.rotation);
        debug!(%screen, rotation = %screen_rotation, "Creating camera manager");

        let state = ManagerState {
            device,
            config_manager: CameraConfigManager::new(config),
            display,
            info: None,
            config: None,
            previewing: false,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            frame_armed: Arc::new(AtomicU64::new(0)),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open and configure the device
    ///
    /// Re-opening an open manager returns the current configuration. If
    /// configuration fails the device is closed again.
    pub fn open(&self) -> BackendResult<CameraConfig> {
        let mut state = self.lock();
        if let Some(config) = state.config {
            debug!("Camera already open");
            return Ok(config);
        }

        let info = state.device.open()?;
        info!(camera = %info.name, facing = ?info.facing, orientation = info.orientation, "Camera opened");

        match Self::configure(&mut state, &info) {
            Ok(config) => {
                state.info = Some(info);
                state.config = Some(config);
                Ok(config)
            }
            Err(e) => {
                warn!(error = %e, "Camera configuration failed, closing device");
                state.device.close();
                Err(e)
            }
        }
    }

    fn configure(state: &mut ManagerState, info: &DeviceInfo) -> BackendResult<CameraConfig> {
        let parameters = state.device.parameters()?;
        let mut config =
            state
                .config_manager
                .init_from_parameters(&parameters, info, &state.display)?;
        state
            .config_manager
            .apply_desired_parameters(state.device.as_mut(), &mut config)?;
        Ok(config)
    }

    /// Check if the device is open
    pub fn is_open(&self) -> bool {
        self.lock().config.is_some()
    }

    /// Information reported by the device when it was opened
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.lock().info.clone()
    }

    /// Negotiated geometry
    pub fn camera_config(&self) -> Option<CameraConfig> {
        self.lock().config
    }

    /// Start streaming preview frames
    pub fn start_preview(&self) -> BackendResult<()> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(BackendError::NotOpened);
        }
        if !state.previewing {
            state.device.start_preview()?;
            state.previewing = true;
            debug!("Preview started");
        }
        Ok(())
    }

    /// Stop streaming preview frames
    ///
    /// An outstanding frame arm is abandoned.
    pub fn stop_preview(&self) {
        let mut state = self.lock();
        if state.previewing {
            state.device.stop_preview();
            state.previewing = false;
            self.frame_armed.store(0, Ordering::SeqCst);
            debug!("Preview stopped");
        }
    }

    pub fn is_previewing(&self) -> bool {
        self.lock().previewing
    }

    /// Whether a one-shot frame request is outstanding
    pub fn is_frame_armed(&self) -> bool {
        self.frame_armed.load(Ordering::SeqCst) != 0
    }

    /// Arm a one-shot request for the next preview frame
    ///
    /// Returns `false` if the preview is not running or a request is already
    /// outstanding. `on_frame` runs on whatever thread the device delivers on
    /// and receives the buffer tagged with the negotiated size and rotation.
    pub fn request_preview_frame<F>(&self, on_frame: F) -> bool
    where
        F: FnOnce(Frame) + Send + 'static,
    {
        let mut state = self.lock();
        let Some(config) = state.config else {
            return false;
        };
        if !state.previewing {
            debug!("Frame requested while preview is stopped");
            return false;
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        if self
            .frame_armed
            .compare_exchange(0, token, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Frame request already outstanding");
            return false;
        }

        // A callback abandoned by stop_preview may still fire later; it must
        // not release a newer arm.
        let armed = Arc::clone(&self.frame_armed);
        let resolution = config.resolution;
        let rotation = config.rotation;
        state.device.request_one_frame(Box::new(move |data: FrameData| {
            let _ = armed.compare_exchange(token, 0, Ordering::SeqCst, Ordering::SeqCst);
            on_frame(Frame::new(data, resolution.width, resolution.height, rotation));
        }));
        true
    }

    /// Place the scan window
    ///
    /// `rect` is in the coordinates of the host's scan view of size `view`.
    /// The preview is centred behind that view, so the rectangle is shifted
    /// by half the size difference.
    pub fn set_scan_window(&self, rect: PreviewRect, view: Resolution) {
        let mut state = self.lock();
        let Some(config) = state.config.as_mut() else {
            debug!("Scan window set before camera was opened, ignoring");
            return;
        };
        let preview = config.preview_resolution;
        let dx = (preview.width as i64 - view.width as i64) / 2;
        let dy = (preview.height as i64 - view.height as i64) / 2;
        let placed = rect.offset(dx as i32, dy as i32);
        debug!(?placed, view = %view, preview = %preview, "Scan window updated");
        config.preview_rect = Some(placed);
    }

    /// Follow a change of display orientation
    pub fn set_display_rotation(&self, rotation: Rotation) {
        let mut state = self.lock();
        state.display.rotation = rotation;
        let Some(info) = state.info.clone() else {
            return;
        };
        if let Some(config) = state.config.as_mut() {
            config.rotation = camera_rotation(rotation, &info);
            info!(display = %rotation, camera = %config.rotation, "Display rotation changed");
        }
    }

    /// Focus mode the device is currently in
    pub fn focus_mode(&self) -> Option<FocusMode> {
        let state = self.lock();
        state.device.parameters().ok().and_then(|p| p.focus_mode)
    }

    /// Start a focus cycle
    pub fn auto_focus(&self, callback: FocusCallback) -> BackendResult<()> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(BackendError::NotOpened);
        }
        state.device.auto_focus(callback)
    }

    /// Abort an in-flight focus cycle
    pub fn cancel_auto_focus(&self) -> BackendResult<()> {
        self.lock().device.cancel_auto_focus()
    }

    /// Stop the preview and release the device
    pub fn close(&self) {
        let mut state = self.lock();
        if state.previewing {
            state.device.stop_preview();
            state.previewing = false;
        }
        if state.config.take().is_some() {
            state.device.close();
            state.info = None;
            info!("Camera closed");
        }
        self.frame_armed.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CameraManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraManager")
            .field("open", &self.is_open())
            .field("frame_armed", &self.is_frame_armed())
            .finish()
    }
}
