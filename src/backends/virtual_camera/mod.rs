// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera device backed by still images
//!
//! Serves a fixed list of greyscale images as preview frames, cycling through
//! them at a steady frame interval. One-shot frame requests and focus cycles
//! are handled on the device's own thread, so callbacks arrive asynchronously
//! like they would from real hardware.
//!
//! # Architecture
//!
//! ```text
//! request_one_frame(cb) ──┐
//! auto_focus(cb) ─────────┤
//!                         ▼
//!               ┌──────────────────┐
//!               │ scan-virtual-cam │  ← paces frames, cycles images
//!               └────────┬─────────┘
//!                        ▼
//!                   cb(frame data)
//! ```

mod file_source;

pub use file_source::{collect_image_paths, is_supported_image, load_frames, load_image_as_frame};

use crate::backends::camera::types::*;
use crate::backends::camera::{FocusControl, FrameSource};
use crate::constants::timing;
use crate::frame_loop::{LoopAction, MailboxLoop};
use image::GrayImage;
use image::imageops::FilterType;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Thread name of the virtual camera
pub const VIRTUAL_CAMERA_THREAD_NAME: &str = "scan-virtual-cam";

enum VirtualRequest {
    Frame(FrameCallback),
    Focus(FocusCallback),
}

/// State owned by the streaming thread
struct Streamer {
    frames: Vec<FrameData>,
    next: usize,
    interval: Duration,
    last_frame: Option<Instant>,
    previewing: Arc<AtomicBool>,
    served: Arc<AtomicUsize>,
}

impl Streamer {
    fn handle(&mut self, request: VirtualRequest) -> LoopAction {
        match request {
            VirtualRequest::Frame(callback) => self.serve_frame(callback),
            VirtualRequest::Focus(callback) => {
                std::thread::sleep(timing::VIRTUAL_FOCUS_DURATION);
                callback(true);
            }
        }
        LoopAction::Continue
    }

    fn serve_frame(&mut self, callback: FrameCallback) {
        if let Some(last) = self.last_frame {
            let due = last + self.interval;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        if !self.previewing.load(Ordering::SeqCst) {
            debug!("Preview stopped, dropping frame request");
            return;
        }

        let data = Arc::clone(&self.frames[self.next]);
        self.next = (self.next + 1) % self.frames.len();
        self.last_frame = Some(Instant::now());
        self.served.fetch_add(1, Ordering::SeqCst);
        callback(data);
    }
}

/// Camera device that streams still images
pub struct VirtualCamera {
    frames: Vec<FrameData>,
    size: Resolution,
    facing: CameraFacing,
    orientation: u32,
    interval: Duration,
    parameters: CameraParameters,
    previewing: Arc<AtomicBool>,
    served: Arc<AtomicUsize>,
    streamer: Option<MailboxLoop<VirtualRequest>>,
}

impl VirtualCamera {
    /// Stream `images`, one every `interval`
    ///
    /// All frames are resized to the size of the first image.
    pub fn new(images: Vec<GrayImage>, interval: Duration) -> Self {
        let size = images
            .first()
            .map(|first| Resolution::new(first.width(), first.height()))
            .unwrap_or(Resolution::new(0, 0));

        let frames: Vec<FrameData> = images
            .into_iter()
            .map(|image| {
                let image = if image.dimensions() != (size.width, size.height) {
                    image::imageops::resize(&image, size.width, size.height, FilterType::Triangle)
                } else {
                    image
                };
                Arc::from(image.into_raw())
            })
            .collect();

        Self {
            frames,
            size,
            facing: CameraFacing::Back,
            orientation: 0,
            interval,
            parameters: CameraParameters {
                preview_size: Some(size),
                supported_preview_sizes: vec![size],
                focus_mode: Some(FocusMode::ContinuousPicture),
                supported_focus_modes: vec![FocusMode::ContinuousPicture, FocusMode::Auto],
            },
            previewing: Arc::new(AtomicBool::new(false)),
            served: Arc::new(AtomicUsize::new(0)),
            streamer: None,
        }
    }

    /// Load frames from image files
    pub fn from_files(paths: &[std::path::PathBuf], interval: Duration) -> BackendResult<Self> {
        Ok(Self::new(load_frames(paths)?, interval))
    }

    /// Report a sensor mounting angle and facing
    pub fn with_orientation(mut self, orientation: u32, facing: CameraFacing) -> Self {
        self.orientation = orientation;
        self.facing = facing;
        self
    }

    /// Start in `mode`
    pub fn with_focus_mode(mut self, mode: FocusMode) -> Self {
        self.parameters.focus_mode = Some(mode);
        if !self.parameters.supported_focus_modes.contains(&mode) {
            self.parameters.supported_focus_modes.push(mode);
        }
        self
    }

    /// Frame size this camera streams
    pub fn size(&self) -> Resolution {
        self.size
    }

    /// Counter of frames delivered so far
    pub fn frames_served(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.served)
    }

    fn is_open(&self) -> bool {
        self.streamer.is_some()
    }
}

impl FrameSource for VirtualCamera {
    fn open(&mut self) -> BackendResult<DeviceInfo> {
        if self.frames.is_empty() || self.size.pixels() == 0 {
            return Err(BackendError::DeviceNotFound(
                "Virtual camera has no frames".to_string(),
            ));
        }

        if !self.is_open() {
            let streamer = Streamer {
                frames: self.frames.clone(),
                next: 0,
                interval: self.interval,
                last_frame: None,
                previewing: Arc::clone(&self.previewing),
                served: Arc::clone(&self.served),
            };
            let thread = MailboxLoop::start_with_init(
                VIRTUAL_CAMERA_THREAD_NAME,
                move || Ok(streamer),
                |streamer: &mut Streamer, request: VirtualRequest| streamer.handle(request),
            )
            .map_err(BackendError::InitializationFailed)?;
            self.streamer = Some(thread);
        }

        info!(size = %self.size, frames = self.frames.len(), "Virtual camera opened");
        Ok(DeviceInfo {
            index: 0,
            name: "Virtual camera".to_string(),
            facing: self.facing,
            orientation: self.orientation,
        })
    }

    fn parameters(&self) -> BackendResult<CameraParameters> {
        if !self.is_open() {
            return Err(BackendError::NotOpened);
        }
        Ok(self.parameters.clone())
    }

    fn apply_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()> {
        if !self.is_open() {
            return Err(BackendError::NotOpened);
        }
        if let Some(size) = parameters.preview_size
            && size != self.size
        {
            return Err(BackendError::ParametersRejected(format!(
                "preview size {} not supported",
                size
            )));
        }
        if let Some(mode) = parameters.focus_mode
            && !self.parameters.supported_focus_modes.contains(&mode)
        {
            return Err(BackendError::ParametersRejected(format!(
                "focus mode {:?} not supported",
                mode
            )));
        }
        self.parameters.focus_mode = parameters.focus_mode;
        Ok(())
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        if !self.is_open() {
            return Err(BackendError::NotOpened);
        }
        self.previewing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.previewing.store(false, Ordering::SeqCst);
    }

    fn request_one_frame(&mut self, callback: FrameCallback) {
        match &self.streamer {
            Some(streamer) => {
                if !streamer.post(VirtualRequest::Frame(callback)) {
                    warn!("Virtual camera thread is gone, frame request dropped");
                }
            }
            None => debug!("Frame requested from closed virtual camera"),
        }
    }

    fn close(&mut self) {
        self.previewing.store(false, Ordering::SeqCst);
        if let Some(mut streamer) = self.streamer.take()
            && !streamer.shutdown(timing::WORKER_JOIN_TIMEOUT)
        {
            warn!("Virtual camera thread did not stop in time");
        }
    }
}

impl FocusControl for VirtualCamera {
    fn auto_focus(&mut self, callback: FocusCallback) -> BackendResult<()> {
        let streamer = self.streamer.as_ref().ok_or(BackendError::NotOpened)?;
        if streamer.post(VirtualRequest::Focus(callback)) {
            Ok(())
        } else {
            Err(BackendError::Other("Virtual camera thread is gone".to_string()))
        }
    }

    fn cancel_auto_focus(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

impl Drop for VirtualCamera {
    fn drop(&mut self) {
        self.close();
    }
}
