// SPDX-License-Identifier: GPL-3.0-only

//! Capture orchestration
//!
//! Drives one scan session: request a single preview frame, hand it to the
//! decode worker, and either report the result or ask for the next frame.
//!
//! ```text
//!            start()                 frame              failure
//!  Idle ──────────────► AwaitingFrame ─────► Decoding ─────────┐
//!  Stopped ─────────────►     ▲                  │             │
//!                             │ restart()        │ success     │
//!                             └───────── Success ◄┘             │
//!                             ▲                                │
//!                             └────────────────────────────────┘
//! ```
//!
//! Device callbacks and the decode worker only post events to the dispatcher
//! thread, which applies them to the session under its lock. Every start and
//! stop bumps the session generation; events carrying an older generation
//! are dropped, so a late frame or result can never leak into a new session.

use super::tasks::{DecoderFactory, default_decoder_factory};
use super::types::{BarcodeResult, CaptureState, DecodeResult, ScanListener};
use super::worker::{DecodeOptions, DecodeRequest, DecodeWorker};
use crate::backends::camera::types::{Frame, PreviewRect, Resolution, Rotation};
use crate::backends::camera::{AutoFocusScheduler, CameraDevice, CameraManager, DisplayInfo};
use crate::config::ScanConfig;
use crate::errors::{ScanError, ScanResult};
use crate::frame_loop::{LoopAction, Mailbox, MailboxLoop};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, error, info, trace, warn};

/// Thread name of the capture dispatcher
pub const DISPATCHER_THREAD_NAME: &str = "scan-capture";

/// Thread name of the auto-focus timer runtime
pub const FOCUS_THREAD_NAME: &str = "scan-focus";

/// Events consumed by the dispatcher thread
#[derive(Debug)]
enum CaptureEvent {
    FrameDelivered { generation: u64, frame: Frame },
    Decoded { generation: u64, result: DecodeResult },
}

#[derive(Debug, Default)]
struct Session {
    state: CaptureState,
    generation: u64,
    worker: Option<DecodeWorker>,
    autofocus: Option<AutoFocusScheduler>,
    last_result: Option<BarcodeResult>,
}

struct Inner {
    session: Mutex<Session>,
    camera: CameraManager,
    listener: Arc<dyn ScanListener>,
    decoder_factory: DecoderFactory,
    config: ScanConfig,
    runtime: tokio::runtime::Runtime,
    events: OnceLock<Mailbox<CaptureEvent>>,
}

/// Scan session state machine
pub struct CaptureOrchestrator {
    inner: Arc<Inner>,
    _dispatcher: MailboxLoop<CaptureEvent>,
}

impl CaptureOrchestrator {
    /// Create an orchestrator for `camera`
    ///
    /// Spawns the dispatcher thread and the auto-focus timer runtime. The
    /// camera is not touched until [`start`](Self::start).
    pub fn new(
        camera: CameraManager,
        listener: Arc<dyn ScanListener>,
        decoder_factory: DecoderFactory,
        config: ScanConfig,
    ) -> ScanResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(FOCUS_THREAD_NAME)
            .enable_time()
            .build()?;

        let inner = Arc::new(Inner {
            session: Mutex::new(Session::default()),
            camera,
            listener,
            decoder_factory,
            config,
            runtime,
            events: OnceLock::new(),
        });

        let weak = Arc::downgrade(&inner);
        let dispatcher = MailboxLoop::start(DISPATCHER_THREAD_NAME, move |event| match weak.upgrade() {
            Some(inner) => {
                inner.handle_event(event);
                LoopAction::Continue
            }
            None => LoopAction::Stop,
        })
        .map_err(ScanError::WorkerUnavailable)?;
        let _ = inner.events.set(dispatcher.mailbox());

        Ok(Self {
            inner,
            _dispatcher: dispatcher,
        })
    }

    /// Orchestrator for a device with the default QR decoder
    pub fn with_device(
        device: Box<dyn CameraDevice>,
        listener: Arc<dyn ScanListener>,
        config: ScanConfig,
        display: DisplayInfo,
    ) -> ScanResult<Self> {
        let camera = CameraManager::new(device, &config, display);
        Self::new(camera, listener, default_decoder_factory(), config)
    }

    /// Begin scanning
    ///
    /// Opens and configures the camera, starts the preview and auto-focus,
    /// spawns the decode worker and requests the first frame. A no-op while
    /// a session is running. On failure everything opened so far is released
    /// and the orchestrator is left stopped.
    pub fn start(&self) -> ScanResult<()> {
        let inner = &self.inner;
        let mut session = inner.lock_session();
        if session.state.is_running() {
            debug!(state = %session.state, "Scan already running");
            return Ok(());
        }

        let camera_config = inner.camera.open()?;
        if let Err(e) = inner.camera.start_preview() {
            inner.camera.close();
            return Err(e.into());
        }

        session.generation += 1;
        let generation = session.generation;

        let autofocus = AutoFocusScheduler::new(
            inner.camera.clone(),
            &inner.config,
            inner.runtime.handle().clone(),
        );
        autofocus.start();

        let worker = match inner.spawn_worker() {
            Ok(worker) => worker,
            Err(e) => {
                error!(error = %e, "Decode worker failed to start");
                autofocus.stop();
                inner.camera.close();
                return Err(e);
            }
        };

        session.worker = Some(worker);
        session.autofocus = Some(autofocus);
        session.last_result = None;
        session.state = CaptureState::AwaitingFrame;
        if !inner.request_frame(generation) {
            error!(generation, "Camera refused the first frame request");
            inner.teardown(&mut session);
            return Err(ScanError::DeviceUnavailable("camera refused frame request".to_string()));
        }
        drop(session);

        info!(
            generation,
            resolution = %camera_config.resolution,
            rotation = %camera_config.rotation,
            "Scan started"
        );
        inner.listener.on_preview_restarted();
        Ok(())
    }

    /// Resume scanning after a successful decode
    ///
    /// Returns `false` (and does nothing) unless the session is in
    /// [`CaptureState::Success`]. If the camera refuses the frame request the
    /// session keeps its result and `false` is returned.
    pub fn restart(&self) -> bool {
        let inner = &self.inner;
        let mut session = inner.lock_session();
        if session.state != CaptureState::Success {
            debug!(state = %session.state, "Restart ignored");
            return false;
        }

        if !inner.request_frame(session.generation) {
            warn!(generation = session.generation, "Frame request after restart was not armed");
            return false;
        }
        session.last_result = None;
        session.state = CaptureState::AwaitingFrame;
        drop(session);

        debug!("Scan restarted");
        inner.listener.on_preview_restarted();
        true
    }

    /// End the session and release the camera
    ///
    /// Waits for the decode worker at most the configured join timeout; a
    /// worker that does not finish in time is logged and abandoned. Always
    /// leaves the orchestrator in [`CaptureState::Stopped`].
    pub fn stop(&self) {
        let mut session = self.inner.lock_session();
        if session.state.is_running() {
            self.inner.teardown(&mut session);
        }
    }

    /// Place the scan window, in the coordinates of a host view of size `view`
    pub fn set_scan_window(&self, rect: PreviewRect, view: Resolution) {
        self.inner.camera.set_scan_window(rect, view);
    }

    /// Follow a change of display orientation
    pub fn set_display_rotation(&self, rotation: Rotation) {
        self.inner.camera.set_display_rotation(rotation);
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock_session().state
    }

    /// Most recent successful result of the current session
    pub fn last_result(&self) -> Option<BarcodeResult> {
        self.inner.lock_session().last_result.clone()
    }

    /// Current session generation
    pub fn generation(&self) -> u64 {
        self.inner.lock_session().generation
    }

    pub fn camera(&self) -> &CameraManager {
        &self.inner.camera
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.lock_session();
        f.debug_struct("CaptureOrchestrator")
            .field("state", &session.state)
            .field("generation", &session.generation)
            .finish()
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn events(&self) -> Option<Mailbox<CaptureEvent>> {
        self.events.get().cloned()
    }

    fn spawn_worker(&self) -> ScanResult<DecodeWorker> {
        let events = self
            .events()
            .ok_or_else(|| ScanError::WorkerUnavailable("dispatcher not running".to_string()))?;
        DecodeWorker::spawn(
            Arc::clone(&self.decoder_factory),
            DecodeOptions::from(&self.config),
            move |generation, result| {
                events.post(CaptureEvent::Decoded { generation, result });
            },
        )
    }

    /// Arm one frame request for `generation`
    fn request_frame(&self, generation: u64) -> bool {
        let Some(events) = self.events() else {
            return false;
        };
        self.camera.request_preview_frame(move |frame| {
            events.post(CaptureEvent::FrameDelivered { generation, frame });
        })
    }

    /// Release the worker, auto-focus and camera and mark the session stopped
    fn teardown(&self, session: &mut Session) {
        session.state = CaptureState::Stopped;
        session.generation += 1;
        session.last_result = None;

        let mut worker = session.worker.take();
        if let Some(worker) = worker.as_mut() {
            worker.request_quit();
        }
        self.camera.stop_preview();
        if let Some(autofocus) = session.autofocus.take() {
            autofocus.stop();
        }

        if let Some(mut worker) = worker
            && let Err(e) = worker.shutdown(self.config.worker_join_timeout())
        {
            error!(error = %e, "Decode worker did not stop, abandoning it");
        }

        self.camera.close();
        info!(generation = session.generation, "Scan stopped");
    }

    /// Hand a frame to the worker, replacing a worker that has exited
    fn post_frame(&self, session: &mut Session, request: DecodeRequest) -> bool {
        // Frame data is shared, so the clone is cheap
        if let Some(worker) = session.worker.as_ref()
            && worker.post(request.clone())
        {
            return true;
        }

        warn!(generation = request.generation, "Decode worker is gone, spawning a new one");
        match self.spawn_worker() {
            Ok(worker) => {
                let posted = worker.post(request);
                session.worker = Some(worker);
                posted
            }
            Err(e) => {
                error!(error = %e, "Decode worker could not be replaced");
                false
            }
        }
    }

    fn handle_event(&self, event: CaptureEvent) {
        match event {
            CaptureEvent::FrameDelivered { generation, frame } => self.on_frame(generation, frame),
            CaptureEvent::Decoded { generation, result } => self.on_decoded(generation, result),
        }
    }

    fn on_frame(&self, generation: u64, frame: Frame) {
        let mut session = self.lock_session();
        if generation != session.generation || session.state != CaptureState::AwaitingFrame {
            debug!(generation, current = session.generation, state = %session.state, "Dropping stale frame");
            return;
        }

        let crop = self.camera.camera_config().and_then(|config| config.preview_rect);
        let request = DecodeRequest {
            generation,
            frame,
            crop,
        };
        if self.post_frame(&mut session, request) {
            session.state = CaptureState::Decoding;
        } else {
            error!(generation, "Frame could not be decoded, stopping scan");
            self.teardown(&mut session);
        }
    }

    fn on_decoded(&self, generation: u64, result: DecodeResult) {
        let mut session = self.lock_session();
        if generation != session.generation || session.state != CaptureState::Decoding {
            debug!(generation, current = session.generation, state = %session.state, "Dropping stale result");
            return;
        }

        match result {
            DecodeResult::Success(barcode) => {
                session.state = CaptureState::Success;
                session.last_result = Some(barcode.clone());
                drop(session);

                info!(generation, text_len = barcode.text.len(), "Barcode decoded");
                self.listener.on_scan_result(&barcode);
            }
            DecodeResult::Failure(e) => {
                trace!(generation, error = %e, "Decode failed, requesting next frame");
                session.state = CaptureState::AwaitingFrame;
                if !self.request_frame(generation) {
                    error!(generation, "Camera refused the next frame request, stopping scan");
                    self.teardown(&mut session);
                }
            }
        }
    }
}
