// SPDX-License-Identifier: GPL-3.0-only

//! Periodic auto-focus
//!
//! Devices in a focus mode that does not track on its own (see
//! [`FOCUS_MODES_CALLING_AF`](crate::constants::FOCUS_MODES_CALLING_AF)) need
//! an explicit focus call every so often while scanning. The scheduler fires
//! one, waits for it to complete, then sleeps for the configured interval on
//! a tokio task before firing the next.

use super::manager::CameraManager;
use crate::config::ScanConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct FocusState {
    stopped: bool,
    focusing: bool,
    /// Pending delayed re-trigger
    outstanding: Option<AbortHandle>,
}

struct Inner {
    camera: CameraManager,
    runtime: Handle,
    interval: Duration,
    enabled: bool,
    state: Mutex<FocusState>,
}

/// Auto-focus re-trigger loop for one scan session
#[derive(Clone)]
pub struct AutoFocusScheduler {
    inner: Arc<Inner>,
}

impl AutoFocusScheduler {
    /// Create a scheduler for an opened camera
    ///
    /// Scheduling is enabled only if `config.auto_focus` is set and the
    /// camera's current focus mode is one of `config.focus_modes_calling_af`.
    pub fn new(camera: CameraManager, config: &ScanConfig, runtime: Handle) -> Self {
        let focus_mode = camera.focus_mode();
        let enabled = config.auto_focus
            && focus_mode.is_some_and(|mode| config.focus_modes_calling_af.contains(&mode));
        debug!(?focus_mode, enabled, "Auto-focus scheduler created");

        Self {
            inner: Arc::new(Inner {
                camera,
                runtime,
                interval: config.auto_focus_interval(),
                enabled,
                state: Mutex::new(FocusState {
                    // Nothing happens until start()
                    stopped: true,
                    ..Default::default()
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FocusState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Whether a focus cycle is in flight
    pub fn is_focusing(&self) -> bool {
        self.lock().focusing
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Whether a delayed re-trigger is pending
    pub fn has_pending_trigger(&self) -> bool {
        self.lock().outstanding.is_some()
    }

    /// Begin periodic focusing with an immediate cycle
    pub fn start(&self) {
        if !self.inner.enabled {
            return;
        }
        self.lock().stopped = false;
        self.trigger();
    }

    /// Fire a focus cycle now, unless one is running or the scheduler stopped
    fn trigger(&self) {
        let mut state = self.lock();
        state.outstanding = None;
        if state.stopped || state.focusing {
            return;
        }

        // The device may complete synchronously while the camera lock is held,
        // so completion is handed to the runtime rather than run in place.
        let scheduler = self.clone();
        let callback = Box::new(move |success: bool| {
            let runtime = scheduler.inner.runtime.clone();
            runtime.spawn(async move { scheduler.on_focus_complete(success) });
        });

        match self.inner.camera.auto_focus(callback) {
            Ok(()) => {
                trace!("Auto-focus cycle started");
                state.focusing = true;
            }
            Err(e) => {
                warn!(error = %e, "Auto-focus request rejected, retrying later");
                self.schedule_retrigger(&mut state);
            }
        }
    }

    fn on_focus_complete(&self, success: bool) {
        trace!(success, "Auto-focus cycle complete");
        let mut state = self.lock();
        state.focusing = false;
        self.schedule_retrigger(&mut state);
    }

    fn schedule_retrigger(&self, state: &mut FocusState) {
        if state.stopped || state.outstanding.is_some() {
            return;
        }
        let scheduler = self.clone();
        let interval = self.inner.interval;
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            scheduler.trigger();
        });
        state.outstanding = Some(task.abort_handle());
    }

    /// Stop focusing until the next [`start`](Self::start)
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        if !self.inner.enabled {
            return;
        }
        if let Some(task) = state.outstanding.take() {
            task.abort();
        }
        if let Err(e) = self.inner.camera.cancel_auto_focus() {
            debug!(error = %e, "Cancelling auto-focus failed, ignoring");
        }
        debug!("Auto-focus stopped");
    }
}

impl std::fmt::Debug for AutoFocusScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoFocusScheduler")
            .field("enabled", &self.inner.enabled)
            .field("state", &*self.lock())
            .finish()
    }
}
