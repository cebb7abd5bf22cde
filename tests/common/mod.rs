// SPDX-License-Identifier: GPL-3.0-only

//! Scripted camera and decoder doubles shared by the integration tests

#![allow(dead_code)]

use scan::backends::camera::types::*;
use scan::errors::DecodeError;
use scan::frame_processor::{DecoderFactory, LuminanceSource};
use scan::{BarcodeDecoder, BarcodeResult, FocusControl, FrameSource, ScanListener};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

// ===== Camera =====

#[derive(Default)]
struct CameraState {
    /// Armed callbacks, oldest first
    pending: VecDeque<FrameCallback>,
    arms: usize,
    max_pending: usize,
    opens: usize,
    closes: usize,
    focus_calls: usize,
    previewing: bool,
}

/// Test-side view of a [`ScriptedCamera`]
#[derive(Clone)]
pub struct CameraHandle {
    state: Arc<Mutex<CameraState>>,
    fail_open: Arc<AtomicBool>,
    size: Resolution,
}

impl CameraHandle {
    pub fn new(size: Resolution) -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState::default())),
            fail_open: Arc::new(AtomicBool::new(false)),
            size,
        }
    }

    /// Device backed by this handle
    pub fn device(&self, focus_mode: FocusMode) -> ScriptedCamera {
        ScriptedCamera {
            handle: self.clone(),
            focus_mode,
            open: false,
        }
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// Fire the oldest armed callback with a blank frame
    ///
    /// Returns `false` if nothing was armed.
    pub fn deliver(&self) -> bool {
        let data = vec![0u8; self.size.pixels() as usize];
        self.deliver_data(data)
    }

    pub fn deliver_data(&self, data: Vec<u8>) -> bool {
        // Never hold the state lock while the callback runs
        let callback = self.state.lock().unwrap().pending.pop_front();
        match callback {
            Some(callback) => {
                callback(Arc::from(data));
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Total number of `request_one_frame` calls
    pub fn arms(&self) -> usize {
        self.state.lock().unwrap().arms
    }

    pub fn max_pending(&self) -> usize {
        self.state.lock().unwrap().max_pending
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn focus_calls(&self) -> usize {
        self.state.lock().unwrap().focus_calls
    }

    pub fn is_previewing(&self) -> bool {
        self.state.lock().unwrap().previewing
    }
}

/// Camera whose frames are delivered by the test through [`CameraHandle`]
///
/// Armed callbacks survive `stop_preview` and `close`, like a driver that
/// delivers one last buffer after teardown.
pub struct ScriptedCamera {
    handle: CameraHandle,
    focus_mode: FocusMode,
    open: bool,
}

impl FrameSource for ScriptedCamera {
    fn open(&mut self) -> BackendResult<DeviceInfo> {
        if self.handle.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::DeviceNotFound("scripted failure".into()));
        }
        self.handle.state.lock().unwrap().opens += 1;
        self.open = true;
        Ok(DeviceInfo {
            index: 0,
            name: "scripted".into(),
            facing: CameraFacing::Back,
            orientation: 0,
        })
    }

    fn parameters(&self) -> BackendResult<CameraParameters> {
        if !self.open {
            return Err(BackendError::NotOpened);
        }
        Ok(CameraParameters {
            preview_size: Some(self.handle.size),
            supported_preview_sizes: vec![self.handle.size],
            focus_mode: Some(self.focus_mode),
            supported_focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousPicture],
        })
    }

    fn apply_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()> {
        match parameters.preview_size {
            Some(size) if size != self.handle.size => Err(BackendError::ParametersRejected(
                format!("unsupported preview size {}", size),
            )),
            _ => Ok(()),
        }
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        self.handle.state.lock().unwrap().previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.handle.state.lock().unwrap().previewing = false;
    }

    fn request_one_frame(&mut self, callback: FrameCallback) {
        let mut state = self.handle.state.lock().unwrap();
        state.arms += 1;
        state.pending.push_back(callback);
        state.max_pending = state.max_pending.max(state.pending.len());
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.handle.state.lock().unwrap().closes += 1;
        }
    }
}

impl FocusControl for ScriptedCamera {
    fn auto_focus(&mut self, callback: FocusCallback) -> BackendResult<()> {
        self.handle.state.lock().unwrap().focus_calls += 1;
        callback(true);
        Ok(())
    }

    fn cancel_auto_focus(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

// ===== Decoder =====

/// What the next decode attempt does
pub enum Step {
    /// Report no barcode
    NotFound,
    /// Decode `text`
    Text(String),
    /// Panic inside the decoder
    Panic,
    /// Report memory exhaustion
    Exhaust,
    /// Block until the receiver fires (or is dropped), then decode `text`
    Gate(Receiver<()>, String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    pub decodes: usize,
    pub resets: usize,
    pub releases: usize,
    pub constructed: usize,
    /// Highest number of simultaneously running decode calls
    pub max_active: usize,
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    stats: DecoderStats,
}

/// Shared script driving every decoder the factory builds
#[derive(Clone, Default)]
pub struct DecoderScript {
    state: Arc<Mutex<ScriptState>>,
    active: Arc<AtomicUsize>,
}

impl DecoderScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a step; once the queue is empty every attempt reports `NotFound`
    pub fn push(&self, step: Step) {
        self.state.lock().unwrap().steps.push_back(step);
    }

    pub fn stats(&self) -> DecoderStats {
        self.state.lock().unwrap().stats
    }

    pub fn factory(&self) -> DecoderFactory {
        let script = self.clone();
        Arc::new(move || {
            script.state.lock().unwrap().stats.constructed += 1;
            Box::new(ScriptedDecoder {
                script: script.clone(),
            }) as Box<dyn BarcodeDecoder>
        })
    }
}

pub struct ScriptedDecoder {
    script: DecoderScript,
}

impl BarcodeDecoder for ScriptedDecoder {
    fn decode_with_state(&mut self, _source: &LuminanceSource<'_>) -> Result<String, DecodeError> {
        let active = self.script.active.fetch_add(1, Ordering::SeqCst) + 1;
        let step = {
            let mut state = self.script.state.lock().unwrap();
            state.stats.decodes += 1;
            state.stats.max_active = state.stats.max_active.max(active);
            state.steps.pop_front().unwrap_or(Step::NotFound)
        };

        let result = match step {
            Step::NotFound => Err(DecodeError::NotFound),
            Step::Text(text) => Ok(text),
            Step::Exhaust => Err(DecodeError::ResourceExhausted),
            Step::Gate(release, text) => {
                let _ = release.recv_timeout(Duration::from_secs(5));
                Ok(text)
            }
            Step::Panic => {
                self.script.active.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted decoder panic");
            }
        };
        self.script.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn reset(&mut self) {
        self.script.state.lock().unwrap().stats.resets += 1;
    }

    fn release_memory(&mut self) {
        self.script.state.lock().unwrap().stats.releases += 1;
    }
}

// ===== Listener =====

#[derive(Default)]
pub struct RecordingListener {
    results: Mutex<Vec<BarcodeResult>>,
    restarts: AtomicUsize,
}

impl RecordingListener {
    pub fn texts(&self) -> Vec<String> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl ScanListener for RecordingListener {
    fn on_scan_result(&self, result: &BarcodeResult) {
        self.results.lock().unwrap().push(result.clone());
    }

    fn on_preview_restarted(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}
