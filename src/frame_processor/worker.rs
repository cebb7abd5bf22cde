// SPDX-License-Identifier: GPL-3.0-only

//! Decode worker thread
//!
//! One dedicated thread owns the stateful decoder and processes decode
//! requests strictly in the order they were posted. Each request is rotated,
//! cropped to the scan window and decoded; the outcome is handed to the
//! result sink together with the session generation it belongs to.

use super::luminance::LuminanceSource;
use super::tasks::{BarcodeDecoder, DecoderFactory};
use super::transform::rotate_luminance;
use super::types::{BarcodeResult, DecodeResult};
use crate::backends::camera::types::{Frame, PreviewRect};
use crate::config::ScanConfig;
use crate::constants::decode;
use crate::errors::{DecodeError, FrameRejection, ScanError, ScanResult};
use crate::frame_loop::{LoopAction, Mailbox, MailboxLoop};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Thread name of the decode worker
pub const WORKER_THREAD_NAME: &str = "scan-decode";

/// A frame to decode
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    /// Session generation the frame was captured in
    pub generation: u64,
    pub frame: Frame,
    /// Scan window inside the rotated frame
    pub crop: Option<PreviewRect>,
}

/// Thumbnail settings applied to successful decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub thumbnails: bool,
    pub thumbnail_quality: u8,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            thumbnails: true,
            thumbnail_quality: decode::THUMBNAIL_QUALITY,
        }
    }
}

impl From<&ScanConfig> for DecodeOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            thumbnails: config.thumbnails,
            thumbnail_quality: config.thumbnail_quality,
        }
    }
}

/// Handle to the decode worker thread
#[derive(Debug)]
pub struct DecodeWorker {
    thread: MailboxLoop<DecodeRequest>,
}

impl DecodeWorker {
    /// Spawn the worker and wait until its decoder exists
    ///
    /// `on_result` is called on the worker thread after every request.
    pub fn spawn<F>(factory: DecoderFactory, options: DecodeOptions, mut on_result: F) -> ScanResult<Self>
    where
        F: FnMut(u64, DecodeResult) + Send + 'static,
    {
        let thread = MailboxLoop::start_with_init(
            WORKER_THREAD_NAME,
            move || {
                panic::catch_unwind(AssertUnwindSafe(|| factory()))
                    .map_err(|payload| format!("decoder construction panicked: {}", panic_message(&*payload)))
            },
            move |decoder: &mut Box<dyn BarcodeDecoder>, request: DecodeRequest| {
                let result = decode_frame(decoder.as_mut(), &request.frame, request.crop, options);
                on_result(request.generation, result);
                LoopAction::Continue
            },
        )
        .map_err(ScanError::WorkerUnavailable)?;

        Ok(Self { thread })
    }

    /// Queue a request; returns `false` once the worker has quit
    pub fn post(&self, request: DecodeRequest) -> bool {
        self.thread.post(request)
    }

    pub fn mailbox(&self) -> Mailbox<DecodeRequest> {
        self.thread.mailbox()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Post `Quit` without waiting
    pub fn request_quit(&mut self) {
        self.thread.request_quit();
    }

    /// Quit and wait up to `timeout` for the thread to finish
    pub fn shutdown(&mut self, timeout: Duration) -> ScanResult<()> {
        if self.thread.shutdown(timeout) {
            Ok(())
        } else {
            Err(ScanError::WorkerShutdownTimeout(timeout))
        }
    }
}

/// Rotate, crop and decode one frame
///
/// The decoder is reset exactly once whatever the outcome. A panic anywhere in
/// the attempt is reported as a decode failure.
pub fn decode_frame(
    decoder: &mut dyn BarcodeDecoder,
    frame: &Frame,
    crop: Option<PreviewRect>,
    options: DecodeOptions,
) -> DecodeResult {
    let start = std::time::Instant::now();
    let result = match panic::catch_unwind(AssertUnwindSafe(|| attempt(decoder, frame, crop, options))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&*payload);
            warn!(panic = %message, "Frame processing panicked");
            DecodeResult::Failure(ScanError::DecodeFailure(format!(
                "frame processing panicked: {}",
                message
            )))
        }
    };
    reset_decoder(decoder);

    trace!(
        success = result.is_success(),
        latency_ms = frame.captured_at.elapsed().as_millis(),
        decode_ms = start.elapsed().as_millis(),
        "Frame processed"
    );
    result
}

fn attempt(
    decoder: &mut dyn BarcodeDecoder,
    frame: &Frame,
    crop: Option<PreviewRect>,
    options: DecodeOptions,
) -> DecodeResult {
    let source = match prepare_source(frame, crop) {
        Ok(source) => source,
        Err(reason) => {
            debug!(%reason, "Frame rejected");
            return DecodeResult::Failure(reason.into());
        }
    };
    let text = match run_decoder(decoder, &source) {
        Ok(text) => text,
        Err(e) => return DecodeResult::Failure(e),
    };

    let (thumbnail, scale_factor) = if options.thumbnails {
        match source.render_thumbnail(decode::THUMBNAIL_SCALE_FACTOR, options.thumbnail_quality) {
            Some(thumbnail) => {
                let scale = thumbnail.width as f32 / source.width() as f32;
                (Some(thumbnail), scale)
            }
            None => (None, 0.0),
        }
    } else {
        (None, 0.0)
    };
    DecodeResult::Success(BarcodeResult {
        text,
        thumbnail,
        scale_factor,
    })
}

fn prepare_source(
    frame: &Frame,
    crop: Option<PreviewRect>,
) -> Result<LuminanceSource<'_>, FrameRejection> {
    let rotated = rotate_luminance(&frame.data, frame.width, frame.height, frame.rotation)?;
    LuminanceSource::crop(rotated, crop)
}

/// Run one decode attempt, containing panics and memory exhaustion
///
/// Does not reset the decoder.
pub(crate) fn run_decoder(
    decoder: &mut dyn BarcodeDecoder,
    source: &LuminanceSource<'_>,
) -> Result<String, ScanError> {
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode_with_state(source))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(DecodeError::ResourceExhausted)) => {
            warn!("Decoder ran out of memory, releasing cached buffers");
            decoder.release_memory();
            Err(ScanError::ResourceExhaustion)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(payload) => {
            let message = panic_message(&*payload);
            warn!(panic = %message, "Decoder panicked");
            Err(ScanError::DecodeFailure(format!("decoder panicked: {}", message)))
        }
    }
}

pub(crate) fn reset_decoder(decoder: &mut dyn BarcodeDecoder) {
    if panic::catch_unwind(AssertUnwindSafe(|| decoder.reset())).is_err() {
        warn!("Decoder panicked during reset");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
