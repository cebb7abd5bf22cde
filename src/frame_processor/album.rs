// SPDX-License-Identifier: GPL-3.0-only

//! Still image ("album") decoding
//!
//! Decodes a barcode from an image file picked by the user rather than from
//! the live preview. Large photos are downsampled towards a target height
//! first; barcodes in gallery pictures are usually big enough to survive it.

use super::luminance::LuminanceSource;
use super::tasks::{BarcodeDecoder, DecoderFactory};
use super::types::{BarcodeResult, ScanListener};
use super::worker::{reset_decoder, run_decoder};
use crate::errors::{ScanError, ScanResult};
use crate::frame_loop::{LoopAction, MailboxLoop};
use image::GrayImage;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Thread name of the album decoder
pub const ALBUM_THREAD_NAME: &str = "scan-album";

/// Load `path` as greyscale, shrunk by the integer factor `height / target_height`
pub fn load_luminance(path: &Path, target_height: u32) -> ScanResult<GrayImage> {
    let image = image::open(path)?.to_luma8();
    let sample = (image.height() / target_height.max(1)).max(1);
    if sample == 1 {
        return Ok(image);
    }

    let width = (image.width() / sample).max(1);
    let height = (image.height() / sample).max(1);
    debug!(
        path = %path.display(),
        original = %format!("{}x{}", image.width(), image.height()),
        sample,
        "Downsampling album image"
    );
    Ok(image::imageops::resize(&image, width, height, FilterType::Triangle))
}

/// Decode the barcode in an image file
///
/// The whole (downsampled) image is searched. The decoder is reset exactly
/// once after the attempt.
pub fn decode_image_file(
    decoder: &mut dyn BarcodeDecoder,
    path: &Path,
    target_height: u32,
) -> ScanResult<String> {
    let image = load_luminance(path, target_height)?;
    let source = LuminanceSource::from_gray(&image);
    let result = run_decoder(decoder, &source);
    reset_decoder(decoder);
    result
}

/// Decodes image files on a background thread and reports to a listener
#[derive(Debug)]
pub struct AlbumScanner {
    thread: MailboxLoop<PathBuf>,
}

impl AlbumScanner {
    pub fn new(
        factory: DecoderFactory,
        listener: Arc<dyn ScanListener>,
        target_height: u32,
    ) -> ScanResult<Self> {
        let thread = MailboxLoop::start_with_init(
            ALBUM_THREAD_NAME,
            move || Ok(factory()),
            move |decoder: &mut Box<dyn BarcodeDecoder>, path: PathBuf| {
                match decode_image_file(decoder.as_mut(), &path, target_height) {
                    Ok(text) => {
                        info!(path = %path.display(), "Barcode decoded from image");
                        listener.on_scan_result(&BarcodeResult::text_only(text));
                    }
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "No barcode in image");
                        listener.on_decode_failure();
                    }
                }
                LoopAction::Continue
            },
        )
        .map_err(ScanError::WorkerUnavailable)?;

        Ok(Self { thread })
    }

    /// Queue an image for decoding
    pub fn scan(&self, path: impl Into<PathBuf>) -> bool {
        self.thread.post(path.into())
    }

    /// Finish queued images (within `timeout`) and stop the thread
    pub fn shutdown(&mut self, timeout: Duration) -> ScanResult<()> {
        if self.thread.shutdown(timeout) {
            Ok(())
        } else {
            Err(ScanError::WorkerShutdownTimeout(timeout))
        }
    }
}
