// SPDX-License-Identifier: GPL-3.0-only

//! QR code decoding with rqrr
//!
//! The scan window is copied into a scratch buffer that survives between
//! attempts, so steady-state scanning does not allocate per frame. The buffer
//! is cleared on reset and released entirely when memory runs short.

use super::BarcodeDecoder;
use crate::errors::DecodeError;
use crate::frame_processor::luminance::LuminanceSource;
use tracing::{debug, trace};

/// Default [`BarcodeDecoder`] for QR codes
#[derive(Debug, Default)]
pub struct RqrrDecoder {
    scratch: Vec<u8>,
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held for reuse
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }
}

impl BarcodeDecoder for RqrrDecoder {
    fn decode_with_state(&mut self, source: &LuminanceSource<'_>) -> Result<String, DecodeError> {
        let start = std::time::Instant::now();
        let width = source.width() as usize;
        let height = source.height() as usize;

        self.scratch.clear();
        self.scratch
            .try_reserve(width * height)
            .map_err(|_| DecodeError::ResourceExhausted)?;
        source.copy_into(&mut self.scratch);

        let scratch = &self.scratch;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| scratch[y * width + x]);
        let grids = prepared.detect_grids();
        trace!(
            count = grids.len(),
            detection_ms = start.elapsed().as_millis(),
            "QR grid detection complete"
        );

        if grids.is_empty() {
            return Err(DecodeError::NotFound);
        }

        let mut last_error = None;
        for grid in &grids {
            match grid.decode() {
                Ok((_, content)) => {
                    debug!(total_ms = start.elapsed().as_millis(), "Decoded QR code");
                    return Ok(content);
                }
                Err(e) => {
                    debug!(error = ?e, "Failed to decode QR grid");
                    last_error = Some(format!("{:?}", e));
                }
            }
        }

        Err(DecodeError::Unreadable(
            last_error.unwrap_or_else(|| "no readable grid".to_string()),
        ))
    }

    fn reset(&mut self) {
        self.scratch.clear();
    }

    fn release_memory(&mut self) {
        self.scratch = Vec::new();
    }
}
