// SPDX-License-Identifier: GPL-3.0-only

//! Barcode decoders
//!
//! The capture pipeline treats symbology decoding as a black box behind
//! [`BarcodeDecoder`]. A decoder may keep state between calls (scratch
//! buffers, hints); it is owned by exactly one thread at a time.

pub mod qr_decoder;

pub use qr_decoder::RqrrDecoder;

use super::luminance::LuminanceSource;
use crate::errors::DecodeError;
use std::sync::Arc;

/// Stateful barcode reader
pub trait BarcodeDecoder: Send {
    /// Decode a barcode from `source`, reusing internal state
    fn decode_with_state(&mut self, source: &LuminanceSource<'_>) -> Result<String, DecodeError>;

    /// Clear per-attempt state; called exactly once after every attempt
    fn reset(&mut self);

    /// Drop cached memory after [`DecodeError::ResourceExhausted`]
    fn release_memory(&mut self) {}
}

/// Builds a fresh decoder for each worker thread
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn BarcodeDecoder> + Send + Sync>;

/// Factory for the default QR decoder
pub fn default_decoder_factory() -> DecoderFactory {
    Arc::new(|| Box::new(RqrrDecoder::new()) as Box<dyn BarcodeDecoder>)
}
