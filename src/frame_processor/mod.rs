// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipeline
//!
//! Turns one-shot preview frames into barcode results:
//!
//! - [`transform`]: luminance rotation into display orientation
//! - [`luminance`]: scan window crop and thumbnails
//! - [`tasks`]: the decoder abstraction and the default QR decoder
//! - [`worker`]: the decode worker thread
//! - [`capture`]: the session state machine tying camera and worker together
//! - [`album`]: decoding still images from files

pub mod album;
pub mod capture;
pub mod luminance;
pub mod tasks;
pub mod transform;
pub mod types;
pub mod worker;

pub use album::{AlbumScanner, decode_image_file};
pub use capture::CaptureOrchestrator;
pub use luminance::LuminanceSource;
pub use tasks::{BarcodeDecoder, DecoderFactory, RqrrDecoder, default_decoder_factory};
pub use transform::{RotatedFrame, rotate_luminance};
pub use types::{BarcodeResult, CaptureState, DecodeResult, ScanListener, Thumbnail};
pub use worker::{DecodeOptions, DecodeRequest, DecodeWorker, decode_frame};
