// SPDX-License-Identifier: GPL-3.0-only

//! Scan - a barcode capture-and-decode engine
//!
//! This library drives a camera, samples preview frames one at a time,
//! decodes them on a background thread and reports results to a host.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera device traits, geometry negotiation and the virtual camera
//! - [`frame_processor`]: Rotation, cropping, decoding and the capture state machine
//! - [`frame_loop`]: Mailbox-driven background threads
//! - [`config`]: User configuration handling
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! let camera = VirtualCamera::from_files(&paths, config.virtual_frame_interval())?;
//! let scanner = CaptureOrchestrator::with_device(
//!     Box::new(camera),
//!     Arc::new(MyListener),
//!     config,
//!     DisplayInfo::default(),
//! )?;
//! scanner.start()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame_loop;
pub mod frame_processor;

// Re-export commonly used types
pub use backends::camera::{CameraManager, DisplayInfo, FocusControl, FrameSource};
pub use backends::virtual_camera::VirtualCamera;
pub use config::{Config, ScanConfig};
pub use errors::{ScanError, ScanResult};
pub use frame_processor::{
    AlbumScanner, BarcodeDecoder, BarcodeResult, CaptureOrchestrator, CaptureState, DecodeResult,
    ScanListener,
};
