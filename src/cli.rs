// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for scan operations
//!
//! This module provides command-line functionality for:
//! - Decoding a barcode from an image file
//! - Scanning a stream of images through the full capture pipeline
//! - Inspecting the configuration

use scan::backends::camera::types::{CameraFacing, Rotation};
use scan::backends::virtual_camera::collect_image_paths;
use scan::frame_processor::{RqrrDecoder, decode_image_file};
use scan::{
    BarcodeResult, CaptureOrchestrator, Config, DisplayInfo, ScanConfig, ScanListener,
    VirtualCamera,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Decode a barcode from a single image file
pub fn decode_image(
    config: &ScanConfig,
    path: &Path,
    target_height: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target_height = target_height.unwrap_or(config.album_target_height);
    let mut decoder = RqrrDecoder::new();

    let start = Instant::now();
    let text = decode_image_file(&mut decoder, path, target_height)?;
    eprintln!("Decoded in {}ms", start.elapsed().as_millis());
    println!("{}", text);
    Ok(())
}

/// Forwards results to the main thread
struct ChannelListener {
    sender: Mutex<Sender<BarcodeResult>>,
}

impl ScanListener for ChannelListener {
    fn on_scan_result(&self, result: &BarcodeResult) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(result.clone());
        }
    }

    fn on_preview_restarted(&self) {
        eprintln!("Scanning...");
    }
}

/// Options for [`watch`]
pub struct WatchOptions {
    /// Sensor mounting angle reported by the virtual camera
    pub orientation: u32,
    /// Give up after this long without a result
    pub timeout: Duration,
    /// Stop after this many results
    pub count: usize,
    /// Search the whole frame instead of the centred scan window
    pub full_frame: bool,
}

/// Stream images through the capture pipeline until barcodes are found
pub fn watch(
    mut config: ScanConfig,
    inputs: &[PathBuf],
    options: WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = collect_image_paths(inputs)?;
    if paths.is_empty() {
        return Err("No images found".into());
    }
    println!("Streaming {} image(s)", paths.len());

    if options.full_frame {
        config.frame_ratio = 1.0;
        config.square_frame = false;
    }

    let camera = VirtualCamera::from_files(&paths, config.virtual_frame_interval())?
        .with_orientation(options.orientation, CameraFacing::Back);
    let size = camera.size();
    let swaps = Rotation::from_degrees(options.orientation as i32)
        .map(|r| r.swaps_dimensions())
        .unwrap_or(false);
    let display = DisplayInfo {
        resolution: if swaps { size.swapped() } else { size },
        rotation: Rotation::None,
    };

    let (sender, receiver) = mpsc::channel();
    let listener = Arc::new(ChannelListener {
        sender: Mutex::new(sender),
    });
    let scanner = CaptureOrchestrator::with_device(Box::new(camera), listener, config, display)?;
    scanner.start()?;

    let deadline = Instant::now() + options.timeout;
    let mut found = 0;
    while found < options.count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(result) => {
                found += 1;
                println!("{}", result.text);
                if let Some(thumbnail) = &result.thumbnail {
                    eprintln!(
                        "  thumbnail {}x{} ({} bytes, scale {:.2})",
                        thumbnail.width,
                        thumbnail.height,
                        thumbnail.jpeg.len(),
                        result.scale_factor
                    );
                }
                scanner.restart();
            }
            Err(_) => break,
        }
    }

    scanner.stop();

    if found == 0 {
        return Err(format!("No barcode found within {}s", options.timeout.as_secs()).into());
    }
    Ok(())
}

/// Print the effective configuration, optionally writing it to disk
pub fn show_config(
    config: &ScanConfig,
    path: Option<PathBuf>,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.or_else(Config::default_path);

    match &path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (no config directory)"),
    }
    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        let path = path.ok_or("No config directory available")?;
        config.save(&path)?;
        println!("Written to {}", path.display());
    }
    Ok(())
}
