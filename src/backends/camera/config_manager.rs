// SPDX-License-Identifier: GPL-3.0-only

//! Camera geometry negotiation
//!
//! Derives the [`CameraConfig`] once when the device is opened: which preview
//! size to ask for, how far frames must be rotated to match the display, and
//! which part of the rotated frame sits under the scan window.

use super::FrameSource;
use super::types::*;
use crate::config::ScanConfig;
use tracing::{debug, info, warn};

/// Host display properties needed to orient the preview
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    /// Screen size in its current orientation
    pub resolution: Resolution,
    /// Rotation from the natural orientation to the current one
    pub rotation: Rotation,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(1920, 1080),
            rotation: Rotation::None,
        }
    }
}

/// Computes and applies the preview configuration for an opened device
#[derive(Debug, Clone)]
pub struct CameraConfigManager {
    min_preview_pixels: u64,
    frame_ratio: f32,
    square_frame: bool,
}

impl CameraConfigManager {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            min_preview_pixels: config.min_preview_pixels,
            frame_ratio: config.frame_ratio,
            square_frame: config.square_frame,
        }
    }

    /// Build the camera configuration from the device's reported parameters
    pub fn init_from_parameters(
        &self,
        parameters: &CameraParameters,
        info: &DeviceInfo,
        display: &DisplayInfo,
    ) -> BackendResult<CameraConfig> {
        let rotation = camera_rotation(display.rotation, info);
        let resolution =
            find_best_preview_size(parameters, display.resolution, self.min_preview_pixels)?;
        let preview_resolution = preview_resolution(resolution, display.resolution);

        let mut config = CameraConfig {
            resolution,
            preview_resolution,
            rotation,
            preview_rect: None,
        };
        config.preview_rect = Some(self.default_preview_rect(&config));

        info!(
            resolution = %resolution,
            preview = %preview_resolution,
            rotation = %rotation,
            camera = %info.name,
            "Derived camera configuration"
        );
        Ok(config)
    }

    /// Centred scan window inside the rotated frame
    pub fn default_preview_rect(&self, config: &CameraConfig) -> PreviewRect {
        PreviewRect::centered(
            config.rotated_resolution(),
            self.frame_ratio,
            self.square_frame,
        )
    }

    /// Push the desired preview size to the device
    ///
    /// The device's parameters are snapshotted first. If the device rejects
    /// the desired set, the snapshot is restored and the desired set retried
    /// once; a second rejection is logged and ignored. Afterwards the preview
    /// size the device actually settled on is adopted.
    pub fn apply_desired_parameters<D: FrameSource + ?Sized>(
        &self,
        device: &mut D,
        config: &mut CameraConfig,
    ) -> BackendResult<()> {
        let known_good = device.parameters()?.flatten();

        if let Err(e) = set_desired_parameters(device, config) {
            warn!(error = %e, "Camera rejected desired parameters, retrying in safe mode");
            let restored = CameraParameters::unflatten(&known_good)?;
            match device.apply_parameters(&restored) {
                Ok(()) => {
                    if let Err(e) = set_desired_parameters(device, config) {
                        debug!(error = %e, "Safe mode parameters rejected, keeping device defaults");
                    }
                }
                Err(e) => debug!(error = %e, "Could not restore known-good parameters"),
            }
        }

        if let Ok(actual) = device.parameters()
            && let Some(size) = actual.preview_size
            && size != config.resolution
        {
            info!(requested = %config.resolution, actual = %size, "Device adjusted preview size");
            let same_orientation = config.preview_resolution.is_portrait()
                == config.resolution.is_portrait();
            config.resolution = size;
            config.preview_resolution = if same_orientation {
                size
            } else {
                size.swapped()
            };
            config.preview_rect = Some(self.default_preview_rect(config));
        }

        Ok(())
    }
}

fn set_desired_parameters<D: FrameSource + ?Sized>(
    device: &mut D,
    config: &CameraConfig,
) -> BackendResult<()> {
    let desired = device.parameters()?.with_preview_size(config.resolution);
    device.apply_parameters(&desired)
}

/// Rotation that brings camera frames into the display's orientation
///
/// Front cameras are mirrored, so their mounting angle counts the other way.
pub fn camera_rotation(display_rotation: Rotation, info: &DeviceInfo) -> Rotation {
    let mut natural_to_camera = info.orientation % 360;
    if info.facing == CameraFacing::Front {
        natural_to_camera = (360 - natural_to_camera) % 360;
    }
    let degrees = (360 + natural_to_camera - display_rotation.degrees()) % 360;
    Rotation::from_degrees(degrees as i32).unwrap_or_default()
}

/// Pick the preview size closest to the screen
///
/// Sizes below `min_pixels` are ignored. An exact (orientation-agnostic)
/// screen match wins, otherwise the largest remaining size, otherwise the
/// device's current preview size.
pub fn find_best_preview_size(
    parameters: &CameraParameters,
    screen: Resolution,
    min_pixels: u64,
) -> BackendResult<Resolution> {
    let fallback = || {
        parameters.preview_size.ok_or_else(|| {
            BackendError::FormatNotSupported("Parameters contained no preview size".to_string())
        })
    };

    if parameters.supported_preview_sizes.is_empty() {
        return fallback();
    }

    let mut candidates: Vec<Resolution> = parameters
        .supported_preview_sizes
        .iter()
        .copied()
        .filter(|size| size.pixels() >= min_pixels)
        .collect();
    candidates.sort_by(|a, b| b.pixels().cmp(&a.pixels()));

    let screen = screen.landscape();
    if let Some(exact) = candidates.iter().find(|size| size.landscape() == screen) {
        return Ok(*exact);
    }

    match candidates.first() {
        Some(largest) => Ok(*largest),
        None => fallback(),
    }
}

/// On-screen preview size: the camera resolution, turned to match the screen
pub fn preview_resolution(camera: Resolution, screen: Resolution) -> Resolution {
    if screen.is_portrait() == camera.is_portrait() {
        camera
    } else {
        camera.swapped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(facing: CameraFacing, orientation: u32) -> DeviceInfo {
        DeviceInfo {
            index: 0,
            name: "test".to_string(),
            facing,
            orientation,
        }
    }

    #[test]
    fn test_camera_rotation_back_camera() {
        let back = info(CameraFacing::Back, 90);
        assert_eq!(camera_rotation(Rotation::None, &back), Rotation::Rotate90);
        assert_eq!(camera_rotation(Rotation::Rotate90, &back), Rotation::None);
        assert_eq!(camera_rotation(Rotation::Rotate270, &back), Rotation::Rotate180);
    }

    #[test]
    fn test_camera_rotation_front_camera_is_mirrored() {
        let front = info(CameraFacing::Front, 270);
        assert_eq!(camera_rotation(Rotation::None, &front), Rotation::Rotate90);
    }

    #[test]
    fn test_best_preview_size_exact_match() {
        let params = CameraParameters {
            supported_preview_sizes: vec![
                Resolution::new(640, 480),
                Resolution::new(1920, 1080),
                Resolution::new(1280, 720),
            ],
            ..Default::default()
        };
        let best = find_best_preview_size(&params, Resolution::new(720, 1280), 480 * 320);
        assert_eq!(best, Ok(Resolution::new(1280, 720)));
    }

    #[test]
    fn test_best_preview_size_largest_when_no_match() {
        let params = CameraParameters {
            supported_preview_sizes: vec![
                Resolution::new(320, 240),
                Resolution::new(640, 480),
                Resolution::new(800, 600),
            ],
            ..Default::default()
        };
        let best = find_best_preview_size(&params, Resolution::new(1080, 2340), 480 * 320);
        assert_eq!(best, Ok(Resolution::new(800, 600)));
    }

    #[test]
    fn test_best_preview_size_falls_back_to_current() {
        let params = CameraParameters {
            preview_size: Some(Resolution::new(176, 144)),
            supported_preview_sizes: vec![Resolution::new(176, 144)],
            ..Default::default()
        };
        let best = find_best_preview_size(&params, Resolution::new(1920, 1080), 480 * 320);
        assert_eq!(best, Ok(Resolution::new(176, 144)));

        let empty = CameraParameters::default();
        assert!(find_best_preview_size(&empty, Resolution::new(1920, 1080), 0).is_err());
    }

    #[test]
    fn test_preview_resolution_follows_screen() {
        let camera = Resolution::new(1280, 720);
        assert_eq!(
            preview_resolution(camera, Resolution::new(1080, 1920)),
            Resolution::new(720, 1280)
        );
        assert_eq!(preview_resolution(camera, Resolution::new(1920, 1080)), camera);
    }

    /// Device that rejects the first `rejections` parameter sets
    struct PickyDevice {
        current: CameraParameters,
        rejections: usize,
        applied: Vec<Option<Resolution>>,
    }

    impl FrameSource for PickyDevice {
        fn open(&mut self) -> BackendResult<DeviceInfo> {
            Ok(info(CameraFacing::Back, 0))
        }
        fn parameters(&self) -> BackendResult<CameraParameters> {
            Ok(self.current.clone())
        }
        fn apply_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()> {
            self.applied.push(parameters.preview_size);
            if self.rejections > 0 {
                self.rejections -= 1;
                return Err(BackendError::ParametersRejected("busy".into()));
            }
            self.current = parameters.clone();
            Ok(())
        }
        fn start_preview(&mut self) -> BackendResult<()> {
            Ok(())
        }
        fn stop_preview(&mut self) {}
        fn request_one_frame(&mut self, _callback: FrameCallback) {}
        fn close(&mut self) {}
    }

    fn picky(rejections: usize) -> PickyDevice {
        PickyDevice {
            current: CameraParameters {
                preview_size: Some(Resolution::new(640, 480)),
                supported_preview_sizes: vec![Resolution::new(640, 480), Resolution::new(1280, 720)],
                ..Default::default()
            },
            rejections,
            applied: Vec::new(),
        }
    }

    fn negotiate(device: &mut PickyDevice) -> CameraConfig {
        let manager = CameraConfigManager::new(&ScanConfig::default());
        let parameters = device.parameters().unwrap();
        let mut config = manager
            .init_from_parameters(&parameters, &info(CameraFacing::Back, 0), &DisplayInfo::default())
            .unwrap();
        manager.apply_desired_parameters(device, &mut config).unwrap();
        config
    }

    #[test]
    fn test_safe_mode_retry_after_rejection() {
        let mut device = picky(1);
        let config = negotiate(&mut device);

        let hd = Some(Resolution::new(1280, 720));
        let vga = Some(Resolution::new(640, 480));
        // desired, restore snapshot, desired again
        assert_eq!(device.applied, vec![hd, vga, hd]);
        assert_eq!(device.current.preview_size, hd);
        assert_eq!(config.resolution, Resolution::new(1280, 720));
    }

    #[test]
    fn test_gives_up_and_adopts_device_size() {
        let mut device = picky(2);
        let config = negotiate(&mut device);

        assert_eq!(device.applied.len(), 2);
        assert_eq!(config.resolution, Resolution::new(640, 480));
        assert_eq!(config.preview_resolution, Resolution::new(640, 480));
        assert_eq!(config.preview_rect, Some(PreviewRect::new(176, 96, 288, 288)));
    }
}
