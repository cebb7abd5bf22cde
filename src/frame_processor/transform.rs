// SPDX-License-Identifier: GPL-3.0-only

//! Luminance plane rotation
//!
//! Camera sensors are mounted sideways relative to the display, so the
//! luminance plane is rotated into display orientation before the scan window
//! is cropped out of it. Rotation is clockwise; 90 and 270 swap the
//! dimensions.

use crate::backends::camera::types::Rotation;
use crate::errors::FrameRejection;
use std::borrow::Cow;

/// A luminance plane after rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFrame<'a> {
    /// Exactly `width * height` bytes, row-major
    pub data: Cow<'a, [u8]>,
    pub width: u32,
    pub height: u32,
}

impl RotatedFrame<'_> {
    pub fn into_owned(self) -> RotatedFrame<'static> {
        RotatedFrame {
            data: Cow::Owned(self.data.into_owned()),
            width: self.width,
            height: self.height,
        }
    }
}

/// Rotate the luminance plane of `data` (`width` x `height`, row-major)
///
/// Only the first `width * height` bytes are read, trailing chroma is
/// ignored. No rotation borrows the input without copying.
pub fn rotate_luminance(
    data: &[u8],
    width: u32,
    height: u32,
    rotation: Rotation,
) -> Result<RotatedFrame<'_>, FrameRejection> {
    let w = width as usize;
    let h = height as usize;
    let len = w * h;
    let Some(plane) = data.get(..len) else {
        return Err(FrameRejection::ShortBuffer {
            expected: len,
            actual: data.len(),
        });
    };

    let frame = match rotation {
        Rotation::None => RotatedFrame {
            data: Cow::Borrowed(plane),
            width,
            height,
        },
        Rotation::Rotate90 => {
            let mut out = vec![0u8; len];
            for y in 0..h {
                let row = &plane[y * w..(y + 1) * w];
                for (x, &px) in row.iter().enumerate() {
                    out[x * h + (h - y - 1)] = px;
                }
            }
            RotatedFrame {
                data: Cow::Owned(out),
                width: height,
                height: width,
            }
        }
        Rotation::Rotate180 => {
            let mut out = plane.to_vec();
            out.reverse();
            RotatedFrame {
                data: Cow::Owned(out),
                width,
                height,
            }
        }
        Rotation::Rotate270 => {
            let mut out = vec![0u8; len];
            for y in 0..h {
                let row = &plane[y * w..(y + 1) * w];
                for (x, &px) in row.iter().enumerate() {
                    out[(w - x - 1) * h + y] = px;
                }
            }
            RotatedFrame {
                data: Cow::Owned(out),
                width: height,
                height: width,
            }
        }
    };

    Ok(frame)
}
