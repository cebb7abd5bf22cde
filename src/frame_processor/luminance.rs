// SPDX-License-Identifier: GPL-3.0-only

//! Cropped luminance view handed to decoders

use super::transform::RotatedFrame;
use super::types::Thumbnail;
use crate::backends::camera::types::PreviewRect;
use crate::errors::FrameRejection;
use image::GrayImage;
use image::codecs::jpeg::JpegEncoder;
use std::borrow::Cow;
use tracing::debug;

/// Greyscale pixels restricted to a rectangle of a larger plane
#[derive(Debug, Clone)]
pub struct LuminanceSource<'a> {
    data: Cow<'a, [u8]>,
    data_width: usize,
    left: usize,
    top: usize,
    width: u32,
    height: u32,
}

impl<'a> LuminanceSource<'a> {
    /// Crop a rotated frame to the scan window
    ///
    /// The window is tried against the frame as rotated first and then with
    /// the axes exchanged, since hosts may report the window in either
    /// orientation while the device settles.
    pub fn crop(
        frame: RotatedFrame<'a>,
        rect: Option<PreviewRect>,
    ) -> Result<Self, FrameRejection> {
        let rect = rect.ok_or(FrameRejection::NoPreviewRect)?;
        let (width, height) = (frame.width, frame.height);

        let data_width = if rect.fits_within(width, height) {
            width
        } else if rect.fits_within(height, width) {
            debug!(?rect, width, height, "Scan window fits swapped frame");
            height
        } else {
            return Err(FrameRejection::CropOutOfBounds {
                frame_width: width,
                frame_height: height,
            });
        };

        Ok(Self {
            data: frame.data,
            data_width: data_width as usize,
            left: rect.left as usize,
            top: rect.top as usize,
            width: rect.width,
            height: rect.height,
        })
    }

    /// Whole-image source
    pub fn from_gray(image: &'a GrayImage) -> Self {
        Self {
            data: Cow::Borrowed(image.as_raw()),
            data_width: image.width() as usize,
            left: 0,
            top: 0,
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixels of row `y` inside the window
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (self.top + y as usize) * self.data_width + self.left;
        &self.data[start..start + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.row(y)[x as usize]
    }

    /// Copy the window into a contiguous buffer
    pub fn matrix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        self.copy_into(&mut out);
        out
    }

    /// Append the window's pixels to `out`
    pub fn copy_into(&self, out: &mut Vec<u8>) {
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
    }

    /// Every `factor`-th pixel of the window in both directions
    pub fn subsample(&self, factor: u32) -> GrayImage {
        let factor = factor.max(1);
        let width = self.width / factor;
        let height = self.height / factor;
        GrayImage::from_fn(width, height, |x, y| {
            image::Luma([self.pixel(x * factor, y * factor)])
        })
    }

    /// JPEG thumbnail of the window
    ///
    /// Returns `None` when the window is too small to subsample or encoding
    /// fails.
    pub fn render_thumbnail(&self, factor: u32, quality: u8) -> Option<Thumbnail> {
        let image = self.subsample(factor);
        if image.width() == 0 || image.height() == 0 {
            return None;
        }

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        if let Err(e) = encoder.encode_image(&image) {
            debug!(error = %e, "Thumbnail encoding failed");
            return None;
        }

        Some(Thumbnail {
            width: image.width(),
            height: image.height(),
            jpeg,
        })
    }
}
