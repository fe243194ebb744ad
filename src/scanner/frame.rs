// SPDX-License-Identifier: GPL-3.0-only

//! Frames handed to the scan pipeline
//!
//! Detectors only need brightness, so every frame is reduced to a
//! [`LumaImage`] before analysis, with stride padding removed and the image
//! downscaled for speed.

use crate::errors::DetectorError;
use image::{DynamicImage, GrayImage};
use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of frame data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel
    Rgba,
    /// 3 bytes per pixel
    Rgb24,
    /// 1 byte per pixel
    Gray8,
    /// Y plane (`stride` bytes per row) followed by interleaved UV at half resolution
    Nv12,
    /// Packed 4:2:2, Y0 U Y1 V
    Yuyv,
}

impl PixelFormat {
    /// Bytes per pixel in the first plane
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 | PixelFormat::Nv12 => 1,
            PixelFormat::Yuyv => 2,
        }
    }
}

/// A single camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane, padding included
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// When the frame was captured
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap tightly packed pixel data
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
            data: data.into(),
            captured_at: Instant::now(),
        }
    }

    /// Build a grayscale frame from a decoded image
    pub fn from_image(image: &DynamicImage) -> Self {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        Self::new(width, height, PixelFormat::Gray8, gray.into_raw())
    }

    /// Check the buffer is large enough for the declared geometry
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel() as usize;
        if (self.stride as usize) < row_bytes {
            return Err(DetectorError::InvalidFrame(format!(
                "stride {} shorter than row of {} bytes",
                self.stride, row_bytes
            )));
        }
        let needed = self.stride as usize * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(DetectorError::InvalidFrame(format!(
                "{} bytes for {}x{} {:?}, need {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                needed
            )));
        }
        Ok(())
    }

    fn luma_at(&self, x: u32, y: u32) -> u8 {
        let row = y as usize * self.stride as usize;
        let data = &self.data;
        match self.format {
            PixelFormat::Gray8 | PixelFormat::Nv12 => data[row + x as usize],
            PixelFormat::Yuyv => data[row + x as usize * 2],
            PixelFormat::Rgba | PixelFormat::Rgb24 => {
                let idx = row + (x * self.format.bytes_per_pixel()) as usize;
                rgb_to_luma(data[idx], data[idx + 1], data[idx + 2])
            }
        }
    }

    /// Reduce to luma, downscaling so the longest side is at most `max_dimension`
    pub fn to_luma(&self, max_dimension: Option<u32>) -> Result<LumaImage, DetectorError> {
        self.validate()?;

        let (width, height) = (self.width, self.height);
        let scale = match max_dimension {
            Some(max) if width > max || height > max => {
                (width as f32 / max as f32).max(height as f32 / max as f32)
            }
            _ => 1.0,
        };

        if scale == 1.0 {
            let mut pixels = Vec::with_capacity((width * height) as usize);
            for y in 0..height {
                for x in 0..width {
                    pixels.push(self.luma_at(x, y));
                }
            }
            return Ok(LumaImage::new(width, height, pixels, 1.0));
        }

        let dst_width = ((width as f32 / scale) as u32).max(1);
        let dst_height = ((height as f32 / scale) as u32).max(1);
        let x_ratio = width as f32 / dst_width as f32;
        let y_ratio = height as f32 / dst_height as f32;

        let mut pixels = Vec::with_capacity((dst_width * dst_height) as usize);
        for y in 0..dst_height {
            for x in 0..dst_width {
                let src_x = x as f32 * x_ratio;
                let src_y = y as f32 * y_ratio;

                let x0 = src_x as u32;
                let y0 = src_y as u32;
                let x1 = (x0 + 1).min(width - 1);
                let y1 = (y0 + 1).min(height - 1);
                let x_frac = src_x - x0 as f32;
                let y_frac = src_y - y0 as f32;

                let p00 = self.luma_at(x0, y0) as f32;
                let p01 = self.luma_at(x1, y0) as f32;
                let p10 = self.luma_at(x0, y1) as f32;
                let p11 = self.luma_at(x1, y1) as f32;

                let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                    + p01 * x_frac * (1.0 - y_frac)
                    + p10 * (1.0 - x_frac) * y_frac
                    + p11 * x_frac * y_frac;
                pixels.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }

        Ok(LumaImage::new(
            dst_width,
            dst_height,
            pixels,
            width as f32 / dst_width as f32,
        ))
    }
}

/// BT.601 luma, integer approximation
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}

/// Tightly packed 8-bit brightness image
#[derive(Debug, Clone, PartialEq)]
pub struct LumaImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// Source pixels per luma pixel, for mapping positions back to the frame
    scale: f32,
}

impl LumaImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, scale: f32) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
            scale,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = (y * self.width) as usize;
        &self.pixels[start..start + self.width as usize]
    }
}

impl From<GrayImage> for LumaImage {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw(), 1.0)
    }
}
