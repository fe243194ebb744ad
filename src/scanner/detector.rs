// SPDX-License-Identifier: GPL-3.0-only

//! Barcode detectors
//!
//! A [`Detector`] looks at one luma image and returns every code it could
//! decode. Finding nothing is an empty result, not an error.

use super::ean::Ean13Detector;
use super::frame::LumaImage;
use crate::code::CodeFormat;
use crate::errors::DetectorError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FrameRegion {
    /// Normalize a pixel rectangle against the image it was found in
    pub fn from_pixels(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let clamp = |v: f32| v.clamp(0.0, 1.0);
        Self {
            x: clamp(x / image_width as f32),
            y: clamp(y / image_height as f32),
            width: clamp(width / image_width as f32),
            height: clamp(height / image_height as f32),
        }
    }
}

/// One decoded code in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub content: String,
    pub format: CodeFormat,
    pub bounds: Option<FrameRegion>,
}

/// Frame analysis strategy
pub trait Detector: Send + Sync {
    fn detect(&self, image: &LumaImage) -> Result<Vec<Decoded>, DetectorError>;
}

/// Detectors that can be enabled from the config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Qr,
    Ean13,
}

impl DetectorKind {
    pub fn build(self) -> Box<dyn Detector> {
        match self {
            DetectorKind::Qr => Box::new(QrDetector),
            DetectorKind::Ean13 => Box::new(Ean13Detector::default()),
        }
    }
}

/// QR detection via rqrr
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDetector;

impl Detector for QrDetector {
    fn detect(&self, image: &LumaImage) -> Result<Vec<Decoded>, DetectorError> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
                image.get(x as u32, y as u32)
            });

        let grids = prepared.detect_grids();
        trace!(count = grids.len(), "QR grids located");

        let mut found = Vec::with_capacity(grids.len());
        for grid in grids {
            let content = match grid.decode() {
                Ok((_meta, content)) => content,
                Err(e) => {
                    debug!(error = ?e, "Failed to decode QR grid");
                    continue;
                }
            };
            if content.is_empty() {
                continue;
            }

            let xs = grid.bounds.iter().map(|p| p.x as f32);
            let ys = grid.bounds.iter().map(|p| p.y as f32);
            let min_x = xs.clone().fold(f32::MAX, f32::min).max(0.0);
            let max_x = xs.fold(f32::MIN, f32::max);
            let min_y = ys.clone().fold(f32::MAX, f32::min).max(0.0);
            let max_y = ys.fold(f32::MIN, f32::max);

            let bounds = FrameRegion::from_pixels(
                min_x,
                min_y,
                max_x - min_x,
                max_y - min_y,
                image.width(),
                image.height(),
            );

            found.push(Decoded {
                content,
                format: CodeFormat::Qr,
                bounds: Some(bounds),
            });
        }

        Ok(found)
    }
}

/// Runs several detectors on the same image and merges their results
pub struct CompositeDetector {
    detectors: Vec<Box<dyn Detector>>,
}

impl CompositeDetector {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn from_kinds(kinds: &[DetectorKind]) -> Self {
        let mut seen = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        Self::new(seen.into_iter().map(DetectorKind::build).collect())
    }
}

impl Detector for CompositeDetector {
    /// Fails only when every detector failed; otherwise partial results win
    fn detect(&self, image: &LumaImage) -> Result<Vec<Decoded>, DetectorError> {
        let mut found: Vec<Decoded> = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for detector in &self.detectors {
            match detector.detect(image) {
                Ok(decoded) => {
                    for d in decoded {
                        if !found
                            .iter()
                            .any(|f| f.content == d.content && f.format == d.format)
                        {
                            found.push(d);
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Detector failed");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failures == self.detectors.len() => Err(e),
            _ => Ok(found),
        }
    }
}
