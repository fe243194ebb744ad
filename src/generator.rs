// SPDX-License-Identifier: GPL-3.0-only

//! Code generation
//!
//! Turns text into a [`CodeMatrix`] of dark/light modules. Rendering is kept
//! separate: the same matrix becomes a PNG, a `GrayImage` for the preview, or
//! half-block text for the terminal. Nothing here touches the store.

use crate::code::CodeFormat;
use crate::constants::render;
use crate::ean13;
use crate::errors::{AppResult, GenerationError};
use image::{GrayImage, ImageFormat, Luma};
use qrcode::QrCode;
use qrcode::types::QrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// QR error correction level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    #[default]
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl EcLevel {
    pub const ALL: [EcLevel; 4] = [EcLevel::L, EcLevel::M, EcLevel::Q, EcLevel::H];

    /// Byte-mode capacity of a version 40 symbol at this level
    pub fn byte_capacity(self) -> usize {
        match self {
            EcLevel::L => 2953,
            EcLevel::M => 2331,
            EcLevel::Q => 1663,
            EcLevel::H => 1273,
        }
    }

    fn to_qrcode(self) -> qrcode::EcLevel {
        match self {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        }
    }

    /// Next level, wrapping around (terminal UI toggle)
    pub fn next(self) -> Self {
        match self {
            EcLevel::L => EcLevel::M,
            EcLevel::M => EcLevel::Q,
            EcLevel::Q => EcLevel::H,
            EcLevel::H => EcLevel::L,
        }
    }
}

impl fmt::Display for EcLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EcLevel::L => "L",
            EcLevel::M => "M",
            EcLevel::Q => "Q",
            EcLevel::H => "H",
        };
        f.write_str(name)
    }
}

impl FromStr for EcLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EcLevel::ALL
            .into_iter()
            .find(|level| level.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown error correction level '{}' (use L, M, Q or H)", s))
    }
}

/// Encoder settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub ec_level: EcLevel,
}

/// Bitmap settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Pixels per module
    pub scale: u32,
    /// Quiet zone in modules
    pub quiet_zone: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: render::MODULE_SCALE,
            quiet_zone: render::QR_QUIET_ZONE,
        }
    }
}

/// Row-major module grid; 1-D symbologies have a height of one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMatrix {
    format: CodeFormat,
    width: usize,
    height: usize,
    modules: Vec<bool>,
    /// Text actually encoded (EAN-13 gains its check digit)
    text: String,
}

impl CodeMatrix {
    pub fn format(&self) -> &CodeFormat {
        &self.format
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_linear(&self) -> bool {
        self.height == 1
    }

    /// Module at (x, y); outside the grid is light
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.modules[y * self.width + x]
    }

    /// Minimum side quiet zone and drawn rows; linear codes are stretched
    /// to their bar height
    fn drawn(&self) -> (usize, usize) {
        if self.is_linear() {
            (
                render::EAN_QUIET_ZONE as usize,
                render::EAN_BAR_HEIGHT as usize,
            )
        } else {
            (0, self.height)
        }
    }

    fn drawn_dark(&self, x: usize, y: usize) -> bool {
        if self.is_linear() {
            self.get(x, 0)
        } else {
            self.get(x, y)
        }
    }

    /// Render black modules on white with a quiet zone
    ///
    /// Fails with [`GenerationError::Render`] when a side would exceed
    /// [`render::MAX_IMAGE_SIDE`] pixels.
    pub fn to_image(&self, options: &RenderOptions) -> Result<GrayImage, GenerationError> {
        let scale = options.scale.max(1);
        let quiet = options.quiet_zone as usize;
        let (min_side_quiet, rows) = self.drawn();
        let side = quiet.max(min_side_quiet);

        let pixels = |modules: Option<usize>| {
            modules
                .and_then(|m| u32::try_from(m).ok())
                .and_then(|m| m.checked_mul(scale))
                .filter(|px| *px <= render::MAX_IMAGE_SIDE)
        };
        let (Some(width), Some(height)) = (
            pixels(side.checked_mul(2).and_then(|q| q.checked_add(self.width))),
            pixels(quiet.checked_mul(2).and_then(|q| q.checked_add(rows))),
        ) else {
            return Err(GenerationError::Render(format!(
                "image at scale {} with quiet zone {} exceeds {} pixels per side",
                scale,
                options.quiet_zone,
                render::MAX_IMAGE_SIDE
            )));
        };
        let mut image = GrayImage::from_pixel(width, height, Luma([255u8]));

        for y in 0..rows {
            for x in 0..self.width {
                if !self.drawn_dark(x, y) {
                    continue;
                }
                let px = (x + side) as u32 * scale;
                let py = (y + quiet) as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        image.put_pixel(px + dx, py + dy, Luma([0u8]));
                    }
                }
            }
        }

        Ok(image)
    }

    /// Write the rendered bitmap as PNG
    pub fn save_png(&self, path: &Path, options: &RenderOptions) -> AppResult<()> {
        let image = self.to_image(options)?;
        image.save_with_format(path, ImageFormat::Png)?;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "Saved code image");
        Ok(())
    }

    /// Render as lines of half-block characters, two module rows per line
    ///
    /// Light modules are drawn, so the output reads on dark terminals.
    pub fn to_half_blocks(&self, quiet_zone: usize) -> Vec<String> {
        let (min_side_quiet, rows) = self.drawn();
        // Text cells are about twice as tall as wide, so shorten bars
        let rows = if self.is_linear() { rows / 4 } else { rows };
        let side = quiet_zone.max(min_side_quiet / 2);

        let total_w = self.width + side * 2;
        let total_h = rows + quiet_zone * 2;
        let light = |x: usize, y: usize| -> bool {
            if x < side || y < quiet_zone || x >= side + self.width || y >= quiet_zone + rows {
                return true;
            }
            !self.drawn_dark(x - side, y - quiet_zone)
        };

        (0..total_h.div_ceil(2))
            .map(|line| {
                let top = line * 2;
                (0..total_w)
                    .map(|x| {
                        let upper = light(x, top);
                        let lower = top + 1 >= total_h || light(x, top + 1);
                        match (upper, lower) {
                            (true, true) => '█',
                            (true, false) => '▀',
                            (false, true) => '▄',
                            (false, false) => ' ',
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Encode `text` in `format`
pub fn generate(
    text: &str,
    format: &CodeFormat,
    options: &GenerateOptions,
) -> Result<CodeMatrix, GenerationError> {
    if text.is_empty() {
        return Err(GenerationError::EmptyInput);
    }

    let matrix = match format {
        CodeFormat::Qr => generate_qr(text, options.ec_level)?,
        CodeFormat::Ean13 => generate_ean13(text)?,
        other => return Err(GenerationError::UnsupportedFormat(other.clone())),
    };

    debug!(
        format = %matrix.format,
        width = matrix.width,
        height = matrix.height,
        "Generated code"
    );
    Ok(matrix)
}

fn generate_qr(text: &str, level: EcLevel) -> Result<CodeMatrix, GenerationError> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), level.to_qrcode()).map_err(
        |e| match e {
            QrError::DataTooLong => GenerationError::CapacityExceeded {
                format: CodeFormat::Qr,
                limit: level.byte_capacity(),
            },
            e => GenerationError::Render(e.to_string()),
        },
    )?;

    let width = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|c| c == qrcode::Color::Dark)
        .collect();

    Ok(CodeMatrix {
        format: CodeFormat::Qr,
        width,
        height: width,
        modules,
        text: text.to_string(),
    })
}

/// 12 digits get a check digit appended; 13 digits must carry the right one
fn generate_ean13(text: &str) -> Result<CodeMatrix, GenerationError> {
    let mut digits = ean13::parse_digits(text).map_err(|(position, character)| {
        GenerationError::UnsupportedCharacter {
            format: CodeFormat::Ean13,
            character,
            position,
        }
    })?;

    match digits.len() {
        n if n > ean13::DIGITS => {
            return Err(GenerationError::CapacityExceeded {
                format: CodeFormat::Ean13,
                limit: ean13::DIGITS,
            });
        }
        n if n < ean13::DIGITS - 1 => {
            return Err(GenerationError::TooShort {
                format: CodeFormat::Ean13,
                minimum: ean13::DIGITS - 1,
                found: n,
            });
        }
        n if n == ean13::DIGITS - 1 => digits.push(ean13::check_digit(&digits)),
        _ => {
            let expected = ean13::check_digit(&digits[..ean13::DIGITS - 1]);
            let found = digits[ean13::DIGITS - 1];
            if expected != found {
                return Err(GenerationError::InvalidCheckDigit { expected, found });
            }
        }
    }

    let text: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
    let digits: [u8; ean13::DIGITS] = digits
        .try_into()
        .map_err(|_| GenerationError::Render("EAN-13 digit count".into()))?;
    let modules = ean13::encode_modules(&digits);

    Ok(CodeMatrix {
        format: CodeFormat::Ean13,
        width: modules.len(),
        height: 1,
        modules,
        text,
    })
}
