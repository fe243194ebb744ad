// SPDX-License-Identifier: GPL-3.0-only

//! EAN-13 scanline detector
//!
//! Reads a handful of horizontal rows, thresholds each one at the midpoint of
//! its brightness range and matches bar/space run widths against the EAN-13
//! tables. Rows are tried both ways so upside-down symbols decode too.

use super::detector::{Decoded, Detector, FrameRegion};
use super::frame::LumaImage;
use crate::code::CodeFormat;
use crate::constants::scan;
use crate::ean13::{self, CodeSet};
use crate::errors::DetectorError;
use tracing::trace;

/// Runs in a full symbol: 3 + 6*4 + 5 + 6*4 + 3
const SYMBOL_RUNS: usize = 59;

/// Minimum brightness spread for a row to be worth thresholding
const MIN_CONTRAST: u8 = 40;

/// Largest accepted per-digit width error, in modules
const MAX_DIGIT_ERROR: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct Ean13Detector {
    rows: usize,
    guard_tolerance: f32,
}

impl Default for Ean13Detector {
    fn default() -> Self {
        Self {
            rows: scan::EAN_SCAN_ROWS,
            guard_tolerance: scan::EAN_GUARD_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dark: bool,
    start: usize,
    len: f32,
}

impl Ean13Detector {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows: rows.max(1),
            ..Self::default()
        }
    }

    fn scan_row(&self, row: &[u8]) -> Option<(String, usize, usize)> {
        let runs = runs_of(row)?;
        if let Some(hit) = self.decode_runs(&runs) {
            return Some(hit);
        }

        // Upside down: walk the row right to left
        let width = row.len();
        let reversed: Vec<Run> = runs
            .iter()
            .rev()
            .map(|r| Run {
                dark: r.dark,
                start: width - r.start - r.len as usize,
                len: r.len,
            })
            .collect();
        self.decode_runs(&reversed)
    }

    /// Returns the digits plus the pixel span of the symbol
    fn decode_runs(&self, runs: &[Run]) -> Option<(String, usize, usize)> {
        if runs.len() < SYMBOL_RUNS {
            return None;
        }
        (0..=runs.len() - SYMBOL_RUNS)
            .filter(|&i| runs[i].dark)
            .find_map(|i| self.decode_at(&runs[i..i + SYMBOL_RUNS], i > 0))
    }

    fn decode_at(&self, symbol: &[Run], has_leading_space: bool) -> Option<(String, usize, usize)> {
        if !has_leading_space {
            return None;
        }

        let total: f32 = symbol.iter().map(|r| r.len).sum();
        let module = total / ean13::SYMBOL_MODULES as f32;
        let guard_ok = |runs: &[Run]| {
            runs.iter()
                .all(|r| (r.len - module).abs() <= module * self.guard_tolerance.max(0.3) + 0.5)
        };

        if !guard_ok(&symbol[0..3]) || !guard_ok(&symbol[27..32]) || !guard_ok(&symbol[56..59]) {
            return None;
        }

        let mut digits = [0u8; ean13::DIGITS];
        let mut sets = [CodeSet::L; 6];

        for k in 0..6 {
            let widths = widths4(&symbol[3 + k * 4..7 + k * 4]);
            let (digit, set, error) = ean13::match_digit(widths, true)?;
            if error > MAX_DIGIT_ERROR {
                return None;
            }
            digits[k + 1] = digit;
            sets[k] = set;
        }
        for k in 0..6 {
            let widths = widths4(&symbol[32 + k * 4..36 + k * 4]);
            let (digit, _, error) = ean13::match_digit(widths, false)?;
            if error > MAX_DIGIT_ERROR {
                return None;
            }
            digits[k + 7] = digit;
        }

        digits[0] = ean13::first_digit_for(&sets)?;
        if ean13::check_digit(&digits) != digits[12] {
            trace!("EAN-13 candidate failed check digit");
            return None;
        }

        let text: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        let start = symbol[0].start;
        let end = symbol[58].start + symbol[58].len as usize;
        Some((text, start.min(end), start.max(end)))
    }
}

fn widths4(runs: &[Run]) -> [f32; 4] {
    [runs[0].len, runs[1].len, runs[2].len, runs[3].len]
}

/// Threshold a row at the midpoint of its range and collect runs
fn runs_of(row: &[u8]) -> Option<Vec<Run>> {
    let min = *row.iter().min()?;
    let max = *row.iter().max()?;
    if max - min < MIN_CONTRAST {
        return None;
    }
    let threshold = ((min as u16 + max as u16) / 2) as u8;

    let mut runs: Vec<Run> = Vec::new();
    for (x, &value) in row.iter().enumerate() {
        let dark = value < threshold;
        match runs.last_mut() {
            Some(run) if run.dark == dark => run.len += 1.0,
            _ => runs.push(Run {
                dark,
                start: x,
                len: 1.0,
            }),
        }
    }
    Some(runs)
}

impl Detector for Ean13Detector {
    fn detect(&self, image: &LumaImage) -> Result<Vec<Decoded>, DetectorError> {
        let height = image.height();
        let rows = self.rows as u32;

        for k in 0..rows {
            let y = height * (k + 1) / (rows + 1);
            let Some((content, start, end)) = self.scan_row(image.row(y)) else {
                continue;
            };

            trace!(row = y, content = %content, "EAN-13 decoded");
            let bounds = FrameRegion::from_pixels(
                start as f32,
                y as f32,
                (end - start) as f32,
                1.0,
                image.width(),
                image.height(),
            );
            return Ok(vec![Decoded {
                content,
                format: CodeFormat::Ean13,
                bounds: Some(bounds),
            }]);
        }

        Ok(Vec::new())
    }
}
