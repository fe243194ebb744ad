// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use codeshelf::constants::{file_formats, render, scan, timing};

#[test]
fn test_detect_dimension_keeps_small_codes_readable() {
    // A 640px frame still leaves a version 10 QR several pixels per module
    assert!(scan::MAX_DETECT_DIMENSION >= 57 * 4);
}

#[test]
fn test_ean_quiet_zone_meets_symbology_minimum() {
    // EAN-13 requires 11 light modules before and 7 after the symbol
    assert!(render::EAN_QUIET_ZONE >= 11);
    assert!(render::QR_QUIET_ZONE >= 4);
}

#[test]
fn test_image_extensions_are_lowercase() {
    for ext in file_formats::IMAGE_EXTENSIONS {
        assert_eq!(*ext, ext.to_lowercase(), "Extension {} should be lowercase", ext);
        assert!(file_formats::is_image_extension(ext));
    }
}

#[test]
fn test_status_outlives_ui_tick() {
    assert!(timing::STATUS_TIMEOUT > timing::UI_TICK * 10);
}

#[test]
fn test_largest_symbol_renders_at_max_scale() {
    // Version 40 QR is 177 modules wide
    let modules = 177 + 2 * render::MAX_QUIET_ZONE;
    assert!(modules * render::MAX_MODULE_SCALE <= render::MAX_IMAGE_SIDE);

    let ean_rows = render::EAN_BAR_HEIGHT + 2 * render::MAX_QUIET_ZONE;
    assert!(ean_rows * render::MAX_MODULE_SCALE <= render::MAX_IMAGE_SIDE);
}
