// SPDX-License-Identifier: MPL-2.0

//! Integration tests for code generation
//!
//! Generated images are fed back through the scanner's detectors, so these
//! also cover the renderer's quiet zones and scaling.

use codeshelf::errors::GenerationError;
use codeshelf::scanner::{Detector, Ean13Detector, LumaImage, QrDetector};
use codeshelf::{CodeFormat, EcLevel, GenerateOptions, RenderOptions, generate};

#[test]
fn test_generated_qr_decodes_to_same_text() {
    let text = "https://example.com/shelf?id=42";
    for level in EcLevel::ALL {
        let matrix = generate(text, &CodeFormat::Qr, &GenerateOptions { ec_level: level }).unwrap();
        let image = LumaImage::from(matrix.to_image(&RenderOptions::default()).unwrap());

        let found = QrDetector.detect(&image).unwrap();
        assert_eq!(found.len(), 1, "level {level}");
        assert_eq!(found[0].content, text);
        assert_eq!(found[0].format, CodeFormat::Qr);
    }
}

fn decode_qr(text: &str, level: EcLevel, scale: u32) -> String {
    let matrix = generate(text, &CodeFormat::Qr, &GenerateOptions { ec_level: level })
        .unwrap_or_else(|e| panic!("{} bytes at {level}: {e}", text.len()));
    let options = RenderOptions {
        scale,
        quiet_zone: 4,
    };
    let image = LumaImage::from(matrix.to_image(&options).unwrap());
    let found = QrDetector.detect(&image).unwrap();
    assert_eq!(found.len(), 1, "{} bytes at {level}", text.len());
    found[0].content.clone()
}

#[test]
fn test_qr_round_trips_across_input_kinds() {
    let cases = [
        // Byte mode with multi-byte UTF-8
        ("Café crème, jalapeño, smörgåsbord, αβγ", EcLevel::M),
        // Numeric mode, leading zeros kept
        ("00012345678901234567890123456789", EcLevel::Q),
        // Alphanumeric mode
        ("SHELF-042 AISLE 7", EcLevel::H),
        ("mixed 123 ABC def ü", EcLevel::L),
    ];
    for (text, level) in cases {
        assert_eq!(decode_qr(text, level, 4), text);
    }
}

#[test]
fn test_qr_round_trips_at_full_capacity() {
    for level in [EcLevel::H, EcLevel::L] {
        let text = "x".repeat(level.byte_capacity());
        assert_eq!(decode_qr(&text, level, 4), text);
    }
}

#[test]
fn test_ean13_round_trips_table() {
    let cases = [
        ("590123412345", "5901234123457"),
        ("5901234123457", "5901234123457"),
        // Leading zero selects the all-odd parity pattern
        ("001234567890", "0012345678905"),
        ("9780306406157", "9780306406157"),
    ];
    for (input, expected) in cases {
        let matrix = generate(input, &CodeFormat::Ean13, &GenerateOptions::default()).unwrap();
        assert_eq!(matrix.text(), expected);

        let image = LumaImage::from(matrix.to_image(&RenderOptions::default()).unwrap());
        let found = Ean13Detector::default().detect(&image).unwrap();
        assert_eq!(found.len(), 1, "{input}");
        assert_eq!(found[0].content, expected);
    }
}

#[test]
fn test_generated_ean13_decodes_with_check_digit() {
    let matrix = generate("400638133393", &CodeFormat::Ean13, &GenerateOptions::default()).unwrap();
    assert_eq!(matrix.text(), "4006381333931");

    let image = LumaImage::from(matrix.to_image(&RenderOptions::default()).unwrap());
    let found = Ean13Detector::default().detect(&image).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "4006381333931");
    assert_eq!(found[0].format, CodeFormat::Ean13);
}

#[test]
fn test_qr_over_capacity_reports_limit() {
    let text = "x".repeat(EcLevel::H.byte_capacity() + 1);
    let err = generate(&text, &CodeFormat::Qr, &GenerateOptions { ec_level: EcLevel::H })
        .unwrap_err();
    assert_eq!(
        err,
        GenerationError::CapacityExceeded {
            format: CodeFormat::Qr,
            limit: EcLevel::H.byte_capacity(),
        }
    );

    // The same text fits at a lower correction level
    assert!(generate(&text, &CodeFormat::Qr, &GenerateOptions { ec_level: EcLevel::L }).is_ok());
}

#[test]
fn test_png_export_can_be_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("code.png");

    let matrix = generate("hello shelf", &CodeFormat::Qr, &GenerateOptions::default()).unwrap();
    let options = RenderOptions {
        scale: 4,
        quiet_zone: 4,
    };
    matrix.save_png(&path, &options).unwrap();

    let reopened = image::open(&path).unwrap().to_luma8();
    let side = (matrix.width() as u32 + 8) * 4;
    assert_eq!(reopened.dimensions(), (side, side));

    let found = QrDetector.detect(&LumaImage::from(reopened)).unwrap();
    assert_eq!(found[0].content, "hello shelf");
}

#[test]
fn test_half_block_preview_is_rectangular() {
    let matrix = generate("preview", &CodeFormat::Qr, &GenerateOptions::default()).unwrap();
    let lines = matrix.to_half_blocks(2);

    let width = matrix.width() + 4;
    assert_eq!(lines.len(), (matrix.height() + 4).div_ceil(2));
    assert!(lines.iter().all(|line| line.chars().count() == width));
}
