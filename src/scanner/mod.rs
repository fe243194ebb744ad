// SPDX-License-Identifier: GPL-3.0-only

//! Barcode scanning
//!
//! Frames flow from a [`FrameSource`] into the [`ScanPipeline`], which
//! reduces them to luma, runs the configured [`Detector`]s on a blocking
//! worker, debounces repeats and reports new codes to a [`ScanListener`].

mod debounce;
mod detector;
mod ean;
mod frame;
mod pipeline;
mod source;

pub use debounce::Debouncer;
pub use detector::{CompositeDetector, Decoded, Detector, DetectorKind, FrameRegion, QrDetector};
pub use ean::Ean13Detector;
pub use frame::{Frame, LumaImage, PixelFormat};
pub use pipeline::{
    DecodeEvent, FrameOutcome, PermissionState, PipelineSettings, PipelineStats, ScanListener,
    ScanPipeline, ScanState, StopHandle,
};
pub use source::{DirectoryWatchSource, FrameSource, ImageFileSource};

use crate::config::Config;
use std::sync::Arc;

/// Build the detector set and pipeline settings described by a config
pub fn pipeline_from_config(config: &Config, listener: Arc<dyn ScanListener>) -> ScanPipeline {
    let detector = CompositeDetector::from_kinds(&config.enabled_detectors);
    ScanPipeline::new(
        Arc::new(detector),
        listener,
        PipelineSettings {
            max_dimension: Some(config.max_detect_dimension),
            debounce_window: config.debounce_window(),
        },
    )
}
