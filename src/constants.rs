// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application directory name under the platform config/data dirs
pub const APP_DIR_NAME: &str = "codeshelf";

/// Scan pipeline tuning
pub mod scan {
    use super::Duration;

    /// Identical consecutive decodes inside this window are emitted once
    pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

    /// Frames are downscaled so their longest side is at most this many pixels.
    /// QR codes held up to a camera stay detectable at this size.
    pub const MAX_DETECT_DIMENSION: u32 = 640;

    /// Number of horizontal scanlines the EAN-13 detector tries per frame
    pub const EAN_SCAN_ROWS: usize = 15;

    /// Relative tolerance when matching EAN guard bar widths
    pub const EAN_GUARD_TOLERANCE: f32 = 0.5;
}

/// Bitmap rendering defaults
pub mod render {
    /// Pixels per module
    pub const MODULE_SCALE: u32 = 8;

    /// Quiet zone in modules around a QR symbol
    pub const QR_QUIET_ZONE: u32 = 4;

    /// Quiet zone in modules left and right of an EAN-13 symbol
    pub const EAN_QUIET_ZONE: u32 = 11;

    /// Bar height of rendered EAN-13 symbols, in modules
    pub const EAN_BAR_HEIGHT: u32 = 60;

    /// Largest accepted `render_scale`
    pub const MAX_MODULE_SCALE: u32 = 64;

    /// Largest accepted `quiet_zone`, in modules
    pub const MAX_QUIET_ZONE: u32 = 32;

    /// Longest side of a rendered image, in pixels
    pub const MAX_IMAGE_SIDE: u32 = 16_384;
}

/// File names under the data/config directories
pub mod storage {
    pub const DATABASE_FILE: &str = "codes.db";

    pub const CONFIG_FILE: &str = "config.json";

    pub const LOG_FILE: &str = "codeshelf.log";
}

pub mod file_formats {
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

pub mod timing {
    use super::Duration;

    /// How often the directory watcher looks for new images
    pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Terminal UI input poll timeout
    pub const UI_TICK: Duration = Duration::from_millis(50);

    /// How long a status line message stays up
    pub const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
}

/// Version string embedded by build.rs
pub fn app_version() -> &'static str {
    env!("GIT_VERSION")
}
