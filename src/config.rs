// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in the platform config directory. Missing fields take
//! their defaults, so older files keep loading after new settings are added.

use crate::code::CodeFormat;
use crate::constants::{self, render, scan, storage, timing};
use crate::errors::{AppError, AppResult};
use crate::generator::{EcLevel, GenerateOptions, RenderOptions};
use crate::scanner::DetectorKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Current on-disk config version
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Format version of this file
    pub version: u32,
    /// Database location; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Duplicate decode suppression window in milliseconds
    pub debounce_ms: u64,
    /// Longest frame side fed to the detectors
    pub max_detect_dimension: u32,
    /// Format used by `generate` when none is given
    pub default_format: CodeFormat,
    /// QR error correction level for generated codes
    pub qr_ec_level: EcLevel,
    /// Pixels per module in rendered images
    pub render_scale: u32,
    /// Quiet zone in modules (QR); EAN-13 always uses its own minimum
    pub quiet_zone: u32,
    /// Directory watcher poll interval in milliseconds
    pub watch_poll_ms: u64,
    /// Detectors run on every frame
    pub enabled_detectors: Vec<DetectorKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            database_path: None,
            debounce_ms: scan::DEBOUNCE_WINDOW.as_millis() as u64,
            max_detect_dimension: scan::MAX_DETECT_DIMENSION,
            default_format: CodeFormat::Qr,
            qr_ec_level: EcLevel::default(),
            render_scale: render::MODULE_SCALE,
            quiet_zone: render::QR_QUIET_ZONE,
            watch_poll_ms: timing::WATCH_POLL_INTERVAL.as_millis() as u64,
            enabled_detectors: vec![DetectorKind::Qr, DetectorKind::Ean13],
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join(constants::APP_DIR_NAME)
            .join(storage::CONFIG_FILE)
    }

    /// Load config, falling back to defaults when the file is missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Load config; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> AppResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config: Config = serde_json::from_str(&text)?;
        if config.version > CONFIG_VERSION {
            warn!(
                found = config.version,
                supported = CONFIG_VERSION,
                "Config written by a newer version"
            );
        }
        config.validate()?;
        Ok(Some(config))
    }

    /// Write config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> AppResult<()> {
        if self.render_scale == 0 {
            return Err(AppError::Config("render_scale must be at least 1".into()));
        }
        if self.render_scale > render::MAX_MODULE_SCALE {
            return Err(AppError::Config(format!(
                "render_scale must be at most {}",
                render::MAX_MODULE_SCALE
            )));
        }
        if self.quiet_zone > render::MAX_QUIET_ZONE {
            return Err(AppError::Config(format!(
                "quiet_zone must be at most {}",
                render::MAX_QUIET_ZONE
            )));
        }
        if self.max_detect_dimension < 64 {
            return Err(AppError::Config(
                "max_detect_dimension must be at least 64".into(),
            ));
        }
        if self.enabled_detectors.is_empty() {
            return Err(AppError::Config("no detectors enabled".into()));
        }
        Ok(())
    }

    /// Database path, resolved against the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join(storage::DATABASE_FILE))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_ms.max(10))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            scale: self.render_scale,
            quiet_zone: self.quiet_zone,
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            ec_level: self.qr_ec_level,
        }
    }
}

/// Platform data directory for the database and logs
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(constants::APP_DIR_NAME)
}
