// SPDX-License-Identifier: MPL-2.0

//! codeshelf - scan, keep and generate barcodes
//!
//! Codes are read from a frame stream, saved to a local SQLite database and
//! can be browsed, copied and deleted. New QR and EAN-13 codes are generated
//! from text and rendered to PNG or the terminal.
//!
//! # Architecture
//!
//! - [`store`]: persistent code table behind the [`store::CodeStore`] trait
//! - [`scanner`]: frame sources, detectors, debounce and the scan state machine
//! - [`repository`]: single owner of the observable list of saved codes
//! - [`generator`]: text to module matrix, PNG and terminal rendering
//! - [`terminal`]: three-screen terminal UI
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(SqliteStore::open(&config.database_path())?);
//! let repository = CodeRepository::open(store).await?;
//! repository.add("ABC123", CodeFormat::Qr).await?;
//! ```

pub mod code;
pub mod config;
pub mod constants;
pub mod content;
pub mod ean13;
pub mod errors;
pub mod generator;
pub mod repository;
pub mod scanner;
pub mod store;
pub mod terminal;

// Re-export commonly used types
pub use code::{Code, CodeFormat, CodeId, NewCode};
pub use config::Config;
pub use content::ContentKind;
pub use errors::{AppError, AppResult};
pub use generator::{CodeMatrix, EcLevel, GenerateOptions, RenderOptions, generate};
pub use repository::{CodeRepository, RepositoryListener, ScanNotice};
pub use store::{CodeStore, DeleteOutcome, MemoryStore, SqliteStore};
