// SPDX-License-Identifier: GPL-3.0-only

//! Persistent code storage
//!
//! [`CodeStore`] is the seam between the repository and the database.
//! [`SqliteStore`] is the real backend; [`MemoryStore`] keeps everything in
//! process and can simulate an unavailable store.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::code::{Code, CodeId, NewCode};
use crate::errors::StorageError;

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Storage contract for codes
///
/// Implementations are blocking; callers on an async runtime move calls onto
/// a blocking worker. `list_all` is ordered newest first (`created_at`
/// descending, then `id` descending) and the order only depends on persisted
/// columns, so it is the same after a restart.
pub trait CodeStore: Send + Sync {
    /// Persist a code and return it with its new identifier
    fn insert(&self, code: &NewCode) -> Result<Code, StorageError>;

    /// Remove a code; a missing id leaves the store unchanged
    fn delete(&self, id: CodeId) -> Result<DeleteOutcome, StorageError>;

    /// All codes, newest first
    fn list_all(&self) -> Result<Vec<Code>, StorageError>;

    /// Look up a single code
    fn get(&self, id: CodeId) -> Result<Option<Code>, StorageError>;
}

/// Ordering shared by every backend: newest first, ties broken by id
pub(crate) fn newest_first(a: &Code, b: &Code) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
