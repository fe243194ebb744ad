// SPDX-License-Identifier: GPL-3.0-only

//! In-memory code store
//!
//! Used by tests. `set_available(false)` makes
//! every call fail with [`StorageError::Unavailable`].

use super::{CodeStore, DeleteOutcome, newest_first};
use crate::code::{Code, CodeId, NewCode};
use crate::errors::StorageError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: i64,
    codes: Vec<Code>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    available: AtomicBool,
    inserts: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                codes: Vec::new(),
            }),
            available: AtomicBool::new(true),
            inserts: AtomicUsize::new(0),
        }
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful inserts since creation
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StorageError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        self.inner
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl CodeStore for MemoryStore {
    fn insert(&self, code: &NewCode) -> Result<Code, StorageError> {
        let mut inner = self.lock()?;
        let id = CodeId(inner.next_id);
        inner.next_id += 1;
        let code = code.clone().into_code(id);
        inner.codes.push(code.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(code)
    }

    fn delete(&self, id: CodeId) -> Result<DeleteOutcome, StorageError> {
        let mut inner = self.lock()?;
        let before = inner.codes.len();
        inner.codes.retain(|c| c.id != id);
        Ok(if inner.codes.len() == before {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }

    fn list_all(&self) -> Result<Vec<Code>, StorageError> {
        let inner = self.lock()?;
        let mut codes = inner.codes.clone();
        codes.sort_by(newest_first);
        Ok(codes)
    }

    fn get(&self, id: CodeId) -> Result<Option<Code>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.codes.iter().find(|c| c.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeFormat;

    #[test]
    fn test_unavailable_store_fails_without_side_effects() {
        let store = MemoryStore::new();
        store
            .insert(&NewCode::new("kept", CodeFormat::Qr).unwrap())
            .unwrap();

        store.set_available(false);
        assert!(matches!(
            store.insert(&NewCode::new("lost", CodeFormat::Qr).unwrap()),
            Err(StorageError::Unavailable(_))
        ));

        store.set_available(true);
        let codes = store.list_all().unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].content, "kept");
        assert_eq!(store.insert_count(), 1);
    }
}
