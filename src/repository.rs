// SPDX-License-Identifier: GPL-3.0-only

//! Code repository
//!
//! Single owner of the list of saved codes shown by every screen. Screens
//! read snapshots or subscribe to changes; all mutations go through here, are
//! serialized, and run the store call on a blocking worker.
//!
//! Each mutation runs as its own task. Dropping the future returned by
//! [`CodeRepository::add`] (e.g. the user left the screen) does not cancel
//! the write; the list is still republished, only the result is lost.

use crate::code::{Code, CodeFormat, CodeId, NewCode};
use crate::errors::{AppError, AppResult, DetectorError, StorageError};
use crate::scanner::{DecodeEvent, ScanListener};
use crate::store::{CodeStore, DeleteOutcome, SqliteStore};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable list of codes, newest first
pub type CodeList = Arc<Vec<Code>>;

#[derive(Clone)]
pub struct CodeRepository {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CodeStore>,
    codes: watch::Sender<CodeList>,
    /// Serializes mutations so the published list has one writer
    writes: Mutex<()>,
}

/// Run a store call on the blocking pool
async fn on_store<T, F>(store: &Arc<dyn CodeStore>, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CodeStore) -> Result<T, StorageError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| AppError::Other(format!("store worker failed: {}", e)))?
        .map_err(AppError::from)
}

/// Run a mutation detached from the caller
async fn detached<T, F>(write: F) -> AppResult<T>
where
    T: Send + 'static,
    F: Future<Output = AppResult<T>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|e| AppError::Other(format!("write task failed: {}", e)))?
}

impl Inner {
    /// Publish the store's current list; on a failed reload apply `patch` to
    /// the cached list instead so a successful write is never hidden
    async fn republish(&self, patch: impl FnOnce(&mut Vec<Code>)) {
        match on_store(&self.store, |s| s.list_all()).await {
            Ok(list) => {
                debug!(count = list.len(), "Publishing code list");
                self.codes.send_replace(Arc::new(list));
            }
            Err(e) => {
                warn!(error = %e, "Reload after write failed, patching cached list");
                let mut list: Vec<Code> = (**self.codes.borrow()).clone();
                patch(&mut list);
                list.sort_by(crate::store::newest_first);
                self.codes.send_replace(Arc::new(list));
            }
        }
    }
}

impl CodeRepository {
    /// Load the initial list from `store`
    pub async fn open(store: Arc<dyn CodeStore>) -> AppResult<Self> {
        let initial = on_store(&store, |s| s.list_all()).await?;
        info!(count = initial.len(), "Loaded saved codes");

        let (codes, _) = watch::channel(Arc::new(initial));
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                codes,
                writes: Mutex::new(()),
            }),
        })
    }

    /// Open (or create) the SQLite database at `path`
    pub async fn open_sqlite(path: &Path) -> AppResult<Self> {
        let path = path.to_path_buf();
        let store = tokio::task::spawn_blocking(move || SqliteStore::open(&path))
            .await
            .map_err(|e| AppError::Other(format!("store worker failed: {}", e)))??;
        Self::open(Arc::new(store)).await
    }

    /// Current snapshot
    pub fn codes(&self) -> CodeList {
        Arc::clone(&self.inner.codes.borrow())
    }

    /// Receiver that sees every published list
    pub fn subscribe(&self) -> watch::Receiver<CodeList> {
        self.inner.codes.subscribe()
    }

    /// Look up a code, from the store rather than the snapshot
    pub async fn get(&self, id: CodeId) -> AppResult<Option<Code>> {
        on_store(&self.inner.store, move |s| s.get(id)).await
    }

    /// Validate and save user-entered text
    pub async fn add(&self, raw_text: &str, format: CodeFormat) -> AppResult<Code> {
        let new = NewCode::new(raw_text, format)?;
        self.insert(new).await
    }

    /// Save a decoded value, keeping its decode time
    pub async fn record_scan(&self, event: &DecodeEvent) -> AppResult<Code> {
        let new =
            NewCode::with_timestamp(event.content.as_str(), event.format.clone(), event.decoded_at)?;
        self.insert(new).await
    }

    async fn insert(&self, new: NewCode) -> AppResult<Code> {
        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _write = inner.writes.lock().await;
            let code = on_store(&inner.store, move |s| s.insert(&new)).await?;
            info!(id = %code.id, format = %code.format, "Saved code");

            let saved = code.clone();
            inner.republish(move |list| list.push(saved)).await;
            Ok(code)
        })
        .await
    }

    pub async fn delete(&self, id: CodeId) -> AppResult<DeleteOutcome> {
        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _write = inner.writes.lock().await;
            let outcome = on_store(&inner.store, move |s| s.delete(id)).await?;
            match outcome {
                DeleteOutcome::Deleted => info!(%id, "Deleted code"),
                DeleteOutcome::NotFound => debug!(%id, "Delete of missing code"),
            }

            // A missing id may still be in a stale snapshot, so republish either way
            inner.republish(move |list| list.retain(|c| c.id != id)).await;
            Ok(outcome)
        })
        .await
    }

    /// Reload from the store; on failure the published list is kept
    pub async fn refresh(&self) -> AppResult<()> {
        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _write = inner.writes.lock().await;
            let list = on_store(&inner.store, |s| s.list_all()).await?;
            inner.codes.send_replace(Arc::new(list));
            Ok(())
        })
        .await
    }
}

/// What happened to a scan, as seen by the shell
#[derive(Debug, Clone, PartialEq)]
pub enum ScanNotice {
    Saved(Code),
    Failed(AppError),
    PermissionDenied,
    DetectorError(DetectorError),
}

/// Persists decode events through a [`CodeRepository`]
///
/// Pipeline callbacks are synchronous, so events go over a channel to a task
/// that performs the write and reports a [`ScanNotice`] for each.
pub struct RepositoryListener {
    decodes: mpsc::UnboundedSender<DecodeEvent>,
    notices: mpsc::UnboundedSender<ScanNotice>,
}

impl RepositoryListener {
    /// Spawn the writer task; must be called inside a tokio runtime
    ///
    /// The writer ends once every clone of the listener is dropped and the
    /// decodes already queued are saved. Await the returned handle to make
    /// sure they reached the store.
    pub fn spawn(
        repository: CodeRepository,
    ) -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<ScanNotice>,
        JoinHandle<()>,
    ) {
        let (decodes, mut decode_rx) = mpsc::unbounded_channel::<DecodeEvent>();
        let (notices, notice_rx) = mpsc::unbounded_channel();

        let writer_notices = notices.clone();
        let writer = tokio::spawn(async move {
            while let Some(event) = decode_rx.recv().await {
                let notice = match repository.record_scan(&event).await {
                    Ok(code) => ScanNotice::Saved(code),
                    Err(e) => {
                        warn!(error = %e, content = %event.content, "Failed to save scanned code");
                        ScanNotice::Failed(e)
                    }
                };
                // Nobody listening is fine, the code is saved regardless
                let _ = writer_notices.send(notice);
            }
            debug!("Scan writer finished");
        });

        (Arc::new(Self { decodes, notices }), notice_rx, writer)
    }
}

impl ScanListener for RepositoryListener {
    fn on_decode(&self, event: &DecodeEvent) {
        if self.decodes.send(event.clone()).is_err() {
            warn!("Scan writer is gone, dropping decode");
        }
    }

    fn on_permission_denied(&self) {
        let _ = self.notices.send(ScanNotice::PermissionDenied);
    }

    fn on_detector_error(&self, error: &DetectorError) {
        let _ = self.notices.send(ScanNotice::DetectorError(error.clone()));
    }
}
