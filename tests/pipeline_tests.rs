// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the scan pipeline driven by frame sources

use codeshelf::errors::ScanError;
use codeshelf::scanner::{
    DecodeEvent, Frame, FrameSource, ImageFileSource, PermissionState, ScanListener, ScanState,
    pipeline_from_config,
};
use codeshelf::{
    CodeFormat, CodeRepository, Config, GenerateOptions, MemoryStore, RenderOptions,
    RepositoryListener, ScanNotice, generate,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Collected {
    decoded: Mutex<Vec<String>>,
    denied: Mutex<u32>,
}

impl ScanListener for Collected {
    fn on_decode(&self, event: &DecodeEvent) {
        self.decoded.lock().unwrap().push(event.content.clone());
    }

    fn on_permission_denied(&self) {
        *self.denied.lock().unwrap() += 1;
    }
}

/// Frame source with a fixed permission that yields scripted results
struct Scripted {
    permission: PermissionState,
    results: Vec<Result<Frame, ScanError>>,
}

impl FrameSource for Scripted {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ScanError>>> + Send {
        let next = if self.results.is_empty() {
            None
        } else {
            Some(self.results.remove(0))
        };
        async move { next }
    }
}

/// Never yields a frame
struct Endless;

impl FrameSource for Endless {
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ScanError>>> + Send {
        std::future::pending()
    }
}

fn write_qr(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    generate(text, &CodeFormat::Qr, &GenerateOptions::default())
        .unwrap()
        .save_png(&path, &RenderOptions::default())
        .unwrap();
    path
}

#[tokio::test]
async fn test_repeated_code_is_saved_once() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_qr(dir.path(), "a.png", "SHELF-001");
    let again = write_qr(dir.path(), "b.png", "SHELF-001");

    let store = Arc::new(MemoryStore::new());
    let repository = CodeRepository::open(store.clone()).await.unwrap();
    let (listener, mut notices, writer) = RepositoryListener::spawn(repository.clone());

    let pipeline = pipeline_from_config(&Config::default(), listener);
    let mut source = ImageFileSource::new(vec![first, again]);
    let stats = pipeline.run(&mut source).await.unwrap();

    assert_eq!(stats.analyzed, 2);
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(pipeline.state(), ScanState::Idle);

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(notice, ScanNotice::Saved(ref code) if code.content == "SHELF-001"));

    // Dropping the pipeline releases the last sender, so the writer finishes
    drop(pipeline);
    writer.await.unwrap();
    assert!(notices.recv().await.is_none());
    assert_eq!(store.insert_count(), 1);
    assert_eq!(repository.codes().len(), 1);
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let good = write_qr(dir.path(), "good.png", "after the broken one");

    let listener = Arc::new(Collected::default());
    let pipeline = pipeline_from_config(&Config::default(), listener.clone());
    let stats = pipeline
        .run(&mut ImageFileSource::new(vec![broken, good]))
        .await
        .unwrap();

    assert_eq!(stats.analyzed, 1);
    assert_eq!(
        *listener.decoded.lock().unwrap(),
        vec!["after the broken one".to_string()]
    );
}

#[tokio::test]
async fn test_denied_source_never_scans() {
    let listener = Arc::new(Collected::default());
    let pipeline = pipeline_from_config(&Config::default(), listener.clone());
    let mut source = Scripted {
        permission: PermissionState::Denied,
        results: Vec::new(),
    };

    let result = pipeline.run(&mut source).await;
    assert_eq!(result, Err(ScanError::PermissionDenied));
    assert_eq!(pipeline.state(), ScanState::PermissionDenied);
    assert_eq!(*listener.denied.lock().unwrap(), 1);

    // Granting outside a session goes back to idle
    pipeline.set_permission(PermissionState::Granted);
    assert_eq!(pipeline.state(), ScanState::Idle);
}

#[tokio::test]
async fn test_permission_revoked_mid_run() {
    let listener = Arc::new(Collected::default());
    let pipeline = pipeline_from_config(&Config::default(), listener.clone());
    let mut source = Scripted {
        permission: PermissionState::Granted,
        results: vec![
            Err(ScanError::Source("glitch".into())),
            Err(ScanError::PermissionDenied),
        ],
    };

    let result = pipeline.run(&mut source).await;
    assert_eq!(result, Err(ScanError::PermissionDenied));
    assert_eq!(pipeline.state(), ScanState::PermissionDenied);
    assert_eq!(*listener.denied.lock().unwrap(), 1);
    assert!(listener.decoded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_handle_ends_run() {
    let listener = Arc::new(Collected::default());
    let pipeline = pipeline_from_config(&Config::default(), listener);
    let handle = pipeline.stop_handle();

    let running = pipeline.clone();
    let task = tokio::spawn(async move { running.run(&mut Endless).await });

    // Wait for the session to start before stopping it
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.state() != ScanState::Scanning {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    handle.stop();
    let stats = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.analyzed, 0);
    assert_eq!(pipeline.state(), ScanState::Idle);
}
