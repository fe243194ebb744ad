// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources
//!
//! A [`FrameSource`] stands in for the camera: it reports whether frames may
//! be read at all and yields them one by one. Still images are decoded with
//! the `image` crate on a blocking worker.

use super::frame::Frame;
use super::pipeline::PermissionState;
use crate::constants::file_formats;
use crate::errors::ScanError;
use std::collections::HashSet;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Camera collaborator
pub trait FrameSource: Send {
    fn permission(&self) -> PermissionState;

    /// Next frame, or `None` when the source is exhausted
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ScanError>>> + Send;
}

async fn load_frame(path: PathBuf) -> Result<Frame, ScanError> {
    tokio::task::spawn_blocking(move || {
        let image = image::open(&path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == ErrorKind::PermissionDenied => {
                ScanError::PermissionDenied
            }
            e => ScanError::Source(format!("{}: {}", path.display(), e)),
        })?;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "Loaded image frame");
        Ok(Frame::from_image(&image))
    })
    .await
    .map_err(|e| ScanError::Source(format!("image loader failed: {}", e)))?
}

/// Fixed list of image files, one frame each
pub struct ImageFileSource {
    paths: std::vec::IntoIter<PathBuf>,
    current: Option<PathBuf>,
}

impl ImageFileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
            current: None,
        }
    }

    /// Path of the most recently yielded frame
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

impl FrameSource for ImageFileSource {
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ScanError>>> + Send {
        let next = self.paths.next();
        self.current = next.clone();
        async move {
            let path = next?;
            Some(load_frame(path).await)
        }
    }
}

/// Polls a directory and yields every new image file once
///
/// Files that fail to decode are reported once and not retried.
pub struct DirectoryWatchSource {
    dir: PathBuf,
    poll_interval: Duration,
    seen: HashSet<PathBuf>,
    pending: Vec<PathBuf>,
}

impl DirectoryWatchSource {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            seen: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Mark files already in the directory as seen so only new ones are scanned
    pub fn skip_existing(mut self) -> Self {
        if let Ok(files) = list_images(&self.dir) {
            info!(count = files.len(), dir = %self.dir.display(), "Skipping existing images");
            self.seen.extend(files);
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn poll(&mut self) -> Result<(), ScanError> {
        let files = list_images(&self.dir).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                ScanError::PermissionDenied
            } else {
                ScanError::Source(format!("{}: {}", self.dir.display(), e))
            }
        })?;

        // Oldest name first keeps a burst of new files in a stable order
        let mut fresh: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| self.seen.insert(p.clone()))
            .collect();
        fresh.sort();
        fresh.reverse();
        self.pending.extend(fresh);
        Ok(())
    }
}

fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(file_formats::is_image_extension);
        if is_image && entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(path);
        }
    }
    Ok(files)
}

impl FrameSource for DirectoryWatchSource {
    fn permission(&self) -> PermissionState {
        match std::fs::read_dir(&self.dir) {
            Err(e) if e.kind() == ErrorKind::PermissionDenied => PermissionState::Denied,
            _ => PermissionState::Granted,
        }
    }

    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ScanError>>> + Send {
        async move {
            loop {
                if let Some(path) = self.pending.pop() {
                    return Some(load_frame(path).await);
                }
                if let Err(e) = self.poll() {
                    if e != ScanError::PermissionDenied {
                        warn!(error = %e, "Failed to poll watch directory");
                        // Back off so a vanished directory is not polled in a tight loop
                        tokio::time::sleep(self.poll_interval).await;
                    }
                    return Some(Err(e));
                }
                if self.pending.is_empty() {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_png(path: &Path) {
        GrayImage::from_pixel(8, 8, Luma([200u8])).save(path).unwrap();
    }

    #[tokio::test]
    async fn test_image_files_yield_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        write_png(&a);
        let missing = dir.path().join("missing.png");

        let mut source = ImageFileSource::new(vec![a.clone(), missing]);
        let frame = source.next_frame().await.unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));
        assert_eq!(source.current(), Some(a.as_path()));

        assert!(matches!(
            source.next_frame().await,
            Some(Err(ScanError::Source(_)))
        ));
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_directory_source_yields_new_files_once() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("old.png"));
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source =
            DirectoryWatchSource::new(dir.path(), Duration::from_millis(10)).skip_existing();
        write_png(&dir.path().join("new.png"));

        let frame = tokio::time::timeout(Duration::from_secs(5), source.next_frame())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Ok(_))));

        // Nothing else arrives
        assert!(
            tokio::time::timeout(Duration::from_millis(100), source.next_frame())
                .await
                .is_err()
        );
    }

    #[test]
    fn test_missing_directory_is_still_granted() {
        let source = DirectoryWatchSource::new("/nonexistent/codeshelf", Duration::from_millis(10));
        assert_eq!(source.permission(), PermissionState::Granted);
    }
}
