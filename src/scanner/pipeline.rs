// SPDX-License-Identifier: GPL-3.0-only

//! Scan pipeline state machine
//!
//! ```text
//! Idle --start--> Scanning --decode--> Decoded --(emitted)--> Idle --> Scanning
//!                    |
//!                    +--permission denied--> PermissionDenied --granted--> Scanning
//!                                                                  (Idle once stopped)
//! ```
//!
//! Only one frame is analysed at a time. A frame offered while the previous
//! one is still in the detector is dropped, never queued.

use super::debounce::Debouncer;
use super::detector::{Detector, FrameRegion};
use super::frame::Frame;
use super::source::FrameSource;
use crate::code::CodeFormat;
use crate::errors::{DetectorError, ScanError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Decoded,
    PermissionDenied,
}

/// Camera permission as reported by the frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// A successful, non-duplicate decode
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeEvent {
    pub content: String,
    pub format: CodeFormat,
    pub bounds: Option<FrameRegion>,
    pub decoded_at: DateTime<Utc>,
}

/// What happened to an offered frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A new code was decoded and reported
    Emitted(DecodeEvent),
    /// Analysed; nothing found, or only debounced repeats
    NothingNew,
    /// Previous frame still being analysed
    Dropped,
    /// Pipeline is not scanning, or was stopped while this frame was analysed
    Ignored,
    /// Detector failed on this frame
    Failed(DetectorError),
}

/// Receives pipeline notifications
pub trait ScanListener: Send + Sync {
    fn on_decode(&self, event: &DecodeEvent);

    fn on_permission_denied(&self);

    fn on_detector_error(&self, _error: &DetectorError) {}
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Longest side fed to the detector; `None` analyses full resolution
    pub max_dimension: Option<u32>,
    pub debounce_window: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_dimension: Some(crate::constants::scan::MAX_DETECT_DIMENSION),
            debounce_window: crate::constants::scan::DEBOUNCE_WINDOW,
        }
    }
}

/// Frame counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub analyzed: u64,
    pub dropped: u64,
    pub emitted: u64,
    pub suppressed: u64,
    pub failed: u64,
}

struct Shared {
    state: ScanState,
    permission: PermissionState,
    /// Scan screen visible
    active: bool,
    /// Bumped on start/stop so results from an older session are discarded
    session: u64,
    debouncer: Debouncer,
    stats: PipelineStats,
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // State stays consistent across a panicking listener, so keep going
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Stops a [`ScanPipeline`] from another thread, e.g. a Ctrl+C handler
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Mutex<Shared>>,
    active: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        {
            let mut shared = lock_shared(&self.shared);
            shared.active = false;
            shared.session += 1;
            shared.debouncer.reset();
            if shared.state != ScanState::PermissionDenied {
                shared.state = ScanState::Idle;
            }
        }
        self.active.send_replace(false);
        info!("Scan session stopped");
    }
}

/// Clears the busy flag when analysis ends, even if the worker panicked
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ScanPipeline {
    detector: Arc<dyn Detector>,
    listener: Arc<dyn ScanListener>,
    max_dimension: Option<u32>,
    shared: Arc<Mutex<Shared>>,
    busy: Arc<AtomicBool>,
    active: Arc<watch::Sender<bool>>,
}

impl ScanPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        listener: Arc<dyn ScanListener>,
        settings: PipelineSettings,
    ) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            detector,
            listener,
            max_dimension: settings.max_dimension,
            shared: Arc::new(Mutex::new(Shared {
                state: ScanState::Idle,
                permission: PermissionState::Granted,
                active: false,
                session: 0,
                debouncer: Debouncer::new(settings.debounce_window),
                stats: PipelineStats::default(),
            })),
            busy: Arc::new(AtomicBool::new(false)),
            active: Arc::new(active),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    /// Handle that can stop the pipeline without keeping its listener alive
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
            active: Arc::clone(&self.active),
        }
    }

    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock().stats
    }

    /// Enter the scan screen
    pub fn start(&self) -> ScanState {
        let (state, denied) = {
            let mut shared = self.lock();
            shared.active = true;
            shared.session += 1;
            shared.debouncer.reset();
            if shared.permission == PermissionState::Denied {
                shared.state = ScanState::PermissionDenied;
            } else {
                shared.state = ScanState::Scanning;
            }
            (shared.state, shared.state == ScanState::PermissionDenied)
        };
        self.active.send_replace(true);

        info!(?state, "Scan session started");
        if denied {
            self.listener.on_permission_denied();
        }
        state
    }

    /// Leave the scan screen; in-flight analysis results are discarded
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Apply a permission change from the camera collaborator
    pub fn set_permission(&self, permission: PermissionState) {
        let notify = {
            let mut shared = self.lock();
            shared.permission = permission;
            match permission {
                PermissionState::Denied if shared.state != ScanState::PermissionDenied => {
                    shared.state = ScanState::PermissionDenied;
                    true
                }
                PermissionState::Granted if shared.state == ScanState::PermissionDenied => {
                    shared.state = if shared.active {
                        ScanState::Scanning
                    } else {
                        ScanState::Idle
                    };
                    false
                }
                _ => false,
            }
        };

        if notify {
            warn!("Frame source permission denied");
            self.listener.on_permission_denied();
        }
    }

    /// Offer a frame for analysis
    pub async fn offer_frame(&self, frame: Frame) -> FrameOutcome {
        let session = {
            let shared = self.lock();
            if shared.state != ScanState::Scanning {
                return FrameOutcome::Ignored;
            }
            shared.session
        };

        let Some(guard) = BusyGuard::try_acquire(&self.busy) else {
            self.lock().stats.dropped += 1;
            trace!("Analysis in progress, dropping frame");
            return FrameOutcome::Dropped;
        };

        let detector = Arc::clone(&self.detector);
        let max_dimension = self.max_dimension;
        let start = Instant::now();

        // The guard moves into the worker so the flag is cleared when the
        // analysis really ends, even if this future is dropped first
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let luma = frame.to_luma(max_dimension)?;
            detector.detect(&luma)
        })
        .await
        .unwrap_or_else(|e| Err(DetectorError::WorkerFailed(e.to_string())));

        trace!(elapsed_ms = start.elapsed().as_millis(), "Frame analysed");
        self.finish(session, result)
    }

    fn finish(
        &self,
        session: u64,
        result: Result<Vec<super::detector::Decoded>, DetectorError>,
    ) -> FrameOutcome {
        let decoded = match result {
            Ok(decoded) => decoded,
            Err(e) => {
                {
                    let mut shared = self.lock();
                    if shared.session != session || shared.state != ScanState::Scanning {
                        return FrameOutcome::Ignored;
                    }
                    shared.stats.failed += 1;
                }
                warn!(error = %e, "Detector failed, continuing with next frame");
                self.listener.on_detector_error(&e);
                return FrameOutcome::Failed(e);
            }
        };

        let event = {
            let mut shared = self.lock();
            if shared.session != session || shared.state != ScanState::Scanning {
                debug!("Discarding result from a stopped session");
                return FrameOutcome::Ignored;
            }
            shared.stats.analyzed += 1;

            let now = Instant::now();
            // One event per frame; every repeat in view still restarts its
            // window, and a further new value is left for the next frame
            let mut chosen = None;
            for d in decoded {
                if chosen.is_some() {
                    if shared.debouncer.touch(&d.content, &d.format, now) {
                        shared.stats.suppressed += 1;
                    }
                } else if shared.debouncer.accept(&d.content, &d.format, now) {
                    chosen = Some(d);
                } else {
                    shared.stats.suppressed += 1;
                }
            }

            let Some(d) = chosen else {
                return FrameOutcome::NothingNew;
            };
            shared.state = ScanState::Decoded;
            shared.stats.emitted += 1;
            DecodeEvent {
                content: d.content,
                format: d.format,
                bounds: d.bounds,
                decoded_at: Utc::now(),
            }
        };

        info!(content = %event.content, format = %event.format, "Decoded code");
        self.listener.on_decode(&event);

        {
            let mut shared = self.lock();
            if shared.state == ScanState::Decoded {
                shared.state = ScanState::Idle;
                if shared.active && shared.session == session {
                    shared.state = ScanState::Scanning;
                }
            }
        }

        FrameOutcome::Emitted(event)
    }

    /// Drive the pipeline from a frame source until it ends or `stop` is called
    pub async fn run<S: FrameSource>(&self, source: &mut S) -> Result<PipelineStats, ScanError> {
        let permission = source.permission();
        self.set_permission(permission);
        if permission == PermissionState::Denied {
            return Err(ScanError::PermissionDenied);
        }
        self.start();

        let mut active = self.active.subscribe();
        loop {
            let next = tokio::select! {
                _ = active.wait_for(|running| !*running) => {
                    debug!("Pipeline stopped, leaving frame loop");
                    return Ok(self.stats());
                }
                next = source.next_frame() => next,
            };

            match next {
                None => break,
                Some(Ok(frame)) => {
                    self.offer_frame(frame).await;
                }
                Some(Err(ScanError::PermissionDenied)) => {
                    self.set_permission(PermissionState::Denied);
                    return Err(ScanError::PermissionDenied);
                }
                Some(Err(e)) => warn!(error = %e, "Frame source error"),
            }
        }

        self.stop();
        Ok(self.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::detector::Decoded;
    use crate::scanner::frame::{LumaImage, PixelFormat};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<DecodeEvent>>,
        denied: StdMutex<u32>,
        errors: StdMutex<u32>,
    }

    impl ScanListener for Recorder {
        fn on_decode(&self, event: &DecodeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn on_permission_denied(&self) {
            *self.denied.lock().unwrap() += 1;
        }

        fn on_detector_error(&self, _error: &DetectorError) {
            *self.errors.lock().unwrap() += 1;
        }
    }

    /// Returns a fixed result after an optional delay
    struct Scripted {
        result: Result<Vec<Decoded>, DetectorError>,
        delay: Duration,
    }

    impl Detector for Scripted {
        fn detect(&self, _image: &LumaImage) -> Result<Vec<Decoded>, DetectorError> {
            std::thread::sleep(self.delay);
            self.result.clone()
        }
    }

    fn finds(content: &str) -> Arc<Scripted> {
        Arc::new(Scripted {
            result: Ok(vec![Decoded {
                content: content.into(),
                format: CodeFormat::Qr,
                bounds: None,
            }]),
            delay: Duration::ZERO,
        })
    }

    fn frame() -> Frame {
        Frame::new(2, 2, PixelFormat::Gray8, vec![255u8; 4])
    }

    fn pipeline(detector: Arc<dyn Detector>) -> (ScanPipeline, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let pipeline = ScanPipeline::new(
            detector,
            recorder.clone(),
            PipelineSettings {
                max_dimension: None,
                debounce_window: Duration::from_secs(60),
            },
        );
        (pipeline, recorder)
    }

    #[tokio::test]
    async fn test_frames_ignored_until_started() {
        let (pipeline, recorder) = pipeline(finds("ABC"));
        assert_eq!(pipeline.offer_frame(frame()).await, FrameOutcome::Ignored);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_emits_once_and_keeps_scanning() {
        let (pipeline, recorder) = pipeline(finds("ABC"));
        assert_eq!(pipeline.start(), ScanState::Scanning);

        assert!(matches!(
            pipeline.offer_frame(frame()).await,
            FrameOutcome::Emitted(_)
        ));
        assert_eq!(pipeline.state(), ScanState::Scanning);
        assert_eq!(pipeline.offer_frame(frame()).await, FrameOutcome::NothingNew);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, "ABC");
        assert_eq!(pipeline.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_frame_is_dropped() {
        let detector = Arc::new(Scripted {
            result: Ok(Vec::new()),
            delay: Duration::from_millis(300),
        });
        let (pipeline, _recorder) = pipeline(detector);
        pipeline.start();

        let background = pipeline.clone();
        let first = tokio::spawn(async move { background.offer_frame(frame()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pipeline.offer_frame(frame()).await, FrameOutcome::Dropped);
        assert_eq!(first.await.unwrap(), FrameOutcome::NothingNew);
        assert_eq!(pipeline.stats().dropped, 1);

        // Busy flag is released once analysis finished
        assert_eq!(pipeline.offer_frame(frame()).await, FrameOutcome::NothingNew);
    }

    #[tokio::test]
    async fn test_permission_denied_is_terminal_until_granted() {
        let (pipeline, recorder) = pipeline(finds("ABC"));
        pipeline.start();
        pipeline.set_permission(PermissionState::Denied);

        assert_eq!(pipeline.state(), ScanState::PermissionDenied);
        assert_eq!(*recorder.denied.lock().unwrap(), 1);
        assert_eq!(pipeline.offer_frame(frame()).await, FrameOutcome::Ignored);

        pipeline.stop();
        assert_eq!(pipeline.state(), ScanState::PermissionDenied);
        assert_eq!(pipeline.start(), ScanState::PermissionDenied);

        pipeline.set_permission(PermissionState::Granted);
        assert_eq!(pipeline.state(), ScanState::Scanning);
    }

    #[tokio::test]
    async fn test_detector_failure_is_reported_and_scanning_continues() {
        let detector = Arc::new(Scripted {
            result: Err(DetectorError::WorkerFailed("boom".into())),
            delay: Duration::ZERO,
        });
        let (pipeline, recorder) = pipeline(detector);
        pipeline.start();

        assert!(matches!(
            pipeline.offer_frame(frame()).await,
            FrameOutcome::Failed(_)
        ));
        assert_eq!(*recorder.errors.lock().unwrap(), 1);
        assert_eq!(pipeline.state(), ScanState::Scanning);
    }

    #[tokio::test]
    async fn test_invalid_frame_is_a_detector_failure() {
        let (pipeline, _recorder) = pipeline(finds("ABC"));
        pipeline.start();
        let broken = Frame::new(10, 10, PixelFormat::Rgba, vec![0u8; 3]);
        assert!(matches!(
            pipeline.offer_frame(broken).await,
            FrameOutcome::Failed(DetectorError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_result() {
        let detector = Arc::new(Scripted {
            result: Ok(vec![Decoded {
                content: "late".into(),
                format: CodeFormat::Qr,
                bounds: None,
            }]),
            delay: Duration::from_millis(200),
        });
        let (pipeline, recorder) = pipeline(detector);
        pipeline.start();

        let background = pipeline.clone();
        let pending = tokio::spawn(async move { background.offer_frame(frame()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeline.stop();

        assert_eq!(pending.await.unwrap(), FrameOutcome::Ignored);
        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(pipeline.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_two_codes_in_view_are_each_emitted_once() {
        let detector = Arc::new(Scripted {
            result: Ok(vec![
                Decoded {
                    content: "SHELF-001".into(),
                    format: CodeFormat::Qr,
                    bounds: None,
                },
                Decoded {
                    content: "5901234123457".into(),
                    format: CodeFormat::Ean13,
                    bounds: None,
                },
            ]),
            delay: Duration::ZERO,
        });
        let (pipeline, recorder) = pipeline(detector);
        pipeline.start();

        for _ in 0..10 {
            pipeline.offer_frame(frame()).await;
        }

        let events = recorder.events.lock().unwrap();
        let seen: Vec<_> = events
            .iter()
            .map(|e| (e.content.as_str(), e.format.clone()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("SHELF-001", CodeFormat::Qr),
                ("5901234123457", CodeFormat::Ean13),
            ]
        );
        let stats = pipeline.stats();
        assert_eq!(stats.analyzed, 10);
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.suppressed, 17);
    }
}
