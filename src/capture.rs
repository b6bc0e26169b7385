//! Camera capture loop
//!
//! A capture runs as a tokio task that owns the device for its whole life:
//!
//! ```text
//! Idle -> Requesting -> Capturing -> Decoded     -> Idle
//!                                 -> Cancelled   -> Idle
//!                                 -> DeviceError -> Idle
//! ```
//!
//! The device is dropped (and so released) before the terminal state is
//! published, on every path, including a dropped [`CaptureHandle`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Settings;
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::qr;

/// Message shown when the camera cannot be started.
pub const CAMERA_FAILED: &str =
    "Failed to start camera. Please ensure you have given camera permissions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Waiting for the device, possibly behind a permission prompt.
    Requesting,
    Capturing,
    Decoded,
    Cancelled,
    DeviceError,
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Decoded(String),
    Cancelled,
    DeviceError(QrsealError),
}

impl CaptureOutcome {
    pub fn into_token(self) -> Result<String> {
        match self {
            CaptureOutcome::Decoded(token) => Ok(token),
            CaptureOutcome::Cancelled => Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::CaptureCancelled,
                "capture cancelled",
            )),
            CaptureOutcome::DeviceError(e) => Err(e),
        }
    }
}

/// Something that can hand out a capture device.
pub trait Camera: Send + Sync {
    /// Open the device. May block, e.g. on a permission prompt; it runs on
    /// the blocking pool and cannot be interrupted.
    fn open(&self) -> Result<Box<dyn CameraDevice>>;
}

/// An open capture device. Dropping it releases the device.
pub trait CameraDevice: Send {
    /// The next frame, or `None` if no new frame is ready.
    fn next_frame(&mut self) -> Result<Option<GrayImage>>;
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    interval: Duration,
}

impl CaptureSession {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.capture_interval())
    }

    /// Start capturing on the current tokio runtime.
    pub fn start(&self, camera: Arc<dyn Camera>) -> CaptureHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(CaptureState::Idle);
        let task = tokio::spawn(run(camera, self.interval, cancel.clone(), state_tx));

        CaptureHandle {
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Control side of a running capture. Dropping it cancels the capture.
pub struct CaptureHandle {
    cancel: CancellationToken,
    state: watch::Receiver<CaptureState>,
    task: Option<JoinHandle<CaptureOutcome>>,
}

impl CaptureHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this capture, for wiring to e.g. Ctrl-C.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// Wait until the capture reports `target`. Returns false if the capture
    /// ended without the state being observed.
    pub async fn wait_for(&mut self, target: CaptureState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Wait for the capture to end.
    pub async fn finish(mut self) -> CaptureOutcome {
        let Some(task) = self.task.take() else {
            return CaptureOutcome::DeviceError(QrsealError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "capture already finished",
            ));
        };

        task.await.unwrap_or_else(|e| {
            CaptureOutcome::DeviceError(QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "capture task failed",
                e,
            ))
        })
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    camera: Arc<dyn Camera>,
    interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<CaptureState>,
) -> CaptureOutcome {
    let outcome = capture(camera, interval, &cancel, &state).await;

    let terminal = match &outcome {
        CaptureOutcome::Decoded(_) => CaptureState::Decoded,
        CaptureOutcome::Cancelled => CaptureState::Cancelled,
        CaptureOutcome::DeviceError(_) => CaptureState::DeviceError,
    };
    state.send_replace(terminal);
    state.send_replace(CaptureState::Idle);
    outcome
}

async fn capture(
    camera: Arc<dyn Camera>,
    interval: Duration,
    cancel: &CancellationToken,
    state: &watch::Sender<CaptureState>,
) -> CaptureOutcome {
    state.send_replace(CaptureState::Requesting);

    let mut device = match tokio::task::spawn_blocking(move || camera.open()).await {
        Ok(Ok(device)) => device,
        Ok(Err(e)) => {
            warn!(error = %e, "failed to open capture device");
            return CaptureOutcome::DeviceError(e.with_context(CAMERA_FAILED));
        }
        Err(e) => {
            return CaptureOutcome::DeviceError(QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::DeviceUnavailable,
                CAMERA_FAILED,
                e,
            ));
        }
    };

    if cancel.is_cancelled() {
        drop(device);
        debug!("capture cancelled while the device was opening");
        return CaptureOutcome::Cancelled;
    }

    state.send_replace(CaptureState::Capturing);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut frames: u64 = 0;

    // Reading and decoding a frame blocks, so each poll borrows the device
    // onto the blocking pool and hands it back. A cancel that arrives during
    // a poll is seen once that frame is done.
    let mut device = Some(device);
    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break CaptureOutcome::Cancelled,
            _ = ticker.tick() => {
                let Some(mut polled_device) = device.take() else {
                    break CaptureOutcome::DeviceError(QrsealError::with_kind(
                        ErrorCategory::Internal,
                        ErrorKind::InternalInvariant,
                        "capture device missing between frames",
                    ));
                };
                let poll = tokio::task::spawn_blocking(move || {
                    let result = poll_frame(&mut *polled_device);
                    (polled_device, result)
                });
                let result = match poll.await {
                    Ok((polled_device, result)) => {
                        device = Some(polled_device);
                        result
                    }
                    Err(e) => {
                        break CaptureOutcome::DeviceError(QrsealError::with_kind_and_source(
                            ErrorCategory::Internal,
                            ErrorKind::DeviceUnavailable,
                            "capture device failed while reading a frame",
                            e,
                        ));
                    }
                };

                match result {
                    FramePoll::Empty => {}
                    FramePoll::Missed(e) => {
                        frames += 1;
                        trace!(frame = frames, kind = ?e.kind, "no code in frame");
                    }
                    FramePoll::Decoded(token) => {
                        frames += 1;
                        break CaptureOutcome::Decoded(token);
                    }
                    FramePoll::Failed(e) => {
                        warn!(error = %e, "capture device stopped delivering frames");
                        break CaptureOutcome::DeviceError(e);
                    }
                }
            }
        }
    };

    drop(device);
    debug!(frames, "capture device released");
    outcome
}

enum FramePoll {
    Empty,
    Missed(QrsealError),
    Decoded(String),
    Failed(QrsealError),
}

fn poll_frame(device: &mut dyn CameraDevice) -> FramePoll {
    match device.next_frame() {
        Ok(Some(frame)) => match qr::decode_luma(&frame) {
            Ok(token) => FramePoll::Decoded(token),
            Err(e) => FramePoll::Missed(e),
        },
        Ok(None) => FramePoll::Empty,
        Err(e) => FramePoll::Failed(e),
    }
}

/// Replays the image files of a directory, in file name order, as camera
/// frames. Running out of files counts as the device going away.
#[derive(Debug, Clone)]
pub struct DirectoryCamera {
    dir: PathBuf,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Camera for DirectoryCamera {
    fn open(&self) -> Result<Box<dyn CameraDevice>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::DeviceUnavailable,
                format!("failed to open frame directory {}", self.dir.display()),
                e,
            )
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::DeviceUnavailable,
                format!("no frames in {}", self.dir.display()),
            ));
        }

        Ok(Box::new(DirectoryFrames {
            frames: frames.into_iter(),
        }))
    }
}

struct DirectoryFrames {
    frames: std::vec::IntoIter<PathBuf>,
}

impl CameraDevice for DirectoryFrames {
    fn next_frame(&mut self) -> Result<Option<GrayImage>> {
        let Some(path) = self.frames.next() else {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::DeviceUnavailable,
                "no QR code found before the frames ran out",
            ));
        };

        match image::open(&path) {
            Ok(image) => Ok(Some(image.to_luma8())),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable frame");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QrOptions;
    use crate::qr::QrEncoder;
    use image::Luma;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const FAST: Duration = Duration::from_millis(1);
    const LIMIT: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct Probe {
        opened: AtomicBool,
        released: AtomicBool,
        polls: AtomicUsize,
    }

    struct MockCamera {
        frames: Mutex<Option<VecDeque<Option<GrayImage>>>>,
        probe: Arc<Probe>,
    }

    impl MockCamera {
        fn new(frames: Vec<Option<GrayImage>>) -> (Arc<Self>, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            let camera = Arc::new(Self {
                frames: Mutex::new(Some(frames.into())),
                probe: probe.clone(),
            });
            (camera, probe)
        }
    }

    impl Camera for MockCamera {
        fn open(&self) -> Result<Box<dyn CameraDevice>> {
            self.probe.opened.store(true, Ordering::SeqCst);
            let frames = self.frames.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(MockDevice {
                frames,
                probe: self.probe.clone(),
            }))
        }
    }

    struct MockDevice {
        frames: VecDeque<Option<GrayImage>>,
        probe: Arc<Probe>,
    }

    impl CameraDevice for MockDevice {
        fn next_frame(&mut self) -> Result<Option<GrayImage>> {
            self.probe.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.frames.pop_front().flatten())
        }
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            self.probe.released.store(true, Ordering::SeqCst);
        }
    }

    struct DeniedCamera;

    impl Camera for DeniedCamera {
        fn open(&self) -> Result<Box<dyn CameraDevice>> {
            Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::DeviceUnavailable,
                "permission denied",
            ))
        }
    }

    fn blank() -> GrayImage {
        GrayImage::from_pixel(120, 120, Luma([255]))
    }

    fn qr_frame(token: &str) -> GrayImage {
        QrEncoder::new(QrOptions {
            module_px: 4,
            quiet_zone: 4,
        })
        .encode(token)
        .unwrap()
        .as_luma()
        .clone()
    }

    async fn finish(handle: CaptureHandle) -> CaptureOutcome {
        tokio::time::timeout(LIMIT, handle.finish())
            .await
            .expect("capture did not finish")
    }

    const SLOW_FRAME: Duration = Duration::from_millis(300);

    struct SlowCamera {
        probe: Arc<Probe>,
    }

    impl Camera for SlowCamera {
        fn open(&self) -> Result<Box<dyn CameraDevice>> {
            self.probe.opened.store(true, Ordering::SeqCst);
            Ok(Box::new(SlowDevice {
                probe: self.probe.clone(),
            }))
        }
    }

    struct SlowDevice {
        probe: Arc<Probe>,
    }

    impl CameraDevice for SlowDevice {
        fn next_frame(&mut self) -> Result<Option<GrayImage>> {
            self.probe.polls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(SLOW_FRAME);
            Ok(None)
        }
    }

    impl Drop for SlowDevice {
        fn drop(&mut self) {
            self.probe.released.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_decodes_first_readable_frame() {
        let (camera, probe) = MockCamera::new(vec![
            None,
            Some(blank()),
            Some(qr_frame("qrseal1:dGVzdA")),
            Some(qr_frame("qrseal1:c2Vjb25k")),
        ]);

        let handle = CaptureSession::new(FAST).start(camera);
        let outcome = finish(handle).await;

        match outcome {
            CaptureOutcome::Decoded(token) => assert_eq!(token, "qrseal1:dGVzdA"),
            other => panic!("expected a decode, got {:?}", other),
        }
        assert!(probe.released.load(Ordering::SeqCst));
        assert_eq!(probe.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_while_capturing_releases_device() {
        let (camera, probe) = MockCamera::new(vec![]);

        let mut handle = CaptureSession::new(FAST).start(camera);
        assert!(handle.wait_for(CaptureState::Capturing).await);
        handle.cancel();

        let mut state = handle.state.clone();
        let outcome = finish(handle).await;
        assert!(matches!(outcome, CaptureOutcome::Cancelled));
        assert!(probe.released.load(Ordering::SeqCst));
        assert_eq!(*state.borrow_and_update(), CaptureState::Idle);

        // Nothing polls the device once the capture has ended.
        let polls = probe.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test]
    async fn test_slow_frame_does_not_stall_runtime() {
        let probe = Arc::new(Probe::default());
        let camera = Arc::new(SlowCamera {
            probe: probe.clone(),
        });

        let mut handle = CaptureSession::new(FAST).start(camera);
        assert!(handle.wait_for(CaptureState::Capturing).await);
        tokio::time::timeout(LIMIT, async {
            while probe.polls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(FAST).await;
            }
        })
        .await
        .expect("device was never polled");

        // A frame is being read right now; timers on this runtime still fire.
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < SLOW_FRAME / 2);

        handle.cancel();
        assert!(matches!(finish(handle).await, CaptureOutcome::Cancelled));
        assert!(probe.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_device() {
        let (camera, probe) = MockCamera::new(vec![]);

        let mut handle = CaptureSession::new(FAST).start(camera);
        assert!(handle.wait_for(CaptureState::Capturing).await);
        drop(handle);

        tokio::time::timeout(LIMIT, async {
            while !probe.released.load(Ordering::SeqCst) {
                tokio::time::sleep(FAST).await;
            }
        })
        .await
        .expect("device was not released");
    }

    #[tokio::test]
    async fn test_cancel_before_device_opens() {
        let (camera, probe) = MockCamera::new(vec![Some(qr_frame("qrseal1:dGVzdA"))]);

        let handle = CaptureSession::new(FAST).start(camera);
        handle.cancel();
        let outcome = finish(handle).await;

        assert!(matches!(outcome, CaptureOutcome::Cancelled));
        if probe.opened.load(Ordering::SeqCst) {
            assert!(probe.released.load(Ordering::SeqCst));
        }
        assert_eq!(probe.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_device_error() {
        let handle = CaptureSession::new(FAST).start(Arc::new(DeniedCamera));

        match finish(handle).await {
            CaptureOutcome::DeviceError(e) => {
                assert_eq!(e.kind, Some(ErrorKind::DeviceUnavailable));
                assert_eq!(e.to_string(), CAMERA_FAILED);
            }
            other => panic!("expected a device error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_into_token() {
        let err = CaptureOutcome::Cancelled.into_token().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::CaptureCancelled));
        assert_eq!(
            CaptureOutcome::Decoded("t".into()).into_token().unwrap(),
            "t"
        );
    }

    #[tokio::test]
    async fn test_directory_camera() {
        let dir = tempfile::TempDir::new().unwrap();
        blank().save(dir.path().join("frame-000.png")).unwrap();
        fs::write(dir.path().join("frame-001.png"), b"truncated").unwrap();
        qr_frame("qrseal1:ZnJhbWVz")
            .save(dir.path().join("frame-002.png"))
            .unwrap();

        let camera = Arc::new(DirectoryCamera::new(dir.path()));
        let outcome = finish(CaptureSession::new(FAST).start(camera)).await;

        match outcome {
            CaptureOutcome::Decoded(token) => assert_eq!(token, "qrseal1:ZnJhbWVz"),
            other => panic!("expected a decode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_camera_runs_out() {
        let dir = tempfile::TempDir::new().unwrap();
        blank().save(dir.path().join("frame-000.png")).unwrap();

        let camera = Arc::new(DirectoryCamera::new(dir.path()));
        let outcome = finish(CaptureSession::new(FAST).start(camera)).await;

        match outcome {
            CaptureOutcome::DeviceError(e) => assert_eq!(e.kind, Some(ErrorKind::DeviceUnavailable)),
            other => panic!("expected a device error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_directory_fails_to_open() {
        let dir = tempfile::TempDir::new().unwrap();

        let camera = Arc::new(DirectoryCamera::new(dir.path()));
        let outcome = finish(CaptureSession::new(FAST).start(camera)).await;

        assert!(matches!(outcome, CaptureOutcome::DeviceError(_)));
    }
}
