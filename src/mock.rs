//! Mock capture library for testing without hardware.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::frame::encode_jpeg;
use crate::preset::{ResolutionPreset, SizeSelector};
use crate::traits::{
    completion, CaptureConfig, CaptureError, CaptureLibrary, Completer, Completion, Facing, Flash,
    LibraryEvent, Listener, Picture, RecordingRequest, Result, VideoResult,
};

/// Frame size the mock "records" at.
pub const MOCK_VIDEO_SIZE: (u32, u32) = (32, 24);

/// Observable state shared between a [`MockLibrary`] and its [`MockHandle`].
#[derive(Debug, Default)]
pub struct MockState {
    /// Every library method invoked, in order.
    pub calls: Vec<&'static str>,
    pub(crate) listener: Option<Listener>,
    /// Presets reported unsupported.
    pub unsupported: Vec<ResolutionPreset>,
    /// Last configuration applied.
    pub config: Option<CaptureConfig>,
    /// Reject `open` with this message.
    pub open_error: Option<String>,
    /// Do not confirm `open` on its own.
    pub manual_open: bool,
    /// Hold still captures until [`MockHandle::complete_picture`].
    pub manual_pictures: bool,
    pub(crate) pending_picture: Option<Completer<Picture>>,
    /// Delay before `RecordingStarted` is reported.
    pub start_delay: Option<Duration>,
    /// Report this failure instead of finalizing a recording.
    pub recording_error: Option<String>,
    /// The recording in progress.
    pub recording: Option<RecordingRequest>,
    /// Current sensor.
    pub facing: Option<Facing>,
    /// Current flash mode.
    pub flash: Option<Flash>,
    /// Last zoom requested.
    pub zoom: Option<f32>,
    /// Last video size requested after configuration.
    pub video_size: Option<SizeSelector>,
    /// Reported by `permissions_granted`.
    pub permissions_denied: bool,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single JPEG the mock produces for stills and video frames.
pub fn mock_jpeg() -> Vec<u8> {
    let (width, height) = MOCK_VIDEO_SIZE;
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))).unwrap_or_default()
}

/// Mock library handed to the bridge.
pub struct MockLibrary {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle onto a [`MockLibrary`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLibrary {
    /// Create a mock library and its control handle.
    #[must_use]
    pub fn new() -> (Self, MockHandle) {
        Self::with_state(MockState::default())
    }

    /// Create a mock library from preset state.
    #[must_use]
    pub fn with_state(state: MockState) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(state));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }

    fn record(&self, call: &'static str) -> MutexGuard<'_, MockState> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }
}

impl MockState {
    fn notify(&self, event: LibraryEvent) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(event);
        }
    }
}

impl CaptureLibrary for MockLibrary {
    fn set_listener(&mut self, listener: Listener) {
        self.record("set_listener").listener = Some(listener);
    }

    fn supports_preset(&self, preset: ResolutionPreset) -> bool {
        !lock(&self.state).unsupported.contains(&preset)
    }

    fn configure(&mut self, config: &CaptureConfig) {
        let mut state = self.record("configure");
        state.config = Some(*config);
        state.facing = Some(config.facing);
        state.flash = Some(config.flash);
    }

    fn open(&mut self) -> Result<()> {
        let state = self.record("open");
        if let Some(message) = &state.open_error {
            return Err(CaptureError::OpenFailed(message.clone()));
        }
        if !state.manual_open {
            state.notify(LibraryEvent::Opened);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.record("close").notify(LibraryEvent::Closed);
    }

    fn destroy(&mut self) {
        let mut state = self.record("destroy");
        state.listener = None;
    }

    fn take_picture(&mut self) -> Completion<Picture> {
        let mut state = self.record("take_picture");
        let (done, pending) = completion();
        if state.manual_pictures {
            state.pending_picture = Some(done);
        } else {
            let _ = done.send(Ok(Picture { data: mock_jpeg() }));
        }
        pending
    }

    fn start_recording(&mut self, request: &RecordingRequest) -> Result<()> {
        let mut state = self.record("start_recording");
        if state.recording.is_some() {
            return Err(CaptureError::RecordingFailed("already recording".to_owned()));
        }
        state.recording = Some(request.clone());

        match (state.start_delay, state.listener.clone()) {
            (Some(delay), Some(listener)) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = listener.send(LibraryEvent::RecordingStarted);
                });
            }
            _ => state.notify(LibraryEvent::RecordingStarted),
        }
        Ok(())
    }

    fn stop_recording(&mut self) {
        let mut state = self.record("stop_recording");
        let Some(request) = state.recording.take() else {
            return;
        };
        let outcome = match state.recording_error.clone() {
            Some(message) => Err(CaptureError::RecordingFailed(message)),
            None => write_mock_video(&request.file),
        };
        state.notify(LibraryEvent::RecordingFinished(outcome));
    }

    fn set_facing(&mut self, facing: Facing) -> Result<()> {
        self.record("set_facing").facing = Some(facing);
        Ok(())
    }

    fn set_flash(&mut self, flash: Flash) -> Result<()> {
        self.record("set_flash").flash = Some(flash);
        Ok(())
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.record("set_zoom").zoom = Some(zoom);
    }

    fn set_video_size(&mut self, size: SizeSelector) {
        self.record("set_video_size").video_size = Some(size);
    }

    fn permissions_granted(&self) -> bool {
        !lock(&self.state).permissions_denied
    }
}

/// Two-frame MJPEG stream.
fn write_mock_video(path: &Path) -> Result<VideoResult> {
    let frame = mock_jpeg();
    std::fs::write(path, [frame.as_slice(), frame.as_slice()].concat())?;
    let (width, height) = MOCK_VIDEO_SIZE;
    Ok(VideoResult {
        path: path.to_path_buf(),
        width,
        height,
        duration: Duration::from_millis(66),
    })
}

impl MockHandle {
    /// Access the shared state.
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Library methods invoked so far.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    /// Whether a library method was invoked.
    #[must_use]
    pub fn called(&self, call: &str) -> bool {
        self.state().calls.iter().any(|made| *made == call)
    }

    /// Push a lifecycle event as the library would.
    pub fn emit(&self, event: LibraryEvent) {
        self.state().notify(event);
    }

    /// Resolve a held still capture. Returns `false` if none was pending.
    pub fn complete_picture(&self, outcome: Result<Picture>) -> bool {
        let pending = self.state().pending_picture.take();
        pending.is_some_and(|done| done.send(outcome).is_ok())
    }

    /// Whether a still capture is being held.
    #[must_use]
    pub fn has_pending_picture(&self) -> bool {
        self.state().pending_picture.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_mock_records_calls_and_confirms_open() {
        let (mut library, handle) = MockLibrary::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        library.set_listener(tx);
        library.open().expect("open succeeds");

        assert_eq!(handle.calls(), vec!["set_listener", "open"]);
        assert!(matches!(rx.try_recv(), Ok(LibraryEvent::Opened)));
    }

    #[test]
    fn test_mock_open_error() {
        let (mut library, _handle) = MockLibrary::with_state(MockState {
            open_error: Some("busy".to_owned()),
            ..MockState::default()
        });
        assert!(matches!(library.open(), Err(CaptureError::OpenFailed(_))));
    }

    #[test]
    fn test_mock_manual_picture() {
        let (mut library, handle) = MockLibrary::with_state(MockState {
            manual_pictures: true,
            ..MockState::default()
        });
        let mut pending = library.take_picture();
        assert!(pending.try_recv().is_err());
        assert!(handle.complete_picture(Ok(Picture { data: vec![1] })));
        let picture = pending.try_recv().expect("completed").expect("ok");
        assert_eq!(picture.data, vec![1]);
    }

    #[test]
    fn test_mock_jpeg_is_decodable() {
        let decoded = image::load_from_memory(&mock_jpeg()).expect("decodes");
        assert_eq!((decoded.width(), decoded.height()), MOCK_VIDEO_SIZE);
    }
}
