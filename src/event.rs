//! Outbound notifications.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifier the host assigns to each embedded view.
pub type ViewId = i64;

/// Payload of [`Event::VideoTaken`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTaken {
    /// Finalized output file.
    pub file: PathBuf,
    /// Size of the output file in bytes.
    pub file_size: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

/// A notification sent to the app, not tied to any particular call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The camera opened.
    CameraOpened,
    /// The camera closed.
    CameraClosed,
    /// The library reported an error.
    CameraError(String),
    /// The encoder started writing.
    VideoRecordingStart,
    /// The encoder stopped writing.
    VideoRecordingEnd,
    /// The recording is finalized and registered.
    VideoTaken(VideoTaken),
}

impl Event {
    /// Method name the event is invoked as.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CameraOpened => "onCameraOpened",
            Self::CameraClosed => "onCameraClosed",
            Self::CameraError(_) => "onCameraError",
            Self::VideoRecordingStart => "onVideoRecordingStart",
            Self::VideoRecordingEnd => "onVideoRecordingEnd",
            Self::VideoTaken(_) => "onVideoTaken",
        }
    }

    /// Arguments the event is invoked with.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::CameraError(message) => Value::String(message.clone()),
            Self::VideoTaken(taken) => serde_json::to_value(taken).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// An event tagged with the view that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEvent {
    /// Originating view.
    pub view_id: ViewId,
    /// The event.
    pub event: Event,
}

/// Per-view handle onto the shared outbound stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    view_id: ViewId,
    tx: mpsc::UnboundedSender<ViewEvent>,
}

impl EventSink {
    /// Wrap a shared sender for one view.
    #[must_use]
    pub const fn new(view_id: ViewId, tx: mpsc::UnboundedSender<ViewEvent>) -> Self {
        Self { view_id, tx }
    }

    /// A sink with its own fresh stream.
    #[must_use]
    pub fn channel(view_id: ViewId) -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(view_id, tx), rx)
    }

    /// The view this sink reports for.
    #[must_use]
    pub const fn view_id(&self) -> ViewId {
        self.view_id
    }

    /// Fire and forget.
    pub fn emit(&self, event: Event) {
        debug!(view_id = self.view_id, event = event.name(), "emitting event");
        let tagged = ViewEvent {
            view_id: self.view_id,
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!(view_id = self.view_id, "event stream closed, dropping event");
        }
    }
}
