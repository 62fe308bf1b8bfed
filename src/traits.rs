//! Core traits and types for the native capture library abstraction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::preset::{ResolutionPreset, SizeSelector};

/// Which sensor the session captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Facing {
    /// Front (user-facing) camera.
    #[default]
    Front,
    /// Back (world-facing) camera.
    Back,
}

impl Facing {
    /// Wire name of this facing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Front => "FRONT",
            Self::Back => "BACK",
        }
    }
}

impl FromStr for Facing {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("FRONT") {
            Ok(Self::Front)
        } else if s.eq_ignore_ascii_case("BACK") {
            Ok(Self::Back)
        } else {
            Err(UnknownVariant(s.to_owned()))
        }
    }
}

impl TryFrom<String> for Facing {
    type Error = UnknownVariant;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flash mode applied to still captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Flash {
    /// Flash never fires.
    #[default]
    Off,
    /// Flash always fires.
    On,
    /// The library decides from scene brightness. Libraries that cannot
    /// meter the scene treat it as [`Flash::On`].
    Auto,
}

impl Flash {
    /// Wire name of this flash mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::Auto => "AUTO",
        }
    }
}

impl FromStr for Flash {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [Self::Off, Self::On, Self::Auto]
            .into_iter()
            .find(|flash| s.eq_ignore_ascii_case(flash.as_str()))
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

impl TryFrom<String> for Flash {
    type Error = UnknownVariant;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Flash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variant: {0:?}")]
pub struct UnknownVariant(pub String);

/// Error type for capture library operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The camera could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The camera is not open.
    #[error("camera is not open")]
    NotOpen,
    /// A still capture failed.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    /// A recording failed to start or finalize.
    #[error("recording failed: {0}")]
    RecordingFailed(String),
    /// The library does not support the requested setting.
    #[error("not supported: {0}")]
    Unsupported(String),
    /// The library dropped a completion without reporting an outcome.
    #[error("operation was abandoned")]
    Abandoned,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture library operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// A captured still image, JPEG encoded.
#[derive(Debug, Clone)]
pub struct Picture {
    /// Encoded bytes, written verbatim to the target file.
    pub data: Vec<u8>,
}

/// A finalized recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoResult {
    /// Where the encoder wrote the output.
    pub path: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Recorded length.
    pub duration: Duration,
}

/// Parameters for a single recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingRequest {
    /// Output file. Never exists when the request is made.
    pub file: PathBuf,
    /// Recording stops on its own after this long.
    pub max_duration: Duration,
    /// Frames are scaled down to at most this width.
    pub max_width: Option<u32>,
    /// Frames are scaled down to at most this height.
    pub max_height: Option<u32>,
}

impl RecordingRequest {
    /// An uncapped recording.
    #[must_use]
    pub const fn new(file: PathBuf, max_duration: Duration) -> Self {
        Self {
            file,
            max_duration,
            max_width: None,
            max_height: None,
        }
    }
}

/// Configuration the adapter derives from the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    /// Initial sensor.
    pub facing: Facing,
    /// Initial flash mode.
    pub flash: Flash,
    /// Size selector for still captures.
    pub picture_size: SizeSelector,
    /// Size selector for recordings.
    pub video_size: SizeSelector,
}

/// Lifecycle notifications pushed by the library to its listener.
#[derive(Debug)]
pub enum LibraryEvent {
    /// The camera finished opening.
    Opened,
    /// The camera closed.
    Closed,
    /// The library hit an error. Fatal errors leave the camera closed.
    Error {
        /// Human-readable description.
        message: String,
        /// Whether the camera must be reopened.
        fatal: bool,
    },
    /// The encoder received its first frame.
    RecordingStarted,
    /// The encoder finalized (or failed to finalize) the output file.
    RecordingFinished(Result<VideoResult>),
}

/// Channel the library reports lifecycle events on.
pub type Listener = mpsc::UnboundedSender<LibraryEvent>;

/// Receiving half of a one-shot operation outcome.
pub type Completion<T> = oneshot::Receiver<Result<T>>;

/// Sending half of a one-shot operation outcome.
pub type Completer<T> = oneshot::Sender<Result<T>>;

/// Create a linked completer/completion pair.
#[must_use]
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    oneshot::channel()
}

/// Capabilities the bridge needs from a platform capture library.
///
/// Methods start work and return quickly; anything that completes later is
/// reported through a [`Completion`] or the [`Listener`].
pub trait CaptureLibrary: Send + 'static {
    /// Install the listener that receives lifecycle events.
    fn set_listener(&mut self, listener: Listener);

    /// Whether the hardware can deliver the given preset.
    fn supports_preset(&self, preset: ResolutionPreset) -> bool;

    /// Apply initial configuration. Called once, before the first `open`.
    fn configure(&mut self, config: &CaptureConfig);

    /// Begin opening the camera. Success is reported as [`LibraryEvent::Opened`].
    fn open(&mut self) -> Result<()>;

    /// Close the camera, keeping it reopenable.
    fn close(&mut self);

    /// Release every resource. The library is not used afterwards.
    fn destroy(&mut self);

    /// Capture one still image.
    fn take_picture(&mut self) -> Completion<Picture>;

    /// Begin encoding to `request.file`.
    fn start_recording(&mut self, request: &RecordingRequest) -> Result<()>;

    /// Ask the encoder to finalize. The outcome arrives as
    /// [`LibraryEvent::RecordingFinished`].
    fn stop_recording(&mut self);

    /// Switch sensors.
    fn set_facing(&mut self, facing: Facing) -> Result<()>;

    /// Change flash mode.
    fn set_flash(&mut self, flash: Flash) -> Result<()>;

    /// Set zoom in `0.0..=1.0`; the library clamps out-of-range values.
    fn set_zoom(&mut self, zoom: f32);

    /// Change the size selector used by subsequent recordings.
    fn set_video_size(&mut self, size: SizeSelector);

    /// Whether camera and microphone access are granted.
    fn permissions_granted(&self) -> bool {
        true
    }
}
