//! Bridge error taxonomy and the wire-level reply.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::ViewId;
use crate::traits::CaptureError;

/// Wire code for precondition and validation failures.
pub const CAMERA_ERROR: &str = "CameraError";
/// Wire code for a failed still capture.
pub const TAKE_PICTURE_ERROR: &str = "TakePictureError";
/// Wire code for a still capture that could not be written.
pub const SAVE_PICTURE_ERROR: &str = "SavePictureError";
/// Wire code for a failed recording.
pub const RECORDED_ERROR: &str = "RecordedError";

/// Everything a command can fail with.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The session is not open.
    #[error("Camera is not opened.")]
    NotOpened,

    /// A recording is in progress.
    #[error("Already is recording video.")]
    AlreadyRecording,

    /// A still capture is in progress.
    #[error("Already is taking picture.")]
    AlreadyTakingPicture,

    /// The view was disposed.
    #[error("Camera is disposed.")]
    Disposed,

    /// The target output file exists.
    #[error("{} already exists.", .0.display())]
    FileExists(PathBuf),

    /// `facing` is missing or unknown.
    #[error("set facing!")]
    InvalidFacing,

    /// `flash` is missing or unknown.
    #[error("set flash!")]
    InvalidFlash,

    /// Any other malformed argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// The library rejected a synchronous request.
    #[error("{0}")]
    Library(#[source] CaptureError),

    /// The library failed to capture a still.
    #[error("Take picture failure.")]
    TakePicture(#[source] CaptureError),

    /// The still was captured but could not be written.
    #[error("Save picture failure.")]
    SavePicture(#[source] std::io::Error),

    /// A recording failed to start or finalize.
    #[error("{0}")]
    Recorded(String),

    /// No view was created with this id.
    #[error("No camera view with id {0}.")]
    UnknownView(ViewId),

    /// A view with this id already exists.
    #[error("Camera view {0} already exists.")]
    ViewExists(ViewId),
}

impl BridgeError {
    /// Wire code reported with this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TakePicture(_) => TAKE_PICTURE_ERROR,
            Self::SavePicture(_) => SAVE_PICTURE_ERROR,
            Self::Recorded(_) => RECORDED_ERROR,
            _ => CAMERA_ERROR,
        }
    }
}

/// The `(code, message, details)` triple sent back for a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Always `null` on this bridge.
    pub details: Option<Value>,
}

impl MethodError {
    /// Build a triple with no details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<&BridgeError> for MethodError {
    fn from(err: &BridgeError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// The single result of one method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The call succeeded with a value.
    Success(Value),
    /// The call failed.
    Error(MethodError),
    /// The method name is not handled by this bridge.
    NotImplemented,
}

impl Reply {
    /// Whether this is a [`Reply::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The error triple, if the call failed.
    #[must_use]
    pub const fn error(&self) -> Option<&MethodError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Result<Value, BridgeError>> for Reply {
    fn from(result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error(MethodError::from(&err)),
        }
    }
}
