//! Incoming method calls, decoded once into typed commands.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{DEFAULT_MAX_DURATION, DEFAULT_STORE_THUMBNAIL};
use crate::error::BridgeError;
use crate::traits::{Facing, Flash};

/// A raw call as it arrives on the method channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Method name, e.g. `"takePicture"`.
    pub method: String,
    /// Argument map, or `null`.
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    /// Build a call.
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// A session-state check run before a command has any effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Session must be open.
    Opened,
    /// No recording may be in progress.
    NotRecording,
    /// No still capture may be in flight.
    NotTakingPicture,
}

const NONE: &[Precondition] = &[];
const OPENED: &[Precondition] = &[Precondition::Opened];
const IDLE: &[Precondition] = &[
    Precondition::Opened,
    Precondition::NotRecording,
    Precondition::NotTakingPicture,
];

/// Every method the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Open the session if closed.
    StartPreview,
    /// Close the session if open.
    StopPreview,
    /// Capture a still to a file.
    TakePicture,
    /// Begin recording to a file.
    StartRecording,
    /// Begin a size-capped recording of the preview to a file.
    TakeSnapshot,
    /// Finalize the recording.
    StopRecording,
    /// Switch sensors.
    SetFacing,
    /// Change flash mode.
    SetFlash,
    /// Change zoom.
    SetZoom,
    /// Query camera/microphone access.
    IsPermissionsGranted,
    /// Tear the view down.
    Dispose,
}

impl MethodKind {
    /// Every method kind.
    pub const ALL: [Self; 11] = [
        Self::StartPreview,
        Self::StopPreview,
        Self::TakePicture,
        Self::StartRecording,
        Self::TakeSnapshot,
        Self::StopRecording,
        Self::SetFacing,
        Self::SetFlash,
        Self::SetZoom,
        Self::IsPermissionsGranted,
        Self::Dispose,
    ];

    /// Look a method up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StartPreview => "startPreview",
            Self::StopPreview => "stopPreview",
            Self::TakePicture => "takePicture",
            Self::StartRecording => "startRecording",
            Self::TakeSnapshot => "takeSnapshot",
            Self::StopRecording => "stopRecording",
            Self::SetFacing => "setFacing",
            Self::SetFlash => "setFlash",
            Self::SetZoom => "setZoom",
            Self::IsPermissionsGranted => "isPermissionsGranted",
            Self::Dispose => "dispose",
        }
    }

    /// Checks run, in order, before the command is parsed or executed.
    #[must_use]
    pub const fn preconditions(self) -> &'static [Precondition] {
        match self {
            Self::TakePicture
            | Self::StartRecording
            | Self::TakeSnapshot
            | Self::SetFacing
            | Self::SetFlash => IDLE,
            Self::StopRecording | Self::SetZoom => OPENED,
            Self::StartPreview | Self::StopPreview | Self::IsPermissionsGranted | Self::Dispose => {
                NONE
            }
        }
    }
}

/// Arguments of `startRecording`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingArgs {
    /// Output file.
    pub file: PathBuf,
    /// Directory for the thumbnail, if not the default.
    pub thumbnail_path: Option<PathBuf>,
    /// Whether to write a thumbnail after finalizing.
    pub store_thumbnail: bool,
    /// Recording stops on its own after this long.
    pub max_duration: Duration,
    /// Preset label to record at, overriding the view's.
    pub video_size: Option<String>,
}

/// Arguments of `takeSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotArgs {
    /// Output file.
    pub file: PathBuf,
    /// Recording stops on its own after this long.
    pub max_duration: Duration,
    /// Frame width cap; `None` leaves it to the capture size.
    pub max_width: Option<u32>,
    /// Frame height cap.
    pub max_height: Option<u32>,
}

/// A validated command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `startPreview`.
    StartPreview,
    /// `stopPreview`.
    StopPreview,
    /// `takePicture`.
    TakePicture {
        /// Output file.
        file: PathBuf,
    },
    /// `startRecording`.
    StartRecording(RecordingArgs),
    /// `takeSnapshot`.
    TakeSnapshot(SnapshotArgs),
    /// `stopRecording`.
    StopRecording,
    /// `setFacing`.
    SetFacing(Facing),
    /// `setFlash`.
    SetFlash(Flash),
    /// `setZoom`.
    SetZoom(f32),
    /// `isPermissionsGranted`.
    IsPermissionsGranted,
    /// `dispose`.
    Dispose,
}

impl Command {
    /// Validate `arguments` for a method.
    pub fn parse(kind: MethodKind, arguments: &Value) -> Result<Self, BridgeError> {
        let args = Arguments::new(arguments)?;
        let command = match kind {
            MethodKind::StartPreview => Self::StartPreview,
            MethodKind::StopPreview => Self::StopPreview,
            MethodKind::TakePicture => Self::TakePicture {
                file: args.file()?,
            },
            MethodKind::StartRecording => Self::StartRecording(RecordingArgs {
                file: args.file()?,
                thumbnail_path: args
                    .optional_str("thumbnailPath")?
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from),
                store_thumbnail: args
                    .optional_bool("storeThumbnail")?
                    .unwrap_or(DEFAULT_STORE_THUMBNAIL),
                max_duration: args.max_duration()?,
                video_size: args.optional_str("videoSize")?.map(str::to_owned),
            }),
            MethodKind::TakeSnapshot => Self::TakeSnapshot(SnapshotArgs {
                file: args.file()?,
                max_duration: args.max_duration()?,
                max_width: args.dimension_cap("maxWidth")?,
                max_height: args.dimension_cap("maxHeight")?,
            }),
            MethodKind::StopRecording => Self::StopRecording,
            MethodKind::SetFacing => Self::SetFacing(
                args.get_str("facing")
                    .and_then(|facing| facing.parse().ok())
                    .ok_or(BridgeError::InvalidFacing)?,
            ),
            MethodKind::SetFlash => Self::SetFlash(
                args.get_str("flash")
                    .and_then(|flash| flash.parse().ok())
                    .ok_or(BridgeError::InvalidFlash)?,
            ),
            MethodKind::SetZoom => Self::SetZoom(args.zoom()?),
            MethodKind::IsPermissionsGranted => Self::IsPermissionsGranted,
            MethodKind::Dispose => Self::Dispose,
        };
        Ok(command)
    }
}

/// Typed accessors over an untyped argument map.
struct Arguments<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    fn new(arguments: &'a Value) -> Result<Self, BridgeError> {
        match arguments {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            other => Err(BridgeError::InvalidArgument(format!(
                "arguments must be a map, got {other}."
            ))),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    fn get_str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'a str>, BridgeError> {
        self.get(key)
            .map(|value| {
                value
                    .as_str()
                    .ok_or_else(|| invalid(key, "must be a string"))
            })
            .transpose()
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>, BridgeError> {
        self.get(key)
            .map(|value| {
                value
                    .as_bool()
                    .ok_or_else(|| invalid(key, "must be a boolean"))
            })
            .transpose()
    }

    fn optional_u64(&self, key: &str) -> Result<Option<u64>, BridgeError> {
        self.get(key)
            .map(|value| {
                value
                    .as_u64()
                    .ok_or_else(|| invalid(key, "must be a non-negative integer"))
            })
            .transpose()
    }

    fn max_duration(&self) -> Result<Duration, BridgeError> {
        Ok(self
            .optional_u64("maxDuration")?
            .map_or(DEFAULT_MAX_DURATION, Duration::from_millis))
    }

    /// Zero or missing means no cap.
    fn dimension_cap(&self, key: &str) -> Result<Option<u32>, BridgeError> {
        match self.optional_u64(key)? {
            None | Some(0) => Ok(None),
            Some(pixels) => u32::try_from(pixels)
                .map(Some)
                .map_err(|_| invalid(key, "is too large")),
        }
    }

    fn file(&self) -> Result<PathBuf, BridgeError> {
        let file = self
            .optional_str("file")?
            .ok_or_else(|| invalid("file", "is required"))?;
        let path = PathBuf::from(file);
        if !path.is_absolute() {
            return Err(invalid("file", "must be an absolute path"));
        }
        Ok(path)
    }

    /// Missing zoom means 0.0.
    #[allow(clippy::cast_possible_truncation)]
    fn zoom(&self) -> Result<f32, BridgeError> {
        self.get("zoom")
            .map_or(Ok(0.0), |value| {
                value.as_f64().ok_or_else(|| invalid("zoom", "must be a number"))
            })
            .map(|zoom| zoom as f32)
    }
}

fn invalid(key: &str, problem: &str) -> BridgeError {
    BridgeError::InvalidArgument(format!("{key} {problem}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(kind: MethodKind, arguments: Value) -> Result<Command, BridgeError> {
        Command::parse(kind, &arguments)
    }

    #[test]
    fn test_method_names_round_trip() {
        for kind in MethodKind::ALL {
            assert_eq!(MethodKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(MethodKind::from_name("setFilters"), None);
    }

    #[test]
    fn test_mutating_commands_check_open_first() {
        for kind in [
            MethodKind::TakePicture,
            MethodKind::StartRecording,
            MethodKind::TakeSnapshot,
            MethodKind::StopRecording,
            MethodKind::SetFacing,
            MethodKind::SetFlash,
            MethodKind::SetZoom,
        ] {
            assert_eq!(kind.preconditions().first(), Some(&Precondition::Opened));
        }
        assert!(MethodKind::StartPreview.preconditions().is_empty());
        assert!(MethodKind::Dispose.preconditions().is_empty());
    }

    #[test]
    fn test_take_picture_requires_absolute_file() {
        let command = parse(MethodKind::TakePicture, json!({"file": "/tmp/p.jpg"}))
            .expect("valid");
        assert_eq!(
            command,
            Command::TakePicture {
                file: PathBuf::from("/tmp/p.jpg")
            }
        );

        let err = parse(MethodKind::TakePicture, json!({})).expect_err("missing file");
        assert_eq!(err.to_string(), "file is required.");

        let err = parse(MethodKind::TakePicture, json!({"file": "p.jpg"})).expect_err("relative");
        assert_eq!(err.to_string(), "file must be an absolute path.");

        let err = parse(MethodKind::TakePicture, json!({"file": 3})).expect_err("not a string");
        assert_eq!(err.to_string(), "file must be a string.");
    }

    #[test]
    fn test_start_recording_defaults() {
        let command = parse(
            MethodKind::StartRecording,
            json!({"file": "/tmp/v.mjpeg", "thumbnailPath": ""}),
        )
        .expect("valid");
        let Command::StartRecording(args) = command else {
            panic!("expected StartRecording, got {command:?}");
        };
        assert_eq!(args.thumbnail_path, None);
        assert!(args.store_thumbnail);
        assert_eq!(args.max_duration, DEFAULT_MAX_DURATION);
        assert_eq!(args.video_size, None);
    }

    #[test]
    fn test_start_recording_explicit() {
        let command = parse(
            MethodKind::StartRecording,
            json!({
                "file": "/tmp/v.mjpeg",
                "thumbnailPath": "/tmp/thumbs",
                "storeThumbnail": false,
                "maxDuration": 5000,
                "videoSize": "720p",
            }),
        )
        .expect("valid");
        assert_eq!(
            command,
            Command::StartRecording(RecordingArgs {
                file: PathBuf::from("/tmp/v.mjpeg"),
                thumbnail_path: Some(PathBuf::from("/tmp/thumbs")),
                store_thumbnail: false,
                max_duration: Duration::from_secs(5),
                video_size: Some("720p".to_owned()),
            })
        );
    }

    #[test]
    fn test_start_recording_bad_duration() {
        let err = parse(
            MethodKind::StartRecording,
            json!({"file": "/tmp/v.mjpeg", "maxDuration": -1}),
        )
        .expect_err("negative");
        assert_eq!(err.to_string(), "maxDuration must be a non-negative integer.");
    }

    #[test]
    fn test_facing_and_flash_errors() {
        assert_eq!(
            parse(MethodKind::SetFacing, json!({"facing": "BACK"})).expect("valid"),
            Command::SetFacing(Facing::Back)
        );
        let err = parse(MethodKind::SetFacing, json!({"facing": "UP"})).expect_err("unknown");
        assert_eq!(err.to_string(), "set facing!");
        let err = parse(MethodKind::SetFacing, Value::Null).expect_err("missing");
        assert_eq!(err.to_string(), "set facing!");

        assert_eq!(
            parse(MethodKind::SetFlash, json!({"flash": "auto"})).expect("valid"),
            Command::SetFlash(Flash::Auto)
        );
        let err = parse(MethodKind::SetFlash, json!({"flash": 1})).expect_err("not a string");
        assert_eq!(err.to_string(), "set flash!");
    }

    #[test]
    fn test_zoom() {
        assert_eq!(
            parse(MethodKind::SetZoom, json!({"zoom": 0.5})).expect("valid"),
            Command::SetZoom(0.5)
        );
        assert_eq!(
            parse(MethodKind::SetZoom, json!({})).expect("defaults"),
            Command::SetZoom(0.0)
        );
        assert!(parse(MethodKind::SetZoom, json!({"zoom": "max"})).is_err());
    }

    #[test]
    fn test_non_map_arguments() {
        let err = parse(MethodKind::StopRecording, json!([1, 2])).expect_err("array");
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_take_snapshot_caps() {
        let command = parse(
            MethodKind::TakeSnapshot,
            json!({"file": "/tmp/s.mjpeg", "maxWidth": 640, "maxHeight": 0, "maxDuration": 800}),
        )
        .expect("valid");
        assert_eq!(
            command,
            Command::TakeSnapshot(SnapshotArgs {
                file: PathBuf::from("/tmp/s.mjpeg"),
                max_duration: Duration::from_millis(800),
                max_width: Some(640),
                max_height: None,
            })
        );

        let Command::TakeSnapshot(args) =
            parse(MethodKind::TakeSnapshot, json!({"file": "/tmp/s.mjpeg"})).expect("valid")
        else {
            panic!("expected TakeSnapshot");
        };
        assert_eq!(args.max_duration, DEFAULT_MAX_DURATION);
        assert_eq!((args.max_width, args.max_height), (None, None));

        let err = parse(
            MethodKind::TakeSnapshot,
            json!({"file": "/tmp/s.mjpeg", "maxHeight": 5_000_000_000_u64}),
        )
        .expect_err("overflow");
        assert_eq!(err.to_string(), "maxHeight is too large.");
        assert_eq!(
            MethodKind::TakeSnapshot.preconditions(),
            MethodKind::TakePicture.preconditions()
        );
    }
}
