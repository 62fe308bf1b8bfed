//! Line-delimited JSON framing for the method channel.
//!
//! Each inbound line is one [`Inbound`] frame, tagged by `op`. Replies carry
//! the `id` of the frame they answer; events carry the view they came from.
//!
//! ```text
//! -> {"op":"create","id":1,"view":0,"params":{"facing":"BACK"}}
//! -> {"op":"call","id":2,"view":0,"method":"setZoom","arguments":{"zoom":0.5}}
//! <- {"id":2,"result":true}
//! <- {"view":0,"event":"onCameraOpened","arguments":null}
//! ```

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{MethodError, Reply, CAMERA_ERROR};
use crate::event::{ViewEvent, ViewId};

/// Frame id chosen by the sender.
pub type FrameId = u64;

/// A frame received from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Inbound {
    /// Create a view.
    Create {
        /// Frame id.
        id: FrameId,
        /// View to create.
        view: ViewId,
        /// Creation params; `null` for defaults.
        #[serde(default)]
        params: Value,
    },
    /// Invoke a method on a view.
    Call {
        /// Frame id.
        id: FrameId,
        /// Target view.
        view: ViewId,
        /// Method name.
        method: String,
        /// Argument map.
        #[serde(default)]
        arguments: Value,
    },
    /// Destroy a view.
    Dispose {
        /// Frame id.
        id: FrameId,
        /// View to destroy.
        view: ViewId,
    },
}

impl Inbound {
    /// Frame id to answer with.
    #[must_use]
    pub const fn id(&self) -> FrameId {
        match self {
            Self::Create { id, .. } | Self::Call { id, .. } | Self::Dispose { id, .. } => *id,
        }
    }
}

/// Framing errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The line is not a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one inbound line.
pub fn decode(line: &str) -> Result<Inbound, ChannelError> {
    Ok(serde_json::from_str(line)?)
}

/// Encode the reply to frame `id`.
#[must_use]
pub fn encode_reply(id: FrameId, reply: &Reply) -> String {
    let frame = match reply {
        Reply::Success(value) => json!({"id": id, "result": value}),
        Reply::Error(err) => json!({"id": id, "error": err}),
        Reply::NotImplemented => json!({"id": id, "notImplemented": true}),
    };
    frame.to_string()
}

/// Encode the answer to a line that could not be decoded.
#[must_use]
pub fn encode_malformed(err: &ChannelError) -> String {
    json!({"id": null, "error": MethodError::new(CAMERA_ERROR, err.to_string())}).to_string()
}

/// Encode an event notification.
#[must_use]
pub fn encode_event(event: &ViewEvent) -> String {
    json!({
        "view": event.view_id,
        "event": event.event.name(),
        "arguments": event.event.payload(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn parsed(line: &str) -> Value {
        serde_json::from_str(line).expect("valid json")
    }

    #[test]
    fn test_decode_frames() {
        let create = decode(r#"{"op":"create","id":1,"view":3}"#).expect("create");
        assert_eq!(
            create,
            Inbound::Create {
                id: 1,
                view: 3,
                params: Value::Null,
            }
        );

        let call = decode(
            r#"{"op":"call","id":2,"view":3,"method":"setZoom","arguments":{"zoom":0.5}}"#,
        )
        .expect("call");
        assert_eq!(call.id(), 2);
        assert_eq!(
            call,
            Inbound::Call {
                id: 2,
                view: 3,
                method: "setZoom".to_owned(),
                arguments: json!({"zoom": 0.5}),
            }
        );

        let dispose = decode(r#"{"op":"dispose","id":4,"view":3}"#).expect("dispose");
        assert_eq!(dispose, Inbound::Dispose { id: 4, view: 3 });
    }

    #[test]
    fn test_decode_rejects_unknown_op() {
        assert!(decode(r#"{"op":"explode","id":1,"view":0}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_encode_replies() {
        assert_eq!(
            parsed(&encode_reply(5, &Reply::Success(Value::Bool(true)))),
            json!({"id": 5, "result": true})
        );
        assert_eq!(
            parsed(&encode_reply(
                6,
                &Reply::Error(MethodError::new(CAMERA_ERROR, "Camera is not opened."))
            )),
            json!({"id": 6, "error": {
                "code": "CameraError",
                "message": "Camera is not opened.",
                "details": null,
            }})
        );
        assert_eq!(
            parsed(&encode_reply(7, &Reply::NotImplemented)),
            json!({"id": 7, "notImplemented": true})
        );
    }

    #[test]
    fn test_encode_malformed() {
        let err = decode("{").expect_err("truncated");
        let frame = parsed(&encode_malformed(&err));
        assert_eq!(frame["id"], Value::Null);
        assert_eq!(frame["error"]["code"], "CameraError");
    }

    #[test]
    fn test_encode_event() {
        let event = ViewEvent {
            view_id: 2,
            event: Event::CameraError("sensor lost".to_owned()),
        };
        assert_eq!(
            parsed(&encode_event(&event)),
            json!({"view": 2, "event": "onCameraError", "arguments": "sensor lost"})
        );
    }
}
