//! Camera-View-Bridge: a command-and-callback bridge for embedded camera views
//!
//! This library mediates between a message-based method channel and a native
//! capture library. Commands are decoded into typed variants, checked against
//! the session state, and forwarded to a [`CaptureLibrary`] implementation;
//! library callbacks come back out as asynchronous [`Event`]s.

pub mod bridge;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod frame;
pub mod media;
pub mod preset;
pub mod session;
pub mod thumbnail;
pub mod traits;

#[cfg(feature = "v4l2")]
pub mod device;

#[cfg(test)]
pub mod mock;

pub use bridge::{BridgeAdapter, Services};
pub use command::{Command, MethodCall, MethodKind};
pub use config::ViewOptions;
pub use error::{BridgeError, MethodError, Reply};
pub use event::{Event, EventSink, ViewEvent, ViewId};
pub use factory::ViewFactory;
pub use preset::{ResolutionPreset, SizeSelector};
pub use session::{Session, SessionState};
pub use traits::{CaptureError, CaptureLibrary, Facing, Flash, LibraryEvent};

#[cfg(feature = "v4l2")]
pub use device::{V4l2Config, V4l2Library};
