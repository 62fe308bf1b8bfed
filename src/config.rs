//! View creation parameters and protocol defaults.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::BridgeError;
use crate::preset::ResolutionPreset;
use crate::traits::{Facing, Flash};

/// Recording length cap when `maxDuration` is omitted (one hour).
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(60 * 60 * 1000);

/// Whether recordings get a thumbnail when `storeThumbnail` is omitted.
pub const DEFAULT_STORE_THUMBNAIL: bool = true;

/// Creation parameters for one embedded camera view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewOptions {
    /// Initial sensor.
    pub facing: Facing,
    /// Initial flash mode.
    pub flash: Flash,
    /// Requested tier label; unknown labels select the best available size.
    pub resolution_preset: String,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            facing: Facing::default(),
            flash: Flash::default(),
            resolution_preset: ResolutionPreset::DEFAULT.label().to_owned(),
        }
    }
}

impl ViewOptions {
    /// Decode the creation arguments sent with a view request.
    ///
    /// `null` yields the defaults.
    pub fn from_creation_params(params: &Value) -> Result<Self, BridgeError> {
        if params.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(params)
            .map_err(|err| BridgeError::InvalidArgument(format!("invalid creation params: {err}")))
    }
}
