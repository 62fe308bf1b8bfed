//! The per-view session record and its precondition checks.

use crate::command::Precondition;
use crate::config::ViewOptions;
use crate::error::BridgeError;
use crate::traits::{Facing, Flash};

/// Lifecycle phase, independent of in-flight captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Not open; may be opened.
    Closed,
    /// `open` was requested, the library has not confirmed.
    Opening,
    /// Ready for capture commands.
    Open,
    /// Torn down for good.
    Disposed,
}

/// Composite state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not open.
    Closed,
    /// Waiting for the library to open.
    Opening,
    /// Open and idle.
    Open,
    /// Open with a still capture in flight.
    CapturingPhoto,
    /// Open with a recording in progress.
    CapturingVideo,
    /// Disposed.
    Disposed,
}

/// One embedded camera surface.
#[derive(Debug, Clone)]
pub struct Session {
    phase: Phase,
    facing: Facing,
    flash: Flash,
    zoom: f32,
    taking_picture: bool,
    taking_video: bool,
}

impl Session {
    /// A closed session configured from the creation params.
    #[must_use]
    pub const fn new(options: &ViewOptions) -> Self {
        Self {
            phase: Phase::Closed,
            facing: options.facing,
            flash: options.flash,
            zoom: 0.0,
            taking_picture: false,
            taking_video: false,
        }
    }

    /// Composite state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self.phase {
            Phase::Closed => SessionState::Closed,
            Phase::Opening => SessionState::Opening,
            Phase::Disposed => SessionState::Disposed,
            Phase::Open if self.taking_video => SessionState::CapturingVideo,
            Phase::Open if self.taking_picture => SessionState::CapturingPhoto,
            Phase::Open => SessionState::Open,
        }
    }

    /// Whether capture commands are accepted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open)
    }

    /// Whether the session was disposed.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.phase, Phase::Disposed)
    }

    /// Whether a still capture is in flight.
    #[must_use]
    pub const fn is_taking_picture(&self) -> bool {
        self.taking_picture
    }

    /// Whether a recording is in progress.
    #[must_use]
    pub const fn is_taking_video(&self) -> bool {
        self.taking_video
    }

    /// Current sensor.
    #[must_use]
    pub const fn facing(&self) -> Facing {
        self.facing
    }

    /// Current flash mode.
    #[must_use]
    pub const fn flash(&self) -> Flash {
        self.flash
    }

    /// Current zoom in `0.0..=1.0`.
    #[must_use]
    pub const fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Run one check.
    pub const fn check(&self, precondition: Precondition) -> Result<(), BridgeError> {
        match precondition {
            Precondition::Opened if !self.is_open() => Err(BridgeError::NotOpened),
            Precondition::NotRecording if self.taking_video => Err(BridgeError::AlreadyRecording),
            Precondition::NotTakingPicture if self.taking_picture => {
                Err(BridgeError::AlreadyTakingPicture)
            }
            _ => Ok(()),
        }
    }

    /// Run checks in order, stopping at the first failure.
    pub fn check_all(&self, preconditions: &[Precondition]) -> Result<(), BridgeError> {
        preconditions
            .iter()
            .try_for_each(|precondition| self.check(*precondition))
    }

    /// Closed → Opening. Returns whether the library should be asked to open.
    pub fn begin_opening(&mut self) -> bool {
        if self.phase == Phase::Closed {
            self.phase = Phase::Opening;
            true
        } else {
            false
        }
    }

    /// The library confirmed the open. Returns whether the phase changed.
    pub fn opened(&mut self) -> bool {
        match self.phase {
            Phase::Closed | Phase::Opening => {
                self.phase = Phase::Open;
                true
            }
            Phase::Open | Phase::Disposed => false,
        }
    }

    /// The camera is closed, or failed to open.
    pub fn closed(&mut self) {
        if self.phase != Phase::Disposed {
            self.phase = Phase::Closed;
        }
    }

    /// Whether an open was requested but not confirmed.
    #[must_use]
    pub const fn is_opening(&self) -> bool {
        matches!(self.phase, Phase::Opening)
    }

    /// Enter the terminal phase. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.phase == Phase::Disposed {
            return false;
        }
        self.phase = Phase::Disposed;
        self.taking_picture = false;
        self.taking_video = false;
        true
    }

    /// The still capture completed.
    pub fn end_picture(&mut self) {
        self.taking_picture = false;
    }

    /// The recording finalized or failed.
    pub fn end_video(&mut self) {
        self.taking_video = false;
    }

    /// Run `preconditions` and mark a still capture in flight.
    ///
    /// Both steps happen under one borrow of the session lock.
    pub fn try_begin_picture(
        &mut self,
        preconditions: &[Precondition],
    ) -> Result<(), BridgeError> {
        self.check_all(preconditions)?;
        self.taking_picture = true;
        Ok(())
    }

    /// Run `preconditions` and mark a recording in progress.
    pub fn try_begin_video(
        &mut self,
        preconditions: &[Precondition],
    ) -> Result<(), BridgeError> {
        self.check_all(preconditions)?;
        self.taking_video = true;
        Ok(())
    }

    /// Record a sensor switch; zoom goes back to 0.
    pub fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
        self.zoom = 0.0;
    }

    /// Record a flash change.
    pub fn set_flash(&mut self, flash: Flash) {
        self.flash = flash;
    }

    /// Record a zoom change, clamped to `0.0..=1.0`.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_nan() { 0.0 } else { zoom.clamp(0.0, 1.0) };
    }
}
