//! [`ControlModeStore`] – the operator's pending end-effector command.
//!
//! Two states, `TranslateEndEffector` and `RotateEndEffector`, switched only
//! by [`set_mode`][ControlModeStore::set_mode] /
//! [`switch_to`][ControlModeStore::switch_to].  Field edits apply to the
//! active variant only.  Every operation is a synchronous replace; there is
//! no coupling to the arm state store.

use armview_types::{ArmError, ControlMode, ModeField, ModeKind};
use tokio::sync::watch;
use tracing::debug;

/// Holder of the active [`ControlMode`].
///
/// Consumers that render a preview can [`subscribe`][Self::subscribe] to be
/// notified of every change.
#[derive(Debug)]
pub struct ControlModeStore {
    mode: watch::Sender<ControlMode>,
}

impl ControlModeStore {
    /// Start in the default mode: translate to the origin.
    pub fn new() -> Self {
        Self::with_mode(ControlMode::default())
    }

    pub fn with_mode(mode: ControlMode) -> Self {
        let (mode, _) = watch::channel(mode);
        Self { mode }
    }

    /// Replace the active variant and its payload wholesale.
    pub fn set_mode(&self, mode: ControlMode) {
        let previous = self.mode.send_replace(mode);
        debug!(from = %previous.kind(), to = %mode.kind(), "control mode replaced");
    }

    /// Activate `kind` with a zeroed payload.
    pub fn switch_to(&self, kind: ModeKind) {
        self.set_mode(ControlMode::fresh(kind));
    }

    /// Replace one scalar of the active variant, keeping the other two.
    ///
    /// Returns the updated mode.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::InvalidModeOperation`] when `field` belongs to
    /// the inactive variant; the mode is left untouched.
    pub fn update_field(&self, field: ModeField, value: f64) -> Result<ControlMode, ArmError> {
        let mut outcome = Err(ArmError::StoreClosed);
        self.mode.send_if_modified(|mode| match mode.with_field(field, value) {
            Ok(next) => {
                *mode = next;
                outcome = Ok(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    pub fn read(&self) -> ControlMode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlMode> {
        self.mode.subscribe()
    }
}

impl Default for ControlModeStore {
    fn default() -> Self {
        Self::new()
    }
}
