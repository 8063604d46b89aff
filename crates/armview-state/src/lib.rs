//! `armview-state` – client-side state synchronisation.
//!
//! # Modules
//!
//! - [`arm_store`] – [`ArmStateStore`]: mirrors the remote solver's joint
//!   angles, link lengths and joint positions.  A cancellable bootstrap and a
//!   live-update subscription feed one single-writer snapshot.
//! - [`control_mode`] – [`ControlModeStore`]: the operator's pending
//!   translate/rotate command.
//! - [`motion`] – [`MotionCommand`]: the solver command built from the
//!   active control mode.

pub mod arm_store;
pub mod control_mode;
pub mod motion;

pub use arm_store::{ArmStateStore, BootstrapStatus, DEFAULT_SETTLE_DELAY, StoreConfig};
pub use control_mode::ControlModeStore;
pub use motion::MotionCommand;
