//! `armview-runtime` – process-level wiring.
//!
//! - [`telemetry`] – `tracing` subscriber and optional OTLP export.
//! - [`session`] – [`ArmSession`], tying a transport to the arm state and
//!   control mode stores.

pub mod session;
pub mod telemetry;

pub use session::ArmSession;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
