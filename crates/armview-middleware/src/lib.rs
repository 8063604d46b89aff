//! `armview-middleware` – the transport layer between the client state
//! stores and the remote kinematic service.
//!
//! The stores never speak WebSocket (or anything else) directly.  They only
//! see the [`Transport`] trait: a single-shot `invoke` and a long-lived,
//! push-based `subscribe`.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] trait, the RAII [`Subscription`] and
//!   the typed [`request`][transport::request] helper.
//! - [`bus`] – topic-based fan-out built on Tokio broadcast channels, plus
//!   [`LocalTransport`], an in-process loopback used by the fixture service
//!   and by tests.
//! - [`ws`] – [`WsTransport`], a JSON-over-WebSocket client.

pub mod bus;
pub mod transport;
pub mod ws;

pub use bus::{LocalTransport, TopicBus};
pub use transport::{EventHandler, Subscription, Transport, request};
pub use ws::WsTransport;
