//! The transport contract consumed by the state stores.
//!
//! # Contract
//!
//! * `invoke` – send one command with JSON arguments and await its reply.
//!   May fail with a transport-level ([`ArmError::Transport`]) or
//!   remote-level ([`ArmError::Remote`]) error.  No timeout is applied.
//!
//! * `subscribe` – attach `handler` to `topic`.  The handler runs once per
//!   pushed payload until the returned [`Subscription`] is dropped or
//!   [`unsubscribe`][Subscription::unsubscribe]d.

use std::fmt;

use armview_types::ArmError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

/// Callback invoked with every payload pushed on a subscribed topic.
pub type EventHandler = Box<dyn Fn(Value) + Send + Sync + 'static>;

/// Request/response plus publish/subscribe access to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `command` with `args` and return the raw JSON reply.
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, ArmError>;

    /// Attach `handler` to `topic`.
    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription;
}

/// Invoke `command` with serialisable arguments and decode the reply.
///
/// # Errors
///
/// Propagates transport errors unchanged; a reply that does not decode as
/// `Resp` becomes [`ArmError::MalformedResponse`].
#[instrument(skip(transport, args), level = "debug")]
pub async fn request<Req, Resp>(
    transport: &dyn Transport,
    command: &str,
    args: &Req,
) -> Result<Resp, ArmError>
where
    Req: Serialize + Sync + ?Sized,
    Resp: DeserializeOwned,
{
    let args = serde_json::to_value(args)?;
    let reply = transport.invoke(command, args).await?;
    serde_json::from_value(reply).map_err(|e| ArmError::MalformedResponse {
        command: command.to_string(),
        details: e.to_string(),
    })
}

/// Handle to an active topic subscription.
///
/// Dropping the handle detaches the handler; releasing twice is a no-op.
pub struct Subscription {
    topic: String,
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// Wrap `release`, which must detach the handler when called.
    pub fn new(topic: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            topic: topic.into(),
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            release: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Detach the handler now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.release.is_some())
            .finish()
    }
}
