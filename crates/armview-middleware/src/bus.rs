//! Headless, topic-keyed publish/subscribe fan-out and the in-process
//! [`LocalTransport`].
//!
//! Every topic gets its own [`tokio::sync::broadcast`] channel so a slow
//! handler on one topic never blocks delivery on another.  Subscribing spawns
//! a forwarding task that drains the channel into the handler; dropping the
//! returned [`Subscription`] aborts that task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use armview_types::ArmError;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::transport::{EventHandler, Subscription, Transport};

/// Default per-topic capacity (payloads buffered before slow subscribers
/// start lagging).
const DEFAULT_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Topic-keyed broadcast fan-out.  Clone it cheaply – all clones share the
/// same channels.
#[derive(Clone, Debug)]
pub struct TopicBus {
    capacity: usize,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>,
}

impl TopicBus {
    /// Create a bus whose topic channels each buffer `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of subscribers handed the payload; `0` when nobody
    /// listens, which is a normal condition.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let sender = lock(&self.topics).get(topic).cloned();
        match sender {
            Some(sender) => sender.send(payload).unwrap_or(0),
            None => 0,
        }
    }

    /// Attach `handler` to `topic`.
    ///
    /// Must be called from within a Tokio runtime.  Payloads published after
    /// this call returns are delivered in publication order.
    pub fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        let mut receiver = self.sender(topic).subscribe();
        let topic_name = topic.to_string();
        let forwarder = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => handler(payload),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(topic = %topic_name, lagged_by = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        let abort = forwarder.abort_handle();
        Subscription::new(topic, move || abort.abort())
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.topics)
            .get(topic)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Value> {
        lock(&self.topics)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

type CommandHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ArmError>> + Send + Sync>;

/// In-process [`Transport`]: commands are served by registered async
/// handlers and events are published with [`emit`][Self::emit].
///
/// Every invocation is recorded, in order, so callers can inspect which
/// commands a client actually issued.
#[derive(Clone, Default)]
pub struct LocalTransport {
    bus: TopicBus,
    handlers: Arc<Mutex<HashMap<String, CommandHandler>>>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `command` with `handler`, replacing any previous handler.
    pub fn on<F, Fut>(&self, command: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ArmError>> + Send + 'static,
    {
        let handler: CommandHandler = Arc::new(move |args| Box::pin(handler(args)));
        lock(&self.handlers).insert(command.to_string(), handler);
    }

    /// Serialise `payload` and publish it on `topic`.
    ///
    /// Returns the number of subscribers handed the payload.
    pub fn emit<P: Serialize>(&self, topic: &str, payload: &P) -> Result<usize, ArmError> {
        let payload = serde_json::to_value(payload)?;
        Ok(self.bus.publish(topic, payload))
    }

    /// The event side of this transport.  Command handlers that publish
    /// events capture a clone of the bus rather than of the transport.
    pub fn bus(&self) -> &TopicBus {
        &self.bus
    }

    /// Commands invoked so far, oldest first.
    pub fn invocations(&self) -> Vec<String> {
        lock(&self.invocations).clone()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.bus.subscriber_count(topic)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, ArmError> {
        lock(&self.invocations).push(command.to_string());
        let handler = lock(&self.handlers).get(command).cloned();
        match handler {
            Some(handler) => {
                debug!(command, "local invoke");
                handler(args).await
            }
            None => Err(ArmError::Remote {
                command: command.to_string(),
                message: "unknown command".to_string(),
            }),
        }
    }

    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        self.bus.subscribe(topic, handler)
    }
}
