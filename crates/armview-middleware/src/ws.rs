//! JSON-over-WebSocket [`Transport`].
//!
//! Every frame is a JSON object tagged by `op`:
//!
//! | `op` | Direction | Fields |
//! |---|---|---|
//! | `invoke` | client → service | `id`, `command`, `args` |
//! | `reply` | service → client | `id`, `ok`, `result` or `error` |
//! | `event` | service → client | `topic`, `payload` |
//!
//! Replies are matched to pending invocations by `id`.  Events are fanned
//! out through a [`TopicBus`].  When the connection drops, every pending
//! invocation fails with [`ArmError::Transport`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use armview_types::ArmError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::bus::TopicBus;
use crate::transport::{EventHandler, Subscription, Transport};

/// A single frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireFrame {
    Invoke {
        id: u64,
        command: String,
        args: Value,
    },
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Event {
        topic: String,
        payload: Value,
    },
}

struct PendingCall {
    command: String,
    reply: oneshot::Sender<Result<Value, ArmError>>,
}

type PendingCalls = Arc<Mutex<HashMap<u64, PendingCall>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// WebSocket client speaking the [`WireFrame`] protocol.
///
/// The socket is driven by a background task owned by this value; dropping
/// the transport closes the connection.
pub struct WsTransport {
    url: String,
    outbound: mpsc::UnboundedSender<WireFrame>,
    pending: PendingCalls,
    bus: TopicBus,
    next_id: AtomicU64,
    worker: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to `url` (e.g. `"ws://localhost:9002"`).
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Transport`] if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, ArmError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ArmError::Transport(format!("connect to {url}: {e}")))?;
        info!(url, "connected to kinematic service");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WireFrame>();
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let bus = TopicBus::default();

        let worker = {
            let pending = Arc::clone(&pending);
            let bus = bus.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else { break };
                            let text = match serde_json::to_string(&frame) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(error = %e, "dropping unserialisable frame");
                                    continue;
                                }
                            };
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        msg = ws_rx.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    handle_incoming(text.as_str(), &pending, &bus);
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(e)) => {
                                    warn!(error = %e, "websocket read error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                }
                info!(url = %url, "kinematic service connection closed");
                fail_pending(&pending, "connection closed");
            })
        };

        Ok(Self {
            url: url.to_string(),
            outbound,
            pending,
            bus,
            next_id: AtomicU64::new(1),
            worker,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, ArmError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(
            id,
            PendingCall {
                command: command.to_string(),
                reply: reply_tx,
            },
        );

        let frame = WireFrame::Invoke {
            id,
            command: command.to_string(),
            args,
        };
        if self.outbound.send(frame).is_err() {
            lock(&self.pending).remove(&id);
            return Err(ArmError::Transport("connection closed".to_string()));
        }
        debug!(id, command, "invoke sent");

        reply_rx
            .await
            .map_err(|_| ArmError::Transport("connection closed".to_string()))?
    }

    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        self.bus.subscribe(topic, handler)
    }
}

/// Route one inbound text frame to its pending call or topic.
fn handle_incoming(text: &str, pending: &PendingCalls, bus: &TopicBus) {
    let frame = match serde_json::from_str::<WireFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "ignoring unparseable frame");
            return;
        }
    };

    match frame {
        WireFrame::Reply {
            id,
            ok,
            result,
            error,
        } => {
            let Some(call) = lock(pending).remove(&id) else {
                debug!(id, "reply for unknown invocation");
                return;
            };
            let outcome = if ok {
                Ok(result)
            } else {
                Err(ArmError::Remote {
                    command: call.command,
                    message: error.unwrap_or_else(|| "unspecified error".to_string()),
                })
            };
            // The caller may have stopped waiting; its reply is discarded.
            let _ = call.reply.send(outcome);
        }
        WireFrame::Event { topic, payload } => {
            bus.publish(&topic, payload);
        }
        WireFrame::Invoke { command, .. } => {
            warn!(command = %command, "service sent an invoke frame; ignoring");
        }
    }
}

fn fail_pending(pending: &PendingCalls, reason: &str) {
    let calls: Vec<PendingCall> = lock(pending).drain().map(|(_, call)| call).collect();
    for call in calls {
        let _ = call.reply.send(Err(ArmError::Transport(format!(
            "{reason} while waiting for `{}`",
            call.command
        ))));
    }
}
