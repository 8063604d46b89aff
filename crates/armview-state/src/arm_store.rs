//! [`ArmStateStore`] – the local mirror of the remote solver's arm state.
//!
//! Two producers feed one snapshot:
//!
//! * the one-shot **bootstrap** (settling delay, then `get_kinematic_state`,
//!   `get_kinematic_parameters`, `get_vertices`), and
//! * **live updates** pushed on the state topic.
//!
//! Both are serialised through a single actor task that owns the
//! [`watch::Sender`] of the snapshot, so every write is one complete replace
//! and readers never see a state/vertex pair from two different sources.
//!
//! The bootstrap carries a [`CancellationToken`] that is checked after every
//! suspension point.  Tearing the store down (or re-entering
//! [`initialize`][ArmStateStore::initialize]) cancels it; a step that was
//! already dispatched may still finish on the remote side, but its result is
//! discarded.  A failed step leaves the snapshot loading forever: there is no
//! retry and no timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use armview_middleware::{Subscription, Transport, request};
use armview_types::protocol::{
    ARM_STATE_CHANGED, ArmStateChangedEvent, EmptyArgs, GET_KINEMATIC_PARAMETERS,
    GET_KINEMATIC_STATE, GET_VERTICES, GetKinematicParametersResponse, GetKinematicStateResponse,
    GetVerticesResponse,
};
use armview_types::{ArmError, ArmSnapshot, KinematicParameters, KinematicState, Vertices};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Cosmetic pause before the first bootstrap request.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Construction parameters for [`ArmStateStore::spawn`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Pause before the first bootstrap request.
    pub settle_delay: Duration,
    /// Topic carrying [`ArmStateChangedEvent`] payloads.
    pub state_topic: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            state_topic: ARM_STATE_CHANGED.to_string(),
        }
    }
}

/// Progress of the bootstrap sequence.
///
/// The snapshot alone cannot tell a slow bootstrap from a failed one (both
/// stay loading); this status can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    /// `initialize` has not been called yet.
    Idle,
    Running,
    Complete,
    /// A remote step failed; the snapshot stays loading.
    Failed(String),
    Cancelled,
}

enum StoreCommand {
    Initialize,
}

/// Handle to a running arm state store.
///
/// Created with [`spawn`][Self::spawn], which subscribes to live updates
/// immediately.  Dropping the handle stops the store just like
/// [`teardown`][Self::teardown], without waiting for it.
pub struct ArmStateStore {
    commands: mpsc::UnboundedSender<StoreCommand>,
    snapshot: watch::Receiver<ArmSnapshot>,
    status: watch::Receiver<BootstrapStatus>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl ArmStateStore {
    /// Subscribe to live updates on `transport` and start the store actor.
    ///
    /// Must be called from within a Tokio runtime.  The snapshot starts
    /// loading with zeroed fields; call [`initialize`][Self::initialize] to
    /// run the bootstrap.
    pub fn spawn(transport: Arc<dyn Transport>, config: StoreConfig) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(ArmSnapshot::default());
        let (status_tx, status_rx) = watch::channel(BootstrapStatus::Idle);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel::<Value>();

        let subscription = transport.subscribe(
            &config.state_topic,
            Box::new(move |payload| {
                // The actor is gone once the store is torn down.
                let _ = updates_tx.send(payload);
            }),
        );

        let shutdown = CancellationToken::new();
        let actor = StoreActor {
            transport,
            config,
            snapshot: snapshot_tx,
            status: status_tx,
            shutdown: shutdown.clone(),
            live_updates: 0,
        };
        let worker = tokio::spawn(actor.run(commands_rx, updates_rx, subscription));

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            status: status_rx,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Start the bootstrap sequence.
    ///
    /// Re-entering while a bootstrap is in flight cancels it and starts a
    /// fresh one.  Once the snapshot has loaded this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::StoreClosed`] if the store actor has stopped.
    pub fn initialize(&self) -> Result<(), ArmError> {
        self.commands
            .send(StoreCommand::Initialize)
            .map_err(|_| ArmError::StoreClosed)
    }

    /// The current snapshot.
    pub fn read(&self) -> ArmSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every snapshot replace.
    pub fn subscribe(&self) -> watch::Receiver<ArmSnapshot> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> BootstrapStatus {
        self.status.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<BootstrapStatus> {
        self.status.clone()
    }

    /// Wait until the bootstrap has published and return that snapshot.
    ///
    /// Never resolves if the bootstrap failed or was never started.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::StoreClosed`] if the store stops first.
    pub async fn loaded(&self) -> Result<ArmSnapshot, ArmError> {
        let mut snapshot = self.snapshot.clone();
        let loaded = snapshot
            .wait_for(|s| !s.is_loading)
            .await
            .map_err(|_| ArmError::StoreClosed)?;
        Ok(loaded.clone())
    }

    /// Cancel any pending bootstrap step, unsubscribe from live updates and
    /// wait for the store actor to finish.
    pub async fn teardown(mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            warn!(error = %e, "arm state store task ended abnormally");
        }
    }
}

impl Drop for ArmStateStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct BootstrapData {
    state: KinematicState,
    parameters: KinematicParameters,
    vertices: Vertices,
}

struct InFlight {
    token: CancellationToken,
    outcome: BoxFuture<'static, Result<BootstrapData, ArmError>>,
}

/// Sole writer of the snapshot.
struct StoreActor {
    transport: Arc<dyn Transport>,
    config: StoreConfig,
    snapshot: watch::Sender<ArmSnapshot>,
    status: watch::Sender<BootstrapStatus>,
    shutdown: CancellationToken,
    /// Live updates applied so far.
    live_updates: u64,
}

impl StoreActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<StoreCommand>,
        mut updates: mpsc::UnboundedReceiver<Value>,
        subscription: Subscription,
    ) {
        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(StoreCommand::Initialize) => self.begin_bootstrap(&mut in_flight),
                    None => break,
                },
                Some(payload) = updates.recv() => self.apply_live_update(payload),
                outcome = next_outcome(&mut in_flight) => {
                    in_flight = None;
                    self.finish_bootstrap(outcome);
                }
            }
        }

        if let Some(abandoned) = in_flight.take() {
            abandoned.token.cancel();
            self.status.send_replace(BootstrapStatus::Cancelled);
            debug!("bootstrap abandoned at teardown");
        }
        subscription.unsubscribe();
        debug!(topic = %self.config.state_topic, "arm state store stopped");
    }

    fn begin_bootstrap(&mut self, in_flight: &mut Option<InFlight>) {
        if !self.snapshot.borrow().is_loading {
            debug!("arm state already loaded; initialize ignored");
            return;
        }
        if let Some(previous) = in_flight.take() {
            previous.token.cancel();
            debug!("initialize re-entered; previous bootstrap cancelled");
        }

        let token = self.shutdown.child_token();
        let outcome = Box::pin(bootstrap(
            Arc::clone(&self.transport),
            self.config.settle_delay,
            token.clone(),
        ));
        *in_flight = Some(InFlight { token, outcome });
        self.status.send_replace(BootstrapStatus::Running);
        info!(
            settle_ms = self.config.settle_delay.as_millis() as u64,
            "bootstrap started"
        );
    }

    fn finish_bootstrap(&mut self, outcome: Result<BootstrapData, ArmError>) {
        match outcome {
            Ok(data) => {
                // A live update that already landed is newer than the
                // bootstrap's state/vertex pair; keep it.
                let keep_live = self.live_updates > 0;
                self.snapshot.send_modify(|snapshot| {
                    snapshot.kinematic_parameters = data.parameters;
                    if !keep_live {
                        snapshot.kinematic_state = data.state;
                        snapshot.vertices = data.vertices;
                    }
                    snapshot.is_loading = false;
                });
                self.status.send_replace(BootstrapStatus::Complete);
                info!(kept_live_state = keep_live, "arm state loaded");
            }
            Err(ArmError::Cancelled) => {
                self.status.send_replace(BootstrapStatus::Cancelled);
                debug!("bootstrap cancelled");
            }
            Err(e) => {
                warn!(error = %e, "bootstrap failed; arm state stays loading");
                self.status.send_replace(BootstrapStatus::Failed(e.to_string()));
            }
        }
    }

    fn apply_live_update(&mut self, payload: Value) {
        let event = match serde_json::from_value::<ArmStateChangedEvent>(payload) {
            Ok(event) => event,
            Err(e) => {
                let error = ArmError::MalformedLiveUpdate {
                    topic: self.config.state_topic.clone(),
                    details: e.to_string(),
                };
                warn!(%error, "live update rejected");
                return;
            }
        };

        self.live_updates += 1;
        self.snapshot.send_modify(|snapshot| {
            snapshot.kinematic_state = event.kinematic_state;
            snapshot.vertices = event.vertices;
        });
        debug!(count = self.live_updates, "live update applied");
    }
}

async fn next_outcome(in_flight: &mut Option<InFlight>) -> Result<BootstrapData, ArmError> {
    match in_flight {
        Some(pending) => pending.outcome.as_mut().await,
        None => std::future::pending().await,
    }
}

#[instrument(skip_all, name = "bootstrap")]
async fn bootstrap(
    transport: Arc<dyn Transport>,
    settle_delay: Duration,
    token: CancellationToken,
) -> Result<BootstrapData, ArmError> {
    checkpoint(&token, tokio::time::sleep(settle_delay)).await?;

    let state = checkpoint(
        &token,
        request::<_, GetKinematicStateResponse>(transport.as_ref(), GET_KINEMATIC_STATE, &EmptyArgs {}),
    )
    .await??;
    debug!(step = GET_KINEMATIC_STATE, "bootstrap step done");

    let parameters = checkpoint(
        &token,
        request::<_, GetKinematicParametersResponse>(
            transport.as_ref(),
            GET_KINEMATIC_PARAMETERS,
            &EmptyArgs {},
        ),
    )
    .await??;
    debug!(step = GET_KINEMATIC_PARAMETERS, "bootstrap step done");

    let vertices = checkpoint(
        &token,
        request::<_, GetVerticesResponse>(transport.as_ref(), GET_VERTICES, &EmptyArgs {}),
    )
    .await??;
    debug!(step = GET_VERTICES, "bootstrap step done");

    Ok(BootstrapData {
        state: state.kinematic_state,
        parameters: parameters.into_parameters(),
        vertices: vertices.vertices,
    })
}

/// Await `step` unless `token` fires first, then re-check the token.
async fn checkpoint<F: Future>(token: &CancellationToken, step: F) -> Result<F::Output, ArmError> {
    let output = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(ArmError::Cancelled),
        output = step => output,
    };
    if token.is_cancelled() {
        return Err(ArmError::Cancelled);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn checkpoint_passes_output_through() {
        let token = CancellationToken::new();
        assert_eq!(checkpoint(&token, async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_short_circuits_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result = checkpoint(&token, std::future::pending::<()>()).await;
        assert_eq!(result, Err(ArmError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_interrupts_settling_delay() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let started = tokio::time::Instant::now();
        let result = checkpoint(&token, tokio::time::sleep(Duration::from_secs(10))).await;
        assert_eq!(result, Err(ArmError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn default_config_uses_state_changed_topic() {
        let config = StoreConfig::default();
        assert_eq!(config.state_topic, ARM_STATE_CHANGED);
        assert_eq!(config.settle_delay, Duration::from_millis(500));
    }
}
