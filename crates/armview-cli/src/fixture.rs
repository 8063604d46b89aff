//! Built-in kinematic service used when no `remote_url` is configured.
//!
//! It serves a fixed five-link arm laid out along +x.  There is no solver:
//! `update_kinematic_state` adopts the new angles and re-announces the
//! current vertices, and a move is "reached" only when the target already
//! is the tip.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use armview_middleware::{LocalTransport, TopicBus};
use armview_types::protocol::{
    ArmStateChangedEvent, GET_KINEMATIC_PARAMETERS, GET_KINEMATIC_STATE, GET_VERTICES,
    GetKinematicStateResponse, GetVerticesResponse, MOVE_END_EFFECTOR, MoveEndEffectorCommand,
    MoveEndEffectorResponse, ROTATE_END_EFFECTOR, RotateEndEffectorCommand,
    UPDATE_KINEMATIC_STATE, UpdateKinematicStateCommand,
};
use armview_types::{
    ArmError, KinematicParameters, KinematicState, Point3, VERTEX_COUNT, Vertices,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Distance under which a target counts as the current tip.
const REACH_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
struct FixtureArm {
    parameters: KinematicParameters,
    state: KinematicState,
    vertices: Vertices,
}

impl Default for FixtureArm {
    fn default() -> Self {
        Self {
            parameters: KinematicParameters {
                l_0: 1.0,
                l_1: 1.0,
                l_2: 1.0,
                l_3: 1.0,
                l_4: 1.0,
            },
            state: KinematicState::default(),
            vertices: std::array::from_fn(|i| Point3::new(i as f64, 0.0, 0.0)),
        }
    }
}

fn lock(arm: &Mutex<FixtureArm>) -> MutexGuard<'_, FixtureArm> {
    arm.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, ArmError> {
    serde_json::from_value(args).map_err(|e| ArmError::Remote {
        command: command.to_string(),
        message: format!("bad arguments: {e}"),
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ArmError> {
    Ok(serde_json::to_value(value)?)
}

/// A [`LocalTransport`] answering every command the viewer sends and
/// publishing state changes on `state_topic`.
pub fn fixture_transport(state_topic: &str) -> LocalTransport {
    let transport = LocalTransport::new();
    let arm = Arc::new(Mutex::new(FixtureArm::default()));

    let a = Arc::clone(&arm);
    transport.on(GET_KINEMATIC_STATE, move |_| {
        let reply = GetKinematicStateResponse {
            kinematic_state: lock(&a).state,
        };
        async move { encode(&reply) }
    });

    let a = Arc::clone(&arm);
    transport.on(GET_KINEMATIC_PARAMETERS, move |_| {
        let parameters = lock(&a).parameters;
        async move { encode(&parameters) }
    });

    let a = Arc::clone(&arm);
    transport.on(GET_VERTICES, move |_| {
        let reply = GetVerticesResponse {
            vertices: lock(&a).vertices,
        };
        async move { encode(&reply) }
    });

    let a = Arc::clone(&arm);
    let bus: TopicBus = transport.bus().clone();
    let topic = state_topic.to_string();
    transport.on(UPDATE_KINEMATIC_STATE, move |args| {
        let outcome = decode::<UpdateKinematicStateCommand>(UPDATE_KINEMATIC_STATE, args)
            .and_then(|command| {
                let event = {
                    let mut arm = lock(&a);
                    arm.state = command.new_kinematic_state;
                    ArmStateChangedEvent {
                        kinematic_state: arm.state,
                        vertices: arm.vertices,
                    }
                };
                let delivered = bus.publish(&topic, encode(&event)?);
                debug!(topic = %topic, delivered, "fixture state changed");
                Ok(Value::Null)
            });
        async move { outcome }
    });

    let a = Arc::clone(&arm);
    transport.on(MOVE_END_EFFECTOR, move |args| {
        let outcome = decode::<MoveEndEffectorCommand>(MOVE_END_EFFECTOR, args).and_then(|command| {
            let tip = lock(&a).vertices[VERTEX_COUNT - 1];
            let distance = (command.target_position - tip).norm();
            let response = if distance <= REACH_TOLERANCE {
                MoveEndEffectorResponse::Reached {
                    delta_position_magnitude: distance,
                    iterations: 0,
                }
            } else {
                MoveEndEffectorResponse::Unreachable
            };
            encode(&response)
        });
        async move { outcome }
    });

    transport.on(ROTATE_END_EFFECTOR, |args| {
        let outcome =
            decode::<RotateEndEffectorCommand>(ROTATE_END_EFFECTOR, args).and_then(|command| {
                // Only the identity rotation is within reach of a fixed arm.
                let response = if command.euler_angles.norm() <= REACH_TOLERANCE {
                    MoveEndEffectorResponse::Reached {
                        delta_position_magnitude: 0.0,
                        iterations: 0,
                    }
                } else {
                    MoveEndEffectorResponse::Unreachable
                };
                encode(&response)
            });
        async move { outcome }
    });

    transport
}

#[cfg(test)]
mod tests {
    use super::*;
    use armview_middleware::Transport;
    use armview_state::{ArmStateStore, StoreConfig};
    use armview_types::protocol::ARM_STATE_CHANGED;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn store_bootstraps_from_fixture() {
        let transport = Arc::new(fixture_transport(ARM_STATE_CHANGED));
        let store = ArmStateStore::spawn(transport, StoreConfig::default());
        store.initialize().unwrap();

        let loaded = store.loaded().await.unwrap();
        assert_eq!(loaded.end_effector(), Point3::new(5.0, 0.0, 0.0));
        assert_eq!(loaded.kinematic_parameters.l_4, 1.0);
        store.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn update_is_announced_on_topic() {
        let transport = fixture_transport(ARM_STATE_CHANGED);
        let store = ArmStateStore::spawn(Arc::new(transport.clone()), StoreConfig::default());
        let mut snapshots = store.subscribe();

        transport
            .invoke(
                UPDATE_KINEMATIC_STATE,
                json!({"newKinematicState": KinematicState::from_angles([1.0, 2.0, 3.0, 4.0, 5.0])}),
            )
            .await
            .unwrap();
        let snapshot = snapshots
            .wait_for(|s| s.kinematic_state.theta_4 == 5.0)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.end_effector(), Point3::new(5.0, 0.0, 0.0));

        let reply = transport.invoke(GET_KINEMATIC_STATE, json!({})).await.unwrap();
        assert_eq!(reply["kinematicState"]["theta_2"], json!(3.0));
        store.teardown().await;
    }

    #[tokio::test]
    async fn only_the_tip_is_reachable() {
        let transport = fixture_transport(ARM_STATE_CHANGED);
        let reached = transport
            .invoke(MOVE_END_EFFECTOR, json!({"targetPosition": [5.0, 0.0, 0.0]}))
            .await
            .unwrap();
        assert_eq!(
            reached,
            json!({"reached": {"deltaPositionMagnitude": 0.0, "iterations": 0}})
        );

        let missed = transport
            .invoke(MOVE_END_EFFECTOR, json!({"targetPosition": [0.0, 9.0, 0.0]}))
            .await
            .unwrap();
        assert_eq!(missed, json!("unreachable"));
    }

    #[tokio::test]
    async fn rotation_other_than_identity_is_unreachable() {
        let transport = fixture_transport(ARM_STATE_CHANGED);
        let reply = transport
            .invoke(ROTATE_END_EFFECTOR, json!({"eulerAngles": [0.0, 30.0, 0.0]}))
            .await
            .unwrap();
        assert_eq!(reply, json!("unreachable"));
    }

    #[tokio::test]
    async fn bad_arguments_are_remote_errors() {
        let transport = fixture_transport(ARM_STATE_CHANGED);
        let err = transport
            .invoke(MOVE_END_EFFECTOR, json!({"target": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ArmError::Remote { ref message, .. } if message.starts_with("bad arguments")));
    }
}
