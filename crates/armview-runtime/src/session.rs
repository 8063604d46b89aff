//! [`ArmSession`] – one transport, one arm state store, one control mode.

use std::sync::Arc;

use armview_middleware::Transport;
use armview_state::{ArmStateStore, ControlModeStore, MotionCommand, StoreConfig};
use armview_types::protocol::{
    MoveEndEffectorResponse, UPDATE_KINEMATIC_STATE, UpdateKinematicStateCommand,
};
use armview_types::{ArmError, ControlMode, KinematicState};
use tracing::{info, instrument};

/// A connected viewer session.
///
/// The arm state is only ever written by the store; commands sent from here
/// change the remote arm, and the new pose comes back as a live update.
pub struct ArmSession {
    transport: Arc<dyn Transport>,
    arm: ArmStateStore,
    control: ControlModeStore,
}

impl ArmSession {
    /// Spawn the arm state store on `transport` and start its bootstrap.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, config: StoreConfig) -> Result<Self, ArmError> {
        let arm = ArmStateStore::spawn(Arc::clone(&transport), config);
        arm.initialize()?;
        info!("arm session started");
        Ok(Self {
            transport,
            arm,
            control: ControlModeStore::new(),
        })
    }

    pub fn arm(&self) -> &ArmStateStore {
        &self.arm
    }

    pub fn control(&self) -> &ControlModeStore {
        &self.control
    }

    /// Send the active control mode to the solver.
    #[instrument(skip(self))]
    pub async fn begin_motion(&self) -> Result<MoveEndEffectorResponse, ArmError> {
        MotionCommand::from(self.control.read())
            .send(self.transport.as_ref())
            .await
    }

    /// Ask the remote service to adopt `state` as the new joint angles.
    #[instrument(skip(self))]
    pub async fn update_kinematic_state(&self, state: KinematicState) -> Result<(), ArmError> {
        let args = serde_json::to_value(UpdateKinematicStateCommand {
            new_kinematic_state: state,
        })?;
        self.transport.invoke(UPDATE_KINEMATIC_STATE, args).await?;
        Ok(())
    }

    /// Point the translate target at the arm's current tip.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::NotReady`] while the arm state is still loading.
    pub fn target_current_end_effector(&self) -> Result<ControlMode, ArmError> {
        let snapshot = self.arm.read();
        if snapshot.is_loading {
            return Err(ArmError::NotReady);
        }
        let mode = ControlMode::TranslateEndEffector {
            target_position: snapshot.end_effector(),
        };
        self.control.set_mode(mode);
        Ok(mode)
    }

    /// Tear the arm state store down and wait for it.
    pub async fn shutdown(self) {
        self.arm.teardown().await;
        info!("arm session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armview_middleware::LocalTransport;
    use armview_types::protocol::{
        ARM_STATE_CHANGED, GET_KINEMATIC_PARAMETERS, GET_KINEMATIC_STATE, GET_VERTICES,
        MOVE_END_EFFECTOR, ROTATE_END_EFFECTOR,
    };
    use armview_types::{Axis, ModeField, ModeKind, Point3};
    use serde_json::{Value, json};

    fn line_vertices() -> Value {
        json!([[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0], [4, 0, 0], [5, 0, 0]])
    }

    fn service() -> LocalTransport {
        let transport = LocalTransport::new();
        transport.on(GET_KINEMATIC_STATE, |_| async {
            Ok(json!({"kinematicState": KinematicState::default()}))
        });
        transport.on(GET_KINEMATIC_PARAMETERS, |_| async {
            Ok(json!({"l_0": 1, "l_1": 1, "l_2": 1, "l_3": 1, "l_4": 1}))
        });
        transport.on(GET_VERTICES, |_| async { Ok(json!({"vertices": line_vertices()})) });
        transport
    }

    fn start(transport: &LocalTransport) -> ArmSession {
        ArmSession::start(Arc::new(transport.clone()), StoreConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_bootstrap() {
        let transport = service();
        let session = start(&transport);
        let loaded = session.arm().loaded().await.unwrap();
        assert_eq!(loaded.end_effector(), Point3::new(5.0, 0.0, 0.0));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn targeting_tip_requires_loaded_arm() {
        let transport = service();
        let session = start(&transport);
        assert_eq!(session.target_current_end_effector(), Err(ArmError::NotReady));

        session.arm().loaded().await.unwrap();
        session.control().switch_to(ModeKind::RotateEndEffector);
        let mode = session.target_current_end_effector().unwrap();
        assert_eq!(
            mode,
            ControlMode::TranslateEndEffector {
                target_position: Point3::new(5.0, 0.0, 0.0)
            }
        );
        assert_eq!(session.control().read(), mode);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn begin_motion_sends_translate_target() {
        let transport = service();
        transport.on(MOVE_END_EFFECTOR, |args| async move {
            assert_eq!(args, json!({"targetPosition": [0.0, 2.5, 0.0]}));
            Ok(json!("unreachable"))
        });
        let session = start(&transport);
        session
            .control()
            .update_field(ModeField::Target(Axis::Y), 2.5)
            .unwrap();

        let response = session.begin_motion().await.unwrap();
        assert_eq!(response, MoveEndEffectorResponse::Unreachable);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn begin_motion_in_rotate_mode_sends_euler_angles() {
        let transport = service();
        transport.on(ROTATE_END_EFFECTOR, |args| async move {
            assert_eq!(args, json!({"eulerAngles": [0.0, 0.0, 90.0]}));
            Ok(json!({"reached": {"deltaPositionMagnitude": 0.0, "iterations": 1}}))
        });
        let session = start(&transport);
        session.control().switch_to(ModeKind::RotateEndEffector);
        session
            .control()
            .update_field(ModeField::Euler(Axis::Z), 90.0)
            .unwrap();

        let response = session.begin_motion().await.unwrap();
        assert!(matches!(response, MoveEndEffectorResponse::Reached { iterations: 1, .. }));
        assert!(transport.invocations().iter().any(|c| c == ROTATE_END_EFFECTOR));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn updated_state_comes_back_as_live_update() {
        let transport = service();
        let bus = transport.bus().clone();
        transport.on(UPDATE_KINEMATIC_STATE, move |args| {
            let bus = bus.clone();
            async move {
                let event = json!({
                    "kinematicState": args["newKinematicState"].clone(),
                    "vertices": line_vertices(),
                });
                bus.publish(ARM_STATE_CHANGED, event);
                Ok(Value::Null)
            }
        });
        let session = start(&transport);
        session.arm().loaded().await.unwrap();

        let mut snapshots = session.arm().subscribe();
        session
            .update_kinematic_state(KinematicState::from_angles([10.0, 20.0, 30.0, 40.0, 50.0]))
            .await
            .unwrap();
        let updated = snapshots
            .wait_for(|s| s.kinematic_state.theta_0 == 10.0)
            .await
            .unwrap()
            .clone();
        assert_eq!(updated.kinematic_state.angles(), [10.0, 20.0, 30.0, 40.0, 50.0]);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_update_surfaces_remote_error() {
        let transport = service();
        let session = start(&transport);
        let err = session
            .update_kinematic_state(KinematicState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArmError::Remote { .. }));
        session.shutdown().await;
    }
}
