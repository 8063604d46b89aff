//! Turning the active [`ControlMode`] into the command the solver receives.

use armview_middleware::{Transport, request};
use armview_types::protocol::{
    MOVE_END_EFFECTOR, MoveEndEffectorCommand, MoveEndEffectorResponse, ROTATE_END_EFFECTOR,
    RotateEndEffectorCommand,
};
use armview_types::{ArmError, ControlMode};
use tracing::info;

/// A motion request ready to be sent, one per [`ControlMode`] variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    MoveEndEffector(MoveEndEffectorCommand),
    RotateEndEffector(RotateEndEffectorCommand),
}

impl MotionCommand {
    /// Remote command name.
    pub fn command(&self) -> &'static str {
        match self {
            MotionCommand::MoveEndEffector(_) => MOVE_END_EFFECTOR,
            MotionCommand::RotateEndEffector(_) => ROTATE_END_EFFECTOR,
        }
    }

    /// Send the command and decode the solver's verdict.
    ///
    /// The arm state is not touched here: if the solver moves the arm, the
    /// new pose arrives as a live update.
    pub async fn send(&self, transport: &dyn Transport) -> Result<MoveEndEffectorResponse, ArmError> {
        let response = match self {
            MotionCommand::MoveEndEffector(args) => {
                request::<_, MoveEndEffectorResponse>(transport, self.command(), args).await?
            }
            MotionCommand::RotateEndEffector(args) => {
                request::<_, MoveEndEffectorResponse>(transport, self.command(), args).await?
            }
        };
        info!(command = self.command(), ?response, "motion command answered");
        Ok(response)
    }
}

impl From<ControlMode> for MotionCommand {
    fn from(mode: ControlMode) -> Self {
        match mode {
            ControlMode::TranslateEndEffector { target_position } => {
                MotionCommand::MoveEndEffector(MoveEndEffectorCommand { target_position })
            }
            ControlMode::RotateEndEffector { euler_angles } => {
                MotionCommand::RotateEndEffector(RotateEndEffectorCommand { euler_angles })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armview_middleware::LocalTransport;
    use armview_types::Point3;
    use serde_json::json;

    #[test]
    fn translate_maps_to_move_end_effector() {
        let command = MotionCommand::from(ControlMode::TranslateEndEffector {
            target_position: Point3::new(1.0, 2.0, 3.0),
        });
        assert_eq!(command.command(), MOVE_END_EFFECTOR);
        assert_eq!(
            command,
            MotionCommand::MoveEndEffector(MoveEndEffectorCommand {
                target_position: Point3::new(1.0, 2.0, 3.0)
            })
        );
    }

    #[test]
    fn rotate_maps_to_rotate_end_effector() {
        let command = MotionCommand::from(ControlMode::RotateEndEffector {
            euler_angles: Point3::new(0.0, 45.0, 0.0),
        });
        assert_eq!(command.command(), ROTATE_END_EFFECTOR);
    }

    #[tokio::test]
    async fn send_posts_target_and_decodes_verdict() {
        let transport = LocalTransport::new();
        transport.on(MOVE_END_EFFECTOR, |args| async move {
            assert_eq!(args, json!({"targetPosition": [1.0, 2.0, 3.0]}));
            Ok(json!({"reached": {"deltaPositionMagnitude": 0.01, "iterations": 4}}))
        });

        let command = MotionCommand::from(ControlMode::TranslateEndEffector {
            target_position: Point3::new(1.0, 2.0, 3.0),
        });
        let response = command.send(&transport).await.unwrap();
        assert_eq!(
            response,
            MoveEndEffectorResponse::Reached {
                delta_position_magnitude: 0.01,
                iterations: 4
            }
        );
    }

    #[tokio::test]
    async fn undecodable_verdict_is_malformed_response() {
        let transport = LocalTransport::new();
        transport.on(ROTATE_END_EFFECTOR, |_| async move { Ok(json!({"weird": true})) });

        let command = MotionCommand::from(ControlMode::default());
        let err = command.send(&transport).await.unwrap_err();
        // Translate is active by default, so the rotate handler is never hit.
        assert!(matches!(err, ArmError::Remote { .. }));

        let command = MotionCommand::from(ControlMode::RotateEndEffector {
            euler_angles: Point3::zeros(),
        });
        let err = command.send(&transport).await.unwrap_err();
        assert!(matches!(err, ArmError::MalformedResponse { .. }));
    }
}
