//! Command names, topics and payload shapes exchanged with the remote
//! kinematic service.
//!
//! | Command | Request | Response |
//! |---|---|---|
//! | [`GET_KINEMATIC_STATE`] | `{}` | [`GetKinematicStateResponse`] |
//! | [`GET_KINEMATIC_PARAMETERS`] | `{}` | [`GetKinematicParametersResponse`] |
//! | [`GET_VERTICES`] | `{}` | [`GetVerticesResponse`] |
//! | [`MOVE_END_EFFECTOR`] | [`MoveEndEffectorCommand`] | [`MoveEndEffectorResponse`] |
//! | [`ROTATE_END_EFFECTOR`] | [`RotateEndEffectorCommand`] | [`MoveEndEffectorResponse`] |
//! | [`UPDATE_KINEMATIC_STATE`] | [`UpdateKinematicStateCommand`] | `null` |
//!
//! Live updates arrive on [`ARM_STATE_CHANGED`] as [`ArmStateChangedEvent`].

use serde::{Deserialize, Serialize};

use crate::{KinematicParameters, KinematicState, Point3, Vertices};

pub const GET_KINEMATIC_STATE: &str = "get_kinematic_state";
pub const GET_KINEMATIC_PARAMETERS: &str = "get_kinematic_parameters";
pub const GET_VERTICES: &str = "get_vertices";
pub const MOVE_END_EFFECTOR: &str = "move_end_effector";
pub const ROTATE_END_EFFECTOR: &str = "rotate_end_effector";
pub const UPDATE_KINEMATIC_STATE: &str = "update_kinematic_state";

/// Topic carrying pushed `(kinematicState, vertices)` pairs.
pub const ARM_STATE_CHANGED: &str = "arm:state-changed";

/// Arguments of the parameterless query commands (`{}` on the wire).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmptyArgs {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKinematicStateResponse {
    pub kinematic_state: KinematicState,
}

/// Reply to [`GET_KINEMATIC_PARAMETERS`].
///
/// Services answer either with the bare `{l_0..l_4}` object or wrapped as
/// `{kinematicParameters: {...}}`; both decode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GetKinematicParametersResponse {
    Wrapped {
        #[serde(rename = "kinematicParameters")]
        kinematic_parameters: KinematicParameters,
    },
    Bare(KinematicParameters),
}

impl GetKinematicParametersResponse {
    pub fn into_parameters(self) -> KinematicParameters {
        match self {
            Self::Wrapped {
                kinematic_parameters,
            } => kinematic_parameters,
            Self::Bare(parameters) => parameters,
        }
    }
}

/// Reply to [`GET_VERTICES`]. Decoding fails unless exactly six points
/// are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GetVerticesResponse {
    pub vertices: Vertices,
}

/// Payload of [`ARM_STATE_CHANGED`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmStateChangedEvent {
    pub kinematic_state: KinematicState,
    pub vertices: Vertices,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEndEffectorCommand {
    pub target_position: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateEndEffectorCommand {
    pub euler_angles: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKinematicStateCommand {
    pub new_kinematic_state: KinematicState,
}

/// Solver verdict for a motion command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MoveEndEffectorResponse {
    Unreachable,
    Reached {
        delta_position_magnitude: f64,
        iterations: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn six_vertices() -> serde_json::Value {
        json!([[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0], [4, 0, 0], [5, 0, 0]])
    }

    #[test]
    fn parameters_decode_bare_and_wrapped() {
        let bare: GetKinematicParametersResponse =
            serde_json::from_value(json!({"l_0": 1, "l_1": 2, "l_2": 3, "l_3": 4, "l_4": 5}))
                .unwrap();
        let wrapped: GetKinematicParametersResponse = serde_json::from_value(json!({
            "kinematicParameters": {"l_0": 1, "l_1": 2, "l_2": 3, "l_3": 4, "l_4": 5}
        }))
        .unwrap();
        assert_eq!(bare.into_parameters(), wrapped.into_parameters());
        assert_eq!(bare.into_parameters().l_4, 5.0);
    }

    #[test]
    fn state_changed_event_decodes_camel_case() {
        let event: ArmStateChangedEvent = serde_json::from_value(json!({
            "kinematicState": {"theta_0": 45, "theta_1": 0, "theta_2": 0, "theta_3": 0, "theta_4": 0},
            "vertices": six_vertices(),
        }))
        .unwrap();
        assert_eq!(event.kinematic_state.theta_0, 45.0);
        assert_eq!(event.vertices[5], Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn vertex_count_other_than_six_is_rejected() {
        let result = serde_json::from_value::<GetVerticesResponse>(json!({
            "vertices": [[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0], [4, 0, 0]]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn move_response_shapes() {
        let unreachable: MoveEndEffectorResponse =
            serde_json::from_value(json!("unreachable")).unwrap();
        assert_eq!(unreachable, MoveEndEffectorResponse::Unreachable);

        let reached: MoveEndEffectorResponse = serde_json::from_value(json!({
            "reached": {"deltaPositionMagnitude": 0.001, "iterations": 12}
        }))
        .unwrap();
        assert_eq!(
            reached,
            MoveEndEffectorResponse::Reached {
                delta_position_magnitude: 0.001,
                iterations: 12
            }
        );
    }

    #[test]
    fn move_command_wire_shape() {
        let json = serde_json::to_value(MoveEndEffectorCommand {
            target_position: Point3::new(1.0, 2.0, 3.0),
        })
        .unwrap();
        assert_eq!(json, json!({"targetPosition": [1.0, 2.0, 3.0]}));
    }
}
