//! `armview-types` – shared data model for the arm visualisation client.
//!
//! Everything that crosses a crate boundary lives here: the kinematic
//! snapshot mirrored from the remote solver, the operator's
//! [`ControlMode`], the wire DTOs in [`protocol`], and the workspace-wide
//! [`ArmError`].

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod protocol;

/// A Cartesian point or vector in the solver's frame.
pub type Point3 = Vector3<f64>;

/// Number of joint positions reported by the solver: base, four
/// intermediate joints and the end-effector tip.
pub const VERTEX_COUNT: usize = 6;

/// Cartesian joint positions, ordered from the base to the end-effector.
pub type Vertices = [Point3; VERTEX_COUNT];

/// Fixed link lengths of the physical arm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicParameters {
    pub l_0: f64,
    pub l_1: f64,
    pub l_2: f64,
    pub l_3: f64,
    pub l_4: f64,
}

/// Joint angles in degrees. Always produced by the remote solver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicState {
    pub theta_0: f64,
    pub theta_1: f64,
    pub theta_2: f64,
    pub theta_3: f64,
    pub theta_4: f64,
}

impl KinematicState {
    /// Build a state from five angles, `theta_0` first.
    pub fn from_angles(angles: [f64; 5]) -> Self {
        let [theta_0, theta_1, theta_2, theta_3, theta_4] = angles;
        Self {
            theta_0,
            theta_1,
            theta_2,
            theta_3,
            theta_4,
        }
    }

    /// The five angles, `theta_0` first.
    pub fn angles(&self) -> [f64; 5] {
        [
            self.theta_0,
            self.theta_1,
            self.theta_2,
            self.theta_3,
            self.theta_4,
        ]
    }
}

/// Read-only view of the mirrored arm state.
///
/// While `is_loading` is `true` every other field holds zeros and must not be
/// treated as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmSnapshot {
    pub kinematic_parameters: KinematicParameters,
    pub kinematic_state: KinematicState,
    pub vertices: Vertices,
    pub is_loading: bool,
}

impl ArmSnapshot {
    /// Position of the end-effector tip (the last vertex).
    pub fn end_effector(&self) -> Point3 {
        self.vertices[VERTEX_COUNT - 1]
    }
}

impl Default for ArmSnapshot {
    fn default() -> Self {
        Self {
            kinematic_parameters: KinematicParameters::default(),
            kinematic_state: KinematicState::default(),
            vertices: [Point3::zeros(); VERTEX_COUNT],
            is_loading: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control mode
// ─────────────────────────────────────────────────────────────────────────────

/// One Cartesian component of a [`Point3`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{other}' (expected x, y or z)")),
        }
    }
}

/// Discriminant of a [`ControlMode`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    TranslateEndEffector,
    RotateEndEffector,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::TranslateEndEffector => write!(f, "TranslateEndEffector"),
            ModeKind::RotateEndEffector => write!(f, "RotateEndEffector"),
        }
    }
}

/// A single scalar field of a control mode payload.
///
/// `Target` addresses the translate target, `Euler` the rotation angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeField {
    Target(Axis),
    Euler(Axis),
}

impl fmt::Display for ModeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeField::Target(axis) => write!(f, "target_position.{axis}"),
            ModeField::Euler(axis) => write!(f, "euler_angles.{axis}"),
        }
    }
}

/// The operator's pending end-effector command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ControlMode {
    /// Move the end-effector to a Cartesian target.
    #[serde(rename_all = "camelCase")]
    TranslateEndEffector { target_position: Point3 },
    /// Orient the end-effector.
    #[serde(rename_all = "camelCase")]
    RotateEndEffector { euler_angles: Point3 },
}

impl Default for ControlMode {
    fn default() -> Self {
        Self::fresh(ModeKind::TranslateEndEffector)
    }
}

impl ControlMode {
    /// A variant of `kind` with an all-zero payload.
    pub fn fresh(kind: ModeKind) -> Self {
        match kind {
            ModeKind::TranslateEndEffector => ControlMode::TranslateEndEffector {
                target_position: Point3::zeros(),
            },
            ModeKind::RotateEndEffector => ControlMode::RotateEndEffector {
                euler_angles: Point3::zeros(),
            },
        }
    }

    pub fn kind(&self) -> ModeKind {
        match self {
            ControlMode::TranslateEndEffector { .. } => ModeKind::TranslateEndEffector,
            ControlMode::RotateEndEffector { .. } => ModeKind::RotateEndEffector,
        }
    }

    /// Return a copy with exactly one component replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::InvalidModeOperation`] when `field` belongs to the
    /// variant that is not active.
    pub fn with_field(self, field: ModeField, value: f64) -> Result<Self, ArmError> {
        match (self, field) {
            (ControlMode::TranslateEndEffector { mut target_position }, ModeField::Target(axis)) => {
                target_position[axis.index()] = value;
                Ok(ControlMode::TranslateEndEffector { target_position })
            }
            (ControlMode::RotateEndEffector { mut euler_angles }, ModeField::Euler(axis)) => {
                euler_angles[axis.index()] = value;
                Ok(ControlMode::RotateEndEffector { euler_angles })
            }
            (mode, field) => Err(ArmError::InvalidModeOperation {
                field: field.to_string(),
                active: mode.kind().to_string(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArmError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote service rejected `{command}`: {message}")]
    Remote { command: String, message: String },

    #[error("Malformed response to `{command}`: {details}")]
    MalformedResponse { command: String, details: String },

    #[error("Malformed live update on `{topic}`: {details}")]
    MalformedLiveUpdate { topic: String, details: String },

    #[error("Invalid mode operation: {field} cannot be edited while {active} is active")]
    InvalidModeOperation { field: String, active: String },

    #[error("Arm state is still loading")]
    NotReady,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Arm state store is closed")]
    StoreClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ArmError {
    /// Whether the error belongs to the remote-call family (unreachable
    /// service, rejected command, or undecodable response).
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            ArmError::Transport(_) | ArmError::Remote { .. } | ArmError::MalformedResponse { .. }
        )
    }
}

impl From<serde_json::Error> for ArmError {
    fn from(e: serde_json::Error) -> Self {
        ArmError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_loading_with_zeros() {
        let snapshot = ArmSnapshot::default();
        assert!(snapshot.is_loading);
        assert_eq!(snapshot.kinematic_state, KinematicState::default());
        assert_eq!(snapshot.kinematic_parameters, KinematicParameters::default());
        assert!(snapshot.vertices.iter().all(|v| *v == Point3::zeros()));
    }

    #[test]
    fn end_effector_is_last_vertex() {
        let mut snapshot = ArmSnapshot::default();
        snapshot.vertices[5] = Point3::new(5.0, 1.0, -2.0);
        assert_eq!(snapshot.end_effector(), Point3::new(5.0, 1.0, -2.0));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(ArmSnapshot::default()).unwrap();
        assert_eq!(json["isLoading"], true);
        assert_eq!(json["kinematicState"]["theta_0"], 0.0);
        assert_eq!(json["vertices"].as_array().unwrap().len(), VERTEX_COUNT);
    }

    #[test]
    fn default_control_mode_is_translate_at_origin() {
        assert_eq!(
            ControlMode::default(),
            ControlMode::TranslateEndEffector {
                target_position: Point3::zeros()
            }
        );
    }

    #[test]
    fn with_field_replaces_only_one_component() {
        let mode = ControlMode::TranslateEndEffector {
            target_position: Point3::new(1.0, 2.0, 3.0),
        };
        let next = mode.with_field(ModeField::Target(Axis::Y), 5.0).unwrap();
        assert_eq!(
            next,
            ControlMode::TranslateEndEffector {
                target_position: Point3::new(1.0, 5.0, 3.0)
            }
        );
    }

    #[test]
    fn with_field_rejects_other_variant_axis() {
        let mode = ControlMode::fresh(ModeKind::RotateEndEffector);
        let err = mode.with_field(ModeField::Target(Axis::X), 1.0).unwrap_err();
        assert!(matches!(err, ArmError::InvalidModeOperation { .. }));
        assert!(err.to_string().contains("RotateEndEffector"));
    }

    #[test]
    fn control_mode_wire_shape() {
        let mode = ControlMode::RotateEndEffector {
            euler_angles: Point3::new(0.0, 90.0, 0.0),
        };
        let json = serde_json::to_value(mode).unwrap();
        assert_eq!(json["kind"], "rotateEndEffector");
        assert_eq!(json["eulerAngles"][1], 90.0);
    }

    #[test]
    fn axis_parses_case_insensitively() {
        assert_eq!("Y".parse::<Axis>().unwrap(), Axis::Y);
        assert!("w".parse::<Axis>().is_err());
    }

    #[test]
    fn transport_failure_family() {
        assert!(ArmError::Transport("down".into()).is_transport_failure());
        assert!(
            ArmError::MalformedResponse {
                command: "get_vertices".into(),
                details: "short".into()
            }
            .is_transport_failure()
        );
        assert!(!ArmError::Cancelled.is_transport_failure());
    }
}
