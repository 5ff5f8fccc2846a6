use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference frame a coordinate is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// Fixed frame of the inspected asset (site map).
    #[default]
    Asset,
    /// Frame attached to the robot body.
    Robot,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset => write!(f, "asset"),
            Self::Robot => write!(f, "robot"),
        }
    }
}

/// Point in space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub frame: Frame,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64, frame: Frame) -> Self {
        Self { x, y, z, frame }
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Euclidean distance, ignoring the frame tag.
    #[must_use]
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// True when every axis differs by at most `atol`.
    #[must_use]
    pub fn within_tolerance(&self, other: &Position, atol: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= atol)
    }

    #[must_use]
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
            frame: self.frame,
        }
    }
}

/// Orientation as a unit quaternion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
    #[serde(default)]
    pub frame: Frame,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
            frame: Frame::Asset,
        }
    }
}

/// Position plus orientation, the target of a task and the pose recorded at capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub frame: Frame,
}

impl Pose {
    /// Pose at `position` with identity orientation in the same frame.
    #[must_use]
    pub fn at(position: Position) -> Self {
        Self {
            position,
            orientation: Orientation {
                frame: position.frame,
                ..Orientation::default()
            },
            frame: position.frame,
        }
    }
}
