use std::time::Duration;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use tether_core::contracts::{FrameSnapshot, TrackingState};

/// Camera pose as reported by the runtime: translation in meters and a
/// rotation quaternion stored as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimePose {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

impl Default for RuntimePose {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl From<RuntimePose> for Isometry3<f64> {
    fn from(value: RuntimePose) -> Self {
        let [x, y, z, w] = value.rotation;
        let quaternion = Quaternion::new(w, x, y, z);
        let rotation = if quaternion.norm() <= f64::EPSILON {
            UnitQuaternion::identity()
        } else {
            UnitQuaternion::from_quaternion(quaternion)
        };
        let [tx, ty, tz] = value.translation;
        Isometry3::from_parts(Translation3::new(tx, ty, tz), rotation)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeFrame {
    pub timestamp: Duration,
    pub tracking_state: TrackingState,
    pub pose: RuntimePose,
    pub native_handle: usize,
}

/// Converts runtime frames into [`FrameSnapshot`]s with non-decreasing
/// timestamps.
#[derive(Debug, Clone, Default)]
pub struct FrameConverter {
    last_timestamp_ns: Option<i64>,
}

impl FrameConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_frame(&mut self, frame: RuntimeFrame) -> FrameSnapshot {
        let raw = i64::try_from(frame.timestamp.as_nanos()).unwrap_or(i64::MAX);
        let timestamp_ns = match self.last_timestamp_ns {
            Some(last) if raw < last => last,
            _ => raw,
        };
        self.last_timestamp_ns = Some(timestamp_ns);

        FrameSnapshot {
            timestamp_ns,
            tracking_state: frame.tracking_state,
            camera_pose: frame.pose.into(),
            native_handle: frame.native_handle,
        }
    }

    pub fn reset(&mut self) {
        self.last_timestamp_ns = None;
    }
}
