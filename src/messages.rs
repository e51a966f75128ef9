//! Wire types for the TF republishing service and its result stream
//!
//! Field names follow the JSON encoding used by the bridge, so these types
//! serialize directly into service requests and decode stream messages.

use serde::{Deserialize, Serialize};

/// Service type of the aggregate-subscription service
pub const REPUBLISH_TFS_SERVICE_TYPE: &str = "tf2_web_republisher/RepublishTFs";

/// Message type published on the result stream
pub const TF_ARRAY_MESSAGE_TYPE: &str = "tf2_web_republisher/TFArray";

/// Strip one leading path separator from a frame id
pub fn normalize_frame_id(frame_id: &str) -> &str {
    frame_id.strip_prefix('/').unwrap_or(frame_id)
}

/// Duration as a whole-seconds / nanoseconds pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosDuration {
    pub secs: i32,
    pub nsecs: i32,
}

impl RosDuration {
    /// Negative and NaN inputs map to zero, values past `i32::MAX` seconds
    /// saturate.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if seconds.is_nan() {
            return Self::default();
        }
        let seconds = seconds.clamp(0.0, i32::MAX as f64);
        let secs = seconds.floor();
        let mut nsecs = ((seconds - secs) * 1e9).round() as i32;
        let mut secs = secs as i32;
        if nsecs >= 1_000_000_000 {
            secs += 1;
            nsecs -= 1_000_000_000;
        }
        Self { secs, nsecs }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Rigid-body transform of a frame relative to the fixed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vector3,
    pub rotation: Quaternion,
}

impl Transform {
    pub fn new(translation: [f64; 3], rotation: [f64; 4]) -> Self {
        let [x, y, z] = translation;
        let [qx, qy, qz, qw] = rotation;
        Self {
            translation: Vector3 { x, y, z },
            rotation: Quaternion {
                x: qx,
                y: qy,
                z: qz,
                w: qw,
            },
        }
    }
}

/// Request sent to the aggregate-subscription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishTfsRequest {
    pub source_frames: Vec<String>,
    pub target_frame: String,
    pub angular_thres: f64,
    pub trans_thres: f64,
    pub rate: f64,
    pub timeout: RosDuration,
}

/// Response naming the stream the server will publish on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishTfsResponse {
    pub topic_name: String,
}

/// One per-frame update inside a stream message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    pub child_frame_id: String,
    pub transform: Transform,
}

/// Batch of frame updates published on the result stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfArray {
    #[serde(default)]
    pub transforms: Vec<TransformUpdate>,
}
