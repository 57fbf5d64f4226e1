use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::config::NativeConfig;
use crate::error::BackendError;

/// Availability codes reported by the AR runtime package check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApkAvailability {
    UnknownError,
    UnknownChecking,
    UnknownTimedOut,
    UnsupportedDeviceNotCapable,
    SupportedNotInstalled,
    SupportedApkTooOld,
    SupportedInstalled,
}

impl ApkAvailability {
    /// `UnknownChecking` is the only code that asks the caller to poll again.
    pub fn is_pending(self) -> bool {
        self == ApkAvailability::UnknownChecking
    }

    pub fn code(self) -> i32 {
        match self {
            ApkAvailability::UnknownError => 0,
            ApkAvailability::UnknownChecking => 1,
            ApkAvailability::UnknownTimedOut => 2,
            ApkAvailability::UnsupportedDeviceNotCapable => 100,
            ApkAvailability::SupportedNotInstalled => 201,
            ApkAvailability::SupportedApkTooOld => 202,
            ApkAvailability::SupportedInstalled => 203,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ApkAvailability::UnknownError),
            1 => Some(ApkAvailability::UnknownChecking),
            2 => Some(ApkAvailability::UnknownTimedOut),
            100 => Some(ApkAvailability::UnsupportedDeviceNotCapable),
            201 => Some(ApkAvailability::SupportedNotInstalled),
            202 => Some(ApkAvailability::SupportedApkTooOld),
            203 => Some(ApkAvailability::SupportedInstalled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallFailure {
    DeviceNotCompatible,
    UserDeclined,
    Other,
}

/// One poll of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApkInstallPoll {
    Pending,
    Installed,
    Failed(InstallFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigureOutcome {
    Success,
    Unsupported,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeOutcome {
    Success,
    PermissionDenied,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Tracking,
    NotTracking,
    Unknown,
}

/// Image database produced by the runtime from a serialized byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDatabase {
    pub native_handle: usize,
    pub image_count: u32,
}

/// Per-tick view of the latest camera frame. Recomputed on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub timestamp_ns: i64,
    pub tracking_state: TrackingState,
    pub camera_pose: Isometry3<f64>,
    pub native_handle: usize,
}

impl FrameSnapshot {
    pub fn is_tracking(&self) -> bool {
        self.tracking_state == TrackingState::Tracking
    }
}

pub type PermissionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

pub trait PermissionProvider: Send + 'static {
    /// Requests the camera permission. `on_result` may run synchronously or
    /// later from any thread, but runs at most once.
    fn request_camera_permission(&mut self, on_result: PermissionCallback);
}

pub trait ApkProvider: Send + 'static {
    fn check_availability(&mut self) -> ApkAvailability;
    fn request_install(&mut self, user_requested: bool) -> ApkInstallPoll;
}

pub trait ArRuntime: Send + 'static {
    fn create_session(&mut self) -> Result<Box<dyn ArSession>, BackendError>;
}

/// Live session owned by a single controller. Dropping it releases the
/// underlying runtime session.
pub trait ArSession: Send + 'static {
    fn configure(&mut self, config: &NativeConfig) -> ConfigureOutcome;
    fn deserialize_image_database(&mut self, bytes: &[u8]) -> Result<ImageDatabase, BackendError>;
    fn resume(&mut self) -> ResumeOutcome;
    fn pause(&mut self) -> Result<(), BackendError>;
    fn update(&mut self) -> Result<FrameSnapshot, BackendError>;
    fn set_camera_texture_name(&mut self, texture_name: u32);
    fn native_handle(&self) -> usize;
}
