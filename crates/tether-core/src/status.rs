use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contracts::{ApkAvailability, InstallFailure};

/// Caller-visible lifecycle status. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    RequestingRuntimeInstall,
    RequestingPermission,
    Resumed,
    ResumedNotTracking,
    Paused,
    ErrorFatal,
    ErrorRuntimeNotAvailable,
    ErrorPermissionDenied,
    ErrorConfigurationUnsupported,
}

impl SessionStatus {
    pub fn is_resumed(self) -> bool {
        matches!(self, SessionStatus::Resumed | SessionStatus::ResumedNotTracking)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            SessionStatus::ErrorFatal
                | SessionStatus::ErrorRuntimeNotAvailable
                | SessionStatus::ErrorPermissionDenied
                | SessionStatus::ErrorConfigurationUnsupported
        )
    }

    /// Stable numeric code used across the C boundary.
    pub fn code(self) -> i32 {
        match self {
            SessionStatus::Uninitialized => 0,
            SessionStatus::RequestingRuntimeInstall => 1,
            SessionStatus::RequestingPermission => 2,
            SessionStatus::Resumed => 3,
            SessionStatus::ResumedNotTracking => 4,
            SessionStatus::Paused => 5,
            SessionStatus::ErrorFatal => 200,
            SessionStatus::ErrorRuntimeNotAvailable => 201,
            SessionStatus::ErrorPermissionDenied => 202,
            SessionStatus::ErrorConfigurationUnsupported => 203,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::RequestingRuntimeInstall => "requesting runtime install",
            SessionStatus::RequestingPermission => "requesting permission",
            SessionStatus::Resumed => "resumed",
            SessionStatus::ResumedNotTracking => "resumed (not tracking)",
            SessionStatus::Paused => "paused",
            SessionStatus::ErrorFatal => "fatal error",
            SessionStatus::ErrorRuntimeNotAvailable => "runtime not available",
            SessionStatus::ErrorPermissionDenied => "permission denied",
            SessionStatus::ErrorConfigurationUnsupported => "configuration unsupported",
        };
        f.write_str(name)
    }
}

/// Result delivered to install callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Success,
    Error,
    ErrorDeviceNotCompatible,
    ErrorUserDeclined,
}

impl InstallStatus {
    pub fn is_success(self) -> bool {
        self == InstallStatus::Success
    }

    pub fn code(self) -> i32 {
        match self {
            InstallStatus::Success => 100,
            InstallStatus::Error => 200,
            InstallStatus::ErrorDeviceNotCompatible => 201,
            InstallStatus::ErrorUserDeclined => 203,
        }
    }
}

impl From<InstallFailure> for InstallStatus {
    fn from(value: InstallFailure) -> Self {
        match value {
            InstallFailure::DeviceNotCompatible => InstallStatus::ErrorDeviceNotCompatible,
            InstallFailure::UserDeclined => InstallStatus::ErrorUserDeclined,
            InstallFailure::Other => InstallStatus::Error,
        }
    }
}

/// Engine-facing summary of an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionAvailability {
    pub supported: bool,
    pub installed: bool,
}

impl From<ApkAvailability> for SessionAvailability {
    fn from(value: ApkAvailability) -> Self {
        match value {
            ApkAvailability::SupportedNotInstalled | ApkAvailability::SupportedApkTooOld => Self {
                supported: true,
                installed: false,
            },
            ApkAvailability::SupportedInstalled => Self {
                supported: true,
                installed: true,
            },
            _ => Self::default(),
        }
    }
}
