//! In-process stand-in for the AR runtime, its package manager and the
//! platform permission prompt.
//!
//! One [`SimulatedDevice`] hands out the three collaborators a session
//! context needs. They share a single [`DeviceProfile`] that may be edited
//! while the session runs, and they record every call in
//! [`DeviceCounters`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tether_core::BackendError;
use tether_core::config::NativeConfig;
use tether_core::contracts::{
    ApkAvailability, ApkInstallPoll, ApkProvider, ArRuntime, ArSession, ConfigureOutcome,
    FrameSnapshot, ImageDatabase, PermissionCallback, PermissionProvider, ResumeOutcome,
    TrackingState,
};

use crate::frame::{FrameConverter, RuntimeFrame, RuntimePose};

const FRAME_INTERVAL: Duration = Duration::from_nanos(33_333_333);
const STEP_PER_FRAME_M: f64 = 0.01;
const FIRST_SESSION_HANDLE: usize = 0x5e55_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPolicy {
    #[default]
    Grant,
    Deny,
    /// Hold the request until [`SimulatedDevice::resolve_permission`].
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default = "default_availability")]
    pub availability: ApkAvailability,
    /// Number of availability polls answered with `UnknownChecking` first.
    #[serde(default)]
    pub checking_polls: u32,
    /// Install poll results, consumed in order; the last one repeats.
    #[serde(default = "default_install")]
    pub install: Vec<ApkInstallPoll>,
    #[serde(default)]
    pub permission: PermissionPolicy,
    #[serde(default = "default_configure")]
    pub configure: ConfigureOutcome,
    #[serde(default = "default_resume")]
    pub resume: ResumeOutcome,
    #[serde(default = "default_tracking")]
    pub tracking: TrackingState,
    #[serde(default)]
    pub fail_session_creation: bool,
    #[serde(default)]
    pub fail_pause: bool,
    #[serde(default)]
    pub fail_frame_update: bool,
    #[serde(default)]
    pub reject_image_database: bool,
}

fn default_availability() -> ApkAvailability {
    ApkAvailability::SupportedInstalled
}

fn default_install() -> Vec<ApkInstallPoll> {
    vec![ApkInstallPoll::Installed]
}

fn default_configure() -> ConfigureOutcome {
    ConfigureOutcome::Success
}

fn default_resume() -> ResumeOutcome {
    ResumeOutcome::Success
}

fn default_tracking() -> TrackingState {
    TrackingState::Tracking
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            availability: default_availability(),
            checking_polls: 0,
            install: default_install(),
            permission: PermissionPolicy::default(),
            configure: default_configure(),
            resume: default_resume(),
            tracking: default_tracking(),
            fail_session_creation: false,
            fail_pause: false,
            fail_frame_update: false,
            reject_image_database: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceCounters {
    pub permission_requests: u32,
    pub availability_checks: u32,
    pub install_polls: u32,
    pub sessions_created: u32,
    pub sessions_destroyed: u32,
    pub configures: u32,
    pub resumes: u32,
    pub pauses: u32,
    pub frame_updates: u32,
}

impl DeviceCounters {
    pub fn live_sessions(&self) -> u32 {
        self.sessions_created.saturating_sub(self.sessions_destroyed)
    }
}

struct DeviceState {
    profile: DeviceProfile,
    counters: DeviceCounters,
    pending_permission: Vec<PermissionCallback>,
    last_user_requested: Option<bool>,
    camera_texture_name: Option<u32>,
    last_config: Option<NativeConfig>,
}

#[derive(Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl SimulatedDevice {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                profile,
                counters: DeviceCounters::default(),
                pending_permission: Vec::new(),
                last_user_requested: None,
                camera_texture_name: None,
                last_config: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn permission(&self) -> SimulatedPermission {
        SimulatedPermission {
            device: self.clone(),
        }
    }

    pub fn apk(&self) -> SimulatedApk {
        SimulatedApk {
            device: self.clone(),
        }
    }

    pub fn runtime(&self) -> SimulatedRuntime {
        SimulatedRuntime {
            device: self.clone(),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.lock().profile.clone()
    }

    /// Edits the profile in place. Live sessions see the change on their
    /// next call.
    pub fn update_profile(&self, edit: impl FnOnce(&mut DeviceProfile)) {
        edit(&mut self.lock().profile);
    }

    pub fn counters(&self) -> DeviceCounters {
        self.lock().counters
    }

    pub fn pending_permission_requests(&self) -> usize {
        self.lock().pending_permission.len()
    }

    /// Answers every held permission prompt. Callbacks run after the device
    /// lock is released, on the calling thread.
    pub fn resolve_permission(&self, granted: bool) -> usize {
        let pending: Vec<_> = self.lock().pending_permission.drain(..).collect();
        let count = pending.len();
        debug!("Resolving {count} camera permission prompt(s): granted={granted}");
        for callback in pending {
            callback(granted);
        }
        count
    }

    pub fn last_user_requested(&self) -> Option<bool> {
        self.lock().last_user_requested
    }

    pub fn camera_texture_name(&self) -> Option<u32> {
        self.lock().camera_texture_name
    }

    pub fn last_config(&self) -> Option<NativeConfig> {
        self.lock().last_config.clone()
    }
}

pub struct SimulatedPermission {
    device: SimulatedDevice,
}

impl PermissionProvider for SimulatedPermission {
    fn request_camera_permission(&mut self, on_result: PermissionCallback) {
        let answer = {
            let mut state = self.device.lock();
            state.counters.permission_requests += 1;
            match state.profile.permission {
                PermissionPolicy::Grant => Some(true),
                PermissionPolicy::Deny => Some(false),
                PermissionPolicy::Prompt => {
                    state.pending_permission.push(on_result);
                    return;
                }
            }
        };
        if let Some(granted) = answer {
            on_result(granted);
        }
    }
}

pub struct SimulatedApk {
    device: SimulatedDevice,
}

impl ApkProvider for SimulatedApk {
    fn check_availability(&mut self) -> ApkAvailability {
        let mut state = self.device.lock();
        state.counters.availability_checks += 1;
        if state.profile.checking_polls > 0 {
            state.profile.checking_polls -= 1;
            return ApkAvailability::UnknownChecking;
        }
        state.profile.availability
    }

    fn request_install(&mut self, user_requested: bool) -> ApkInstallPoll {
        let mut state = self.device.lock();
        state.counters.install_polls += 1;
        state.last_user_requested = Some(user_requested);
        let install = &mut state.profile.install;
        match install.len() {
            0 => ApkInstallPoll::Installed,
            1 => install[0],
            _ => install.remove(0),
        }
    }
}

pub struct SimulatedRuntime {
    device: SimulatedDevice,
}

impl ArRuntime for SimulatedRuntime {
    fn create_session(&mut self) -> Result<Box<dyn ArSession>, BackendError> {
        let mut state = self.device.lock();
        if state.profile.fail_session_creation {
            return Err(BackendError::SessionCreation(
                "simulated runtime refused to create a session".to_string(),
            ));
        }
        state.counters.sessions_created += 1;
        let handle = FIRST_SESSION_HANDLE + state.counters.sessions_created as usize;
        debug!("Simulated session {handle:#x} created");
        Ok(Box::new(SimulatedSession {
            device: self.device.clone(),
            handle,
            frames: 0,
            converter: FrameConverter::new(),
        }))
    }
}

struct SimulatedSession {
    device: SimulatedDevice,
    handle: usize,
    frames: u32,
    converter: FrameConverter,
}

impl ArSession for SimulatedSession {
    fn configure(&mut self, config: &NativeConfig) -> ConfigureOutcome {
        let mut state = self.device.lock();
        state.counters.configures += 1;
        state.last_config = Some(config.clone());
        state.profile.configure
    }

    fn deserialize_image_database(&mut self, bytes: &[u8]) -> Result<ImageDatabase, BackendError> {
        if self.device.lock().profile.reject_image_database || bytes.is_empty() {
            return Err(BackendError::ImageDatabase(format!(
                "cannot deserialize {} byte image database",
                bytes.len()
            )));
        }
        Ok(ImageDatabase {
            native_handle: self.handle + 0x100,
            image_count: u32::from(bytes[0]),
        })
    }

    fn resume(&mut self) -> ResumeOutcome {
        let mut state = self.device.lock();
        state.counters.resumes += 1;
        state.profile.resume
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        let mut state = self.device.lock();
        state.counters.pauses += 1;
        if state.profile.fail_pause {
            return Err(BackendError::Pause("simulated pause failure".to_string()));
        }
        Ok(())
    }

    fn update(&mut self) -> Result<FrameSnapshot, BackendError> {
        let tracking_state = {
            let mut state = self.device.lock();
            state.counters.frame_updates += 1;
            if state.profile.fail_frame_update {
                return Err(BackendError::FrameUpdate(
                    "simulated camera stall".to_string(),
                ));
            }
            state.profile.tracking
        };

        self.frames += 1;
        let frame = RuntimeFrame {
            timestamp: FRAME_INTERVAL * self.frames,
            tracking_state,
            pose: RuntimePose {
                translation: [f64::from(self.frames) * STEP_PER_FRAME_M, 0.0, 0.0],
                ..RuntimePose::default()
            },
            native_handle: self.handle + 1,
        };
        Ok(self.converter.ingest_frame(frame))
    }

    fn set_camera_texture_name(&mut self, texture_name: u32) {
        self.device.lock().camera_texture_name = Some(texture_name);
    }

    fn native_handle(&self) -> usize {
        self.handle
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.device.lock().counters.sessions_destroyed += 1;
        debug!("Simulated session {:#x} destroyed", self.handle);
    }
}
