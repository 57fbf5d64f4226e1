//! Scriptable collaborators shared by the unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use nalgebra::Isometry3;

use crate::config::NativeConfig;
use crate::contracts::{
    ApkAvailability, ApkInstallPoll, ApkProvider, ArRuntime, ArSession, ConfigureOutcome,
    FrameSnapshot, ImageDatabase, PermissionCallback, PermissionProvider, ResumeOutcome,
    TrackingState,
};
use crate::error::BackendError;

#[derive(Default)]
pub struct PermissionState {
    pub calls: u32,
    pub answer: Option<bool>,
    pub pending: Vec<PermissionCallback>,
}

#[derive(Clone, Default)]
pub struct MockPermission(pub Arc<Mutex<PermissionState>>);

impl MockPermission {
    pub fn granting() -> Self {
        let mock = Self::default();
        mock.state().answer = Some(true);
        mock
    }

    pub fn denying() -> Self {
        let mock = Self::default();
        mock.state().answer = Some(false);
        mock
    }

    /// Holds callbacks until [`MockPermission::resolve`].
    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, PermissionState> {
        self.0.lock().unwrap()
    }

    pub fn resolve(&self, granted: bool) {
        let pending: Vec<_> = self.state().pending.drain(..).collect();
        for callback in pending {
            callback(granted);
        }
    }
}

impl PermissionProvider for MockPermission {
    fn request_camera_permission(&mut self, on_result: PermissionCallback) {
        let answer = {
            let mut state = self.state();
            state.calls += 1;
            state.answer
        };
        match answer {
            Some(granted) => on_result(granted),
            None => self.state().pending.push(on_result),
        }
    }
}

pub struct ApkState {
    pub availability: ApkAvailability,
    pub install: Vec<ApkInstallPoll>,
    pub availability_calls: u32,
    pub install_calls: u32,
}

#[derive(Clone)]
pub struct MockApk(pub Arc<Mutex<ApkState>>);

impl MockApk {
    pub fn installed() -> Self {
        Self::with_install(vec![ApkInstallPoll::Installed])
    }

    pub fn with_install(install: Vec<ApkInstallPoll>) -> Self {
        Self(Arc::new(Mutex::new(ApkState {
            availability: ApkAvailability::SupportedInstalled,
            install,
            availability_calls: 0,
            install_calls: 0,
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, ApkState> {
        self.0.lock().unwrap()
    }
}

impl ApkProvider for MockApk {
    fn check_availability(&mut self) -> ApkAvailability {
        let mut state = self.state();
        state.availability_calls += 1;
        state.availability
    }

    fn request_install(&mut self, _user_requested: bool) -> ApkInstallPoll {
        let mut state = self.state();
        state.install_calls += 1;
        if state.install.len() > 1 {
            state.install.remove(0)
        } else {
            state.install[0]
        }
    }
}

pub struct RuntimeState {
    pub fail_create: bool,
    pub configure_outcome: ConfigureOutcome,
    pub resume_outcome: ResumeOutcome,
    pub fail_pause: bool,
    pub fail_database: bool,
    pub tracking: TrackingState,
    pub created: u32,
    pub destroyed: u32,
    pub configures: u32,
    pub resumes: u32,
    pub pauses: u32,
    pub updates: u32,
    pub texture_name: Option<u32>,
    pub last_config: Option<NativeConfig>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            fail_create: false,
            configure_outcome: ConfigureOutcome::Success,
            resume_outcome: ResumeOutcome::Success,
            fail_pause: false,
            fail_database: false,
            tracking: TrackingState::Tracking,
            created: 0,
            destroyed: 0,
            configures: 0,
            resumes: 0,
            pauses: 0,
            updates: 0,
            texture_name: None,
            last_config: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockRuntime(pub Arc<Mutex<RuntimeState>>);

impl MockRuntime {
    pub fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.0.lock().unwrap()
    }
}

impl ArRuntime for MockRuntime {
    fn create_session(&mut self) -> Result<Box<dyn ArSession>, BackendError> {
        let mut state = self.state();
        if state.fail_create {
            return Err(BackendError::SessionCreation("scripted failure".to_string()));
        }
        state.created += 1;
        Ok(Box::new(MockSession {
            runtime: self.0.clone(),
            handle: 0x1000 + state.created as usize,
            frames: 0,
        }))
    }
}

struct MockSession {
    runtime: Arc<Mutex<RuntimeState>>,
    handle: usize,
    frames: i64,
}

impl ArSession for MockSession {
    fn configure(&mut self, config: &NativeConfig) -> ConfigureOutcome {
        let mut state = self.runtime.lock().unwrap();
        state.configures += 1;
        state.last_config = Some(config.clone());
        state.configure_outcome
    }

    fn deserialize_image_database(&mut self, bytes: &[u8]) -> Result<ImageDatabase, BackendError> {
        if self.runtime.lock().unwrap().fail_database {
            return Err(BackendError::ImageDatabase("corrupt".to_string()));
        }
        Ok(ImageDatabase {
            native_handle: 0xd8,
            image_count: bytes.len() as u32,
        })
    }

    fn resume(&mut self) -> ResumeOutcome {
        let mut state = self.runtime.lock().unwrap();
        state.resumes += 1;
        state.resume_outcome
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        let mut state = self.runtime.lock().unwrap();
        state.pauses += 1;
        if state.fail_pause {
            Err(BackendError::Pause("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn update(&mut self) -> Result<FrameSnapshot, BackendError> {
        let mut state = self.runtime.lock().unwrap();
        state.updates += 1;
        self.frames += 1;
        Ok(FrameSnapshot {
            timestamp_ns: self.frames * 33_333_333,
            tracking_state: state.tracking,
            camera_pose: Isometry3::identity(),
            native_handle: self.handle + 1,
        })
    }

    fn set_camera_texture_name(&mut self, texture_name: u32) {
        self.runtime.lock().unwrap().texture_name = Some(texture_name);
    }

    fn native_handle(&self) -> usize {
        self.handle
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.runtime.lock() {
            state.destroyed += 1;
        }
    }
}
