//! Owner of the live AR session and its resume/pause reconciliation.
//!
//! Every external event stores an intent and re-runs [`SessionLifecycleController::reconcile`],
//! which is idempotent: running it again with no new input leaves the
//! status alone.

use log::{debug, warn};

use crate::config::{BeforeApplyHook, NativeConfig, SessionConfiguration};
use crate::contracts::{
    ArRuntime, ArSession, ConfigureOutcome, FrameSnapshot, ResumeOutcome, TrackingState,
};
use crate::status::SessionStatus;

/// Outcome of the most recent configuration commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigApplyResult {
    NotApplied,
    Success,
    Unsupported,
    Error,
}

impl ConfigApplyResult {
    pub fn is_failure(self) -> bool {
        matches!(self, ConfigApplyResult::Unsupported | ConfigApplyResult::Error)
    }
}

impl From<ConfigureOutcome> for ConfigApplyResult {
    fn from(value: ConfigureOutcome) -> Self {
        match value {
            ConfigureOutcome::Success => ConfigApplyResult::Success,
            ConfigureOutcome::Unsupported => ConfigApplyResult::Unsupported,
            ConfigureOutcome::Error => ConfigApplyResult::Error,
        }
    }
}

pub struct SessionLifecycleController {
    session: Option<Box<dyn ArSession>>,
    frame: Option<FrameSnapshot>,
    native_config: NativeConfig,
    configuration: Option<SessionConfiguration>,
    camera_texture_name: Option<u32>,
    before_apply: Option<BeforeApplyHook>,
    status: SessionStatus,
    session_enabled: bool,
    activity_paused: bool,
    apply_result: ConfigApplyResult,
}

impl SessionLifecycleController {
    /// Creates the underlying session. A runtime that refuses to create one
    /// leaves the controller in `ErrorFatal`.
    pub fn new(runtime: &mut dyn ArRuntime, before_apply: Option<BeforeApplyHook>) -> Self {
        let (session, status) = match runtime.create_session() {
            Ok(session) => (Some(session), SessionStatus::Paused),
            Err(err) => {
                warn!("Failed to create AR session: {err}");
                (None, SessionStatus::ErrorFatal)
            }
        };

        let mut controller = Self {
            session,
            frame: None,
            native_config: NativeConfig::default(),
            configuration: None,
            camera_texture_name: None,
            before_apply,
            status,
            session_enabled: false,
            activity_paused: false,
            apply_result: ConfigApplyResult::NotApplied,
        };
        controller.reconcile();
        controller
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn frame(&self) -> Option<&FrameSnapshot> {
        self.frame.as_ref()
    }

    pub fn native_session_handle(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.native_handle())
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn configuration(&self) -> Option<&SessionConfiguration> {
        self.configuration.as_ref()
    }

    pub fn native_config(&self) -> &NativeConfig {
        &self.native_config
    }

    pub fn apply_result(&self) -> ConfigApplyResult {
        self.apply_result
    }

    pub fn is_configuration_supported(&self) -> bool {
        !self.apply_result.is_failure()
    }

    pub fn tracking_state(&self) -> TrackingState {
        if self.session.is_none() {
            return TrackingState::Unknown;
        }
        if !self.status.is_resumed() {
            return TrackingState::NotTracking;
        }
        self.frame
            .as_ref()
            .map(|frame| frame.tracking_state)
            .unwrap_or(TrackingState::Unknown)
    }

    pub fn set_configuration(&mut self, configuration: &SessionConfiguration) {
        self.configuration = Some(configuration.clone());
        self.apply_configuration();
        self.reconcile();
    }

    pub fn set_before_apply_hook(&mut self, hook: Option<BeforeApplyHook>) {
        self.before_apply = hook;
    }

    pub fn set_camera_texture_name(&mut self, texture_name: u32) {
        self.camera_texture_name = Some(texture_name);
        if let Some(session) = self.session.as_mut() {
            session.set_camera_texture_name(texture_name);
        }
        self.reconcile();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.session_enabled = enabled;
        self.reconcile();
    }

    pub fn handle_activity_pause(&mut self) {
        self.activity_paused = true;
        self.reconcile();
    }

    pub fn handle_activity_resume(&mut self) {
        self.activity_paused = false;
        self.reconcile();
    }

    /// Reconciles, then advances the frame while resumed. A no-op for the
    /// session in every other status.
    pub fn update(&mut self) {
        self.reconcile();
        if !self.status.is_resumed() {
            return;
        }

        if let Some(session) = self.session.as_mut() {
            match session.update() {
                Ok(frame) => self.frame = Some(frame),
                Err(err) => {
                    warn!("AR session update failed: {err}");
                    self.frame = None;
                }
            }
        }
        self.refresh_tracking();
    }

    fn wants_resumed(&self) -> bool {
        self.session_enabled && !self.activity_paused
    }

    fn apply_configuration(&mut self) {
        let Some(configuration) = self.configuration.as_ref() else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut native = NativeConfig {
            update_mode: configuration.update_mode,
            plane_finding_mode: configuration.plane_finding_mode,
            light_estimation_mode: configuration.light_estimation_mode,
            cloud_anchor_mode: configuration.cloud_anchor_mode,
            image_database: None,
        };

        if let Some(bytes) = configuration.image_database.as_deref() {
            match session.deserialize_image_database(bytes) {
                Ok(database) => native.image_database = Some(database),
                Err(err) => warn!("Ignoring image database: {err}"),
            }
        }

        if let Some(hook) = self.before_apply.as_ref() {
            hook(&mut native);
        }

        self.apply_result = session.configure(&native).into();
        debug!("Configuration applied: {:?}", self.apply_result);
        self.native_config = native;
    }

    fn reconcile(&mut self) {
        if self.status == SessionStatus::ErrorPermissionDenied && !self.session_enabled {
            self.release_session();
            self.transition(SessionStatus::Uninitialized);
            return;
        }

        if self.status == SessionStatus::ErrorConfigurationUnsupported
            && self.apply_result == ConfigApplyResult::Success
        {
            self.transition(SessionStatus::Paused);
        }

        match self.status {
            SessionStatus::Paused if self.wants_resumed() => {
                if self.apply_result.is_failure() {
                    self.transition(SessionStatus::ErrorConfigurationUnsupported);
                } else if self.apply_result == ConfigApplyResult::Success
                    && self.camera_texture_name.is_some()
                {
                    self.resume_session();
                }
            }
            SessionStatus::Resumed | SessionStatus::ResumedNotTracking => {
                if !self.wants_resumed() {
                    self.pause_session(SessionStatus::Paused);
                } else if self.apply_result.is_failure() {
                    self.pause_session(SessionStatus::ErrorConfigurationUnsupported);
                }
            }
            _ => {}
        }

        self.refresh_tracking();
    }

    fn resume_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        self.frame = None;
        match session.resume() {
            ResumeOutcome::Success => self.transition(SessionStatus::Resumed),
            ResumeOutcome::PermissionDenied => {
                warn!("AR session resume refused: camera permission not granted");
                self.transition(SessionStatus::ErrorPermissionDenied);
            }
            ResumeOutcome::Error => {
                warn!("AR session resume failed");
                self.transition(SessionStatus::ErrorFatal);
            }
        }
    }

    fn pause_session(&mut self, on_success: SessionStatus) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        self.frame = None;
        match session.pause() {
            Ok(()) => self.transition(on_success),
            Err(err) => {
                warn!("AR session pause failed: {err}");
                self.transition(SessionStatus::ErrorFatal);
            }
        }
    }

    fn refresh_tracking(&mut self) {
        let Some(frame) = self.frame.as_ref() else {
            return;
        };

        match self.status {
            SessionStatus::Resumed if !frame.is_tracking() => {
                self.transition(SessionStatus::ResumedNotTracking)
            }
            SessionStatus::ResumedNotTracking if frame.is_tracking() => {
                self.transition(SessionStatus::Resumed)
            }
            _ => {}
        }
    }

    fn release_session(&mut self) {
        self.frame = None;
        self.session = None;
        self.apply_result = ConfigApplyResult::NotApplied;
    }

    fn transition(&mut self, next: SessionStatus) {
        if self.status != next {
            debug!("Session {} -> {}", self.status, next);
            self.status = next;
        }
    }
}

impl Drop for SessionLifecycleController {
    fn drop(&mut self) {
        if self.status.is_resumed() {
            if let Some(session) = self.session.as_mut() {
                if let Err(err) = session.pause() {
                    warn!("AR session pause during teardown failed: {err}");
                }
            }
        }
        self.release_session();
    }
}
