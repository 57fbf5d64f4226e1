mod shared;

pub use shared::SharedSessionContext;

use log::{debug, info};

use crate::availability::{AvailabilityCallback, InstallCallback};
use crate::config::{BeforeApplyHook, LifecycleConfig, SessionConfiguration};
use crate::contracts::{ApkProvider, ArRuntime, FrameSnapshot, PermissionProvider, TrackingState};
use crate::init::{InitializationSequencer, InitializationStatus, Mailbox};
use crate::session::SessionLifecycleController;
use crate::status::SessionStatus;

/// Top-level lifecycle state: one initialization sequencer for the lifetime
/// of the context and a lazily built session controller.
///
/// Host intents are recorded here so they survive the lazy construction of
/// the controller and its destruction on [`SessionContext::reset`].
pub struct SessionContext {
    config: LifecycleConfig,
    sequencer: InitializationSequencer,
    runtime: Box<dyn ArRuntime>,
    controller: Option<SessionLifecycleController>,
    before_apply: Option<BeforeApplyHook>,
    enabled: bool,
    activity_paused: bool,
    configuration: Option<SessionConfiguration>,
    camera_texture_name: Option<u32>,
}

impl SessionContext {
    pub fn new(
        config: LifecycleConfig,
        permission: Box<dyn PermissionProvider>,
        apk: Box<dyn ApkProvider>,
        runtime: Box<dyn ArRuntime>,
    ) -> Self {
        let sequencer =
            InitializationSequencer::new(permission, apk, config.user_requested_install);
        Self {
            config,
            sequencer,
            runtime,
            controller: None,
            before_apply: None,
            enabled: false,
            activity_paused: false,
            configuration: None,
            camera_texture_name: None,
        }
    }

    pub fn lifecycle_config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn initialization_status(&self) -> InitializationStatus {
        self.sequencer.status()
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        self.sequencer.mailbox()
    }

    pub fn has_controller(&self) -> bool {
        self.controller.is_some()
    }

    pub fn initialize(&mut self) -> bool {
        let started = self.sequencer.initialize();
        self.reconcile();
        started
    }

    /// Per-frame tick: polls the runtime checks, applies asynchronous
    /// results, then advances the live session.
    pub fn update(&mut self) {
        self.sequencer.update();
        self.reconcile();
        if let Some(controller) = self.controller.as_mut() {
            controller.update();
        }
        self.reconcile();
    }

    /// Disabling while initialization has failed, or enabling after a
    /// failure that arrived while disabled, clears the failure so the next
    /// enable starts a fresh attempt. Disabling never cancels an attempt
    /// that is still in flight.
    pub fn set_enabled(&mut self, enabled: bool) {
        let was_enabled = self.enabled;
        self.enabled = enabled;
        if self.sequencer.status().is_error() && (!enabled || !was_enabled) {
            debug!(
                "Clearing {:?} on set_enabled({enabled}); allowing a fresh initialization",
                self.sequencer.status()
            );
            self.sequencer.reset();
        }
        if let Some(controller) = self.controller.as_mut() {
            controller.set_enabled(enabled);
        }
        self.reconcile();
    }

    pub fn handle_activity_pause(&mut self) {
        self.activity_paused = true;
        if let Some(controller) = self.controller.as_mut() {
            controller.handle_activity_pause();
        }
        self.reconcile();
    }

    pub fn handle_activity_resume(&mut self) {
        self.activity_paused = false;
        if let Some(controller) = self.controller.as_mut() {
            controller.handle_activity_resume();
        }
        self.reconcile();
    }

    pub fn set_configuration(&mut self, configuration: &SessionConfiguration) {
        self.configuration = Some(configuration.clone());
        if let Some(controller) = self.controller.as_mut() {
            controller.set_configuration(configuration);
        }
        self.reconcile();
    }

    /// Takes effect on the next configuration commit.
    pub fn set_before_apply_hook(&mut self, hook: Option<BeforeApplyHook>) {
        self.before_apply = hook.clone();
        if let Some(controller) = self.controller.as_mut() {
            controller.set_before_apply_hook(hook);
        }
    }

    pub fn set_camera_texture_name(&mut self, texture_name: u32) {
        self.camera_texture_name = Some(texture_name);
        if let Some(controller) = self.controller.as_mut() {
            controller.set_camera_texture_name(texture_name);
        }
        self.reconcile();
    }

    /// Destroys the live session. Initialization is kept; a new controller
    /// is built on the next enable.
    pub fn reset(&mut self) {
        if self.controller.take().is_some() {
            info!("AR session reset");
        }
        self.enabled = false;
        self.reconcile();
    }

    pub fn check_apk_availability(&mut self, on_result: AvailabilityCallback) {
        self.sequencer
            .availability_mut()
            .check_availability_async(on_result);
    }

    pub fn request_apk_installation(&mut self, user_requested: bool, on_result: InstallCallback) {
        self.sequencer
            .availability_mut()
            .request_install_async(user_requested, on_result);
    }

    pub fn status(&self) -> SessionStatus {
        if !self.sequencer.is_completed_successfully() {
            return self.sequencer.session_status();
        }
        self.controller
            .as_ref()
            .map(SessionLifecycleController::status)
            .unwrap_or(SessionStatus::Paused)
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.controller
            .as_ref()
            .map(SessionLifecycleController::tracking_state)
            .unwrap_or(TrackingState::Unknown)
    }

    pub fn frame(&self) -> Option<&FrameSnapshot> {
        self.controller.as_ref().and_then(|c| c.frame())
    }

    pub fn native_session_handle(&self) -> Option<usize> {
        self.controller
            .as_ref()
            .and_then(SessionLifecycleController::native_session_handle)
    }

    pub fn is_configuration_supported(&self) -> bool {
        self.controller
            .as_ref()
            .map(SessionLifecycleController::is_configuration_supported)
            .unwrap_or(true)
    }

    /// Applies pending asynchronous results and the cross-component rules.
    /// Safe to call at any time; repeated calls converge.
    pub fn reconcile(&mut self) {
        self.sequencer.process_events();

        if self.enabled
            && self.config.auto_initialize
            && self.sequencer.status() == InitializationStatus::Uninitialized
        {
            self.sequencer.initialize();
            self.sequencer.process_events();
        }

        self.ensure_controller();

        let released = self
            .controller
            .as_ref()
            .is_some_and(|c| c.status() == SessionStatus::Uninitialized);
        if released {
            info!("AR session released; initialization will run again on next enable");
            self.controller = None;
            self.sequencer.reset();
        }
    }

    fn ensure_controller(&mut self) {
        if !self.enabled
            || self.controller.is_some()
            || !self.sequencer.is_completed_successfully()
        {
            return;
        }

        debug!("Creating AR session controller");
        let mut controller =
            SessionLifecycleController::new(self.runtime.as_mut(), self.before_apply.clone());
        if self.activity_paused {
            controller.handle_activity_pause();
        }
        if let Some(configuration) = self.configuration.as_ref() {
            controller.set_configuration(configuration);
        }
        if let Some(texture_name) = self.camera_texture_name {
            controller.set_camera_texture_name(texture_name);
        }
        controller.set_enabled(self.enabled);
        self.controller = Some(controller);
    }
}
