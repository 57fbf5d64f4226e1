mod mailbox;

pub use mailbox::{Mailbox, NotifyHook};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::availability::RuntimeAvailabilityManager;
use crate::contracts::{ApkProvider, PermissionProvider};
use crate::permission::PermissionGate;
use crate::status::{InstallStatus, SessionStatus};
use mailbox::InitEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitializationStatus {
    Uninitialized,
    RequestingRuntimeInstall,
    RequestingPermission,
    Initialized,
    ErrorRuntimeNotAvailable,
    ErrorPermissionDenied,
}

impl InitializationStatus {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            InitializationStatus::ErrorRuntimeNotAvailable
                | InitializationStatus::ErrorPermissionDenied
        )
    }
}

impl From<InitializationStatus> for SessionStatus {
    fn from(value: InitializationStatus) -> Self {
        match value {
            InitializationStatus::Uninitialized => SessionStatus::Uninitialized,
            InitializationStatus::RequestingRuntimeInstall => {
                SessionStatus::RequestingRuntimeInstall
            }
            InitializationStatus::RequestingPermission => SessionStatus::RequestingPermission,
            // Ready to build a session, which starts out paused.
            InitializationStatus::Initialized => SessionStatus::Paused,
            InitializationStatus::ErrorRuntimeNotAvailable => {
                SessionStatus::ErrorRuntimeNotAvailable
            }
            InitializationStatus::ErrorPermissionDenied => SessionStatus::ErrorPermissionDenied,
        }
    }
}

/// Drives runtime installation then camera permission, once per attempt.
///
/// Results from the collaborators are posted to a [`Mailbox`] and only
/// applied by [`InitializationSequencer::process_events`], so callbacks may
/// fire from any thread without racing the owner.
pub struct InitializationSequencer {
    status: InitializationStatus,
    availability: RuntimeAvailabilityManager,
    permission: PermissionGate,
    mailbox: Mailbox,
    attempt: u64,
    user_requested_install: bool,
}

impl InitializationSequencer {
    pub fn new(
        permission: Box<dyn PermissionProvider>,
        apk: Box<dyn ApkProvider>,
        user_requested_install: bool,
    ) -> Self {
        Self {
            status: InitializationStatus::Uninitialized,
            availability: RuntimeAvailabilityManager::new(apk),
            permission: PermissionGate::new(permission),
            mailbox: Mailbox::default(),
            attempt: 0,
            user_requested_install,
        }
    }

    pub fn status(&self) -> InitializationStatus {
        self.status
    }

    pub fn session_status(&self) -> SessionStatus {
        self.status.into()
    }

    pub fn is_completed_successfully(&self) -> bool {
        self.status == InitializationStatus::Initialized
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn availability_mut(&mut self) -> &mut RuntimeAvailabilityManager {
        &mut self.availability
    }

    /// Starts an attempt. Only valid from `Uninitialized`.
    pub fn initialize(&mut self) -> bool {
        if self.status != InitializationStatus::Uninitialized {
            error!(
                "Initialize called while already {:?}; ignoring",
                self.status
            );
            return false;
        }

        self.attempt += 1;
        self.transition(InitializationStatus::RequestingRuntimeInstall);

        let mailbox = self.mailbox.clone();
        let attempt = self.attempt;
        self.availability.request_install_async(
            self.user_requested_install,
            Box::new(move |status| mailbox.post(InitEvent::InstallFinished { attempt, status })),
        );
        true
    }

    /// Polls the runtime checks and applies whatever results have arrived.
    pub fn update(&mut self) {
        self.availability.update();
        self.process_events();
    }

    pub fn process_events(&mut self) {
        while let Some(event) = self.mailbox.pop() {
            match event {
                InitEvent::InstallFinished { attempt, status } => {
                    if self.is_current(attempt) {
                        self.on_install_finished(status);
                    }
                }
                InitEvent::PermissionResolved { attempt, granted } => {
                    if self.is_current(attempt) {
                        self.on_permission_resolved(granted);
                    }
                }
            }
        }
    }

    /// Returns to `Uninitialized` so a later `initialize` starts over.
    /// Results still in flight for the abandoned attempt are dropped.
    pub fn reset(&mut self) {
        if self.status != InitializationStatus::Uninitialized {
            self.transition(InitializationStatus::Uninitialized);
        }
        self.permission.reset();
        self.attempt += 1;
    }

    fn is_current(&self, attempt: u64) -> bool {
        if attempt != self.attempt {
            debug!("Dropping initialization result from stale attempt {attempt}");
            return false;
        }
        true
    }

    fn on_install_finished(&mut self, status: InstallStatus) {
        if self.status != InitializationStatus::RequestingRuntimeInstall {
            error!(
                "Unexpected runtime install result {:?} while {:?}",
                status, self.status
            );
            return;
        }

        if !status.is_success() {
            warn!("AR runtime install failed: {status:?}");
            self.transition(InitializationStatus::ErrorRuntimeNotAvailable);
            return;
        }

        self.transition(InitializationStatus::RequestingPermission);
        let mailbox = self.mailbox.clone();
        let attempt = self.attempt;
        self.permission.request(Box::new(move |granted| {
            mailbox.post(InitEvent::PermissionResolved { attempt, granted })
        }));
    }

    fn on_permission_resolved(&mut self, granted: bool) {
        if self.status != InitializationStatus::RequestingPermission {
            error!(
                "Unexpected camera permission result (granted={granted}) while {:?}",
                self.status
            );
            return;
        }

        if granted {
            info!("AR session initialization complete");
            self.transition(InitializationStatus::Initialized);
        } else {
            warn!("Camera permission denied");
            self.transition(InitializationStatus::ErrorPermissionDenied);
        }
    }

    fn transition(&mut self, next: InitializationStatus) {
        debug!("Initialization {:?} -> {:?}", self.status, next);
        self.status = next;
    }
}
