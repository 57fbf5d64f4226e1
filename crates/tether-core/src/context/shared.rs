use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

use crate::config::{BeforeApplyHook, SessionConfiguration};
use crate::contracts::{ApkAvailability, FrameSnapshot, TrackingState};
use crate::status::{InstallStatus, SessionStatus};

use super::SessionContext;

type Deferred = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    context: Mutex<SessionContext>,
    deferred: Mutex<VecDeque<Deferred>>,
    draining: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn defer(&self, job: Deferred) {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
    }

    fn pop_deferred(&self) -> Option<Deferred> {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Runs queued host callbacks in FIFO order. Only one caller drains at a
    /// time; a re-entrant or concurrent call leaves the work to that caller.
    fn run_deferred(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            while let Some(job) = self.pop_deferred() {
                job();
            }
            self.draining.store(false, Ordering::Release);

            let empty = self
                .deferred
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty();
            if empty {
                return;
            }
        }
    }
}

/// Thread-safe handle to a [`SessionContext`].
///
/// Every call runs under one lock. Asynchronous initialization results take
/// the same lock as soon as it is free, and host callbacks for availability
/// and install requests run after the lock is released so they may call back
/// into the session.
#[derive(Clone)]
pub struct SharedSessionContext {
    inner: Arc<Inner>,
}

impl SharedSessionContext {
    pub fn new(context: SessionContext) -> Self {
        let inner = Arc::new(Inner {
            context: Mutex::new(context),
            deferred: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.lock().mailbox().set_notify(Some(Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // A busy lock means its holder drains the mailbox before release.
            let applied = match inner.context.try_lock() {
                Ok(mut context) => {
                    context.reconcile();
                    true
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    poisoned.into_inner().reconcile();
                    true
                }
                Err(TryLockError::WouldBlock) => false,
            };
            if applied {
                inner.run_deferred();
            }
        })));

        Self { inner }
    }

    fn with<R>(&self, op: impl FnOnce(&mut SessionContext) -> R) -> R {
        let result = {
            let mut context = self.inner.lock();
            context.reconcile();
            let result = op(&mut context);
            context.reconcile();
            result
        };
        self.inner.run_deferred();
        result
    }

    pub fn initialize(&self) -> bool {
        self.with(SessionContext::initialize)
    }

    pub fn update(&self) {
        self.with(SessionContext::update)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with(|context| context.set_enabled(enabled))
    }

    pub fn handle_activity_pause(&self) {
        self.with(SessionContext::handle_activity_pause)
    }

    pub fn handle_activity_resume(&self) {
        self.with(SessionContext::handle_activity_resume)
    }

    pub fn set_configuration(&self, configuration: &SessionConfiguration) {
        self.with(|context| context.set_configuration(configuration))
    }

    pub fn set_before_apply_hook(&self, hook: Option<BeforeApplyHook>) {
        self.with(|context| context.set_before_apply_hook(hook))
    }

    pub fn set_camera_texture_name(&self, texture_name: u32) {
        self.with(|context| context.set_camera_texture_name(texture_name))
    }

    pub fn reset(&self) {
        self.with(SessionContext::reset)
    }

    pub fn status(&self) -> SessionStatus {
        self.with(|context| context.status())
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.with(|context| context.tracking_state())
    }

    pub fn frame(&self) -> Option<FrameSnapshot> {
        self.with(|context| context.frame().cloned())
    }

    pub fn native_session_handle(&self) -> Option<usize> {
        self.with(|context| context.native_session_handle())
    }

    pub fn is_configuration_supported(&self) -> bool {
        self.with(|context| context.is_configuration_supported())
    }

    pub fn check_apk_availability(
        &self,
        on_result: impl FnOnce(ApkAvailability) + Send + 'static,
    ) {
        let weak = Arc::downgrade(&self.inner);
        self.with(|context| {
            context.check_apk_availability(Box::new(move |availability| {
                if let Some(inner) = weak.upgrade() {
                    inner.defer(Box::new(move || on_result(availability)));
                }
            }))
        })
    }

    pub fn request_apk_installation(
        &self,
        user_requested: bool,
        on_result: impl FnOnce(InstallStatus) + Send + 'static,
    ) {
        let weak = Arc::downgrade(&self.inner);
        self.with(|context| {
            context.request_apk_installation(
                user_requested,
                Box::new(move |status| {
                    if let Some(inner) = weak.upgrade() {
                        inner.defer(Box::new(move || on_result(status)));
                    }
                }),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::test_support::{MockApk, MockPermission, MockRuntime};
    use std::thread;

    fn shared(permission: &MockPermission) -> SharedSessionContext {
        SharedSessionContext::new(SessionContext::new(
            LifecycleConfig::default(),
            Box::new(permission.clone()),
            Box::new(MockApk::installed()),
            Box::new(MockRuntime::default()),
        ))
    }

    #[test]
    fn permission_granted_from_another_thread_applies_immediately() {
        let permission = MockPermission::deferred();
        let session = shared(&permission);
        session.set_enabled(true);
        session.update();
        assert_eq!(session.status(), SessionStatus::RequestingPermission);

        let resolver = permission.clone();
        thread::spawn(move || resolver.resolve(true)).join().unwrap();

        assert_eq!(session.status(), SessionStatus::Paused);
    }

    #[test]
    fn availability_callbacks_may_reenter_the_session() {
        let permission = MockPermission::granting();
        let session = shared(&permission);

        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            let reentrant = session.clone();
            session.check_apk_availability(move |availability| {
                let status = reentrant.status();
                seen.lock().unwrap().push((availability, status));
            });
        }
        assert!(seen.lock().unwrap().is_empty());

        session.update();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen
            .iter()
            .all(|(availability, status)| *availability == ApkAvailability::SupportedInstalled
                && *status == SessionStatus::Uninitialized));
    }

    #[test]
    fn install_requests_resolve_through_update() {
        let permission = MockPermission::granting();
        let session = shared(&permission);

        let result = Arc::new(Mutex::new(None));
        let sink = result.clone();
        session.request_apk_installation(true, move |status| {
            *sink.lock().unwrap() = Some(status);
        });
        session.update();
        assert_eq!(*result.lock().unwrap(), Some(InstallStatus::Success));
    }

    #[test]
    fn handle_is_usable_across_threads() {
        let permission = MockPermission::granting();
        let session = shared(&permission);
        session.set_configuration(&SessionConfiguration::default());
        session.set_camera_texture_name(9);
        session.set_enabled(true);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        session.update();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(session.status(), SessionStatus::Resumed);
        assert!(session.frame().is_some());
    }
}
