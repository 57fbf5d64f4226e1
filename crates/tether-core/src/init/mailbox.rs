use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::status::InstallStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitEvent {
    InstallFinished { attempt: u64, status: InstallStatus },
    PermissionResolved { attempt: u64, granted: bool },
}

pub type NotifyHook = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct MailboxInner {
    events: Mutex<VecDeque<InitEvent>>,
    notify: Mutex<Option<NotifyHook>>,
}

/// Inbox for asynchronous initialization results.
///
/// Posting never touches sequencer state directly. Events are applied by
/// whoever holds the sequencer, and the notify hook lets an owner pick them
/// up as soon as they land.
#[derive(Clone, Default)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

impl Mailbox {
    pub fn set_notify(&self, hook: Option<NotifyHook>) {
        *self
            .inner
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = hook;
    }

    pub(crate) fn post(&self, event: InitEvent) {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);

        let hook = self
            .inner
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn pop(&self) -> Option<InitEvent> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn post_queues_in_order_and_notifies() {
        let mailbox = Mailbox::default();
        let notified = Arc::new(AtomicU32::new(0));
        let counter = notified.clone();
        mailbox.set_notify(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        mailbox.post(InitEvent::InstallFinished {
            attempt: 1,
            status: InstallStatus::Success,
        });
        mailbox.post(InitEvent::PermissionResolved {
            attempt: 1,
            granted: true,
        });

        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert!(matches!(
            mailbox.pop(),
            Some(InitEvent::InstallFinished { .. })
        ));
        assert!(matches!(
            mailbox.pop(),
            Some(InitEvent::PermissionResolved { granted: true, .. })
        ));
        assert!(mailbox.is_empty());
    }
}
