use log::{debug, error};

use crate::contracts::{PermissionCallback, PermissionProvider};

/// Forwards a single camera-permission request per initialization attempt.
pub struct PermissionGate {
    provider: Box<dyn PermissionProvider>,
    requested: bool,
}

impl PermissionGate {
    pub fn new(provider: Box<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            requested: false,
        }
    }

    /// Returns `false` without touching the provider if this attempt already
    /// issued its request.
    pub fn request(&mut self, on_result: PermissionCallback) -> bool {
        if self.requested {
            error!("Camera permission was already requested for this initialization attempt");
            return false;
        }

        self.requested = true;
        debug!("Requesting camera permission");
        self.provider.request_camera_permission(on_result);
        true
    }

    pub fn has_requested(&self) -> bool {
        self.requested
    }

    /// Arms the gate for a fresh initialization attempt.
    pub fn reset(&mut self) {
        self.requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CountingProvider {
        calls: Arc<Mutex<u32>>,
        grant: bool,
    }

    impl PermissionProvider for CountingProvider {
        fn request_camera_permission(&mut self, on_result: PermissionCallback) {
            *self.calls.lock().unwrap() += 1;
            on_result(self.grant);
        }
    }

    #[test]
    fn second_request_in_same_attempt_is_rejected() {
        let calls = Arc::new(Mutex::new(0));
        let mut gate = PermissionGate::new(Box::new(CountingProvider {
            calls: calls.clone(),
            grant: true,
        }));

        let granted = Arc::new(Mutex::new(Vec::new()));
        let sink = granted.clone();
        assert!(gate.request(Box::new(move |g| sink.lock().unwrap().push(g))));
        assert!(!gate.request(Box::new(|_| panic!("must not be invoked"))));

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(*granted.lock().unwrap(), vec![true]);
    }

    #[test]
    fn reset_allows_a_new_request() {
        let calls = Arc::new(Mutex::new(0));
        let mut gate = PermissionGate::new(Box::new(CountingProvider {
            calls: calls.clone(),
            grant: false,
        }));

        assert!(gate.request(Box::new(|_| {})));
        gate.reset();
        assert!(!gate.has_requested());
        assert!(gate.request(Box::new(|_| {})));
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
