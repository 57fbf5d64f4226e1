//! Coalesced, poll-driven access to the AR runtime package checks.
//!
//! Callers enqueue requests at any time; the underlying provider is only
//! queried from [`RuntimeAvailabilityManager::update`], once per tick per
//! queue, until a definitive answer arrives. That answer resolves every
//! queued request in FIFO order.

use std::collections::VecDeque;
use std::mem;

use log::debug;

use crate::contracts::{ApkAvailability, ApkInstallPoll, ApkProvider};
use crate::status::InstallStatus;

pub type AvailabilityCallback = Box<dyn FnOnce(ApkAvailability) + Send + 'static>;
pub type InstallCallback = Box<dyn FnOnce(InstallStatus) + Send + 'static>;

pub struct RuntimeAvailabilityManager {
    provider: Box<dyn ApkProvider>,
    availability_requests: VecDeque<AvailabilityCallback>,
    install_requests: VecDeque<InstallCallback>,
    batch_user_requested: bool,
}

impl RuntimeAvailabilityManager {
    pub fn new(provider: Box<dyn ApkProvider>) -> Self {
        Self {
            provider,
            availability_requests: VecDeque::new(),
            install_requests: VecDeque::new(),
            batch_user_requested: false,
        }
    }

    pub fn check_availability_async(&mut self, on_result: AvailabilityCallback) {
        self.availability_requests.push_back(on_result);
    }

    /// The first request of a batch decides `user_requested` for the whole
    /// batch.
    pub fn request_install_async(&mut self, user_requested: bool, on_result: InstallCallback) {
        if self.install_requests.is_empty() {
            self.batch_user_requested = user_requested;
        }
        self.install_requests.push_back(on_result);
    }

    pub fn pending_availability_checks(&self) -> usize {
        self.availability_requests.len()
    }

    pub fn pending_install_requests(&self) -> usize {
        self.install_requests.len()
    }

    /// Polls the provider for each non-empty queue.
    pub fn update(&mut self) {
        self.poll_availability();
        self.poll_install();
    }

    fn poll_availability(&mut self) {
        if self.availability_requests.is_empty() {
            return;
        }

        let availability = self.provider.check_availability();
        if availability.is_pending() {
            return;
        }

        let waiting = mem::take(&mut self.availability_requests);
        debug!(
            "Runtime availability resolved to {:?} for {} request(s)",
            availability,
            waiting.len()
        );
        for callback in waiting {
            callback(availability);
        }
    }

    fn poll_install(&mut self) {
        if self.install_requests.is_empty() {
            return;
        }

        let status = match self.provider.request_install(self.batch_user_requested) {
            ApkInstallPoll::Pending => return,
            ApkInstallPoll::Installed => InstallStatus::Success,
            ApkInstallPoll::Failed(reason) => InstallStatus::from(reason),
        };

        let waiting = mem::take(&mut self.install_requests);
        debug!(
            "Runtime install resolved to {:?} for {} request(s)",
            status,
            waiting.len()
        );
        for callback in waiting {
            callback(status);
        }
    }
}
