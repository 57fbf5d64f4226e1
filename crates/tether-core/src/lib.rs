//! Lifecycle core for bridging a mobile AR runtime into a host engine.
//!
//! The host drives a [`context::SharedSessionContext`] once per frame and on
//! activity pause/resume. Initialization (runtime install, then camera
//! permission) runs first; once it succeeds a session controller is built
//! lazily and reconciles the requested state against the live session.

pub mod availability;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod init;
pub mod permission;
pub mod session;
pub mod status;

#[cfg(test)]
mod test_support;

pub use config::{LifecycleConfig, SessionConfiguration};
pub use context::{SessionContext, SharedSessionContext};
pub use error::BackendError;
pub use status::SessionStatus;
