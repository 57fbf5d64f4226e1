use thiserror::Error;

/// Failures reported by runtime collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("session pause failed: {0}")]
    Pause(String),

    #[error("frame update failed: {0}")]
    FrameUpdate(String),

    #[error("image database could not be deserialized: {0}")]
    ImageDatabase(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
