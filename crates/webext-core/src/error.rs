//! Error types for the extension delegation layer.

use thiserror::Error;

/// Errors returned to the engine when an event cannot be applied.
///
/// None of these are user-facing. Observers translate notifications into
/// whatever the host UI shows.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension not found: {0}")]
    NotFound(String),

    #[error("Extension already installed: {0}")]
    AlreadyInstalled(String),

    #[error("Update candidate id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: String, got: String },

    #[error("Installation of '{0}' was denied")]
    InstallDenied(String),

    #[error("Update of '{0}' was denied")]
    UpdateDenied(String),

    #[error("A permission request is already pending for '{0}'")]
    RequestPending(String),

    #[error("Too many pending permission requests (max: {0})")]
    TooManyPending(usize),

    #[error("'{permission}' is not declared as optional by '{extension}'")]
    UndeclaredPermission {
        extension: String,
        permission: String,
    },

    #[error("Extension subsystem is shutting down")]
    ShuttingDown,

    #[error("Tab delegate error: {0}")]
    Tab(String),
}

/// Result type for extension delegation operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;
