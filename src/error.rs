// Error types for sysguard

use std::time::Duration;
use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Sysguard-specific error types
#[derive(Error, Debug)]
pub enum SysguardError {
    #[error("Failed to connect to systemd D-Bus: {0}")]
    SystemdConnection(String),

    #[error("Not connected to systemd D-Bus")]
    NotConnected,

    #[error("Failed to {operation} unit '{unit}': {message}")]
    UnitOperation {
        unit: String,
        operation: &'static str,
        message: String,
    },

    #[error("Unit '{unit}' did not become active within {timeout:?}")]
    Timeout { unit: String, timeout: Duration },

    #[error("Property '{property}' not found on unit '{unit}'")]
    PropertyNotFound { unit: String, property: String },

    #[error("Unit '{0}' does not exist")]
    ServiceNotExist(String),

    #[error("Invalid unit name '{unit}': {reason}")]
    InvalidUnitName { unit: String, reason: &'static str },

    #[error("{}", join_messages(.0))]
    Joined(Vec<anyhow::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SysguardError {
    /// Collapse collected sub-step failures: none is success, one is returned
    /// unchanged, several become `Joined`.
    pub fn join(mut errors: Vec<anyhow::Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SysguardError::Joined(errors).into()),
        }
    }
}

fn join_messages(errors: &[anyhow::Error]) -> String {
    errors
        .iter()
        .map(|e| format!("{:#}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Walk an error's context chain, descending into joined errors, and report
/// whether any link satisfies `pred`.
fn any_cause(err: &anyhow::Error, pred: &dyn Fn(&SysguardError) -> bool) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<SysguardError>() {
        Some(SysguardError::Joined(inner)) => inner.iter().any(|e| any_cause(e, pred)),
        Some(e) => pred(e),
        None => false,
    })
}

/// True if the error is, or contains, a start-confirmation timeout
pub fn is_timeout(err: &anyhow::Error) -> bool {
    any_cause(err, &|e| matches!(e, SysguardError::Timeout { .. }))
}

/// True if the error is, or contains, a missing unit property
pub fn is_property_not_found(err: &anyhow::Error) -> bool {
    any_cause(err, &|e| matches!(e, SysguardError::PropertyNotFound { .. }))
}

/// True if the error is, or contains, an unknown unit
pub fn is_service_not_exist(err: &anyhow::Error) -> bool {
    any_cause(err, &|e| matches!(e, SysguardError::ServiceNotExist(_)))
}
