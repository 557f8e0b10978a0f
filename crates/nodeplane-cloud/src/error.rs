//! Provisioning error types

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by [`RemoteCallGuard`](crate::guard::RemoteCallGuard)
#[derive(Error, Debug)]
pub enum RemoteCallError {
    #[error("[{label}] call to {endpoint} timed out after {budget:?}")]
    Timeout {
        label: String,
        endpoint: String,
        budget: Duration,
    },

    #[error("[{label}] node {endpoint} is unreachable: {cause}")]
    NodeUnreachable {
        label: String,
        endpoint: String,
        cause: String,
    },

    #[error("[{label}] transport failure talking to {endpoint}: {cause}")]
    TransportFailure {
        label: String,
        endpoint: String,
        cause: String,
    },

    #[error("[{label}] call to {endpoint} was cancelled")]
    Cancelled { label: String, endpoint: String },
}

/// Provisioning errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Remote(#[from] RemoteCallError),

    #[error("Provisioning failed on {endpoint}: {reason}")]
    ProvisioningFailed { endpoint: String, reason: String },

    #[error("Invalid provisioning result from {endpoint}: {message}")]
    InvalidProvisionResult { endpoint: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CloudError {
    /// Reason string of an endpoint-reported failure, if this is one
    pub fn provisioning_reason(&self) -> Option<&str> {
        match self {
            CloudError::ProvisioningFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
