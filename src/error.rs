//! Error types for the MCS networking provider

use thiserror::Error;

/// Main error type for provider operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid or incomplete cluster endpoint configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required service or export resource was absent
    #[error("not found: {0}")]
    NotFound(String),

    /// A requested logical port name was absent from a service's port list
    #[error("port not found: {0}")]
    PortNotFound(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a port-not-found error with the given message
    pub fn port_not_found(msg: impl Into<String>) -> Self {
        Self::PortNotFound(msg.into())
    }
}
