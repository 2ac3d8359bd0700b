//! Error types for scyllactl.
//!
//! Every operation in the crate returns [`CtlError`] through the [`Result`] alias.
//! Errors that have to travel on the event stream are flattened into an
//! [`ErrorKind`] plus a rendered message, since the underlying causes
//! (`kube::Error` in particular) are neither `Clone` nor serializable.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for scyllactl operations.
pub type Result<T> = std::result::Result<T, CtlError>;

/// Kind of Kubernetes resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    ScyllaCluster,
    Service,
    Pod,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ScyllaCluster => write!(f, "ScyllaCluster"),
            ResourceKind::Service => write!(f, "Service"),
            ResourceKind::Pod => write!(f, "Pod"),
        }
    }
}

/// Main error type for scyllactl operations.
#[derive(Error, Debug)]
pub enum CtlError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("datacenter {requested} not found in cluster, expected {expected}")]
    InvalidDatacenter { requested: String, expected: String },

    #[error("ordinal {ordinal} out of range, datacenter has {capacity} members")]
    InvalidOrdinal { ordinal: i32, capacity: i64 },

    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("failed to execute command in pod {pod}: {message} (stderr: {stderr})")]
    Execution {
        pod: String,
        message: String,
        stderr: String,
    },

    #[error("failed to parse nodetool status output: {0}")]
    Parse(String),

    #[error("timeout after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("operation canceled: {0}")]
    Canceled(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CtlError {
    /// Shorthand for a missing resource.
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        CtlError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CtlError::NotFound { .. } => ErrorKind::ResourceNotFound,
            CtlError::InvalidDatacenter { .. } => ErrorKind::InvalidDatacenter,
            CtlError::InvalidOrdinal { .. } => ErrorKind::InvalidOrdinal,
            CtlError::PreconditionNotMet(_) => ErrorKind::PreconditionNotMet,
            CtlError::Execution { .. } => ErrorKind::ExecutionFailure,
            CtlError::Parse(_) => ErrorKind::ParseFailure,
            CtlError::Timeout { .. } => ErrorKind::Timeout,
            CtlError::Canceled(_) => ErrorKind::Canceled,
            CtlError::Kube(_) => ErrorKind::Api,
            CtlError::Config(_) => ErrorKind::Config,
            CtlError::Serialization(_) | CtlError::Yaml(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the caller's context was canceled or hit its deadline.
    pub fn is_canceled(&self) -> bool {
        matches!(self, CtlError::Canceled(_))
    }

    /// Check if error is retryable.
    ///
    /// Covers failed or garbled remote commands, throttling and server-side
    /// API errors, and connection-level failures talking to the API server.
    pub fn is_retryable(&self) -> bool {
        match self {
            CtlError::Execution { .. } | CtlError::Parse(_) => true,
            CtlError::Kube(kube::Error::Api(response)) => {
                response.code == 429 || response.code >= 500
            }
            CtlError::Kube(
                kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_),
            ) => true,
            _ => false,
        }
    }
}

/// Serializable classification of a [`CtlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResourceNotFound,
    InvalidDatacenter,
    InvalidOrdinal,
    PreconditionNotMet,
    ExecutionFailure,
    ParseFailure,
    Timeout,
    Canceled,
    Api,
    Config,
    Serialization,
}
