//! Error types for the GSLB operator
//!
//! Errors fall into four handling classes: validation (never retried),
//! conflicts on the claimed service name (caller picks another name),
//! transient infrastructure failures (always requeued), and fatal startup
//! errors, which the binary reports through `anyhow` instead.

use std::time::Duration;

use thiserror::Error;

/// Main error type for GSLB operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a Gslb or GslbContent spec
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.backends[1].weight")
        field: Option<String>,
    },

    /// Service name already claimed by another Gslb
    #[error("'{service_name}' serviceName is already claimed. please try another serviceName")]
    Conflict {
        /// The contested service name
        service_name: String,
    },

    /// Registration sink (catalog or driver) failure
    #[error("backend error [{sink}]: {message}")]
    Backend {
        /// Sink that failed ("consul", "driver")
        sink: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// An external call did not complete within its deadline
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error pointing at a field path
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conflict error for a claimed service name
    pub fn conflict(service_name: impl Into<String>) -> Self {
        Self::Conflict {
            service_name: service_name.into(),
        }
    }

    /// Create a retryable backend error
    pub fn backend(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            sink: sink.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable backend error (the sink rejected the request itself)
    pub fn backend_permanent(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            sink: sink.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Validation, conflict and serialization errors need a spec change.
    /// Kubernetes 4xx responses are permanent except optimistic-concurrency
    /// conflicts (409) and throttling (429), which the loser retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::Conflict { .. } => false,
            Error::Backend { retryable, .. } => *retryable,
            Error::Timeout { .. } => true,
            Error::Serialization(_) => false,
            Error::Internal(_) => true,
        }
    }

    /// Whether this is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    /// Story: a user submits a Gslb with a malformed weight; the controller
    /// must not spin on it
    #[test]
    fn story_validation_errors_wait_for_spec_change() {
        let err = Error::validation_for_field("spec.backends[0].weight", "weight 'a1' is not an integer");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("a1"));
        assert!(!err.is_retryable());

        match err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.backends[0].weight"))
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn conflict_message_names_the_service() {
        let err = Error::conflict("checkout");
        assert_eq!(
            err.to_string(),
            "'checkout' serviceName is already claimed. please try another serviceName"
        );
        assert!(!err.is_retryable());
    }

    /// Story: the catalog is unreachable during a rollout; deregistration is
    /// retried until the catalog comes back
    #[test]
    fn story_transient_sink_failures_are_retried() {
        assert!(Error::backend("consul", "connection refused").is_retryable());
        assert!(Error::timeout("register", Duration::from_secs(15)).is_retryable());
        assert!(!Error::backend_permanent("driver", "invalid weight").is_retryable());
        assert_eq!(
            Error::timeout("register", Duration::from_secs(15)).to_string(),
            "register timed out after 15s"
        );
    }

    #[test]
    fn kube_errors_classified_by_status_code() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(api_error(409).is_retryable());
        assert!(api_error(429).is_retryable());
        assert!(!api_error(400).is_retryable());
        assert!(!api_error(422).is_retryable());
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_not_found());
    }
}
