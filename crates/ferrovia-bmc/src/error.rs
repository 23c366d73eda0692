//! Error types for BMC operations

use thiserror::Error;

/// Error type for BMC operations
#[derive(Debug, Error)]
pub enum BmcError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The BMC answered with an error status
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The system is not in a state that accepts the operation
    #[error("system {system} cannot be modified: {reason}")]
    InvalidState { system: String, reason: String },

    /// The BMC returned a document we could not interpret
    #[error("unexpected response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A step of a multi-step operation failed
    #[error("{step} failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: Box<BmcError>,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl BmcError {
    /// Wrap this error with the name of the step that produced it
    pub fn during(self, step: &'static str) -> Self {
        BmcError::StepFailed {
            step,
            source: Box::new(self),
        }
    }

    /// Classify a transport error
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            BmcError::Timeout(url.to_string())
        } else if source.is_connect() {
            BmcError::ConnectionFailed(format!("{}: {}", url, source))
        } else {
            BmcError::Http {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Result type for BMC operations
pub type Result<T> = std::result::Result<T, BmcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BmcError::ConnectionFailed("host unreachable".to_string());
        assert_eq!(err.to_string(), "connection failed: host unreachable");

        let err = BmcError::AuthenticationFailed("bad credentials".to_string());
        assert_eq!(err.to_string(), "authentication failed: bad credentials");

        let err = BmcError::InvalidState {
            system: "1".to_string(),
            reason: "status is Starting".to_string(),
        };
        assert_eq!(err.to_string(), "system 1 cannot be modified: status is Starting");
    }

    #[test]
    fn test_step_failed_names_step() {
        let err = BmcError::Timeout("https://10.0.0.200:443".to_string()).during("set VLAN ID");
        assert!(err.to_string().starts_with("set VLAN ID failed: operation timed out"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
