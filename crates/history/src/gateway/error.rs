//! Failure taxonomy for gateway calls

/// Why a gateway call failed.
///
/// The controller treats every variant the same way (the fetch failed);
/// the cause is kept for display and logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Network unreachable: {message}")]
    NetworkUnreachable { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid draft: {message}")]
    InvalidDraft { message: String },
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        GatewayError::NetworkUnreachable {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        GatewayError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Whether a write may be sent again: the request never arrived, or the
    /// server failed while handling it. A timed-out write may already have
    /// landed, so it is not repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::NetworkUnreachable { .. } => true,
            GatewayError::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(!GatewayError::Timeout.is_retryable());
        assert!(GatewayError::network("refused").is_retryable());
        assert!(
            GatewayError::ServerError {
                status: 503,
                message: "busy".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::ServerError {
                status: 403,
                message: "forbidden".to_string()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::NotFound {
                resource: "history 1".to_string()
            }
            .is_retryable()
        );
        assert!(!GatewayError::malformed("eof").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = GatewayError::ServerError {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Server error (500): boom");
    }
}
