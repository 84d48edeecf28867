use thiserror::Error;

/// Failure kinds a caller must be able to tell apart for correct messaging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The descriptor could not be fetched or parsed; nothing remote works until it resolves.
    #[error("API location unavailable: {0}")]
    DescriptorUnreachable(String),

    /// Transport failure or server-side outage (timeout, DNS, refused, 5xx). Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The response violated the expected shape.
    #[error("unexpected response: {0}")]
    Format(String),

    /// The server rejected a write. The message is shown to the user verbatim.
    #[error("{0}")]
    Validation(String),

    /// The backend has no such endpoint (404/405 on an optional write).
    #[error("not supported by this server: {0}")]
    Unsupported(String),
}

impl ClientError {
    /// Reads that fail this way leave an empty/error feed and retry on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DescriptorUnreachable(_) | Self::Network(_) | Self::Format(_)
        )
    }

    /// Whether the failure suggests the resolved endpoint may have moved.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network(format!("request timed out: {}", e))
        } else if e.is_connect() {
            Self::Network(format!("connection failed: {}", e))
        } else if e.is_decode() {
            Self::Format(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_verbatim() {
        let err = ClientError::Validation("Texto muito longo".into());
        assert_eq!(err.to_string(), "Texto muito longo");
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_network_suggests_endpoint_moved() {
        assert!(ClientError::Network("x".into()).is_connectivity());
        assert!(!ClientError::Format("x".into()).is_connectivity());
        assert!(ClientError::Format("x".into()).is_retryable());
        assert!(!ClientError::Unsupported("x".into()).is_retryable());
    }
}
