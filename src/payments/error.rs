use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures talking to the external transfer provider.
///
/// Kept distinct from validation and precondition errors so callers can
/// tell "nothing happened" apart from "external state may be ambiguous,
/// reconcile before retrying".
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transfer provider error: {message}")]
    Provider { message: String, is_retryable: bool },

    #[error("Rate limit exceeded. Please try again later")]
    RateLimit { retry_after: Option<u64> },

    #[error("Timeout error: operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Invalid provider response: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Gateway configuration error: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    pub fn provider(message: impl Into<String>, is_retryable: bool) -> Self {
        Self::Provider {
            message: message.into(),
            is_retryable,
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Provider { is_retryable, .. } => *is_retryable,
            GatewayError::RateLimit { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Transport { .. } => true,
            GatewayError::InvalidResponse { .. } | GatewayError::Configuration { .. } => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::timeout(0)
        } else {
            GatewayError::transport(format!("Request error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_rate_limit_are_retryable() {
        assert!(GatewayError::transport("connection reset").is_retryable());
        assert!(GatewayError::RateLimit { retry_after: None }.is_retryable());
        assert!(GatewayError::timeout(30).is_retryable());
    }

    #[test]
    fn provider_retryability_follows_flag() {
        assert!(GatewayError::provider("temporarily unavailable", true).is_retryable());
        assert!(!GatewayError::provider("transfer declined", false).is_retryable());
        assert!(!GatewayError::invalid_response("bad json").is_retryable());
    }
}
