use thiserror::Error;

/// Failure talking to a remote HTTP API (storefront platform or production).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalApiError {
    #[error("rejected by remote API ({status}): {message}")]
    Client { status: u16, message: String },
    #[error("remote API server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("remote API timed out")]
    Timeout,
    #[error("remote API unreachable: {0}")]
    Transport(String),
}

impl ExternalApiError {
    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            ExternalApiError::Client { status, message }
        } else {
            ExternalApiError::Server { status, message }
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, ExternalApiError::Client { .. })
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("cannot {action} in current state ({state})")]
    StateTransition { action: &'static str, state: String },
    #[error(transparent)]
    ExternalApi(#[from] ExternalApiError),
    #[error("platform credentials rejected: {0}")]
    Authentication(String),
    #[error("event {0} already processed")]
    DuplicateEvent(String),
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Whether the delivering platform should see a failure and redeliver.
    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::Internal(_) => true,
            DomainError::ExternalApi(e) => e.is_transient(),
            _ => false,
        }
    }
}
