use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::application::webhook_gateway::WebhookError;
use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let message = e.to_string();
        match e {
            DomainError::NotFound(_) => AppError::NotFound(message),
            DomainError::Validation(_) | DomainError::Unsupported(_) => {
                AppError::BadRequest(message)
            }
            DomainError::StateTransition { .. } | DomainError::DuplicateEvent(_) => {
                AppError::Conflict(message)
            }
            DomainError::Authentication(_) => AppError::Unauthorized(message),
            DomainError::ExternalApi(_) => AppError::BadGateway(message),
            DomainError::Internal(_) => AppError::Internal(message),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                AppError::Unauthorized(e.to_string())
            }
            // Anything retryable must reach the platform as a 5xx.
            WebhookError::Handler(DomainError::Authentication(msg)) => AppError::Unauthorized(msg),
            WebhookError::Handler(inner) => AppError::Internal(inner.to_string()),
        }
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(detail) => {
                log::error!("internal error: {detail}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ExternalApiError;
    use actix_web::ResponseError;

    fn status(e: DomainError) -> StatusCode {
        AppError::from(e).error_response().status()
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(status(DomainError::not_found("order X")), StatusCode::NOT_FOUND);
        assert_eq!(status(DomainError::validation("bad crop")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(DomainError::StateTransition {
                action: "submit",
                state: "cancelled".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(DomainError::Authentication("401".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(DomainError::ExternalApi(ExternalApiError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status(DomainError::Internal("db".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_display() {
        assert_eq!(
            AppError::from(DomainError::not_found("order X")).to_string(),
            "order X not found"
        );
    }

    #[test]
    fn internal_error_display() {
        assert_eq!(AppError::Internal("msg".to_string()).to_string(), "Internal error: msg");
    }

    #[test]
    fn webhook_failures_map_to_statuses() {
        let unsigned = AppError::from(WebhookError::MissingSignature);
        assert_eq!(unsigned.error_response().status(), StatusCode::UNAUTHORIZED);
        let retry = AppError::from(WebhookError::Handler(DomainError::Internal("db down".into())));
        assert_eq!(retry.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        let revoked = DomainError::Authentication("revoked".into());
        let reauth = AppError::from(WebhookError::Handler(revoked));
        assert_eq!(reauth.error_response().status(), StatusCode::UNAUTHORIZED);
    }
}
