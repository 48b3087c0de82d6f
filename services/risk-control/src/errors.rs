use crate::models::{Denial, PaymentRestrictedResponse};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskControlError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment restricted at level {}", .0.level)]
    Restricted(Denial),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} sweep is already running")]
    SweepInProgress(&'static str),

    #[error("Risk control store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Concurrent updates on risk record for user {0}")]
    Contention(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RiskControlError {
    fn code(&self) -> &'static str {
        match self {
            RiskControlError::Validation(_) => "VALIDATION_ERROR",
            RiskControlError::Restricted(denial) => denial.reason.payment_error_code(),
            RiskControlError::Unauthorized(_) => "UNAUTHORIZED",
            RiskControlError::Forbidden(_) => "FORBIDDEN",
            RiskControlError::NotFound(_) => "NOT_FOUND",
            RiskControlError::SweepInProgress(_) => "SWEEP_IN_PROGRESS",
            RiskControlError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            RiskControlError::Contention(_) => "CONTENTION",
            RiskControlError::Database(_) => "DATABASE_ERROR",
            RiskControlError::Configuration(_) => "CONFIGURATION_ERROR",
            RiskControlError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for RiskControlError {
    fn status_code(&self) -> StatusCode {
        match self {
            RiskControlError::Validation(_) => StatusCode::BAD_REQUEST,
            RiskControlError::Restricted(_) => StatusCode::FORBIDDEN,
            RiskControlError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RiskControlError::Forbidden(_) => StatusCode::FORBIDDEN,
            RiskControlError::NotFound(_) => StatusCode::NOT_FOUND,
            RiskControlError::SweepInProgress(_) => StatusCode::CONFLICT,
            RiskControlError::StoreUnavailable(_) | RiskControlError::Contention(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RiskControlError::Database(_)
            | RiskControlError::Configuration(_)
            | RiskControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            RiskControlError::Restricted(denial) => HttpResponse::Forbidden()
                .json(PaymentRestrictedResponse::from(denial)),
            _ => HttpResponse::build(self.status_code()).json(serde_json::json!({
                "error": self.code(),
                "message": self.to_string()
            })),
        }
    }
}

impl From<sqlx::Error> for RiskControlError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RiskControlError::StoreUnavailable(err.to_string())
            }
            other => RiskControlError::Database(other),
        }
    }
}

impl From<validator::ValidationErrors> for RiskControlError {
    fn from(err: validator::ValidationErrors) -> Self {
        RiskControlError::Validation(err.to_string())
    }
}

pub type RiskResult<T> = Result<T, RiskControlError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DenialReason;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_restricted_renders_payment_code() {
        let err = RiskControlError::Restricted(Denial {
            reason: DenialReason::RestrictedLevel3,
            level: 3,
            auto_release_at: None,
        });
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "restricted_level_3");
        assert_eq!(json["level"], 3);
        assert!(json.get("autoReleaseAt").is_none());
    }

    #[test]
    fn test_pool_timeout_is_store_unavailable() {
        let err = RiskControlError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RiskControlError::StoreUnavailable(_)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RiskControlError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RiskControlError::SweepInProgress("downgrade").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RiskControlError::Contention("u".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
