use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::facebook::GraphError;
use crate::oauth::ExchangeError;
use crate::sync::SyncError;

/// HTTP-boundary error taxonomy. Module errors convert into this and map to
/// a status code plus a machine-readable `kind` for client-side branching.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    ProviderRejected { message: String, code: Option<i64> },
    #[error("Access token expired, reconnect your account")]
    TokenExpired,
    #[error("Rate limited, retry in {wait_minutes} minutes")]
    RateLimited {
        retry_after_secs: u64,
        wait_minutes: u64,
    },
    #[error("Unexpected provider response: {0}")]
    MalformedResponse(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ProviderRejected { .. } => StatusCode::BAD_REQUEST,
            ApiError::TokenExpired => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::ProviderRejected { .. } => "provider_rejected",
            ApiError::TokenExpired => "token_expired",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::MalformedResponse(_) => "malformed_response",
            ApiError::Timeout => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail, "internal error");
        }

        let mut body = json!({
            "error": {
                "message": self.to_string(),
                "kind": self.kind(),
            }
        });

        match &self {
            ApiError::TokenExpired => {
                body["expired"] = json!(true);
            }
            ApiError::RateLimited {
                retry_after_secs,
                wait_minutes,
            } => {
                body["retry_after_secs"] = json!(retry_after_secs);
                body["wait_minutes"] = json!(wait_minutes);
            }
            ApiError::ProviderRejected { code, .. } => {
                if let Some(code) = code {
                    body["error"]["code"] = json!(code);
                }
            }
            _ => {}
        }

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::RateLimited { wait_minutes, .. } => ApiError::RateLimited {
                retry_after_secs: wait_minutes * 60,
                wait_minutes,
            },
            GraphError::TokenExpired => ApiError::TokenExpired,
            GraphError::ProviderRejected { message, code } => {
                ApiError::ProviderRejected { message, code }
            }
            GraphError::MalformedResponse(detail) => ApiError::MalformedResponse(detail),
            GraphError::Timeout => ApiError::Timeout,
            GraphError::Transport(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<ExchangeError> for ApiError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::InvalidRequest(field) => {
                ApiError::InvalidRequest(format!("Missing required field: {}", field))
            }
            ExchangeError::InactiveAccount => ApiError::ProviderRejected {
                message: "Selected ad account is not active".to_string(),
                code: None,
            },
            ExchangeError::Graph(g) => g.into(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::InvalidRange => {
                ApiError::InvalidRequest("since must not be after until".to_string())
            }
            SyncError::Graph(g) => g.into(),
            SyncError::Database(d) => d.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiry_maps_to_401_not_provider_rejected() {
        let api: ApiError = GraphError::TokenExpired.into();
        assert!(matches!(&api, ApiError::TokenExpired));
        assert_eq!(api.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limit_maps_to_429_with_wait_hint() {
        let api: ApiError = GraphError::RateLimited {
            code: 4,
            wait_minutes: 30,
        }
        .into();
        match api {
            ApiError::RateLimited {
                retry_after_secs,
                wait_minutes,
            } => {
                assert_eq!(wait_minutes, 30);
                assert_eq!(retry_after_secs, 1800);
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn provider_rejection_maps_to_400() {
        let api: ApiError = GraphError::ProviderRejected {
            message: "Invalid verification code format".to_string(),
            code: Some(100),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(api.kind(), "provider_rejected");
    }
}
