// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseError;
use crate::services::{TeardownStage, TenantError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.message(),
            "error_code": self.error_code()
        })
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Tenancy failures never leak database names or registry details to clients;
// the full error goes to the log instead.
impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::MissingIdentifier => {
                ApiError::bad_request("A store id, slug or domain is required")
            }
            // Unknown and suspended stores are indistinguishable from outside
            TenantError::NotFound(_) | TenantError::Inactive(_) => {
                ApiError::not_found("Store not found")
            }
            TenantError::InvalidTenantName(msg) => ApiError::bad_request(msg),
            TenantError::Conflict(field) => {
                ApiError::conflict(format!("A store with this {} already exists", field))
            }
            TenantError::Misconfigured { .. } => {
                tracing::error!("Tenant misconfiguration: {}", err);
                ApiError::internal_server_error("Store is misconfigured")
            }
            TenantError::ProvisioningFailed { .. } => {
                tracing::error!("{}", err);
                if err.is_retryable() {
                    ApiError::service_unavailable("Store could not be created, please try again later")
                } else {
                    ApiError::internal_server_error("Store could not be created")
                }
            }
            TenantError::TeardownFailed { stage, ref source, .. } => {
                tracing::error!("{}", err);
                match (stage, source) {
                    (TeardownStage::Drop, DatabaseError::Missing(_)) => {
                        ApiError::conflict("Store database is already gone")
                    }
                    (_, DatabaseError::InUse(_)) => {
                        ApiError::conflict("Store is still in use, please try again")
                    }
                    _ => ApiError::service_unavailable("Store could not be removed, please try again later"),
                }
            }
            TenantError::Connection { .. } | TenantError::Registry(_) | TenantError::Timeout { .. } => {
                tracing::error!("{}", err);
                ApiError::service_unavailable("Store temporarily unavailable")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
