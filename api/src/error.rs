use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cuota_core::QueryError;
use cuota_core::error::{self, ApiError};

use crate::extract::TENANT_HEADER;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Malformed request: body, headers (400)
    Validation {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Failure inside the query engine; status depends on the variant
    Query(QueryError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Query(err) => query_status(err),
        }
    }
}

pub fn query_status(err: &QueryError) -> StatusCode {
    match err {
        QueryError::Validation(_) | QueryError::MissingTenant => StatusCode::BAD_REQUEST,
        QueryError::UnsafeStatement(_) | QueryError::Unparsable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        QueryError::RemoteQuery(_) | QueryError::Generation(_) => StatusCode::BAD_GATEWAY,
        QueryError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let status = self.status();

        let api_error = match self {
            AppError::Validation {
                message,
                field,
                docs_hint,
            } => ApiError {
                error: error::codes::VALIDATION_FAILED.to_string(),
                message,
                field,
                request_id,
                docs_hint,
            },
            AppError::Query(err) => {
                // Detail was already logged by the engine; only the template leaves.
                tracing::debug!(request_id = %request_id, code = err.code(), "Chat query rejected");
                ApiError {
                    error: err.code().to_string(),
                    message: err.user_message().to_string(),
                    field: query_error_field(&err).map(str::to_string),
                    request_id,
                    docs_hint: None,
                }
            }
        };

        (status, Json(api_error)).into_response()
    }
}

fn query_error_field(err: &QueryError) -> Option<&'static str> {
    match err {
        QueryError::Validation(_) => Some("question"),
        QueryError::MissingTenant => Some(TENANT_HEADER),
        _ => None,
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Query(err)
    }
}
