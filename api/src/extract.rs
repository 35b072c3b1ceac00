//! Custom extractors that convert axum rejections to structured AppError responses.
//!
//! `AppJson<T>` replaces `axum::Json<T>` in handler signatures so that body
//! errors come back as a JSON `ApiError`. `TenantId` reads the tenant the
//! upstream gateway authenticated.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::request::Parts,
};

use crate::error::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";
const MAX_TENANT_ID_LEN: usize = 128;

/// JSON extractor that converts deserialization errors to structured `AppError` responses.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field = extract_field_from_serde_message(&body_text).unwrap_or_else(|| "body".to_string());

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field),
        docs_hint: Some(
            "Send {\"question\": \"...\", \"prior_context\": \"...\"} (see /api-doc/openapi.json)."
                .to_string(),
        ),
    }
}

/// Field name from serde's "missing field `x`" / "unknown field `x`" messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    ["missing field `", "unknown field `"].iter().find_map(|marker| {
        let after = &msg[msg.find(marker)? + marker.len()..];
        after.find('`').map(|end| after[..end].to_string())
    })
}

/// Tenant identifier taken from the `x-tenant-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        parse_tenant_id(raw).map(TenantId).ok_or_else(|| AppError::Validation {
            message: "Missing or invalid x-tenant-id header".to_string(),
            field: Some(TENANT_HEADER.to_string()),
            docs_hint: Some(
                "The gateway must forward the authenticated tenant as 'x-tenant-id: <id>'."
                    .to_string(),
            ),
        })
    }
}

fn parse_tenant_id(raw: &str) -> Option<String> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_TENANT_ID_LEN
        && raw.chars().all(|c| !c.is_control());
    valid.then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_missing_field_name() {
        let msg = "Failed to deserialize: missing field `question` at line 1 column 2";
        assert_eq!(extract_field_from_serde_message(msg), Some("question".to_string()));
    }

    #[test]
    fn extracts_unknown_field_name() {
        let msg = "unknown field `sql`, expected `question` or `prior_context`";
        assert_eq!(extract_field_from_serde_message(msg), Some("sql".to_string()));
    }

    #[test]
    fn returns_none_for_generic_error() {
        assert_eq!(extract_field_from_serde_message("invalid type: integer"), None);
    }

    #[test]
    fn tenant_ids_are_bounded() {
        assert_eq!(parse_tenant_id("t1"), Some("t1".to_string()));
        assert_eq!(parse_tenant_id(""), None);
        assert_eq!(parse_tenant_id("a\u{0}b"), None);
        assert_eq!(parse_tenant_id(&"x".repeat(MAX_TENANT_ID_LEN + 1)), None);
    }
}
