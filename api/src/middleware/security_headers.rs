use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// Chat answers carry tenant data, so nothing may be cached or framed.
const BASELINE: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("x-frame-options", "DENY"),
    ("content-security-policy", "frame-ancestors 'none'"),
    ("cache-control", "no-store"),
];

/// Apply the security-header baseline to all responses, keeping any value a
/// handler set explicitly.
pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in BASELINE {
        headers
            .entry(HeaderName::from_static(*name))
            .or_insert(HeaderValue::from_static(*value));
    }
    response
}
