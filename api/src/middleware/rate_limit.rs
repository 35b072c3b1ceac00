use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};
use cuota_core::error::{ApiError, codes};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, Body>;

/// Rate limit for POST /v1/chat/query: 30 requests per minute per IP, burst 10.
pub fn chat_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(2) // 30 per minute = 1 every 2 seconds replenish
            .burst_size(10)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for chat"),
    )
    .error_handler(json_error_handler)
}

/// Error handler that returns an `ApiError` body with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Demasiadas consultas. Intenta nuevamente en {wait_time} segundos."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let body = ApiError {
        error: codes::RATE_LIMITED.to_string(),
        message,
        field: None,
        request_id: uuid::Uuid::now_v7().to_string(),
        docs_hint: None,
    };
    let payload = serde_json::to_string(&body).unwrap_or_default();

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    if let Some(seconds) = retry_after {
        headers.insert("retry-after", HeaderValue::from(seconds));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn too_many_requests_returns_json_with_retry_after() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 4,
            headers: None,
        });

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get("retry-after")
                .expect("retry-after header should exist"),
            "4"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("body should be json");
        assert_eq!(body["error"], codes::RATE_LIMITED);
    }
}
