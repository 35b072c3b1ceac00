use serde_json::{Value, json};

use crate::util::api_request;

const TENANT_HEADER: &str = "x-tenant-id";

fn request_body(question: &str, prior_context: Option<&str>) -> Value {
    let mut body = json!({ "question": question });
    if let Some(context) = prior_context.map(str::trim).filter(|c| !c.is_empty()) {
        body["prior_context"] = json!(context);
    }
    body
}

pub async fn run(
    api_url: &str,
    tenant_id: &str,
    question: &str,
    prior_context: Option<&str>,
    raw: bool,
) -> i32 {
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/chat/query",
        Some(request_body(question, prior_context)),
        &[(TENANT_HEADER, tenant_id)],
        raw,
    )
    .await
}
