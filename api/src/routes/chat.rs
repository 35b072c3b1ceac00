use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use cuota_core::model::{ChatAnswer, Question, Record};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extract::{AppJson, TenantId};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/chat/query", post(query))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatQueryRequest {
    /// Question in natural language, e.g. "¿Cuántas cuotas están vencidas?"
    pub question: String,
    /// Earlier conversation turns the generator may use as context
    #[serde(default)]
    pub prior_context: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatQueryResponse {
    /// Answer in Spanish, ready to show to the asker
    pub answer_text: String,
    /// Matching rows with internal fields removed. Absent for aggregates.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub rows: Option<Vec<Record>>,
    /// SQL that was executed, only when CUOTA_DEBUG_SQL is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
}

impl From<ChatAnswer> for ChatQueryResponse {
    fn from(answer: ChatAnswer) -> Self {
        Self {
            answer_text: answer.answer_text,
            rows: answer.rows,
            generated_sql: answer.generated_sql,
        }
    }
}

/// Answer a natural-language question about the tenant's contracts and payments
#[utoipa::path(
    post,
    path = "/v1/chat/query",
    request_body = ChatQueryRequest,
    params(
        ("x-tenant-id" = String, Header, description = "Tenant authenticated by the gateway")
    ),
    responses(
        (status = 200, description = "Answer produced", body = ChatQueryResponse),
        (status = 400, description = "Empty question or missing tenant", body = cuota_core::error::ApiError),
        (status = 422, description = "Generated statement rejected", body = cuota_core::error::ApiError),
        (status = 429, description = "Rate limited", body = cuota_core::error::ApiError),
        (status = 502, description = "Upstream generation or data access failed", body = cuota_core::error::ApiError),
        (status = 500, description = "Engine misconfigured", body = cuota_core::error::ApiError)
    ),
    tag = "chat"
)]
pub async fn query(
    State(state): State<AppState>,
    tenant: TenantId,
    AppJson(req): AppJson<ChatQueryRequest>,
) -> Result<Json<ChatQueryResponse>, AppError> {
    let question = Question::new(req.question, tenant.0).with_prior_context(req.prior_context);
    let answer = state.engine.run(&question).await?;
    Ok(Json(answer.into()))
}
