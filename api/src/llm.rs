//! SQL generation through an OpenAI-compatible chat-completions endpoint.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use cuota_core::EngineConfig;
use cuota_core::adapters::SqlGenerator;
use cuota_core::error::GenerationError;
use cuota_core::model::{GeneratedStatement, Question};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

pub const API_KEY_ENV: &str = "CUOTA_LLM_API_KEY";
pub const BASE_URL_ENV: &str = "CUOTA_LLM_BASE_URL";
pub const MODEL_ENV: &str = "CUOTA_LLM_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid code fence regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl LlmConfig {
    /// `None` when no API key is configured; the engine then answers every
    /// question with a configuration error.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Some(Self {
            api_key: non_empty(API_KEY_ENV)?,
            base_url: non_empty(BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: non_empty(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

pub struct OpenAiSqlGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    system_prompt: String,
}

impl OpenAiSqlGenerator {
    pub fn new(config: LlmConfig, engine: &EngineConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GenerationError::NotConfigured(err.to_string()))?;

        Ok(Self {
            client,
            config,
            system_prompt: system_prompt(engine),
        })
    }
}

fn system_prompt(engine: &EngineConfig) -> String {
    let tables = if engine.allowed_tables.is_empty() {
        "any table of the schema".to_string()
    } else {
        engine.allowed_tables.join(", ")
    };

    format!(
        "You translate questions about loan contracts, installments and payments into one \
         PostgreSQL SELECT statement.\n\
         Rules:\n\
         - Only SELECT. Never modify data.\n\
         - Query a single table, no JOIN, no subqueries, no UNION, no GROUP BY.\n\
         - Allowed tables: {tables}.\n\
         - Always filter by {column} = '<tenant id>' using the tenant id given by the user message.\n\
         - Use COUNT(*), SUM(column) or AVG(column) for totals; otherwise list columns explicitly.\n\
         - Add LIMIT {limit} when listing rows.\n\
         Reply with a JSON object {{\"sql\": \"...\", \"explanation\": \"...\"}} and nothing else.",
        column = engine.tenant_column,
        limit = engine.default_limit,
    )
}

fn user_prompt(question: &Question) -> String {
    let mut prompt = format!("Tenant id: {}\nQuestion: {}", question.tenant_id, question.text.trim());
    if let Some(context) = &question.prior_context {
        prompt.push_str("\nEarlier conversation:\n");
        prompt.push_str(context);
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct SqlReply {
    sql: String,
    #[serde(default)]
    explanation: String,
}

/// Accepts the JSON reply the prompt asks for, a fenced block, or bare SQL.
fn parse_reply(content: &str) -> Result<GeneratedStatement, GenerationError> {
    let unfenced = CODE_FENCE_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map_or(content, |body| body.as_str())
        .trim();

    if let Ok(reply) = serde_json::from_str::<SqlReply>(unfenced) {
        let sql = reply.sql.trim();
        if sql.is_empty() {
            return Err(GenerationError::InvalidResponse("empty sql field".to_string()));
        }
        return Ok(GeneratedStatement {
            sql_text: sql.to_string(),
            explanation: reply.explanation,
        });
    }

    if unfenced.is_empty() || unfenced.starts_with('{') {
        return Err(GenerationError::InvalidResponse(
            "reply carries no SQL statement".to_string(),
        ));
    }
    Ok(GeneratedStatement {
        sql_text: unfenced.to_string(),
        explanation: String::new(),
    })
}

#[async_trait]
impl SqlGenerator for OpenAiSqlGenerator {
    async fn generate(&self, question: &Question) -> Result<GeneratedStatement, GenerationError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": user_prompt(question)},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, model = %self.config.model, "SQL generation request failed");
            return Err(GenerationError::Upstream(format!("HTTP {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerationError::InvalidResponse("no message content".to_string()))?;

        parse_reply(content)
    }
}
