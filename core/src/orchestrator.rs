use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::adapters::{PrivilegedExecutor, RecordStore, SqlGenerator};
use crate::compose::compose_answer;
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::model::{ChatAnswer, Question, QueryResult, TenantScope};
use crate::present::Redaction;
use crate::restricted::RestrictedExecutor;
use crate::validator::{SafeSql, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Generating,
    Validating,
    Executing,
    Composing,
    Done,
    Errored,
}

impl QueryState {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryState::Received => "received",
            QueryState::Generating => "generating",
            QueryState::Validating => "validating",
            QueryState::Executing => "executing",
            QueryState::Composing => "composing",
            QueryState::Done => "done",
            QueryState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request logging context.
struct Trace<'a> {
    request_id: Uuid,
    tenant_id: &'a str,
}

impl Trace<'_> {
    fn enter(&self, state: QueryState) {
        tracing::debug!(
            request_id = %self.request_id,
            tenant_id = %self.tenant_id,
            state = %state,
            "Query state transition"
        );
    }
}

/// Question in, answer out: generate → validate → execute → compose.
///
/// Holds only immutable configuration and shared adapters, so one instance
/// serves every tenant concurrently.
pub struct QueryOrchestrator {
    config: EngineConfig,
    redaction: Redaction,
    store: Arc<dyn RecordStore>,
    generator: Option<Arc<dyn SqlGenerator>>,
    privileged: Option<Arc<dyn PrivilegedExecutor>>,
}

impl QueryOrchestrator {
    pub fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            redaction: Redaction::standard(&config.tenant_column),
            config,
            store,
            generator: None,
            privileged: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_privileged_executor(mut self, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        self.privileged = Some(executor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&self, question: &Question) -> Result<ChatAnswer, QueryError> {
        let trace = Trace {
            request_id: Uuid::now_v7(),
            tenant_id: &question.tenant_id,
        };
        trace.enter(QueryState::Received);

        let outcome = self.answer(question, &trace).await;
        match &outcome {
            Ok(_) => trace.enter(QueryState::Done),
            Err(err) => {
                tracing::warn!(
                    request_id = %trace.request_id,
                    tenant_id = %trace.tenant_id,
                    state = %QueryState::Errored,
                    code = err.code(),
                    error = %err,
                    "Chat query failed"
                );
            }
        }
        outcome
    }

    async fn answer(&self, question: &Question, trace: &Trace<'_>) -> Result<ChatAnswer, QueryError> {
        let text = question.text.trim();
        if text.is_empty() {
            return Err(QueryError::Validation("question is empty".to_string()));
        }
        if question.tenant_id.trim().is_empty() {
            return Err(QueryError::MissingTenant);
        }
        let scope = TenantScope::new(self.config.tenant_column.clone(), question.tenant_id.trim());

        trace.enter(QueryState::Generating);
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| QueryError::Configuration("no SQL generator configured".to_string()))?;
        let statement = generator.generate(question).await?;

        trace.enter(QueryState::Validating);
        let safe = validate(&statement.sql_text, &scope).inspect_err(|err| {
            tracing::warn!(
                request_id = %trace.request_id,
                tenant_id = %trace.tenant_id,
                sql = %statement.sql_text,
                error = %err,
                "Generated SQL rejected"
            );
        })?;
        if safe.tenant_injected {
            tracing::debug!(
                request_id = %trace.request_id,
                tenant_id = %trace.tenant_id,
                "Tenant predicate injected into generated SQL"
            );
        }

        trace.enter(QueryState::Executing);
        let result = self.execute(&safe, &scope, trace).await?;

        trace.enter(QueryState::Composing);
        let answer_text = compose_answer(text, &result, &self.redaction);
        let rows = (!safe.aggregate.is_aggregate()).then(|| {
            result
                .rows
                .iter()
                .map(|row| self.redaction.strip(row))
                .collect()
        });

        Ok(ChatAnswer {
            answer_text,
            rows,
            generated_sql: self.config.debug_sql.then(|| safe.sql.clone()),
        })
    }

    /// Privileged channel first, restricted interpreter on any failure.
    /// Both paths only see statements the restricted grammar accepts for an
    /// allowed table.
    async fn execute(
        &self,
        safe: &SafeSql,
        scope: &TenantScope,
        trace: &Trace<'_>,
    ) -> Result<QueryResult, QueryError> {
        let executor = RestrictedExecutor::new(self.store.as_ref(), &self.config);
        let scoped = executor.prepare(&safe.sql, scope).inspect_err(|err| {
            tracing::warn!(
                request_id = %trace.request_id,
                tenant_id = %trace.tenant_id,
                sql = %safe.sql,
                error = %err,
                "Validated SQL is outside the restricted grammar"
            );
        })?;

        if let Some(channel) = &self.privileged {
            let limit = self.config.effective_limit(scoped.statement().limit);
            let channel_sql = bounded_sql(safe, limit);
            let call = channel.execute_select(&channel_sql, &scope.tenant_id);
            match tokio::time::timeout(self.config.privileged_timeout, call).await {
                Ok(Ok(rows)) => {
                    let mut result = QueryResult::from_channel_rows(rows, &safe.aggregate);
                    result.rows.truncate(limit as usize);
                    return Ok(result);
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        request_id = %trace.request_id,
                        tenant_id = %trace.tenant_id,
                        error = %err,
                        "Privileged channel failed, falling back to restricted interpreter"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %trace.request_id,
                        tenant_id = %trace.tenant_id,
                        timeout_ms = self.config.privileged_timeout.as_millis() as u64,
                        "Privileged channel timed out, falling back to restricted interpreter"
                    );
                }
            }
        }

        executor.run(&scoped).await.inspect_err(|err| {
            tracing::warn!(
                request_id = %trace.request_id,
                tenant_id = %trace.tenant_id,
                sql = %safe.sql,
                error = %err,
                "Restricted execution failed"
            );
        })
    }
}

/// Listings go to the channel wrapped in the effective row limit; aggregates
/// return a single row and go as they are.
fn bounded_sql(safe: &SafeSql, limit: u64) -> String {
    if safe.aggregate.is_aggregate() {
        safe.sql.clone()
    } else {
        format!("SELECT * FROM ({}) AS bounded LIMIT {limit}", safe.sql)
    }
}
