//! In-memory adapters for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::{PrivilegedExecutor, RecordStore, SqlGenerator};
use crate::error::{GenerationError, StoreError};
use crate::model::{GeneratedStatement, Predicate, Question, Record};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Count {
        table: String,
        predicates: Vec<Predicate>,
    },
    Select {
        table: String,
        columns: Vec<String>,
        predicates: Vec<Predicate>,
        limit: u64,
    },
    SelectColumn {
        table: String,
        column: String,
        predicates: Vec<Predicate>,
        limit: u64,
    },
}

/// Record store that answers from fixed data and records every call.
#[derive(Default)]
pub struct RecordingStore {
    count: u64,
    rows: Vec<Record>,
    column_values: Vec<Value>,
    fail: bool,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingStore {
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_column_values(mut self, values: Vec<Value>) -> Self {
        self.column_values = values;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls.lock().expect("calls lock").push(call);
        if self.fail {
            return Err(StoreError::Query("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn count(&self, table: &str, predicates: &[Predicate]) -> Result<u64, StoreError> {
        self.record(StoreCall::Count {
            table: table.to_string(),
            predicates: predicates.to_vec(),
        })?;
        Ok(self.count)
    }

    async fn select(
        &self,
        table: &str,
        columns: &[String],
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Record>, StoreError> {
        self.record(StoreCall::Select {
            table: table.to_string(),
            columns: columns.to_vec(),
            predicates: predicates.to_vec(),
            limit,
        })?;
        Ok(self.rows.iter().take(limit as usize).cloned().collect())
    }

    async fn select_column(
        &self,
        table: &str,
        column: &str,
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        self.record(StoreCall::SelectColumn {
            table: table.to_string(),
            column: column.to_string(),
            predicates: predicates.to_vec(),
            limit,
        })?;
        Ok(self.column_values.clone())
    }
}

/// Generator that always proposes the same SQL, or always fails.
pub struct ScriptedGenerator {
    sql: Option<String>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn returning(sql: &str) -> Self {
        Self {
            sql: Some(sql.to_string()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            sql: None,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().expect("asked lock").clone()
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate(&self, question: &Question) -> Result<GeneratedStatement, GenerationError> {
        self.asked
            .lock()
            .expect("asked lock")
            .push(question.text.clone());
        match &self.sql {
            Some(sql) => Ok(GeneratedStatement {
                sql_text: sql.clone(),
                explanation: "scripted".to_string(),
            }),
            None => Err(GenerationError::Upstream("HTTP 503".to_string())),
        }
    }
}

pub enum ChannelScript {
    Rows(Vec<Record>),
    Fail,
    Hang,
}

/// Privileged channel with a scripted outcome; records `(sql, tenant_id)`.
pub struct ScriptedChannel {
    script: ChannelScript,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedChannel {
    pub fn new(script: ChannelScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl PrivilegedExecutor for ScriptedChannel {
    async fn execute_select(
        &self,
        sql_text: &str,
        tenant_id: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((sql_text.to_string(), tenant_id.to_string()));
        match &self.script {
            ChannelScript::Rows(rows) => Ok(rows.clone()),
            ChannelScript::Fail => Err(StoreError::Query("permission denied".to_string())),
            ChannelScript::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}
