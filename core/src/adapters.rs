//! Seams to the external collaborators: the SQL generator, the record store
//! and the optional privileged execution channel.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GenerationError, StoreError};
use crate::model::{GeneratedStatement, Predicate, Question, Record};

/// Proposes SQL text for a question. Output is untrusted.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &Question) -> Result<GeneratedStatement, GenerationError>;
}

/// Structured access to the tenant's records. Predicates always arrive in
/// structured form; implementations bind values, never splice them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count(&self, table: &str, predicates: &[Predicate]) -> Result<u64, StoreError>;

    /// Rows of `table`. An empty `columns` slice selects every column.
    async fn select(
        &self,
        table: &str,
        columns: &[String],
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Record>, StoreError>;

    /// Values of a single column, for aggregates the store does not compute.
    async fn select_column(
        &self,
        table: &str,
        column: &str,
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Trusted facility that runs already-validated SELECT text directly.
#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    async fn execute_select(&self, sql_text: &str, tenant_id: &str)
    -> Result<Vec<Record>, StoreError>;
}
