use std::sync::Arc;

use cuota_core::QueryOrchestrator;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub engine: Arc<QueryOrchestrator>,
}
