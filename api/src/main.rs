use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use cuota_core::{EngineConfig, QueryOrchestrator};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod extract;
mod llm;
mod middleware;
mod privileged;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cuota Chat API",
        version = "0.1.0",
        description = "Natural-language questions over a tenant's contracts, installments and payments, answered in Spanish."
    ),
    paths(routes::health::health_check, routes::chat::query),
    components(schemas(
        HealthResponse,
        cuota_core::error::ApiError,
        routes::chat::ChatQueryRequest,
        routes::chat::ChatQueryResponse,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn build_engine(pool: &sqlx::PgPool, config: EngineConfig) -> QueryOrchestrator {
    let record_store = store::PgRecordStore::new(pool.clone(), config.tenant_column.clone());
    let privileged_channel = config.privileged_channel;

    let generator = match llm::LlmConfig::from_env() {
        Some(llm_config) => match llm::OpenAiSqlGenerator::new(llm_config, &config) {
            Ok(generator) => Some(generator),
            Err(err) => {
                tracing::error!(error = %err, "SQL generator could not be built");
                None
            }
        },
        None => {
            tracing::warn!(
                "{} is not set; chat queries will fail with a configuration error",
                llm::API_KEY_ENV
            );
            None
        }
    };

    let mut engine = QueryOrchestrator::new(config, Arc::new(record_store));
    if let Some(generator) = generator {
        engine = engine.with_generator(Arc::new(generator));
    }
    if privileged_channel {
        engine = engine.with_privileged_executor(Arc::new(privileged::PgPrivilegedExecutor::new(
            pool.clone(),
        )));
    }
    engine
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuota_api=debug,cuota_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let config = EngineConfig::from_env();
    tracing::info!(
        tenant_column = %config.tenant_column,
        default_limit = config.default_limit,
        max_limit = config.max_limit,
        privileged_channel = config.privileged_channel,
        debug_sql = config.debug_sql,
        "Query engine configured"
    );

    let app_state = state::AppState {
        engine: Arc::new(build_engine(&pool, config)),
        db: pool,
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::chat::router().layer(middleware::rate_limit::chat_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::security_headers::apply))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Cuota API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
