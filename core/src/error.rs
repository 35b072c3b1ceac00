use serde::Serialize;
use utoipa::ToSchema;

use crate::restricted::parser::ParseError;

/// Structured error response returned to chat clients.
///
/// `message` is always one of the fixed user-facing templates below; internal
/// detail (SQL text, table names, driver errors) only ever reaches the logs.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "unsafe_statement")
    pub error: String,
    /// Human-readable description, safe to show to the end user
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const UNSAFE_STATEMENT: &str = "unsafe_statement";
    pub const UNPARSABLE_STATEMENT: &str = "unparsable_statement";
    pub const QUERY_FAILED: &str = "query_failed";
    pub const RATE_LIMITED: &str = "rate_limited";
}

/// Fixed user-facing templates. Nothing else is ever shown to the asker.
pub mod messages {
    pub const EMPTY_QUESTION: &str = "La pregunta no puede estar vacía.";
    pub const MISSING_TENANT: &str =
        "No se pudo identificar al cliente de la consulta. Vuelve a iniciar sesión.";
    pub const NOT_CONFIGURED: &str =
        "El asistente no está configurado correctamente. Contacta al administrador.";
    pub const CANNOT_PROCESS: &str =
        "No pude procesar esta solicitud. Intenta reformular tu pregunta.";
    pub const REPHRASE: &str =
        "No pude entender la consulta. Por favor, reformula tu pregunta de forma más específica.";
    pub const EXECUTION_FAILED: &str =
        "Ocurrió un error al consultar los datos. Intenta nuevamente más tarde.";
}

/// Failure of the record store or the privileged execution channel.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// Failure of the SQL-generation adapter.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("sql generator is not configured: {0}")]
    NotConfigured(String),
    #[error("upstream generation failed: {0}")]
    Upstream(String),
    #[error("generator returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Everything that can end a chat query.
///
/// `Display` carries internal detail for logs; callers must render
/// [`QueryError::user_message`] instead.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no tenant id on the question")]
    MissingTenant,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unsafe statement: {0}")]
    UnsafeStatement(String),
    #[error("unparsable statement: {0}")]
    Unparsable(#[from] ParseError),
    #[error("remote query failed: {0}")]
    RemoteQuery(#[from] StoreError),
    #[error("generation failed: {0}")]
    Generation(String),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Validation(_) | QueryError::MissingTenant => codes::VALIDATION_FAILED,
            QueryError::Configuration(_) => codes::CONFIGURATION_ERROR,
            QueryError::UnsafeStatement(_) => codes::UNSAFE_STATEMENT,
            QueryError::Unparsable(_) => codes::UNPARSABLE_STATEMENT,
            QueryError::RemoteQuery(_) | QueryError::Generation(_) => codes::QUERY_FAILED,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => messages::EMPTY_QUESTION,
            QueryError::MissingTenant => messages::MISSING_TENANT,
            QueryError::Configuration(_) => messages::NOT_CONFIGURED,
            QueryError::UnsafeStatement(_) => messages::CANNOT_PROCESS,
            QueryError::Unparsable(_) => messages::REPHRASE,
            QueryError::RemoteQuery(_) | QueryError::Generation(_) => messages::EXECUTION_FAILED,
        }
    }
}

impl From<GenerationError> for QueryError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::NotConfigured(detail) => QueryError::Configuration(detail),
            other => QueryError::Generation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_never_echo_internal_detail() {
        let errors = [
            QueryError::UnsafeStatement("DROP TABLE usuarios".to_string()),
            QueryError::RemoteQuery(StoreError::Query("relation \"pagos\" does not exist".to_string())),
            QueryError::Generation("HTTP 500 from upstream".to_string()),
        ];
        for err in errors {
            let message = err.user_message();
            assert!(!message.contains("DROP"));
            assert!(!message.contains("pagos"));
            assert!(!message.contains("500"));
        }
    }

    #[test]
    fn generator_not_configured_becomes_configuration_error() {
        let err: QueryError = GenerationError::NotConfigured("missing api key".to_string()).into();
        assert!(matches!(err, QueryError::Configuration(_)));
        assert_eq!(err.code(), codes::CONFIGURATION_ERROR);
    }

    #[test]
    fn missing_tenant_is_not_reported_as_an_empty_question() {
        let err = QueryError::MissingTenant;
        assert_eq!(err.code(), codes::VALIDATION_FAILED);
        assert_eq!(err.user_message(), messages::MISSING_TENANT);
        assert_ne!(err.user_message(), messages::EMPTY_QUESTION);
    }

    #[test]
    fn upstream_failure_becomes_generation_error() {
        let err: QueryError = GenerationError::Upstream("timeout".to_string()).into();
        assert!(matches!(err, QueryError::Generation(_)));
        assert_eq!(err.user_message(), messages::EXECUTION_FAILED);
    }
}
