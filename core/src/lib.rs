pub mod adapters;
pub mod compose;
pub mod config;
pub mod error;
pub mod format;
pub mod model;
pub mod orchestrator;
pub mod present;
pub mod restricted;
pub mod validator;

#[cfg(test)]
mod fakes;

pub use config::EngineConfig;
pub use error::QueryError;
pub use orchestrator::QueryOrchestrator;
