//! Restricted-SQL interpreter used when no privileged channel is available.

pub mod executor;
pub mod lexer;
pub mod parser;

pub use executor::RestrictedExecutor;
pub use parser::{ParseError, Unsupported, detect_aggregate, is_identifier, parse};
