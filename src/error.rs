
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryboxError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Payload error: {0}")]
    Payload(String),
    #[error("Lookup error: {source_name}: {message}")]
    Lookup { source_name: String, message: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, QueryboxError>;

// Helper conversions
impl From<config::ConfigError> for QueryboxError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for QueryboxError {
    fn from(e: serde_json::Error) -> Self { Self::Payload(e.to_string()) }
}
impl From<regex::Error> for QueryboxError {
    fn from(e: regex::Error) -> Self { Self::Config(e.to_string()) }
}

/// Why a sequence could not be completed under its active function.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{function}: {message}")]
pub struct CompleteError {
    pub function: String,
    pub message: String,
    pub missing: Vec<String>,
}
