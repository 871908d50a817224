//! Error types for the core data model

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid parameter definition: {0}")]
    InvalidParameter(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Value {value} outside the domain of parameter '{name}'")]
    ValueOutOfDomain { name: String, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
