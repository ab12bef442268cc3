//! Error types for text2sql.

use thiserror::Error;

/// The main error type for text2sql operations.
#[derive(Debug, Error)]
pub enum Text2SqlError {
    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not reach the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected or failed a statement.
    #[error("Database error: {0}")]
    Database(String),

    /// The generative model could not be acquired or failed to answer.
    #[error("Model error: {0}")]
    Model(String),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Text2SqlError {
    /// Create a model error from anything printable.
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}

impl From<reqwest::Error> for Text2SqlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Model(err.to_string())
    }
}

impl From<toml::de::Error> for Text2SqlError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for text2sql operations.
pub type Text2SqlResult<T> = Result<T, Text2SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Text2SqlError::model("no such model: sqlcoder");
        assert_eq!(err.to_string(), "Model error: no such model: sqlcoder");
    }

    #[test]
    fn test_toml_error_is_config() {
        let err: Text2SqlError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, Text2SqlError::Config(_)));
    }
}
