//! Error types for sluice.
//!
//! Fetch failures are never represented here: a cache hands the fetcher's
//! own error back to the caller untouched. `SluiceError` only covers building
//! and configuring the primitives.

use thiserror::Error;

/// Result type alias using `SluiceError`.
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Construction and configuration errors.
#[derive(Debug, Error)]
pub enum SluiceError {
    /// No expiration was supplied to a cache builder.
    #[error("Cache expiration must be set")]
    MissingExpiration,

    /// Expiration is present but unusable.
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// An environment variable could not be parsed.
    #[error("Invalid environment variable {name}: {reason}")]
    EnvVar {
        /// Variable name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SluiceError::EnvVar {
            name: "SLUICE_EXPIRATION_MS".into(),
            reason: "not a number".into(),
        };
        assert!(err.to_string().contains("SLUICE_EXPIRATION_MS"));
        assert!(err.to_string().contains("not a number"));
        assert_eq!(
            SluiceError::MissingExpiration.to_string(),
            "Cache expiration must be set"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let result: Result<serde_json::Value> = parsed.map_err(SluiceError::from);
        assert!(matches!(result, Err(SluiceError::Json(_))));
    }
}
