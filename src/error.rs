//! Unified error hierarchy for LiftRS
//!
//! Only a handful of conditions are genuine failures here. Missing logs, malformed
//! clock strings and zero denominators all degrade to defaults inside the
//! aggregation code; what remains is storage failures, model artifact problems,
//! and a prediction requested before the morning check-in exists.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all LiftRS operations
#[derive(Debug, Error)]
pub enum LiftError {
    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Model artifact loading or inference errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Recovery prediction errors
    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),

    /// Rule template errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found: {table}.{id}")]
    NotFound { table: String, id: String },
}

/// Errors raised while loading or running the frozen recovery model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model artifact not found: {name} (searched {searched:?})")]
    ArtifactNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Invalid model artifact: {reason}")]
    InvalidArtifact { reason: String },

    #[error("Dimension mismatch in {stage}: expected {expected}, got {actual}")]
    DimensionMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },
}

/// Recovery prediction errors
#[derive(Debug, Error)]
pub enum PredictionError {
    /// The day has no sleep start, sleep end or sleep quality yet
    #[error("Not enough data yet for {user_id} on {date}: morning check-in missing")]
    NotReady { user_id: String, date: NaiveDate },

    #[error("Unknown user: {user_id}")]
    UnknownUser { user_id: String },
}

/// Rule template authoring errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid rule template {id}: {reason}")]
    InvalidTemplate { id: String, reason: String },

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

/// Result type alias for LiftRS operations
pub type Result<T> = std::result::Result<T, LiftError>;

impl From<rusqlite::Error> for LiftError {
    fn from(err: rusqlite::Error) -> Self {
        LiftError::Database(DatabaseError::Sqlite(err))
    }
}

impl LiftError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiftError::Database(DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(..)))
                | LiftError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LiftError::Prediction(PredictionError::NotReady { .. }) => ErrorSeverity::Info,
            LiftError::Database(DatabaseError::NotFound { .. }) => ErrorSeverity::Warning,
            LiftError::Validation(_) => ErrorSeverity::Warning,
            LiftError::Rule(_) => ErrorSeverity::Warning,
            LiftError::Model(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LiftError::Prediction(PredictionError::NotReady { date, .. }) => {
                format!(
                    "Not enough data yet for {}. Log your sleep or sleep quality first.",
                    date
                )
            }
            LiftError::Prediction(PredictionError::UnknownUser { user_id }) => {
                format!("No profile found for user {}", user_id)
            }
            LiftError::Database(DatabaseError::NotFound { table, id }) if table == "users" => {
                format!("No profile found for user {}", id)
            }
            LiftError::Model(ModelError::ArtifactNotFound { name, .. }) => {
                format!(
                    "Recovery model artifact '{}' is missing. Check the model directory setting.",
                    name
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = LiftError::Prediction(PredictionError::NotReady {
            user_id: "u1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 12).unwrap(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Info);

        let err = LiftError::Model(ModelError::InvalidArtifact {
            reason: "test".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_error_retryable() {
        let err = LiftError::Io(std::io::Error::new(std::io::ErrorKind::Other, "busy"));
        assert!(err.is_retryable());

        let err = LiftError::Validation("test".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = LiftError::Prediction(PredictionError::NotReady {
            user_id: "u1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 12).unwrap(),
        });
        assert!(err.user_message().contains("Not enough data yet"));
        assert!(err.user_message().contains("2025-07-12"));

        let err = LiftError::Database(DatabaseError::NotFound {
            table: "users".to_string(),
            id: "u9".to_string(),
        });
        assert_eq!(err.user_message(), "No profile found for user u9");
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }
}
