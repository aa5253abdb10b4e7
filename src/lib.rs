// Library interface for LiftRS modules
// This allows integration tests to access the core functionality

pub mod config;
pub mod context;
pub mod database;
pub mod digest;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod models;
pub mod nutrition;
pub mod prediction;
pub mod rules;
pub mod splits;
pub mod store;
pub mod units;

// Re-export commonly used types for convenience
pub use context::{Context, ContextFields, ContextValue, DailyContext, MonthKey, MonthlyContext, WeeklyContext};
pub use database::Database;
pub use digest::{DailyDigest, Insight, Insights};
pub use error::{LiftError, Result};
pub use import::{BulkImporter, ImportSummary, RowOutcome};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use model::ModelArtifacts;
pub use models::*;
pub use prediction::{PredictionDiagnostics, RecoveryPredictor};
pub use rules::{Condition, RuleEngine, RuleTemplate, Timeframe};
