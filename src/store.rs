//! Storage contracts consumed by the core pipeline
//!
//! The aggregation, rule and prediction code only ever talks to these traits.
//! [`crate::database::Database`] implements all of them on SQLite.

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{
    LogEntry, RecoveryPrediction, SplitSession, SplitTemplate, UserHead, UserProfile,
};
use crate::rules::{RuleTemplate, Timeframe};

/// Whether an upsert created a new row or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub trait LogStore {
    /// The entry for (user, date), if one exists
    fn get_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<LogEntry>>;

    /// Entries with `start <= date <= end`, oldest first
    fn logs_between(&self, user_id: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<LogEntry>>;

    /// Up to `limit` entries dated on or before `up_to`, newest first
    fn recent_logs(&self, user_id: &str, up_to: NaiveDate, limit: usize) -> Result<Vec<LogEntry>>;

    /// Mean of every recorded recovery rating for the user
    fn mean_recovery_rating(&self, user_id: &str) -> Result<Option<f64>>;

    /// Insert or replace the entry keyed by (entry.user_id, entry.date)
    fn upsert_log(&self, entry: &LogEntry) -> Result<UpsertOutcome>;
}

pub trait UserStore {
    fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

pub trait SplitStore {
    fn template(&self, template_id: &str) -> Result<Option<SplitTemplate>>;

    /// Sessions of a template in their defined order
    fn sessions_for_template(&self, template_id: &str) -> Result<Vec<SplitSession>>;
}

pub trait RuleStore {
    /// Templates for a timeframe in storage order
    fn rules_for_timeframe(&self, timeframe: Timeframe) -> Result<Vec<RuleTemplate>>;
}

pub trait UserHeadStore {
    fn head(&self, user_id: &str) -> Result<Option<UserHead>>;
}

pub trait PredictionStore {
    /// Atomic insert-or-replace keyed by (user, date)
    fn upsert_prediction(&self, prediction: &RecoveryPrediction) -> Result<()>;

    fn prediction(&self, user_id: &str, date: NaiveDate) -> Result<Option<RecoveryPrediction>>;

    /// Stored predictions with `start <= date <= end`, oldest first
    fn predictions_between(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RecoveryPrediction>>;
}
