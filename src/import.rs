//! Bulk daily-log import and per-user head loading
//!
//! Each imported row runs the same pipeline as a single log submission:
//! split normalization, log upsert, then a recovery prediction. Rows fail
//! independently; the batch reports tallies instead of aborting.

use csv::ReaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::database::Database;
use crate::error::{LiftError, PredictionError, Result};
use crate::models::{LogEntry, UserHead, UserProfile};
use crate::prediction::{PredictionSources, RecoveryPredictor};
use crate::splits::normalize_entry;
use crate::store::{LogStore, UpsertOutcome, UserStore};

/// Result of importing a single row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// New log stored and scored
    Processed,
    /// Existing log for the date replaced and rescored
    Duplicate,
    /// Row rejected, or stored but not scored
    Error(String),
}

/// Aggregate counts for a bulk import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub processed: usize,
    pub duplicates: usize,
    pub errors: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Processed => self.processed += 1,
            RowOutcome::Duplicate => self.duplicates += 1,
            RowOutcome::Error(_) => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.duplicates + self.errors
    }

    pub fn message(&self) -> String {
        format!(
            "Imported {} rows, {} updated, {} errors",
            self.processed, self.duplicates, self.errors
        )
    }
}

/// Read a JSON array of daily logs as raw rows
///
/// Only the outer array is checked here. Each row is parsed on its own
/// during import so one malformed row cannot reject the file.
pub fn read_log_file<P: AsRef<Path>>(path: P) -> Result<Vec<Value>> {
    let invalid = |reason: String| {
        LiftError::Validation(format!(
            "Invalid log file {}: {}",
            path.as_ref().display(),
            reason
        ))
    };

    let content = fs::read_to_string(&path)?;
    match serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))? {
        Value::Array(rows) => Ok(rows),
        _ => Err(invalid("expected a JSON array of logs".to_string())),
    }
}

/// Runs the per-row log pipeline over a batch for one user
pub struct BulkImporter<'a> {
    predictor: &'a RecoveryPredictor,
    show_progress: bool,
}

impl<'a> BulkImporter<'a> {
    pub fn new(predictor: &'a RecoveryPredictor) -> Self {
        Self {
            predictor,
            show_progress: false,
        }
    }

    /// Draw an indicatif progress bar while importing
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Import rows for `user_id`, overriding any user id in the rows
    ///
    /// Fails as a whole only when the user does not exist.
    pub fn import<S: PredictionSources>(
        &self,
        store: &S,
        user_id: &str,
        entries: Vec<LogEntry>,
    ) -> Result<(ImportSummary, Vec<RowOutcome>)> {
        self.run(store, user_id, entries.into_iter().map(Ok).collect())
    }

    /// Import raw JSON rows, parsing each one separately
    ///
    /// A row that is not a valid log becomes [`RowOutcome::Error`] and the
    /// batch moves on to the next row.
    pub fn import_json<S: PredictionSources>(
        &self,
        store: &S,
        user_id: &str,
        rows: Vec<Value>,
    ) -> Result<(ImportSummary, Vec<RowOutcome>)> {
        let parsed = rows
            .into_iter()
            .map(|row| {
                serde_json::from_value::<LogEntry>(row)
                    .map_err(|e| format!("invalid log row: {}", e))
            })
            .collect();
        self.run(store, user_id, parsed)
    }

    fn run<S: PredictionSources>(
        &self,
        store: &S,
        user_id: &str,
        entries: Vec<std::result::Result<LogEntry, String>>,
    ) -> Result<(ImportSummary, Vec<RowOutcome>)> {
        let user = store.get_user(user_id)?.ok_or_else(|| {
            LiftError::Prediction(PredictionError::UnknownUser {
                user_id: user_id.to_string(),
            })
        })?;

        let pb = if self.show_progress {
            let pb = ProgressBar::new(entries.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut summary = ImportSummary::default();
        let mut outcomes = Vec::with_capacity(entries.len());

        for (idx, entry) in entries.into_iter().enumerate() {
            let outcome = match entry {
                Ok(mut entry) => {
                    entry.user_id = user.id.clone();
                    pb.set_message(entry.date.to_string());
                    self.import_row(store, &user, &mut entry)
                }
                Err(reason) => RowOutcome::Error(reason),
            };
            if let RowOutcome::Error(reason) = &outcome {
                warn!(row = idx, reason = %reason, "Import row failed");
            }

            summary.record(&outcome);
            outcomes.push(outcome);
            pb.inc(1);
        }

        pb.finish_with_message("Import complete");
        info!(
            user_id,
            processed = summary.processed,
            duplicates = summary.duplicates,
            errors = summary.errors,
            "Bulk import finished"
        );

        Ok((summary, outcomes))
    }

    fn import_row<S: PredictionSources>(
        &self,
        store: &S,
        user: &UserProfile,
        entry: &mut LogEntry,
    ) -> RowOutcome {
        if let Err(e) = normalize_entry(store, user, entry) {
            return RowOutcome::Error(e.to_string());
        }

        let stored = match store.upsert_log(entry) {
            Ok(outcome) => outcome,
            Err(e) => return RowOutcome::Error(e.to_string()),
        };

        // The stored log is kept even when scoring fails
        if let Err(e) = self.predictor.predict(store, &user.id, entry.date) {
            return RowOutcome::Error(format!("log stored, prediction failed: {}", e));
        }

        match stored {
            UpsertOutcome::Inserted => RowOutcome::Processed,
            UpsertOutcome::Updated => RowOutcome::Duplicate,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HeadRecord {
    user_id: String,
    bias: f64,
    #[serde(default = "unit_slope")]
    slope: f64,
}

fn unit_slope() -> f64 {
    1.0
}

/// Counts from a heads CSV load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadsLoad {
    /// Rows written to the head table
    pub written: usize,
    /// Rows naming a user with no profile
    pub skipped: usize,
}

/// Load `user_id,bias,slope` rows into the head table
///
/// Rows for users without a profile are skipped. Later rows for the same
/// user win.
pub fn load_heads_csv<P: AsRef<Path>>(db: &Database, path: P) -> Result<HeadsLoad> {
    let csv_err = |e: csv::Error| {
        LiftError::Validation(format!("Invalid heads file {}: {}", path.as_ref().display(), e))
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(csv_err)?;

    let mut loaded = HeadsLoad::default();
    for record in reader.deserialize::<HeadRecord>() {
        let record = record.map_err(csv_err)?;
        if db.get_user(&record.user_id)?.is_none() {
            warn!(user_id = %record.user_id, "Skipping head for unknown user");
            loaded.skipped += 1;
            continue;
        }
        db.upsert_head(
            &record.user_id,
            &UserHead {
                bias: record.bias,
                slope: record.slope,
            },
        )?;
        loaded.written += 1;
    }

    info!(
        path = %path.as_ref().display(),
        heads = loaded.written,
        skipped = loaded.skipped,
        "Loaded user heads"
    );
    Ok(loaded)
}
