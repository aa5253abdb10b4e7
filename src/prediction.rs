//! Personalized recovery prediction
//!
//! A prediction runs the frozen model on the day's feature vector, adds the
//! user's learned bias ("head") and stores the result keyed by (user, date).
//! Recomputing a day overwrites the stored score.

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::{ContextFields, ContextValue, DailyContext};
use crate::error::{LiftError, PredictionError, Result};
use crate::model::{FeatureValue, ModelArtifacts};
use crate::models::{LogEntry, RecoveryPrediction, UserHead, UserProfile};
use crate::splits::{resolve_day, ResolvedSplit};
use crate::store::{LogStore, PredictionStore, SplitStore, UserHeadStore, UserStore};

/// Rows in the trailing window for rolling features
pub const DEFAULT_ROLLING_WINDOW: usize = 3;

/// Everything a prediction needs from storage
pub trait PredictionSources: LogStore + UserStore + SplitStore + UserHeadStore + PredictionStore {}

impl<T> PredictionSources for T where
    T: LogStore + UserStore + SplitStore + UserHeadStore + PredictionStore
{
}

/// Intermediate values of a prediction, for debugging
#[derive(Debug, Clone, Serialize)]
pub struct PredictionDiagnostics {
    /// Assembled features before column selection
    pub features: BTreeMap<String, FeatureValue>,
    /// Model output on the label scale, before the head
    pub raw_score: f64,
    /// Score after the head bias
    pub adjusted_score: f64,
    /// Head applied, `None` when the user has no head record
    pub head: Option<UserHead>,
    /// Stored result
    pub prediction: RecoveryPrediction,
}

/// Trailing means of soreness, stress and sleep quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingMeans {
    pub soreness: f64,
    pub stress: f64,
    pub sleep_quality: f64,
}

impl RollingMeans {
    /// Means over `logs`, treating unreported values as 0; NaN when `logs` is empty
    pub fn from_logs(logs: &[LogEntry]) -> Self {
        let soreness: Vec<f64> = logs
            .iter()
            .map(|l| l.soreness.as_ref().map_or(0.0, |s| s.level()))
            .collect();
        let stress: Vec<f64> = logs.iter().map(|l| l.stress.unwrap_or(0) as f64).collect();
        let quality: Vec<f64> = logs
            .iter()
            .map(|l| l.sleep_quality.unwrap_or(0) as f64)
            .collect();

        RollingMeans {
            soreness: soreness.iter().mean(),
            stress: stress.iter().mean(),
            sleep_quality: quality.iter().mean(),
        }
    }
}

/// Sine/cosine encoding of a zero-based position in a cycle
pub fn cyclic(position: u32, period: u32) -> (f64, f64) {
    let angle = 2.0 * PI * position as f64 / period as f64;
    (angle.sin(), angle.cos())
}

/// Inputs to feature assembly that come from storage
pub struct FeatureInputs<'a> {
    pub user: &'a UserProfile,
    pub date: NaiveDate,
    pub daily: &'a DailyContext,
    pub rolling: RollingMeans,
    pub split: &'a ResolvedSplit,
    /// Mean historical recovery rating, `None` for users without labels
    pub mean_rating: Option<f64>,
}

/// Build the raw feature map for one (user, date)
pub fn assemble_features(
    inputs: &FeatureInputs<'_>,
    artifacts: &ModelArtifacts,
) -> BTreeMap<String, FeatureValue> {
    let mut features: BTreeMap<String, FeatureValue> = inputs
        .daily
        .entries()
        .into_iter()
        .map(|(name, value)| {
            let feature = match value {
                ContextValue::Number(n) => FeatureValue::Number(n),
                ContextValue::Text(s) => FeatureValue::Category(s),
                ContextValue::Soreness(s) => FeatureValue::Number(s.level()),
            };
            (name.to_string(), feature)
        })
        .collect();

    let mut put = |name: &str, value: FeatureValue| {
        features.insert(name.to_string(), value);
    };

    put("soreness_roll3", inputs.rolling.soreness.into());
    put("stress_roll3", inputs.rolling.stress.into());
    put("sleep_quality_roll3", inputs.rolling.sleep_quality.into());

    let (dow_sin, dow_cos) = cyclic(inputs.date.weekday().num_days_from_monday(), 7);
    let (moy_sin, moy_cos) = cyclic(inputs.date.month0(), 12);
    put("dow_sin", dow_sin.into());
    put("dow_cos", dow_cos.into());
    put("moy_sin", moy_sin.into());
    put("moy_cos", moy_cos.into());

    let user = inputs.user;
    put("age", (user.age.unwrap_or(0) as f64).into());
    put("height", user.height_cm().unwrap_or(0.0).into());
    put("weight", user.weight_kg().unwrap_or(0.0).into());

    put("sex", user.sex.map_or("", |s| s.as_str()).into());
    put("goal", user.goal.map_or("", |g| g.as_str()).into());
    put(
        "activity_level",
        user.activity_level.map_or("", |a| a.as_str()).into(),
    );
    put(
        "split_type",
        inputs.split.split_type.map_or("", |t| t.as_str()).into(),
    );

    for muscle in &artifacts.all_muscles {
        let trained = inputs
            .split
            .muscle_groups
            .iter()
            .any(|m| m.trim().eq_ignore_ascii_case(muscle));
        put(muscle, FeatureValue::Number(if trained { 1.0 } else { 0.0 }));
    }

    put(
        "user_bias",
        inputs.mean_rating.unwrap_or(artifacts.global_mean).into(),
    );

    features
}

/// Runs the frozen model for stored users
pub struct RecoveryPredictor {
    artifacts: Arc<ModelArtifacts>,
    rolling_window: usize,
    require_checkin: bool,
}

impl RecoveryPredictor {
    pub fn new(artifacts: Arc<ModelArtifacts>) -> Self {
        Self {
            artifacts,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            require_checkin: true,
        }
    }

    pub fn with_rolling_window(mut self, rows: usize) -> Self {
        self.rolling_window = rows.max(1);
        self
    }

    /// Allow predictions for days without a morning check-in
    pub fn with_require_checkin(mut self, require: bool) -> Self {
        self.require_checkin = require;
        self
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    /// Predict, store and return the recovery score for (user, date)
    pub fn predict<S: PredictionSources>(
        &self,
        store: &S,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<RecoveryPrediction> {
        Ok(self.predict_with_diagnostics(store, user_id, date)?.prediction)
    }

    /// [`predict`](Self::predict), also returning every intermediate value
    pub fn predict_with_diagnostics<S: PredictionSources>(
        &self,
        store: &S,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<PredictionDiagnostics> {
        let user = store.get_user(user_id)?.ok_or_else(|| {
            LiftError::Prediction(PredictionError::UnknownUser {
                user_id: user_id.to_string(),
            })
        })?;

        let log = store.get_log(user_id, date)?;
        let ready = log.as_ref().map_or(false, LogEntry::has_morning_checkin);
        if self.require_checkin && !ready {
            debug!(user_id, %date, "No morning check-in, prediction not ready");
            return Err(PredictionError::NotReady {
                user_id: user_id.to_string(),
                date,
            }
            .into());
        }
        let log = log.unwrap_or_else(|| LogEntry::empty(user_id, date));

        let daily = DailyContext::from_entry(&user, &log);
        let recent = store.recent_logs(user_id, date, self.rolling_window)?;
        let split = resolve_day(store, &user, &log)?;
        let inputs = FeatureInputs {
            user: &user,
            date,
            daily: &daily,
            rolling: RollingMeans::from_logs(&recent),
            split: &split,
            mean_rating: store.mean_recovery_rating(user_id)?,
        };
        let features = assemble_features(&inputs, &self.artifacts);

        let row = self.artifacts.feature_row(&features);
        let encoded = self.artifacts.transform(&row)?;
        let raw_score = self.artifacts.denormalize(self.artifacts.score(&encoded)?);

        let head = store.head(user_id)?;
        let adjusted_score = raw_score + head.map_or(0.0, |h| h.bias);

        let prediction = RecoveryPrediction {
            user_id: user_id.to_string(),
            date,
            score: adjusted_score,
            created_at: Utc::now(),
        };
        store.upsert_prediction(&prediction)?;

        info!(
            user_id,
            %date,
            raw_score,
            score = adjusted_score,
            has_head = head.is_some(),
            "Stored recovery prediction"
        );

        Ok(PredictionDiagnostics {
            features,
            raw_score,
            adjusted_score,
            head,
            prediction,
        })
    }
}

/// Stored predictions for a date range, oldest first
pub fn prediction_history<S: PredictionStore>(
    store: &S,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<RecoveryPrediction>> {
    store.predictions_between(user_id, start, end)
}
