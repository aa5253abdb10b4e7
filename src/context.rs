//! Context aggregation over a day, a 7-day week, or a calendar month
//!
//! A context is an ephemeral snapshot of derived signals. The three timeframes
//! are separate structs, but each exposes its signals by name through
//! [`ContextFields`] so rule templates can keep addressing fields as strings.
//!
//! # Defaults
//!
//! Every numeric signal is always present and defaults to 0. Nothing in this
//! module fails on absent or malformed data:
//!
//! - a missing log is replaced by an empty entry
//! - an unparseable sleep clock time yields 0.0 hours
//! - per-set ratios are 0 when no sets were logged
//! - every other ratio floors its denominator to 1
//!
//! The rule engine decides what counts as "no data" via [`ContextValue::is_sentinel`].
//!
//! # Window averages
//!
//! Weekly and monthly averages divide by the number of days that actually
//! reported the metric, not by the window length. Failure percentage and
//! average RIR come from summed totals so rest days do not drag them down.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{LiftError, Result};
use crate::models::{LogEntry, MacroGrams, Soreness, UserProfile};
use crate::rules::Timeframe;
use crate::store::LogStore;

/// A single signal value as seen by rules and model features
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Number(f64),
    Text(String),
    Soreness(Soreness),
}

impl ContextValue {
    /// Missing-or-zero policy: empty text, exactly zero, and NaN all count as
    /// absent. A measured zero cannot be told apart from no data.
    pub fn is_sentinel(&self) -> bool {
        match self {
            ContextValue::Number(n) => *n == 0.0 || n.is_nan(),
            ContextValue::Text(s) => s.is_empty(),
            ContextValue::Soreness(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::Number(value)
    }
}

impl From<u32> for ContextValue {
    fn from(value: u32) -> Self {
        ContextValue::Number(value as f64)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

/// Name-based access to a context's signals
pub trait ContextFields {
    /// Signal names in presentation order
    fn field_names(&self) -> &'static [&'static str];

    /// Value of a named signal, `None` for unknown names
    fn field(&self, name: &str) -> Option<ContextValue>;

    /// Every signal paired with its value
    fn entries(&self) -> Vec<(&'static str, ContextValue)> {
        self.field_names()
            .iter()
            .filter_map(|name| self.field(name).map(|value| (*name, value)))
            .collect()
    }
}

/// Hours slept between two "HH:MM" clock times
///
/// An end earlier than the start crosses midnight. Missing or malformed times
/// give 0.0.
pub fn sleep_hours(start: Option<&str>, end: Option<&str>) -> f64 {
    match (start.and_then(clock_minutes), end.and_then(clock_minutes)) {
        (Some(s), Some(e)) => {
            let mut delta = e - s;
            if delta < 0 {
                delta += 24 * 60;
            }
            delta as f64 / 60.0
        }
        _ => 0.0,
    }
}

fn clock_minutes(value: &str) -> Option<i32> {
    let (h, m) = value.trim().split_once(':')?;
    let hours: i32 = h.trim().parse().ok()?;
    let minutes: i32 = m.trim().parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

fn floor_one(value: f64) -> f64 {
    if value == 0.0 {
        1.0
    } else {
        value
    }
}

/// Ratio over sets performed, 0 when no sets were logged
fn per_set(count: u32, total_sets: u32) -> f64 {
    if total_sets == 0 {
        return 0.0;
    }
    count as f64 / total_sets as f64
}

fn per_day(sum: f64, days: u32) -> f64 {
    sum / days.max(1) as f64
}

/// Logged macros as a percentage of the user's targets
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MacroPercentages {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroPercentages {
    pub fn compute(logged: Option<&MacroGrams>, targets: Option<&MacroGrams>) -> Self {
        let logged = logged.copied().unwrap_or_default();
        let targets = targets.copied().unwrap_or_default();
        MacroPercentages {
            protein: logged.protein / floor_one(targets.protein) * 100.0,
            carbs: logged.carbs / floor_one(targets.carbs) * 100.0,
            fat: logged.fat / floor_one(targets.fat) * 100.0,
        }
    }

    /// All three within ±10 points of 100%
    pub fn is_compliant(&self) -> bool {
        [self.protein, self.carbs, self.fat]
            .iter()
            .all(|pct| (pct - 100.0).abs() <= 10.0)
    }
}

/// Signals for a single day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyContext {
    pub date: NaiveDate,
    pub trained: u8,
    pub split: String,
    pub total_sets: u32,
    pub failure_sets: u32,
    pub total_rir: u32,
    pub calories: u32,
    pub sleep_quality: u8,
    pub resting_hr: u16,
    pub hrv: f64,
    pub stress: u8,
    pub motivation: u8,
    pub water_intake_l: f64,
    pub sleep_h: f64,
    pub failure_pct: f64,
    pub avg_rir: f64,
    pub cal_deficit_pct: f64,
    pub protein_pct: f64,
    pub carbs_pct: f64,
    pub fat_pct: f64,
    pub soreness: Soreness,
}

impl DailyContext {
    pub const FIELDS: &'static [&'static str] = &[
        "date",
        "trained",
        "split",
        "total_sets",
        "failure_sets",
        "total_rir",
        "calories",
        "sleep_quality",
        "resting_hr",
        "hrv",
        "stress",
        "motivation",
        "water_intake_l",
        "sleep_h",
        "failure_pct",
        "avg_rir",
        "cal_deficit_pct",
        "protein_pct",
        "carbs_pct",
        "fat_pct",
        "soreness",
    ];

    /// Derive the day's signals from a (possibly empty) log entry
    pub fn from_entry(user: &UserProfile, log: &LogEntry) -> Self {
        let total_sets = log.total_sets.unwrap_or(0);
        let failure_sets = log.failure_sets.unwrap_or(0);
        let total_rir = log.total_rir.unwrap_or(0);
        let calories = log.calories.unwrap_or(0);

        let maintenance = floor_one(user.maintenance_calories.unwrap_or(0) as f64);
        let macros = MacroPercentages::compute(log.macros.as_ref(), user.macro_targets.as_ref());

        DailyContext {
            date: log.date,
            trained: u8::from(log.trained),
            split: log.split.clone().unwrap_or_default(),
            total_sets,
            failure_sets,
            total_rir,
            calories,
            sleep_quality: log.sleep_quality.unwrap_or(0),
            resting_hr: log.resting_hr.unwrap_or(0),
            hrv: log.hrv.unwrap_or(0.0),
            stress: log.stress.unwrap_or(0),
            motivation: log.motivation.unwrap_or(0),
            water_intake_l: log.water_intake_l.unwrap_or(0.0),
            sleep_h: sleep_hours(log.sleep_start.as_deref(), log.sleep_end.as_deref()),
            failure_pct: per_set(failure_sets, total_sets),
            avg_rir: per_set(total_rir, total_sets),
            cal_deficit_pct: (calories as f64 - maintenance) / maintenance,
            protein_pct: macros.protein,
            carbs_pct: macros.carbs,
            fat_pct: macros.fat,
            soreness: log.soreness.clone().unwrap_or_default(),
        }
    }

    /// True when the day carries no tracked data at all
    ///
    /// Calorie deficit is excluded because it is never zero without a log.
    pub fn is_empty(&self) -> bool {
        self.trained == 0
            && self.split.is_empty()
            && self.total_sets == 0
            && self.failure_sets == 0
            && self.total_rir == 0
            && self.calories == 0
            && self.sleep_quality == 0
            && self.resting_hr == 0
            && self.hrv == 0.0
            && self.stress == 0
            && self.motivation == 0
            && self.water_intake_l == 0.0
            && self.sleep_h == 0.0
            && self.protein_pct == 0.0
            && self.carbs_pct == 0.0
            && self.fat_pct == 0.0
            && self.soreness.is_empty()
    }
}

impl ContextFields for DailyContext {
    fn field_names(&self) -> &'static [&'static str] {
        Self::FIELDS
    }

    fn field(&self, name: &str) -> Option<ContextValue> {
        let value = match name {
            "date" => ContextValue::Text(self.date.to_string()),
            "trained" => ContextValue::Number(self.trained as f64),
            "split" => ContextValue::Text(self.split.clone()),
            "total_sets" => self.total_sets.into(),
            "failure_sets" => self.failure_sets.into(),
            "total_rir" => self.total_rir.into(),
            "calories" => self.calories.into(),
            "sleep_quality" => ContextValue::Number(self.sleep_quality as f64),
            "resting_hr" => ContextValue::Number(self.resting_hr as f64),
            "hrv" => self.hrv.into(),
            "stress" => ContextValue::Number(self.stress as f64),
            "motivation" => ContextValue::Number(self.motivation as f64),
            "water_intake_l" => self.water_intake_l.into(),
            "sleep_h" => self.sleep_h.into(),
            "failure_pct" => self.failure_pct.into(),
            "avg_rir" => self.avg_rir.into(),
            "cal_deficit_pct" => self.cal_deficit_pct.into(),
            "protein_pct" => self.protein_pct.into(),
            "carbs_pct" => self.carbs_pct.into(),
            "fat_pct" => self.fat_pct.into(),
            "soreness" => ContextValue::Soreness(self.soreness.clone()),
            _ => return None,
        };
        Some(value)
    }
}

/// Running totals over a window of log entries
#[derive(Debug, Clone, Default)]
struct WindowTotals {
    logged_days: u32,
    sessions: u32,
    total_sets: u32,
    failure_sets: u32,
    total_rir: u32,
    calories: u32,
    calorie_days: u32,
    sleep_h: f64,
    sleep_days: u32,
    sleep_quality: u32,
    sleep_quality_days: u32,
    macros: MacroPercentages,
    macro_days: u32,
    compliant_days: u32,
}

impl WindowTotals {
    fn accumulate(user: &UserProfile, logs: &[LogEntry]) -> Self {
        let mut totals = WindowTotals::default();
        let has_targets = user.macro_targets.is_some();

        for log in logs {
            totals.logged_days += 1;
            if log.trained {
                totals.sessions += 1;
            }
            totals.total_sets += log.total_sets.unwrap_or(0);
            totals.failure_sets += log.failure_sets.unwrap_or(0);
            totals.total_rir += log.total_rir.unwrap_or(0);

            if let Some(calories) = log.calories {
                totals.calories += calories;
                totals.calorie_days += 1;
            }

            if log.has_sleep_window() {
                totals.sleep_days += 1;
                totals.sleep_h += sleep_hours(log.sleep_start.as_deref(), log.sleep_end.as_deref());
            }

            if let Some(quality) = log.sleep_quality {
                totals.sleep_quality += quality as u32;
                totals.sleep_quality_days += 1;
            }

            let pct = MacroPercentages::compute(log.macros.as_ref(), user.macro_targets.as_ref());
            totals.macros.protein += pct.protein;
            totals.macros.carbs += pct.carbs;
            totals.macros.fat += pct.fat;
            if has_targets && log.macros.map_or(false, |m| !m.is_empty()) {
                totals.macro_days += 1;
            }
            if pct.is_compliant() {
                totals.compliant_days += 1;
            }
        }

        totals
    }

    fn pct_failure(&self) -> f64 {
        per_set(self.failure_sets, self.total_sets)
    }

    fn avg_rir(&self) -> f64 {
        per_set(self.total_rir, self.total_sets)
    }
}

/// Aggregates for the 7 days ending at `end_date`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyContext {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_sessions: u32,
    pub weekly_total_sets: u32,
    pub weekly_failure_sets: u32,
    pub weekly_total_rir: u32,
    pub pct_failure: f64,
    pub avg_rir: f64,
    pub avg_calories: f64,
    pub total_calories: u32,
    pub avg_sleep_h: f64,
    pub avg_sleep_quality: f64,
    pub avg_protein_pct: f64,
    pub avg_carbs_pct: f64,
    pub avg_fat_pct: f64,
}

impl WeeklyContext {
    pub const FIELDS: &'static [&'static str] = &[
        "start_date",
        "end_date",
        "weekly_sessions",
        "weekly_total_sets",
        "weekly_failure_sets",
        "weekly_total_rir",
        "pct_failure",
        "avg_rir",
        "avg_calories",
        "total_calories",
        "avg_sleep_h",
        "avg_sleep_quality",
        "avg_protein_pct",
        "avg_carbs_pct",
        "avg_fat_pct",
    ];

    /// First day of the week ending at `end_date`
    pub fn window_start(end_date: NaiveDate) -> NaiveDate {
        end_date - Duration::days(6)
    }

    pub fn from_entries(user: &UserProfile, end_date: NaiveDate, logs: &[LogEntry]) -> Self {
        let t = WindowTotals::accumulate(user, logs);
        WeeklyContext {
            start_date: Self::window_start(end_date),
            end_date,
            weekly_sessions: t.sessions,
            weekly_total_sets: t.total_sets,
            weekly_failure_sets: t.failure_sets,
            weekly_total_rir: t.total_rir,
            pct_failure: t.pct_failure(),
            avg_rir: t.avg_rir(),
            avg_calories: per_day(t.calories as f64, t.calorie_days),
            total_calories: t.calories,
            avg_sleep_h: per_day(t.sleep_h, t.sleep_days),
            avg_sleep_quality: per_day(t.sleep_quality as f64, t.sleep_quality_days),
            avg_protein_pct: per_day(t.macros.protein, t.macro_days),
            avg_carbs_pct: per_day(t.macros.carbs, t.macro_days),
            avg_fat_pct: per_day(t.macros.fat, t.macro_days),
        }
    }
}

impl ContextFields for WeeklyContext {
    fn field_names(&self) -> &'static [&'static str] {
        Self::FIELDS
    }

    fn field(&self, name: &str) -> Option<ContextValue> {
        let value = match name {
            "start_date" => ContextValue::Text(self.start_date.to_string()),
            "end_date" => ContextValue::Text(self.end_date.to_string()),
            "weekly_sessions" => self.weekly_sessions.into(),
            "weekly_total_sets" => self.weekly_total_sets.into(),
            "weekly_failure_sets" => self.weekly_failure_sets.into(),
            "weekly_total_rir" => self.weekly_total_rir.into(),
            "pct_failure" => self.pct_failure.into(),
            "avg_rir" => self.avg_rir.into(),
            "avg_calories" => self.avg_calories.into(),
            "total_calories" => self.total_calories.into(),
            "avg_sleep_h" => self.avg_sleep_h.into(),
            "avg_sleep_quality" => self.avg_sleep_quality.into(),
            "avg_protein_pct" => self.avg_protein_pct.into(),
            "avg_carbs_pct" => self.avg_carbs_pct.into(),
            "avg_fat_pct" => self.avg_fat_pct.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A calendar month, parsed from "YYYY-MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(LiftError::Validation(format!(
                "Invalid month: {}-{:02}",
                year, month
            )));
        }
        Ok(MonthKey { year, month })
    }

    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || LiftError::Validation(format!("Expected YYYY-MM, got '{}'", value));
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }

    pub fn containing(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|next| next - Duration::days(1))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Percent of the way from the window's first weight to the target weight
///
/// Weights come from the logs in date order, falling back to the profile weight
/// when none were logged. Everything is compared in kilograms. Returns 0 when
/// there is no target or the target equals the starting weight.
pub fn weight_progress_pct(user: &UserProfile, logs: &[LogEntry]) -> f64 {
    let mut weights = logs.iter().filter_map(|l| l.weight);
    let (start, end) = match weights.next() {
        Some(first) => (first, weights.last().unwrap_or(first)),
        None => {
            let current = user.weight.unwrap_or(0.0);
            (current, current)
        }
    };

    let start_kg = user.weight_unit.to_kg(start);
    let end_kg = user.weight_unit.to_kg(end);
    let target_kg = user
        .weight_target
        .map(|t| user.weight_target_unit.to_kg(t))
        .unwrap_or(0.0);

    let delta = target_kg - start_kg;
    if target_kg == 0.0 || delta == 0.0 {
        return 0.0;
    }

    let pct = (end_kg - start_kg) / delta * 100.0;
    Decimal::from_f64(pct)
        .map(|d| d.round_dp(1))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

/// Aggregates for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyContext {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_sessions: u32,
    pub monthly_total_sets: u32,
    pub monthly_failure_sets: u32,
    pub monthly_total_rir: u32,
    pub monthly_pct_failure: f64,
    pub monthly_avg_rir: f64,
    pub macro_compliance_pct: f64,
    pub monthly_total_calories: u32,
    pub monthly_avg_calories: f64,
    pub monthly_avg_sleep_h: f64,
    pub monthly_avg_sleep_quality: f64,
    pub monthly_avg_protein_pct: f64,
    pub monthly_avg_carbs_pct: f64,
    pub monthly_avg_fat_pct: f64,
    pub pct_to_target: f64,
}

impl MonthlyContext {
    pub const FIELDS: &'static [&'static str] = &[
        "start_date",
        "end_date",
        "monthly_sessions",
        "monthly_total_sets",
        "monthly_failure_sets",
        "monthly_total_rir",
        "monthly_pct_failure",
        "monthly_avg_rir",
        "macro_compliance_pct",
        "monthly_total_calories",
        "monthly_avg_calories",
        "monthly_avg_sleep_h",
        "monthly_avg_sleep_quality",
        "monthly_avg_protein_pct",
        "monthly_avg_carbs_pct",
        "monthly_avg_fat_pct",
        "pct_to_target",
    ];

    /// `logs` must be in date order for weight progress
    pub fn from_entries(user: &UserProfile, month: MonthKey, logs: &[LogEntry]) -> Self {
        let t = WindowTotals::accumulate(user, logs);
        MonthlyContext {
            start_date: month.first_day(),
            end_date: month.last_day(),
            monthly_sessions: t.sessions,
            monthly_total_sets: t.total_sets,
            monthly_failure_sets: t.failure_sets,
            monthly_total_rir: t.total_rir,
            monthly_pct_failure: t.pct_failure(),
            monthly_avg_rir: t.avg_rir(),
            macro_compliance_pct: per_day(t.compliant_days as f64, t.logged_days) * 100.0,
            monthly_total_calories: t.calories,
            monthly_avg_calories: per_day(t.calories as f64, t.calorie_days),
            monthly_avg_sleep_h: per_day(t.sleep_h, t.sleep_days),
            monthly_avg_sleep_quality: per_day(t.sleep_quality as f64, t.sleep_quality_days),
            monthly_avg_protein_pct: per_day(t.macros.protein, t.macro_days),
            monthly_avg_carbs_pct: per_day(t.macros.carbs, t.macro_days),
            monthly_avg_fat_pct: per_day(t.macros.fat, t.macro_days),
            pct_to_target: weight_progress_pct(user, logs),
        }
    }
}

impl ContextFields for MonthlyContext {
    fn field_names(&self) -> &'static [&'static str] {
        Self::FIELDS
    }

    fn field(&self, name: &str) -> Option<ContextValue> {
        let value = match name {
            "start_date" => ContextValue::Text(self.start_date.to_string()),
            "end_date" => ContextValue::Text(self.end_date.to_string()),
            "monthly_sessions" => self.monthly_sessions.into(),
            "monthly_total_sets" => self.monthly_total_sets.into(),
            "monthly_failure_sets" => self.monthly_failure_sets.into(),
            "monthly_total_rir" => self.monthly_total_rir.into(),
            "monthly_pct_failure" => self.monthly_pct_failure.into(),
            "monthly_avg_rir" => self.monthly_avg_rir.into(),
            "macro_compliance_pct" => self.macro_compliance_pct.into(),
            "monthly_total_calories" => self.monthly_total_calories.into(),
            "monthly_avg_calories" => self.monthly_avg_calories.into(),
            "monthly_avg_sleep_h" => self.monthly_avg_sleep_h.into(),
            "monthly_avg_sleep_quality" => self.monthly_avg_sleep_quality.into(),
            "monthly_avg_protein_pct" => self.monthly_avg_protein_pct.into(),
            "monthly_avg_carbs_pct" => self.monthly_avg_carbs_pct.into(),
            "monthly_avg_fat_pct" => self.monthly_avg_fat_pct.into(),
            "pct_to_target" => self.pct_to_target.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A context for any timeframe
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "timeframe", rename_all = "lowercase")]
pub enum Context {
    Daily(DailyContext),
    Weekly(WeeklyContext),
    Monthly(MonthlyContext),
}

impl Context {
    pub fn timeframe(&self) -> Timeframe {
        match self {
            Context::Daily(_) => Timeframe::Daily,
            Context::Weekly(_) => Timeframe::Weekly,
            Context::Monthly(_) => Timeframe::Monthly,
        }
    }
}

impl ContextFields for Context {
    fn field_names(&self) -> &'static [&'static str] {
        match self {
            Context::Daily(c) => c.field_names(),
            Context::Weekly(c) => c.field_names(),
            Context::Monthly(c) => c.field_names(),
        }
    }

    fn field(&self, name: &str) -> Option<ContextValue> {
        match self {
            Context::Daily(c) => c.field(name),
            Context::Weekly(c) => c.field(name),
            Context::Monthly(c) => c.field(name),
        }
    }
}

/// Build the context for one day; a day without a log yields the empty context
pub fn build_daily_context(
    user: &UserProfile,
    date: NaiveDate,
    logs: &impl LogStore,
) -> Result<DailyContext> {
    let log = match logs.get_log(&user.id, date)? {
        Some(log) => log,
        None => {
            debug!(user_id = %user.id, %date, "No log for day, using empty defaults");
            LogEntry::empty(user.id.clone(), date)
        }
    };
    Ok(DailyContext::from_entry(user, &log))
}

/// Build the context for the 7 days ending at `end_date` (inclusive)
pub fn build_weekly_context(
    user: &UserProfile,
    end_date: NaiveDate,
    logs: &impl LogStore,
) -> Result<WeeklyContext> {
    let start = WeeklyContext::window_start(end_date);
    let entries = logs.logs_between(&user.id, start, end_date)?;
    debug!(user_id = %user.id, %start, %end_date, days = entries.len(), "Building weekly context");
    Ok(WeeklyContext::from_entries(user, end_date, &entries))
}

/// Build the context for a calendar month
pub fn build_monthly_context(
    user: &UserProfile,
    month: MonthKey,
    logs: &impl LogStore,
) -> Result<MonthlyContext> {
    let entries = logs.logs_between(&user.id, month.first_day(), month.last_day())?;
    debug!(user_id = %user.id, %month, days = entries.len(), "Building monthly context");
    Ok(MonthlyContext::from_entries(user, month, &entries))
}

/// Flatten a context into a name → value map
pub fn to_map(ctx: &impl ContextFields) -> BTreeMap<String, ContextValue> {
    ctx.entries()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user() -> UserProfile {
        UserProfile {
            maintenance_calories: Some(2500),
            macro_targets: Some(MacroGrams::new(150.0, 300.0, 80.0)),
            ..UserProfile::new("u1")
        }
    }

    #[test]
    fn test_sleep_hours_crosses_midnight() {
        assert_eq!(sleep_hours(Some("23:30"), Some("07:00")), 7.5);
        assert_eq!(sleep_hours(Some("22:00"), Some("06:00")), 8.0);
        assert_eq!(sleep_hours(Some("01:00"), Some("09:30")), 8.5);
    }

    #[test]
    fn test_sleep_hours_malformed() {
        assert_eq!(sleep_hours(Some("late"), Some("07:00")), 0.0);
        assert_eq!(sleep_hours(Some("23:00"), None), 0.0);
        assert_eq!(sleep_hours(Some("23:00:00"), Some("07:00")), 0.0);
        assert_eq!(sleep_hours(Some("25:00"), Some("07:00")), 0.0);
        assert_eq!(sleep_hours(None, None), 0.0);
    }

    proptest! {
        #[test]
        fn test_sleep_hours_properties(
            sh in 0i32..24, sm in 0i32..60,
            eh in 0i32..24, em in 0i32..60
        ) {
            let start = format!("{:02}:{:02}", sh, sm);
            let end = format!("{:02}:{:02}", eh, em);
            let hours = sleep_hours(Some(&start), Some(&end));

            let expected = ((eh * 60 + em) - (sh * 60 + sm)).rem_euclid(24 * 60) as f64 / 60.0;
            prop_assert!(hours >= 0.0);
            prop_assert!((hours - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_sets_has_no_division_error() {
        let mut log = LogEntry::empty("u1", date(2025, 7, 12));
        log.failure_sets = Some(3);
        log.total_rir = Some(5);
        let ctx = DailyContext::from_entry(&user(), &log);

        assert_eq!(ctx.total_sets, 0);
        assert_eq!(ctx.failure_pct, 0.0);
        assert_eq!(ctx.avg_rir, 0.0);

        let empty = DailyContext::from_entry(&user(), &LogEntry::empty("u1", date(2025, 7, 12)));
        assert_eq!(empty.failure_pct, 0.0);
        assert_eq!(empty.avg_rir, 0.0);
    }

    #[test]
    fn test_training_ratios() {
        let mut log = LogEntry::empty("u1", date(2025, 7, 12));
        log.trained = true;
        log.total_sets = Some(20);
        log.failure_sets = Some(2);
        log.total_rir = Some(25);
        let ctx = DailyContext::from_entry(&user(), &log);

        assert_eq!(ctx.trained, 1);
        assert_eq!(ctx.failure_pct, 0.1);
        assert_eq!(ctx.avg_rir, 1.25);
    }

    #[test]
    fn test_calorie_deficit_and_macros() {
        let mut log = LogEntry::empty("u1", date(2025, 7, 12));
        log.calories = Some(2000);
        log.macros = Some(MacroGrams::new(90.0, 300.0, 40.0));
        let ctx = DailyContext::from_entry(&user(), &log);

        assert!((ctx.cal_deficit_pct - (-0.20)).abs() < 1e-12);
        assert!((ctx.protein_pct - 60.0).abs() < 1e-9);
        assert!((ctx.carbs_pct - 100.0).abs() < 1e-9);
        assert!((ctx.fat_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_unset_targets_floor_to_one() {
        let mut log = LogEntry::empty("u1", date(2025, 7, 12));
        log.calories = Some(100);
        log.macros = Some(MacroGrams::new(20.0, 0.0, 0.0));
        let ctx = DailyContext::from_entry(&UserProfile::new("u1"), &log);

        assert_eq!(ctx.cal_deficit_pct, 99.0);
        assert_eq!(ctx.protein_pct, 2000.0);
    }

    #[test]
    fn test_empty_day_context() {
        let ctx = DailyContext::from_entry(&user(), &LogEntry::empty("u1", date(2025, 7, 12)));
        assert!(ctx.is_empty());
        assert_eq!(ctx.cal_deficit_pct, -1.0);

        let mut log = LogEntry::empty("u1", date(2025, 7, 12));
        log.hrv = Some(60.0);
        assert!(!DailyContext::from_entry(&user(), &log).is_empty());
    }

    #[test]
    fn test_field_lookup_matches_names() {
        let ctx = DailyContext::from_entry(&user(), &LogEntry::empty("u1", date(2025, 7, 12)));
        for name in DailyContext::FIELDS {
            assert!(ctx.field(name).is_some(), "missing field {}", name);
        }
        assert!(ctx.field("nope").is_none());
        assert_eq!(ctx.entries().len(), DailyContext::FIELDS.len());
    }

    #[test]
    fn test_weekly_average_ignores_unreported_days() {
        let end = date(2025, 7, 14);
        let mut a = LogEntry::empty("u1", date(2025, 7, 12));
        a.calories = Some(2000);
        a.total_sets = Some(10);
        a.failure_sets = Some(2);
        a.trained = true;
        let mut b = LogEntry::empty("u1", date(2025, 7, 13));
        b.calories = Some(3000);
        b.sleep_start = Some("23:00".to_string());
        b.sleep_end = Some("07:00".to_string());
        let mut c = LogEntry::empty("u1", date(2025, 7, 14));
        c.total_sets = Some(10);
        c.total_rir = Some(20);
        c.trained = true;

        let ctx = WeeklyContext::from_entries(&user(), end, &[a, b, c]);

        assert_eq!(ctx.start_date, date(2025, 7, 8));
        assert_eq!(ctx.avg_calories, 2500.0);
        assert_eq!(ctx.total_calories, 5000);
        assert_eq!(ctx.avg_sleep_h, 8.0);
        assert_eq!(ctx.weekly_sessions, 2);
        assert_eq!(ctx.pct_failure, 0.1);
        assert_eq!(ctx.avg_rir, 1.0);
        assert_eq!(ctx.avg_sleep_quality, 0.0);
    }

    #[test]
    fn test_weekly_macro_average_uses_macro_days() {
        let mut a = LogEntry::empty("u1", date(2025, 7, 12));
        a.macros = Some(MacroGrams::new(150.0, 300.0, 80.0));
        let b = LogEntry::empty("u1", date(2025, 7, 13));

        let ctx = WeeklyContext::from_entries(&user(), date(2025, 7, 13), &[a, b]);
        assert!((ctx.avg_protein_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_month_key() {
        let month = MonthKey::parse("2024-02").unwrap();
        assert_eq!(month.first_day(), date(2024, 2, 1));
        assert_eq!(month.last_day(), date(2024, 2, 29));
        assert_eq!(MonthKey::parse("2024-12").unwrap().last_day(), date(2024, 12, 31));
        assert!(MonthKey::parse("2024-13").is_err());
        assert!(MonthKey::parse("24-1").is_err());
        assert_eq!(month.to_string(), "2024-02");
    }

    #[test]
    fn test_monthly_compliance_and_sleep_quality() {
        let month = MonthKey::new(2025, 7).unwrap();
        let mut a = LogEntry::empty("u1", date(2025, 7, 1));
        a.macros = Some(MacroGrams::new(150.0, 290.0, 85.0));
        a.sleep_quality = Some(4);
        let mut b = LogEntry::empty("u1", date(2025, 7, 2));
        b.macros = Some(MacroGrams::new(100.0, 300.0, 80.0));
        b.sleep_quality = Some(2);

        let ctx = MonthlyContext::from_entries(&user(), month, &[a, b]);
        assert_eq!(ctx.macro_compliance_pct, 50.0);
        assert_eq!(ctx.monthly_avg_sleep_quality, 3.0);
        assert_eq!(ctx.end_date, date(2025, 7, 31));
    }

    #[test]
    fn test_weight_progress() {
        let mut profile = user();
        profile.weight = Some(80.0);
        profile.weight_target = Some(75.0);

        let mut a = LogEntry::empty("u1", date(2025, 7, 1));
        a.weight = Some(80.0);
        let mut b = LogEntry::empty("u1", date(2025, 7, 20));
        b.weight = Some(78.0);
        assert_eq!(weight_progress_pct(&profile, &[a, b]), 40.0);

        // No logged weights: start and end are both the profile weight
        assert_eq!(weight_progress_pct(&profile, &[]), 0.0);

        profile.weight_target = None;
        assert_eq!(weight_progress_pct(&profile, &[]), 0.0);
    }

    #[test]
    fn test_weight_progress_mixed_units() {
        let mut profile = user();
        profile.weight = Some(200.0);
        profile.weight_unit = crate::units::WeightUnit::Lb;
        profile.weight_target = Some(86.18248);

        let mut a = LogEntry::empty("u1", date(2025, 7, 1));
        a.weight = Some(200.0);
        let mut b = LogEntry::empty("u1", date(2025, 7, 31));
        b.weight = Some(195.0);

        // 200 lb -> 90.7184 kg, target 190 lb worth of kg, halfway there
        assert_eq!(weight_progress_pct(&profile, &[a, b]), 50.0);
    }
}
