use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::units::{HeightUnit, WeightUnit};

/// Training goal selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Cutting,
    Bulking,
    Performance,
    Maintenance,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::Cutting => "cutting",
            Goal::Bulking => "bulking",
            Goal::Performance => "performance",
            Goal::Maintenance => "maintenance",
        }
    }
}

impl std::str::FromStr for Goal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cutting" | "fat loss" | "weight loss" => Ok(Goal::Cutting),
            "bulking" | "gain muscle" => Ok(Goal::Bulking),
            "performance" => Ok(Goal::Performance),
            "maintenance" => Ok(Goal::Maintenance),
            _ => Err(format!("Unknown goal: {}", s)),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported daily activity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Low => "low",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::High => "high",
        }
    }
}

impl std::str::FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ActivityLevel::Low),
            "moderate" => Ok(ActivityLevel::Moderate),
            "high" => Ok(ActivityLevel::High),
            _ => Err(format!("Unknown activity level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            _ => Err(format!("Unknown sex: {}", s)),
        }
    }
}

/// Category of a split template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitType {
    Strength,
    Cardio,
    Mixed,
}

impl SplitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitType::Strength => "strength",
            SplitType::Cardio => "cardio",
            SplitType::Mixed => "mixed",
        }
    }
}

impl std::str::FromStr for SplitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strength" => Ok(SplitType::Strength),
            "cardio" => Ok(SplitType::Cardio),
            "mixed" => Ok(SplitType::Mixed),
            _ => Err(format!("Unknown split type: {}", s)),
        }
    }
}

/// Protein / carbohydrate / fat amounts in grams
///
/// Deserialization is lenient: missing or non-numeric macros read as 0 so a
/// malformed payload never fails a whole log row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct MacroGrams {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroGrams {
    pub fn new(protein: f64, carbs: f64, fat: f64) -> Self {
        Self { protein, carbs, fat }
    }

    /// True when no macro carries a value
    pub fn is_empty(&self) -> bool {
        self.protein == 0.0 && self.carbs == 0.0 && self.fat == 0.0
    }
}

impl From<Value> for MacroGrams {
    fn from(value: Value) -> Self {
        // Payloads sometimes arrive double-encoded as a JSON string
        let value = match value {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::Null),
            other => other,
        };
        let grams = |key: &str| value.get(key).and_then(json_number).unwrap_or(0.0);
        MacroGrams {
            protein: grams("protein"),
            carbs: grams("carbs"),
            fat: grams("fat"),
        }
    }
}

/// Per-muscle soreness severity on a 0-5 scale
///
/// Stored payloads come in three shapes: a `{muscle: severity}` object, a legacy
/// scalar rating, or the bulk-import list form where only the first element is
/// meaningful. Scalars are kept under the `overall` key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Soreness(pub BTreeMap<String, f64>);

impl Soreness {
    pub const OVERALL: &'static str = "overall";

    pub fn scalar(rating: f64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(Self::OVERALL.to_string(), rating);
        Soreness(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean severity across muscles, 0 when nothing is sore
    pub fn level(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.values().sum::<f64>() / self.0.len() as f64
    }

    fn severity(value: &Value) -> Option<f64> {
        if let Some(n) = json_number(value) {
            return Some(n);
        }
        match value.as_str()?.trim().to_lowercase().as_str() {
            "none" => Some(0.0),
            "low" | "mild" => Some(1.0),
            "moderate" | "medium" => Some(3.0),
            "high" | "severe" => Some(5.0),
            _ => None,
        }
    }
}

impl From<Value> for Soreness {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Soreness(
                map.iter()
                    .filter_map(|(muscle, v)| Self::severity(v).map(|s| (muscle.clone(), s)))
                    .collect(),
            ),
            Value::Array(items) => items
                .first()
                .and_then(Self::severity)
                .map(Soreness::scalar)
                .unwrap_or_default(),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_) | Value::Number(_))) => {
                    Soreness::from(parsed)
                }
                _ => Self::severity(&Value::String(s))
                    .map(Soreness::scalar)
                    .unwrap_or_default(),
            },
            Value::Number(_) => Self::severity(&value).map(Soreness::scalar).unwrap_or_default(),
            _ => Soreness::default(),
        }
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// One user's log for one calendar date
///
/// At most one entry exists per (user, date). Optional fields are `None` when
/// the user did not report them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// Owner of the entry
    #[serde(default)]
    pub user_id: String,

    /// Calendar date the entry describes
    pub date: NaiveDate,

    /// Whether a training session happened
    #[serde(default)]
    pub trained: bool,

    /// Split session name (e.g. "Push")
    #[serde(default)]
    pub split: Option<String>,

    /// Split template the session belongs to
    #[serde(default)]
    pub split_template_id: Option<String>,

    #[serde(default)]
    pub total_sets: Option<u32>,

    #[serde(default)]
    pub failure_sets: Option<u32>,

    /// Total reps-in-reserve summed across sets
    #[serde(default)]
    pub total_rir: Option<u32>,

    /// Sleep start as local "HH:MM"
    #[serde(default)]
    pub sleep_start: Option<String>,

    /// Sleep end as local "HH:MM", may be earlier than start
    #[serde(default)]
    pub sleep_end: Option<String>,

    /// Sleep quality 1-5
    #[serde(default)]
    pub sleep_quality: Option<u8>,

    /// Resting heart rate in bpm
    #[serde(default)]
    pub resting_hr: Option<u16>,

    /// Heart rate variability in ms
    #[serde(default)]
    pub hrv: Option<f64>,

    #[serde(default)]
    pub soreness: Option<Soreness>,

    /// Stress 1-5
    #[serde(default)]
    pub stress: Option<u8>,

    /// Motivation 1-5
    #[serde(default)]
    pub motivation: Option<u8>,

    #[serde(default)]
    pub calories: Option<u32>,

    #[serde(default)]
    pub macros: Option<MacroGrams>,

    #[serde(default)]
    pub water_intake_l: Option<f64>,

    /// Body weight, in the owner's weight unit
    #[serde(default)]
    pub weight: Option<f64>,

    /// Muscle groups trained, when logged explicitly
    #[serde(default)]
    pub muscle_groups: Vec<String>,

    /// Ground-truth recovery rating 0-100
    #[serde(default)]
    pub recovery_rating: Option<f64>,
}

impl LogEntry {
    /// An entry with every field unset
    pub fn empty(user_id: impl Into<String>, date: NaiveDate) -> Self {
        LogEntry {
            user_id: user_id.into(),
            date,
            ..Default::default()
        }
    }

    /// Sleep start, sleep end or sleep quality is present
    pub fn has_morning_checkin(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().map_or(false, |v| !v.trim().is_empty());
        filled(&self.sleep_start) || filled(&self.sleep_end) || self.sleep_quality.is_some()
    }

    /// Both sleep clock times are present
    pub fn has_sleep_window(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().map_or(false, |v| !v.trim().is_empty());
        filled(&self.sleep_start) && filled(&self.sleep_end)
    }
}

/// User profile attributes consumed by the core
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(default)]
    pub age: Option<u32>,

    #[serde(default)]
    pub sex: Option<Sex>,

    #[serde(default)]
    pub height: Option<f64>,

    #[serde(default)]
    pub height_unit: HeightUnit,

    /// Current body weight
    #[serde(default)]
    pub weight: Option<f64>,

    #[serde(default)]
    pub weight_unit: WeightUnit,

    #[serde(default)]
    pub goal: Option<Goal>,

    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,

    #[serde(default)]
    pub weight_target: Option<f64>,

    #[serde(default)]
    pub weight_target_unit: WeightUnit,

    /// Daily maintenance calories
    #[serde(default)]
    pub maintenance_calories: Option<u32>,

    /// Daily macro targets in grams
    #[serde(default)]
    pub macro_targets: Option<MacroGrams>,

    /// Default split template
    #[serde(default)]
    pub split_template_id: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        UserProfile {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Current weight in kilograms, if known
    pub fn weight_kg(&self) -> Option<f64> {
        self.weight.map(|w| self.weight_unit.to_kg(w))
    }

    /// Height in centimeters, if known
    pub fn height_cm(&self) -> Option<f64> {
        self.height.map(|h| self.height_unit.to_cm(h))
    }
}

/// A named group of split sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTemplate {
    pub id: String,
    pub name: String,
    pub split_type: SplitType,
    /// Owner, `None` for presets
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A sub-workout inside a split template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSession {
    pub template_id: String,
    pub name: String,
    pub muscle_groups: Vec<String>,
}

/// A stored recovery score for one (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPrediction {
    pub user_id: String,
    pub date: NaiveDate,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Per-user residual correction learned offline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserHead {
    pub bias: f64,
    /// Fixed at 1.0 by the current trainer
    pub slope: f64,
}

impl Default for UserHead {
    fn default() -> Self {
        UserHead {
            bias: 0.0,
            slope: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_soreness_object_form() {
        let soreness = Soreness::from(json!({"Quads": 3, "Back": "high", "Calves": "?"}));
        assert_eq!(soreness.0.len(), 2);
        assert_eq!(soreness.0["Back"], 5.0);
        assert_eq!(soreness.level(), 4.0);
    }

    #[test]
    fn test_soreness_legacy_forms() {
        assert_eq!(Soreness::from(json!(4)).level(), 4.0);
        assert_eq!(Soreness::from(json!([2, 1, 0, 0])).0[Soreness::OVERALL], 2.0);
        assert_eq!(Soreness::from(json!("[3,0]")).level(), 3.0);
        assert!(Soreness::from(json!(null)).is_empty());
        assert!(Soreness::from(json!("not json")).is_empty());
    }

    #[test]
    fn test_macros_lenient_parsing() {
        let macros: MacroGrams =
            serde_json::from_value(json!({"protein": 170, "carbs": "320", "fat": null})).unwrap();
        assert_eq!(macros, MacroGrams::new(170.0, 320.0, 0.0));

        let encoded: MacroGrams =
            serde_json::from_value(json!("{\"protein\":90,\"carbs\":10,\"fat\":5}")).unwrap();
        assert_eq!(encoded.protein, 90.0);
    }

    #[test]
    fn test_morning_checkin() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 12).unwrap();
        let mut entry = LogEntry::empty("u1", date);
        assert!(!entry.has_morning_checkin());

        entry.sleep_start = Some("  ".to_string());
        assert!(!entry.has_morning_checkin());

        entry.sleep_quality = Some(4);
        assert!(entry.has_morning_checkin());
        assert!(!entry.has_sleep_window());
    }

    #[test]
    fn test_goal_parsing_accepts_legacy_labels() {
        assert_eq!("gain muscle".parse::<Goal>().unwrap(), Goal::Bulking);
        assert_eq!("Fat Loss".parse::<Goal>().unwrap(), Goal::Cutting);
        assert!("zen".parse::<Goal>().is_err());
    }

    #[test]
    fn test_log_entry_from_json() {
        let entry: LogEntry = serde_json::from_value(json!({
            "date": "2025-07-12",
            "trained": true,
            "sleep_start": "23:30",
            "sleep_end": "07:10",
            "soreness": [2, 1, 0, 0],
            "macros": {"protein": 170, "carbs": 320, "fat": 80}
        }))
        .unwrap();

        assert!(entry.trained);
        assert_eq!(entry.soreness.unwrap().level(), 2.0);
        assert_eq!(entry.macros.unwrap().fat, 80.0);
        assert!(entry.muscle_groups.is_empty());
    }
}
