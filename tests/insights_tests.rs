//! Weekly and monthly insights, rule files and split-aware imports

use chrono::NaiveDate;
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

use liftrs::import::{BulkImporter, RowOutcome};
use liftrs::rules::load_templates_from_file;
use liftrs::store::LogStore;
use liftrs::{
    ContextFields, ContextValue, Database, Goal, Insights, LogEntry, ModelArtifacts, MonthKey,
    RecoveryPredictor, SplitSession, SplitTemplate, SplitType, UserProfile,
};

const RULES: &str = r#"[
  {
    "id": "busy-week-short-sleep",
    "description": "Three or more sessions on under 7h average sleep",
    "conditions": [
      {"field": "weekly_sessions", "operator": ">=", "value": 3},
      {"field": "avg_sleep_h", "operator": "<", "value": 7}
    ],
    "advice": "Training volume is outpacing sleep this week",
    "timeframe": "weekly"
  },
  {
    "id": "cut-on-track",
    "description": "A quarter of the way to the target weight",
    "conditions": [{"field": "pct_to_target", "operator": ">=", "value": 25}],
    "advice": "Cut is on track",
    "for_goals": ["cutting"],
    "timeframe": "monthly"
  },
  {
    "id": "bulk-on-track",
    "description": "Same check for bulking users",
    "conditions": [{"field": "pct_to_target", "operator": ">=", "value": 25}],
    "advice": "Bulk is on track",
    "for_goals": ["bulking"],
    "timeframe": "monthly"
  }
]"#;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn setup() -> Database {
    let db = Database::in_memory().unwrap();
    let user = UserProfile {
        weight: Some(80.0),
        weight_target: Some(75.0),
        goal: Some(Goal::Cutting),
        split_template_id: Some("ppl".to_string()),
        ..UserProfile::new("u1")
    };
    db.upsert_user(&user).unwrap();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(RULES.as_bytes()).unwrap();
    for rule in load_templates_from_file(file.path()).unwrap() {
        db.upsert_rule(&rule).unwrap();
    }
    db
}

fn session_log(day: u32, hours_from: &str) -> LogEntry {
    LogEntry {
        trained: true,
        sleep_start: Some(hours_from.to_string()),
        sleep_end: Some("06:00".to_string()),
        sleep_quality: Some(3),
        ..LogEntry::empty("u1", date(day))
    }
}

fn predictor(dir: &TempDir) -> RecoveryPredictor {
    let artifact = serde_json::json!({
        "feature_names_in": ["sleep_h", "split_type"],
        "numeric": {"columns": ["sleep_h"], "medians": [7.0], "means": [7.0], "scales": [1.0]},
        "categorical": {"columns": ["split_type"], "categories": [["cardio", "strength"]]},
        "layers": [{"weights": [[1.0, 0.0, 1.0]], "bias": [0.0]}],
        "y_mean": 70.0,
        "y_std": 10.0,
        "global_mean": 70.0,
        "all_muscles": []
    });
    std::fs::write(
        dir.path().join("recovery_model.json"),
        serde_json::to_vec(&artifact).unwrap(),
    )
    .unwrap();
    let artifacts = ModelArtifacts::load_from_dir(dir.path()).unwrap();
    RecoveryPredictor::new(Arc::new(artifacts))
}

#[test]
fn test_rule_file_rejects_unknown_operator() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"[{"id": "x", "description": "", "conditions": [{"field": "hrv", "operator": "~", "value": 1}],
              "advice": "a", "timeframe": "daily"}]"#,
    )
    .unwrap();
    assert!(load_templates_from_file(file.path()).is_err());
}

#[test]
fn test_weekly_insight_fires_combined_rule() {
    let db = setup();
    for day in [2, 4, 6] {
        db.upsert_log(&session_log(day, "00:00")).unwrap();
    }
    // Outside the window ending on the 8th
    db.upsert_log(&session_log(1, "22:00")).unwrap();

    let insight = Insights::new(&db).weekly("u1", date(8)).unwrap();
    assert_eq!(insight.context.field("weekly_sessions"), Some(ContextValue::Number(3.0)));
    assert_eq!(insight.context.field("avg_sleep_h"), Some(ContextValue::Number(6.0)));
    assert_eq!(
        insight.alerts,
        vec!["Training volume is outpacing sleep this week".to_string()]
    );
}

#[test]
fn test_weekly_insight_quiet_with_enough_sleep() {
    let db = setup();
    for day in [2, 4, 6] {
        db.upsert_log(&session_log(day, "22:30")).unwrap();
    }

    let insight = Insights::new(&db).weekly("u1", date(8)).unwrap();
    assert!(insight.alerts.is_empty());
}

#[test]
fn test_monthly_insight_tracks_weight_progress() {
    let db = setup();
    for (day, weight) in [(1, 80.0), (12, 79.0), (20, 78.0)] {
        let log = LogEntry {
            weight: Some(weight),
            ..LogEntry::empty("u1", date(day))
        };
        db.upsert_log(&log).unwrap();
    }

    let month = MonthKey::parse("2026-03").unwrap();
    let insight = Insights::new(&db).monthly("u1", month).unwrap();
    assert_eq!(insight.context.field("pct_to_target"), Some(ContextValue::Number(40.0)));
    assert_eq!(insight.alerts, vec!["Cut is on track".to_string()]);
}

#[test]
fn test_import_canonicalizes_and_infers_sessions() {
    let db = setup();
    let template = SplitTemplate {
        id: "ppl".to_string(),
        name: "Push Pull Legs".to_string(),
        split_type: SplitType::Strength,
        user_id: None,
    };
    let sessions: Vec<SplitSession> = [("Push", "Chest"), ("Pull", "Back"), ("Legs", "Quads")]
        .iter()
        .map(|(name, muscle)| SplitSession {
            template_id: "ppl".to_string(),
            name: name.to_string(),
            muscle_groups: vec![muscle.to_string()],
        })
        .collect();
    db.upsert_split_template(&template, &sessions).unwrap();

    let mut named = session_log(2, "22:00");
    named.split = Some(" push ".to_string());
    // 2026-03-04 is a Wednesday, the third session
    let unnamed = session_log(4, "22:00");
    let mut unknown = session_log(5, "22:00");
    unknown.split = Some("Arms".to_string());

    let dir = TempDir::new().unwrap();
    let predictor = predictor(&dir);
    let (summary, outcomes) = BulkImporter::new(&predictor)
        .import(&db, "u1", vec![named, unnamed, unknown])
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);
    assert!(matches!(outcomes[2], RowOutcome::Error(_)));

    assert_eq!(db.get_log("u1", date(2)).unwrap().unwrap().split.as_deref(), Some("Push"));
    let inferred = db.get_log("u1", date(4)).unwrap().unwrap();
    assert_eq!(inferred.split.as_deref(), Some("Legs"));
    assert_eq!(inferred.split_template_id.as_deref(), Some("ppl"));

    // Rejected before storage
    assert!(db.get_log("u1", date(5)).unwrap().is_none());
}
