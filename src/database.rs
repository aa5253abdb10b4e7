use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{
    LogEntry, MacroGrams, RecoveryPrediction, Soreness, SplitSession, SplitTemplate, SplitType,
    UserHead, UserProfile,
};
use crate::rules::{Condition, RuleTemplate, Timeframe};
use crate::store::{
    LogStore, PredictionStore, RuleStore, SplitStore, UpsertOutcome, UserHeadStore, UserStore,
};

const LOG_COLUMNS: &str = r#"
    user_id, date, trained, split, split_template_id, total_sets, failure_sets, total_rir,
    sleep_start, sleep_end, sleep_quality, resting_hr, hrv, soreness, stress, motivation,
    calories, macros, water_intake_l, weight, muscle_groups, recovery_rating
"#;

const USER_COLUMNS: &str = r#"
    id, age, sex, height, height_unit, weight, weight_unit, goal, activity_level,
    weight_target, weight_target_unit, maintenance_calories, macro_targets, split_template_id
"#;

/// Database connection and management
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<()> {
        // journal_mode answers with a row, so it cannot go through pragma_update
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                age INTEGER,
                sex TEXT,
                height REAL,
                height_unit TEXT NOT NULL DEFAULT 'cm',
                weight REAL,
                weight_unit TEXT NOT NULL DEFAULT 'kg',
                goal TEXT,
                activity_level TEXT,
                weight_target REAL,
                weight_target_unit TEXT NOT NULL DEFAULT 'kg',
                maintenance_calories INTEGER,
                macro_targets TEXT,
                split_template_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS daily_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                date DATE NOT NULL,
                trained INTEGER NOT NULL DEFAULT 0,
                split TEXT,
                split_template_id TEXT,
                total_sets INTEGER,
                failure_sets INTEGER,
                total_rir INTEGER,
                sleep_start TEXT,
                sleep_end TEXT,
                sleep_quality INTEGER,
                resting_hr INTEGER,
                hrv REAL,
                soreness TEXT,
                stress INTEGER,
                motivation INTEGER,
                calories INTEGER,
                macros TEXT,
                water_intake_l REAL,
                weight REAL,
                muscle_groups TEXT,
                recovery_rating REAL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, date)
            );

            CREATE TABLE IF NOT EXISTS split_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                split_type TEXT NOT NULL,
                user_id TEXT
            );

            CREATE TABLE IF NOT EXISTS split_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id TEXT NOT NULL REFERENCES split_templates(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                muscle_groups TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS rule_templates (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                conditions TEXT NOT NULL,
                advice TEXT NOT NULL,
                for_goals TEXT,
                timeframe TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_recovery_heads (
                user_id TEXT PRIMARY KEY,
                bias REAL NOT NULL,
                slope REAL NOT NULL DEFAULT 1.0
            );

            CREATE TABLE IF NOT EXISTS recovery_predictions (
                user_id TEXT NOT NULL,
                date DATE NOT NULL,
                score REAL NOT NULL,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_daily_logs_user_date ON daily_logs(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_split_sessions_template ON split_sessions(template_id);
            CREATE INDEX IF NOT EXISTS idx_rule_templates_timeframe ON rule_templates(timeframe);
            "#,
        )?;

        Ok(())
    }

    /// Insert or replace a user profile
    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (
                id, age, sex, height, height_unit, weight, weight_unit, goal, activity_level,
                weight_target, weight_target_unit, maintenance_calories, macro_targets,
                split_template_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                age = excluded.age,
                sex = excluded.sex,
                height = excluded.height,
                height_unit = excluded.height_unit,
                weight = excluded.weight,
                weight_unit = excluded.weight_unit,
                goal = excluded.goal,
                activity_level = excluded.activity_level,
                weight_target = excluded.weight_target,
                weight_target_unit = excluded.weight_target_unit,
                maintenance_calories = excluded.maintenance_calories,
                macro_targets = excluded.macro_targets,
                split_template_id = excluded.split_template_id,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                user.id,
                user.age,
                user.sex.map(|s| s.as_str()),
                user.height,
                user.height_unit.as_str(),
                user.weight,
                user.weight_unit.as_str(),
                user.goal.map(|g| g.as_str()),
                user.activity_level.map(|a| a.as_str()),
                user.weight_target,
                user.weight_target_unit.as_str(),
                user.maintenance_calories,
                to_json_opt(user.macro_targets.as_ref())?,
                user.split_template_id,
            ],
        )?;
        Ok(())
    }

    /// Store a split template and replace its sessions
    pub fn upsert_split_template(
        &self,
        template: &SplitTemplate,
        sessions: &[SplitSession],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO split_templates (id, name, split_type, user_id) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                split_type = excluded.split_type,
                user_id = excluded.user_id
            "#,
            params![
                template.id,
                template.name,
                template.split_type.as_str(),
                template.user_id,
            ],
        )?;
        tx.execute(
            "DELETE FROM split_sessions WHERE template_id = ?1",
            params![template.id],
        )?;
        for session in sessions {
            tx.execute(
                "INSERT INTO split_sessions (template_id, name, muscle_groups) VALUES (?1, ?2, ?3)",
                params![template.id, session.name, to_json(&session.muscle_groups)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Validate and store a rule template, keeping its position on update
    pub fn upsert_rule(&self, rule: &RuleTemplate) -> Result<()> {
        rule.validate()?;
        self.conn.execute(
            r#"
            INSERT INTO rule_templates (id, description, conditions, advice, for_goals, timeframe)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                conditions = excluded.conditions,
                advice = excluded.advice,
                for_goals = excluded.for_goals,
                timeframe = excluded.timeframe
            "#,
            params![
                rule.id,
                rule.description,
                to_json(&rule.conditions)?,
                rule.advice,
                to_json_opt(rule.for_goals.as_ref())?,
                rule.timeframe.as_str(),
            ],
        )?;
        Ok(())
    }

    /// One rule template by id
    pub fn get_rule(&self, rule_id: &str) -> Result<Option<RuleTemplate>> {
        let rule = self
            .conn
            .query_row(
                r#"
                SELECT id, description, conditions, advice, for_goals, timeframe
                FROM rule_templates WHERE id = ?1
                "#,
                params![rule_id],
                rule_from_row,
            )
            .optional()?;
        Ok(rule)
    }

    /// All rule templates in storage order
    pub fn list_rules(&self) -> Result<Vec<RuleTemplate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, description, conditions, advice, for_goals, timeframe
            FROM rule_templates ORDER BY rowid
            "#,
        )?;
        let rules = stmt
            .query_map([], rule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    /// Delete a rule template, returning whether it existed
    pub fn delete_rule(&self, rule_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM rule_templates WHERE id = ?1", params![rule_id])?;
        Ok(deleted > 0)
    }

    /// Insert or replace a user's learned head
    pub fn upsert_head(&self, user_id: &str, head: &UserHead) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO user_recovery_heads (user_id, bias, slope) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET bias = excluded.bias, slope = excluded.slope
            "#,
            params![user_id, head.bias, head.slope],
        )?;
        Ok(())
    }

    /// Number of stored predictions for a user
    pub fn prediction_count(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recovery_predictions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl LogStore for Database {
    fn get_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM daily_logs WHERE user_id = ?1 AND date = ?2",
            LOG_COLUMNS
        );
        let log = self
            .conn
            .query_row(&sql, params![user_id, date], log_from_row)
            .optional()?;
        Ok(log)
    }

    fn logs_between(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM daily_logs WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date ASC",
            LOG_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![user_id, start, end], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn recent_logs(&self, user_id: &str, up_to: NaiveDate, limit: usize) -> Result<Vec<LogEntry>> {
        let sql = format!(
            "SELECT {} FROM daily_logs WHERE user_id = ?1 AND date <= ?2 ORDER BY date DESC LIMIT ?3",
            LOG_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![user_id, up_to, limit as i64], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn mean_recovery_rating(&self, user_id: &str) -> Result<Option<f64>> {
        let mean: Option<f64> = self.conn.query_row(
            "SELECT AVG(recovery_rating) FROM daily_logs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(mean)
    }

    fn upsert_log(&self, entry: &LogEntry) -> Result<UpsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM daily_logs WHERE user_id = ?1 AND date = ?2",
                params![entry.user_id, entry.date],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            r#"
            INSERT INTO daily_logs (
                id, user_id, date, trained, split, split_template_id, total_sets, failure_sets,
                total_rir, sleep_start, sleep_end, sleep_quality, resting_hr, hrv, soreness,
                stress, motivation, calories, macros, water_intake_l, weight, muscle_groups,
                recovery_rating
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                ?19, ?20, ?21, ?22, ?23
            )
            ON CONFLICT(user_id, date) DO UPDATE SET
                trained = excluded.trained,
                split = excluded.split,
                split_template_id = excluded.split_template_id,
                total_sets = excluded.total_sets,
                failure_sets = excluded.failure_sets,
                total_rir = excluded.total_rir,
                sleep_start = excluded.sleep_start,
                sleep_end = excluded.sleep_end,
                sleep_quality = excluded.sleep_quality,
                resting_hr = excluded.resting_hr,
                hrv = excluded.hrv,
                soreness = excluded.soreness,
                stress = excluded.stress,
                motivation = excluded.motivation,
                calories = excluded.calories,
                macros = excluded.macros,
                water_intake_l = excluded.water_intake_l,
                weight = excluded.weight,
                muscle_groups = excluded.muscle_groups,
                recovery_rating = excluded.recovery_rating,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                Uuid::new_v4().to_string(),
                entry.user_id,
                entry.date,
                entry.trained,
                entry.split,
                entry.split_template_id,
                entry.total_sets,
                entry.failure_sets,
                entry.total_rir,
                entry.sleep_start,
                entry.sleep_end,
                entry.sleep_quality,
                entry.resting_hr,
                entry.hrv,
                to_json_opt(entry.soreness.as_ref())?,
                entry.stress,
                entry.motivation,
                entry.calories,
                to_json_opt(entry.macros.as_ref())?,
                entry.water_intake_l,
                entry.weight,
                to_json(&entry.muscle_groups)?,
                entry.recovery_rating,
            ],
        )?;
        tx.commit()?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(user_id = %entry.user_id, date = %entry.date, ?outcome, "Upserted daily log");
        Ok(outcome)
    }
}

impl UserStore for Database {
    fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let user = self
            .conn
            .query_row(&sql, params![user_id], user_from_row)
            .optional()?;
        Ok(user)
    }
}

impl SplitStore for Database {
    fn template(&self, template_id: &str) -> Result<Option<SplitTemplate>> {
        let template = self
            .conn
            .query_row(
                "SELECT id, name, split_type, user_id FROM split_templates WHERE id = ?1",
                params![template_id],
                |row| {
                    let split_type: String = row.get("split_type")?;
                    Ok(SplitTemplate {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        split_type: SplitType::from_str(&split_type).map_err(|e| {
                            conversion_error(2, DatabaseError::Serialization(e))
                        })?,
                        user_id: row.get("user_id")?,
                    })
                },
            )
            .optional()?;
        Ok(template)
    }

    fn sessions_for_template(&self, template_id: &str) -> Result<Vec<SplitSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT template_id, name, muscle_groups FROM split_sessions WHERE template_id = ?1 ORDER BY id",
        )?;
        let sessions = stmt
            .query_map(params![template_id], |row| {
                Ok(SplitSession {
                    template_id: row.get("template_id")?,
                    name: row.get("name")?,
                    muscle_groups: from_json(row.get("muscle_groups")?).unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }
}

impl RuleStore for Database {
    fn rules_for_timeframe(&self, timeframe: Timeframe) -> Result<Vec<RuleTemplate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, description, conditions, advice, for_goals, timeframe
            FROM rule_templates WHERE timeframe = ?1 ORDER BY rowid
            "#,
        )?;
        let rules = stmt
            .query_map(params![timeframe.as_str()], rule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }
}

impl UserHeadStore for Database {
    fn head(&self, user_id: &str) -> Result<Option<UserHead>> {
        let head = self
            .conn
            .query_row(
                "SELECT bias, slope FROM user_recovery_heads WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserHead {
                        bias: row.get(0)?,
                        slope: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(head)
    }
}

impl PredictionStore for Database {
    fn upsert_prediction(&self, prediction: &RecoveryPrediction) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO recovery_predictions (user_id, date, score, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, date) DO UPDATE SET
                score = excluded.score,
                created_at = excluded.created_at
            "#,
            params![
                prediction.user_id,
                prediction.date,
                prediction.score,
                prediction.created_at,
            ],
        )?;
        Ok(())
    }

    fn prediction(&self, user_id: &str, date: NaiveDate) -> Result<Option<RecoveryPrediction>> {
        let prediction = self
            .conn
            .query_row(
                r#"
                SELECT user_id, date, score, created_at FROM recovery_predictions
                WHERE user_id = ?1 AND date = ?2
                "#,
                params![user_id, date],
                prediction_from_row,
            )
            .optional()?;
        Ok(prediction)
    }

    fn predictions_between(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RecoveryPrediction>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, date, score, created_at FROM recovery_predictions
            WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date ASC
            "#,
        )?;
        let predictions = stmt
            .query_map(params![user_id, start, end], prediction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(predictions)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| DatabaseError::Serialization(e.to_string()).into())
}

fn to_json_opt<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value.map(to_json).transpose()
}

/// Malformed stored JSON reads as `None`
fn from_json<T: DeserializeOwned>(text: Option<String>) -> Option<T> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}

/// Unknown enum labels read as `None`
fn parse_label<T: FromStr>(text: Option<String>) -> Option<T> {
    text.and_then(|t| t.parse().ok())
}

fn conversion_error(column: usize, err: DatabaseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn log_from_row(row: &Row) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        user_id: row.get("user_id")?,
        date: row.get("date")?,
        trained: row.get("trained")?,
        split: row.get("split")?,
        split_template_id: row.get("split_template_id")?,
        total_sets: row.get("total_sets")?,
        failure_sets: row.get("failure_sets")?,
        total_rir: row.get("total_rir")?,
        sleep_start: row.get("sleep_start")?,
        sleep_end: row.get("sleep_end")?,
        sleep_quality: row.get("sleep_quality")?,
        resting_hr: row.get("resting_hr")?,
        hrv: row.get("hrv")?,
        soreness: from_json::<Soreness>(row.get("soreness")?),
        stress: row.get("stress")?,
        motivation: row.get("motivation")?,
        calories: row.get("calories")?,
        macros: from_json::<MacroGrams>(row.get("macros")?),
        water_intake_l: row.get("water_intake_l")?,
        weight: row.get("weight")?,
        muscle_groups: from_json(row.get("muscle_groups")?).unwrap_or_default(),
        recovery_rating: row.get("recovery_rating")?,
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get("id")?,
        age: row.get("age")?,
        sex: parse_label(row.get("sex")?),
        height: row.get("height")?,
        height_unit: parse_label(row.get("height_unit")?).unwrap_or_default(),
        weight: row.get("weight")?,
        weight_unit: parse_label(row.get("weight_unit")?).unwrap_or_default(),
        goal: parse_label(row.get("goal")?),
        activity_level: parse_label(row.get("activity_level")?),
        weight_target: row.get("weight_target")?,
        weight_target_unit: parse_label(row.get("weight_target_unit")?).unwrap_or_default(),
        maintenance_calories: row.get("maintenance_calories")?,
        macro_targets: from_json(row.get("macro_targets")?),
        split_template_id: row.get("split_template_id")?,
    })
}

fn rule_from_row(row: &Row) -> rusqlite::Result<RuleTemplate> {
    let timeframe: String = row.get("timeframe")?;
    let conditions: String = row.get("conditions")?;
    Ok(RuleTemplate {
        id: row.get("id")?,
        description: row.get("description")?,
        conditions: serde_json::from_str::<Vec<Condition>>(&conditions)
            .map_err(|e| conversion_error(2, DatabaseError::Serialization(e.to_string())))?,
        advice: row.get("advice")?,
        for_goals: from_json(row.get("for_goals")?),
        timeframe: timeframe
            .parse()
            .map_err(|e: crate::error::RuleError| {
                conversion_error(5, DatabaseError::Serialization(e.to_string()))
            })?,
    })
}

fn prediction_from_row(row: &Row) -> rusqlite::Result<RecoveryPrediction> {
    Ok(RecoveryPrediction {
        user_id: row.get("user_id")?,
        date: row.get("date")?,
        score: row.get("score")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Goal;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path).unwrap();
        assert!(db.get_user("nobody").unwrap().is_none());
        assert!(db_path.exists());
    }

    #[test]
    fn test_user_roundtrip() {
        let db = Database::in_memory().unwrap();
        let mut user = UserProfile::new("u1");
        user.goal = Some(Goal::Bulking);
        user.macro_targets = Some(MacroGrams::new(170.0, 320.0, 80.0));
        db.upsert_user(&user).unwrap();
        assert_eq!(db.get_user("u1").unwrap(), Some(user.clone()));

        user.maintenance_calories = Some(2700);
        db.upsert_user(&user).unwrap();
        assert_eq!(db.get_user("u1").unwrap().unwrap().maintenance_calories, Some(2700));
    }

    #[test]
    fn test_log_upsert_reports_outcome() {
        let db = Database::in_memory().unwrap();
        let mut entry = LogEntry::empty("u1", date(12));
        entry.soreness = Some(Soreness::scalar(2.0));
        entry.recovery_rating = Some(80.0);

        assert_eq!(db.upsert_log(&entry).unwrap(), UpsertOutcome::Inserted);
        entry.recovery_rating = Some(60.0);
        assert_eq!(db.upsert_log(&entry).unwrap(), UpsertOutcome::Updated);

        let stored = db.get_log("u1", date(12)).unwrap().unwrap();
        assert_eq!(stored, entry);
        assert_eq!(db.mean_recovery_rating("u1").unwrap(), Some(60.0));
        assert_eq!(db.mean_recovery_rating("u2").unwrap(), None);
    }

    #[test]
    fn test_log_ranges() {
        let db = Database::in_memory().unwrap();
        for d in [10, 12, 11, 14] {
            db.upsert_log(&LogEntry::empty("u1", date(d))).unwrap();
        }
        db.upsert_log(&LogEntry::empty("u2", date(12))).unwrap();

        let between: Vec<_> = db
            .logs_between("u1", date(11), date(14))
            .unwrap()
            .into_iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(between, vec![date(11), date(12), date(14)]);

        let recent: Vec<_> = db
            .recent_logs("u1", date(13), 3)
            .unwrap()
            .into_iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(recent, vec![date(12), date(11), date(10)]);
    }

    #[test]
    fn test_rules_keep_storage_order() {
        let db = Database::in_memory().unwrap();
        for id in ["b", "a"] {
            db.upsert_rule(&RuleTemplate {
                id: id.to_string(),
                description: "d".to_string(),
                conditions: vec![Condition::new("hrv", "<", 50)],
                advice: format!("advice {}", id),
                for_goals: None,
                timeframe: Timeframe::Daily,
            })
            .unwrap();
        }
        let ids: Vec<_> = db
            .rules_for_timeframe(Timeframe::Daily)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(db.rules_for_timeframe(Timeframe::Weekly).unwrap().is_empty());
        assert_eq!(db.get_rule("a").unwrap().unwrap().advice, "advice a");
        assert!(db.get_rule("missing").unwrap().is_none());
        assert!(db.delete_rule("b").unwrap());
        assert!(db.get_rule("b").unwrap().is_none());
        assert!(!db.delete_rule("b").unwrap());
    }

    #[test]
    fn test_prediction_upsert_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let mut prediction = RecoveryPrediction {
            user_id: "u1".to_string(),
            date: date(12),
            score: 71.5,
            created_at: Utc::now(),
        };
        db.upsert_prediction(&prediction).unwrap();
        prediction.score = 73.0;
        db.upsert_prediction(&prediction).unwrap();

        assert_eq!(db.prediction_count("u1").unwrap(), 1);
        assert_eq!(db.prediction("u1", date(12)).unwrap().unwrap().score, 73.0);
    }

    #[test]
    fn test_split_sessions_in_order() {
        let db = Database::in_memory().unwrap();
        let template = SplitTemplate {
            id: "ppl".to_string(),
            name: "Push Pull Legs".to_string(),
            split_type: SplitType::Strength,
            user_id: None,
        };
        let sessions: Vec<_> = ["Push", "Pull", "Legs"]
            .iter()
            .map(|n| SplitSession {
                template_id: "ppl".to_string(),
                name: n.to_string(),
                muscle_groups: vec!["Chest".to_string()],
            })
            .collect();
        db.upsert_split_template(&template, &sessions).unwrap();
        db.upsert_split_template(&template, &sessions).unwrap();

        assert_eq!(db.template("ppl").unwrap(), Some(template));
        assert_eq!(db.sessions_for_template("ppl").unwrap(), sessions);
    }
}
