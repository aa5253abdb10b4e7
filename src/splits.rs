//! Split session resolution
//!
//! A log names its session by free text ("push", "Legs 1"). Before storage the
//! name is matched against the user's split template; trained days without a
//! name get the session scheduled for that weekday.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::error::{LiftError, Result};
use crate::models::{LogEntry, SplitSession, SplitType, UserProfile};
use crate::store::SplitStore;

/// Session name as defined in the template, matched case-insensitively
pub fn canonical_session_name(sessions: &[SplitSession], manual: &str) -> Result<String> {
    let key = manual.trim().to_lowercase();
    sessions
        .iter()
        .find(|s| s.name.to_lowercase() == key)
        .map(|s| s.name.clone())
        .ok_or_else(|| LiftError::Validation(format!("Session '{}' not in template", manual)))
}

/// Session scheduled for `date`, rotating through the template by weekday
pub fn infer_session(sessions: &[SplitSession], date: NaiveDate) -> Option<&SplitSession> {
    if sessions.is_empty() {
        return None;
    }
    let weekday = date.weekday().num_days_from_monday() as usize;
    sessions.get(weekday % sessions.len())
}

/// Template a log refers to, falling back to the user's default
fn template_id<'a>(user: &'a UserProfile, log: &'a LogEntry) -> Option<&'a str> {
    log.split_template_id
        .as_deref()
        .or(user.split_template_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Canonicalize or infer the session of a log before it is stored
///
/// A manual session name must exist in the template. Trained days with no name
/// get the weekday's session and the template reference is recorded.
pub fn normalize_entry<S: SplitStore>(
    store: &S,
    user: &UserProfile,
    entry: &mut LogEntry,
) -> Result<()> {
    let Some(tpl_id) = template_id(user, entry).map(str::to_string) else {
        return Ok(());
    };

    let manual = entry.split.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if let Some(manual) = manual {
        let sessions = store.sessions_for_template(&tpl_id)?;
        entry.split = Some(canonical_session_name(&sessions, manual)?);
    } else if entry.trained {
        let sessions = store.sessions_for_template(&tpl_id)?;
        if let Some(session) = infer_session(&sessions, entry.date) {
            debug!(date = %entry.date, session = %session.name, "Inferred split session");
            entry.split = Some(session.name.clone());
            entry.split_template_id = Some(tpl_id);
        }
    }
    Ok(())
}

/// Split category and trained muscles for a day
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedSplit {
    pub split_type: Option<SplitType>,
    pub muscle_groups: Vec<String>,
}

/// Resolve the day's split category and muscle groups
///
/// Explicitly logged muscle groups win over the session definition.
pub fn resolve_day<S: SplitStore>(
    store: &S,
    user: &UserProfile,
    log: &LogEntry,
) -> Result<ResolvedSplit> {
    let mut resolved = ResolvedSplit {
        split_type: None,
        muscle_groups: log.muscle_groups.clone(),
    };

    let Some(tpl_id) = template_id(user, log) else {
        return Ok(resolved);
    };

    if let Some(template) = store.template(tpl_id)? {
        resolved.split_type = Some(template.split_type);
    }

    if resolved.muscle_groups.is_empty() {
        if let Some(name) = log.split.as_deref().filter(|s| !s.trim().is_empty()) {
            let key = name.trim().to_lowercase();
            resolved.muscle_groups = store
                .sessions_for_template(tpl_id)?
                .into_iter()
                .find(|s| s.name.to_lowercase() == key)
                .map(|s| s.muscle_groups)
                .unwrap_or_default();
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::SplitTemplate;

    fn sessions() -> Vec<SplitSession> {
        ["Push", "Pull", "Legs"]
            .iter()
            .map(|name| SplitSession {
                template_id: "ppl".to_string(),
                name: name.to_string(),
                muscle_groups: vec![format!("{} muscle", name)],
            })
            .collect()
    }

    #[test]
    fn test_canonical_session_name() {
        let sessions = sessions();
        assert_eq!(canonical_session_name(&sessions, " push ").unwrap(), "Push");
        assert_eq!(canonical_session_name(&sessions, "LEGS").unwrap(), "Legs");
        assert!(canonical_session_name(&sessions, "Arms").is_err());
    }

    #[test]
    fn test_infer_session_rotates_by_weekday() {
        let sessions = sessions();
        // 2025-07-14 is a Monday
        let monday = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
        assert_eq!(infer_session(&sessions, monday).unwrap().name, "Push");

        let thursday = NaiveDate::from_ymd_opt(2025, 7, 17).unwrap();
        assert_eq!(infer_session(&sessions, thursday).unwrap().name, "Push");

        let sunday = NaiveDate::from_ymd_opt(2025, 7, 20).unwrap();
        assert_eq!(infer_session(&sessions, sunday).unwrap().name, "Push");

        let saturday = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        assert_eq!(infer_session(&sessions, saturday).unwrap().name, "Legs");

        assert!(infer_session(&[], monday).is_none());
    }

    fn split_db() -> (Database, UserProfile) {
        let db = Database::in_memory().unwrap();
        let template = SplitTemplate {
            id: "ppl".to_string(),
            name: "Push Pull Legs".to_string(),
            split_type: SplitType::Strength,
            user_id: None,
        };
        db.upsert_split_template(&template, &sessions()).unwrap();
        let user = UserProfile {
            split_template_id: Some("ppl".to_string()),
            ..UserProfile::new("u1")
        };
        (db, user)
    }

    fn log(split: Option<&str>) -> LogEntry {
        LogEntry {
            trained: true,
            split: split.map(str::to_string),
            ..LogEntry::empty("u1", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap())
        }
    }

    #[test]
    fn test_resolve_day_uses_session_muscles() {
        let (db, user) = split_db();

        let resolved = resolve_day(&db, &user, &log(Some("pull"))).unwrap();
        assert_eq!(resolved.split_type, Some(SplitType::Strength));
        assert_eq!(resolved.muscle_groups, vec!["Pull muscle".to_string()]);
    }

    #[test]
    fn test_resolve_day_prefers_logged_muscles() {
        let (db, user) = split_db();
        let mut entry = log(Some("Push"));
        entry.muscle_groups = vec!["Calves".to_string()];

        let resolved = resolve_day(&db, &user, &entry).unwrap();
        assert_eq!(resolved.split_type, Some(SplitType::Strength));
        assert_eq!(resolved.muscle_groups, vec!["Calves".to_string()]);
    }

    #[test]
    fn test_resolve_day_without_session_or_template() {
        let (db, user) = split_db();

        // Template known, no session named
        let resolved = resolve_day(&db, &user, &log(None)).unwrap();
        assert_eq!(resolved.split_type, Some(SplitType::Strength));
        assert!(resolved.muscle_groups.is_empty());

        // Unknown session name resolves to no muscles
        let resolved = resolve_day(&db, &user, &log(Some("Arms"))).unwrap();
        assert!(resolved.muscle_groups.is_empty());

        let no_template = UserProfile::new("u2");
        let resolved = resolve_day(&db, &no_template, &log(Some("Push"))).unwrap();
        assert_eq!(resolved, ResolvedSplit::default());
    }

    #[test]
    fn test_log_template_overrides_user_default() {
        let (db, user) = split_db();
        let other = SplitTemplate {
            id: "cardio".to_string(),
            name: "Cardio".to_string(),
            split_type: SplitType::Cardio,
            user_id: None,
        };
        db.upsert_split_template(&other, &[]).unwrap();

        let mut entry = log(None);
        entry.split_template_id = Some("cardio".to_string());
        let resolved = resolve_day(&db, &user, &entry).unwrap();
        assert_eq!(resolved.split_type, Some(SplitType::Cardio));
    }
}
