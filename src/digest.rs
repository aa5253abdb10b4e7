//! Micro-tips and the insight/digest service
//!
//! Micro-tips are a fixed battery of nutrition, sleep and heart checks over a
//! daily context. They do not depend on stored rule templates.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{
    build_daily_context, build_monthly_context, build_weekly_context, Context, ContextFields,
    ContextValue, DailyContext, MonthKey,
};
use crate::error::{DatabaseError, LiftError, Result};
use crate::models::UserProfile;
use crate::rules::{RuleEngine, Timeframe};
use crate::store::{LogStore, RuleStore, UserStore};

/// Minimum sleep before a tip fires
pub const SLEEP_TARGET_H: f64 = 7.0;

/// HRV below this (ms) is considered low
pub const LOW_HRV_MS: f64 = 50.0;

/// Resting heart rate above this (bpm) is considered elevated
pub const HIGH_RESTING_HR: f64 = 70.0;

/// Allowed calorie deviation from maintenance, in percent
pub const CALORIE_TOLERANCE_PCT: f64 = 5.0;

fn present(ctx: &DailyContext, field: &str) -> Option<f64> {
    ctx.field(field)
        .filter(|v| !v.is_sentinel())
        .as_ref()
        .and_then(ContextValue::as_f64)
}

/// Short nudges for one day, in a fixed order
///
/// Every check is skipped when its signal is absent or zero. The calorie check
/// additionally needs logged calories and a maintenance target on the profile.
pub fn micro_tips(ctx: &DailyContext, user: &UserProfile) -> Vec<String> {
    let mut tips = Vec::new();

    if let Some(pct) = present(ctx, "protein_pct").filter(|p| *p < 100.0) {
        tips.push(format!(
            "You hit only {:.0}% of your protein goal. Try adding more protein sources.",
            pct
        ));
    }
    if let Some(pct) = present(ctx, "carbs_pct").filter(|p| *p < 100.0) {
        tips.push(format!(
            "Carbs were at {:.0}% of target. Consider a healthy carb snack.",
            pct
        ));
    }
    if let Some(pct) = present(ctx, "fat_pct").filter(|p| *p < 100.0) {
        tips.push(format!(
            "Fat intake was {:.0}% of target. Remember your essential fats.",
            pct
        ));
    }

    let calories_logged = present(ctx, "calories").is_some();
    if calories_logged && user.maintenance_calories.unwrap_or(0) > 0 {
        if let Some(deviation) = present(ctx, "cal_deficit_pct").map(|d| d * 100.0) {
            if deviation < -CALORIE_TOLERANCE_PCT {
                tips.push(format!(
                    "Calories were {:.0}% below maintenance. Eat a bit more if you're low on energy.",
                    deviation.abs()
                ));
            } else if deviation > CALORIE_TOLERANCE_PCT {
                tips.push(format!(
                    "Calories were {:.0}% above maintenance. Watch for surplus if fat loss is the goal.",
                    deviation
                ));
            }
        }
    }

    if let Some(hours) = present(ctx, "sleep_h").filter(|h| *h < SLEEP_TARGET_H) {
        tips.push(format!(
            "Only slept {:.1}h. Aim for at least 7h tonight for better recovery.",
            hours
        ));
    }
    if let Some(hrv) = present(ctx, "hrv").filter(|h| *h < LOW_HRV_MS) {
        tips.push(format!(
            "Your HRV is low ({:.0} ms). Consider extra rest or light activity today.",
            hrv
        ));
    }
    if let Some(hr) = present(ctx, "resting_hr").filter(|h| *h > HIGH_RESTING_HR) {
        tips.push(format!(
            "Resting heart rate is elevated ({:.0} bpm). Keep an eye on stress and recovery.",
            hr
        ));
    }

    tips
}

/// A context together with the rule advice it triggered
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub context: Context,
    pub alerts: Vec<String>,
}

/// Rule alerts and micro-tips for one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyDigest {
    pub date: NaiveDate,
    pub alerts: Vec<String>,
    pub micro_tips: Vec<String>,
}

impl DailyDigest {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.micro_tips.is_empty()
    }
}

/// Builds insights and digests for stored users
pub struct Insights<'a, S> {
    store: &'a S,
}

impl<'a, S> Insights<'a, S>
where
    S: LogStore + UserStore + RuleStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn user(&self, user_id: &str) -> Result<UserProfile> {
        self.store.get_user(user_id)?.ok_or_else(|| {
            LiftError::Database(DatabaseError::NotFound {
                table: "users".to_string(),
                id: user_id.to_string(),
            })
        })
    }

    fn insight(&self, user: &UserProfile, context: Context) -> Result<Insight> {
        let alerts = RuleEngine::new(self.store).evaluate(&context, context.timeframe(), user)?;
        Ok(Insight { context, alerts })
    }

    pub fn daily(&self, user_id: &str, date: NaiveDate) -> Result<Insight> {
        let user = self.user(user_id)?;
        let ctx = build_daily_context(&user, date, self.store)?;
        self.insight(&user, Context::Daily(ctx))
    }

    pub fn weekly(&self, user_id: &str, end_date: NaiveDate) -> Result<Insight> {
        let user = self.user(user_id)?;
        let ctx = build_weekly_context(&user, end_date, self.store)?;
        self.insight(&user, Context::Weekly(ctx))
    }

    pub fn monthly(&self, user_id: &str, month: MonthKey) -> Result<Insight> {
        let user = self.user(user_id)?;
        let ctx = build_monthly_context(&user, month, self.store)?;
        self.insight(&user, Context::Monthly(ctx))
    }

    /// Alerts and micro-tips for one day; a day with no data yields an empty digest
    pub fn daily_digest(&self, user_id: &str, date: NaiveDate) -> Result<DailyDigest> {
        let user = self.user(user_id)?;
        let ctx = build_daily_context(&user, date, self.store)?;

        if ctx.is_empty() {
            debug!(user_id, %date, "Empty day, skipping digest");
            return Ok(DailyDigest {
                date,
                alerts: Vec::new(),
                micro_tips: Vec::new(),
            });
        }

        let alerts = RuleEngine::new(self.store).evaluate(&ctx, Timeframe::Daily, &user)?;
        let micro_tips = micro_tips(&ctx, &user);
        info!(
            user_id,
            %date,
            alerts = alerts.len(),
            tips = micro_tips.len(),
            "Built daily digest"
        );

        Ok(DailyDigest {
            date,
            alerts,
            micro_tips,
        })
    }
}
