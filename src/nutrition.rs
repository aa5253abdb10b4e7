//! Calorie and macro targets derived from the user profile
//!
//! Maintenance calories come from the Mifflin-St Jeor BMR scaled by activity
//! level, then shifted toward the weight target. Macro targets are grams per
//! kilogram of current body weight, chosen by goal.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{LiftError, Result};
use crate::models::{ActivityLevel, Goal, MacroGrams, Sex, UserProfile};

/// Roughly 1100 kcal per week for each kilogram of desired change
pub const CAL_ADJUST_PER_KG: f64 = 1100.0 / 7.0;

/// Total daily energy expenditure multiplier
pub fn tdee_multiplier(level: Option<ActivityLevel>) -> f64 {
    match level {
        Some(ActivityLevel::Low) => 1.2,
        Some(ActivityLevel::High) => 1.55,
        Some(ActivityLevel::Moderate) | None => 1.375,
    }
}

/// Protein, carbs and fat in grams per kg of body weight
///
/// Profiles stored with the old "weight loss" goal parse as cutting and get
/// the cutting targets, not the maintenance fallback they once had.
pub fn macro_grams_per_kg(goal: Option<Goal>) -> MacroGrams {
    match goal {
        Some(Goal::Bulking) => MacroGrams::new(2.0, 4.0, 1.0),
        Some(Goal::Cutting) => MacroGrams::new(2.2, 2.5, 0.8),
        Some(Goal::Maintenance) | Some(Goal::Performance) | None => MacroGrams::new(1.8, 3.0, 0.8),
    }
}

/// Basal metabolic rate (Mifflin-St Jeor), kcal/day
pub fn bmr(sex: Sex, age: u32, weight_kg: f64, height_cm: f64) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age as f64;
    match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

/// Round half to even, as the targets were always rounded
fn round_even(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(0))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

/// Targets consumed by the daily context
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NutritionProfile {
    pub maintenance_calories: u32,
    pub macro_targets: MacroGrams,
}

impl NutritionProfile {
    /// Compute targets for a profile with sex, age, height and weight set
    pub fn for_user(user: &UserProfile) -> Result<Self> {
        let missing = |field: &str| {
            LiftError::Validation(format!(
                "Cannot compute nutrition targets for {}: {} is not set",
                user.id, field
            ))
        };
        let sex = user.sex.ok_or_else(|| missing("sex"))?;
        let age = user.age.ok_or_else(|| missing("age"))?;
        let weight_kg = user.weight_kg().ok_or_else(|| missing("weight"))?;
        let height_cm = user.height_cm().ok_or_else(|| missing("height"))?;

        let tdee = bmr(sex, age, weight_kg, height_cm) * tdee_multiplier(user.activity_level);
        let adjustment = user
            .weight_target
            .map(|t| (user.weight_target_unit.to_kg(t) - weight_kg) * CAL_ADJUST_PER_KG)
            .unwrap_or(0.0);

        let per_kg = macro_grams_per_kg(user.goal);
        Ok(NutritionProfile {
            maintenance_calories: round_even(tdee + adjustment).max(0.0) as u32,
            macro_targets: MacroGrams::new(
                round_even(per_kg.protein * weight_kg),
                round_even(per_kg.carbs * weight_kg),
                round_even(per_kg.fat * weight_kg),
            ),
        })
    }

    /// Write the targets onto the profile
    pub fn apply_to(&self, user: &mut UserProfile) {
        user.maintenance_calories = Some(self.maintenance_calories);
        user.macro_targets = Some(self.macro_targets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{HeightUnit, WeightUnit};

    fn profile() -> UserProfile {
        UserProfile {
            age: Some(30),
            sex: Some(Sex::Male),
            height: Some(180.0),
            weight: Some(80.0),
            activity_level: Some(ActivityLevel::Moderate),
            goal: Some(Goal::Maintenance),
            ..UserProfile::new("u1")
        }
    }

    #[test]
    fn test_weight_loss_label_gets_cutting_macros() {
        let goal: Goal = "Weight Loss".parse().unwrap();
        assert_eq!(goal, Goal::Cutting);
        assert_eq!(macro_grams_per_kg(Some(goal)), MacroGrams::new(2.2, 2.5, 0.8));
        assert_ne!(macro_grams_per_kg(Some(goal)), macro_grams_per_kg(None));
    }

    #[test]
    fn test_bmr() {
        assert_eq!(bmr(Sex::Male, 30, 80.0, 180.0), 1780.0);
        assert_eq!(bmr(Sex::Female, 30, 80.0, 180.0), 1614.0);
    }

    #[test]
    fn test_maintenance_profile() {
        let targets = NutritionProfile::for_user(&profile()).unwrap();
        // 1780 * 1.375 = 2447.5, rounds to even
        assert_eq!(targets.maintenance_calories, 2448);
        assert_eq!(targets.macro_targets, MacroGrams::new(144.0, 240.0, 64.0));
    }

    #[test]
    fn test_weight_target_shifts_calories() {
        let mut user = profile();
        user.weight_target = Some(75.0);
        let targets = NutritionProfile::for_user(&user).unwrap();
        // 2447.5 - 5 * 157.142857
        assert_eq!(targets.maintenance_calories, 1662);
    }

    #[test]
    fn test_imperial_units_and_goal() {
        let mut user = profile();
        user.height = Some(70.0);
        user.height_unit = HeightUnit::In;
        user.weight = Some(176.0);
        user.weight_unit = WeightUnit::Lb;
        user.goal = Some(Goal::Cutting);

        let targets = NutritionProfile::for_user(&user).unwrap();
        // 176 lb = 79.832192 kg
        assert_eq!(targets.macro_targets.protein, 176.0);
        assert_eq!(targets.macro_targets.fat, 64.0);
    }

    #[test]
    fn test_missing_fields() {
        let mut user = profile();
        user.age = None;
        assert!(NutritionProfile::for_user(&user).is_err());
    }

    #[test]
    fn test_apply_to_profile() {
        let mut user = profile();
        NutritionProfile::for_user(&user).unwrap().apply_to(&mut user);
        assert_eq!(user.maintenance_calories, Some(2448));
        assert!(user.macro_targets.is_some());
    }
}
