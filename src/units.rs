//! Unit normalization for body measurements
//!
//! Weights are normalized to kilograms and heights to centimeters before any
//! arithmetic that mixes fields. Every pound conversion in the crate goes
//! through [`LB_TO_KG`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kilograms per pound
pub const LB_TO_KG: f64 = 0.453592;

/// Centimeters per inch
pub const IN_TO_CM: f64 = 2.54;

/// Unit a weight value was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl WeightUnit {
    /// Convert a value in this unit to kilograms
    pub fn to_kg(&self, value: f64) -> f64 {
        match self {
            WeightUnit::Kg => value,
            WeightUnit::Lb => value * LB_TO_KG,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }
}

impl std::str::FromStr for WeightUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" | "kilograms" => Ok(WeightUnit::Kg),
            "lb" | "lbs" | "pounds" => Ok(WeightUnit::Lb),
            _ => Err(format!("Invalid weight unit: {}", s)),
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit a height value was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightUnit {
    #[default]
    Cm,
    In,
}

impl HeightUnit {
    /// Convert a value in this unit to centimeters
    pub fn to_cm(&self, value: f64) -> f64 {
        match self {
            HeightUnit::Cm => value,
            HeightUnit::In => value * IN_TO_CM,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HeightUnit::Cm => "cm",
            HeightUnit::In => "in",
        }
    }
}

impl std::str::FromStr for HeightUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cm" | "centimeters" => Ok(HeightUnit::Cm),
            "in" | "inch" | "inches" => Ok(HeightUnit::In),
            _ => Err(format!("Invalid height unit: {}", s)),
        }
    }
}

impl fmt::Display for HeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_conversion() {
        assert_eq!(WeightUnit::Kg.to_kg(80.0), 80.0);
        assert!((WeightUnit::Lb.to_kg(200.0) - 90.7184).abs() < 1e-9);
    }

    #[test]
    fn test_height_conversion() {
        assert_eq!(HeightUnit::Cm.to_cm(180.0), 180.0);
        assert!((HeightUnit::In.to_cm(70.0) - 177.8).abs() < 1e-9);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("LBS".parse::<WeightUnit>().unwrap(), WeightUnit::Lb);
        assert_eq!("kg".parse::<WeightUnit>().unwrap(), WeightUnit::Kg);
        assert_eq!("in".parse::<HeightUnit>().unwrap(), HeightUnit::In);
        assert!("stone".parse::<WeightUnit>().is_err());
    }
}
