use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{RiskError, RiskResult};

pub const FEATURE_COLUMNS: [&str; 5] = [
    "rainfall_mm",
    "river_level_m",
    "soil_moisture_pct",
    "elevation_m",
    "drainage_capacity",
];

pub const LABEL_COLUMN: &str = "flood_occurred";

// Probabilities at or below this value never raise an alert.
pub const VIGILANCE_THRESHOLD: f64 = 0.4;
pub const CRITICAL_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub rainfall_mm: f64,
    pub river_level_m: f64,
    pub soil_moisture_pct: f64,
    pub elevation_m: f64,
    pub drainage_capacity: f64,
}

impl FeatureVector {
    pub fn value(&self, column: &str) -> Option<f64> {
        match column {
            "rainfall_mm" => Some(self.rainfall_mm),
            "river_level_m" => Some(self.river_level_m),
            "soil_moisture_pct" => Some(self.soil_moisture_pct),
            "elevation_m" => Some(self.elevation_m),
            "drainage_capacity" => Some(self.drainage_capacity),
            _ => None,
        }
    }

    pub fn to_row(&self) -> [f64; 5] {
        FEATURE_COLUMNS.map(|column| self.value(column).unwrap_or(f64::NAN))
    }

    pub fn validate(&self) -> RiskResult<()> {
        for column in FEATURE_COLUMNS {
            let value = self.value(column).unwrap_or(f64::NAN);
            if !value.is_finite() {
                return Err(RiskError::Validation(format!(
                    "{column} must be a finite number, got {value}"
                )));
            }
        }
        if self.rainfall_mm < 0.0 {
            return Err(RiskError::Validation(format!(
                "rainfall_mm must be >= 0, got {}",
                self.rainfall_mm
            )));
        }
        if self.river_level_m < 0.0 {
            return Err(RiskError::Validation(format!(
                "river_level_m must be >= 0, got {}",
                self.river_level_m
            )));
        }
        if !(0.0..=100.0).contains(&self.soil_moisture_pct) {
            return Err(RiskError::Validation(format!(
                "soil_moisture_pct must be within [0, 100], got {}",
                self.soil_moisture_pct
            )));
        }
        if self.drainage_capacity <= 0.0 || self.drainage_capacity > 1.0 {
            return Err(RiskError::Validation(format!(
                "drainage_capacity must be within (0, 1], got {}",
                self.drainage_capacity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub flood_occurred: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub drainage_capacity: f64,
    pub population: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTier {
    Normal,
    Vigilance,
    Critical,
}

impl AlertTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability > CRITICAL_THRESHOLD {
            AlertTier::Critical
        } else if probability > VIGILANCE_THRESHOLD {
            AlertTier::Vigilance
        } else {
            AlertTier::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertTier::Normal => "NORMAL",
            AlertTier::Vigilance => "VIGILANCE",
            AlertTier::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    pub zone_name: String,
    pub features: FeatureVector,
    pub probability: f64,
    pub alert_tier: AlertTier,
    pub exposed_population: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub zone_name: String,
    pub probability: f64,
    pub rainfall_mm: f64,
}

impl HistoryRecord {
    pub fn from_result(result: &ScoringResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: result.timestamp,
            zone_name: result.zone_name.clone(),
            probability: result.probability,
            rainfall_mm: result.features.rainfall_mm,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneSummary {
    pub zone_name: String,
    pub count: usize,
    pub avg_probability: f64,
    pub max_probability: f64,
}
