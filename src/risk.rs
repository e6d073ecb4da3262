use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::RiskResult;
use crate::model::ProbabilityModel;
use crate::models::{AlertTier, FeatureVector, ScoringResult, Zone, VIGILANCE_THRESHOLD};
use crate::zones::ZoneRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveReading {
    pub rainfall_mm: f64,
    pub river_level_m: f64,
    pub soil_moisture_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorProfile {
    pub rainfall: f64,
    pub river_level: f64,
    pub soil_saturation: f64,
    pub drainage_deficit: f64,
}

pub struct RiskScorer<'a, M: ProbabilityModel> {
    registry: &'a ZoneRegistry,
    model: &'a M,
}

impl<'a, M: ProbabilityModel> RiskScorer<'a, M> {
    pub fn new(registry: &'a ZoneRegistry, model: &'a M) -> Self {
        Self { registry, model }
    }

    pub fn score(&self, zone_name: &str, reading: LiveReading) -> RiskResult<ScoringResult> {
        self.score_at(zone_name, reading, Utc::now())
    }

    pub fn score_at(
        &self,
        zone_name: &str,
        reading: LiveReading,
        timestamp: DateTime<Utc>,
    ) -> RiskResult<ScoringResult> {
        let zone = self.registry.get(zone_name)?;
        self.score_zone(zone, reading, timestamp)
    }

    pub fn overview(&self, reading: LiveReading) -> RiskResult<Vec<ScoringResult>> {
        let timestamp = Utc::now();
        self.registry
            .list()
            .into_iter()
            .map(|zone| self.score_zone(zone, reading, timestamp))
            .collect()
    }

    fn score_zone(
        &self,
        zone: &Zone,
        reading: LiveReading,
        timestamp: DateTime<Utc>,
    ) -> RiskResult<ScoringResult> {
        let features = assemble_features(zone, reading);
        features.validate()?;

        let probability = self.model.predict_probability(&features).clamp(0.0, 1.0);
        let alert_tier = AlertTier::from_probability(probability);
        let exposed_population = exposed_population(zone.population, probability);
        debug!(
            zone = %zone.name,
            probability,
            tier = %alert_tier,
            exposed_population,
            "zone scored"
        );

        Ok(ScoringResult {
            zone_name: zone.name.clone(),
            features,
            probability,
            alert_tier,
            exposed_population,
            timestamp,
        })
    }
}

pub fn assemble_features(zone: &Zone, reading: LiveReading) -> FeatureVector {
    FeatureVector {
        rainfall_mm: reading.rainfall_mm,
        river_level_m: reading.river_level_m,
        soil_moisture_pct: reading.soil_moisture_pct,
        elevation_m: zone.elevation_m,
        drainage_capacity: zone.drainage_capacity,
    }
}

// Residents counted at risk; nobody is exposed at or below vigilance.
pub fn exposed_population(population: u64, probability: f64) -> u64 {
    if probability > VIGILANCE_THRESHOLD {
        (population as f64 * probability).round() as u64
    } else {
        0
    }
}

pub fn factor_profile(features: &FeatureVector) -> FactorProfile {
    FactorProfile {
        rainfall: features.rainfall_mm / 1.5,
        river_level: features.river_level_m * 12.0,
        soil_saturation: features.soil_moisture_pct,
        drainage_deficit: (1.0 - features.drainage_capacity) * 100.0,
    }
}
