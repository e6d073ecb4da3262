use std::collections::BTreeMap;

use crate::error::{RiskError, RiskResult};
use crate::models::Zone;

// (name, latitude, longitude, elevation_m, drainage_capacity, population)
const ABIDJAN_COMMUNES: [(&str, f64, f64, f64, f64, u64); 13] = [
    ("Abobo", 5.416, -4.018, 85.0, 0.4, 1_100_000),
    ("Adjamé", 5.358, -4.022, 40.0, 0.5, 370_000),
    ("Anyama", 5.494, -4.051, 90.0, 0.6, 150_000),
    ("Attécoubé", 5.337, -4.041, 15.0, 0.3, 260_000),
    ("Bingerville", 5.355, -3.885, 45.0, 0.7, 70_000),
    ("Cocody", 5.348, -3.988, 50.0, 0.8, 450_000),
    ("Koumassi", 5.298, -3.948, 4.0, 0.3, 430_000),
    ("Marcory", 5.302, -3.985, 5.0, 0.4, 250_000),
    ("Plateau", 5.326, -4.019, 25.0, 0.9, 10_000),
    ("Port-Bouët", 5.258, -3.938, 2.0, 0.5, 420_000),
    ("Songon", 5.322, -4.266, 30.0, 0.6, 60_000),
    ("Treichville", 5.300, -4.010, 6.0, 0.5, 100_000),
    ("Yopougon", 5.347, -4.081, 45.0, 0.4, 1_200_000),
];

#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: BTreeMap<String, Zone>,
}

impl ZoneRegistry {
    pub fn abidjan() -> Self {
        Self::from_zones(ABIDJAN_COMMUNES.iter().map(
            |&(name, latitude, longitude, elevation_m, drainage_capacity, population)| Zone {
                name: name.to_string(),
                latitude,
                longitude,
                elevation_m,
                drainage_capacity,
                population,
            },
        ))
    }

    pub fn from_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self {
            zones: zones
                .into_iter()
                .map(|zone| (zone.name.clone(), zone))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> RiskResult<&Zone> {
        self.zones
            .get(name)
            .ok_or_else(|| RiskError::NotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<&Zone> {
        self.zones.values().collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }
}
