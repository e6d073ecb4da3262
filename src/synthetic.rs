use std::f64::consts::PI;
use std::path::Path;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RiskError, RiskResult};
use crate::models::{FeatureVector, LabeledExample, FEATURE_COLUMNS, LABEL_COLUMN};

const DRAINAGE_LEVELS: [f64; 3] = [0.3, 0.5, 0.8];
const FLOOD_SCORE_THRESHOLD: f64 = 25.0;

pub fn flood_risk_score(features: &FeatureVector) -> f64 {
    0.4 * features.rainfall_mm + 10.0 * features.river_level_m - 2.0 * features.elevation_m
}

pub fn flood_label(features: &FeatureVector) -> bool {
    flood_risk_score(features) > FLOOD_SCORE_THRESHOLD
}

// Produces exactly `n` examples; the first `n / 2` come from the highland
// elevation regime, the rest from the lowland one.
pub fn generate(n: usize, seed: u64) -> RiskResult<Vec<LabeledExample>> {
    if n == 0 {
        return Err(RiskError::TrainingData(
            "dataset size must be positive".to_string(),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let highland = n / 2;
    let mut examples = Vec::with_capacity(n);

    for index in 0..n {
        let elevation_m = if index < highland {
            normal(&mut rng, 50.0, 10.0)
        } else {
            normal(&mut rng, 5.0, 2.0)
        };
        let features = FeatureVector {
            rainfall_mm: gamma_shape2(&mut rng, 10.0),
            river_level_m: normal(&mut rng, 3.0, 1.5),
            soil_moisture_pct: rng.gen_range(0.0..100.0),
            elevation_m,
            drainage_capacity: DRAINAGE_LEVELS[rng.gen_range(0..DRAINAGE_LEVELS.len())],
        };
        examples.push(LabeledExample {
            features,
            flood_occurred: flood_label(&features),
        });
    }

    let positives = examples.iter().filter(|e| e.flood_occurred).count();
    info!(rows = n, seed, positives, "generated synthetic flood dataset");
    Ok(examples)
}

// Gamma(2, scale) as the sum of two exponential draws.
fn gamma_shape2(rng: &mut ChaCha8Rng, scale: f64) -> f64 {
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = 1.0 - rng.gen::<f64>();
    -scale * (u1.ln() + u2.ln())
}

// Box-Muller transform.
fn normal(rng: &mut ChaCha8Rng, mean: f64, sd: f64) -> f64 {
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + sd * z
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    rainfall_mm: f64,
    river_level_m: f64,
    soil_moisture_pct: f64,
    elevation_m: f64,
    drainage_capacity: f64,
    flood_occurred: u8,
}

fn dataset_header() -> Vec<&'static str> {
    let mut header = FEATURE_COLUMNS.to_vec();
    header.push(LABEL_COLUMN);
    header
}

pub fn write_csv(path: &Path, examples: &[LabeledExample]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for example in examples {
        let f = example.features;
        writer.serialize(CsvRow {
            rainfall_mm: f.rainfall_mm,
            river_level_m: f.river_level_m,
            soil_moisture_pct: f.soil_moisture_pct,
            elevation_m: f.elevation_m,
            drainage_capacity: f.drainage_capacity,
            flood_occurred: u8::from(example.flood_occurred),
        })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = examples.len(), "wrote dataset");
    Ok(())
}

pub fn read_csv(path: &Path) -> RiskResult<Vec<LabeledExample>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| RiskError::TrainingData(format!("{}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| RiskError::TrainingData(format!("unreadable header: {e}")))?
        .clone();
    let expected = dataset_header();
    if headers.iter().ne(expected.iter().copied()) {
        return Err(RiskError::TrainingData(format!(
            "expected columns {:?}, found {:?}",
            expected,
            headers.iter().collect::<Vec<_>>()
        )));
    }

    let mut examples = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|e| RiskError::TrainingData(format!("row {}: {e}", line + 1)))?;
        let flood_occurred = match row.flood_occurred {
            0 => false,
            1 => true,
            other => {
                return Err(RiskError::TrainingData(format!(
                    "row {}: {LABEL_COLUMN} must be 0 or 1, got {other}",
                    line + 1
                )))
            }
        };
        examples.push(LabeledExample {
            features: FeatureVector {
                rainfall_mm: row.rainfall_mm,
                river_level_m: row.river_level_m,
                soil_moisture_pct: row.soil_moisture_pct,
                elevation_m: row.elevation_m,
                drainage_capacity: row.drainage_capacity,
            },
            flood_occurred,
        });
    }

    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_dataset() {
        let run1 = generate(500, 42).unwrap();
        let run2 = generate(500, 42).unwrap();
        assert_eq!(run1.len(), run2.len());
        for (a, b) in run1.iter().zip(run2.iter()) {
            for (x, y) in a.features.to_row().iter().zip(b.features.to_row().iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
            assert_eq!(a.flood_occurred, b.flood_occurred);
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let run1 = generate(50, 1).unwrap();
        let run2 = generate(50, 2).unwrap();
        assert_ne!(run1, run2);
    }

    #[test]
    fn length_is_exact() {
        assert_eq!(generate(1, 7).unwrap().len(), 1);
        assert_eq!(generate(2001, 7).unwrap().len(), 2001);
        assert!(matches!(generate(0, 7), Err(RiskError::TrainingData(_))));
    }

    #[test]
    fn labels_follow_risk_rule() {
        for example in generate(2000, 42).unwrap() {
            let f = example.features;
            let expected = 0.4 * f.rainfall_mm + 10.0 * f.river_level_m - 2.0 * f.elevation_m > 25.0;
            assert_eq!(example.flood_occurred, expected);
        }
    }

    #[test]
    fn features_stay_in_domain() {
        for example in generate(2000, 3).unwrap() {
            let f = example.features;
            assert!(f.rainfall_mm >= 0.0);
            assert!((0.0..=100.0).contains(&f.soil_moisture_pct));
            assert!(DRAINAGE_LEVELS.contains(&f.drainage_capacity));
        }
    }

    #[test]
    fn elevation_is_bimodal() {
        let examples = generate(2000, 42).unwrap();
        let mean = |slice: &[LabeledExample]| {
            slice.iter().map(|e| e.features.elevation_m).sum::<f64>() / slice.len() as f64
        };
        let highland = mean(&examples[..1000]);
        let lowland = mean(&examples[1000..]);
        assert!((highland - 50.0).abs() < 2.0, "highland mean {highland}");
        assert!((lowland - 5.0).abs() < 0.5, "lowland mean {lowland}");
    }

    #[test]
    fn rainfall_mean_matches_gamma() {
        let examples = generate(4000, 11).unwrap();
        let mean = examples.iter().map(|e| e.features.rainfall_mm).sum::<f64>() / 4000.0;
        assert!((mean - 20.0).abs() < 1.5, "rainfall mean {mean}");
    }

    #[test]
    fn csv_preserves_examples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("flood.csv");
        let examples = generate(25, 9).unwrap();

        write_csv(&path, &examples).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "rainfall_mm,river_level_m,soil_moisture_pct,elevation_m,drainage_capacity,flood_occurred\n"
        ));

        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded.len(), 25);
        assert_eq!(
            loaded.iter().filter(|e| e.flood_occurred).count(),
            examples.iter().filter(|e| e.flood_occurred).count()
        );
    }

    #[test]
    fn csv_with_wrong_columns_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "river_level_m,rainfall_mm,soil_moisture_pct,elevation_m,drainage_capacity,flood_occurred\n1,2,3,4,0.5,0\n",
        )
        .unwrap();
        assert!(matches!(read_csv(&path), Err(RiskError::TrainingData(_))));
    }

    #[test]
    fn csv_with_missing_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        std::fs::write(
            &path,
            "rainfall_mm,river_level_m,soil_moisture_pct,elevation_m,drainage_capacity,flood_occurred\n1,2,,4,0.5,1\n",
        )
        .unwrap();
        assert!(matches!(read_csv(&path), Err(RiskError::TrainingData(_))));
    }
}
