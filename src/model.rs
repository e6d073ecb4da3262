use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RiskError, RiskResult};
use crate::gbm::{BoostingParams, GbmClassifier};
use crate::models::{FeatureVector, LabeledExample, FEATURE_COLUMNS};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const HOLDOUT_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

pub trait ProbabilityModel {
    fn predict_probability(&self, features: &FeatureVector) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    format_version: u32,
    feature_columns: Vec<String>,
    classifier: GbmClassifier,
    holdout_accuracy: Option<f64>,
    trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub holdout_accuracy: Option<f64>,
}

impl ProbabilityModel for RiskModel {
    fn predict_probability(&self, features: &FeatureVector) -> f64 {
        self.classifier
            .predict_proba(&features.to_row())
            .clamp(0.0, 1.0)
    }
}

impl RiskModel {
    pub fn train(examples: &[LabeledExample], split_seed: u64) -> RiskResult<(Self, TrainingReport)> {
        Self::train_with(examples, split_seed, &BoostingParams::default())
    }

    pub fn train_with(
        examples: &[LabeledExample],
        split_seed: u64,
        params: &BoostingParams,
    ) -> RiskResult<(Self, TrainingReport)> {
        if examples.is_empty() {
            return Err(RiskError::TrainingData("no training examples".to_string()));
        }
        if let Some(pos) = examples
            .iter()
            .position(|e| e.features.to_row().iter().any(|v| !v.is_finite()))
        {
            return Err(RiskError::TrainingData(format!(
                "example {pos} has a missing or non-finite feature"
            )));
        }

        let (train, holdout) = split_holdout(examples, split_seed);
        let rows: Vec<Vec<f64>> = train.iter().map(|e| e.features.to_row().to_vec()).collect();
        let labels: Vec<bool> = train.iter().map(|e| e.flood_occurred).collect();
        let classifier =
            GbmClassifier::fit(&rows, &labels, params).map_err(RiskError::TrainingData)?;

        let mut model = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            classifier,
            holdout_accuracy: None,
            trained_at: Utc::now(),
        };
        model.holdout_accuracy = model.accuracy(&holdout);

        let report = TrainingReport {
            train_rows: train.len(),
            holdout_rows: holdout.len(),
            holdout_accuracy: model.holdout_accuracy,
        };
        match report.holdout_accuracy {
            Some(acc) => info!(
                train_rows = report.train_rows,
                holdout_rows = report.holdout_rows,
                "model trained with holdout accuracy {:.2}%",
                acc * 100.0
            ),
            None => warn!(
                train_rows = report.train_rows,
                "model trained without a holdout set"
            ),
        }

        Ok((model, report))
    }

    pub fn accuracy(&self, examples: &[LabeledExample]) -> Option<f64> {
        if examples.is_empty() {
            return None;
        }
        let correct = examples
            .iter()
            .filter(|e| (self.predict_probability(&e.features) >= 0.5) == e.flood_occurred)
            .count();
        Some(correct as f64 / examples.len() as f64)
    }

    pub fn holdout_accuracy(&self) -> Option<f64> {
        self.holdout_accuracy
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write model to {}", path.display()))?;
        info!(path = %path.display(), "model artifact saved");
        Ok(())
    }

    pub fn load(path: &Path) -> RiskResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RiskError::ModelLoad(format!("{}: {e}", path.display())))?;
        let model: Self = serde_json::from_slice(&bytes)
            .map_err(|e| RiskError::ModelLoad(format!("{}: {e}", path.display())))?;
        model.check_schema()?;
        info!(
            path = %path.display(),
            trees = model.classifier.n_trees(),
            trained_at = %model.trained_at,
            "model artifact loaded"
        );
        Ok(model)
    }

    fn check_schema(&self) -> RiskResult<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(RiskError::ModelLoad(format!(
                "unsupported artifact version {}",
                self.format_version
            )));
        }
        if self
            .feature_columns
            .iter()
            .map(String::as_str)
            .ne(FEATURE_COLUMNS.iter().copied())
        {
            return Err(RiskError::ModelLoad(format!(
                "artifact feature columns {:?} do not match {:?}",
                self.feature_columns, FEATURE_COLUMNS
            )));
        }
        self.classifier
            .check_structure(FEATURE_COLUMNS.len())
            .map_err(RiskError::ModelLoad)
    }
}

fn split_holdout(examples: &[LabeledExample], seed: u64) -> (Vec<LabeledExample>, Vec<LabeledExample>) {
    let mut shuffled = examples.to_vec();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let holdout_len = (examples.len() as f64 * HOLDOUT_FRACTION).round() as usize;
    let holdout_len = holdout_len.min(examples.len().saturating_sub(1));
    let train = shuffled.split_off(holdout_len);
    (train, shuffled)
}

// Trained once on the reference dataset and shared across tests.
#[cfg(test)]
pub(crate) fn reference_model() -> &'static (RiskModel, TrainingReport) {
    use std::sync::OnceLock;

    static MODEL: OnceLock<(RiskModel, TrainingReport)> = OnceLock::new();
    MODEL.get_or_init(|| {
        let examples = crate::synthetic::generate(2000, 42).unwrap();
        RiskModel::train(&examples, DEFAULT_SPLIT_SEED).unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn trained() -> &'static (RiskModel, TrainingReport) {
        reference_model()
    }

    fn lowland(rainfall_mm: f64, river_level_m: f64) -> FeatureVector {
        FeatureVector {
            rainfall_mm,
            river_level_m,
            soil_moisture_pct: 50.0,
            elevation_m: 5.0,
            drainage_capacity: 0.5,
        }
    }

    #[test]
    fn holdout_split_uses_fixed_fraction() {
        let (_, report) = trained();
        assert_eq!(report.holdout_rows, 400);
        assert_eq!(report.train_rows, 1600);
    }

    #[test]
    fn model_generalizes_to_holdout() {
        let (_, report) = trained();
        let accuracy = report.holdout_accuracy.unwrap();
        assert!(accuracy > 0.9, "holdout accuracy {accuracy}");
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (model, _) = trained();
        for example in synthetic::generate(200, 5).unwrap() {
            let p = model.predict_probability(&example.features);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    fn mean_probability(model: &RiskModel, features: impl Fn(f64) -> FeatureVector) -> f64 {
        let grid: Vec<f64> = (0..=10).map(f64::from).collect();
        grid.iter()
            .map(|&x| model.predict_probability(&features(x)))
            .sum::<f64>()
            / grid.len() as f64
    }

    #[test]
    fn rainfall_and_river_level_raise_risk_on_average() {
        let (model, _) = trained();

        let dry = mean_probability(model, |level| lowland(0.0, level * 0.5));
        let wet = mean_probability(model, |level| lowland(150.0, level * 0.5));
        assert!(wet >= dry, "rainfall: dry {dry} wet {wet}");

        let low = mean_probability(model, |rain| lowland(rain * 10.0, 0.0));
        let high = mean_probability(model, |rain| lowland(rain * 10.0, 8.0));
        assert!(high >= low, "river level: low {low} high {high}");
    }

    #[test]
    fn same_split_seed_trains_same_model() {
        let examples = synthetic::generate(300, 8).unwrap();
        let params = BoostingParams {
            n_trees: 10,
            ..BoostingParams::default()
        };
        let (a, _) = RiskModel::train_with(&examples, 1, &params).unwrap();
        let (b, _) = RiskModel::train_with(&examples, 1, &params).unwrap();
        assert_eq!(a.classifier, b.classifier);
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert!(matches!(
            RiskModel::train(&[], DEFAULT_SPLIT_SEED),
            Err(RiskError::TrainingData(_))
        ));
    }

    #[test]
    fn missing_feature_is_rejected() {
        let mut examples = synthetic::generate(10, 1).unwrap();
        examples[3].features.soil_moisture_pct = f64::NAN;
        assert!(matches!(
            RiskModel::train(&examples, DEFAULT_SPLIT_SEED),
            Err(RiskError::TrainingData(_))
        ));
    }

    #[test]
    fn artifact_round_trips() {
        let (model, _) = trained();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("flood_gbm.json");
        model.save(&path).unwrap();

        let loaded = RiskModel::load(&path).unwrap();
        for example in synthetic::generate(50, 77).unwrap() {
            let a = model.predict_probability(&example.features);
            let b = loaded.predict_probability(&example.features);
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_artifact_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let result = RiskModel::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(RiskError::ModelLoad(_))));
    }

    #[test]
    fn reordered_columns_fail_to_load() {
        let (model, _) = trained();
        let mut reordered = model.clone();
        reordered.feature_columns.swap(0, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reordered.json");
        std::fs::write(&path, serde_json::to_vec(&reordered).unwrap()).unwrap();
        assert!(matches!(RiskModel::load(&path), Err(RiskError::ModelLoad(_))));
    }

    #[test]
    fn corrupt_artifact_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(RiskModel::load(&path), Err(RiskError::ModelLoad(_))));
    }

    #[test]
    fn concurrent_predictions_share_the_model() {
        let (model, _) = trained();
        let features = lowland(120.0, 5.0);
        let expected = model.predict_probability(&features);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| model.predict_probability(&features)))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().to_bits(), expected.to_bits());
            }
        });
    }
}
