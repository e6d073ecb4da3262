// Gradient-boosted regression trees for binary classification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub lambda: f64,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.3,
            max_depth: 4,
            lambda: 1.0,
            min_samples_leaf: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GbmNode {
    Leaf {
        value: f64,
    },
    // Samples with `row[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmTree {
    nodes: Vec<GbmNode>,
}

impl GbmTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        while let Some(node) = self.nodes.get(idx) {
            match *node {
                GbmNode::Leaf { value } => return value,
                GbmNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(feature).copied().unwrap_or(0.0);
                    idx = if value <= threshold { left } else { right };
                }
            }
        }
        0.0
    }

    pub fn check_structure(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let GbmNode::Split {
                feature,
                left,
                right,
                ..
            } = *node
            {
                if feature >= n_features {
                    return Err(format!("node {idx} splits on unknown feature {feature}"));
                }
                for child in [left, right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmClassifier {
    trees: Vec<GbmTree>,
    learning_rate: f64,
    base_score: f64,
}

impl GbmClassifier {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: &BoostingParams) -> Result<Self, String> {
        if rows.is_empty() {
            return Err("no training rows".into());
        }
        if rows.len() != labels.len() {
            return Err("rows and labels differ in length".into());
        }

        let n = rows.len();
        let positives = labels.iter().filter(|&&y| y).count() as f64;
        let rate = (positives / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (rate / (1.0 - rate)).ln();

        let targets: Vec<f64> = labels.iter().map(|&y| f64::from(u8::from(y))).collect();
        let mut scores = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        for _ in 0..params.n_trees {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-12);
            }

            let mut builder = TreeBuilder {
                rows,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            };
            let indices: Vec<usize> = (0..n).collect();
            builder.build(indices, 0);
            let tree = GbmTree {
                nodes: builder.nodes,
            };

            for (score, row) in scores.iter_mut().zip(rows) {
                *score += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            trees,
            learning_rate: params.learning_rate,
            base_score,
        })
    }

    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |score, tree| {
                score + self.learning_rate * tree.predict(row)
            })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }

    pub fn check_structure(&self, n_features: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("classifier has no trees".into());
        }
        if !self.learning_rate.is_finite() || !self.base_score.is_finite() {
            return Err("non-finite learning rate or base score".into());
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.check_structure(n_features)
                .map_err(|e| format!("tree {idx}: {e}"))?;
        }
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<GbmNode>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let (g, h) = self.sums(&indices);
        let idx = self.nodes.len();
        self.nodes.push(GbmNode::Leaf {
            value: -g / (h + self.params.lambda),
        });

        if depth >= self.params.max_depth
            || indices.len() < (2 * self.params.min_samples_leaf).max(2)
        {
            return idx;
        }
        let Some(split) = self.best_split(&indices, g, h) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[idx] = GbmNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    fn best_split(&self, indices: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = g_total * g_total / (h_total + lambda);
        let n_features = self.rows.get(indices[0]).map_or(0, Vec::len);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..n_features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                g_left += self.grad[i];
                h_left += self.hess[i];

                let left_count = pos + 1;
                if left_count < min_leaf || sorted.len() - left_count < min_leaf {
                    continue;
                }
                let here = self.rows[i][feature];
                let next = self.rows[sorted[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                let gain = g_left * g_left / (h_left + lambda)
                    + g_right * g_right / (h_right + lambda)
                    - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> GbmTree {
        GbmTree {
            nodes: vec![
                GbmNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                GbmNode::Leaf { value: low },
                GbmNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn ensemble_sums_scaled_trees() {
        let gbm = GbmClassifier {
            trees: vec![stump(0, 0.5, -1.0, 1.0), stump(1, 0.5, -0.5, 0.5)],
            learning_rate: 0.1,
            base_score: 0.0,
        };
        // 0.1 * 1.0 + 0.1 * 0.5
        assert!((gbm.raw_score(&[0.7, 0.7]) - 0.15).abs() < 1e-10);
        assert!((gbm.raw_score(&[0.3, 0.3]) + 0.15).abs() < 1e-10);
        assert!(gbm.predict_proba(&[0.7, 0.7]) > 0.5);
        assert!(gbm.predict_proba(&[0.3, 0.3]) < 0.5);
    }

    #[test]
    fn base_score_shifts_prediction() {
        let gbm = GbmClassifier {
            trees: vec![stump(0, 0.5, -1.0, 1.0)],
            learning_rate: 0.1,
            base_score: 2.0,
        };
        assert!((gbm.raw_score(&[0.3]) - 1.9).abs() < 1e-10);
        assert!(gbm.predict_proba(&[0.3]) > 0.8);
    }

    #[test]
    fn fit_separates_threshold_rule() {
        let rows: Vec<Vec<f64>> = (0..200).map(|i| vec![f64::from(i), f64::from(i % 7)]).collect();
        let labels: Vec<bool> = (0..200).map(|i| i >= 120).collect();
        let gbm = GbmClassifier::fit(&rows, &labels, &BoostingParams::default()).unwrap();

        assert!(gbm.predict_proba(&[10.0, 3.0]) < 0.1);
        assert!(gbm.predict_proba(&[180.0, 3.0]) > 0.9);
        assert_eq!(gbm.n_trees(), 100);
        assert!(gbm.check_structure(2).is_ok());
    }

    #[test]
    fn fit_on_single_class_predicts_that_class() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![f64::from(i)]).collect();
        let labels = vec![false; 20];
        let gbm = GbmClassifier::fit(&rows, &labels, &BoostingParams::default()).unwrap();
        assert!(gbm.predict_proba(&[5.0]) < 0.01);
    }

    #[test]
    fn fit_rejects_empty_input() {
        assert!(GbmClassifier::fit(&[], &[], &BoostingParams::default()).is_err());
    }

    #[test]
    fn structure_check_catches_bad_references() {
        let looped = GbmTree {
            nodes: vec![GbmNode::Split {
                feature: 0,
                threshold: 1.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(looped.check_structure(1).is_err());
        assert!(stump(3, 0.5, 0.0, 1.0).check_structure(2).is_err());
        assert!(stump(1, 0.5, 0.0, 1.0).check_structure(2).is_ok());
    }

    #[test]
    fn nodes_round_trip_through_json() {
        let tree = stump(0, 0.5, -1.0, 1.0);
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"kind\":\"split\""));
        let back: GbmTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
