//! Gradient boosted decision trees with a binary logistic objective.
//!
//! This is the learned scorer behind candidate ranking: an ensemble of
//! shallow regression trees fit to logistic gradients, with seeded row and
//! column subsampling, L1-shrunk leaf values, and early stopping driven by
//! a held-out validation split. Training is deterministic for a fixed seed.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IdentypoError, Result};

/// L2 shrinkage applied to every leaf denominator.
const LAMBDA: f64 = 1.0;

/// Hyperparameters for boosted training.
///
/// Defaults follow the values the corrector ships with: 4000 rounds with
/// 200-round early-stopping patience, depth-6 trees, learning rate 0.03,
/// and 0.5 row/column subsampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtParams {
    /// Maximum number of boosting rounds.
    pub rounds: usize,
    /// Stop when the validation loss has not improved for this many rounds.
    /// 0 disables early stopping.
    pub early_stopping_rounds: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Shrinkage applied to every tree's contribution.
    pub learning_rate: f64,
    /// Fraction of rows sampled per round.
    pub subsample_rows: f64,
    /// Fraction of feature columns sampled per round.
    pub subsample_columns: f64,
    /// L1 term soft-thresholding leaf gradient sums.
    pub l1_regularization: f64,
    /// Minimum hessian weight required in each child.
    pub min_child_weight: f64,
    /// Fraction of rows held out to drive early stopping.
    pub validation_fraction: f64,
    /// Seed for subsampling and the validation split.
    pub seed: u64,
    /// Worker pool width for per-round prediction updates.
    pub threads: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        GbdtParams {
            rounds: 4000,
            early_stopping_rounds: 200,
            max_depth: 6,
            learning_rate: 0.03,
            subsample_rows: 0.5,
            subsample_columns: 0.5,
            l1_regularization: 1.0,
            min_child_weight: 2.0,
            validation_fraction: 0.1,
            seed: 42,
            threads: 16,
        }
    }
}

/// Summary of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Trees kept in the final ensemble.
    pub rounds_trained: usize,
    /// Round with the best validation loss (equals `rounds_trained - 1`
    /// when early stopping is active).
    pub best_round: usize,
    /// Final training log-loss.
    pub final_train_loss: f64,
    /// Best validation log-loss, NaN when no validation split was held out.
    pub best_validation_loss: f64,
    /// Whether training stopped before the configured round limit.
    pub early_stopped: bool,
    /// When training finished.
    pub trained_at: DateTime<Utc>,
}

/// A node in the flat tree arena. `feature < 0` marks a leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    feature: i32,
    threshold: f64,
    value: f64,
    left: i32,
    right: i32,
}

/// One regression tree fit to logistic gradients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Predict the raw leaf value for a feature row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let mut at = 0usize;
        loop {
            let node = &self.nodes[at];
            if node.feature < 0 {
                return node.value;
            }
            at = if row[node.feature as usize] <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

/// The boosted ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    trees: Vec<RegressionTree>,
    params: GbdtParams,
    feature_dim: usize,
    base_margin: f64,
    report: Option<TrainingReport>,
}

impl GradientBoostedTrees {
    /// Create an untrained ensemble.
    pub fn new(params: GbdtParams) -> Self {
        GradientBoostedTrees {
            trees: Vec::new(),
            params,
            feature_dim: 0,
            base_margin: 0.0,
            report: None,
        }
    }

    /// Whether the ensemble has been trained.
    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Feature width established at training time.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// The training hyperparameters.
    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    /// The last training report, if any.
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Fit the ensemble to binary labels.
    ///
    /// Labels must be 0.0 or 1.0; all rows must share one width. With a
    /// non-zero validation fraction and early-stopping patience, a seeded
    /// shuffle holds out validation rows whose log-loss decides when to
    /// stop; the ensemble is truncated to the best round.
    pub fn fit(&mut self, rows: &[Vec<f64>], labels: &[f64]) -> Result<()> {
        if rows.is_empty() {
            return Err(IdentypoError::invalid_config(
                "training set must not be empty",
            ));
        }
        if rows.len() != labels.len() {
            return Err(IdentypoError::invalid_config(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let width = rows[0].len();
        if width == 0 {
            return Err(IdentypoError::invalid_config("feature width must be > 0"));
        }
        for row in rows {
            if row.len() != width {
                return Err(IdentypoError::dimension_mismatch(width, row.len()));
            }
        }
        for &label in labels {
            if label != 0.0 && label != 1.0 {
                return Err(IdentypoError::invalid_config(format!(
                    "binary label expected, got {label}"
                )));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.threads.max(1))
            .build()
            .map_err(|e| IdentypoError::internal(format!("worker pool: {e}")))?;

        self.feature_dim = width;
        self.trees.clear();
        pool.install(|| self.boost(rows, labels))
    }

    fn boost(&mut self, rows: &[Vec<f64>], labels: &[f64]) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        // Seeded validation split.
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(&mut rng);
        let n_val = ((rows.len() as f64) * self.params.validation_fraction) as usize;
        let use_validation = n_val > 0 && self.params.early_stopping_rounds > 0;
        let (val_idx, train_idx) = if use_validation {
            order.split_at(n_val)
        } else {
            (&order[..0], &order[..])
        };

        let mut train_margins = vec![self.base_margin; train_idx.len()];
        let mut val_margins = vec![self.base_margin; val_idx.len()];

        let mut best_loss = f64::INFINITY;
        let mut best_round = 0usize;
        let mut final_train_loss = f64::NAN;
        let mut early_stopped = false;

        for round in 0..self.params.rounds {
            // Logistic gradients and hessians on the training rows.
            let mut grad = vec![0.0; train_idx.len()];
            let mut hess = vec![0.0; train_idx.len()];
            for (i, &row_idx) in train_idx.iter().enumerate() {
                let p = sigmoid(train_margins[i]);
                grad[i] = p - labels[row_idx];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let sampled_rows = sample_fraction(
                &mut rng,
                train_idx.len(),
                self.params.subsample_rows,
            );
            let sampled_cols = sample_fraction(
                &mut rng,
                self.feature_dim,
                self.params.subsample_columns,
            );

            let tree = build_tree(
                rows,
                train_idx,
                &grad,
                &hess,
                &sampled_rows,
                &sampled_cols,
                &self.params,
            );

            let lr = self.params.learning_rate;
            train_margins
                .par_iter_mut()
                .zip(train_idx.par_iter())
                .for_each(|(margin, &row_idx)| {
                    *margin += lr * tree.predict(&rows[row_idx]);
                });
            val_margins
                .par_iter_mut()
                .zip(val_idx.par_iter())
                .for_each(|(margin, &row_idx)| {
                    *margin += lr * tree.predict(&rows[row_idx]);
                });

            self.trees.push(tree);
            final_train_loss = log_loss(&train_margins, train_idx, labels);

            if use_validation {
                let val_loss = log_loss(&val_margins, val_idx, labels);
                if val_loss + 1e-12 < best_loss {
                    best_loss = val_loss;
                    best_round = round;
                } else if round - best_round >= self.params.early_stopping_rounds {
                    early_stopped = true;
                    break;
                }
            } else {
                best_round = round;
            }
        }

        if use_validation {
            // Keep only the trees up to the best validation round.
            self.trees.truncate(best_round + 1);
        }

        self.report = Some(TrainingReport {
            rounds_trained: self.trees.len(),
            best_round,
            final_train_loss,
            best_validation_loss: if use_validation { best_loss } else { f64::NAN },
            early_stopped,
            trained_at: Utc::now(),
        });

        Ok(())
    }

    /// Correction probability in (0, 1) for one feature row.
    pub fn predict_probability(&self, row: &[f64]) -> Result<f64> {
        if !self.is_trained() {
            return Err(IdentypoError::not_trained(
                "ensemble has no trees; call fit() or load a model",
            ));
        }
        if row.len() != self.feature_dim {
            return Err(IdentypoError::dimension_mismatch(self.feature_dim, row.len()));
        }

        let mut margin = self.base_margin;
        for tree in &self.trees {
            margin += self.params.learning_rate * tree.predict(row);
        }
        Ok(sigmoid(margin))
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Mean binary log-loss over the given row indices.
fn log_loss(margins: &[f64], idx: &[usize], labels: &[f64]) -> f64 {
    if idx.is_empty() {
        return f64::NAN;
    }
    let mut total = 0.0;
    for (i, &row_idx) in idx.iter().enumerate() {
        let p = sigmoid(margins[i]).clamp(1e-12, 1.0 - 1e-12);
        let y = labels[row_idx];
        total -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
    }
    total / idx.len() as f64
}

/// Sample `fraction` of `0..len` without replacement, at least one element,
/// returned sorted for deterministic traversal.
fn sample_fraction(rng: &mut StdRng, len: usize, fraction: f64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let amount = if fraction >= 1.0 {
        len
    } else {
        (((len as f64) * fraction) as usize).clamp(1, len)
    };
    let mut sampled = index::sample(rng, len, amount).into_vec();
    sampled.sort_unstable();
    sampled
}

/// Soft-threshold a gradient sum by the L1 term.
fn shrink(gradient_sum: f64, alpha: f64) -> f64 {
    if gradient_sum > alpha {
        gradient_sum - alpha
    } else if gradient_sum < -alpha {
        gradient_sum + alpha
    } else {
        0.0
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
    gain: f64,
}

/// Build one regression tree on the sampled rows and columns.
///
/// `members` holds positions into `train_idx` (the tree works in
/// training-set coordinates); `rows` is indexed through `train_idx`.
fn build_tree(
    rows: &[Vec<f64>],
    train_idx: &[usize],
    grad: &[f64],
    hess: &[f64],
    members: &[usize],
    columns: &[usize],
    params: &GbdtParams,
) -> RegressionTree {
    let mut nodes = Vec::new();
    grow(
        rows, train_idx, grad, hess, members, columns, params, 0, &mut nodes,
    );
    RegressionTree { nodes }
}

#[allow(clippy::too_many_arguments)]
fn grow(
    rows: &[Vec<f64>],
    train_idx: &[usize],
    grad: &[f64],
    hess: &[f64],
    members: &[usize],
    columns: &[usize],
    params: &GbdtParams,
    depth: usize,
    nodes: &mut Vec<TreeNode>,
) -> i32 {
    let g_sum: f64 = members.iter().map(|&i| grad[i]).sum();
    let h_sum: f64 = members.iter().map(|&i| hess[i]).sum();

    let make_leaf = |nodes: &mut Vec<TreeNode>| -> i32 {
        let value = -shrink(g_sum, params.l1_regularization) / (h_sum + LAMBDA);
        nodes.push(TreeNode {
            feature: -1,
            threshold: 0.0,
            value,
            left: -1,
            right: -1,
        });
        (nodes.len() - 1) as i32
    };

    if depth >= params.max_depth || members.len() < 2 {
        return make_leaf(nodes);
    }

    let Some(split) = find_best_split(rows, train_idx, grad, hess, members, columns, params)
    else {
        return make_leaf(nodes);
    };

    let at = nodes.len();
    nodes.push(TreeNode {
        feature: split.feature as i32,
        threshold: split.threshold,
        value: 0.0,
        left: -1,
        right: -1,
    });

    let left = grow(
        rows, train_idx, grad, hess, &split.left, columns, params, depth + 1, nodes,
    );
    let right = grow(
        rows, train_idx, grad, hess, &split.right, columns, params, depth + 1, nodes,
    );
    nodes[at].left = left;
    nodes[at].right = right;
    at as i32
}

fn find_best_split(
    rows: &[Vec<f64>],
    train_idx: &[usize],
    grad: &[f64],
    hess: &[f64],
    members: &[usize],
    columns: &[usize],
    params: &GbdtParams,
) -> Option<SplitCandidate> {
    let g_total: f64 = members.iter().map(|&i| grad[i]).sum();
    let h_total: f64 = members.iter().map(|&i| hess[i]).sum();
    let parent_score = g_total * g_total / (h_total + LAMBDA);

    let mut best: Option<SplitCandidate> = None;

    for &feature in columns {
        let mut ordered: Vec<usize> = members.to_vec();
        ordered.sort_by(|&a, &b| {
            let va = rows[train_idx[a]][feature];
            let vb = rows[train_idx[b]][feature];
            va.partial_cmp(&vb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });

        let mut g_left = 0.0;
        let mut h_left = 0.0;
        for cut in 1..ordered.len() {
            g_left += grad[ordered[cut - 1]];
            h_left += hess[ordered[cut - 1]];

            let prev = rows[train_idx[ordered[cut - 1]]][feature];
            let next = rows[train_idx[ordered[cut]]][feature];
            if prev == next {
                continue; // cannot split between equal values
            }

            let h_right = h_total - h_left;
            if h_left < params.min_child_weight || h_right < params.min_child_weight {
                continue;
            }

            let g_right = g_total - g_left;
            let gain = g_left * g_left / (h_left + LAMBDA)
                + g_right * g_right / (h_right + LAMBDA)
                - parent_score;

            let better = match &best {
                Some(current) => gain > current.gain,
                None => gain > 1e-12,
            };
            if better {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (prev + next) / 2.0,
                    left: ordered[..cut].to_vec(),
                    right: ordered[cut..].to_vec(),
                    gain,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic params for fast tests.
    fn test_params() -> GbdtParams {
        GbdtParams {
            rounds: 60,
            early_stopping_rounds: 0,
            max_depth: 3,
            learning_rate: 0.3,
            subsample_rows: 1.0,
            subsample_columns: 1.0,
            l1_regularization: 0.0,
            min_child_weight: 0.0,
            validation_fraction: 0.0,
            seed: 42,
            threads: 2,
        }
    }

    /// A linearly separable toy set: label is 1 when the first feature is
    /// small.
    fn toy_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let x = i as f64 / 20.0;
            rows.push(vec![x, 1.0 - x]);
            labels.push(if x < 0.5 { 1.0 } else { 0.0 });
        }
        (rows, labels)
    }

    #[test]
    fn test_untrained_prediction_fails() {
        let model = GradientBoostedTrees::new(test_params());
        assert!(!model.is_trained());
        let result = model.predict_probability(&[0.1, 0.9]);
        assert!(matches!(result, Err(IdentypoError::ModelNotTrained(_))));
    }

    #[test]
    fn test_fit_separates_toy_data() {
        let (rows, labels) = toy_data();
        let mut model = GradientBoostedTrees::new(test_params());
        model.fit(&rows, &labels).unwrap();

        assert!(model.is_trained());
        assert_eq!(model.feature_dim(), 2);

        let positive = model.predict_probability(&[0.1, 0.9]).unwrap();
        let negative = model.predict_probability(&[0.9, 0.1]).unwrap();
        assert!(positive > 0.5, "positive side scored {positive}");
        assert!(negative < 0.5, "negative side scored {negative}");
        assert!(positive > 0.0 && positive < 1.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = toy_data();

        let mut first = GradientBoostedTrees::new(test_params());
        first.fit(&rows, &labels).unwrap();
        let mut second = GradientBoostedTrees::new(test_params());
        second.fit(&rows, &labels).unwrap();

        let row = vec![0.3, 0.7];
        assert_eq!(
            first.predict_probability(&row).unwrap(),
            second.predict_probability(&row).unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch_at_predict() {
        let (rows, labels) = toy_data();
        let mut model = GradientBoostedTrees::new(test_params());
        model.fit(&rows, &labels).unwrap();

        let result = model.predict_probability(&[0.1]);
        assert!(matches!(
            result,
            Err(IdentypoError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![0.1, 0.2], vec![0.3]];
        let labels = vec![1.0, 0.0];
        let mut model = GradientBoostedTrees::new(test_params());
        assert!(model.fit(&rows, &labels).is_err());
    }

    #[test]
    fn test_non_binary_labels_rejected() {
        let rows = vec![vec![0.1], vec![0.3]];
        let labels = vec![1.0, 0.5];
        let mut model = GradientBoostedTrees::new(test_params());
        assert!(matches!(
            model.fit(&rows, &labels),
            Err(IdentypoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_early_stopping_bounds_rounds() {
        let (rows, labels) = toy_data();
        let mut params = test_params();
        params.rounds = 500;
        params.early_stopping_rounds = 5;
        params.validation_fraction = 0.25;

        let mut model = GradientBoostedTrees::new(params);
        model.fit(&rows, &labels).unwrap();

        let report = model.report().unwrap();
        assert!(report.rounds_trained <= 500);
        assert_eq!(report.rounds_trained, report.best_round + 1);
        assert!(report.best_validation_loss.is_finite());
    }

    #[test]
    fn test_subsampling_stays_deterministic() {
        let (rows, labels) = toy_data();
        let mut params = test_params();
        params.subsample_rows = 0.5;
        params.subsample_columns = 0.5;
        params.rounds = 40;

        let mut first = GradientBoostedTrees::new(params.clone());
        first.fit(&rows, &labels).unwrap();
        let mut second = GradientBoostedTrees::new(params);
        second.fit(&rows, &labels).unwrap();

        let row = vec![0.2, 0.8];
        assert_eq!(
            first.predict_probability(&row).unwrap(),
            second.predict_probability(&row).unwrap()
        );
    }
}
