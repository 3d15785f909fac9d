//! Gradient-boosted regression trees for binary classification.
//!
//! Log-loss boosting: the raw score starts at the training log-odds, each
//! stage fits a least-squares tree to the negative gradient `y - p` and
//! replaces its leaf values with a single Newton step
//! `sum(y - p) / sum(p * (1 - p))`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, RiskError};

const MIN_HESSIAN: f64 = 1e-150;
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
        }
    }
}

impl BoostingParams {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut p = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "n_estimators" => p.n_estimators = as_count(key, value)?,
                "learning_rate" => p.learning_rate = as_float(key, value)?,
                "max_depth" => p.max_depth = as_count(key, value)?,
                "min_samples_split" => p.min_samples_split = as_count(key, value)?,
                "min_samples_leaf" => p.min_samples_leaf = as_count(key, value)?,
                "subsample" => p.subsample = as_float(key, value)?,
                "loss" => {
                    if value.as_str() != Some("log_loss") {
                        return Err(RiskError::config(
                            param_field(key),
                            format!("only `log_loss` is supported, got {value}"),
                        ));
                    }
                }
                "random_state" => {
                    return Err(RiskError::config(
                        param_field(key),
                        "the seed comes from data.random_state",
                    ));
                }
                _ => {
                    return Err(RiskError::config(
                        param_field(key),
                        "unknown hyperparameter",
                    ));
                }
            }
        }
        p.validate()?;
        Ok(p)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(RiskError::config(param_field("n_estimators"), "must be >= 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(RiskError::config(param_field("learning_rate"), "must be > 0"));
        }
        if self.max_depth == 0 {
            return Err(RiskError::config(param_field("max_depth"), "must be >= 1"));
        }
        if self.min_samples_split < 2 {
            return Err(RiskError::config(
                param_field("min_samples_split"),
                "must be >= 2",
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(RiskError::config(
                param_field("min_samples_leaf"),
                "must be >= 1",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(RiskError::config(param_field("subsample"), "must be in (0, 1]"));
        }
        Ok(())
    }
}

fn param_field(key: &str) -> String {
    format!("model.params.{key}")
}

fn as_count(key: &str, value: &Value) -> Result<usize> {
    if let Some(v) = value.as_u64() {
        return Ok(v as usize);
    }
    match value.as_f64() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(RiskError::config(
            param_field(key),
            format!("expected a non-negative integer, got {value}"),
        )),
    }
}

fn as_float(key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        RiskError::config(param_field(key), format!("expected a number, got {value}"))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }

    // Children always sit after their parent, so forward indices rule out
    // cycles as well as out-of-range jumps.
    fn structure_problem(&self, n_features: usize) -> Option<String> {
        if self.nodes.is_empty() {
            return Some("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Some(format!("node {idx} splits on feature {feature} of {n_features}"));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Some(format!("node {idx} points at node {child}"));
                    }
                }
            }
        }
        None
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl SplitCandidate {
    // Highest gain wins; ties go to the lower feature index so the parallel
    // reduction is order independent.
    fn better(a: Self, b: Self) -> Self {
        if a.gain > b.gain || (a.gain == b.gain && a.feature < b.feature) {
            a
        } else {
            b
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    residual: &'a [f64],
    hessian: &'a [f64],
    params: &'a BoostingParams,
    n_features: usize,
    nodes: Vec<Node>,
    importances: &'a mut [f64],
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let n = indices.len();
        let can_split = depth < self.params.max_depth
            && n >= self.params.min_samples_split
            && n >= 2 * self.params.min_samples_leaf;
        let best = if can_split {
            self.best_split(&indices)
        } else {
            None
        };

        let Some(best) = best else {
            self.nodes[slot] = Node::Leaf {
                value: self.newton_value(&indices),
            };
            return slot;
        };

        self.importances[best.feature] += best.gain;
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        slot
    }

    fn newton_value(&self, indices: &[usize]) -> f64 {
        let num: f64 = indices.iter().map(|&i| self.residual[i]).sum();
        let den: f64 = indices.iter().map(|&i| self.hessian[i]).sum();
        if den.abs() < MIN_HESSIAN {
            0.0
        } else {
            num / den
        }
    }

    fn best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let x = self.x;
        let residual = self.residual;
        let min_leaf = self.params.min_samples_leaf;
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| residual[i]).sum();
        let parent = total * total / n as f64;

        (0..self.n_features)
            .into_par_iter()
            .filter_map(|feature| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

                let mut best: Option<SplitCandidate> = None;
                let mut left_sum = 0.0;
                for k in 1..n {
                    left_sum += residual[order[k - 1]];
                    if k < min_leaf || n - k < min_leaf {
                        continue;
                    }
                    let lo = x[order[k - 1]][feature];
                    let hi = x[order[k]][feature];
                    if lo >= hi {
                        continue;
                    }
                    let right_sum = total - left_sum;
                    let gain = left_sum * left_sum / k as f64
                        + right_sum * right_sum / (n - k) as f64
                        - parent;
                    if gain <= MIN_SPLIT_GAIN {
                        continue;
                    }
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    let candidate = SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    };
                    best = Some(match best {
                        Some(b) if b.gain >= gain => b,
                        _ => candidate,
                    });
                }
                best
            })
            .reduce_with(SplitCandidate::better)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: BoostingParams,
    n_features: usize,
    init_score: f64,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
    train_loss: Vec<f64>,
}

impl GradientBoostingClassifier {
    /// Fits on a dense design matrix (one row per sample). `seed` drives row
    /// subsampling only; with `subsample == 1.0` the fit is seed independent.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &BoostingParams, seed: u64) -> Result<Self> {
        params.validate()?;
        if x.is_empty() {
            return Err(RiskError::training("no training rows"));
        }
        if x.len() != y.len() {
            return Err(RiskError::training(format!(
                "design matrix has {} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if let Some(bad) = x.iter().position(|row| row.len() != n_features) {
            return Err(RiskError::training(format!(
                "row {bad} has {} columns, expected {n_features}",
                x[bad].len()
            )));
        }

        let n = x.len();
        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == n {
            return Err(RiskError::training(
                "classifier needs both classes in the training split",
            ));
        }
        let prior = positives as f64 / n as f64;
        let init_score = (prior / (1.0 - prior)).ln();

        let mut rng = StdRng::seed_from_u64(seed);
        let n_inbag = ((params.subsample * n as f64) as usize).max(1);
        let targets: Vec<f64> = y.iter().map(|&v| f64::from(v)).collect();
        let mut raw = vec![init_score; n];
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut train_loss = Vec::with_capacity(params.n_estimators);

        for stage in 0..params.n_estimators {
            let proba: Vec<f64> = raw.iter().map(|&f| sigmoid(f)).collect();
            let residual: Vec<f64> = targets.iter().zip(&proba).map(|(t, p)| t - p).collect();
            let hessian: Vec<f64> = proba.iter().map(|p| p * (1.0 - p)).collect();

            let indices = if n_inbag < n {
                let mut idx = index::sample(&mut rng, n, n_inbag).into_vec();
                idx.sort_unstable();
                idx
            } else {
                (0..n).collect()
            };

            let mut builder = TreeBuilder {
                x,
                residual: &residual,
                hessian: &hessian,
                params,
                n_features,
                nodes: Vec::new(),
                importances: &mut importances,
            };
            builder.build(indices, 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };

            for (f, row) in raw.iter_mut().zip(x) {
                *f += params.learning_rate * tree.predict(row);
            }
            let loss = binomial_deviance(&targets, &raw);
            debug!(stage, loss, leaves = tree.n_leaves(), "boosting stage");
            train_loss.push(loss);
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        Ok(Self {
            params: *params,
            n_features,
            init_score,
            trees,
            feature_importances: importances,
            train_loss,
        })
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.init_score
            + self.params.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision_function(row))
    }

    /// Hard label; exactly 0.5 resolves to the negative class.
    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Describes the first inconsistency in a deserialized model, if any.
    pub(crate) fn structure_problem(&self) -> Option<String> {
        if !self.init_score.is_finite() {
            return Some(format!("init score {} is not finite", self.init_score));
        }
        if self.feature_importances.len() != self.n_features {
            return Some(format!(
                "{} importances for {} features",
                self.feature_importances.len(),
                self.n_features
            ));
        }
        self.trees.iter().enumerate().find_map(|(i, tree)| {
            tree.structure_problem(self.n_features)
                .map(|problem| format!("tree {i}: {problem}"))
        })
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn binomial_deviance(targets: &[f64], raw: &[f64]) -> f64 {
    let sum: f64 = targets
        .iter()
        .zip(raw)
        .map(|(y, f)| softplus(*f) - y * f)
        .sum();
    sum / targets.len().max(1) as f64
}
