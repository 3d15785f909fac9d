use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Keyed by class label ("0", "1").
    pub classes: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub roc_auc: f64,
    pub report: ClassificationReport,
    pub log_loss: f64,
    pub brier: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    pub test_positives: usize,
}

impl EvaluationMetrics {
    pub fn evaluate(labels: &[u8], proba: &[f64], train_samples: usize) -> Option<Self> {
        let roc_auc = roc_auc(labels, proba)?;
        let preds: Vec<u8> = proba.iter().map(|p| u8::from(*p > 0.5)).collect();
        Some(Self {
            roc_auc,
            report: classification_report(labels, &preds),
            log_loss: log_loss(labels, proba),
            brier: brier_score(labels, proba),
            train_samples,
            test_samples: labels.len(),
            test_positives: labels.iter().filter(|&&y| y == 1).count(),
        })
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging ranks over
/// tied scores. `None` unless both classes are present.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    if labels.len() != scores.len() {
        return None;
    }
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; a tie group shares the mean of its ranks
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let u = rank_sum_pos - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

pub fn classification_report(labels: &[u8], preds: &[u8]) -> ClassificationReport {
    let n = labels.len().min(preds.len());
    let mut classes = BTreeMap::new();
    let mut correct = 0usize;
    for (y, p) in labels.iter().zip(preds).take(n) {
        if y == p {
            correct += 1;
        }
    }

    let mut macro_avg = ClassMetrics::default();
    let mut weighted_avg = ClassMetrics::default();
    for class in [0u8, 1u8] {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (y, p) in labels.iter().zip(preds).take(n) {
            match (*y == class, *p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let support = tp + fn_;
        let m = ClassMetrics {
            precision,
            recall,
            f1_score,
            support,
        };

        macro_avg.precision += m.precision / 2.0;
        macro_avg.recall += m.recall / 2.0;
        macro_avg.f1_score += m.f1_score / 2.0;
        let w = ratio(support, n);
        weighted_avg.precision += m.precision * w;
        weighted_avg.recall += m.recall * w;
        weighted_avg.f1_score += m.f1_score * w;
        classes.insert(class.to_string(), m);
    }
    macro_avg.support = n;
    weighted_avg.support = n;

    ClassificationReport {
        classes,
        accuracy: ratio(correct, n),
        macro_avg,
        weighted_avg,
    }
}

pub fn log_loss(labels: &[u8], proba: &[f64]) -> f64 {
    if labels.is_empty() || labels.len() != proba.len() {
        return 0.0;
    }
    let sum: f64 = labels
        .iter()
        .zip(proba)
        .map(|(y, p)| {
            let p = p.clamp(1e-15, 1.0 - 1e-15);
            if *y == 1 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    sum / labels.len() as f64
}

pub fn brier_score(labels: &[u8], proba: &[f64]) -> f64 {
    if labels.is_empty() || labels.len() != proba.len() {
        return 0.0;
    }
    let sum: f64 = labels
        .iter()
        .zip(proba)
        .map(|(y, p)| (p - f64::from(*y)).powi(2))
        .sum();
    sum / labels.len() as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_of_perfect_and_inverted_rankings() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(roc_auc(&y, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[1, 1], &[0.2, 0.3]), None);
    }

    #[test]
    fn auc_handles_partial_ties() {
        // one positive/negative pair tied, three correctly ordered
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.4, 0.9]).expect("both classes present");
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn report_matches_hand_counts() {
        let y = [1, 1, 1, 0, 0];
        let p = [1, 1, 0, 0, 1];
        let r = classification_report(&y, &p);
        let pos = r.classes["1"];
        assert!((pos.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((pos.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pos.support, 3);
        let neg = r.classes["0"];
        assert!((neg.precision - 0.5).abs() < 1e-12);
        assert!((neg.recall - 0.5).abs() < 1e-12);
        assert!((r.accuracy - 0.6).abs() < 1e-12);
        assert_eq!(r.weighted_avg.support, 5);
    }

    #[test]
    fn report_resolves_zero_division_to_zero() {
        let r = classification_report(&[0, 1], &[0, 0]);
        assert_eq!(r.classes["1"].precision, 0.0);
        assert_eq!(r.classes["1"].f1_score, 0.0);
    }

    #[test]
    fn perfect_probabilities_have_zero_brier() {
        assert!(brier_score(&[0, 1], &[0.0, 1.0]) < 1e-12);
        assert!(log_loss(&[0, 1], &[0.0, 1.0]) < 1e-12);
    }
}
