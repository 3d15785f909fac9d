use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Result, RiskError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified, seeded split. The held-out size is `ceil(test_size * n)` and
/// each class contributes its proportional share, rounded down, with leftover
/// slots going to the classes with the largest remainders.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(RiskError::config(
            "data.test_size",
            format!("must be in (0, 1), got {test_size}"),
        ));
    }
    let n = labels.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(RiskError::training(format!(
            "test_size={test_size} on {n} rows leaves an empty split (train={n_train}, test={n_test})"
        )));
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }
    if by_class.len() < 2 {
        return Err(RiskError::training(format!(
            "need at least two label classes to stratify, found {}",
            by_class.len()
        )));
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(RiskError::training(format!(
            "class {class} has only {} member(s); at least 2 are needed to stratify",
            rows.len()
        )));
    }
    if n_test < by_class.len() || n_train < by_class.len() {
        return Err(RiskError::training(format!(
            "split sizes train={n_train} test={n_test} cannot hold all {} classes",
            by_class.len()
        )));
    }

    let quotas = allocate(&by_class, n_test, n);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for ((_, rows), quota) in by_class.iter().zip(quotas) {
        let mut rows = rows.clone();
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..quota]);
        train.extend_from_slice(&rows[quota..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    debug!(train = train.len(), test = test.len(), seed, "stratified split");
    Ok(SplitIndices { train, test })
}

fn allocate(by_class: &BTreeMap<u8, Vec<usize>>, n_test: usize, n: usize) -> Vec<usize> {
    let exact: Vec<f64> = by_class
        .values()
        .map(|rows| n_test as f64 * rows.len() as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|v| v.floor() as usize).collect();
    let mut left = n_test - quotas.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..exact.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    for &class in order.iter().cycle().take(order.len() * 2) {
        if left == 0 {
            break;
        }
        // keep at least one row of every class on the training side
        if quotas[class] + 1 < sizes[class] {
            quotas[class] += 1;
            left -= 1;
        }
    }
    quotas
}
