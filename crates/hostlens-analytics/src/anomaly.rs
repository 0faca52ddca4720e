//! Multivariate outlier labeling with an isolation forest.
//!
//! Every window row is scored on the raw five-feature vector
//! `(cpu, mem, load_1m, load_5m, load_15m)`. The forest is rebuilt on each
//! call from a fixed seed, so identical input always yields identical labels.

use hostlens_metrics::{Sample, Window};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;
use crate::stats::{average_path_length, percentile};
use crate::types::{AnomalyParams, AnomalyResult, InsufficientData, Outcome, Pipeline};

/// Minimum window rows for anomaly detection.
pub const MIN_ROWS: usize = 30;

/// Trees in the forest.
pub const N_ESTIMATORS: usize = 200;

/// Upper bound on rows drawn per tree.
pub const MAX_SAMPLES: usize = 256;

/// RNG seed for tree construction.
pub const SEED: u64 = 42;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree stored as a flat node arena; index 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(data: &[Vec<f64>], rows: &mut [usize], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[Vec<f64>],
        rows: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        let width = data[rows[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                    (lo.min(data[*r][f]), hi.max(data[*r][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return id;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);

        // Partition in place: rows with value <= threshold first.
        let mut mid = 0;
        for i in 0..rows.len() {
            if data[rows[i]][feature] <= threshold {
                rows.swap(i, mid);
                mid += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(data, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `point` is isolated, adjusted for unsplit leaf sizes.
    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// An ensemble of isolation trees.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fits `n_estimators` trees on subsamples of `data` drawn from `seed`.
    #[must_use]
    pub fn fit(data: &[Vec<f64>], n_estimators: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = data.len().min(MAX_SAMPLES);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..n_estimators)
            .map(|_| {
                let mut rows = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, &mut rows, max_depth, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in `(0, 1]`; values near 1 are easy to isolate.
    #[must_use]
    pub fn score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_depth = self.trees.iter().map(|t| t.path_length(point)).sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_depth / norm)
    }
}

/// Labels rows of `scores` as anomalous.
///
/// The cut-off is the `contamination` quantile of the negated scores; a row
/// is anomalous when its negated score falls strictly below it.
#[must_use]
pub fn label_by_contamination(scores: &[f64], contamination: f64) -> Vec<bool> {
    let negated: Vec<f64> = scores.iter().map(|s| -s).collect();
    let threshold = percentile(&negated, contamination * 100.0);
    negated.iter().map(|n| *n < threshold).collect()
}

/// Runs the anomaly pipeline over a window.
///
/// # Errors
///
/// Returns `InvalidParameter` if the contamination is outside `(0, 0.5]`.
pub fn detect_anomalies(window: &Window, params: &AnomalyParams) -> Result<Outcome<AnomalyResult>> {
    params.validate()?;
    Ok(detect_samples(window.samples(), params.contamination))
}

fn detect_samples(samples: &[Sample], contamination: f64) -> Outcome<AnomalyResult> {
    let n = samples.len();
    if n < MIN_ROWS {
        debug!(rows = n, required = MIN_ROWS, "anomaly detection skipped: not enough rows");
        return Outcome::Insufficient(InsufficientData::new(Pipeline::Anomaly, MIN_ROWS, n));
    }

    let data: Vec<Vec<f64>> = samples.iter().map(|s| s.features().to_vec()).collect();
    let forest = IsolationForest::fit(&data, N_ESTIMATORS, SEED);
    let scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
    let labels = label_by_contamination(&scores, contamination);

    let anomalies = labels.iter().filter(|l| **l).count();
    let anomaly_rate = anomalies as f64 / n as f64;

    debug!(rows = n, contamination, anomalies, anomaly_rate, "anomaly detection fitted");

    Outcome::Ready(AnomalyResult {
        contamination,
        labels,
        scores,
        anomaly_rate,
    })
}
