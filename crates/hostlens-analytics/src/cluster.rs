//! Workload clustering with k-means.
//!
//! Features are z-score standardized first so percentages do not drown out
//! load averages. Several seeded k-means++ runs are made and the one with the
//! lowest inertia wins.

use std::collections::BTreeMap;

use hostlens_metrics::{Sample, Window};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;
use crate::stats::{squared_distance, standardize, variance};
use crate::types::{ClusterParams, ClusterResult, InsufficientData, Outcome, Pipeline};

/// Rows required per requested cluster.
pub const MIN_ROWS_PER_CLUSTER: usize = 10;

/// Independent k-means initializations.
pub const N_INIT: usize = 10;

/// Lloyd iterations per initialization.
pub const MAX_ITER: usize = 300;

/// Convergence tolerance, relative to the mean feature variance.
pub const TOLERANCE: f64 = 1e-4;

/// RNG seed for centroid initialization.
pub const SEED: u64 = 42;

/// A fitted k-means partition.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    /// Final centroids, one per cluster id.
    pub centroids: Vec<Vec<f64>>,
    /// Cluster id per input row.
    pub assignments: Vec<usize>,
    /// Sum of squared distances to assigned centroids.
    pub inertia: f64,
}

impl KMeans {
    /// Fits `k` clusters to `data`, keeping the best of `n_init` runs.
    ///
    /// `data` must hold at least `k` rows.
    #[must_use]
    pub fn fit(data: &[Vec<f64>], k: usize, n_init: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tol = TOLERANCE * mean_variance(data);

        let mut best: Option<Self> = None;
        for _ in 0..n_init.max(1) {
            let run = lloyd(data, kmeans_plus_plus(data, k, &mut rng), tol);
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        best.unwrap_or_else(|| Self {
            centroids: Vec::new(),
            assignments: Vec::new(),
            inertia: 0.0,
        })
    }
}

fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let Some(width) = data.first().map(Vec::len).filter(|w| *w > 0) else {
        return 0.0;
    };
    (0..width)
        .map(|f| variance(&data.iter().map(|r| r[f]).collect::<Vec<_>>()))
        .sum::<f64>()
        / width as f64
}

/// Index and squared distance of the nearest centroid. Ties go to the lowest id.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (id, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (id, d);
        }
    }
    best
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one.
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..data.len())].clone());

    let mut dist: Vec<f64> = data.iter().map(|p| squared_distance(p, &centroids[0])).collect();
    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = data.len() - 1;
            for (i, d) in dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..data.len())
        };
        let centroid = data[next].clone();
        for (d, p) in dist.iter_mut().zip(data) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, tol: f64) -> KMeans {
    let k = centroids.len();
    let width = data.first().map_or(0, Vec::len);
    let mut assignments = vec![0; data.len()];

    for _ in 0..MAX_ITER {
        let mut distances = vec![0.0; data.len()];
        for (i, p) in data.iter().enumerate() {
            let (id, d) = nearest(p, &centroids);
            assignments[i] = id;
            distances[i] = d;
        }

        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (p, id) in data.iter().zip(&assignments) {
            counts[*id] += 1;
            for (s, v) in sums[*id].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut updated: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, n)| {
                if *n == 0 {
                    sum
                } else {
                    sum.into_iter().map(|s| s / *n as f64).collect()
                }
            })
            .collect();

        // Empty clusters take over the point farthest from its centroid.
        for id in 0..k {
            if counts[id] > 0 {
                continue;
            }
            let far = distances
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i);
            updated[id] = data[far].clone();
            distances[far] = 0.0;
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, p) in data.iter().enumerate() {
        let (id, d) = nearest(p, &centroids);
        assignments[i] = id;
        inertia += d;
    }

    KMeans {
        centroids,
        assignments,
        inertia,
    }
}

/// Counts members per cluster id, listing every id in `[0, k)`.
#[must_use]
pub fn cluster_sizes(assignments: &[usize], k: usize) -> BTreeMap<usize, usize> {
    let mut sizes: BTreeMap<usize, usize> = (0..k).map(|id| (id, 0)).collect();
    for id in assignments {
        *sizes.entry(*id).or_insert(0) += 1;
    }
    sizes
}

/// Runs the cluster pipeline over a window.
///
/// # Errors
///
/// Returns `InvalidParameter` if `k` is zero.
pub fn cluster(window: &Window, params: &ClusterParams) -> Result<Outcome<ClusterResult>> {
    params.validate()?;
    Ok(cluster_samples(window.samples(), params.k))
}

fn cluster_samples(samples: &[Sample], k: usize) -> Outcome<ClusterResult> {
    let n = samples.len();
    let required = k.saturating_mul(MIN_ROWS_PER_CLUSTER);
    if n < required {
        debug!(rows = n, k, required, "clustering skipped: not enough rows");
        return Outcome::Insufficient(InsufficientData::new(Pipeline::Cluster, required, n));
    }

    let mut data: Vec<Vec<f64>> = samples.iter().map(|s| s.features().to_vec()).collect();
    standardize(&mut data);
    let fitted = KMeans::fit(&data, k, N_INIT, SEED);
    let sizes = cluster_sizes(&fitted.assignments, k);

    debug!(rows = n, k, inertia = fitted.inertia, ?sizes, "clustering fitted");

    Outcome::Ready(ClusterResult {
        k,
        assignments: fitted.assignments,
        sizes,
        inertia: fitted.inertia,
    })
}
