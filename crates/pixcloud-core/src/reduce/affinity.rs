//! Affinity construction for both projectors.
//!
//! - t-SNE: dense joint probability matrix from perplexity-calibrated
//!   Gaussian kernels, O(N²)
//! - UMAP: sparse k-NN graph with per-edge membership strength, O(N·k) memory

use crate::similarity::distance_row;
use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Cow;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Bandwidth search iterations per point.
const ENTROPY_MAX_STEPS: usize = 50;

/// Entropy tolerance for the bandwidth search.
const ENTROPY_TOLERANCE: f64 = 1e-5;

/// Inputs wider than this are randomly projected before the k-NN search.
pub const PROJECTION_CAP: usize = 64;

/// Target dimensionality of the sparse random projection.
pub const PROJECTION_TARGET: usize = 32;

/// Fixed seed: the projection must be identical across runs.
const PROJECTION_SEED: u64 = 0x5eed_0f_1e1d;

/// Upper bound on k regardless of configuration.
const MAX_NEIGHBORS: usize = 15;

// ============================================================================
// t-SNE joint probabilities
// ============================================================================

/// Symmetric joint probabilities `P[i][j]`, summing to 1, zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct JointProbabilities {
    n: usize,
    values: Vec<f64>,
}

impl JointProbabilities {
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    #[cfg(test)]
    pub(crate) fn from_values(n: usize, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), n * n);
        Self { n, values }
    }
}

/// Perplexity actually used for `n` points: `min(configured, floor((n-1)/3))`,
/// never below 1.
pub fn effective_perplexity(configured: f64, n: usize) -> f64 {
    let cap = (n.saturating_sub(1) / 3) as f64;
    configured.min(cap).max(1.0)
}

/// Joint probabilities from a row-major `n * n` squared-distance matrix.
pub fn joint_probabilities(distances: &[f64], n: usize, perplexity: f64) -> JointProbabilities {
    if n <= 1 {
        return JointProbabilities {
            n,
            values: vec![0.0; n * n],
        };
    }

    let target_entropy = effective_perplexity(perplexity, n).ln();

    let mut conditional = vec![0.0; n * n];
    for i in 0..n {
        let row = conditional_row(&distances[i * n..(i + 1) * n], i, target_entropy);
        conditional[i * n..(i + 1) * n].copy_from_slice(&row);
    }

    let mut values = vec![0.0; n * n];
    let denom = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                values[i * n + j] = (conditional[i * n + j] + conditional[j * n + i]) / denom;
            }
        }
    }

    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }

    JointProbabilities { n, values }
}

/// Binary-search the Gaussian precision so the conditional distribution
/// `P(j|i)` has the target entropy; returns the normalized row.
fn conditional_row(distances: &[f64], i: usize, target_entropy: f64) -> Vec<f64> {
    let n = distances.len();
    let mut row = vec![0.0; n];

    // Shift by the closest neighbor so exp() cannot underflow to all zeros.
    let nearest = distances
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);

    let mut beta = 1.0;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;

    for _ in 0..ENTROPY_MAX_STEPS {
        let mut sum = 0.0;
        for (j, slot) in row.iter_mut().enumerate() {
            *slot = if j == i {
                0.0
            } else {
                (-(distances[j] - nearest) * beta).exp()
            };
            sum += *slot;
        }

        let mut entropy = 0.0;
        for p in row.iter_mut() {
            *p /= sum;
            if *p > 1e-12 {
                entropy -= *p * p.ln();
            }
        }

        let diff = entropy - target_entropy;
        if diff.abs() < ENTROPY_TOLERANCE {
            break;
        }

        if diff > 0.0 {
            // Too flat: sharpen.
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }

    row
}

// ============================================================================
// UMAP k-NN graph
// ============================================================================

/// Undirected weighted edge, `source < target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Deduplicated k-NN membership graph.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnGraph {
    pub n: usize,
    pub k: usize,
    /// Sorted by descending weight
    pub edges: Vec<Edge>,
}

impl KnnGraph {
    /// Neighbor set of every node.
    pub fn neighbor_sets(&self) -> Vec<AHashSet<usize>> {
        let mut sets = vec![AHashSet::new(); self.n];
        for e in &self.edges {
            sets[e.source].insert(e.target);
            sets[e.target].insert(e.source);
        }
        sets
    }
}

/// Neighbor count actually used: `min(configured, floor((n-1)/2), 15)`, at least 1.
pub fn effective_neighbors(configured: usize, n: usize) -> usize {
    configured
        .min(n.saturating_sub(1) / 2)
        .min(MAX_NEIGHBORS)
        .max(1)
}

/// Build the membership graph.
///
/// Weight of neighbor `j` of `i` is `exp(-(d - rho) / sigma)` with `d` the
/// Euclidean distance, `rho` the nearest-neighbor distance and
/// `sigma = max(d_k - rho, 1)`. When both directions exist the stronger
/// weight is kept.
pub fn knn_graph(data: &[Vec<f64>], n_neighbors: usize) -> KnnGraph {
    let n = data.len();
    if n < 2 {
        return KnnGraph {
            n,
            k: 0,
            edges: Vec::new(),
        };
    }
    let k = effective_neighbors(n_neighbors, n);

    #[cfg(feature = "parallel")]
    let neighborhoods: Vec<Vec<(usize, f64)>> = (0..n)
        .into_par_iter()
        .map(|i| nearest(data, i, k))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let neighborhoods: Vec<Vec<(usize, f64)>> = (0..n).map(|i| nearest(data, i, k)).collect();

    let mut strongest: AHashMap<(usize, usize), f64> = AHashMap::with_capacity(n * k);
    for (i, neighbors) in neighborhoods.iter().enumerate() {
        let Some(&(_, rho)) = neighbors.first() else {
            continue;
        };
        let farthest = neighbors.last().map_or(rho, |&(_, d)| d);
        let sigma = (farthest - rho).max(1.0);

        for &(j, d) in neighbors {
            let weight = (-(d - rho) / sigma).exp();
            let key = (i.min(j), i.max(j));
            let slot = strongest.entry(key).or_insert(0.0);
            if weight > *slot {
                *slot = weight;
            }
        }
    }

    let mut edges: Vec<Edge> = strongest
        .into_iter()
        .map(|((source, target), weight)| Edge {
            source,
            target,
            weight,
        })
        .collect();
    edges.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.source, a.target).cmp(&(b.source, b.target)))
    });

    KnnGraph { n, k, edges }
}

/// The `k` nearest other points of `i` as (index, Euclidean distance), closest first.
fn nearest(data: &[Vec<f64>], i: usize, k: usize) -> Vec<(usize, f64)> {
    let mut candidates: Vec<(usize, f64)> = distance_row(data, i)
        .into_iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .collect();
    candidates.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.truncate(k);
    candidates.into_iter().map(|(j, d2)| (j, d2.sqrt())).collect()
}

// ============================================================================
// Sparse random projection
// ============================================================================

/// Achlioptas-style ternary projection: each entry is `+s`, `-s` (1/6 each)
/// or 0 (2/3), with `s = 1/sqrt(target)`.
#[derive(Debug, Clone)]
pub struct SparseRandomProjection {
    input_dims: usize,
    /// Per output dimension: (input index, signed scale)
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseRandomProjection {
    pub fn new(input_dims: usize, target_dims: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (target_dims.max(1) as f64).sqrt();
        let rows = (0..target_dims)
            .map(|_| {
                (0..input_dims)
                    .filter_map(|d| match rng.gen_range(0..6) {
                        0 => Some((d, scale)),
                        1 => Some((d, -scale)),
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        Self { input_dims, rows }
    }

    pub fn input_dims(&self) -> usize {
        self.input_dims
    }

    pub fn output_dims(&self) -> usize {
        self.rows.len()
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|&(d, s)| values.get(d).map(|v| v * s))
                    .sum()
            })
            .collect()
    }
}

/// Project rows wider than [`PROJECTION_CAP`] down to [`PROJECTION_TARGET`];
/// narrower input is borrowed unchanged.
pub fn project_if_needed(data: &[Vec<f64>]) -> Cow<'_, [Vec<f64>]> {
    let dims = data.first().map_or(0, Vec::len);
    if dims <= PROJECTION_CAP {
        return Cow::Borrowed(data);
    }
    let projection = SparseRandomProjection::new(dims, PROJECTION_TARGET, PROJECTION_SEED);
    Cow::Owned(data.iter().map(|row| projection.apply(row)).collect())
}
