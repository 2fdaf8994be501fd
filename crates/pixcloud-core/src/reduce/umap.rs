//! UMAP-style projector.

use super::affinity::{knn_graph, project_if_needed};
use super::{
    random_embedding, validate_rows, DimensionReducer, Embedding, Progress, ProgressSink,
    Reduction,
};
use crate::config::UmapConfig;
use crate::error::ReduceResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Inputs this small skip optimization and get a random layout.
pub(crate) const TRIVIAL_MAX_POINTS: usize = 5;

const PROGRESS_EVERY: usize = 10;
const NEGATIVE_SAMPLES: usize = 5;
const GRADIENT_CLAMP: f64 = 4.0;
const INIT_SPREAD: f64 = 10.0;

/// Low-dimensional curve `1 / (1 + a d^(2b))` fitted to `min_dist`.
pub(crate) fn curve_params(min_dist: f64) -> (f64, f64) {
    let a = 1.929 - 3.52 * min_dist + 5.73 * min_dist * min_dist;
    let b = 0.7915 + 0.2045 * min_dist;
    (a, b)
}

pub struct UmapReducer {
    config: UmapConfig,
    rng: StdRng,
}

impl UmapReducer {
    pub fn new(config: UmapConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }
}

impl DimensionReducer for UmapReducer {
    fn name(&self) -> &'static str {
        "umap"
    }

    fn total_iterations(&self, n_points: usize) -> usize {
        if n_points <= TRIVIAL_MAX_POINTS {
            0
        } else {
            self.config.n_epochs
        }
    }

    fn fit_transform(
        &mut self,
        data: &[Vec<f64>],
        progress: &mut dyn ProgressSink,
    ) -> ReduceResult<Reduction> {
        validate_rows(data)?;
        let n = data.len();

        match n {
            0 => return Ok(Reduction::trivial(Vec::new())),
            1 => return Ok(Reduction::trivial(vec![[0.0, 0.0]])),
            n if n <= TRIVIAL_MAX_POINTS => {
                return Ok(Reduction::trivial(random_embedding(n, &mut self.rng)))
            }
            _ => {}
        }

        let inputs = project_if_needed(data);
        let graph = knn_graph(&inputs, self.config.n_neighbors);
        let neighbors = graph.neighbor_sets();
        debug!(points = n, k = graph.k, edges = graph.edges.len(), "umap graph ready");

        let (a, b) = curve_params(self.config.min_dist);
        let total = self.config.n_epochs;

        let mut y: Embedding = (0..n)
            .map(|_| {
                [
                    (self.rng.gen::<f64>() - 0.5) * INIT_SPREAD,
                    (self.rng.gen::<f64>() - 0.5) * INIT_SPREAD,
                ]
            })
            .collect();

        for epoch in 0..total {
            let alpha = 1.0 - epoch as f64 / total as f64;

            for edge in &graph.edges {
                let (i, j) = (edge.source, edge.target);
                attract(&mut y, i, j, edge.weight, a, b, alpha);

                for endpoint in [i, j] {
                    for _ in 0..NEGATIVE_SAMPLES {
                        let other = self.rng.gen_range(0..n);
                        if other == endpoint || neighbors[endpoint].contains(&other) {
                            continue;
                        }
                        repel(&mut y, endpoint, other, a, b, alpha);
                    }
                }
            }

            if (epoch + 1) % PROGRESS_EVERY == 0 || epoch + 1 == total {
                progress.report(Progress {
                    iteration: epoch + 1,
                    total_iterations: total,
                });
            }
        }

        Ok(Reduction {
            embedding: y,
            iterations: total,
            fallback: false,
        })
    }
}

#[inline]
fn clamp(g: f64) -> f64 {
    g.clamp(-GRADIENT_CLAMP, GRADIENT_CLAMP)
}

/// Pull `i` and `j` together along the (a, b) curve.
fn attract(y: &mut [[f64; 2]], i: usize, j: usize, weight: f64, a: f64, b: f64, alpha: f64) {
    let diff = [y[i][0] - y[j][0], y[i][1] - y[j][1]];
    let d2 = diff[0] * diff[0] + diff[1] * diff[1];
    if d2 <= 0.0 {
        return;
    }
    let coef = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
    for axis in 0..2 {
        let g = clamp(coef * weight * diff[axis]) * alpha;
        y[i][axis] += g;
        y[j][axis] -= g;
    }
}

/// Push `i` away from a sampled non-neighbor `k`; only `i` moves.
fn repel(y: &mut [[f64; 2]], i: usize, k: usize, a: f64, b: f64, alpha: f64) {
    let diff = [y[i][0] - y[k][0], y[i][1] - y[k][1]];
    let d2 = diff[0] * diff[0] + diff[1] * diff[1];
    let coef = 2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
    for axis in 0..2 {
        y[i][axis] += clamp(coef * diff[axis]) * alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(n_epochs: usize, seed: u64) -> UmapConfig {
        UmapConfig {
            n_neighbors: 5,
            min_dist: 0.1,
            n_epochs,
            seed: Some(seed),
        }
    }

    fn clusters(per: usize) -> Vec<Vec<f64>> {
        let centers = [[0.0, 0.0, 0.0], [20.0, 0.0, 0.0], [0.0, 20.0, 0.0]];
        let mut rows = Vec::new();
        for c in centers {
            for i in 0..per {
                let t = i as f64 * 0.1;
                rows.push(vec![c[0] + t, c[1] - t, c[2] + (t * 3.0).sin()]);
            }
        }
        rows
    }

    #[test]
    fn curve_params_for_default_min_dist() {
        let (a, b) = curve_params(0.1);
        assert!((a - (1.929 - 0.352 + 0.0573)).abs() < 1e-12);
        assert!((b - (0.7915 + 0.02045)).abs() < 1e-12);
    }

    #[test]
    fn small_inputs_skip_optimization() {
        let mut r = UmapReducer::new(config(200, 1));
        let mut events: Vec<Progress> = Vec::new();
        let data = vec![vec![1.0; 102]; 5];
        let out = r.fit_transform(&data, &mut events).unwrap();
        assert_eq!(out.iterations, 0);
        assert!(events.is_empty());
        assert_eq!(out.embedding.len(), 5);
        assert_eq!(r.total_iterations(5), 0);
    }

    #[test]
    fn progress_every_10_epochs() {
        let mut r = UmapReducer::new(config(35, 3));
        let mut events: Vec<Progress> = Vec::new();
        r.fit_transform(&clusters(6), &mut events).unwrap();
        let iterations: Vec<usize> = events.iter().map(|p| p.iteration).collect();
        assert_eq!(iterations, vec![10, 20, 30, 35]);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let data = clusters(6);
        let a = UmapReducer::new(config(30, 9)).fit_transform(&data, &mut ()).unwrap();
        let b = UmapReducer::new(config(30, 9)).fit_transform(&data, &mut ()).unwrap();
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn wide_input_is_projected_and_finite() {
        let data: Vec<Vec<f64>> = (0..12)
            .map(|i| (0..102).map(|d| ((i * d) as f64).cos()).collect())
            .collect();
        let out = UmapReducer::new(config(20, 4)).fit_transform(&data, &mut ()).unwrap();
        assert_eq!(out.embedding.len(), 12);
        assert!(out.embedding.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }
}
