//! t-SNE-style projector.

use super::affinity::{joint_probabilities, JointProbabilities};
use super::pca;
use super::{validate_rows, DimensionReducer, Embedding, Progress, ProgressSink, Reduction};
use crate::config::TsneConfig;
use crate::error::ReduceResult;
use crate::similarity::pairwise_squared_distances;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const PCA_MAX_COMPONENTS: usize = 16;
const EXAGGERATION: f64 = 4.0;
const EXAGGERATION_ITERS: usize = 100;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MOMENTUM_SWITCH_ITER: usize = 250;
const PROGRESS_EVERY: usize = 25;
const INIT_SCALE: f64 = 0.01;

/// Fixed layout for exactly two points.
pub(crate) const PAIR_LAYOUT: [[f64; 2]; 2] = [[-5.0, 0.0], [5.0, 0.0]];

pub struct TsneReducer {
    config: TsneConfig,
    rng: StdRng,
}

impl TsneReducer {
    pub fn new(config: TsneConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }
}

impl DimensionReducer for TsneReducer {
    fn name(&self) -> &'static str {
        "tsne"
    }

    fn total_iterations(&self, n_points: usize) -> usize {
        if n_points <= 2 {
            0
        } else {
            self.config.iterations
        }
    }

    fn fit_transform(
        &mut self,
        data: &[Vec<f64>],
        progress: &mut dyn ProgressSink,
    ) -> ReduceResult<Reduction> {
        let dims = validate_rows(data)?;
        let n = data.len();

        match n {
            0 => return Ok(Reduction::trivial(Vec::new())),
            1 => return Ok(Reduction::trivial(vec![[0.0, 0.0]])),
            2 => return Ok(Reduction::trivial(PAIR_LAYOUT.to_vec())),
            _ => {}
        }

        let components = PCA_MAX_COMPONENTS.min(dims).min(n - 1);
        let reduced = pca::project(data, components);
        let distances = pairwise_squared_distances(&reduced);
        let p = joint_probabilities(&distances, n, self.config.perplexity);
        debug!(points = n, dims, components, "tsne affinities ready");

        let total = self.config.iterations;
        let learning_rate = self.config.learning_rate;

        let mut y: Embedding = (0..n)
            .map(|_| {
                [
                    (self.rng.gen::<f64>() - 0.5) * INIT_SCALE,
                    (self.rng.gen::<f64>() - 0.5) * INIT_SCALE,
                ]
            })
            .collect();
        let mut velocity = vec![[0.0f64; 2]; n];
        let mut kernel = vec![0.0f64; n * n];
        let mut grad = vec![[0.0f64; 2]; n];

        for iter in 0..total {
            let exaggeration = if iter < EXAGGERATION_ITERS {
                EXAGGERATION
            } else {
                1.0
            };
            let momentum = if iter < MOMENTUM_SWITCH_ITER {
                INITIAL_MOMENTUM
            } else {
                FINAL_MOMENTUM
            };

            gradient(&y, &p, exaggeration, &mut kernel, &mut grad);

            for i in 0..n {
                for axis in 0..2 {
                    velocity[i][axis] = momentum * velocity[i][axis] - learning_rate * grad[i][axis];
                    y[i][axis] += velocity[i][axis];
                }
            }

            recenter(&mut y);

            if (iter + 1) % PROGRESS_EVERY == 0 || iter + 1 == total {
                progress.report(Progress {
                    iteration: iter + 1,
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

/// Fill `grad` with `4 (p_ij·exaggeration - q_ij) q_ij (y_i - y_j)` summed
/// over j, where `q_ij` is the Student-t kernel normalized over all pairs.
fn gradient(
    y: &[[f64; 2]],
    p: &JointProbabilities,
    exaggeration: f64,
    kernel: &mut [f64],
    grad: &mut [[f64; 2]],
) {
    let n = y.len();
    let mut mass = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = y[i][0] - y[j][0];
            let dy = y[i][1] - y[j][1];
            let k = 1.0 / (1.0 + dx * dx + dy * dy);
            kernel[i * n + j] = k;
            kernel[j * n + i] = k;
            mass += 2.0 * k;
        }
    }
    let mass = mass.max(f64::MIN_POSITIVE);

    for i in 0..n {
        let mut g = [0.0, 0.0];
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = kernel[i * n + j] / mass;
            let mult = 4.0 * (p.get(i, j) * exaggeration - q) * q;
            g[0] += mult * (y[i][0] - y[j][0]);
            g[1] += mult * (y[i][1] - y[j][1]);
        }
        grad[i] = g;
    }
}

fn recenter(y: &mut [[f64; 2]]) {
    if y.is_empty() {
        return;
    }
    let n = y.len() as f64;
    let mx = y.iter().map(|p| p[0]).sum::<f64>() / n;
    let my = y.iter().map(|p| p[1]).sum::<f64>() / n;
    for p in y.iter_mut() {
        p[0] -= mx;
        p[1] -= my;
    }
}
