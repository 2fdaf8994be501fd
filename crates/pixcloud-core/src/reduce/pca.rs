//! Principal component analysis by power iteration with deflation.
//!
//! Approximate: components are not re-orthogonalized after deflation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Power iterations per component.
const POWER_STEPS: usize = 100;

/// Seed for the starting vectors, so PCA is deterministic.
const START_SEED: u64 = 0x9ca;

/// Fitted projection.
#[derive(Debug, Clone)]
pub struct Pca {
    means: Vec<f64>,
    /// Unit eigenvectors, strongest first
    pub components: Vec<Vec<f64>>,
    /// Matching eigenvalues (variance along each component)
    pub eigenvalues: Vec<f64>,
}

impl Pca {
    /// Fit up to `n_components` components on `data` (rows of equal length).
    pub fn fit(data: &[Vec<f64>], n_components: usize) -> Self {
        let n = data.len();
        let dims = data.first().map_or(0, Vec::len);
        let means = column_means(data, dims);

        let mut cov = vec![0.0; dims * dims];
        if n > 1 {
            for row in data {
                for a in 0..dims {
                    let ca = row[a] - means[a];
                    for b in a..dims {
                        cov[a * dims + b] += ca * (row[b] - means[b]);
                    }
                }
            }
            let denom = (n - 1) as f64;
            for a in 0..dims {
                for b in a..dims {
                    let v = cov[a * dims + b] / denom;
                    cov[a * dims + b] = v;
                    cov[b * dims + a] = v;
                }
            }
        }

        let k = n_components.min(dims);
        let mut rng = StdRng::seed_from_u64(START_SEED);
        let mut components = Vec::with_capacity(k);
        let mut eigenvalues = Vec::with_capacity(k);

        for _ in 0..k {
            let mut v: Vec<f64> = (0..dims).map(|_| rng.gen::<f64>() - 0.5).collect();
            normalize(&mut v);

            for _ in 0..POWER_STEPS {
                let mut w = mat_vec(&cov, &v, dims);
                if norm(&w) < 1e-12 {
                    break;
                }
                normalize(&mut w);
                v = w;
            }

            let lambda = dot(&v, &mat_vec(&cov, &v, dims));

            // Deflate: cov -= lambda * v vᵀ
            for a in 0..dims {
                for b in 0..dims {
                    cov[a * dims + b] -= lambda * v[a] * v[b];
                }
            }

            components.push(v);
            eigenvalues.push(lambda);
        }

        Self {
            means,
            components,
            eigenvalues,
        }
    }

    /// Coordinates of one row in component space.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| {
                c.iter()
                    .zip(row.iter().zip(&self.means))
                    .map(|(ci, (x, m))| ci * (x - m))
                    .sum()
            })
            .collect()
    }

    pub fn transform(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data.iter().map(|row| self.transform_row(row)).collect()
    }
}

/// Fit and project in one step.
pub fn project(data: &[Vec<f64>], n_components: usize) -> Vec<Vec<f64>> {
    Pca::fit(data, n_components).transform(data)
}

fn column_means(data: &[Vec<f64>], dims: usize) -> Vec<f64> {
    let mut means = vec![0.0; dims];
    if data.is_empty() {
        return means;
    }
    for row in data {
        for (m, x) in means.iter_mut().zip(row) {
            *m += x;
        }
    }
    let n = data.len() as f64;
    for m in means.iter_mut() {
        *m /= n;
    }
    means
}

fn mat_vec(m: &[f64], v: &[f64], dims: usize) -> Vec<f64> {
    (0..dims)
        .map(|a| m[a * dims..(a + 1) * dims].iter().zip(v).map(|(x, y)| x * y).sum())
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

fn normalize(v: &mut [f64]) {
    let len = norm(v);
    if len > 0.0 {
        for x in v.iter_mut() {
            *x /= len;
        }
    }
}
