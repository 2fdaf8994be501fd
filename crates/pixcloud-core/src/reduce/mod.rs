//! Dimensionality Reduction
//!
//! Two interchangeable projectors behind [`DimensionReducer`]:
//!
//! - [`UmapReducer`]: k-NN membership graph + edge-sampled SGD
//! - [`TsneReducer`]: PCA, perplexity-calibrated joint probabilities,
//!   momentum gradient descent
//!
//! [`reduce`] is the boundary every caller goes through. It never fails: a
//! reducer error, a panic, or a non-finite coordinate is logged and replaced
//! by a uniform random layout.

pub mod affinity;
pub mod pca;
mod tsne;
mod umap;

pub use tsne::TsneReducer;
pub use umap::UmapReducer;

use crate::config::ReduceConfig;
use crate::error::{ReduceError, ReduceResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Raw 2D coordinates, index-aligned with the input vectors.
pub type Embedding = Vec<[f64; 2]>;

/// Half-width of the random layouts used for tiny inputs and fallbacks.
pub const RANDOM_HALF_EXTENT: f64 = 5.0;

/// Progress notification emitted while optimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub iteration: usize,
    pub total_iterations: usize,
}

/// Receiver for progress notifications. Fire-and-forget: sinks must not
/// block the optimizer.
pub trait ProgressSink {
    fn report(&mut self, progress: Progress);
}

/// Discards progress.
impl ProgressSink for () {
    fn report(&mut self, _progress: Progress) {}
}

/// Collects progress (useful in tests and batch tools).
impl ProgressSink for Vec<Progress> {
    fn report(&mut self, progress: Progress) {
        self.push(progress);
    }
}

/// Result of one reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub embedding: Embedding,
    /// Optimizer iterations (t-SNE) or epochs (UMAP) actually run
    pub iterations: usize,
    /// True when the embedding is the random fallback
    pub fallback: bool,
}

impl Reduction {
    pub(crate) fn trivial(embedding: Embedding) -> Self {
        Self {
            embedding,
            iterations: 0,
            fallback: false,
        }
    }
}

/// Contract for dimensionality reduction backends.
///
/// Implementations own their RNG and configuration; `fit_transform` may be
/// called repeatedly. There is no `transform`: new points are placed by the
/// incremental projector instead.
pub trait DimensionReducer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Total iterations a run over `n_points` will report.
    fn total_iterations(&self, n_points: usize) -> usize;

    /// Fit on `data` (one row per point) and return 2D coordinates for all points.
    fn fit_transform(
        &mut self,
        data: &[Vec<f64>],
        progress: &mut dyn ProgressSink,
    ) -> ReduceResult<Reduction>;
}

impl ReduceConfig {
    /// Build the reducer this config describes.
    pub fn reducer(&self) -> Box<dyn DimensionReducer + Send> {
        match self {
            ReduceConfig::Umap(c) => Box::new(UmapReducer::new(c.clone())),
            ReduceConfig::Tsne(c) => Box::new(TsneReducer::new(c.clone())),
        }
    }
}

/// Run the configured reducer with the random-layout fallback.
pub fn reduce(config: &ReduceConfig, data: &[Vec<f64>], progress: &mut dyn ProgressSink) -> Reduction {
    let mut reducer = config.reducer();
    run_guarded(reducer.as_mut(), data, progress)
}

/// Run any reducer; errors, panics and non-finite output degrade to a
/// uniform random layout of the right length.
pub fn run_guarded(
    reducer: &mut dyn DimensionReducer,
    data: &[Vec<f64>],
    progress: &mut dyn ProgressSink,
) -> Reduction {
    let n = data.len();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| reducer.fit_transform(data, progress)));

    let err = match outcome {
        Ok(Ok(reduction)) => match check_output(&reduction.embedding, n) {
            Ok(()) => return reduction,
            Err(e) => e,
        },
        Ok(Err(e)) => e,
        Err(payload) => ReduceError::Panicked(panic_message(payload.as_ref())),
    };

    warn!(
        reducer = reducer.name(),
        points = n,
        error = %err,
        "reduction failed, falling back to random layout"
    );

    Reduction {
        embedding: random_embedding(n, &mut rand::thread_rng()),
        iterations: 0,
        fallback: true,
    }
}

/// Uniform random points in `[-5, 5]²`.
pub fn random_embedding<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Embedding {
    (0..n)
        .map(|_| {
            [
                (rng.gen::<f64>() - 0.5) * 2.0 * RANDOM_HALF_EXTENT,
                (rng.gen::<f64>() - 0.5) * 2.0 * RANDOM_HALF_EXTENT,
            ]
        })
        .collect()
}

/// Ensure every row has the same length; returns that length (0 for no rows).
pub(crate) fn validate_rows(data: &[Vec<f64>]) -> ReduceResult<usize> {
    let Some(first) = data.first() else {
        return Ok(0);
    };
    let expected = first.len();
    for (row, values) in data.iter().enumerate() {
        if values.len() != expected {
            return Err(ReduceError::DimensionMismatch {
                row,
                expected,
                found: values.len(),
            });
        }
    }
    Ok(expected)
}

fn check_output(embedding: &[[f64; 2]], expected: usize) -> ReduceResult<()> {
    if embedding.len() != expected {
        return Err(ReduceError::LengthMismatch {
            expected,
            found: embedding.len(),
        });
    }
    match embedding
        .iter()
        .position(|p| !(p[0].is_finite() && p[1].is_finite()))
    {
        Some(index) => Err(ReduceError::NonFinite { index }),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}
