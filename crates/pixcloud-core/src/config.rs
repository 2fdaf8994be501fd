//! Configuration types.
//!
//! Wire names follow the request shape exchanged with the computation host
//! (`nNeighbors`, `minDist`, `nEpochs`, `perplexity`, `iterations`,
//! `learningRate`). Every field has a default so partial JSON works.

use crate::error::ConfigError;
use crate::features::FeatureVariant;
use crate::layout::LayoutMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Items that may be placed incrementally before a full recompute is forced.
pub const DEFAULT_INCREMENTAL_LIMIT: usize = 5;

/// Per-group scale factors for the enhanced feature vector.
///
/// A weight of 0 excludes the group (its slots stay zero so the vector
/// length never changes). The color histogram is a distribution, so its
/// weight only gates it on or off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureWeights {
    pub color: f64,
    pub adjacency: f64,
    pub symmetry: f64,
    pub structure: f64,
    pub components: f64,
    pub density: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            color: 1.0,
            adjacency: 1.0,
            symmetry: 1.0,
            structure: 1.0,
            components: 1.0,
            density: 1.0,
        }
    }
}

impl FeatureWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("weights.color", self.color),
            ("weights.adjacency", self.adjacency),
            ("weights.symmetry", self.symmetry),
            ("weights.structure", self.structure),
            ("weights.components", self.components),
            ("weights.density", self.density),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be a finite non-negative number, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

/// UMAP-style projector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UmapConfig {
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    #[serde(default = "default_min_dist")]
    pub min_dist: f64,
    #[serde(default = "default_n_epochs")]
    pub n_epochs: usize,
    /// Fixed RNG seed; `None` draws from entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_n_neighbors() -> usize {
    15
}
fn default_min_dist() -> f64 {
    0.1
}
fn default_n_epochs() -> usize {
    200
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            min_dist: default_min_dist(),
            n_epochs: default_n_epochs(),
            seed: None,
        }
    }
}

impl UmapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_neighbors < 1 {
            return Err(ConfigError::invalid("nNeighbors", "must be at least 1"));
        }
        if !(self.min_dist.is_finite() && self.min_dist > 0.0) {
            return Err(ConfigError::invalid(
                "minDist",
                format!("must be positive, got {}", self.min_dist),
            ));
        }
        if self.n_epochs < 1 {
            return Err(ConfigError::invalid("nEpochs", "must be at least 1"));
        }
        Ok(())
    }
}

/// t-SNE-style projector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsneConfig {
    #[serde(default = "default_perplexity")]
    pub perplexity: f64,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_perplexity() -> f64 {
    30.0
}
fn default_iterations() -> usize {
    500
}
fn default_learning_rate() -> f64 {
    100.0
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: default_perplexity(),
            iterations: default_iterations(),
            learning_rate: default_learning_rate(),
            seed: None,
        }
    }
}

impl TsneConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.perplexity.is_finite() && self.perplexity > 0.0) {
            return Err(ConfigError::invalid(
                "perplexity",
                format!("must be positive, got {}", self.perplexity),
            ));
        }
        if self.iterations < 1 {
            return Err(ConfigError::invalid("iterations", "must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::invalid(
                "learningRate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        Ok(())
    }
}

/// Which projector to run, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum ReduceConfig {
    Umap(UmapConfig),
    Tsne(TsneConfig),
}

impl Default for ReduceConfig {
    fn default() -> Self {
        ReduceConfig::Umap(UmapConfig::default())
    }
}

impl ReduceConfig {
    /// Short algorithm name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReduceConfig::Umap(_) => "umap",
            ReduceConfig::Tsne(_) => "tsne",
        }
    }

    /// Feature variant this projector consumes.
    pub fn feature_variant(&self) -> FeatureVariant {
        match self {
            ReduceConfig::Umap(_) => FeatureVariant::Enhanced,
            ReduceConfig::Tsne(_) => FeatureVariant::Invariant,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ReduceConfig::Umap(c) => c.validate(),
            ReduceConfig::Tsne(c) => c.validate(),
        }
    }

    /// Same algorithm with default options.
    pub fn defaults_like(&self) -> Self {
        match self {
            ReduceConfig::Umap(_) => ReduceConfig::Umap(UmapConfig::default()),
            ReduceConfig::Tsne(_) => ReduceConfig::Tsne(TsneConfig::default()),
        }
    }

    /// Return self if valid, otherwise the algorithm's defaults.
    pub fn sanitized(self) -> (Self, Option<ConfigError>) {
        match self.validate() {
            Ok(()) => (self, None),
            Err(e) => (self.defaults_like(), Some(e)),
        }
    }
}

/// World-space layout options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// World units per item along one axis before the sqrt(N) scaling
    pub base_spacing: f64,
    pub density_multiplier: f64,
    /// Floor on the side length of the cluster square
    pub min_spread: f64,
    /// Minimum distance between any two placed items
    pub min_spacing: f64,
    pub relax_passes: usize,
    /// Timeline mode y-spread as a fraction of the cluster spread
    pub timeline_y_factor: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_spacing: 40.0,
            density_multiplier: 1.0,
            min_spread: 400.0,
            min_spacing: 36.0,
            relax_passes: 8,
            timeline_y_factor: 0.6,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("layout.baseSpacing", self.base_spacing),
            ("layout.densityMultiplier", self.density_multiplier),
            ("layout.minSpacing", self.min_spacing),
            ("layout.timelineYFactor", self.timeline_y_factor),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be positive, got {}", value),
                ));
            }
        }
        if !(self.min_spread.is_finite() && self.min_spread >= 0.0) {
            return Err(ConfigError::invalid(
                "layout.minSpread",
                format!("must be non-negative, got {}", self.min_spread),
            ));
        }
        Ok(())
    }
}

/// Incremental projector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncrementalConfig {
    /// Items placed incrementally before falling back to a full recompute
    pub limit: usize,
    /// Nearest neighbors blended into a projected position
    pub neighbors: usize,
    /// Radius of the deterministic anti-overlap offset
    pub offset_scale: f64,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_INCREMENTAL_LIMIT,
            neighbors: 5,
            offset_scale: 6.0,
        }
    }
}

impl IncrementalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.neighbors < 1 {
            return Err(ConfigError::invalid(
                "incremental.neighbors",
                "must be at least 1",
            ));
        }
        if !(self.offset_scale.is_finite() && self.offset_scale >= 0.0) {
            return Err(ConfigError::invalid(
                "incremental.offsetScale",
                format!("must be non-negative, got {}", self.offset_scale),
            ));
        }
        Ok(())
    }
}

/// Everything one visualization needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtlasConfig {
    pub reduce: ReduceConfig,
    pub weights: FeatureWeights,
    pub layout: LayoutConfig,
    pub mode: LayoutMode,
    pub incremental: IncrementalConfig,
    /// Quiet period after the last change before a recompute is submitted
    pub debounce_ms: u64,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            reduce: ReduceConfig::default(),
            weights: FeatureWeights::default(),
            layout: LayoutConfig::default(),
            mode: LayoutMode::default(),
            incremental: IncrementalConfig::default(),
            debounce_ms: 300,
        }
    }
}

impl AtlasConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AtlasConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reduce.validate()?;
        self.weights.validate()?;
        self.layout.validate()?;
        self.incremental.validate()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn umap_wire_names() {
        let json = r#"{"algorithm":"umap","nNeighbors":8,"minDist":0.25,"nEpochs":50}"#;
        let config: ReduceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            ReduceConfig::Umap(UmapConfig {
                n_neighbors: 8,
                min_dist: 0.25,
                n_epochs: 50,
                seed: None,
            })
        );
    }

    #[test]
    fn tsne_wire_names_with_defaults() {
        let json = r#"{"algorithm":"tsne","learningRate":50}"#;
        let config: ReduceConfig = serde_json::from_str(json).unwrap();
        match config {
            ReduceConfig::Tsne(c) => {
                assert_eq!(c.learning_rate, 50.0);
                assert_eq!(c.perplexity, 30.0);
                assert_eq!(c.iterations, 500);
            }
            other => panic!("expected tsne config, got {:?}", other),
        }
    }

    #[test]
    fn invalid_values_rejected() {
        let bad = ReduceConfig::Umap(UmapConfig {
            min_dist: 0.0,
            ..UmapConfig::default()
        });
        assert!(bad.validate().is_err());

        let bad = ReduceConfig::Tsne(TsneConfig {
            iterations: 0,
            ..TsneConfig::default()
        });
        assert!(bad.validate().is_err());

        let weights = FeatureWeights {
            density: -1.0,
            ..FeatureWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn sanitized_falls_back_to_same_algorithm_defaults() {
        let bad = ReduceConfig::Tsne(TsneConfig {
            perplexity: f64::NAN,
            ..TsneConfig::default()
        });
        let (fixed, err) = bad.sanitized();
        assert!(err.is_some());
        assert_eq!(fixed, ReduceConfig::Tsne(TsneConfig::default()));
    }

    #[test]
    fn feature_variant_per_algorithm() {
        assert_eq!(
            ReduceConfig::Umap(UmapConfig::default()).feature_variant(),
            FeatureVariant::Enhanced
        );
        assert_eq!(
            ReduceConfig::Tsne(TsneConfig::default()).feature_variant(),
            FeatureVariant::Invariant
        );
    }

    #[test]
    fn atlas_config_partial_json() {
        let json = r#"{"mode":"timeline","incremental":{"limit":3},"weights":{"symmetry":0}}"#;
        let config = AtlasConfig::from_json_str(json).unwrap();
        assert_eq!(config.mode, LayoutMode::Timeline);
        assert_eq!(config.incremental.limit, 3);
        assert_eq!(config.incremental.neighbors, 5);
        assert_eq!(config.weights.symmetry, 0.0);
        assert_eq!(config.weights.color, 1.0);
        assert_eq!(config.debounce_ms, 300);
    }

    #[test]
    fn atlas_config_rejects_invalid_layout() {
        let json = r#"{"layout":{"minSpacing":0}}"#;
        let err = AtlasConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("minSpacing"), "got {}", err);
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let err = AtlasConfig::from_file("/nonexistent/pixcloud.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
