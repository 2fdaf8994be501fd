//! Feature Extraction
//!
//! Turns a 16x16 palette drawing into a fixed-length vector. Two variants:
//!
//! - **Enhanced** (102 dims): color statistics, symmetry, structure,
//!   connected components and spatial density, each group scaled by a
//!   [`FeatureWeights`] entry
//! - **Invariant** (64 dims): a recentered, 8-orientation averaged 8x8
//!   thumbnail, insensitive to translation, rotation and reflection
//!
//! Extraction is pure and total: malformed pixel input is sanitized by
//! [`PixelGrid`], and an empty drawing yields zeros instead of NaN.
//!
//! # Example
//!
//! ```rust
//! use pixcloud_core::features::{extract_raw, FeatureVariant};
//! use pixcloud_core::FeatureWeights;
//!
//! // Too short, with an out-of-range color: still a 64-value vector
//! let v = extract_raw(&[0, 0, 42], FeatureVariant::Invariant, &FeatureWeights::default());
//! assert_eq!(v.len(), 64);
//! ```

mod components;
pub mod enhanced;
pub mod invariant;

pub use crate::config::FeatureWeights;
pub use components::{connected_components, Component};

use crate::item::PixelGrid;
use serde::{Deserialize, Serialize};

/// Length of an enhanced feature vector.
pub const ENHANCED_DIMS: usize = 102;

/// Length of an invariant feature vector.
pub const INVARIANT_DIMS: usize = 64;

/// Which descriptor to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureVariant {
    Enhanced,
    Invariant,
}

impl FeatureVariant {
    pub fn dims(self) -> usize {
        match self {
            FeatureVariant::Enhanced => ENHANCED_DIMS,
            FeatureVariant::Invariant => INVARIANT_DIMS,
        }
    }
}

impl std::str::FromStr for FeatureVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enhanced" => Ok(FeatureVariant::Enhanced),
            "invariant" => Ok(FeatureVariant::Invariant),
            other => Err(format!(
                "unknown feature variant '{}', expected enhanced or invariant",
                other
            )),
        }
    }
}

/// Compute the feature vector for a grid.
///
/// `weights` only affects the enhanced variant.
pub fn extract(grid: &PixelGrid, variant: FeatureVariant, weights: &FeatureWeights) -> Vec<f64> {
    match variant {
        FeatureVariant::Enhanced => enhanced::extract(grid, weights),
        FeatureVariant::Invariant => invariant::extract(grid),
    }
}

/// Sanitize raw color indices, then [`extract`].
pub fn extract_raw(raw: &[i64], variant: FeatureVariant, weights: &FeatureWeights) -> Vec<f64> {
    extract(&PixelGrid::from_raw(raw), variant, weights)
}

/// `num / den`, or 0 when there is nothing to divide by.
#[inline]
pub(crate) fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}
