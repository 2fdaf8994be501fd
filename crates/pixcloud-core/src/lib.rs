//! pixcloud Core Engine
//!
//! Places small 16x16 palette drawings on an infinite 2D canvas so that
//! similar drawings end up near each other.
//!
//! The pipeline, leaf first:
//!
//! - [`features`] turns a [`PixelGrid`] into a fixed-length feature vector
//! - [`reduce`] projects many vectors to 2D (UMAP-style or t-SNE-style)
//! - [`layout`] maps the raw embedding into world space and removes overlaps
//! - [`incremental`] places a single new item next to its nearest neighbors
//! - [`host`] runs reductions on a dedicated worker thread
//! - [`session`] ties it together for one visualization ([`Atlas`])
//!
//! # Features
//!
//! - `parallel` - Compute pairwise distance rows with rayon
//!
//! # Example
//!
//! ```rust
//! use pixcloud_core::features::{self, FeatureVariant};
//! use pixcloud_core::{FeatureWeights, PixelGrid};
//!
//! let grid = PixelGrid::blank();
//! let vector = features::extract(&grid, FeatureVariant::Enhanced, &FeatureWeights::default());
//! assert_eq!(vector.len(), 102);
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod host;
pub mod incremental;
pub mod item;
pub mod layout;
pub mod logging;
pub mod reduce;
pub mod session;
pub mod similarity;

// Re-export main types at crate root
pub use config::{
    AtlasConfig, FeatureWeights, IncrementalConfig, LayoutConfig, ReduceConfig, TsneConfig,
    UmapConfig, DEFAULT_INCREMENTAL_LIMIT,
};
pub use error::{AtlasError, ConfigError, HostError, ReduceError};
pub use features::{extract, FeatureVariant};
pub use host::{ComputationHost, HostEvent, Request, RequestId, Response};
pub use item::{Item, PixelGrid};
pub use layout::{place, LayoutMode, Position, PositionMap};
pub use reduce::{DimensionReducer, Embedding, Progress, ProgressSink, Reduction};
pub use session::{Atlas, AtlasEvent};
