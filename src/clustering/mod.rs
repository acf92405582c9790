//! Embedding-space clustering and 2D projection.
//!
//! [`ClusterEngine`] gathers vectors through the injected gateway traits,
//! labels them with a [`Clusterer`], projects them with a [`Reducer`] and
//! summarises every cluster. [`search_within_cluster`] filters a result the
//! caller kept from an earlier run.

mod engine;
#[cfg(feature = "density")]
pub mod hdbscan;
pub mod kmeans;
mod search;
mod strategy;
pub mod summary;
pub mod tsne;
mod types;
pub mod umap;

pub use engine::ClusterEngine;
pub use search::{ClusterMatch, DocumentMatch, search_within_cluster};
pub use strategy::{Clusterer, Reducer};
pub use summary::{STOP_WORDS, extract_keywords};
pub use types::{
    Algorithm, Capabilities, ClusterItem, ClusterLabel, ClusterPoint, ClusterRequest,
    ClusterResult, ClusterStats, ClusterSummary, Granularity, ItemMeta, ReductionMethod,
    RepresentativeDoc,
};
