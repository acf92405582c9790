//! Algorithm selection. A request resolves to one [`Clusterer`] and one
//! [`Reducer`]; the engine never branches on algorithm names itself.

use crate::clustering::kmeans::{KMeansParams, kmeans};
use crate::clustering::tsne::{TsneParams, tsne};
use crate::clustering::umap::{UmapParams, umap};
use crate::clustering::{Algorithm, ClusterLabel, ClusterRequest, ReductionMethod};
use crate::config::ClusteringConfig;
use crate::error::{ClusterError, ClusterOpResult};

/// How items are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clusterer {
    /// Exactly `k` non-empty clusters
    Partition { k: usize },
    /// Dense regions of at least `min_cluster_size` items, the rest is noise
    Density { min_cluster_size: usize },
}

impl Clusterer {
    /// Resolve a request against the configured defaults.
    ///
    /// `k` is not yet clamped to the item count; [`Clusterer::fit`] does that.
    pub fn from_request(request: &ClusterRequest, config: &ClusteringConfig) -> ClusterOpResult<Self> {
        match request.algorithm {
            Algorithm::KMeans => {
                let k = request.n_clusters.unwrap_or(config.n_clusters);
                if k == 0 {
                    return Err(ClusterError::invalid("n_clusters must be at least 1"));
                }
                Ok(Self::Partition { k })
            }
            Algorithm::Hdbscan => {
                if !Algorithm::Hdbscan.is_available() {
                    return Err(ClusterError::UnavailableCapability {
                        capability: "hdbscan".to_string(),
                        reason: "density clustering was not compiled into this build".to_string(),
                    });
                }
                let min_cluster_size = request.min_cluster_size.unwrap_or(config.min_cluster_size);
                if min_cluster_size < 2 {
                    return Err(ClusterError::invalid("min_cluster_size must be at least 2"));
                }
                Ok(Self::Density { min_cluster_size })
            }
        }
    }

    /// Label every vector.
    pub fn fit(&self, vectors: &[Vec<f32>], config: &ClusteringConfig) -> ClusterOpResult<Vec<ClusterLabel>> {
        match *self {
            Self::Partition { k } => {
                let params = KMeansParams {
                    k: k.min(vectors.len()),
                    n_init: config.n_init,
                    max_iterations: config.max_iterations,
                    seed: config.seed,
                };
                let result = kmeans(vectors, &params)?;
                Ok(result.labels.into_iter().map(ClusterLabel::from_index).collect())
            }
            Self::Density { min_cluster_size } => fit_density(vectors, min_cluster_size),
        }
    }
}

#[cfg(feature = "density")]
fn fit_density(vectors: &[Vec<f32>], min_cluster_size: usize) -> ClusterOpResult<Vec<ClusterLabel>> {
    use crate::clustering::hdbscan::{HdbscanParams, hdbscan};
    hdbscan(vectors, &HdbscanParams::new(min_cluster_size))
}

#[cfg(not(feature = "density"))]
fn fit_density(_vectors: &[Vec<f32>], _min_cluster_size: usize) -> ClusterOpResult<Vec<ClusterLabel>> {
    Err(ClusterError::UnavailableCapability {
        capability: "hdbscan".to_string(),
        reason: "density clustering was not compiled into this build".to_string(),
    })
}

/// How items are projected to 2D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Cosine neighbour graph with fuzzy union, optimised by SGD
    NeighborGraph,
    /// Exact t-SNE over Euclidean distances
    Stochastic,
}

impl From<ReductionMethod> for Reducer {
    fn from(method: ReductionMethod) -> Self {
        match method {
            ReductionMethod::Umap => Self::NeighborGraph,
            ReductionMethod::Tsne => Self::Stochastic,
        }
    }
}

impl Reducer {
    /// Two coordinates per vector, deterministic for `seed`.
    #[must_use]
    pub fn project(&self, vectors: &[Vec<f32>], seed: u64) -> Vec<[f32; 2]> {
        match self {
            Self::NeighborGraph => umap(vectors, &UmapParams::new(seed)),
            Self::Stochastic => tsne(vectors, &TsneParams::new(seed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_from_request() {
        let config = ClusteringConfig::default();
        let request = ClusterRequest::default().with_n_clusters(3);
        assert_eq!(
            Clusterer::from_request(&request, &config).unwrap(),
            Clusterer::Partition { k: 3 }
        );

        let defaulted = Clusterer::from_request(&ClusterRequest::default(), &config).unwrap();
        assert_eq!(defaulted, Clusterer::Partition { k: config.n_clusters });

        let zero = ClusterRequest::default().with_n_clusters(0);
        assert!(matches!(
            Clusterer::from_request(&zero, &config),
            Err(ClusterError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_density_from_request() {
        let config = ClusteringConfig::default();
        let request = ClusterRequest::default()
            .with_algorithm(Algorithm::Hdbscan)
            .with_min_cluster_size(4);
        let result = Clusterer::from_request(&request, &config);

        if cfg!(feature = "density") {
            assert_eq!(result.unwrap(), Clusterer::Density { min_cluster_size: 4 });
        } else {
            assert!(matches!(result, Err(ClusterError::UnavailableCapability { .. })));
        }
    }

    #[test]
    fn test_partition_clamps_k_to_item_count() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let labels = Clusterer::Partition { k: 5 }
            .fit(&vectors, &ClusteringConfig::default())
            .unwrap();
        assert_eq!(labels, vec![ClusterLabel::new(0), ClusterLabel::new(1)]);
    }

    #[test]
    fn test_reducer_from_method() {
        assert_eq!(Reducer::from(ReductionMethod::Umap), Reducer::NeighborGraph);
        assert_eq!(Reducer::from(ReductionMethod::Tsne), Reducer::Stochastic);
    }
}
