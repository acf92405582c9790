//! Request and result types for clustering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ClusteringConfig;
use crate::documents::DocumentId;
use crate::error::{ClusterError, ClusterOpResult};

/// Clustering algorithm chosen by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Partition-based k-means
    #[serde(rename = "kmeans")]
    KMeans,
    /// Density-based HDBSCAN, may label points as noise
    #[serde(rename = "hdbscan")]
    Hdbscan,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::KMeans, Algorithm::Hdbscan];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::Hdbscan => "hdbscan",
        }
    }

    /// Whether this build can run the algorithm.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self {
            Self::KMeans => true,
            Self::Hdbscan => cfg!(feature = "density"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmeans" | "k-means" | "partition" => Ok(Self::KMeans),
            "hdbscan" | "density" => Ok(Self::Hdbscan),
            other => Err(ClusterError::invalid(format!(
                "unknown clustering algorithm '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2D projection method chosen by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    Umap,
    Tsne,
}

impl ReductionMethod {
    pub const ALL: [ReductionMethod; 2] = [ReductionMethod::Umap, ReductionMethod::Tsne];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Umap => "umap",
            Self::Tsne => "tsne",
        }
    }
}

impl FromStr for ReductionMethod {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "umap" => Ok(Self::Umap),
            "tsne" | "t-sne" => Ok(Self::Tsne),
            other => Err(ClusterError::invalid(format!(
                "unknown reduction method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether whole documents or individual chunks are clustered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Document,
    Chunk,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Document, Granularity::Chunk];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Chunk => "chunk",
        }
    }
}

impl FromStr for Granularity {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "documents" => Ok(Self::Document),
            "chunk" | "chunks" => Ok(Self::Chunk),
            other => Err(ClusterError::invalid(format!("unknown level '{other}'"))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster label of a point. `-1` marks noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterLabel(i32);

impl ClusterLabel {
    pub const NOISE: Self = Self(-1);

    #[must_use]
    pub const fn new(label: i32) -> Self {
        Self(label)
    }

    /// Label for a 0-based cluster index.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(i32::try_from(index).unwrap_or(i32::MAX))
    }

    #[must_use]
    pub const fn get(&self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_noise(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata carried from an input item to its output point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Document id at document level, chunk id at chunk level
    pub id: u32,
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_content: Option<String>,
}

impl ItemMeta {
    /// Text fields keywords are drawn from.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.filename.as_str())
            .chain(self.description.as_deref())
            .chain(self.chunk_content.as_deref())
    }
}

/// One vector to cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterItem {
    pub vector: Vec<f32>,
    pub meta: ItemMeta,
}

/// A projected, labelled item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub x: f32,
    pub y: f32,
    pub cluster_id: ClusterLabel,
    #[serde(flatten)]
    pub meta: ItemMeta,
}

/// A document represented in a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeDoc {
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Points of this document in the cluster
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: ClusterLabel,
    pub size: usize,
    pub representative_docs: Vec<RepresentativeDoc>,
    pub keywords: Vec<String>,
    /// Mean of the member vectors in the original embedding space
    pub centroid: Vec<f32>,
}

/// Output of one clustering run. Held by the caller, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub points: Vec<ClusterPoint>,
    pub summaries: Vec<ClusterSummary>,
    pub algorithm: Algorithm,
    /// Distinct non-noise labels actually produced
    pub n_clusters: usize,
    pub reduction_method: ReductionMethod,
    pub level: Granularity,
}

impl ClusterResult {
    /// The result returned when there is not enough data to cluster.
    #[must_use]
    pub fn empty(request: &ClusterRequest) -> Self {
        Self {
            points: Vec::new(),
            summaries: Vec::new(),
            algorithm: request.algorithm,
            n_clusters: 0,
            reduction_method: request.reduction_method,
            level: request.level,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points carrying `label`, in result order.
    pub fn points_in(&self, label: ClusterLabel) -> impl Iterator<Item = &ClusterPoint> {
        self.points.iter().filter(move |p| p.cluster_id == label)
    }
}

/// Parameters of a clustering request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRequest {
    pub algorithm: Algorithm,
    /// Target cluster count for k-means, the configured default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<usize>,
    /// Minimum cluster size for HDBSCAN, the configured default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cluster_size: Option<usize>,
    pub reduction_method: ReductionMethod,
    pub level: Granularity,
}

impl ClusterRequest {
    /// The request described by the configured defaults.
    pub fn from_config(config: &ClusteringConfig) -> ClusterOpResult<Self> {
        Ok(Self {
            algorithm: config.algorithm.parse()?,
            n_clusters: None,
            min_cluster_size: None,
            reduction_method: config.reduction_method.parse()?,
            level: config.level.parse()?,
        })
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = Some(n_clusters);
        self
    }

    #[must_use]
    pub fn with_min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        self.min_cluster_size = Some(min_cluster_size);
        self
    }

    #[must_use]
    pub fn with_reduction(mut self, reduction_method: ReductionMethod) -> Self {
        self.reduction_method = reduction_method;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: Granularity) -> Self {
        self.level = level;
        self
    }
}

impl Default for ClusterRequest {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::KMeans,
            n_clusters: None,
            min_cluster_size: None,
            reduction_method: ReductionMethod::Tsne,
            level: Granularity::Document,
        }
    }
}

/// Aggregate numbers about a clustering result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_points: usize,
    pub n_clusters: usize,
    pub algorithm: Algorithm,
    pub reduction_method: ReductionMethod,
    pub level: Granularity,
    pub cluster_sizes: BTreeMap<ClusterLabel, usize>,
    pub noise_points: usize,
}

impl From<&ClusterResult> for ClusterStats {
    fn from(result: &ClusterResult) -> Self {
        Self {
            total_points: result.points.len(),
            n_clusters: result.n_clusters,
            algorithm: result.algorithm,
            reduction_method: result.reduction_method,
            level: result.level,
            cluster_sizes: result
                .summaries
                .iter()
                .map(|s| (s.cluster_id, s.size))
                .collect(),
            noise_points: result
                .points
                .iter()
                .filter(|p| p.cluster_id.is_noise())
                .count(),
        }
    }
}

/// What this build can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub algorithms: Vec<String>,
    pub reduction_methods: Vec<String>,
    pub levels: Vec<String>,
}

impl Capabilities {
    #[must_use]
    pub fn current() -> Self {
        Self {
            algorithms: Algorithm::ALL
                .iter()
                .filter(|a| a.is_available())
                .map(|a| a.as_str().to_string())
                .collect(),
            reduction_methods: ReductionMethod::ALL
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            levels: Granularity::ALL
                .iter()
                .map(|l| l.as_str().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse() {
        assert_eq!("kmeans".parse::<Algorithm>().unwrap(), Algorithm::KMeans);
        assert_eq!("Density".parse::<Algorithm>().unwrap(), Algorithm::Hdbscan);
        assert_eq!("tsne".parse::<ReductionMethod>().unwrap(), ReductionMethod::Tsne);
        assert_eq!("chunk".parse::<Granularity>().unwrap(), Granularity::Chunk);

        let err = "spectral".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, ClusterError::InvalidRequest { .. }));
        assert!(err.to_string().contains("spectral"));
        assert!("pca".parse::<ReductionMethod>().is_err());
        assert!("page".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_request_from_config() {
        let request = ClusterRequest::from_config(&ClusteringConfig::default()).unwrap();
        assert_eq!(request.algorithm, Algorithm::KMeans);
        assert_eq!(request.reduction_method, ReductionMethod::Tsne);
        assert_eq!(request.level, Granularity::Document);

        let config = ClusteringConfig {
            reduction_method: "lda".to_string(),
            ..ClusteringConfig::default()
        };
        assert!(ClusterRequest::from_config(&config).is_err());
    }

    #[test]
    fn test_point_serializes_flat() {
        let point = ClusterPoint {
            x: 1.0,
            y: -2.0,
            cluster_id: ClusterLabel::NOISE,
            meta: ItemMeta {
                id: 4,
                document_id: DocumentId::new(2).unwrap(),
                filename: "a.md".to_string(),
                description: None,
                chunk_index: Some(0),
                chunk_content: Some("text".to_string()),
            },
        };

        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["cluster_id"], -1);
        assert_eq!(json["document_id"], 2);
        assert_eq!(json["chunk_index"], 0);
        assert!(json.get("description").is_none());

        let back: ClusterPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_capabilities_list_kmeans() {
        let caps = Capabilities::current();
        assert!(caps.algorithms.contains(&"kmeans".to_string()));
        assert_eq!(
            caps.algorithms.contains(&"hdbscan".to_string()),
            cfg!(feature = "density")
        );
        assert_eq!(caps.reduction_methods, vec!["umap", "tsne"]);
    }
}
