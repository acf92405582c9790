//! End-to-end clustering over ingested documents.

use crate::common::{COOKING_DOCS, FINANCE_DOCS, TestProject, add_topic_docs};
use docatlas::clustering::{
    Algorithm, ClusterEngine, ClusterLabel, ClusterMatch, ClusterRequest, ClusterResult,
    ClusterStats, Granularity, ReductionMethod, search_within_cluster,
};
use docatlas::config::{ClusteringConfig, FetchConfig};
use docatlas::documents::{DocumentRecord, Principal, Visibility};
use docatlas::error::{GatewayError, GatewayResult};
use docatlas::vector::{
    DocumentSource, MemoryVectorStore, Neighbor, SearchFilter, VectorGateway, VectorId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn engine(store: &Arc<MemoryVectorStore>) -> ClusterEngine {
    ClusterEngine::new(
        store.clone(),
        store.clone(),
        ClusteringConfig::default(),
        FetchConfig::default(),
    )
}

fn topic_of(filename: &str) -> &'static str {
    let finance = FINANCE_DOCS.iter().any(|(path, _)| path.ends_with(filename));
    let cooking = COOKING_DOCS.iter().any(|(path, _)| path.ends_with(filename));
    match (finance, cooking) {
        (true, false) => "finance",
        (false, true) => "cooking",
        _ => panic!("unknown document {filename}"),
    }
}

/// Every cluster holds a single topic.
fn assert_clusters_are_pure(result: &ClusterResult) {
    let mut topics: BTreeMap<ClusterLabel, BTreeSet<&str>> = BTreeMap::new();
    for point in result.points.iter().filter(|p| !p.cluster_id.is_noise()) {
        topics
            .entry(point.cluster_id)
            .or_default()
            .insert(topic_of(&point.meta.filename));
    }
    for (label, names) in topics {
        assert_eq!(names.len(), 1, "cluster {label} mixes topics {names:?}");
    }
}

fn assert_summaries_consistent(result: &ClusterResult) {
    let labelled = result.points.iter().filter(|p| !p.cluster_id.is_noise()).count();
    let summarized: usize = result.summaries.iter().map(|s| s.size).sum();
    assert_eq!(labelled, summarized);
    assert_eq!(result.n_clusters, result.summaries.len());
    for summary in &result.summaries {
        assert_eq!(summary.size, result.points_in(summary.cluster_id).count());
        assert!(summary.representative_docs.len() <= 3);
    }
}

#[test]
fn test_kmeans_separates_topics() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let request = ClusterRequest::default()
        .with_n_clusters(2)
        .with_reduction(ReductionMethod::Umap);
    let result = engine(&project.store)
        .generate_for(&Principal::new(1), &request)
        .unwrap();

    assert_eq!(result.points.len(), 6);
    assert_eq!(result.n_clusters, 2);
    assert_eq!(result.level, Granularity::Document);
    assert!(result.points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    assert_clusters_are_pure(&result);
    assert_summaries_consistent(&result);
}

#[cfg(feature = "density")]
#[test]
fn test_hdbscan_on_chunks() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let request = ClusterRequest::default()
        .with_algorithm(Algorithm::Hdbscan)
        .with_min_cluster_size(2)
        .with_level(Granularity::Chunk);
    let result = engine(&project.store)
        .generate_for(&Principal::new(1), &request)
        .unwrap();

    assert_eq!(result.points.len(), 6);
    assert_eq!(result.n_clusters, 2);
    assert!(result.points.iter().all(|p| p.meta.chunk_index == Some(0)));
    assert_clusters_are_pure(&result);
    assert_summaries_consistent(&result);
}

#[test]
fn test_result_round_trips_for_cluster_search() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let request = ClusterRequest::default()
        .with_algorithm(Algorithm::KMeans)
        .with_n_clusters(2)
        .with_level(Granularity::Chunk);
    let result = engine(&project.store)
        .generate_for(&Principal::new(1), &request)
        .unwrap();

    let path = project.path().join("clusters.json");
    std::fs::write(&path, serde_json::to_string_pretty(&result).unwrap()).unwrap();
    let restored: ClusterResult =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(restored, result);
    assert_clusters_are_pure(&restored);

    let keywords: BTreeSet<&str> = restored
        .summaries
        .iter()
        .flat_map(|s| s.keywords.iter().map(String::as_str))
        .collect();
    assert!(keywords.contains("baking"));
    assert!(keywords.contains("ledger"));

    let label = restored.summaries[0].cluster_id;
    let points = search_within_cluster(&restored, label, None, 10);
    assert_eq!(points.len(), restored.summaries[0].size);

    let documents = search_within_cluster(&restored, label, Some("oven"), 2);
    assert_eq!(documents.len(), 2);
    let ids: Vec<u32> = documents
        .iter()
        .map(|m| match m {
            ClusterMatch::Document(doc) => doc.document_id.get(),
            ClusterMatch::Point(_) => panic!("query listing returns documents"),
        })
        .collect();
    assert!(ids.windows(2).all(|w| w[0] <= w[1]));

    let stats = ClusterStats::from(&restored);
    assert_eq!(stats.total_points, 6);
    assert_eq!(stats.cluster_sizes.values().sum::<usize>(), 6);
    assert_eq!(stats.noise_points, 0);
}

#[test]
fn test_same_seed_same_result() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let request = ClusterRequest::default().with_n_clusters(2);
    let first = engine(&project.store)
        .generate_for(&Principal::new(1), &request)
        .unwrap();
    let second = engine(&project.store)
        .generate_for(&Principal::new(1), &request)
        .unwrap();
    assert_eq!(first, second);
}

/// Fails every lookup for the listed vector ids.
struct LossyGateway {
    inner: Arc<MemoryVectorStore>,
    failing: BTreeSet<u32>,
}

impl VectorGateway for LossyGateway {
    fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        self.inner.embed(text)
    }

    fn get_vector(&self, id: VectorId) -> GatewayResult<Option<Vec<f32>>> {
        if self.failing.contains(&id.get()) {
            return Err(GatewayError::Unavailable(format!("vector {id} timed out")));
        }
        self.inner.get_vector(id)
    }

    fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> GatewayResult<Vec<Neighbor>> {
        self.inner.nearest_neighbors(query, k, filter)
    }
}

fn lossy_engine(store: &Arc<MemoryVectorStore>, failing: impl IntoIterator<Item = u32>) -> ClusterEngine {
    let source: Arc<dyn DocumentSource> = store.clone();
    let gateway = Arc::new(LossyGateway {
        inner: store.clone(),
        failing: failing.into_iter().collect(),
    });
    ClusterEngine::new(
        gateway,
        source,
        ClusteringConfig::default(),
        FetchConfig {
            concurrency: 2,
            retry_attempts: 0,
            retry_backoff_ms: 0,
        },
    )
}

fn all_vector_ids(store: &MemoryVectorStore) -> Vec<u32> {
    store
        .list_accessible_documents(&Principal::new(1))
        .unwrap()
        .iter()
        .flat_map(|doc: &DocumentRecord| doc.chunks.iter().map(|c| c.vector_id.get()))
        .collect()
}

#[test]
fn test_failed_fetches_are_skipped() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let ids = all_vector_ids(&project.store);
    let request = ClusterRequest::default().with_n_clusters(2);
    let result = lossy_engine(&project.store, ids[..2].iter().copied())
        .generate_for(&Principal::new(1), &request)
        .unwrap();

    assert_eq!(result.points.len(), 4);
    assert_summaries_consistent(&result);
}

#[test]
fn test_all_fetches_failing_gives_empty_result() {
    let project = TestProject::new();
    add_topic_docs(&project);
    project.ingest_all(1, Visibility::Private);

    let ids = all_vector_ids(&project.store);
    let result = lossy_engine(&project.store, ids)
        .generate_for(&Principal::new(1), &ClusterRequest::default())
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.n_clusters, 0);
}
