//! The clustering pipeline: collect vectors, label, project, summarise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::clustering::summary::{SummaryLimits, build_summaries};
use crate::clustering::{
    ClusterItem, ClusterPoint, ClusterRequest, ClusterResult, Clusterer, Granularity, ItemMeta,
    Reducer,
};
use crate::config::{ClusteringConfig, FetchConfig};
use crate::documents::Principal;
use crate::error::ClusterOpResult;
use crate::vector::{DocumentSource, VectorFetcher, VectorGateway, VectorId, mean_vector};

/// Runs clustering requests against injected collaborators.
///
/// Each request is computed from scratch; the engine keeps no state between
/// requests and can be shared across threads.
pub struct ClusterEngine {
    source: Arc<dyn DocumentSource>,
    fetcher: VectorFetcher,
    config: ClusteringConfig,
}

impl ClusterEngine {
    pub fn new(
        gateway: Arc<dyn VectorGateway>,
        source: Arc<dyn DocumentSource>,
        config: ClusteringConfig,
        fetch: FetchConfig,
    ) -> Self {
        Self {
            source,
            fetcher: VectorFetcher::new(gateway, fetch),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster everything `principal` can see.
    pub fn generate_for(
        &self,
        principal: &Principal,
        request: &ClusterRequest,
    ) -> ClusterOpResult<ClusterResult> {
        // Resolve the algorithm before fetching anything
        Clusterer::from_request(request, &self.config)?;
        let items = self.collect_items(principal, request.level)?;
        self.generate(items, request)
    }

    /// Build cluster items for `principal` at the given granularity.
    ///
    /// Vectors the gateway cannot return are skipped. At document level the
    /// chunk vectors of each document are averaged, and documents without any
    /// vector are left out.
    pub fn collect_items(
        &self,
        principal: &Principal,
        level: Granularity,
    ) -> ClusterOpResult<Vec<ClusterItem>> {
        let documents = self.source.list_accessible_documents(principal)?;

        let ids: Vec<VectorId> = documents
            .iter()
            .flat_map(|doc| doc.chunks.iter().map(|chunk| chunk.vector_id))
            .collect();
        let fetched = self.fetcher.fetch_many(&ids);
        let mut vectors: HashMap<VectorId, Vec<f32>> = ids
            .iter()
            .copied()
            .zip(fetched.vectors)
            .filter_map(|(id, vector)| vector.map(|v| (id, v)))
            .collect();

        let mut items = Vec::new();
        for doc in &documents {
            match level {
                Granularity::Document => {
                    let chunk_vectors: Vec<&Vec<f32>> = doc
                        .chunks
                        .iter()
                        .filter_map(|chunk| vectors.get(&chunk.vector_id))
                        .collect();
                    let Some(vector) = mean_vector(&chunk_vectors) else {
                        tracing::debug!(
                            target: "clustering",
                            "document {} has no retrievable vectors, skipping",
                            doc.document_id
                        );
                        continue;
                    };
                    items.push(ClusterItem {
                        vector,
                        meta: ItemMeta {
                            id: doc.document_id.get(),
                            document_id: doc.document_id,
                            filename: doc.filename.clone(),
                            description: doc.description.clone(),
                            chunk_index: None,
                            chunk_content: None,
                        },
                    });
                }
                Granularity::Chunk => {
                    for chunk in &doc.chunks {
                        let Some(vector) = vectors.remove(&chunk.vector_id) else {
                            continue;
                        };
                        items.push(ClusterItem {
                            vector,
                            meta: ItemMeta {
                                id: chunk.chunk_id.get(),
                                document_id: doc.document_id,
                                filename: doc.filename.clone(),
                                description: None,
                                chunk_index: Some(chunk.index),
                                chunk_content: Some(
                                    chunk.content.chars().take(self.config.preview_chars).collect(),
                                ),
                            },
                        });
                    }
                }
            }
        }

        tracing::debug!(
            target: "clustering",
            "collected {} {} items from {} documents ({} of {} vectors missing, {} failed)",
            items.len(),
            level,
            documents.len(),
            fetched.missing,
            ids.len(),
            fetched.failed
        );
        Ok(items)
    }

    /// Cluster and project `items`. Fewer than two usable items give an
    /// empty result.
    pub fn generate(
        &self,
        items: Vec<ClusterItem>,
        request: &ClusterRequest,
    ) -> ClusterOpResult<ClusterResult> {
        let clusterer = Clusterer::from_request(request, &self.config)?;
        let reducer = Reducer::from(request.reduction_method);

        let items = retain_consistent_dimension(items);
        if items.len() < 2 {
            tracing::info!(
                target: "clustering",
                "only {} usable items, returning an empty result",
                items.len()
            );
            return Ok(ClusterResult::empty(request));
        }

        let started = Instant::now();
        let (vectors, metas): (Vec<Vec<f32>>, Vec<ItemMeta>) =
            items.into_iter().map(|item| (item.vector, item.meta)).unzip();

        let labels = clusterer.fit(&vectors, &self.config)?;
        let coordinates = reducer.project(&vectors, self.config.seed);

        let points: Vec<ClusterPoint> = metas
            .into_iter()
            .zip(labels)
            .zip(coordinates)
            .map(|((meta, cluster_id), [x, y])| ClusterPoint {
                x,
                y,
                cluster_id,
                meta,
            })
            .collect();

        let summaries = build_summaries(
            &points,
            &vectors,
            SummaryLimits {
                max_representatives: self.config.max_representatives,
                top_keywords: self.config.top_keywords,
            },
        );

        tracing::info!(
            target: "clustering",
            "{} over {} {} items: {} clusters, {} projection in {:.2?}",
            request.algorithm,
            points.len(),
            request.level,
            summaries.len(),
            request.reduction_method,
            started.elapsed()
        );

        Ok(ClusterResult {
            n_clusters: summaries.len(),
            points,
            summaries,
            algorithm: request.algorithm,
            reduction_method: request.reduction_method,
            level: request.level,
        })
    }
}

/// Drop items whose dimension differs from the first item's.
fn retain_consistent_dimension(items: Vec<ClusterItem>) -> Vec<ClusterItem> {
    let Some(dimension) = items.first().map(|item| item.vector.len()) else {
        return items;
    };

    items
        .into_iter()
        .filter(|item| {
            let keep = item.vector.len() == dimension;
            if !keep {
                tracing::warn!(
                    target: "clustering",
                    "skipping item {} of document {}: dimension {} instead of {dimension}",
                    item.meta.id,
                    item.meta.document_id,
                    item.vector.len()
                );
            }
            keep
        })
        .collect()
}
