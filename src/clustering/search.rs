//! Filtering a computed [`ClusterResult`] by cluster.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::clustering::{ClusterLabel, ClusterPoint, ClusterResult};
use crate::documents::DocumentId;

/// A document-scoped record returned when a query is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_content: Option<String>,
    pub cluster_id: ClusterLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterMatch {
    Point(ClusterPoint),
    Document(DocumentMatch),
}

/// Records of one cluster, at most `limit`.
///
/// Without a query (or with a blank one) this is the cluster's points in
/// result order. With a query it lists, for each document in the cluster by
/// ascending id, one record per point of that document. The query only
/// switches the listing mode; records are not ranked against it. An unknown
/// cluster id gives an empty list.
pub fn search_within_cluster(
    result: &ClusterResult,
    cluster_id: ClusterLabel,
    query: Option<&str>,
    limit: usize,
) -> Vec<ClusterMatch> {
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    let Some(query) = query else {
        return result
            .points_in(cluster_id)
            .take(limit)
            .cloned()
            .map(ClusterMatch::Point)
            .collect();
    };

    tracing::debug!(target: "clustering", "listing cluster {cluster_id} documents for query '{query}'");

    let members: Vec<&ClusterPoint> = result.points_in(cluster_id).collect();
    let documents: BTreeSet<DocumentId> = members.iter().map(|p| p.meta.document_id).collect();

    documents
        .into_iter()
        .flat_map(|document_id| {
            let points: Vec<&ClusterPoint> = members
                .iter()
                .copied()
                .filter(|p| p.meta.document_id == document_id)
                .collect();
            let description = points.iter().find_map(|p| p.meta.description.clone());

            points.into_iter().map(move |point| {
                ClusterMatch::Document(DocumentMatch {
                    document_id,
                    filename: point.meta.filename.clone(),
                    description: description.clone(),
                    chunk_content: point.meta.chunk_content.clone(),
                    cluster_id,
                })
            })
        })
        .take(limit)
        .collect()
}
