//! Per-cluster summaries: size, centroid, representative documents and
//! keywords.

use std::collections::{BTreeMap, HashMap};

use crate::clustering::{ClusterLabel, ClusterPoint, ClusterSummary, RepresentativeDoc};
use crate::documents::DocumentId;
use crate::vector::mean_vector;

/// Words never reported as keywords.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "may", "might", "must", "can", "this",
    "that", "these", "those", "it", "its", "their", "there", "pdf", "docx",
];

/// Limits applied while summarising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    pub max_representatives: usize,
    pub top_keywords: usize,
}

/// Most frequent keywords across `texts`.
///
/// Texts are lower-cased and split on whitespace. Tokens of three characters
/// or fewer, tokens with any non-alphabetic character and stop words are
/// dropped. Ties keep the order in which tokens were first seen.
pub fn extract_keywords<'a>(texts: impl IntoIterator<Item = &'a str>, top_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut seen = 0;

    for text in texts {
        for token in text.to_lowercase().split_whitespace() {
            if token.chars().count() <= 3
                || !token.chars().all(char::is_alphabetic)
                || STOP_WORDS.contains(&token)
            {
                continue;
            }
            let entry = counts.entry(token.to_string()).or_insert((0, seen));
            entry.0 += 1;
            seen += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(top_n).map(|(word, _, _)| word).collect()
}

/// Summaries for every non-noise label, in ascending label order.
///
/// `vectors[i]` is the original-space vector of `points[i]`.
pub fn build_summaries(
    points: &[ClusterPoint],
    vectors: &[Vec<f32>],
    limits: SummaryLimits,
) -> Vec<ClusterSummary> {
    let mut members: BTreeMap<ClusterLabel, Vec<usize>> = BTreeMap::new();
    for (i, point) in points.iter().enumerate() {
        if !point.cluster_id.is_noise() {
            members.entry(point.cluster_id).or_default().push(i);
        }
    }

    members
        .into_iter()
        .map(|(label, indices)| summarize(label, &indices, points, vectors, limits))
        .collect()
}

fn summarize(
    label: ClusterLabel,
    indices: &[usize],
    points: &[ClusterPoint],
    vectors: &[Vec<f32>],
    limits: SummaryLimits,
) -> ClusterSummary {
    let member_vectors: Vec<&[f32]> = indices
        .iter()
        .filter_map(|&i| vectors.get(i).map(Vec::as_slice))
        .collect();
    let centroid = mean_vector(&member_vectors).unwrap_or_else(|| {
        tracing::warn!(target: "clustering", "cluster {label} has no vectors, centroid left empty");
        Vec::new()
    });

    let mut counts: HashMap<DocumentId, usize> = HashMap::new();
    for &i in indices {
        *counts.entry(points[i].meta.document_id).or_default() += 1;
    }

    let mut representative_docs: Vec<RepresentativeDoc> = Vec::new();
    for &i in indices {
        if representative_docs.len() >= limits.max_representatives {
            break;
        }
        let meta = &points[i].meta;
        if representative_docs.iter().any(|d| d.document_id == meta.document_id) {
            continue;
        }
        representative_docs.push(RepresentativeDoc {
            document_id: meta.document_id,
            filename: meta.filename.clone(),
            description: meta.description.clone(),
            count: counts.get(&meta.document_id).copied().unwrap_or(0),
        });
    }

    let keywords = extract_keywords(
        indices.iter().flat_map(|&i| points[i].meta.text_fields()),
        limits.top_keywords,
    );

    ClusterSummary {
        cluster_id: label,
        size: indices.len(),
        representative_docs,
        keywords,
        centroid,
    }
}
