//! K-means over embedding vectors.
//!
//! Cosine similarity is the assignment metric and centroids are kept at unit
//! length, which suits normalized text embeddings. Centroids are seeded with
//! k-means++ from a seeded `StdRng`, the whole fit is restarted `n_init`
//! times and the run with the lowest inertia wins.
//!
//! # Guarantees
//! - Deterministic for a fixed seed.
//! - Every label in `0..k` is used. Empty clusters are repaired by moving the
//!   point farthest from its centroid out of a cluster with more than one
//!   member.
//! - Labels are numbered by first appearance in input order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{ClusterError, ClusterOpResult};
use crate::vector::{EPSILON, cosine_distance, cosine_similarity, normalize_vector, normalize_vector_copy};

/// Convergence tolerance for mean centroid movement.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length centroids, indexed by label
    pub centroids: Vec<Vec<f32>>,
    /// Label in `0..k` for each input vector
    pub labels: Vec<usize>,
    /// Sum of cosine distances to the assigned centroid
    pub inertia: f32,
    /// Iterations of the winning run
    pub iterations: usize,
}

/// Cluster `vectors` into exactly `params.k` groups.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans(vectors: &[Vec<f32>], params: &KMeansParams) -> ClusterOpResult<KMeansResult> {
    if vectors.is_empty() {
        return Err(ClusterError::invalid("k-means needs at least one vector"));
    }
    if params.k == 0 || params.k > vectors.len() {
        return Err(ClusterError::invalid(format!(
            "cluster count must be between 1 and {}, got {}",
            vectors.len(),
            params.k
        )));
    }

    let dimension = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(ClusterError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<KMeansResult> = None;

    for run in 0..params.n_init.max(1) {
        let result = single_run(vectors, params, &mut rng);
        tracing::trace!(
            target: "clustering",
            "k-means run {run}: inertia {:.6} after {} iterations",
            result.inertia,
            result.iterations
        );
        if best.as_ref().is_none_or(|b| result.inertia < b.inertia) {
            best = Some(result);
        }
    }

    let best = best.ok_or_else(|| ClusterError::invalid("k-means produced no run"))?;
    Ok(canonicalize(best))
}

/// Index of the most similar centroid. Ties go to the lower index.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    best_cluster
}

fn single_run(vectors: &[Vec<f32>], params: &KMeansParams, rng: &mut StdRng) -> KMeansResult {
    let k = params.k;
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, rng);
    let mut labels: Vec<usize> = Vec::new();
    let mut iterations = 0;

    loop {
        iterations += 1;

        let mut new_labels: Vec<usize> = vectors
            .par_iter()
            .map(|vector| assign_to_nearest_centroid(vector, &centroids))
            .collect();
        repair_empty_clusters(vectors, &centroids, &mut new_labels, k);

        let converged = new_labels == labels;
        labels = new_labels;
        if converged || iterations >= params.max_iterations.max(1) {
            break;
        }

        let new_centroids = update_centroids(vectors, &labels, k);
        let movement = centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    let inertia = vectors
        .iter()
        .zip(&labels)
        .map(|(vector, &label)| cosine_distance(vector, &centroids[label]))
        .sum();

    KMeansResult {
        centroids,
        labels,
        inertia,
        iterations,
    }
}

/// K-means++ seeding with squared cosine distance weights.
///
/// When every remaining point coincides with a chosen centroid the rest are
/// filled with unchosen points in input order.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..vectors.len()));

    while chosen.len() < k {
        let distances: Vec<f32> = vectors
            .par_iter()
            .enumerate()
            .map(|(i, vector)| {
                if chosen.contains(&i) {
                    return 0.0;
                }
                let nearest = chosen
                    .iter()
                    .map(|&c| cosine_distance(vector, &vectors[c]))
                    .fold(f32::MAX, f32::min);
                nearest * nearest
            })
            .collect();
        let total_distance: f32 = distances.iter().sum();

        let next = if total_distance < EPSILON {
            None
        } else {
            let target = rng.random::<f32>() * total_distance;
            let mut cumulative = 0.0;
            distances
                .iter()
                .position(|&distance| {
                    cumulative += distance;
                    distance > 0.0 && cumulative >= target
                })
                // Rounding can leave the target just past the last weight
                .or_else(|| distances.iter().rposition(|&d| d > 0.0))
        };

        match next {
            Some(i) => chosen.push(i),
            None => {
                let missing = k - chosen.len();
                let fill: Vec<usize> = (0..vectors.len())
                    .filter(|i| !chosen.contains(i))
                    .take(missing)
                    .collect();
                chosen.extend(fill);
                break;
            }
        }
    }

    chosen
        .into_iter()
        .map(|i| normalize_vector_copy(&vectors[i]))
        .collect()
}

fn repair_empty_clusters(
    vectors: &[Vec<f32>],
    centroids: &[Vec<f32>],
    labels: &mut [usize],
    k: usize,
) {
    let mut sizes = vec![0usize; k];
    for &label in labels.iter() {
        sizes[label] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }

        let donor = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| sizes[label] > 1)
            .map(|(i, &label)| (i, cosine_distance(&vectors[i], &centroids[label])))
            .fold(None, |best: Option<(usize, f32)>, (i, d)| match best {
                Some((_, best_d)) if best_d >= d => best,
                _ => Some((i, d)),
            });

        if let Some((i, _)) = donor {
            sizes[labels[i]] -= 1;
            labels[i] = empty;
            sizes[empty] += 1;
        }
    }
}

fn update_centroids(vectors: &[Vec<f32>], labels: &[usize], k: usize) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut centroids = vec![vec![0.0f32; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &label) in vectors.iter().zip(labels) {
        for (acc, &value) in centroids[label].iter_mut().zip(vector) {
            *acc += value;
        }
        sizes[label] += 1;
    }

    for (centroid, &size) in centroids.iter_mut().zip(&sizes) {
        if size > 0 {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_vector(centroid);
        }
    }

    centroids
}

fn centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new)
        .map(|(old_c, new_c)| cosine_distance(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

/// Renumber labels by first appearance and reorder centroids to match.
fn canonicalize(result: KMeansResult) -> KMeansResult {
    let k = result.centroids.len();
    let mut mapping: Vec<Option<usize>> = vec![None; k];
    let mut next = 0;

    for &label in &result.labels {
        if mapping[label].is_none() {
            mapping[label] = Some(next);
            next += 1;
        }
    }

    let labels = result
        .labels
        .iter()
        .map(|&label| mapping[label].unwrap_or(label))
        .collect();

    let mut ordered: Vec<(usize, Vec<f32>)> = result
        .centroids
        .into_iter()
        .enumerate()
        .map(|(old, centroid)| (mapping[old].unwrap_or(old), centroid))
        .collect();
    ordered.sort_by_key(|(new, _)| *new);

    KMeansResult {
        centroids: ordered.into_iter().map(|(_, c)| c).collect(),
        labels,
        inertia: result.inertia,
        iterations: result.iterations,
    }
}
