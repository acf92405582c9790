//! Distance and averaging helpers shared by retrieval and clustering.

/// Epsilon for floating-point comparisons.
pub(crate) const EPSILON: f32 = 1e-10;

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`, where 1 is most similar. A zero vector has
/// similarity 0 to everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Cosine distance `1 - similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).max(0.0)
}

/// Squared Euclidean distance.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean distance.
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}

/// Normalizes a vector in-place to unit length.
///
/// Vectors with a norm below epsilon are left as-is.
pub fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates a normalized copy of a vector.
pub fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}

/// Element-wise mean of equally sized vectors. `None` for an empty set.
pub fn mean_vector<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Vec<f32>> {
    let first = vectors.first()?.as_ref();
    let mut mean = vec![0.0f64; first.len()];

    for vector in vectors {
        for (acc, &value) in mean.iter_mut().zip(vector.as_ref()) {
            *acc += f64::from(value);
        }
    }

    let count = vectors.len() as f64;
    Some(mean.into_iter().map(|sum| (sum / count) as f32).collect())
}
