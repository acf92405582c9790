//! Neighbour-graph projection in the style of UMAP.
//!
//! An exact cosine k-nearest-neighbour graph is turned into fuzzy membership
//! strengths (per-point `rho` and `sigma`, then a fuzzy union), and a 2D
//! layout is optimised with seeded stochastic gradient descent using negative
//! sampling. The layout starts from a seeded uniform random initialisation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::vector::cosine_distance;

/// Curve parameters fitted for `min_dist = 0.1`, `spread = 1.0`.
const CURVE_A: f32 = 1.576_943_5;
const CURVE_B: f32 = 0.895_060_9;

const BINARY_SEARCH_STEPS: usize = 64;
const SIGMA_TOLERANCE: f32 = 1e-5;
const MIN_SIGMA_SCALE: f32 = 1e-3;
const GRADIENT_CLIP: f32 = 4.0;
const INIT_RANGE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct UmapParams {
    pub n_neighbors: usize,
    /// Optimisation epochs, chosen from the input size when unset
    pub n_epochs: Option<usize>,
    pub negative_sample_rate: usize,
    pub seed: u64,
}

impl UmapParams {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            n_neighbors: 15,
            n_epochs: None,
            negative_sample_rate: 5,
            seed,
        }
    }
}

/// Project vectors to 2D. Deterministic for a fixed seed.
pub fn umap(vectors: &[Vec<f32>], params: &UmapParams) -> Vec<[f32; 2]> {
    let n = vectors.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![[0.0, 0.0]],
        _ => {}
    }

    let k = params.n_neighbors.clamp(1, n - 1);
    let knn = nearest_neighbors(vectors, k);
    let graph = fuzzy_graph(&knn);
    let n_epochs = params
        .n_epochs
        .unwrap_or(if n > 10_000 { 200 } else { 500 })
        .max(1);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut embedding: Vec<[f32; 2]> = (0..n)
        .map(|_| {
            [
                rng.random_range(-INIT_RANGE..INIT_RANGE),
                rng.random_range(-INIT_RANGE..INIT_RANGE),
            ]
        })
        .collect();

    optimize_layout(&mut embedding, &graph, n_epochs, params.negative_sample_rate, &mut rng);
    embedding
}

/// Exact k nearest neighbours by cosine distance, self excluded.
fn nearest_neighbors(vectors: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f32)>> {
    vectors
        .par_iter()
        .enumerate()
        .map(|(i, a)| {
            let mut row: Vec<(usize, f32)> = vectors
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, b)| (j, cosine_distance(a, b)))
                .collect();
            row.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            row.truncate(k);
            row
        })
        .collect()
}

/// Membership strengths, symmetrised with the fuzzy union `a + b - ab`.
fn fuzzy_graph(knn: &[Vec<(usize, f32)>]) -> Vec<(usize, usize, f32)> {
    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();

    for (i, row) in knn.iter().enumerate() {
        let (rho, sigma) = smooth_knn_distance(row);
        for &(j, distance) in row {
            let weight = (-(distance - rho).max(0.0) / sigma).exp();
            directed.insert((i, j), weight);
        }
    }

    let mut edges = Vec::new();
    for (&(i, j), &forward) in &directed {
        if i < j || !directed.contains_key(&(j, i)) {
            let backward = directed.get(&(j, i)).copied().unwrap_or(0.0);
            let weight = forward + backward - forward * backward;
            edges.push((i, j, weight));
            edges.push((j, i, weight));
        }
    }
    edges
}

/// Distance to the nearest neighbour and the bandwidth that makes the
/// memberships of a row sum to `log2(k)`.
fn smooth_knn_distance(row: &[(usize, f32)]) -> (f32, f32) {
    let rho = row
        .iter()
        .map(|&(_, d)| d)
        .find(|&d| d > 0.0)
        .unwrap_or(0.0);
    let target = (row.len() as f32).log2();

    let mut lo = 0.0f32;
    let mut hi = f32::INFINITY;
    let mut sigma = 1.0f32;

    for _ in 0..BINARY_SEARCH_STEPS {
        let psum: f32 = row
            .iter()
            .map(|&(_, d)| (-(d - rho).max(0.0) / sigma).exp())
            .sum();

        if (psum - target).abs() < SIGMA_TOLERANCE {
            break;
        }
        if psum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean_distance = row.iter().map(|&(_, d)| d).sum::<f32>() / row.len().max(1) as f32;
    let floor = (MIN_SIGMA_SCALE * mean_distance).max(f32::MIN_POSITIVE);
    (rho, sigma.max(floor))
}

fn clip(value: f32) -> f32 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn squared_distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn optimize_layout(
    embedding: &mut [[f32; 2]],
    graph: &[(usize, usize, f32)],
    n_epochs: usize,
    negative_sample_rate: usize,
    rng: &mut StdRng,
) {
    let n = embedding.len();
    let max_weight = graph.iter().map(|e| e.2).fold(0.0f32, f32::max);
    if max_weight <= 0.0 {
        return;
    }

    // Edges too weak to be sampled even once are dropped
    let edges: Vec<(usize, usize, f32)> = graph
        .iter()
        .copied()
        .filter(|e| e.2 >= max_weight / n_epochs as f32)
        .collect();

    let epochs_per_sample: Vec<f32> = edges.iter().map(|e| max_weight / e.2).collect();
    let negative_rate = negative_sample_rate.max(1) as f32;
    let epochs_per_negative: Vec<f32> = epochs_per_sample.iter().map(|e| e / negative_rate).collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    for epoch in 0..n_epochs {
        let alpha = 1.0 - epoch as f32 / n_epochs as f32;
        let now = epoch as f32;

        for (e, &(head, tail, _)) in edges.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }

            let current = embedding[head];
            let other = embedding[tail];
            let dist_sq = squared_distance(current, other);
            let coeff = if dist_sq > 0.0 {
                -2.0 * CURVE_A * CURVE_B * dist_sq.powf(CURVE_B - 1.0)
                    / (CURVE_A * dist_sq.powf(CURVE_B) + 1.0)
            } else {
                0.0
            };
            for d in 0..2 {
                let grad = clip(coeff * (current[d] - other[d]));
                embedding[head][d] += grad * alpha;
                embedding[tail][d] -= grad * alpha;
            }
            next_sample[e] += epochs_per_sample[e];

            let n_negative = ((now - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
            for _ in 0..n_negative {
                let sample = rng.random_range(0..n);
                if sample == head {
                    continue;
                }
                let current = embedding[head];
                let other = embedding[sample];
                let dist_sq = squared_distance(current, other);
                let coeff = if dist_sq > 0.0 {
                    2.0 * CURVE_B / ((0.001 + dist_sq) * (CURVE_A * dist_sq.powf(CURVE_B) + 1.0))
                } else {
                    0.0
                };
                for d in 0..2 {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (current[d] - other[d]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[head][d] += grad * alpha;
                }
            }
            next_negative[e] += n_negative as f32 * epochs_per_negative[e];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f32>> {
        let mut vectors = Vec::new();
        for i in 0..8 {
            let jitter = i as f32 * 0.01;
            vectors.push(vec![1.0, jitter, 0.0, 0.0]);
            vectors.push(vec![0.0, 0.0, 1.0, jitter]);
        }
        vectors
    }

    fn centroid(points: impl Iterator<Item = [f32; 2]>) -> [f32; 2] {
        let (mut sx, mut sy, mut count) = (0.0, 0.0, 0.0);
        for [x, y] in points {
            sx += x;
            sy += y;
            count += 1.0;
        }
        [sx / count, sy / count]
    }

    #[test]
    fn test_output_shape_and_determinism() {
        let vectors = two_groups();
        let params = UmapParams {
            n_epochs: Some(100),
            ..UmapParams::new(42)
        };

        let a = umap(&vectors, &params);
        let b = umap(&vectors, &params);
        assert_eq!(a.len(), vectors.len());
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }

    #[test]
    fn test_groups_stay_apart() {
        let vectors = two_groups();
        let layout = umap(&vectors, &UmapParams::new(7));

        let even = centroid(layout.iter().step_by(2).copied());
        let odd = centroid(layout.iter().skip(1).step_by(2).copied());
        let between = squared_distance(even, odd).sqrt();

        let spread = layout
            .iter()
            .step_by(2)
            .map(|&p| squared_distance(p, even).sqrt())
            .fold(0.0f32, f32::max);
        assert!(between > spread, "between {between}, spread {spread}");
    }

    #[test]
    fn test_tiny_inputs() {
        assert!(umap(&[], &UmapParams::new(0)).is_empty());
        assert_eq!(umap(&[vec![1.0, 2.0]], &UmapParams::new(0)), vec![[0.0, 0.0]]);

        let two = umap(&[vec![1.0, 0.0], vec![0.0, 1.0]], &UmapParams::new(0));
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn test_smooth_knn_distance_hits_target() {
        let row = vec![(1, 0.1), (2, 0.2), (3, 0.4), (4, 0.8)];
        let (rho, sigma) = smooth_knn_distance(&row);
        assert!((rho - 0.1).abs() < f32::EPSILON);

        let psum: f32 = row
            .iter()
            .map(|&(_, d)| (-(d - rho).max(0.0) / sigma).exp())
            .sum();
        assert!((psum - 2.0).abs() < 1e-3);
    }
}
