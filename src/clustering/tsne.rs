//! Exact t-SNE projection to 2D.
//!
//! Squared Euclidean input affinities are calibrated per point by binary
//! search on the Gaussian precision until the row entropy matches the
//! perplexity, then symmetrised. The layout starts from a small seeded
//! Gaussian cloud and follows gradient descent with early exaggeration,
//! momentum and per-coordinate gains.
//!
//! Cost is quadratic in the number of points per iteration. Row work runs on
//! rayon and every reduction is summed sequentially in index order, so a
//! fixed seed always yields the same layout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::vector::squared_euclidean;

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERATIONS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const INIT_STD: f64 = 1e-4;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_PROBABILITY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct TsneParams {
    pub perplexity: f64,
    pub max_iterations: usize,
    /// Step size, `max(n / 12 / 4, 50)` when unset
    pub learning_rate: Option<f64>,
    pub seed: u64,
}

impl TsneParams {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            perplexity: 30.0,
            max_iterations: 1000,
            learning_rate: None,
            seed,
        }
    }
}

/// Project vectors to 2D. Deterministic for a fixed seed.
pub fn tsne(vectors: &[Vec<f32>], params: &TsneParams) -> Vec<[f32; 2]> {
    let n = vectors.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![[0.0, 0.0]],
        _ => {}
    }

    let perplexity = params.perplexity.min((n - 1) as f64).max(1.0);
    let p = joint_probabilities(vectors, perplexity);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [gaussian(&mut rng) * INIT_STD, gaussian(&mut rng) * INIT_STD])
        .collect();

    let learning_rate = params
        .learning_rate
        .unwrap_or_else(|| (n as f64 / EARLY_EXAGGERATION / 4.0).max(50.0));
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];

    for iteration in 0..params.max_iterations {
        let (exaggeration, momentum) = if iteration < EXAGGERATION_ITERATIONS {
            (EARLY_EXAGGERATION, INITIAL_MOMENTUM)
        } else {
            (1.0, FINAL_MOMENTUM)
        };

        let grad = gradient(&p, &y, exaggeration);

        for i in 0..n {
            for d in 0..2 {
                let sign_flipped = update[i][d] * grad[i][d] < 0.0;
                gains[i][d] = if sign_flipped {
                    gains[i][d] + 0.2
                } else {
                    (gains[i][d] * 0.8).max(MIN_GAIN)
                };
                update[i][d] = momentum * update[i][d] - learning_rate * gains[i][d] * grad[i][d];
                y[i][d] += update[i][d];
            }
        }

        recenter(&mut y);
    }

    y.into_iter()
        .map(|[a, b]| [a as f32, b as f32])
        .collect()
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Symmetric joint probabilities `P`, flattened row-major.
fn joint_probabilities(vectors: &[Vec<f32>], perplexity: f64) -> Vec<f64> {
    let n = vectors.len();
    let distances: Vec<Vec<f64>> = vectors
        .par_iter()
        .map(|a| vectors.iter().map(|b| f64::from(squared_euclidean(a, b))).collect())
        .collect();

    let conditional: Vec<Vec<f64>> = distances
        .par_iter()
        .enumerate()
        .map(|(i, row)| conditional_row(row, i, perplexity))
        .collect();

    let mut p = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let value = (conditional[i][j] + conditional[j][i]) / (2.0 * n as f64);
                p[i * n + j] = value.max(MIN_PROBABILITY);
            }
        }
    }
    p
}

/// Conditional probabilities of one row with entropy `ln(perplexity)`.
fn conditional_row(distances: &[f64], i: usize, perplexity: f64) -> Vec<f64> {
    let target_entropy = perplexity.ln();
    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut row = vec![0.0f64; distances.len()];

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum = 0.0;
        for (j, &d) in distances.iter().enumerate() {
            row[j] = if j == i { 0.0 } else { (-d * beta).exp() };
            sum += row[j];
        }
        if sum <= 0.0 {
            sum = f64::MIN_POSITIVE;
        }

        let weighted: f64 = distances.iter().zip(&row).map(|(d, p)| d * p).sum();
        let entropy = sum.ln() + beta * weighted / sum;
        for value in &mut row {
            *value /= sum;
        }

        let diff = entropy - target_entropy;
        if diff.abs() < PERPLEXITY_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() { beta * 2.0 } else { (beta + beta_max) / 2.0 };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() { beta / 2.0 } else { (beta + beta_min) / 2.0 };
        }
    }

    row
}

fn gradient(p: &[f64], y: &[[f64; 2]], exaggeration: f64) -> Vec<[f64; 2]> {
    let n = y.len();

    let kernel: Vec<Vec<f64>> = y
        .par_iter()
        .enumerate()
        .map(|(i, yi)| {
            y.iter()
                .enumerate()
                .map(|(j, yj)| {
                    if i == j {
                        0.0
                    } else {
                        let dist_sq = (yi[0] - yj[0]).powi(2) + (yi[1] - yj[1]).powi(2);
                        1.0 / (1.0 + dist_sq)
                    }
                })
                .collect()
        })
        .collect();

    let row_sums: Vec<f64> = kernel.par_iter().map(|row| row.iter().sum()).collect();
    let z: f64 = row_sums.iter().sum::<f64>().max(f64::MIN_POSITIVE);

    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = kernel[i][j];
                let strength = (exaggeration * p[i * n + j] - q / z) * q;
                grad[0] += strength * (y[i][0] - y[j][0]);
                grad[1] += strength * (y[i][1] - y[j][1]);
            }
            [4.0 * grad[0], 4.0 * grad[1]]
        })
        .collect()
}

fn recenter(y: &mut [[f64; 2]]) {
    let n = y.len() as f64;
    let mean_x = y.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = y.iter().map(|p| p[1]).sum::<f64>() / n;
    for point in y.iter_mut() {
        point[0] -= mean_x;
        point[1] -= mean_y;
    }
}
