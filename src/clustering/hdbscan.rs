//! HDBSCAN density clustering.
//!
//! Builds the minimum spanning tree of the mutual reachability graph
//! (Euclidean distance, core distance from the `min_samples`-th neighbour
//! with the point itself counted first), turns it into a single-linkage
//! hierarchy, condenses the hierarchy with `min_cluster_size` and selects
//! clusters by excess of mass. The root is never selected, so when no stable
//! split exists every point is noise.
//!
//! Labels are `0..m` in ascending order of the condensed cluster id, with
//! [`ClusterLabel::NOISE`] for points outside every selected cluster.

use rayon::prelude::*;

use crate::clustering::ClusterLabel;
use crate::error::{ClusterError, ClusterOpResult};
use crate::vector::euclidean;

/// Largest lambda (inverse distance) recorded, used for zero distances.
const MAX_LAMBDA: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdbscanParams {
    pub min_cluster_size: usize,
    /// Neighbourhood for core distances, `min_cluster_size` when unset
    pub min_samples: Option<usize>,
}

impl HdbscanParams {
    #[must_use]
    pub fn new(min_cluster_size: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples: None,
        }
    }
}

/// Label every vector, with noise for points outside dense regions.
pub fn hdbscan(vectors: &[Vec<f32>], params: &HdbscanParams) -> ClusterOpResult<Vec<ClusterLabel>> {
    if params.min_cluster_size < 2 {
        return Err(ClusterError::invalid(format!(
            "min_cluster_size must be at least 2, got {}",
            params.min_cluster_size
        )));
    }

    let n = vectors.len();
    if n < 2 {
        return Ok(vec![ClusterLabel::NOISE; n]);
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != vectors[0].len()) {
        return Err(ClusterError::DimensionMismatch {
            expected: vectors[0].len(),
            actual: bad.len(),
        });
    }

    let min_samples = params
        .min_samples
        .unwrap_or(params.min_cluster_size)
        .clamp(1, n);

    let distances = pairwise_distances(vectors);
    let core = core_distances(&distances, min_samples);
    let mst = minimum_spanning_tree(&distances, &core);
    let hierarchy = single_linkage(n, mst);
    let condensed = condense(&hierarchy, n, params.min_cluster_size);
    let selected = select_clusters(&condensed, n);

    Ok(assign_labels(&condensed, &selected, n))
}

fn pairwise_distances(vectors: &[Vec<f32>]) -> Vec<Vec<f64>> {
    vectors
        .par_iter()
        .map(|a| {
            vectors
                .iter()
                .map(|b| f64::from(euclidean(a, b)))
                .collect()
        })
        .collect()
}

fn core_distances(distances: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    distances
        .par_iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(f64::total_cmp);
            sorted[min_samples - 1]
        })
        .collect()
}

/// Prim's algorithm over the dense mutual reachability graph.
fn minimum_spanning_tree(distances: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = distances.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        for other in 0..n {
            if in_tree[other] {
                continue;
            }
            let reach = distances[current][other].max(core[current]).max(core[other]);
            if reach < best[other] {
                best[other] = reach;
                parent[other] = current;
            }
        }

        let mut next = None;
        for candidate in (0..n).filter(|&i| !in_tree[i]) {
            if next.is_none_or(|j: usize| best[candidate] < best[j]) {
                next = Some(candidate);
            }
        }
        let Some(next) = next else { break };

        in_tree[next] = true;
        edges.push((parent[next], next, best[next]));
        current = next;
    }

    edges
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Single-linkage merges. Node `n + i` is created by merge `i`.
fn single_linkage(n: usize, mut mst: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    mst.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    fn find(parent: &mut [usize], mut node: usize) -> usize {
        while parent[node] != node {
            parent[node] = parent[parent[node]];
            node = parent[node];
        }
        node
    }

    for (a, b, distance) in mst {
        let left = find(&mut parent, a);
        let right = find(&mut parent, b);
        let node = n + merges.len();
        parent[left] = node;
        parent[right] = node;
        size[node] = size[left] + size[right];
        merges.push(Merge {
            left,
            right,
            distance,
            size: size[node],
        });
    }

    merges
}

/// One edge of the condensed tree. Children below `n` are points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    child_size: usize,
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

fn condense(merges: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = n + merges.len() - 1;
    let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut edges = Vec::new();

    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let merge = merges[node - n];
        let lambda = lambda_of(merge.distance);
        let parent = relabel[node];
        let left_big = node_size(merge.left) >= min_cluster_size;
        let right_big = node_size(merge.right) >= min_cluster_size;

        match (left_big, right_big) {
            (true, true) => {
                for child in [merge.left, merge.right] {
                    relabel[child] = next_label;
                    next_label += 1;
                    edges.push(CondensedEdge {
                        parent,
                        child: relabel[child],
                        lambda,
                        child_size: node_size(child),
                    });
                    queue.push_back(child);
                }
            }
            (false, false) => {
                for child in [merge.left, merge.right] {
                    fall_out(merges, n, child, parent, lambda, &mut edges);
                }
            }
            (true, false) => {
                relabel[merge.left] = parent;
                queue.push_back(merge.left);
                fall_out(merges, n, merge.right, parent, lambda, &mut edges);
            }
            (false, true) => {
                relabel[merge.right] = parent;
                queue.push_back(merge.right);
                fall_out(merges, n, merge.left, parent, lambda, &mut edges);
            }
        }
    }

    edges
}

/// Record every point under `node` as leaving cluster `parent` at `lambda`.
fn fall_out(
    merges: &[Merge],
    n: usize,
    node: usize,
    parent: usize,
    lambda: f64,
    edges: &mut Vec<CondensedEdge>,
) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            edges.push(CondensedEdge {
                parent,
                child: current,
                lambda,
                child_size: 1,
            });
        } else {
            let merge = merges[current - n];
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }
}

/// Excess-of-mass selection. Returns condensed cluster ids, ascending.
fn select_clusters(edges: &[CondensedEdge], n: usize) -> Vec<usize> {
    let Some(max_cluster) = edges.iter().map(|e| e.parent.max(e.child)).max() else {
        return Vec::new();
    };
    if max_cluster < n + 1 {
        return Vec::new();
    }
    let count = max_cluster - n + 1;

    let mut birth = vec![0.0f64; count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for edge in edges.iter().filter(|e| e.child >= n) {
        birth[edge.child - n] = edge.lambda;
        children[edge.parent - n].push(edge.child);
    }

    let mut stability = vec![0.0f64; count];
    for edge in edges {
        let idx = edge.parent - n;
        stability[idx] += (edge.lambda - birth[idx]) * edge.child_size as f64;
    }

    // Children always carry larger ids than their parent
    let mut is_cluster = vec![false; count];
    for idx in (1..count).rev() {
        let subtree: f64 = children[idx].iter().map(|&c| stability[c - n]).sum();
        if subtree > stability[idx] {
            stability[idx] = subtree;
        } else {
            is_cluster[idx] = true;
        }
    }

    for idx in 1..count {
        if is_cluster[idx] {
            let mut stack = children[idx].clone();
            while let Some(child) = stack.pop() {
                is_cluster[child - n] = false;
                stack.extend(children[child - n].iter().copied());
            }
        }
    }

    (1..count)
        .filter(|&idx| is_cluster[idx])
        .map(|idx| idx + n)
        .collect()
}

fn assign_labels(edges: &[CondensedEdge], selected: &[usize], n: usize) -> Vec<ClusterLabel> {
    let mut cluster_parent = std::collections::HashMap::new();
    let mut point_parent = vec![None; n];
    for edge in edges {
        if edge.child >= n {
            cluster_parent.insert(edge.child, edge.parent);
        } else {
            point_parent[edge.child] = Some(edge.parent);
        }
    }

    point_parent
        .into_iter()
        .map(|parent| {
            let mut current = parent;
            while let Some(cluster) = current {
                if let Ok(position) = selected.binary_search(&cluster) {
                    return ClusterLabel::from_index(position);
                }
                current = cluster_parent.get(&cluster).copied();
            }
            ClusterLabel::NOISE
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hexagon(cx: f32, cy: f32) -> Vec<Vec<f32>> {
        (0..6)
            .map(|i| {
                let angle = std::f32::consts::PI / 3.0 * i as f32;
                vec![cx + angle.cos(), cy + angle.sin()]
            })
            .collect()
    }

    #[test]
    fn test_two_blobs_and_an_outlier() {
        let mut vectors = hexagon(0.0, 0.0);
        vectors.extend(hexagon(10.0, 10.0));
        vectors.push(vec![50.0, -50.0]);

        let labels = hdbscan(&vectors, &HdbscanParams::new(3)).unwrap();

        let first = labels[0];
        let second = labels[6];
        assert!(!first.is_noise());
        assert!(!second.is_noise());
        assert_ne!(first, second);
        assert!(labels[..6].iter().all(|&l| l == first));
        assert!(labels[6..12].iter().all(|&l| l == second));
        assert_eq!(labels[12], ClusterLabel::NOISE);

        let mut distinct: Vec<i32> = labels.iter().map(ClusterLabel::get).collect();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct, vec![-1, 0, 1]);
    }

    #[test]
    fn test_single_blob_is_all_noise() {
        let labels = hdbscan(&hexagon(0.0, 0.0), &HdbscanParams::new(3)).unwrap();
        assert!(labels.iter().all(ClusterLabel::is_noise));
    }

    #[test]
    fn test_min_cluster_size_larger_than_input() {
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![5.0, 5.0]];
        let labels = hdbscan(&vectors, &HdbscanParams::new(5)).unwrap();
        assert_eq!(labels, vec![ClusterLabel::NOISE; 3]);
    }

    #[test]
    fn test_duplicate_points() {
        let mut vectors = vec![vec![0.0, 0.0]; 4];
        vectors.extend(vec![vec![9.0, 9.0]; 4]);
        let labels = hdbscan(&vectors, &HdbscanParams::new(2)).unwrap();

        assert!(labels[..4].iter().all(|&l| l == labels[0]));
        assert!(labels[4..].iter().all(|&l| l == labels[4]));
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn test_rejects_tiny_min_cluster_size() {
        let vectors = hexagon(0.0, 0.0);
        assert!(matches!(
            hdbscan(&vectors, &HdbscanParams::new(1)),
            Err(ClusterError::InvalidRequest { .. })
        ));
    }
}
