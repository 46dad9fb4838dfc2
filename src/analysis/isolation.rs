//! Isolation forest outlier detection over standardized metric vectors.
//!
//! Each tree recursively splits a random subsample on a random feature at a uniform
//! random cut until points are isolated or the height limit is hit. Points that isolate
//! after fewer splits than average score higher; the `contamination` fraction of points
//! with the highest scores is reported.

use super::stats::percentile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_SAMPLES: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestConfig {
    pub trees: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug)]
pub struct IsolationForest<const D: usize> {
    trees: Vec<Node>,
    sample_size: usize,
}

impl<const D: usize> IsolationForest<D> {
    /// Fits a forest on `rows`. The same rows and config always produce the same trees.
    pub fn fit(rows: &[[f64; D]], config: &ForestConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = rows.len().min(MAX_SAMPLES);
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..config.trees.max(1))
            .map(|_| {
                let sample: Vec<usize> =
                    rand::seq::index::sample(&mut rng, rows.len(), sample_size).into_vec();
                build(rows, sample, 0, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in `(0, 1]`; higher means easier to isolate.
    pub fn score(&self, row: &[f64; D]) -> f64 {
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum();
        let mean = total / self.trees.len() as f64;
        2f64.powf(-mean / norm)
    }
}

/// Indices of rows flagged as outliers, ascending.
pub fn detect<const D: usize>(rows: &[[f64; D]], config: &ForestConfig) -> Vec<usize> {
    if rows.len() < 2 {
        return Vec::new();
    }
    let forest = IsolationForest::fit(rows, config);
    let scores: Vec<f64> = rows.iter().map(|row| forest.score(row)).collect();
    let Some(cutoff) = percentile(&scores, 1.0 - config.contamination) else {
        return Vec::new();
    };
    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > cutoff)
        .map(|(idx, _)| idx)
        .collect()
}

/// Z-scores each column; constant columns become all zeros.
pub fn standardize<const D: usize>(rows: &[[f64; D]]) -> Vec<[f64; D]> {
    if rows.is_empty() {
        return Vec::new();
    }
    let n = rows.len() as f64;
    let mut mean = [0.0; D];
    let mut scale = [0.0; D];
    for col in 0..D {
        let m = rows.iter().map(|row| row[col]).sum::<f64>() / n;
        let var = rows
            .iter()
            .map(|row| {
                let delta = row[col] - m;
                delta * delta
            })
            .sum::<f64>()
            / n;
        mean[col] = m;
        scale[col] = if var > 0.0 { var.sqrt() } else { 1.0 };
    }
    rows.iter()
        .map(|row| {
            let mut out = [0.0; D];
            for col in 0..D {
                out[col] = (row[col] - mean[col]) / scale[col];
            }
            out
        })
        .collect()
}

fn build<const D: usize>(
    rows: &[[f64; D]],
    members: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || members.len() <= 1 {
        return Node::Leaf {
            size: members.len(),
        };
    }

    let spreads: Vec<(usize, f64, f64)> = (0..D)
        .filter_map(|feature| {
            let (lo, hi) = members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, idx| {
                let v = rows[*idx][feature];
                (acc.0.min(v), acc.1.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();
    if spreads.is_empty() {
        return Node::Leaf {
            size: members.len(),
        };
    }

    let (feature, lo, hi) = spreads[rng.gen_range(0..spreads.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = members
        .into_iter()
        .partition(|idx| rows[*idx][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(rows, left, depth + 1, height_limit, rng)),
        right: Box::new(build(rows, right, depth + 1, height_limit, rng)),
    }
}

fn path_length<const D: usize>(node: &Node, row: &[f64; D], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<[f64; 2]> {
        let mut rows: Vec<[f64; 2]> = (0..40)
            .map(|i| {
                let jitter = (i % 7) as f64 * 0.05;
                [10.0 + jitter, 5.0 - jitter]
            })
            .collect();
        rows.push([60.0, -40.0]);
        rows
    }

    #[test]
    fn isolates_the_far_point() {
        let rows = standardize(&cluster_with_outlier());
        let flagged = detect(&rows, &ForestConfig::default());
        assert!(flagged.contains(&40));
        assert!(flagged.len() <= 5);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let rows = standardize(&cluster_with_outlier());
        let config = ForestConfig::default();
        let a = IsolationForest::fit(&rows, &config);
        let b = IsolationForest::fit(&rows, &config);
        for row in &rows {
            assert_eq!(a.score(row).to_bits(), b.score(row).to_bits());
        }
        assert_eq!(detect(&rows, &config), detect(&rows, &config));
    }

    #[test]
    fn identical_rows_are_never_flagged() {
        let rows = vec![[1.0, 1.0]; 20];
        assert!(detect(&standardize(&rows), &ForestConfig::default()).is_empty());
    }

    #[test]
    fn standardize_centres_columns() {
        let rows = standardize(&[[1.0, 7.0], [3.0, 7.0]]);
        assert_eq!(rows, vec![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn tiny_inputs_yield_nothing() {
        assert!(detect::<2>(&[], &ForestConfig::default()).is_empty());
        assert!(detect(&[[1.0, 2.0]], &ForestConfig::default()).is_empty());
    }

    #[test]
    fn average_path_length_matches_reference_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244_770_920_119_917).abs() < 1e-9);
    }
}
