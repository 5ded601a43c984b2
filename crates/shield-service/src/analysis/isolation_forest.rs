//! One-dimensional isolation forest.
//!
//! Each tree recursively splits a random sub-sample at a uniformly drawn
//! value until points are isolated or the height limit is reached. Points
//! that isolate in few splits score close to 1.0, inliers close to 0.5 or
//! below. The outlier threshold is the `1 - contamination` quantile of the
//! training scores.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shield_core::error::{Result, ShieldError};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub trees: usize,
    pub sample_size: usize,
    pub contamination: f64,
    pub seed: u64,
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// Average path length of an unsuccessful search over the sub-sample.
    normalizer: f64,
    threshold: f64,
}

impl IsolationForest {
    pub fn fit(data: &[f64], params: ForestParams) -> Result<Self> {
        if data.len() < 2 {
            return Err(ShieldError::Model(format!(
                "need at least 2 observations, got {}",
                data.len()
            )));
        }
        if params.trees == 0 {
            return Err(ShieldError::Model("forest needs at least one tree".into()));
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(ShieldError::Model(format!(
                "contamination {} outside (0, 0.5]",
                params.contamination
            )));
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ShieldError::Model("observations must be finite".into()));
        }

        let psi = params.sample_size.clamp(2, data.len());
        let height_limit = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.trees)
            .map(|_| {
                let sample: Vec<f64> = rand::seq::index::sample(&mut rng, data.len(), psi)
                    .into_iter()
                    .map(|i| data[i])
                    .collect();
                grow(sample, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            normalizer: average_path_length(psi),
            threshold: f64::INFINITY,
        };

        let mut training: Vec<f64> = data.iter().map(|&x| forest.score(x)).collect();
        training.sort_by(|a, b| a.total_cmp(b));
        forest.threshold = quantile(&training, 1.0 - params.contamination);
        Ok(forest)
    }

    /// Anomaly score in (0, 1].
    pub fn score(&self, x: f64) -> f64 {
        let total: f64 = self.trees.iter().map(|t| path_length(t, x, 0)).sum();
        let mean = total / self.trees.len() as f64;
        2f64.powf(-mean / self.normalizer)
    }

    pub fn is_outlier(&self, x: f64) -> bool {
        self.score(x) > self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

fn grow(sample: Vec<f64>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    let (min, max) = sample
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    if depth >= limit || sample.len() <= 1 || min >= max {
        return Node::Leaf { size: sample.len() };
    }
    let value = rng.gen_range(min..max);
    let (left, right): (Vec<f64>, Vec<f64>) = sample.into_iter().partition(|&x| x < value);
    Node::Split {
        value,
        left: Box::new(grow(left, depth + 1, limit, rng)),
        right: Box::new(grow(right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, x: f64, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split { value, left, right } => {
            if x < *value {
                path_length(left, x, depth + 1)
            } else {
                path_length(right, x, depth + 1)
            }
        }
    }
}

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

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
