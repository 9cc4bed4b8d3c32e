//! Random forest classifier and the feature scaler that feeds it.
//!
//! Trees are CART with Gini impurity, grown on bootstrap samples with a random
//! subset of candidate features per split. Leaves keep class frequencies, and
//! the forest averages them, so every prediction is a full distribution over
//! `N_CLASSES` classes.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ForestParams;
use crate::error::{PredictorError, Result};

pub const N_CLASSES: usize = 3;

/// Zero mean, unit variance per column. Columns with no variance keep a scale
/// of 1 so they pass through centred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());
        for column in x.column_iter() {
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| (x[(i, j)] - self.means[j]) / self.scales[j])
    }

    pub fn transform_row(&self, row: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            row.len(),
            row.iter()
                .enumerate()
                .map(|(j, v)| (v - self.means[j]) / self.scales[j]),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        probs: [f64; N_CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    x: &'a DMatrix<f64>,
    y: &'a [usize],
    params: &'a ForestParams,
    max_features: usize,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `samples` (duplicates allowed).
    pub fn fit(
        x: &DMatrix<f64>,
        y: &[usize],
        samples: Vec<usize>,
        params: &ForestParams,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = TreeBuilder {
            x,
            y,
            params,
            max_features: max_features.clamp(1, x.ncols().max(1)),
            nodes: Vec::new(),
        };
        builder.grow(samples, 0, rng);
        Self { nodes: builder.nodes }
    }

    pub fn predict_proba(&self, row: &DVector<f64>) -> [f64; N_CLASSES] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { probs } => return *probs,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Reject trees that would index past `width` features or outside their
    /// own node list. Children always come after their parent, so a valid
    /// tree also has no cycles.
    pub fn validate(&self, width: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PredictorError::InvalidModel("tree has no nodes".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature, left, right, ..
            } = *node
            {
                if feature >= width {
                    return Err(PredictorError::InvalidModel(format!(
                        "node {} splits on feature {} of {}",
                        index, feature, width
                    )));
                }
                for child in [left, right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(PredictorError::InvalidModel(format!(
                            "node {} points to child {} of {} nodes",
                            index,
                            child,
                            self.nodes.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl TreeBuilder<'_> {
    /// Returns the index of the node built for `samples`.
    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = class_counts(self.y, &samples);
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            probs: frequencies(&counts, samples.len()),
        });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || samples.len() < self.params.min_samples_split {
            return index;
        }

        let Some((feature, threshold)) = self.best_split(&samples, &counts, rng) else {
            return index;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| self.x[(s, feature)] <= threshold);

        let left = self.grow(left_samples, depth + 1, rng);
        let right = self.grow(right_samples, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    /// Best Gini split over `max_features` randomly drawn features. When all of
    /// those are constant over `samples` the remaining features are tried too.
    fn best_split(
        &self,
        samples: &[usize],
        counts: &[usize; N_CLASSES],
        rng: &mut StdRng,
    ) -> Option<(usize, f64)> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let mut best: Option<(usize, f64, f64)> = None;

        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            if let Some((threshold, impurity)) = self.best_threshold(samples, feature, counts) {
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, threshold, impurity));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    /// Lowest weighted child impurity for `feature`, with the midpoint threshold.
    fn best_threshold(
        &self,
        samples: &[usize],
        feature: usize,
        counts: &[usize; N_CLASSES],
    ) -> Option<(f64, f64)> {
        let mut sorted: Vec<(f64, usize)> = samples
            .iter()
            .map(|&s| (self.x[(s, feature)], self.y[s]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = sorted.len();
        if total < 2 {
            return None;
        }
        let mut left = [0usize; N_CLASSES];
        let mut right = *counts;
        let mut best: Option<(f64, f64)> = None;

        for i in 0..total - 1 {
            let (value, class) = sorted[i];
            left[class] += 1;
            right[class] -= 1;

            let next = sorted[i + 1].0;
            if next <= value {
                continue;
            }
            let n_left = i + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right))
                / total as f64;
            if best.map_or(true, |(_, b)| impurity < b) {
                // adjacent floats can round the midpoint up to `next`
                let mut threshold = (value + next) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some((threshold, impurity));
            }
        }
        best
    }
}

fn class_counts(y: &[usize], samples: &[usize]) -> [usize; N_CLASSES] {
    let mut counts = [0usize; N_CLASSES];
    for &s in samples {
        counts[y[s]] += 1;
    }
    counts
}

fn frequencies(counts: &[usize; N_CLASSES], total: usize) -> [f64; N_CLASSES] {
    if total == 0 {
        return [1.0 / N_CLASSES as f64; N_CLASSES];
    }
    counts.map(|c| c as f64 / total as f64)
}

fn gini(counts: &[usize; N_CLASSES], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on rows of `x` labelled by `y` (values below `N_CLASSES`).
    pub fn fit(x: &DMatrix<f64>, y: &[usize], params: &ForestParams, seed: u64) -> Self {
        let n = x.nrows();
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..params.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(x, y, bootstrap, params, max_features, &mut rng)
            })
            .collect();

        Self { trees }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Structural check for a forest read back from disk.
    pub fn validate(&self, width: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(PredictorError::InvalidModel("forest has no trees".to_string()));
        }
        self.trees.iter().try_for_each(|tree| tree.validate(width))
    }

    /// Mean of the trees' leaf distributions.
    pub fn predict_proba(&self, row: &DVector<f64>) -> [f64; N_CLASSES] {
        let mut probs = [0.0; N_CLASSES];
        if self.trees.is_empty() {
            return [1.0 / N_CLASSES as f64; N_CLASSES];
        }
        for tree in &self.trees {
            for (acc, p) in probs.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        probs.map(|p| p / n)
    }

    pub fn predict(&self, row: &DVector<f64>) -> usize {
        crate::utils::argmax(&self.predict_proba(row))
    }
}
