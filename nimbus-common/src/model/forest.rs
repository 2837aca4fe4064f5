//! Random forest classifier
//!
//! Bagged CART trees with Gini impurity. Each node considers a random
//! subset of features; leaves store class probability distributions and
//! the forest averages them.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Maximum tree depth (`None` = grow until leaves are pure)
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per node (`None` = `sqrt(n_features)`)
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: Vec<f32>,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// Single CART tree stored as a node arena (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn distribution(&self, row: &[f32]) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
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

    /// Check the arena is a well-formed tree: children sit after their
    /// parent and inside the arena, split features exist, and every leaf
    /// covers `n_classes`
    fn validate(&self, n_features: usize, n_classes: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "leaf {} has {} classes, expected {}",
                            index,
                            distribution.len(),
                            n_classes
                        ));
                    }
                }
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            index, feature, n_features
                        ));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= len {
                            return Err(format!(
                                "node {} has child {} outside {}..{}",
                                index,
                                child,
                                index + 1,
                                len
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Trained random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Train on `rows` with class indices `labels` in `0..n_classes`
    pub fn fit(
        rows: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
        params: ForestParams,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidInput("Cannot train on zero samples".to_string()));
        }
        if rows.len() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if n_classes == 0 || labels.iter().any(|&l| l >= n_classes) {
            return Err(Error::InvalidInput(format!(
                "Labels must be in 0..{}",
                n_classes
            )));
        }
        if params.n_trees == 0 {
            return Err(Error::InvalidInput("n_trees must be at least 1".to_string()));
        }

        let n_features = rows[0].len();
        if n_features == 0 || rows.iter().any(|r| r.len() != n_features) {
            return Err(Error::InvalidInput("Rows must share a non-zero length".to_string()));
        }

        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);

        let builder = TreeBuilder {
            rows,
            labels,
            n_classes,
            n_features,
            max_features,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
        };

        let trees = (0..params.n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let mut sample: Vec<usize> = if params.bootstrap {
                    (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect()
                } else {
                    (0..rows.len()).collect()
                };
                builder.build(&mut sample, &mut rng)
            })
            .collect();

        Ok(Self {
            n_classes,
            n_features,
            params,
            trees,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Reject a deserialized forest whose trees could index out of bounds
    /// or loop while classifying
    pub fn validate(&self) -> Result<()> {
        if self.n_classes == 0 || self.n_features == 0 {
            return Err(Error::Model("Forest has zero classes or features".to_string()));
        }
        if self.trees.is_empty() {
            return Err(Error::Model("Forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|reason| Error::Model(format!("Tree {} is malformed: {}", i, reason)))?;
        }
        Ok(())
    }

    /// Mean of the trees' leaf distributions
    pub fn predict_proba(&self, row: &[f32]) -> Result<Vec<f32>> {
        if row.len() != self.n_features {
            return Err(Error::InvalidInput(format!(
                "Model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(Error::Model("Forest has no trees".to_string()));
        }

        let mut proba = vec![0.0f32; self.n_classes];
        for tree in &self.trees {
            for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                *p += d;
            }
        }
        let n = self.trees.len() as f32;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    /// Most probable class; the lowest index wins ties
    pub fn predict(&self, row: &[f32]) -> Result<usize> {
        Ok(argmax(&self.predict_proba(row)?))
    }
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f32>],
    labels: &'a [usize],
    n_classes: usize,
    n_features: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f32,
    /// Weighted child impurity (lower is better)
    impurity: f64,
}

impl TreeBuilder<'_> {
    fn build(&self, sample: &mut [usize], rng: &mut StdRng) -> DecisionTree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, sample, 0, rng);
        DecisionTree { nodes }
    }

    fn grow(&self, nodes: &mut Vec<Node>, sample: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(sample);
        let index = nodes.len();

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        let too_small = sample.len() < self.min_samples_split
            || sample.len() < 2 * self.min_samples_leaf;

        let split = if pure || depth_reached || too_small {
            None
        } else {
            self.best_split(sample, rng)
        };

        let Some(split) = split else {
            nodes.push(Node::Leaf {
                distribution: normalize(&counts),
            });
            return index;
        };

        // Reserve the slot, then fill in child indices after recursion
        nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        let boundary = partition(sample, |&i| self.rows[i][split.feature] <= split.threshold);
        let (left_sample, right_sample) = sample.split_at_mut(boundary);

        let left = self.grow(nodes, left_sample, depth + 1, rng);
        let right = self.grow(nodes, right_sample, depth + 1, rng);

        nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&self, sample: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut informative_seen = 0;

        // Keep drawing past max_features while every drawn feature is
        // constant within this node
        for feature in features {
            if informative_seen >= self.max_features {
                break;
            }

            let mut values: Vec<(f32, usize)> = sample
                .iter()
                .map(|&i| (self.rows[i][feature], self.labels[i]))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            if values.first().map(|v| v.0) == values.last().map(|v| v.0) {
                continue;
            }
            informative_seen += 1;

            if let Some(candidate) = self.best_threshold(feature, &values) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn best_threshold(&self, feature: usize, values: &[(f32, usize)]) -> Option<SplitCandidate> {
        let n = values.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = vec![0usize; self.n_classes];
        for &(_, label) in values {
            right[label] += 1;
        }

        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            let label = values[i].1;
            left[label] += 1;
            right[label] -= 1;

            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let (a, b) = (values[i].0, values[i + 1].0);
            if a >= b {
                continue;
            }

            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;

            if best.as_ref().map_or(true, |c| impurity < c.impurity) {
                let mut threshold = a + (b - a) / 2.0;
                if threshold >= b || !threshold.is_finite() {
                    threshold = a;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }

        best
    }

    fn class_counts(&self, sample: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in sample {
            counts[self.labels[i]] += 1;
        }
        counts
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}

fn normalize(counts: &[usize]) -> Vec<f32> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|&c| c as f32 / total as f32).collect()
}

/// In-place partition; returns the number of elements satisfying `pred`
fn partition<F: Fn(&usize) -> bool>(items: &mut [usize], pred: F) -> usize {
    let mut boundary = 0;
    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(i, boundary);
            boundary += 1;
        }
    }
    boundary
}
