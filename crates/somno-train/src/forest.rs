//! Random forest of CART trees with Gini impurity and balanced class weights.

use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features tried per split; `None` means √n_features.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_one(&self, row: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[feature] <= threshold { left } else { right },
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

fn argmax(counts: &[f64]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0
}

impl<'a> TreeBuilder<'a> {
    fn class_weights(&self, rows: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += self.weights[self.y[r]];
        }
        counts
    }

    fn build(&mut self, rows: &[usize], depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_weights(rows);
        let total: f64 = counts.iter().sum();
        let impurity = gini(&counts, total);
        let at_depth_limit = self.params.max_depth.map_or(false, |d| depth >= d);
        if impurity <= 0.0 || at_depth_limit || rows.len() < self.params.min_samples_split {
            return self.leaf(&counts);
        }
        let Some(best) = self.best_split(rows, &counts, total, impurity, rng) else {
            return self.leaf(&counts);
        };
        self.importances[best.feature] += best.gain;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.x[r][best.feature] <= best.threshold);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { class: 0 });
        let left = self.build(&left_rows, depth + 1, rng);
        let right = self.build(&right_rows, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn leaf(&mut self, counts: &[f64]) -> usize {
        self.nodes.push(Node::Leaf {
            class: argmax(counts),
        });
        self.nodes.len() - 1
    }

    fn best_split(
        &self,
        rows: &[usize],
        counts: &[f64],
        total: f64,
        impurity: f64,
        rng: &mut StdRng,
    ) -> Option<BestSplit> {
        let n_features = self.x[0].len();
        let mut best: Option<BestSplit> = None;
        for feature in sample(rng, n_features, self.max_features.min(n_features)).into_iter() {
            let mut sorted: Vec<usize> = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let mut left = vec![0.0; self.n_classes];
            let mut left_total = 0.0;
            for pair in sorted.windows(2) {
                let (r, next) = (pair[0], pair[1]);
                let w = self.weights[self.y[r]];
                left[self.y[r]] += w;
                left_total += w;
                let (v, v_next) = (self.x[r][feature], self.x[next][feature]);
                if v_next <= v {
                    continue;
                }
                let right: Vec<f64> = counts.iter().zip(&left).map(|(c, l)| c - l).collect();
                let right_total = total - left_total;
                let gain = total * impurity
                    - left_total * gini(&left, left_total)
                    - right_total * gini(&right, right_total);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: v + (v_next - v) * 0.5,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Bagged ensemble; prediction is a majority vote, ties resolved to the lower class.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    importances: Vec<f64>,
}

/// `n / (n_present_classes · count_c)`, the usual "balanced" weighting.
pub fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &c in y {
        counts[c] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                0.0
            } else {
                y.len() as f64 / (present as f64 * c as f64)
            }
        })
        .collect()
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[usize], n_classes: usize, params: &ForestParams) -> Self {
        let n_features = x.first().map_or(0, |row| row.len());
        let mut forest = Self {
            trees: Vec::with_capacity(params.n_estimators),
            n_classes,
            importances: vec![0.0; n_features],
        };
        if x.is_empty() || n_features == 0 {
            return forest;
        }
        let weights = balanced_class_weights(y, n_classes);
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features);
        let mut rng = StdRng::seed_from_u64(params.seed);
        for _ in 0..params.n_estimators.max(1) {
            let rows: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            let mut builder = TreeBuilder {
                x,
                y,
                weights: &weights,
                n_classes,
                max_features,
                params,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.build(&rows, 0, &mut rng);
            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in forest.importances.iter_mut().zip(&builder.importances) {
                    *acc += v / tree_total;
                }
            }
            forest.trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }
        let total: f64 = forest.importances.iter().sum();
        if total > 0.0 {
            forest.importances.iter_mut().for_each(|v| *v /= total);
        }
        forest
    }

    pub fn predict_one(&self, row: &[f64]) -> usize {
        let mut votes = vec![0.0; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict_one(row)] += 1.0;
        }
        argmax(&votes)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<usize> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Mean decrease in impurity per feature, summing to 1.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
