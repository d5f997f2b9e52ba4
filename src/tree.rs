use crate::data::Matrix;
use crate::node::{Node, SplitInfo};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};

/// Splits must improve the sum of squared errors by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

/// A CART regression tree grown with exact, variance reducing splits.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub depth: usize,
    pub n_leaves: usize,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow the tree on the rows listed in `index`.
    ///
    /// `index` may contain repeated rows, which is how bootstrap samples are
    /// passed in. It is reordered in place while the tree is grown.
    pub fn fit(&mut self, data: &Matrix<f64>, mut index: Vec<usize>, y: &[f64], params: &TreeParams) {
        self.nodes.clear();
        self.depth = 0;
        self.n_leaves = 0;
        if index.is_empty() {
            return;
        }

        let (weight, cover) = node_stats(&index, y);
        self.nodes.push(Node::leaf(0, 0, weight, cover));

        // (node, start, stop) into `index`
        let mut growable = vec![(0_usize, 0_usize, index.len())];
        while let Some((n_idx, start, stop)) = growable.pop() {
            let depth = self.nodes[n_idx].depth;
            if depth >= params.max_depth || (stop - start) < params.min_samples_split {
                continue;
            }
            let split = match best_split(data, &index[start..stop], y, params.min_samples_leaf) {
                Some(split) => split,
                None => continue,
            };

            let mid = start + pivot_on_split(&mut index[start..stop], data.get_col(split.feature), split.value);
            let left_num = self.nodes.len();
            let right_num = left_num + 1;

            let (left_weight, left_cover) = node_stats(&index[start..mid], y);
            let (right_weight, right_cover) = node_stats(&index[mid..stop], y);
            self.nodes.push(Node::leaf(left_num, depth + 1, left_weight, left_cover));
            self.nodes.push(Node::leaf(right_num, depth + 1, right_weight, right_cover));
            self.nodes[n_idx].make_parent_node(&split, left_num, right_num);

            growable.push((left_num, start, mid));
            growable.push((right_num, mid, stop));
        }

        self.n_leaves = self.nodes.iter().filter(|n| n.is_leaf).count();
        self.depth = self.nodes.iter().map(|n| n.depth).max().unwrap_or(0);
    }

    pub fn predict_row_from_row_slice(&self, row: &[f64]) -> f64 {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[node_idx];
            if node.is_leaf {
                return node.weight_value;
            }
            node_idx = node.get_child_idx(&row[node.split_feature]);
        }
    }

    pub fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
        data.index
            .iter()
            .map(|i| self.predict_row_from_row_slice(&data.get_row(*i)))
            .collect()
    }

    /// Cover weighted average of the leaf weights below node `i`.
    ///
    /// At the root this is the tree's expected value.
    pub fn get_average_leaf_weights(&self, i: usize) -> f64 {
        let node = &self.nodes[i];
        if node.is_leaf {
            node.weight_value
        } else {
            let left_node = &self.nodes[node.left_child];
            let right_node = &self.nodes[node.right_child];
            let w = left_node.cover * self.get_average_leaf_weights(node.left_child)
                + right_node.cover * self.get_average_leaf_weights(node.right_child);
            w / node.cover
        }
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<usize> = vec![0];
        let mut r = String::new();
        while let Some(idx) = print_buffer.pop() {
            let node = &self.nodes[idx];
            r += format!("{}{}\n", "      ".repeat(node.depth).as_str(), node).as_str();
            if !node.is_leaf {
                print_buffer.push(node.right_child);
                print_buffer.push(node.left_child);
            }
        }
        write!(f, "{}", r)
    }
}

fn node_stats(index: &[usize], y: &[f64]) -> (f64, f64) {
    let cover = index.len() as f64;
    let sum: f64 = index.iter().map(|i| y[*i]).sum();
    (sum / cover, cover)
}

fn missing_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Exhaustive search for the split that most reduces the sum of squared errors.
///
/// Thresholds sit midway between consecutive distinct values. Missing values
/// never define a threshold and always fall to the right.
fn best_split(data: &Matrix<f64>, index: &[usize], y: &[f64], min_samples_leaf: usize) -> Option<SplitInfo> {
    let n = index.len();
    let total: f64 = index.iter().map(|i| y[*i]).sum();
    let parent_score = total * total / n as f64;
    let min_samples_leaf = min_samples_leaf.max(1);

    let mut best: Option<SplitInfo> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);
    for feature in 0..data.cols {
        let col = data.get_col(feature);
        pairs.clear();
        pairs.extend(index.iter().map(|i| (col[*i], y[*i])));
        pairs.sort_by(|a, b| missing_last(a.0, b.0));
        let n_finite = pairs.iter().take_while(|(x, _)| !x.is_nan()).count();

        let mut left_sum = 0.0;
        for i in 0..n_finite.saturating_sub(1) {
            left_sum += pairs[i].1;
            let n_left = i + 1;
            let n_right = n - n_left;
            let (lower, upper) = (pairs[i].0, pairs[i + 1].0);
            if lower == upper || n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64 - parent_score;
            if gain > best.map_or(MIN_SPLIT_GAIN, |b| b.gain) {
                let mut value = lower / 2.0 + upper / 2.0;
                if value <= lower {
                    value = upper;
                }
                best = Some(SplitInfo { feature, value, gain });
            }
        }
    }
    best
}

/// Partition `index` so rows going left come first, returning the number of them.
pub fn pivot_on_split(index: &mut [usize], feature: &[f64], split_value: f64) -> usize {
    let mut low = 0;
    let mut high = index.len();
    while low < high {
        if feature[index[low]] < split_value {
            low += 1;
        } else {
            high -= 1;
            index.swap(low, high);
        }
    }
    low
}
