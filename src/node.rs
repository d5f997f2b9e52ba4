use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub num: usize,
    /// Mean target of the samples that reached this node.
    pub weight_value: f64,
    /// Number of training samples (bootstrap duplicates included) that reached this node.
    pub cover: f64,
    pub depth: usize,
    pub split_value: f64,
    pub split_feature: usize,
    pub split_gain: f64,
    pub left_child: usize,
    pub right_child: usize,
    pub is_leaf: bool,
}

impl Node {
    pub fn leaf(num: usize, depth: usize, weight_value: f64, cover: f64) -> Self {
        Node {
            num,
            weight_value,
            cover,
            depth,
            split_value: 0.0,
            split_feature: 0,
            split_gain: 0.0,
            left_child: 0,
            right_child: 0,
            is_leaf: true,
        }
    }

    /// Turn a leaf into a parent node.
    pub fn make_parent_node(&mut self, split: &SplitInfo, left_child: usize, right_child: usize) {
        self.is_leaf = false;
        self.split_feature = split.feature;
        self.split_value = split.value;
        self.split_gain = split.gain;
        self.left_child = left_child;
        self.right_child = right_child;
    }

    /// Get the path that should be traveled down, given a value.
    /// NaN compares false and so always travels right.
    pub fn get_child_idx(&self, v: &f64) -> usize {
        if v < &self.split_value {
            self.left_child
        } else {
            self.right_child
        }
    }
}

/// The best split found for a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitInfo {
    pub feature: usize,
    pub value: f64,
    pub gain: f64,
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf {
            write!(f, "{}:leaf={},cover={}", self.num, self.weight_value, self.cover)
        } else {
            write!(
                f,
                "{}:[{} < {}] yes={},no={},gain={},cover={}",
                self.num,
                self.split_feature,
                self.split_value,
                self.left_child,
                self.right_child,
                self.split_gain,
                self.cover
            )
        }
    }
}
