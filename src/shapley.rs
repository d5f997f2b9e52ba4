//! Exact TreeSHAP for a single regression tree.
//!
//! The recursion carries the unique path of features from the root, each
//! element holding the fraction of zero (feature absent) and one (feature
//! present) paths that flow through it, plus the permutation weight.
use crate::node::Node;
use crate::tree::Tree;

/// Feature index used for the root element, never equal to a split feature.
const ROOT_FEATURE: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: usize,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

#[derive(Debug, Clone, Default)]
struct ShapPath {
    elements: Vec<PathElement>,
}

impl ShapPath {
    /// Index of the last element.
    fn depth(&self) -> usize {
        self.elements.len().saturating_sub(1)
    }

    fn position(&self, feature: usize) -> Option<usize> {
        self.elements.iter().position(|e| e.feature == feature)
    }

    fn extend(&mut self, zero_fraction: f64, one_fraction: f64, feature: usize) {
        let pweight = if self.elements.is_empty() { 1.0 } else { 0.0 };
        self.elements.push(PathElement {
            feature,
            zero_fraction,
            one_fraction,
            pweight,
        });
        let depth = self.depth();
        let scale = (depth + 1) as f64;
        for i in (0..depth).rev() {
            let w = self.elements[i].pweight;
            self.elements[i + 1].pweight += one_fraction * w * (i + 1) as f64 / scale;
            self.elements[i].pweight = zero_fraction * w * (depth - i) as f64 / scale;
        }
    }

    /// Undo the extension made for the element at `index`.
    fn unwind(&mut self, index: usize) {
        let depth = self.depth();
        let scale = (depth + 1) as f64;
        let PathElement {
            zero_fraction,
            one_fraction,
            ..
        } = self.elements[index];
        let mut next_one_portion = self.elements[depth].pweight;
        for i in (0..depth).rev() {
            let w = self.elements[i].pweight;
            if one_fraction != 0.0 {
                let unwound = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
                self.elements[i].pweight = unwound;
                next_one_portion = w - unwound * zero_fraction * (depth - i) as f64 / scale;
            } else {
                self.elements[i].pweight = w * scale / (zero_fraction * (depth - i) as f64);
            }
        }
        // Weights stay in place, only the feature data shifts down.
        for i in index..depth {
            let next = self.elements[i + 1];
            let e = &mut self.elements[i];
            e.feature = next.feature;
            e.zero_fraction = next.zero_fraction;
            e.one_fraction = next.one_fraction;
        }
        self.elements.truncate(depth);
    }

    /// Total permutation weight the path would have with `index` unwound.
    fn unwound_sum(&self, index: usize) -> f64 {
        let depth = self.depth();
        let scale = (depth + 1) as f64;
        let PathElement {
            zero_fraction,
            one_fraction,
            ..
        } = self.elements[index];
        let mut next_one_portion = self.elements[depth].pweight;
        let mut total = 0.0;
        for i in (0..depth).rev() {
            let share = (depth - i) as f64 / scale;
            if one_fraction != 0.0 {
                let unwound = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
                total += unwound;
                next_one_portion = self.elements[i].pweight - unwound * zero_fraction * share;
            } else {
                total += self.elements[i].pweight / zero_fraction / share;
            }
        }
        total
    }
}

/// Children of `node`, hot (the one `row` follows) first.
fn hot_cold_children(node: &Node, row: &[f64]) -> [usize; 2] {
    if node.get_child_idx(&row[node.split_feature]) == node.left_child {
        [node.left_child, node.right_child]
    } else {
        [node.right_child, node.left_child]
    }
}

fn tree_shap(
    tree: &Tree,
    row: &[f64],
    contribs: &mut [f64],
    node_index: usize,
    mut path: ShapPath,
    (zero_fraction, one_fraction, feature): (f64, f64, usize),
) {
    let node = &tree.nodes[node_index];
    path.extend(zero_fraction, one_fraction, feature);

    if node.is_leaf {
        for i in 1..path.elements.len() {
            let w = path.unwound_sum(i);
            let e = path.elements[i];
            contribs[e.feature] += w * (e.one_fraction - e.zero_fraction) * node.weight_value;
        }
        return;
    }

    // A feature already on the path is split again: fold its fractions in.
    let (mut incoming_zero, mut incoming_one) = (1.0, 1.0);
    if let Some(k) = path.position(node.split_feature) {
        incoming_zero = path.elements[k].zero_fraction;
        incoming_one = path.elements[k].one_fraction;
        path.unwind(k);
    }

    let [hot, cold] = hot_cold_children(node, row);
    let fraction = |child: usize| tree.nodes[child].cover / node.cover * incoming_zero;
    tree_shap(
        tree,
        row,
        contribs,
        hot,
        path.clone(),
        (fraction(hot), incoming_one, node.split_feature),
    );
    tree_shap(tree, row, contribs, cold, path, (fraction(cold), 0.0, node.split_feature));
}

/// Add one tree's exact Shapley values for `row` into `contribs`.
///
/// `contribs` has one slot per feature plus a final slot that receives the
/// tree's expected value, so the slots sum to the tree's prediction.
pub fn predict_contributions_row_shapley(tree: &Tree, row: &[f64], contribs: &mut [f64]) {
    if let Some(bias) = contribs.last_mut() {
        *bias += tree.get_average_leaf_weights(0);
    }
    tree_shap(tree, row, contribs, 0, ShapPath::default(), (1.0, 1.0, ROOT_FEATURE));
}
