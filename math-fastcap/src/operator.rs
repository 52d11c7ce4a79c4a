//! Matrix-free multipole-accelerated panel operator
//!
//! Applies `y = A q` where row `i` is the potential at the centroid of a
//! conductor panel, or the flux continuity condition at the centroid of a
//! dielectric interface panel. Each application runs the classical passes:
//!
//! 1. **Near-field**: dense exact blocks between neighboring leaves
//! 2. **Upward pass**: P2M at the leaves and M2M toward the root, deepest level first
//! 3. **Translation and downward pass**: M2L into every target and L2L toward the leaves
//! 4. **Evaluation**: L2P at the panel centroids of every leaf
//!
//! Every level is processed in parallel; each node's coefficients are written
//! by exactly one task and sums are formed in a fixed order, so the result
//! does not depend on the thread count.

use std::f64::consts::PI;
use std::sync::{Mutex, PoisonError};

use ndarray::{Array1, Array2};
use solvers::LinearOperator;

use crate::expansion::Expansion;
use crate::geometry::{dot, sub};
use crate::influence::{field_coefficient, potential_coefficient};
use crate::panel::{Panel, PanelKind};
use crate::parallel::{
    is_parallel_available, parallel_chunks_mut, parallel_map, parallel_map_indexed,
};
use crate::quadrature::polygon_rule;
use crate::tree::{NodeKind, Tree, TreeOptions};

/// How the equation row of a panel is formed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowKind {
    /// Potential at the centroid (conductor panels)
    Potential,
    /// `contrast · n·E + self_coefficient · q_i` (dielectric interface panels)
    Flux { contrast: f64, self_coefficient: f64 },
}

impl RowKind {
    pub fn of(panel: &Panel) -> Self {
        match panel.kind {
            PanelKind::Conductor { .. } => RowKind::Potential,
            PanelKind::Dielectric { inner_perm } => RowKind::Flux {
                contrast: panel.outer_perm - inner_perm,
                self_coefficient: (panel.outer_perm + inner_perm) * 2.0 * PI / panel.area,
            },
        }
    }
}

/// Exact matrix entry: influence of unit total charge on panel `k` in row `i`
pub fn coefficient(panels: &[Panel], i: usize, k: usize) -> f64 {
    let target = &panels[i];
    match RowKind::of(target) {
        RowKind::Potential => potential_coefficient(&panels[k], target.centroid),
        RowKind::Flux {
            contrast,
            self_coefficient,
        } => {
            if i == k {
                self_coefficient
            } else {
                contrast * dot(target.normal, field_coefficient(&panels[k], target.centroid))
            }
        }
    }
}

/// Dense exact block `A[rows, cols]`
pub fn dense_block(panels: &[Panel], rows: &[usize], cols: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), cols.len()), |(r, c)| {
        coefficient(panels, rows[r], cols[c])
    })
}

/// Near-field block of one target leaf
#[derive(Debug, Clone)]
pub struct NearFieldBlock {
    /// Target leaf node
    pub leaf: usize,
    /// Panels of the target leaf
    pub rows: Vec<usize>,
    /// Panels of all leaves in the target's direct list
    pub cols: Vec<usize>,
    /// Dense coefficient matrix (rows x cols)
    pub coefficients: Array2<f64>,
}

/// Multipole and local coefficients, `num_nodes x num_terms` each
#[derive(Debug)]
struct Workspace {
    multipoles: Vec<f64>,
    locals: Vec<f64>,
}

/// Multipole-accelerated operator over a fixed panel set
#[derive(Debug)]
pub struct FastcapOperator {
    panels: Vec<Panel>,
    tree: Tree,
    expansion: Expansion,
    near: Vec<NearFieldBlock>,
    /// Unit-charge moments of each panel about its leaf center
    moments: Vec<f64>,
    /// L2P row of each panel (potential, or scaled normal derivative)
    eval_rows: Vec<f64>,
    has_far_field: bool,
    workspace: Mutex<Workspace>,
}

impl FastcapOperator {
    /// Build the tree, the near-field blocks and the per-panel expansion rows
    pub fn new(panels: Vec<Panel>, order: usize, options: &TreeOptions) -> Self {
        let centroids: Vec<_> = panels.iter().map(|p| p.centroid).collect();
        let extents: Vec<_> = panels.iter().map(|p| p.radius).collect();
        let tree = Tree::build(&centroids, &extents, options);
        let expansion = Expansion::new(order);
        let terms = expansion.num_terms();

        let near = parallel_map(&tree.leaves, |&leaf| {
            let node = &tree.nodes[leaf];
            let rows = node.panels().to_vec();
            let cols: Vec<usize> = node
                .direct
                .iter()
                .flat_map(|&s| tree.nodes[s].panels().iter().copied())
                .collect();
            let coefficients = dense_block(&panels, &rows, &cols);
            NearFieldBlock {
                leaf,
                rows,
                cols,
                coefficients,
            }
        });

        let quad_order = (expansion.order() + 2).div_ceil(2);
        let per_panel = parallel_map_indexed(panels.len(), |k| {
            let panel = &panels[k];
            let center = tree.nodes[tree.leaf_of[k]].center;
            let rule = polygon_rule(&panel.vertices, quad_order);
            let mut moments = vec![0.0; terms];
            expansion.add_moments(&rule, center, 1.0 / panel.area, &mut moments);

            let z = sub(panel.centroid, center);
            let mut row = vec![0.0; terms];
            match RowKind::of(panel) {
                RowKind::Potential => expansion.potential_row(z, &mut row),
                RowKind::Flux { contrast, .. } => {
                    // n·E = -n·∇φ
                    expansion.gradient_row(z, panel.normal, &mut row);
                    row.iter_mut().for_each(|v| *v *= -contrast);
                }
            }
            (moments, row)
        });
        let mut moments = Vec::with_capacity(panels.len() * terms);
        let mut eval_rows = Vec::with_capacity(panels.len() * terms);
        for (m, r) in per_panel {
            moments.extend(m);
            eval_rows.extend(r);
        }

        let has_far_field = tree.nodes.iter().any(|n| !n.m2l.is_empty());
        let near_entries: usize = near.iter().map(|b| b.coefficients.len()).sum();
        log::info!(
            "operator: {} panels, expansion order {}, {} near-field entries, far field {}, {}",
            panels.len(),
            expansion.order(),
            near_entries,
            if has_far_field { "enabled" } else { "empty" },
            if is_parallel_available() { "parallel" } else { "sequential" }
        );

        let workspace = Workspace {
            multipoles: vec![0.0; tree.nodes.len() * terms],
            locals: vec![0.0; tree.nodes.len() * terms],
        };

        Self {
            panels,
            tree,
            expansion,
            near,
            moments,
            eval_rows,
            has_far_field,
            workspace: Mutex::new(workspace),
        }
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn expansion_order(&self) -> usize {
        self.expansion.order()
    }

    pub fn near_blocks(&self) -> &[NearFieldBlock] {
        &self.near
    }

    /// Exact matrix entry `A[i, k]`
    pub fn entry(&self, i: usize, k: usize) -> f64 {
        coefficient(&self.panels, i, k)
    }

    /// Fully assembled exact matrix, for small problems and diagnostics
    pub fn dense_matrix(&self) -> Array2<f64> {
        let all: Vec<usize> = (0..self.panels.len()).collect();
        dense_block(&self.panels, &all, &all)
    }

    /// Upward pass: P2M at leaves, M2M from the deepest level to the root
    fn upward_pass(&self, x: &Array1<f64>, multipoles: &mut [f64]) {
        let terms = self.expansion.num_terms();
        let nodes = &self.tree.nodes;

        for level in (0..self.tree.num_levels()).rev() {
            let range = self.tree.level_range(level);
            let (start, end) = (range.start, range.end);
            let (upper, lower) = multipoles.split_at_mut(end * terms);
            let lower: &[f64] = lower;
            let current = &mut upper[start * terms..];

            parallel_chunks_mut(current, terms, |i, m| {
                m.fill(0.0);
                let node = &nodes[start + i];
                match &node.kind {
                    NodeKind::Leaf { panels } => {
                        for &k in panels {
                            let q = x[k];
                            let pm = &self.moments[k * terms..(k + 1) * terms];
                            for (a, b) in m.iter_mut().zip(pm) {
                                *a += q * b;
                            }
                        }
                    }
                    NodeKind::Internal { .. } => {
                        for c in node.children() {
                            let offset = (c - end) * terms;
                            let child = &lower[offset..offset + terms];
                            let d = sub(nodes[c].center, node.center);
                            self.expansion.m2m(child, d, m);
                        }
                    }
                }
            });
        }
    }

    /// M2L into every node and L2L from the root to the leaves
    fn downward_pass(&self, multipoles: &[f64], locals: &mut [f64]) {
        let terms = self.expansion.num_terms();
        let nodes = &self.tree.nodes;

        for level in 0..self.tree.num_levels() {
            let range = self.tree.level_range(level);
            let start = range.start;
            let (before, rest) = locals.split_at_mut(start * terms);
            let before: &[f64] = before;
            let current = &mut rest[..range.len() * terms];

            parallel_chunks_mut(current, terms, |i, l| {
                l.fill(0.0);
                let node = &nodes[start + i];
                if let Some(p) = node.parent {
                    let parent = &before[p * terms..(p + 1) * terms];
                    self.expansion.l2l(parent, sub(node.center, nodes[p].center), l);
                }
                let mut scratch = vec![0.0; terms];
                for &s in &node.m2l {
                    let m = &multipoles[s * terms..(s + 1) * terms];
                    self.expansion
                        .m2l(m, sub(node.center, nodes[s].center), l, &mut scratch);
                }
            });
        }
    }

    /// L2P at every panel of every leaf
    fn evaluate_locals(&self, locals: &[f64], y: &mut Array1<f64>) {
        let terms = self.expansion.num_terms();
        let per_leaf = parallel_map(&self.tree.leaves, |&leaf| {
            let local = &locals[leaf * terms..(leaf + 1) * terms];
            self.tree.nodes[leaf]
                .panels()
                .iter()
                .map(|&k| {
                    let row = &self.eval_rows[k * terms..(k + 1) * terms];
                    row.iter().zip(local).map(|(a, b)| a * b).sum::<f64>()
                })
                .collect::<Vec<f64>>()
        });
        for (&leaf, values) in self.tree.leaves.iter().zip(per_leaf) {
            for (&k, v) in self.tree.nodes[leaf].panels().iter().zip(values) {
                y[k] += v;
            }
        }
    }
}

impl LinearOperator<f64> for FastcapOperator {
    fn num_rows(&self) -> usize {
        self.panels.len()
    }

    fn num_cols(&self) -> usize {
        self.panels.len()
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(self.panels.len());

        // near field: y[rows] += N * x[cols]
        let partial = parallel_map(&self.near, |block| {
            let xs = Array1::from_iter(block.cols.iter().map(|&c| x[c]));
            block.coefficients.dot(&xs)
        });
        for (block, yb) in self.near.iter().zip(partial) {
            for (&r, v) in block.rows.iter().zip(yb.iter()) {
                y[r] += v;
            }
        }

        if self.has_far_field {
            let mut guard = self.workspace.lock().unwrap_or_else(PoisonError::into_inner);
            let Workspace { multipoles, locals } = &mut *guard;
            self.upward_pass(x, multipoles);
            self.downward_pass(multipoles, locals);
            self.evaluate_locals(locals, &mut y);
        }

        y
    }
}
