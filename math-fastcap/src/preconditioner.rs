//! Block near-field preconditioner
//!
//! For every leaf `L` the exact matrix is restricted to the leaf's own panels
//! plus the panels of its nearest direct-list neighbors (up to a size limit).
//! The block is inverted once and the rows of the inverse that belong to the
//! leaf's own panels are kept, giving
//!
//! ```text
//! (M r)[own(L)] = W_L r[block(L)]
//! ```
//!
//! Every panel belongs to exactly one leaf, so `M` is defined on all rows.
//! Block entries are gathered from the operator's near-field blocks; only
//! pairs of neighbors that are not in each other's direct list are computed.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use solvers::{Preconditioner, lu_factorize};

use crate::error::{FastcapError, Result};
use crate::geometry::distance;
use crate::operator::{FastcapOperator, NearFieldBlock, coefficient};
use crate::parallel::parallel_map;

/// Kept rows of one inverted block
#[derive(Debug, Clone)]
struct LeafBlock {
    /// Global indices of the leaf's own panels
    own: Vec<usize>,
    /// Global indices of the block columns
    block: Vec<usize>,
    /// `own.len() x block.len()` rows of the block inverse
    rows: Array2<f64>,
}

/// Overlapping block-Jacobi preconditioner over the leaves
#[derive(Debug, Clone)]
pub struct BlockPreconditioner {
    blocks: Vec<LeafBlock>,
    size: usize,
}

impl BlockPreconditioner {
    /// Factor one block per leaf, each with at most `block_limit` panels
    /// (the leaf's own panels are always included)
    pub fn new(operator: &FastcapOperator, block_limit: usize) -> Result<Self> {
        let tree = operator.tree();
        let panels = operator.panels();
        let near: HashMap<usize, &NearFieldBlock> = operator
            .near_blocks()
            .iter()
            .map(|b| (b.leaf, b))
            .collect();

        let results = parallel_map(&tree.leaves, |&leaf| -> Result<LeafBlock> {
            let node = &tree.nodes[leaf];
            let own = node.panels().to_vec();
            let mut block = own.clone();

            let mut neighbors: Vec<(f64, usize)> = node
                .direct
                .iter()
                .filter(|&&s| s != leaf)
                .map(|&s| (distance(tree.nodes[s].center, node.center), s))
                .collect();
            neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            for (_, s) in neighbors {
                let extra = tree.nodes[s].panels();
                if block.len() + extra.len() > block_limit {
                    break;
                }
                block.extend_from_slice(extra);
            }

            // rows of B^-1 are the columns of (B^T)^-1
            let matrix = gather_block(operator, &near, &block).reversed_axes();
            let lu = lu_factorize(&matrix).map_err(|e| {
                FastcapError::degenerate(format!(
                    "near-field block of leaf {} ({} panels) is singular: {}",
                    leaf,
                    block.len(),
                    e
                ))
            })?;
            let local: Vec<usize> = (0..own.len()).collect();
            let rows = lu
                .solve_unit_columns(&local)
                .map_err(|e| FastcapError::degenerate(e.to_string()))?;
            if rows.iter().any(|v| !v.is_finite()) {
                return Err(FastcapError::degenerate(format!(
                    "near-field block of leaf {} has a non-finite inverse",
                    leaf
                )));
            }

            Ok(LeafBlock { own, block, rows })
        });

        let blocks = results.into_iter().collect::<Result<Vec<_>>>()?;
        let largest = blocks.iter().map(|b| b.block.len()).max().unwrap_or(0);
        log::info!(
            "preconditioner: {} blocks, largest {} panels",
            blocks.len(),
            largest
        );

        Ok(Self {
            blocks,
            size: panels.len(),
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// Exact `A[block, block]`, copied from the near-field blocks where they hold the entry
fn gather_block(
    operator: &FastcapOperator,
    near: &HashMap<usize, &NearFieldBlock>,
    block: &[usize],
) -> Array2<f64> {
    let tree = operator.tree();
    let position: HashMap<usize, usize> =
        block.iter().enumerate().map(|(c, &k)| (k, c)).collect();
    let n = block.len();
    let mut matrix = Array2::zeros((n, n));
    let mut filled = Array2::from_elem((n, n), false);

    for (r, &i) in block.iter().enumerate() {
        let Some(nb) = near.get(&tree.leaf_of[i]) else {
            continue;
        };
        let Some(row) = nb.rows.iter().position(|&p| p == i) else {
            continue;
        };
        for (col, &k) in nb.cols.iter().enumerate() {
            if let Some(&c) = position.get(&k) {
                matrix[[r, c]] = nb.coefficients[[row, col]];
                filled[[r, c]] = true;
            }
        }
    }

    let panels = operator.panels();
    for ((r, c), done) in filled.indexed_iter() {
        if !done {
            matrix[[r, c]] = coefficient(panels, block[r], block[c]);
        }
    }
    matrix
}

impl Preconditioner<f64> for BlockPreconditioner {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(self.size);
        for b in &self.blocks {
            let rb = Array1::from_iter(b.block.iter().map(|&c| r[c]));
            let yb = b.rows.dot(&rb);
            for (&i, v) in b.own.iter().zip(yb.iter()) {
                y[i] = *v;
            }
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::icosphere;
    use crate::panel::{Orientation, Panel, PanelKind};
    use crate::tree::TreeOptions;
    use solvers::LinearOperator;

    fn sphere_operator(limit_leaf: usize) -> FastcapOperator {
        let surface = icosphere("s", [0.0; 3], 1.0, 2).unwrap();
        let panels = surface
            .panels()
            .iter()
            .map(|p| {
                Panel::new(
                    &p.vertices,
                    PanelKind::Conductor { conductor: 0 },
                    1.0,
                    Orientation::Winding,
                )
                .unwrap()
            })
            .collect();
        let options = TreeOptions {
            leaf_capacity: limit_leaf,
            ..TreeOptions::default()
        };
        FastcapOperator::new(panels, 2, &options)
    }

    #[test]
    fn test_whole_problem_block_is_exact_inverse() {
        // a single leaf holding everything makes M = A^-1
        let op = sphere_operator(1000);
        let precond = BlockPreconditioner::new(&op, 1000).unwrap();
        assert_eq!(precond.num_blocks(), 1);
        let x = Array1::from_shape_fn(op.num_rows(), |i| 1.0 + (i as f64 * 0.1).sin());
        let y = precond.apply(&op.apply(&x));
        for (a, b) in y.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-9 * b.abs().max(1.0));
        }
    }

    #[test]
    fn test_gathered_block_matches_exact_entries() {
        let op = sphere_operator(8);
        let near: HashMap<usize, &NearFieldBlock> =
            op.near_blocks().iter().map(|b| (b.leaf, b)).collect();
        let tree = op.tree();
        // a leaf and every panel of its direct list, plus panels of a far leaf
        let leaf = tree.leaves[0];
        let mut block: Vec<usize> = tree.nodes[leaf]
            .direct
            .iter()
            .flat_map(|&s| tree.nodes[s].panels().iter().copied())
            .collect();
        if let Some(&far) = tree.leaves.iter().find(|&&l| !tree.nodes[leaf].direct.contains(&l)) {
            block.extend_from_slice(tree.nodes[far].panels());
        }

        let gathered = gather_block(&op, &near, &block);
        let exact = crate::operator::dense_block(op.panels(), &block, &block);
        for (a, b) in gathered.iter().zip(exact.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_blocks_cover_every_panel_once() {
        let op = sphere_operator(8);
        let precond = BlockPreconditioner::new(&op, 40).unwrap();
        let mut seen = vec![0; op.num_rows()];
        for b in &precond.blocks {
            assert!(b.block.len() <= 40usize.max(b.own.len()));
            assert_eq!(&b.block[..b.own.len()], &b.own[..]);
            for &i in &b.own {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_preconditioner_reduces_residual() {
        let op = sphere_operator(8);
        let precond = BlockPreconditioner::new(&op, 64).unwrap();
        let b = Array1::from_elem(op.num_rows(), 1.0);
        // one Richardson step from zero with and without M
        let plain = &b - &op.apply(&b);
        let preconditioned = &b - &op.apply(&precond.apply(&b));
        let norm = |v: &Array1<f64>| v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!(norm(&preconditioned) < norm(&plain));
    }
}
