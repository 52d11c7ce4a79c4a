//! Octree spatial hierarchy for multipole acceleration
//!
//! Nodes live in a flat arena built breadth-first, so every level occupies a
//! contiguous index range (`level_offsets`). A node is either a leaf holding
//! panel indices or an internal node with up to eight non-empty children.
//!
//! Interaction lists are computed by a dual descent from the root: a source
//! node enters a target's M2L list at the first level where the pair is well
//! separated, and whatever is never separated ends up in a leaf's direct list.

use crate::geometry::{Aabb, Vec3, distance, octant, octant_center};

/// Deepest level the automatic depth selection (and an explicit depth) may reach
pub const MAX_DEPTH: usize = 16;

/// Padding of the root cube relative to the centroid bounding box
const ROOT_PADDING: f64 = 0.01;

/// Options controlling tree construction and the acceptance criterion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeOptions {
    /// Split a node while it holds more panels than this
    pub leaf_capacity: usize,
    /// Deepest level allowed, `None` for automatic selection
    pub max_depth: Option<usize>,
    /// Multipole acceptance ratio: `dist >= ratio * (rT + rS)`
    pub separation_ratio: f64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            leaf_capacity: 16,
            max_depth: None,
            separation_ratio: 2.0,
        }
    }
}

impl TreeOptions {
    /// Depth limit for `n` panels
    ///
    /// Automatic selection uses `ceil(log4(n / leaf_capacity)) + 1`, clamped
    /// to `[1, MAX_DEPTH]`. Surface meshes roughly quadruple their leaf count
    /// per level, hence the base 4.
    pub fn depth_limit(&self, n: usize) -> usize {
        match self.max_depth {
            Some(d) => d.min(MAX_DEPTH),
            None => {
                let cap = self.leaf_capacity.max(1) as f64;
                let ratio = (n.max(1) as f64 / cap).max(1.0);
                let levels = ratio.log(4.0).ceil() as usize + 1;
                levels.clamp(1, MAX_DEPTH)
            }
        }
    }
}

/// Leaf or internal node payload, fixed once the tree is built
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf { panels: Vec<usize> },
    Internal { children: [Option<usize>; 8] },
}

/// Octree node
#[derive(Debug, Clone)]
pub struct Node {
    /// Center of the node cube
    pub center: Vec3,
    /// Half of the cube edge length
    pub half_width: f64,
    /// Level in the tree (0 = root)
    pub level: usize,
    /// Radius about `center` enclosing every panel of the subtree
    pub radius: f64,
    /// Parent node index (None for root)
    pub parent: Option<usize>,
    pub kind: NodeKind,
    /// Number of panels in the subtree
    pub panel_count: usize,
    /// Well-separated source nodes translated into this node's local expansion
    pub m2l: Vec<usize>,
    /// Source leaves evaluated directly (leaves only)
    pub direct: Vec<usize>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Panel indices of a leaf (empty for internal nodes)
    pub fn panels(&self) -> &[usize] {
        match &self.kind {
            NodeKind::Leaf { panels } => panels,
            NodeKind::Internal { .. } => &[],
        }
    }

    /// Existing children in octant order
    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        let children: &[Option<usize>] = match &self.kind {
            NodeKind::Internal { children } => children,
            NodeKind::Leaf { .. } => &[],
        };
        children.iter().flatten().copied()
    }
}

/// Octree over panel centroids
#[derive(Debug, Clone)]
pub struct Tree {
    /// All nodes, level by level
    pub nodes: Vec<Node>,
    /// Level `l` occupies `nodes[level_offsets[l]..level_offsets[l + 1]]`
    pub level_offsets: Vec<usize>,
    /// Leaf node indices in arena order
    pub leaves: Vec<usize>,
    /// Leaf holding each panel
    pub leaf_of: Vec<usize>,
    /// Depth limit used for construction
    pub depth_limit: usize,
    pub options: TreeOptions,
}

impl Tree {
    /// Build the tree and its interaction lists
    ///
    /// `centroids[k]` is the split point of panel `k` and `extents[k]` the
    /// largest distance from that point to one of the panel's vertices.
    pub fn build(centroids: &[Vec3], extents: &[f64], options: &TreeOptions) -> Self {
        debug_assert_eq!(centroids.len(), extents.len());
        let n = centroids.len();
        let depth_limit = options.depth_limit(n);
        let leaf_capacity = options.leaf_capacity.max(1);

        let bounds = Aabb::from_points(centroids.iter());
        let (center, half_width) = if bounds.is_empty() {
            ([0.0; 3], 1.0)
        } else {
            let max_extent = extents.iter().copied().fold(0.0, f64::max);
            let h = 0.5 * bounds.max_dimension() * (1.0 + ROOT_PADDING);
            (bounds.center(), h.max(max_extent).max(f64::MIN_POSITIVE))
        };

        let all: Vec<usize> = (0..n).collect();
        let mut tree = Self {
            nodes: vec![Self::make_node(center, half_width, 0, None, all, centroids, extents)],
            level_offsets: vec![0],
            leaves: Vec::new(),
            leaf_of: vec![0; n],
            depth_limit,
            options: *options,
        };

        let mut level_start = 0;
        loop {
            let level_end = tree.nodes.len();
            tree.level_offsets.push(level_end);
            for idx in level_start..level_end {
                let node = &tree.nodes[idx];
                if node.panel_count > leaf_capacity && node.level < depth_limit {
                    tree.subdivide(idx, centroids, extents);
                }
            }
            if tree.nodes.len() == level_end {
                break;
            }
            level_start = level_end;
        }

        for (idx, node) in tree.nodes.iter().enumerate() {
            if let NodeKind::Leaf { panels } = &node.kind {
                tree.leaves.push(idx);
                for &p in panels {
                    tree.leaf_of[p] = idx;
                }
            }
        }

        if n > 0 {
            tree.process(0, vec![0]);
        }

        let stats = tree.stats();
        log::info!(
            "octree: {} panels, {} nodes, {} leaves, depth {} (limit {}), {} M2L pairs, {} direct pairs",
            n,
            stats.num_nodes,
            stats.num_leaves,
            stats.depth,
            depth_limit,
            stats.m2l_pairs,
            stats.direct_pairs
        );

        tree
    }

    fn make_node(
        center: Vec3,
        half_width: f64,
        level: usize,
        parent: Option<usize>,
        panels: Vec<usize>,
        centroids: &[Vec3],
        extents: &[f64],
    ) -> Node {
        let radius = panels
            .iter()
            .map(|&p| distance(centroids[p], center) + extents[p])
            .fold(0.0, f64::max);
        Node {
            center,
            half_width,
            level,
            radius,
            parent,
            panel_count: panels.len(),
            kind: NodeKind::Leaf { panels },
            m2l: Vec::new(),
            direct: Vec::new(),
        }
    }

    /// Distribute a leaf's panels into its octants; only non-empty children are created
    fn subdivide(&mut self, idx: usize, centroids: &[Vec3], extents: &[f64]) {
        let (center, half_width, level) = {
            let node = &self.nodes[idx];
            (node.center, node.half_width, node.level)
        };
        let panels = match &mut self.nodes[idx].kind {
            NodeKind::Leaf { panels } => std::mem::take(panels),
            NodeKind::Internal { .. } => return,
        };

        let mut buckets: [Vec<usize>; 8] = Default::default();
        for p in panels {
            buckets[octant(center, centroids[p])].push(p);
        }

        let mut children = [None; 8];
        let child_half = 0.5 * half_width;
        for (oct, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let child_center = octant_center(center, half_width, oct);
            children[oct] = Some(self.nodes.len());
            self.nodes.push(Self::make_node(
                child_center,
                child_half,
                level + 1,
                Some(idx),
                bucket,
                centroids,
                extents,
            ));
        }
        self.nodes[idx].kind = NodeKind::Internal { children };
    }

    /// Multipole acceptance criterion
    pub fn well_separated(&self, target: usize, source: usize) -> bool {
        let t = &self.nodes[target];
        let s = &self.nodes[source];
        target != source
            && distance(t.center, s.center) >= self.options.separation_ratio * (t.radius + s.radius)
    }

    /// Dual descent assigning M2L and direct lists below `target`
    fn process(&mut self, target: usize, candidates: Vec<usize>) {
        let mut near = Vec::new();
        for s in candidates {
            if self.well_separated(target, s) {
                self.nodes[target].m2l.push(s);
            } else {
                near.push(s);
            }
        }

        if self.nodes[target].is_leaf() {
            let mut direct = Vec::new();
            let mut pending = near;
            while !pending.is_empty() {
                let mut next = Vec::new();
                for s in pending {
                    if self.nodes[s].is_leaf() {
                        direct.push(s);
                        continue;
                    }
                    let children: Vec<usize> = self.nodes[s].children().collect();
                    for c in children {
                        if self.well_separated(target, c) {
                            self.nodes[target].m2l.push(c);
                        } else {
                            next.push(c);
                        }
                    }
                }
                pending = next;
            }
            direct.sort_unstable();
            self.nodes[target].direct = direct;
            return;
        }

        let level = self.nodes[target].level;
        let mut next = Vec::with_capacity(near.len() * 8);
        for s in near {
            let node = &self.nodes[s];
            if node.is_leaf() || node.level > level {
                next.push(s);
            } else {
                next.extend(node.children());
            }
        }

        let children: Vec<usize> = self.nodes[target].children().collect();
        for c in children {
            self.process(c, next.clone());
        }
    }

    /// Number of levels in use (`depth + 1`)
    pub fn num_levels(&self) -> usize {
        self.level_offsets.len() - 1
    }

    /// Deepest level reached
    pub fn depth(&self) -> usize {
        self.num_levels().saturating_sub(1)
    }

    /// Node index range of one level
    pub fn level_range(&self, level: usize) -> std::ops::Range<usize> {
        self.level_offsets[level]..self.level_offsets[level + 1]
    }

    pub fn stats(&self) -> TreeStats {
        let leaf_sizes: Vec<usize> = self
            .leaves
            .iter()
            .map(|&l| self.nodes[l].panel_count)
            .collect();
        let num_leaves = leaf_sizes.len();
        let total: usize = leaf_sizes.iter().sum();
        TreeStats {
            num_nodes: self.nodes.len(),
            num_leaves,
            depth: self.depth(),
            avg_panels_per_leaf: if num_leaves > 0 {
                total as f64 / num_leaves as f64
            } else {
                0.0
            },
            max_panels_per_leaf: leaf_sizes.iter().copied().max().unwrap_or(0),
            m2l_pairs: self.nodes.iter().map(|n| n.m2l.len()).sum(),
            direct_pairs: self.nodes.iter().map(|n| n.direct.len()).sum(),
        }
    }
}

/// Statistics about a tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStats {
    pub num_nodes: usize,
    pub num_leaves: usize,
    pub depth: usize,
    pub avg_panels_per_leaf: f64,
    pub max_panels_per_leaf: usize,
    /// Total entries in all M2L lists
    pub m2l_pairs: usize,
    /// Total entries in all direct lists
    pub direct_pairs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points on a jittered grid in the plane z = 0
    fn grid(nx: usize, ny: usize) -> Vec<Vec3> {
        let mut pts = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                let jitter = ((i * 7 + j * 13) % 5) as f64 * 0.01;
                pts.push([i as f64 + jitter, j as f64 - jitter, 0.0]);
            }
        }
        pts
    }

    fn build(pts: &[Vec3], options: &TreeOptions) -> Tree {
        let extents = vec![0.5; pts.len()];
        Tree::build(pts, &extents, options)
    }

    /// All leaves reachable from `node` through the tree
    fn leaves_below(tree: &Tree, node: usize, out: &mut Vec<usize>) {
        if tree.nodes[node].is_leaf() {
            out.push(node);
        } else {
            for c in tree.nodes[node].children() {
                leaves_below(tree, c, out);
            }
        }
    }

    fn ancestors_and_self(tree: &Tree, mut node: usize) -> Vec<usize> {
        let mut out = vec![node];
        while let Some(p) = tree.nodes[node].parent {
            out.push(p);
            node = p;
        }
        out
    }

    #[test]
    fn test_depth_limit() {
        let opts = TreeOptions::default();
        assert_eq!(opts.depth_limit(10), 1);
        assert_eq!(opts.depth_limit(64), 2);
        assert_eq!(opts.depth_limit(16 * 4usize.pow(20)), MAX_DEPTH);
        let fixed = TreeOptions {
            max_depth: Some(3),
            ..opts
        };
        assert_eq!(fixed.depth_limit(1_000_000), 3);
    }

    #[test]
    fn test_levels_are_contiguous() {
        let pts = grid(20, 20);
        let tree = build(&pts, &TreeOptions::default());
        assert_eq!(*tree.level_offsets.last().unwrap(), tree.nodes.len());
        for level in 0..tree.num_levels() {
            for idx in tree.level_range(level) {
                assert_eq!(tree.nodes[idx].level, level);
            }
        }
        assert!(tree.depth() >= 1);
    }

    #[test]
    fn test_every_panel_in_exactly_one_leaf() {
        let pts = grid(17, 9);
        let tree = build(&pts, &TreeOptions::default());
        let mut seen = vec![0; pts.len()];
        for &leaf in &tree.leaves {
            for &p in tree.nodes[leaf].panels() {
                seen[p] += 1;
                assert_eq!(tree.leaf_of[p], leaf);
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_leaf_capacity_respected() {
        let pts = grid(30, 30);
        let opts = TreeOptions {
            max_depth: Some(MAX_DEPTH),
            ..TreeOptions::default()
        };
        let tree = build(&pts, &opts);
        for &leaf in &tree.leaves {
            assert!(tree.nodes[leaf].panel_count <= opts.leaf_capacity);
        }
        let stats = tree.stats();
        assert!(stats.max_panels_per_leaf <= opts.leaf_capacity);
        assert_eq!(stats.num_leaves, tree.leaves.len());
    }

    #[test]
    fn test_radius_covers_panels() {
        let pts = grid(12, 12);
        let tree = build(&pts, &TreeOptions::default());
        for &leaf in &tree.leaves {
            let node = &tree.nodes[leaf];
            for &p in node.panels() {
                assert!(distance(pts[p], node.center) + 0.5 <= node.radius + 1e-12);
            }
        }
    }

    #[test]
    fn test_coincident_points_stop_at_depth_limit() {
        let pts = vec![[1.0, 1.0, 1.0]; 40];
        let opts = TreeOptions {
            max_depth: Some(4),
            ..TreeOptions::default()
        };
        let tree = build(&pts, &opts);
        assert!(tree.depth() <= 4);
        assert_eq!(tree.stats().max_panels_per_leaf, 40);
    }

    #[test]
    fn test_every_pair_covered_once() {
        let pts = grid(24, 16);
        let tree = build(&pts, &TreeOptions::default());
        let n = pts.len();
        let mut count = vec![0u32; n * n];

        for (t, node) in tree.nodes.iter().enumerate() {
            let mut targets = Vec::new();
            leaves_below(&tree, t, &mut targets);
            let target_panels: Vec<usize> = targets
                .iter()
                .flat_map(|&l| tree.nodes[l].panels().to_vec())
                .collect();

            for &s in &node.m2l {
                assert!(tree.well_separated(t, s));
                let mut sources = Vec::new();
                leaves_below(&tree, s, &mut sources);
                for &sl in &sources {
                    for &j in tree.nodes[sl].panels() {
                        for &i in &target_panels {
                            count[i * n + j] += 1;
                        }
                    }
                }
            }
            for &s in &node.direct {
                for &j in tree.nodes[s].panels() {
                    for &i in node.panels() {
                        count[i * n + j] += 1;
                    }
                }
            }
        }

        assert!(count.iter().all(|&c| c == 1));
        // a leaf always interacts directly with itself
        for &leaf in &tree.leaves {
            assert!(tree.nodes[leaf].direct.contains(&leaf));
        }
    }

    #[test]
    fn test_m2l_sources_are_not_ancestors() {
        let pts = grid(24, 24);
        let tree = build(&pts, &TreeOptions::default());
        for (t, node) in tree.nodes.iter().enumerate() {
            let anc = ancestors_and_self(&tree, t);
            for s in &node.m2l {
                assert!(!anc.contains(s));
            }
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = Tree::build(&[], &[], &TreeOptions::default());
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.leaves, vec![0]);
        assert_eq!(tree.depth(), 0);
    }
}
