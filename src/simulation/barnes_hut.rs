//! # Barnes–Hut Octree (3D)
//!
//! This module builds the **spatial hierarchy** used by the tree walk in
//! [`crate::simulation::forces`]. It only deals with geometry: which body
//! lives in which cube. The per-node moments (mass, centre of mass,
//! quadrupole, SW93 radii) are filled in afterwards by
//! [`crate::simulation::multipole::accumulate`].
//!
//! ## Core Concepts
//!
//! - The simulation space is recursively subdivided into 8 regions (octants).
//! - Each region becomes a node of the octree.
//! - A leaf holds one body, or several bodies sitting at exactly the same
//!   position (these are merged rather than subdivided forever).
//! - Nodes live in a flat arena (`Vec<OctreeNode>`) and refer to their
//!   children by [`NodeId`], so there is no pointer graph to own.
//!
//! ## Construction
//!
//! Construction runs in two passes:
//!
//! 1. **Insertion** into a scratch arena. Children are created lazily, only
//!    for octants that actually receive a body. When a leaf that already
//!    holds a body receives a second one, the old body is pushed one level
//!    down and the insertion continues.
//! 2. **Compaction** into the final arena in depth-first pre-order. Chains of
//!    internal nodes with a single child are collapsed onto that child, so
//!    every internal node of the final tree has at least two children and the
//!    node count is bounded by `2N - 1`.
//!
//! Pre-order numbering means every child has a larger index than its parent,
//! which lets the moment pass run bottom-up by walking the arena backwards.
//!
//! A fresh tree is built every step; nothing is shared with the previous one.

use log::debug;

use crate::simulation::error::{NBodyError, Result};
use crate::simulation::states::{BodyStore, NMat3, NVec3};

/// Default maximum subdivision depth
pub const DEFAULT_DEPTH_CAP: usize = 48;

/// Relative padding applied to the root cube so no body sits on its faces
const ROOT_PADDING: f64 = 1.0e-6;

/// Handle of a node inside [`Octree::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// A single node of the octree.
///
/// Geometry (`center`, `half_width`, `children`, the body range) is set by the
/// builder; the remaining fields are moments written by the multipole pass.
#[derive(Debug, Clone)]
pub struct OctreeNode {
    pub center: NVec3,
    pub half_width: f64,
    pub children: [Option<NodeId>; 8],
    /// Range into [`Octree::leaf_bodies`]; empty for internal nodes
    pub first_body: usize,
    pub body_count: usize,
    /// One past the last arena index of this node's subtree
    pub subtree_end: usize,

    pub mass: f64,
    pub com: NVec3,
    /// Traceless quadrupole about `com`: sum m (3 x x^T - |x|^2 I)
    pub quad: NMat3,
    /// Distance from `com` to the farthest corner of the cube
    pub bmax: f64,
    /// Second moment sum m |x - com|^2
    pub b2: f64,
}

impl OctreeNode {
    fn new(center: NVec3, half_width: f64) -> Self {
        Self {
            center,
            half_width,
            children: [None; 8],
            first_body: 0,
            body_count: 0,
            subtree_end: 0,
            mass: 0.0,
            com: center,
            quad: NMat3::zeros(),
            bmax: 0.0,
            b2: 0.0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.body_count > 0
    }

    /// Edge length of the cube
    pub fn size(&self) -> f64 {
        2.0 * self.half_width
    }

    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flatten().copied()
    }
}

/// A complete octree built over the self-gravity sources of a [`BodyStore`].
pub struct Octree {
    pub nodes: Vec<OctreeNode>,
    /// Body indices of all leaves, leaf by leaf
    pub leaf_bodies: Vec<usize>,
    /// Leaf holding each body of the store (`None` for tracers)
    pub leaf_of: Vec<Option<NodeId>>,
    /// `None` when the store holds no sources
    pub root: Option<NodeId>,
}

impl Octree {
    /// Build the octree over every source body (tracers are skipped).
    ///
    /// This:
    /// 1. Computes a padded cubic bounding box that encloses all sources.
    /// 2. Inserts each source, subdividing leaves as needed.
    /// 3. Compacts the scratch tree, collapsing single-child chains.
    ///
    /// Moments are left zeroed; run the multipole pass before walking.
    ///
    /// # Errors
    /// [`NBodyError::TreeConstruction`] if two bodies at distinct positions
    /// still share a leaf at `depth_cap`.
    pub fn build(store: &BodyStore, depth_cap: usize) -> Result<Self> {
        let sources: Vec<usize> = store
            .bodies
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_source())
            .map(|(i, _)| i)
            .collect();

        if sources.is_empty() {
            return Ok(Self {
                nodes: Vec::new(),
                leaf_bodies: Vec::new(),
                leaf_of: vec![None; store.len()],
                root: None,
            });
        }

        let (center, half_width) = compute_root_cube(store, &sources);

        let mut scratch = ScratchTree {
            nodes: vec![ScratchNode::new(center, half_width, 0)],
            next_coincident: vec![None; store.len()],
            depth_cap,
        };

        for &i in &sources {
            scratch.insert(i, store)?;
        }

        let mut tree = Self {
            nodes: Vec::with_capacity(2 * sources.len()),
            leaf_bodies: Vec::with_capacity(sources.len()),
            leaf_of: vec![None; store.len()],
            root: None,
        };
        let root = tree.compact(&scratch, 0);
        tree.root = Some(root);

        debug!(
            "octree: {} sources, {} scratch nodes, {} nodes after compaction",
            sources.len(),
            scratch.nodes.len(),
            tree.nodes.len()
        );

        Ok(tree)
    }

    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bodies stored directly in the given leaf
    pub fn bodies_of(&self, node: &OctreeNode) -> &[usize] {
        &self.leaf_bodies[node.first_body..node.first_body + node.body_count]
    }

    /// True if `leaf` lies in the subtree rooted at `node`.
    ///
    /// Subtrees occupy contiguous index ranges of the pre-order arena.
    pub fn is_ancestor(&self, node: NodeId, leaf: NodeId) -> bool {
        node.0 <= leaf.0 && leaf.0 < self.nodes[node.0].subtree_end
    }

    /// Total mass held by the root (zero for an empty tree)
    pub fn total_mass(&self) -> f64 {
        self.root.map_or(0.0, |r| self.node(r).mass)
    }

    // helpers ==============================================================================

    /// Copy the scratch subtree rooted at `idx` into the final arena in
    /// pre-order, skipping internal nodes that have exactly one child.
    fn compact(&mut self, scratch: &ScratchTree, mut idx: usize) -> NodeId {
        // Collapse chains: a lone child carries the same bodies as its parent
        loop {
            let sn = &scratch.nodes[idx];
            let mut kids = sn.children.iter().flatten();
            match (kids.next(), kids.next()) {
                (Some(&only), None) if sn.body.is_none() => idx = only,
                _ => break,
            }
        }

        let sn = &scratch.nodes[idx];
        let id = NodeId(self.nodes.len());
        self.nodes.push(OctreeNode::new(sn.center, sn.half_width));

        if let Some(head) = sn.body {
            // Leaf: the head body plus anything merged onto it
            let first = self.leaf_bodies.len();
            let mut cur = Some(head);
            while let Some(b) = cur {
                self.leaf_bodies.push(b);
                self.leaf_of[b] = Some(id);
                cur = scratch.next_coincident[b];
            }
            let node = &mut self.nodes[id.0];
            node.first_body = first;
            node.body_count = self.leaf_bodies.len() - first;
            node.subtree_end = id.0 + 1;
            return id;
        }

        let children = sn.children;
        for (octant, child) in children.iter().enumerate() {
            if let Some(c) = *child {
                let cid = self.compact(scratch, c);
                self.nodes[id.0].children[octant] = Some(cid);
            }
        }
        self.nodes[id.0].subtree_end = self.nodes.len();
        id
    }
}

// scratch tree ======================================================================

struct ScratchNode {
    center: NVec3,
    half_width: f64,
    depth: usize,
    children: [Option<usize>; 8],
    body: Option<usize>, // head of a coincident chain
}

impl ScratchNode {
    fn new(center: NVec3, half_width: f64, depth: usize) -> Self {
        Self { center, half_width, depth, children: [None; 8], body: None }
    }

    fn has_children(&self) -> bool {
        self.children.iter().any(|c| c.is_some())
    }
}

struct ScratchTree {
    nodes: Vec<ScratchNode>,
    /// Singly linked list of bodies merged into the same leaf
    next_coincident: Vec<Option<usize>>,
    depth_cap: usize,
}

impl ScratchTree {
    /// Insert body `body_idx`, starting at the root.
    ///
    /// - Node with children: descend into the octant containing the body,
    ///   creating that child if needed.
    /// - Empty leaf: store the body here.
    /// - Leaf holding a body at the identical position: merge onto it.
    /// - Leaf holding a different body: push the resident one level down,
    ///   then keep descending with the new body.
    fn insert(&mut self, body_idx: usize, store: &BodyStore) -> Result<()> {
        let pos = store.bodies[body_idx].x;
        let mut node_idx = 0;

        loop {
            if self.nodes[node_idx].has_children() {
                node_idx = self.child_for(node_idx, &pos);
                continue;
            }

            let resident = match self.nodes[node_idx].body {
                None => {
                    self.nodes[node_idx].body = Some(body_idx);
                    return Ok(());
                }
                Some(r) => r,
            };

            if store.bodies[resident].x == pos {
                self.next_coincident[body_idx] = self.next_coincident[resident];
                self.next_coincident[resident] = Some(body_idx);
                return Ok(());
            }

            let depth = self.nodes[node_idx].depth;
            if depth >= self.depth_cap {
                return Err(NBodyError::TreeConstruction {
                    bodies: vec![resident, body_idx],
                    depth,
                });
            }

            // Split: the resident (with its chain) moves into its octant
            self.nodes[node_idx].body = None;
            let resident_pos = store.bodies[resident].x;
            let child = self.child_for(node_idx, &resident_pos);
            self.nodes[child].body = Some(resident);
        }
    }

    /// Index of the child of `node_idx` whose octant contains `p`, created on demand
    fn child_for(&mut self, node_idx: usize, p: &NVec3) -> usize {
        let node = &self.nodes[node_idx];
        let octant = octant_for_point(p, &node.center);
        if let Some(c) = node.children[octant] {
            return c;
        }

        let half = 0.5 * node.half_width;
        let center = child_center(&node.center, half, octant);
        let depth = node.depth + 1;

        let new_idx = self.nodes.len();
        self.nodes.push(ScratchNode::new(center, half, depth));
        self.nodes[node_idx].children[octant] = Some(new_idx);
        new_idx
    }
}

// helpers ===========================================================================

/// Compute a padded cube (centre, half-width) enclosing the given bodies.
///
/// The axis-aligned min/max box is expanded into a cube around its centre
/// using the largest half-extent, then padded slightly. A degenerate extent
/// (a single body, or all bodies coincident) gets a unit half-width.
fn compute_root_cube(store: &BodyStore, sources: &[usize]) -> (NVec3, f64) {
    let mut min = NVec3::repeat(f64::INFINITY);
    let mut max = NVec3::repeat(f64::NEG_INFINITY);

    for &i in sources {
        let x = &store.bodies[i].x;
        min = min.inf(x);
        max = max.sup(x);
    }

    let center = (min + max) * 0.5;
    let half = (max - min) * 0.5;
    let max_half = half.x.max(half.y).max(half.z);

    let half_width = if max_half > 0.0 {
        max_half * (1.0 + ROOT_PADDING) + f64::EPSILON * center.amax()
    } else {
        1.0
    };

    (center, half_width)
}

/// Octant index of `p` relative to a cube centre.
///
/// - Bit 0 (value 1): X axis, set when p.x >= center.x
/// - Bit 1 (value 2): Y axis, set when p.y >= center.y
/// - Bit 2 (value 4): Z axis, set when p.z >= center.z
///
/// This encoding matches the layout of `children[0..8]` and fixes the walk
/// order of the force evaluation.
pub fn octant_for_point(p: &NVec3, center: &NVec3) -> usize {
    let mut idx = 0;

    if p.x >= center.x { idx |= 1; } // bit 0
    if p.y >= center.y { idx |= 2; } // bit 1
    if p.z >= center.z { idx |= 4; } // bit 2

    idx
}

/// Centre of child octant `octant` of a cube, given the child half-width
fn child_center(parent_center: &NVec3, child_half: f64, octant: usize) -> NVec3 {
    let sign = |bit: usize| if octant & bit == 0 { -child_half } else { child_half };
    parent_center + NVec3::new(sign(1), sign(2), sign(4))
}
