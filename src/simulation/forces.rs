//! Force / acceleration contributors for the n-body engine
//!
//! Defines the acceleration trait and its terms:
//! - the analytic Galactic background ([`GalacticPotential`])
//! - direct Newtonian self-gravity, the O(N^2) reference
//! - tree self-gravity: octree + multipoles + criterion-driven walk

use std::ops::{Add, AddAssign};

use rayon::prelude::*;

use crate::simulation::barnes_hut::{NodeId, Octree, OctreeNode};
use crate::simulation::criterion::Criterion;
use crate::simulation::error::{NBodyError, Result};
use crate::simulation::multipole;
use crate::simulation::potential::{GalacticPotential, PotentialComponent};
use crate::simulation::states::{Body, BodyStore, NVec3};

/// Interaction counts gathered during one force evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceStats {
    pub nodes: usize, // tree nodes built
    pub body_body: u64, // exact pairwise terms
    pub body_cell: u64, // accepted multipole terms
}

impl Add for ForceStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            nodes: self.nodes + rhs.nodes,
            body_body: self.body_body + rhs.body_body,
            body_cell: self.body_cell + rhs.body_cell,
        }
    }
}

impl AddAssign for ForceStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Collection of acceleration terms (background, self-gravity, ...)
/// Each term implements [`Acceleration`] and their contributions are summed
/// into a single acceleration vector per body
#[derive(Default)]
pub struct AccelSet {
    terms: Vec<Box<dyn Acceleration + Send + Sync>>,
}

impl AccelSet {
    /// Constructor
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
        }
    }

    /// Add an acceleration term
    pub fn with(mut self, term: impl Acceleration + Send + Sync + 'static) -> Self {
        self.terms.push(Box::new(term));
        self
    }

    /// Compute total accelerations for all bodies in `store`
    /// - `out[i]` will be set to the sum of contributions from all terms
    /// - `store.acc` is read as the previous estimate, never written here
    pub fn accumulate_accels(&self, store: &BodyStore, out: &mut [NVec3]) -> Result<ForceStats> {
        // Zero buffer
        for a in out.iter_mut() {
            *a = NVec3::zeros();
        }
        // Iterate over all acceleration contributors in registration order
        let mut stats = ForceStats::default();
        for term in &self.terms {
            stats += term.acceleration(store, out)?;
        }
        Ok(stats)
    }

    /// Potential energy summed over all terms
    pub fn potential_energy(&self, store: &BodyStore) -> f64 {
        self.terms.iter().map(|t| t.potential_energy(store)).sum()
    }
}

/// Trait for acceleration sources operating on a [`BodyStore`]
/// Implementations add their contribution into `out[i]` for each body
pub trait Acceleration {
    fn acceleration(&self, store: &BodyStore, out: &mut [NVec3]) -> Result<ForceStats>;

    fn potential_energy(&self, store: &BodyStore) -> f64;
}

// =========================================================================================
// Analytic background
// =========================================================================================

impl Acceleration for GalacticPotential {
    fn acceleration(&self, store: &BodyStore, out: &mut [NVec3]) -> Result<ForceStats> {
        out.par_iter_mut()
            .zip(store.bodies.par_iter())
            .for_each(|(a, b)| *a += PotentialComponent::acceleration(self, &b.x));
        Ok(ForceStats::default())
    }

    fn potential_energy(&self, store: &BodyStore) -> f64 {
        store.bodies.iter().map(|b| b.m * self.potential(&b.x)).sum()
    }
}

// =========================================================================================
// Direct summation
// =========================================================================================

/// Newtonian self-gravity with Plummer softening (direct n^2 sum)
#[allow(non_snake_case)]
pub struct DirectGravity {
    pub G: f64,
    pub eps2: f64,
}

impl Acceleration for DirectGravity {
    fn acceleration(&self, store: &BodyStore, out: &mut [NVec3]) -> Result<ForceStats> {
        let n = store.len();
        let mut stats = ForceStats::default();

        // Loop over each unordered pair (i, j) with i < j
        for i in 0..n {
            let bi = &store.bodies[i];
            // tracers feel gravity but have no mass to give
            let mi = source_mass(bi);

            for j in (i + 1)..n {
                let bj = &store.bodies[j];
                let mj = source_mass(bj);

                // r points from i to j: i is pulled along +r, j along -r
                let r = bj.x - bi.x;
                if r.norm_squared() == 0.0 {
                    continue; // coincident bodies exert no mutual force
                }

                // softened |r|^2 + eps^2
                let d2 = r.dot(&r) + self.eps2;
                let inv_r = d2.sqrt().recip();
                let coef = self.G * inv_r * inv_r * inv_r;

                // a_i +=  G m_j r / |r_soft|^3
                // a_j += -G m_i r / |r_soft|^3
                out[i] += coef * mj * r;
                out[j] -= coef * mi * r;
                stats.body_body += 2;
            }
        }
        Ok(stats)
    }

    fn potential_energy(&self, store: &BodyStore) -> f64 {
        let n = store.len();
        let mut u = 0.0;
        for i in 0..n {
            let bi = &store.bodies[i];
            for j in (i + 1)..n {
                let bj = &store.bodies[j];
                let r2 = (bj.x - bi.x).norm_squared();
                if r2 == 0.0 {
                    continue;
                }
                let d = (r2 + self.eps2).sqrt();
                u -= self.G * source_mass(bi) * source_mass(bj) / d;
            }
        }
        u
    }
}

fn source_mass(b: &Body) -> f64 {
    if b.is_source() { b.m } else { 0.0 }
}

// =========================================================================================
// Tree walk
// =========================================================================================

/// Newtonian self-gravity evaluated through an octree.
///
/// Every evaluation builds a fresh tree from the store, fills its moments and
/// then walks it once per body in parallel. The tree is read-only during the
/// walk and each body's sum is taken in a fixed child order, so the result
/// does not depend on the thread count.
#[allow(non_snake_case)]
pub struct TreeGravity {
    pub G: f64,
    pub eps2: f64,
    pub criterion: Criterion,
    pub use_quadrupole: bool,
    pub depth_cap: usize,
}

impl Acceleration for TreeGravity {
    fn acceleration(&self, store: &BodyStore, out: &mut [NVec3]) -> Result<ForceStats> {
        let tree = self.build_tree(store)?;

        let walk_stats = out
            .par_iter_mut()
            .enumerate()
            .map(|(i, a)| -> Result<ForceStats> {
                let (acc, stats) = self.force_on_body(&tree, i, store)?;
                *a += acc;
                Ok(stats)
            })
            .try_reduce(ForceStats::default, |x, y| Ok(x + y))?;

        Ok(walk_stats + ForceStats { nodes: tree.node_count(), ..Default::default() })
    }

    fn potential_energy(&self, store: &BodyStore) -> f64 {
        DirectGravity { G: self.G, eps2: self.eps2 }.potential_energy(store)
    }
}

impl TreeGravity {
    /// Build the octree for `store` and fill its multipole moments
    pub fn build_tree(&self, store: &BodyStore) -> Result<Octree> {
        let mut tree = Octree::build(store, self.depth_cap)?;
        multipole::accumulate(&mut tree, store, self.use_quadrupole);
        Ok(tree)
    }

    /// Self-gravity acceleration on body `i` from the tree.
    ///
    /// The prior acceleration estimate in `store.acc[i]` sets the SW93 error
    /// budget for this body.
    ///
    /// # Errors
    /// [`NBodyError::MalformedTree`] if body `i` is a source but its leaf is
    /// not reached from the root.
    pub fn force_on_body(&self, tree: &Octree, i: usize, store: &BodyStore) -> Result<(NVec3, ForceStats)> {
        let mut walk = Walk {
            body_idx: i,
            pos: store.bodies[i].x,
            own_leaf: tree.leaf_of.get(i).copied().flatten(),
            error_budget: self.criterion.error_budget(store.acc[i].norm(), self.G),
            acc: NVec3::zeros(),
            stats: ForceStats::default(),
            reached_self: false,
        };

        if store.bodies[i].is_source() && walk.own_leaf.is_none() {
            return Err(NBodyError::MalformedTree { body: i });
        }

        if let Some(root) = tree.root {
            self.traverse_node(tree, root, store, &mut walk);
        }

        if walk.own_leaf.is_some() && !walk.reached_self {
            return Err(NBodyError::MalformedTree { body: i });
        }

        Ok((self.G * walk.acc, walk.stats))
    }

    /// Recursively traverse a subtree to accumulate acceleration.
    ///
    /// For each node:
    ///
    /// - **Leaf**: exact softened pairwise terms with every body it holds,
    ///   skipping the target body itself.
    /// - **Internal node not containing the target**: empty nodes are
    ///   skipped; otherwise the criterion decides between one multipole term
    ///   at the centre of mass and descending.
    /// - **Internal node containing the target**: always descended, so a
    ///   body never takes part in an aggregate term that includes itself.
    ///
    /// Children are visited in octant order 0..8.
    fn traverse_node(&self, tree: &Octree, node_idx: NodeId, store: &BodyStore, walk: &mut Walk) {
        let node = tree.node(node_idx);

        if node.is_leaf() {
            for &j in tree.bodies_of(node) {
                if j == walk.body_idx {
                    walk.reached_self = true; // don't self-interact
                    continue;
                }

                let bj = &store.bodies[j];
                let r = bj.x - walk.pos;
                if r.norm_squared() == 0.0 {
                    continue; // merged onto the same point
                }
                let dist2 = r.dot(&r) + self.eps2;
                let inv_r = dist2.sqrt().recip();
                let inv_r3 = inv_r * inv_r * inv_r;

                walk.acc += bj.m * inv_r3 * r;
                walk.stats.body_body += 1;
            }
            return;
        }

        let holds_self = walk.own_leaf.is_some_and(|leaf| tree.is_ancestor(node_idx, leaf));

        if !holds_self {
            if node.mass == 0.0 {
                return;
            }

            let dr = node.com - walk.pos;
            let dist2 = dr.dot(&dr);
            if self.criterion.accepts(node, dist2, walk.error_budget) {
                walk.acc += self.cell_term(node, dr);
                walk.stats.body_cell += 1;
                return;
            }
        }

        // Too close (or holds the target): recurse into children
        for child in node.child_ids() {
            self.traverse_node(tree, child, store, walk);
        }
    }

    /// Monopole (+ quadrupole) acceleration of an accepted node, without G.
    /// `dr` points from the body to the node's centre of mass.
    fn cell_term(&self, node: &OctreeNode, dr: NVec3) -> NVec3 {
        let drsq = dr.dot(&dr) + self.eps2;
        let drab = drsq.sqrt();
        let mor3 = node.mass / (drsq * drab);
        let mut acc = dr * mor3;

        if self.use_quadrupole {
            let dr5inv = 1.0 / (drsq * drsq * drab);
            let quaddr = node.quad * dr;
            let drquaddr = dr.dot(&quaddr);
            let phiquad = -0.5 * dr5inv * drquaddr;

            acc -= dr * (5.0 * phiquad / drsq);
            acc -= quaddr * dr5inv;
        }
        acc
    }
}

/// Per-body state of one tree walk
struct Walk {
    body_idx: usize,
    pos: NVec3,
    own_leaf: Option<NodeId>,
    error_budget: Option<f64>,
    acc: NVec3,
    stats: ForceStats,
    reached_self: bool,
}
