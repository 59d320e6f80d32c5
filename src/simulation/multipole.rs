//! Multipole moments of the octree, computed bottom-up.
//!
//! For every node this fills in:
//! - total mass and centre of mass
//! - the traceless quadrupole tensor about the node's own centre of mass
//!   (only when quadrupole corrections are enabled, otherwise zero)
//! - `b2`, the second moment sum m |x - com|^2, and `bmax`, both used by the
//!   SW93 acceptance test
//!
//! Leaves take their moments straight from the bodies they hold. Internal
//! nodes combine their children with the parallel-axis shift. Because the
//! arena is in pre-order (children after parents), walking it backwards
//! visits every child before its parent, so no recursion is needed.

use crate::simulation::barnes_hut::{Octree, OctreeNode};
use crate::simulation::states::{BodyStore, NMat3, NVec3};

/// Fill the moments of every node of `tree` from the bodies in `store`.
pub fn accumulate(tree: &mut Octree, store: &BodyStore, use_quadrupole: bool) {
    for idx in (0..tree.nodes.len()).rev() {
        let (mass, com, quad, b2) = if tree.nodes[idx].is_leaf() {
            leaf_moments(tree, &tree.nodes[idx], store)
        } else {
            internal_moments(tree, &tree.nodes[idx], use_quadrupole)
        };

        let node = &mut tree.nodes[idx];
        node.mass = mass;
        node.com = com;
        node.quad = quad;
        node.b2 = b2;
        node.bmax = farthest_corner(node);
    }
}

/// Leaves hold either one body or several coincident ones, so the moments
/// about the centre of mass are all zero.
fn leaf_moments(tree: &Octree, node: &OctreeNode, store: &BodyStore) -> (f64, NVec3, NMat3, f64) {
    let mut mass = 0.0;
    let mut weighted = NVec3::zeros();
    for &i in tree.bodies_of(node) {
        let b = &store.bodies[i];
        mass += b.m;
        weighted += b.m * b.x;
    }

    let com = if mass > 0.0 {
        weighted / mass
    } else {
        store.bodies[tree.bodies_of(node)[0]].x
    };

    (mass, com, NMat3::zeros(), 0.0)
}

fn internal_moments(tree: &Octree, node: &OctreeNode, use_quadrupole: bool) -> (f64, NVec3, NMat3, f64) {
    let mut mass = 0.0;
    let mut weighted = NVec3::zeros();
    for c in node.child_ids().map(|id| tree.node(id)) {
        mass += c.mass;
        weighted += c.mass * c.com;
    }

    if mass <= 0.0 {
        // Only massless sources below: no moments, keep the geometric centre
        return (0.0, node.center, NMat3::zeros(), 0.0);
    }
    let com = weighted / mass;

    let mut quad = NMat3::zeros();
    let mut b2 = 0.0;
    for c in node.child_ids().map(|id| tree.node(id)) {
        let d = c.com - com;
        let d2 = d.norm_squared();
        b2 += c.b2 + c.mass * d2;

        if use_quadrupole {
            // Parallel-axis shift of the child's tensor onto the parent's com
            quad += c.quad + c.mass * (3.0 * d * d.transpose() - d2 * NMat3::identity());
        }
    }

    (mass, com, quad, b2)
}

/// Distance from the centre of mass to the farthest corner of the cube
fn farthest_corner(node: &OctreeNode) -> f64 {
    let lo = node.center - NVec3::repeat(node.half_width);
    let size = node.size();

    let mut bmax2 = 0.0;
    for k in 0..3 {
        let d = node.com[k] - lo[k];
        let far = d.max(size - d);
        bmax2 += far * far;
    }
    bmax2.sqrt()
}
