//! Force-engine settings
//!
//! Selects the acceptance criterion, quadrupole corrections and the tree
//! depth cap used when building the self-gravity term of a `Simulation`

use crate::simulation::criterion::Criterion;

#[derive(Debug, Clone)]
pub struct Engine {
    pub criterion: Criterion, // sw93, bh86 or exact
    pub use_quadrupole: bool, // add the quadrupole term for accepted nodes
    pub depth_cap: usize, // maximum octree subdivision depth
}
