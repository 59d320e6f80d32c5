//! Multipole acceptance criteria
//!
//! A criterion decides, for one body and one internal node, whether the node
//! may be used as a single source or must be opened. The variant is chosen
//! once from configuration.
//!
//! ## SW93
//!
//! Salmon & Warren's criterion works from the distance `bmax` between the
//! node's centre of mass and its farthest corner, which bounds how far any
//! contained mass can be from the expansion centre:
//!
//! 1. geometric test: accept only if `d >= bmax / theta`
//! 2. error-bound test, when the body has an acceleration estimate from the
//!    previous step: the monopole error of a node is bounded by
//!    `3 G B2 / (d^2 (d - bmax)^2)` with `B2 = sum m |x - com|^2`. Requiring
//!    that bound to stay below `delta` gives the critical radius
//!
//!    `rcrit = bmax/2 + sqrt(bmax^2/4 + sqrt(3 B2 / (delta / G)))`
//!
//!    with `delta = SW93_TOLERANCE * theta^2 * |a_prev|`.
//!
//! With no estimate yet (the first force evaluation) only the geometric test
//! applies.

use crate::simulation::barnes_hut::OctreeNode;

/// Allowed per-node acceleration error at theta = 1, relative to |a_prev|
pub const SW93_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Salmon–Warren bmax criterion with an error bound
    Sw93 { theta: f64 },
    /// Classic Barnes–Hut: cell size / distance < theta
    Bh86 { theta: f64 },
    /// Never accept a node; every interaction is body–body
    Exact,
}

impl Criterion {
    /// Per-body error budget for the SW93 bound, in units of G.
    ///
    /// `None` if the criterion has no error test or there is no estimate.
    pub fn error_budget(&self, prior_accel: f64, g: f64) -> Option<f64> {
        match *self {
            Criterion::Sw93 { theta } if prior_accel > 0.0 && g > 0.0 => {
                Some(SW93_TOLERANCE * theta * theta * prior_accel / g)
            }
            _ => None,
        }
    }

    /// Accept `node` as a single source for a body at squared distance
    /// `dist2` from the node's centre of mass?
    pub fn accepts(&self, node: &OctreeNode, dist2: f64, error_budget: Option<f64>) -> bool {
        match *self {
            Criterion::Exact => false,

            Criterion::Bh86 { theta } => {
                let s = node.size();
                s * s < theta * theta * dist2
            }

            Criterion::Sw93 { theta } => {
                if theta * theta * dist2 < node.bmax * node.bmax {
                    return false;
                }

                match error_budget {
                    Some(delta) if node.b2 > 0.0 => {
                        let b = node.bmax;
                        let rcrit = 0.5 * b + (0.25 * b * b + (3.0 * node.b2 / delta).sqrt()).sqrt();
                        dist2 >= rcrit * rcrit
                    }
                    _ => true,
                }
            }
        }
    }

    pub fn theta(&self) -> f64 {
        match *self {
            Criterion::Sw93 { theta } | Criterion::Bh86 { theta } => theta,
            Criterion::Exact => 0.0,
        }
    }
}
