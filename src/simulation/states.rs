//! Core state types for the N-body simulation.
//!
//! - `Body` / `BodyStore` hold the mutable simulation state (3d, `NVec3`)
//! - `Snapshot` is the read-only copy handed to output / comparison code
//!
//! The store keeps bodies in a stable-index array for the whole run, along
//! with the acceleration computed at the end of the previous step.

use std::io::{self, Write};

use nalgebra::{Matrix3, Vector3};
pub type NVec3 = Vector3<f64>;
pub type NMat3 = Matrix3<f64>;

/// Whether a body sources self-gravity or only feels it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    #[default]
    Dwarf, // part of the satellite model, inserted into the tree
    Tracer, // massless test particle, integrated but never a source
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub x: NVec3, // position
    pub v: NVec3, // velocity
    pub m: f64, // mass
    pub kind: BodyKind,
}

impl Body {
    pub fn dwarf(x: NVec3, v: NVec3, m: f64) -> Self {
        Self { x, v, m, kind: BodyKind::Dwarf }
    }

    pub fn tracer(x: NVec3, v: NVec3) -> Self {
        Self { x, v, m: 0.0, kind: BodyKind::Tracer }
    }

    pub fn is_source(&self) -> bool {
        self.kind == BodyKind::Dwarf
    }
}

#[derive(Debug, Clone, Default)]
pub struct BodyStore {
    pub bodies: Vec<Body>, // stable-index body array
    pub acc: Vec<NVec3>, // acceleration at the current positions (a_n)
    pub t: f64, // time
    pub step: u64, // completed steps
}

impl BodyStore {
    pub fn new(bodies: Vec<Body>) -> Self {
        let n = bodies.len();
        Self {
            bodies,
            acc: vec![NVec3::zeros(); n],
            t: 0.0,
            step: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Sum of the masses of all self-gravity sources
    pub fn source_mass(&self) -> f64 {
        self.bodies.iter().filter(|b| b.is_source()).map(|b| b.m).sum()
    }

    /// Mass-weighted centre of mass and velocity of the sources
    pub fn center_of_mass(&self) -> (NVec3, NVec3) {
        let mut m = 0.0;
        let mut x = NVec3::zeros();
        let mut v = NVec3::zeros();
        for b in self.bodies.iter().filter(|b| b.is_source()) {
            m += b.m;
            x += b.m * b.x;
            v += b.m * b.v;
        }
        if m > 0.0 {
            x /= m;
            v /= m;
        }
        (x, v)
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(|b| 0.5 * b.m * b.v.norm_squared()).sum()
    }

    /// Index of the first body with a non-finite position, velocity or acceleration
    pub fn first_non_finite(&self) -> Option<usize> {
        let finite = |v: &NVec3| v.iter().all(|c| c.is_finite());
        self.bodies
            .iter()
            .zip(self.acc.iter())
            .position(|(b, a)| !(finite(&b.x) && finite(&b.v) && finite(a)))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step,
            time: self.t,
            bodies: self
                .bodies
                .iter()
                .map(|b| BodySnapshot { x: b.x, v: b.v, m: b.m })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    pub x: NVec3,
    pub v: NVec3,
    pub m: f64,
}

/// Copy of the body table at one instant, consumed by output/comparison code
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub step: u64,
    pub time: f64,
    pub bodies: Vec<BodySnapshot>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// True if every position, velocity and mass has the same bit pattern
    pub fn bitwise_eq(&self, other: &Snapshot) -> bool {
        self.bodies.len() == other.bodies.len()
            && self.bits().eq(other.bits())
    }

    /// FNV-1a over the IEEE-754 bit patterns of the body table
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        self.bits().fold(OFFSET, |hash, word| {
            word.to_le_bytes()
                .iter()
                .fold(hash, |h, &byte| (h ^ byte as u64).wrapping_mul(PRIME))
        })
    }

    /// Minimal text format: a header line, then `x y z vx vy vz m` per body
    pub fn write_text<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "# nbody {} step {} time {:.17e}", self.bodies.len(), self.step, self.time)?;
        for b in &self.bodies {
            writeln!(
                w,
                "{:.17e} {:.17e} {:.17e} {:.17e} {:.17e} {:.17e} {:.17e}",
                b.x.x, b.x.y, b.x.z, b.v.x, b.v.y, b.v.z, b.m
            )?;
        }
        Ok(())
    }

    fn bits(&self) -> impl Iterator<Item = u64> + '_ {
        self.bodies.iter().flat_map(|b| {
            b.x.iter()
                .chain(b.v.iter())
                .chain(std::iter::once(&b.m))
                .map(|c| c.to_bits())
        })
    }
}
