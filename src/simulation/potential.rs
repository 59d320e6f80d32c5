//! Analytic Galactic background potential
//!
//! Three closed-form components, each giving acceleration and potential at a
//! point (G = 1 in the component masses, as in the source configuration):
//! - Miyamoto–Nagai disk
//! - Hernquist spherical bulge
//! - logarithmic halo with optional z-flattening
//!
//! `GalacticPotential` sums them and is registered as an acceleration term
//! alongside the tree gravity.

use crate::simulation::states::{NMat3, NVec3};

/// A single analytic component of the background
pub trait PotentialComponent {
    fn acceleration(&self, x: &NVec3) -> NVec3;
    fn potential(&self, x: &NVec3) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiyamotoNagaiDisk {
    pub mass: f64,
    pub scale_length: f64, // a
    pub scale_height: f64, // b
}

impl PotentialComponent for MiyamotoNagaiDisk {
    fn acceleration(&self, x: &NVec3) -> NVec3 {
        let a = self.scale_length;
        let b = self.scale_height;

        let zp = (x.z * x.z + b * b).sqrt();
        let azp = a + zp;
        let rp = x.x * x.x + x.y * x.y + azp * azp;
        let rth = rp * rp.sqrt(); // rp^3/2

        NVec3::new(
            -self.mass * x.x / rth,
            -self.mass * x.y / rth,
            -self.mass * x.z * azp / (zp * rth),
        )
    }

    fn potential(&self, x: &NVec3) -> f64 {
        let zp = (x.z * x.z + self.scale_height * self.scale_height).sqrt();
        let azp = self.scale_length + zp;
        -self.mass / (x.x * x.x + x.y * x.y + azp * azp).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HernquistSphere {
    pub mass: f64,
    pub r0: f64, // scale radius
}

impl PotentialComponent for HernquistSphere {
    fn acceleration(&self, x: &NVec3) -> NVec3 {
        let r = x.norm();
        if r == 0.0 {
            return NVec3::zeros();
        }
        let tmp = self.r0 + r;
        x * (-self.mass / (r * tmp * tmp))
    }

    fn potential(&self, x: &NVec3) -> f64 {
        -self.mass / (x.norm() + self.r0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogarithmicHalo {
    pub vhalo: f64,
    pub scale_length: f64, // d
    pub z_flattening: f64, // q
}

impl PotentialComponent for LogarithmicHalo {
    fn acceleration(&self, x: &NVec3) -> NVec3 {
        let q2 = self.z_flattening * self.z_flattening;
        let d2 = self.scale_length * self.scale_length;
        let denom = x.x * x.x + x.y * x.y + x.z * x.z / q2 + d2;
        let tvsqr = -2.0 * self.vhalo * self.vhalo / denom;

        NVec3::new(tvsqr * x.x, tvsqr * x.y, tvsqr * x.z / q2)
    }

    fn potential(&self, x: &NVec3) -> f64 {
        let q2 = self.z_flattening * self.z_flattening;
        let d2 = self.scale_length * self.scale_length;
        let arg = x.x * x.x + x.y * x.y + x.z * x.z / q2 + d2;
        self.vhalo * self.vhalo * arg.ln()
    }
}

/// Disk + bulge + halo, immutable once built from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalacticPotential {
    pub disk: MiyamotoNagaiDisk,
    pub sphere: HernquistSphere,
    pub halo: LogarithmicHalo,
}

impl GalacticPotential {
    /// Negative Hessian of the potential, i.e. the Jacobian of the
    /// acceleration, from central differences with step `h`
    pub fn tidal_tensor(&self, x: &NVec3, h: f64) -> NMat3 {
        let mut t = NMat3::zeros();
        for j in 0..3 {
            let mut dx = NVec3::zeros();
            dx[j] = h;
            let col = (self.acceleration(&(x + dx)) - self.acceleration(&(x - dx))) / (2.0 * h);
            t.set_column(j, &col);
        }
        t
    }
}

impl PotentialComponent for GalacticPotential {
    fn acceleration(&self, x: &NVec3) -> NVec3 {
        self.disk.acceleration(x) + self.sphere.acceleration(x) + self.halo.acceleration(x)
    }

    fn potential(&self, x: &NVec3) -> f64 {
        self.disk.potential(x) + self.sphere.potential(x) + self.halo.potential(x)
    }
}
