//! Initial conditions: a Plummer-sphere dwarf satellite
//!
//! Positions come from inverting the Plummer cumulative mass profile;
//! speeds come from rejection sampling of the isotropic distribution
//! function, g(q) = q^2 (1 - q^2)^(7/2). Directions are uniform on the
//! sphere. The generator is passed in by the caller so the same seed always
//! yields the same body set.
//!
//! After sampling the model is shifted so its centre of mass sits exactly on
//! the requested orbital point.

use std::f64::consts::SQRT_2;

use log::info;
use rand::Rng;

use crate::simulation::error::{config_err, Result};
use crate::simulation::states::{Body, NVec3};

/// Largest mass fraction sampled; cuts the infinite tail of the profile
const MAX_MASS_FRACTION: f64 = 0.999;

/// Upper bound of g(q) used by the rejection sampler (max is ~0.092)
const G_MAX: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlummerModel {
    pub mass: f64,
    pub nbody: usize,
    pub scale_radius: f64,
}

impl PlummerModel {
    pub fn validate(&self) -> Result<()> {
        if self.nbody == 0 {
            return config_err("dwarf-model.plummer.nbody must be > 0");
        }
        if !(self.mass > 0.0 && self.mass.is_finite()) {
            return config_err(format!("dwarf-model.plummer.mass must be > 0, got {}", self.mass));
        }
        if !(self.scale_radius > 0.0 && self.scale_radius.is_finite()) {
            return config_err(format!(
                "dwarf-model.plummer.scale-radius must be > 0, got {}",
                self.scale_radius
            ));
        }
        Ok(())
    }

    /// Sample `nbody` equal-mass bodies with centre of mass at `x_com`
    /// moving with `v_com`.
    ///
    /// # Errors
    /// Configuration error for an invalid model, before any sampling.
    #[allow(non_snake_case)]
    pub fn sample<R: Rng>(&self, rng: &mut R, x_com: NVec3, v_com: NVec3, G: f64) -> Result<Vec<Body>> {
        self.validate()?;

        let rsc = self.scale_radius;
        let vsc = (G * self.mass / rsc).sqrt();
        let m = self.mass / self.nbody as f64;

        let mut bodies: Vec<Body> = (0..self.nbody)
            .map(|_| {
                let r = plummer_radius(rng);
                let x = pick_shell(rng, rsc * r);
                let speed = vsc * plummer_speed(rng, r);
                let v = pick_shell(rng, speed);
                Body::dwarf(x, v, m)
            })
            .collect();

        // Re-centre on the requested phase-space point
        let n = bodies.len() as f64;
        let (sx, sv) = bodies
            .iter()
            .fold((NVec3::zeros(), NVec3::zeros()), |(sx, sv), b| (sx + b.x, sv + b.v));
        let (cx, cv) = (sx / n, sv / n);
        for b in bodies.iter_mut() {
            b.x = (b.x - cx) + x_com;
            b.v = (b.v - cv) + v_com;
        }

        info!(
            "sampled Plummer sphere: {} bodies, mass {}, scale radius {}",
            self.nbody, self.mass, self.scale_radius
        );

        Ok(bodies)
    }
}

/// Radius in units of the scale radius
fn plummer_radius<R: Rng>(rng: &mut R) -> f64 {
    let u: f64 = rng.gen_range(0.0..MAX_MASS_FRACTION);
    1.0 / (u.powf(-2.0 / 3.0) - 1.0).sqrt()
}

/// Speed in units of sqrt(G M / a) at radius `r` (in scale radii)
fn plummer_speed<R: Rng>(rng: &mut R, r: f64) -> f64 {
    let q = loop {
        let x: f64 = rng.gen_range(0.0..1.0);
        let y: f64 = rng.gen_range(0.0..G_MAX);
        if y <= x * x * (1.0 - x * x).powf(3.5) {
            break x;
        }
    };
    SQRT_2 * q / (1.0 + r * r).powf(0.25)
}

/// Vector of length `radius` in a uniformly random direction
fn pick_shell<R: Rng>(rng: &mut R, radius: f64) -> NVec3 {
    loop {
        let v = NVec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let rsq = v.norm_squared();
        if rsq > 0.0 && rsq <= 1.0 {
            return v * (radius / rsq.sqrt());
        }
    }
}

/// Heliocentric Galactic (l, b, r) to Galactocentric Cartesian, with the
/// Sun on the -x axis at `sun_gc_distance`
pub fn lbr_to_cartesian(lbr: &NVec3, sun_gc_distance: f64, use_radians: bool) -> NVec3 {
    let (l, b) = if use_radians {
        (lbr.x, lbr.y)
    } else {
        (lbr.x.to_radians(), lbr.y.to_radians())
    };
    let r = lbr.z;

    NVec3::new(
        r * b.cos() * l.cos() - sun_gc_distance,
        r * b.cos() * l.sin(),
        r * b.sin(),
    )
}
