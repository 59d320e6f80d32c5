//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - fixed step size and the two time spans (reverse orbit, forward run)
//! - softening and gravitational constant (`eps2`, `G`)
//! - seed for the initial-condition sampler
//! - the acceleration magnitude above which a step logs a warning

use std::f64::consts::PI;

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Parameters {
    pub dt: f64, // step size
    pub t_orbit: f64, // backwards orbit integration time
    pub t_dwarf: f64, // forward n-body time
    pub eps2: f64, // softening
    pub G: f64, // gravitational constant
    pub seed: u64, // deterministic seed
    pub accel_warning: f64, // |a| sanity threshold
}

impl Parameters {
    /// Number of fixed steps needed to cover `t`: ceil(t / dt)
    pub fn steps_for(&self, t: f64) -> u64 {
        if t <= 0.0 {
            return 0;
        }
        (t / self.dt).ceil() as u64
    }
}

/// Default step: 1/100 of the Plummer sphere's dynamical time scale
pub fn default_timestep(mass: f64, scale_radius: f64) -> f64 {
    let r3 = scale_radius * scale_radius * scale_radius;
    (0.1 * 0.1) * (4.0 / 3.0 * PI * r3 / mass).sqrt()
}

/// Default softening length: r0 / (10 sqrt(N))
pub fn default_softening(nbody: usize, scale_radius: f64) -> f64 {
    scale_radius / (10.0 * (nbody as f64).sqrt())
}
