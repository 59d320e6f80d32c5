//! Fixed-step leapfrog (kick-drift-kick) integrator
//!
//! `leapfrog_step` advances the whole body store by one step using the
//! accelerations from an `AccelSet`. `integrate_orbit` runs the same scheme
//! for a single test point in the analytic background, forwards or
//! backwards in time.

use log::warn;

use super::error::{NBodyError, Result};
use super::forces::{AccelSet, ForceStats};
use super::params::Parameters;
use super::potential::{GalacticPotential, PotentialComponent};
use super::states::{BodyStore, NVec3};

/// Non-fatal: a body's acceleration exceeded the sanity threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstabilityWarning {
    pub step: u64,
    pub body: usize,
    pub accel: f64, // |a|
}

/// What happened in one step
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub step: u64,
    pub t: f64,
    pub forces: ForceStats,
    pub warnings: Vec<InstabilityWarning>,
}

/// Compute the accelerations at the current positions into `store.acc`.
///
/// Run once before the first step; afterwards every step leaves the
/// accelerations of its end positions in the store.
///
/// # Errors
/// [`NBodyError::IntegrationFatal`] if the initial state or its
/// accelerations are not finite; `store.acc` is left untouched.
pub fn prime_accelerations(store: &mut BodyStore, forces: &AccelSet) -> Result<ForceStats> {
    let fatal = |body: usize, store: &BodyStore| NBodyError::IntegrationFatal {
        step: store.step,
        body,
        last_valid: Box::new(store.snapshot()),
    };

    // NaN positions would never separate in the tree
    if let Some(body) = store.first_non_finite() {
        return Err(fatal(body, &*store));
    }

    let mut a = vec![NVec3::zeros(); store.len()];
    let stats = forces.accumulate_accels(store, &mut a)?;

    if let Some(body) = a.iter().position(|v| v.iter().any(|c| !c.is_finite())) {
        return Err(fatal(body, &*store));
    }

    store.acc = a;
    Ok(stats)
}

/// Advance the store by one step using kick-drift-kick.
///
/// All updates are made on a copy of the store which replaces it only if the
/// step produced a finite state. On failure `store` still holds the last
/// valid state.
///
/// # Errors
/// - any error from the force terms (tree construction, malformed tree)
/// - [`NBodyError::IntegrationFatal`] on NaN/Inf
pub fn leapfrog_step(store: &mut BodyStore, forces: &AccelSet, params: &Parameters) -> Result<StepReport> {
    let dt = params.dt; // time step dt
    let half_dt = 0.5 * dt; // half step dt/2
    let mut next = store.clone();

    // Kick: v_n+1/2 = v_n + (1/2 * dt) * a_n
    for (b, a) in next.bodies.iter_mut().zip(next.acc.iter()) {
        b.v += half_dt * *a;
    }

    // Drift: full-step position: x_n+1 = x_n + dt v_n+1/2
    for b in next.bodies.iter_mut() {
        b.x += dt * b.v;
    }

    // advance time: t_n+1 = t_n + dt
    next.t += dt;
    next.step += 1;

    // a_n+1 from x_n+1; next.acc still holds a_n as the error estimate
    let mut a_new = vec![NVec3::zeros(); next.len()];
    let stats = forces.accumulate_accels(&next, &mut a_new)?;

    // Second kick: v_{n+1} = v_half + (dt/2) * a_{n+1}
    for (b, a) in next.bodies.iter_mut().zip(a_new.iter()) {
        b.v += half_dt * *a;
    }
    next.acc = a_new;

    if let Some(body) = next.first_non_finite() {
        return Err(NBodyError::IntegrationFatal {
            step: next.step,
            body,
            last_valid: Box::new(store.snapshot()),
        });
    }

    let warnings: Vec<InstabilityWarning> = next
        .acc
        .iter()
        .enumerate()
        .filter(|(_, a)| a.norm() > params.accel_warning)
        .map(|(body, a)| InstabilityWarning { step: next.step, body, accel: a.norm() })
        .collect();

    for w in &warnings {
        warn!("step {}: |a| = {:.3e} for body {} exceeds {:.3e}", w.step, w.accel, w.body, params.accel_warning);
    }

    let report = StepReport {
        step: next.step,
        t: next.t,
        forces: stats,
        warnings,
    };

    *store = next;
    Ok(report)
}

/// Integrate a test point in the background potential for time `t` with
/// fixed step `dt`; a negative `dt` runs the orbit backwards.
///
/// Takes ceil(|t| / |dt|) steps, the same rule as the n-body run.
pub fn integrate_orbit(potential: &GalacticPotential, x0: NVec3, v0: NVec3, t: f64, dt: f64) -> (NVec3, NVec3) {
    let mut x = x0;
    let mut v = v0;
    if t <= 0.0 || dt == 0.0 {
        return (x, v);
    }

    let steps = (t / dt.abs()).ceil() as u64;
    let half_dt = 0.5 * dt;
    let mut a = potential.acceleration(&x);

    for _ in 0..steps {
        v += half_dt * a;
        x += dt * v;
        a = potential.acceleration(&x);
        v += half_dt * a;
    }

    (x, v)
}
