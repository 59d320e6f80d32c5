//! Build and run a fully-initialized simulation from configuration
//!
//! Takes a `ParametersFile` (YAML-facing) and produces the runtime bundle
//! (`Simulation`) containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the analytic background (`GalacticPotential`)
//! - the body store, sampled and placed on its orbit, accelerations primed
//! - the active force set (`AccelSet`: background + tree self-gravity)
//!
//! Per step: tree build -> moments -> walk (inside the force set) ->
//! leapfrog update of the store.

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::configuration::config::{CriterionConfig, ParametersFile};
use crate::simulation::barnes_hut::DEFAULT_DEPTH_CAP;
use crate::simulation::criterion::Criterion;
use crate::simulation::engine::Engine;
use crate::simulation::error::Result;
use crate::simulation::forces::{AccelSet, Acceleration, DirectGravity, TreeGravity};
use crate::simulation::integrator::{integrate_orbit, leapfrog_step, prime_accelerations, StepReport};
use crate::simulation::params::{default_softening, default_timestep, Parameters};
use crate::simulation::plummer::{lbr_to_cartesian, PlummerModel};
use crate::simulation::potential::{GalacticPotential, HernquistSphere, LogarithmicHalo, MiyamotoNagaiDisk};
use crate::simulation::states::{Body, BodyStore, NVec3, Snapshot};

/// Sun–Galactic-centre distance (kpc) when the configuration gives none
pub const DEFAULT_SUN_GC_DISTANCE: f64 = 8.0;

/// Acceleration magnitude above which a step logs a warning
pub const DEFAULT_ACCEL_WARNING: f64 = 1.0e5;

/// Energy split into its parts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Energy {
    pub kinetic: f64,
    pub self_potential: f64, // softened pairwise sum
    pub external: f64, // sum m Phi_background
}

impl Energy {
    pub fn total(&self) -> f64 {
        self.kinetic + self.self_potential + self.external
    }
}

/// A fully-initialized simulation: settings, state and force terms
pub struct Simulation {
    pub engine: Engine,
    pub parameters: Parameters,
    pub potential: GalacticPotential,
    pub store: BodyStore,
    pub forces: AccelSet,
}

impl Simulation {
    /// Validate `cfg`, place the dwarf on its orbit and sample it.
    ///
    /// The orbital point is converted to Galactocentric coordinates if
    /// needed, integrated backwards for `time-orbit` in the background
    /// alone, and used as the centre of mass of the sampled Plummer sphere.
    pub fn from_config(cfg: &ParametersFile) -> Result<Self> {
        cfg.validate()?;

        let ctx = cfg.context();
        let ic = cfg.initial_conditions();
        let plummer_cfg = &ctx.dwarf_model.plummer;

        let disk = &ctx.potential.disk.miyamoto_nagai;
        let sphere = &ctx.potential.spherical.sphere;
        let halo = &ctx.potential.halo.logarithmic;
        let potential = GalacticPotential {
            disk: MiyamotoNagaiDisk {
                mass: disk.mass,
                scale_length: disk.scale_length,
                scale_height: disk.scale_height,
            },
            sphere: HernquistSphere {
                mass: sphere.mass,
                r0: sphere.r0_scale,
            },
            halo: LogarithmicHalo {
                vhalo: halo.vhalo,
                scale_length: halo.scale_length,
                z_flattening: halo.z_flattening,
            },
        };

        let model = PlummerModel {
            mass: plummer_cfg.mass,
            nbody: plummer_cfg.nbody as usize,
            scale_radius: plummer_cfg.scale_radius,
        };

        // Parameters (runtime) from the context, defaults from the dwarf model
        let eps = ctx
            .softening
            .unwrap_or_else(|| default_softening(model.nbody, model.scale_radius));
        let parameters = Parameters {
            dt: ctx
                .timestep
                .unwrap_or_else(|| default_timestep(model.mass, model.scale_radius)),
            t_orbit: plummer_cfg.time_orbit,
            t_dwarf: plummer_cfg.time_dwarf,
            eps2: eps * eps,
            G: ctx.gravitational_constant.unwrap_or(1.0),
            seed: ctx.seed,
            accel_warning: ctx.accel_warning_threshold.unwrap_or(DEFAULT_ACCEL_WARNING),
        };

        // Engine (runtime) from the context
        let theta = ctx.accuracy_parameter;
        let engine = Engine {
            criterion: match ctx.criterion {
                CriterionConfig::Sw93 => Criterion::Sw93 { theta },
                CriterionConfig::Bh86 => Criterion::Bh86 { theta },
                CriterionConfig::Exact => Criterion::Exact,
            },
            use_quadrupole: ctx.use_quadrupole_corrections,
            depth_cap: ctx.tree_depth_cap.unwrap_or(DEFAULT_DEPTH_CAP),
        };

        // Orbital point in the Galactocentric frame
        let position = NVec3::from_column_slice(&ic.position);
        let velocity = NVec3::from_column_slice(&ic.velocity);
        let x_gc = if ic.use_gal_c {
            position
        } else {
            let sun = ic.sun_gc_distance.unwrap_or(DEFAULT_SUN_GC_DISTANCE);
            lbr_to_cartesian(&position, sun, ic.angle_use_radians)
        };

        let (x0, v0) = integrate_orbit(&potential, x_gc, velocity, parameters.t_orbit, -parameters.dt);
        info!(
            "orbit: start ({:.6}, {:.6}, {:.6}) after {} backwards",
            x0.x, x0.y, x0.z, parameters.t_orbit
        );

        let mut rng = SmallRng::seed_from_u64(parameters.seed);
        let bodies = model.sample(&mut rng, x0, v0, parameters.G)?;

        Self::new(engine, parameters, potential, bodies)
    }

    /// Assemble a simulation from runtime parts and prime the accelerations
    pub fn new(engine: Engine, parameters: Parameters, potential: GalacticPotential, bodies: Vec<Body>) -> Result<Self> {
        let forces = AccelSet::new().with(potential).with(TreeGravity {
            G: parameters.G,
            eps2: parameters.eps2,
            criterion: engine.criterion,
            use_quadrupole: engine.use_quadrupole,
            depth_cap: engine.depth_cap,
        });

        let mut store = BodyStore::new(bodies);
        let stats = prime_accelerations(&mut store, &forces)?;
        info!(
            "simulation ready: {} bodies, dt {:.6e}, criterion {:?}, quadrupole {}, {} tree nodes",
            store.len(),
            parameters.dt,
            engine.criterion,
            engine.use_quadrupole,
            stats.nodes
        );

        Ok(Self {
            engine,
            parameters,
            potential,
            store,
            forces,
        })
    }

    /// Advance one step
    pub fn step(&mut self) -> Result<StepReport> {
        let report = leapfrog_step(&mut self.store, &self.forces, &self.parameters)?;
        debug!(
            "step {} t={:.6}: {} nodes, {} body-body, {} body-cell",
            report.step, report.t, report.forces.nodes, report.forces.body_body, report.forces.body_cell
        );
        Ok(report)
    }

    /// Run `time-dwarf` forward and return the final snapshot
    pub fn run(&mut self) -> Result<Snapshot> {
        self.run_with(|_, _| {})
    }

    /// Run `time-dwarf` forward, calling `observe` after every step
    pub fn run_with<F>(&mut self, mut observe: F) -> Result<Snapshot>
    where
        F: FnMut(&StepReport, &BodyStore),
    {
        let steps = self.parameters.steps_for(self.parameters.t_dwarf);
        info!("running {} steps", steps);

        let mut warnings = 0;
        for _ in 0..steps {
            let report = self.step()?;
            warnings += report.warnings.len();
            observe(&report, &self.store);
        }

        info!("done: t = {:.6}, {} instability warnings", self.store.t, warnings);
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Kinetic, self and external energy of the current state (O(N^2))
    pub fn energy(&self) -> Energy {
        let direct = DirectGravity {
            G: self.parameters.G,
            eps2: self.parameters.eps2,
        };
        Energy {
            kinetic: self.store.kinetic_energy(),
            self_potential: direct.potential_energy(&self.store),
            external: self.potential.potential_energy(&self.store),
        }
    }
}
