pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use simulation::states::{Body, BodyKind, BodyStore, NMat3, NVec3, Snapshot};
pub use simulation::error::{NBodyError, Result};
pub use simulation::forces::{Acceleration, AccelSet, DirectGravity, ForceStats, TreeGravity};
pub use simulation::criterion::Criterion;
pub use simulation::potential::{GalacticPotential, HernquistSphere, LogarithmicHalo, MiyamotoNagaiDisk, PotentialComponent};
pub use simulation::integrator::{integrate_orbit, leapfrog_step, prime_accelerations, StepReport};
pub use simulation::scenario::{Energy, Simulation};

pub use configuration::config::{CriterionConfig, NBodyContextConfig, InitialConditionsConfig, ParametersFile};

pub use benchmark::benchmark::bench_forces;
