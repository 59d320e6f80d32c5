//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`NBodyContextConfig`]       – criterion, accuracy, seed, potential, dwarf model
//! - [`InitialConditionsConfig`]  – orbital position / velocity of the dwarf
//! - [`ParametersFile`]           – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//! An example scenario matching these types:
//!
//! ```yaml
//! nbody-parameters-file:
//!   nbody-context:
//!     headline: "disk=miyamoto-nagai_halo=logarithmic_quad=true_criterion=sw93"
//!     criterion: "sw93"            # or "bh86", "exact"
//!     use-quadrupole-corrections: true
//!     accuracy-parameter: 1.0      # theta
//!     seed: 25
//!     # optional: timestep, softening, gravitational-constant,
//!     #           tree-depth-cap, accel-warning-threshold
//!     potential:
//!       disk:
//!         miyamoto-nagai: { mass: 4.45865888e5, scale-length: 6.5, scale-height: 0.26 }
//!       spherical:
//!         sphere: { mass: 1.52954402e5, r0-scale: 0.7 }
//!       halo:
//!         logarithmic: { vhalo: 73, scale-length: 12.0, z-flattening: 1.0 }
//!     dwarf-model:
//!       plummer:
//!         mass: 12.3820039691
//!         nbody: 1024
//!         scale-radius: 0.685695643277
//!         time-orbit: 4.058745708
//!         time-dwarf: 3.89893414985
//!   initial-conditions:
//!     useGalC: false               # false -> position is (l, b, r)
//!     angle-use-radians: false
//!     velocity: [ -156, 79, 107 ]
//!     position: [ 218, 53.5, 28.6 ]
//! ```
//!
//! [`ParametersFile::validate`] checks every numeric parameter before the
//! engine maps this into its runtime `Simulation`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::simulation::error::{config_err, Result};

/// Which acceptance criterion the tree walk uses
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionConfig {
    #[serde(rename = "sw93")] // Salmon–Warren bmax criterion with error bound
    Sw93,

    #[serde(rename = "bh86")] // Barnes–Hut opening angle on the cell size
    Bh86,

    #[serde(rename = "exact")] // never approximate
    Exact,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct MiyamotoNagaiConfig {
    pub mass: f64,
    pub scale_length: f64,
    pub scale_height: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DiskConfig {
    #[serde(rename = "miyamoto-nagai")]
    pub miyamoto_nagai: MiyamotoNagaiConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SphereConfig {
    pub mass: f64,
    #[serde(rename = "r0-scale")]
    pub r0_scale: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SphericalConfig {
    pub sphere: SphereConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LogarithmicHaloConfig {
    pub vhalo: f64,
    pub scale_length: f64,
    pub z_flattening: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HaloConfig {
    pub logarithmic: LogarithmicHaloConfig,
}

/// Analytic background: disk + spherical bulge + halo
#[derive(Deserialize, Debug, Clone)]
pub struct PotentialConfig {
    pub disk: DiskConfig,
    pub spherical: SphericalConfig,
    pub halo: HaloConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PlummerConfig {
    pub mass: f64,
    pub nbody: i64, // signed so a negative count is reported, not a parse error
    pub scale_radius: f64,
    pub time_orbit: f64, // backwards orbit time before the run
    pub time_dwarf: f64, // forward n-body time
}

#[derive(Deserialize, Debug, Clone)]
pub struct DwarfModelConfig {
    pub plummer: PlummerConfig,
}

/// Engine, potential and dwarf settings
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct NBodyContextConfig {
    #[serde(default)]
    pub headline: Option<String>,
    pub criterion: CriterionConfig,
    pub use_quadrupole_corrections: bool,
    pub accuracy_parameter: f64, // theta
    pub seed: u64,
    pub potential: PotentialConfig,
    pub dwarf_model: DwarfModelConfig,

    // Optional numerics, defaulted from the dwarf model when absent
    #[serde(default)]
    pub timestep: Option<f64>,
    #[serde(default)]
    pub softening: Option<f64>,
    #[serde(default)]
    pub gravitational_constant: Option<f64>,
    #[serde(default)]
    pub tree_depth_cap: Option<usize>,
    #[serde(default)]
    pub accel_warning_threshold: Option<f64>,
}

/// Orbital point of the dwarf's centre of mass
#[derive(Deserialize, Debug, Clone)]
pub struct InitialConditionsConfig {
    #[serde(rename = "useGalC")]
    pub use_gal_c: bool, // true -> position is already Galactocentric Cartesian
    #[serde(rename = "angle-use-radians")]
    pub angle_use_radians: bool,
    pub velocity: Vec<f64>,
    pub position: Vec<f64>,
    #[serde(rename = "sun-gc-distance", default)]
    pub sun_gc_distance: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct NBodyParametersConfig {
    pub nbody_context: NBodyContextConfig,
    pub initial_conditions: InitialConditionsConfig,
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersFile {
    #[serde(rename = "nbody-parameters-file")]
    pub parameters: NBodyParametersConfig,
}

impl ParametersFile {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn context(&self) -> &NBodyContextConfig {
        &self.parameters.nbody_context
    }

    pub fn initial_conditions(&self) -> &InitialConditionsConfig {
        &self.parameters.initial_conditions
    }

    /// Check every numeric parameter; nothing is sampled or built here
    pub fn validate(&self) -> Result<()> {
        let ctx = self.context();
        let ic = self.initial_conditions();

        if !(ctx.accuracy_parameter > 0.0 && ctx.accuracy_parameter.is_finite()) {
            return config_err(format!(
                "accuracy-parameter must be > 0, got {}",
                ctx.accuracy_parameter
            ));
        }

        let disk = &ctx.potential.disk.miyamoto_nagai;
        non_negative("potential.disk.miyamoto-nagai.mass", disk.mass)?;
        positive("potential.disk.miyamoto-nagai.scale-length", disk.scale_length)?;
        positive("potential.disk.miyamoto-nagai.scale-height", disk.scale_height)?;

        let sphere = &ctx.potential.spherical.sphere;
        non_negative("potential.spherical.sphere.mass", sphere.mass)?;
        positive("potential.spherical.sphere.r0-scale", sphere.r0_scale)?;

        let halo = &ctx.potential.halo.logarithmic;
        non_negative("potential.halo.logarithmic.vhalo", halo.vhalo)?;
        positive("potential.halo.logarithmic.scale-length", halo.scale_length)?;
        positive("potential.halo.logarithmic.z-flattening", halo.z_flattening)?;

        let plummer = &ctx.dwarf_model.plummer;
        if plummer.nbody <= 0 {
            return config_err(format!("dwarf-model.plummer.nbody must be > 0, got {}", plummer.nbody));
        }
        positive("dwarf-model.plummer.mass", plummer.mass)?;
        positive("dwarf-model.plummer.scale-radius", plummer.scale_radius)?;
        non_negative("dwarf-model.plummer.time-orbit", plummer.time_orbit)?;
        non_negative("dwarf-model.plummer.time-dwarf", plummer.time_dwarf)?;

        if let Some(dt) = ctx.timestep {
            positive("timestep", dt)?;
        }
        if let Some(eps) = ctx.softening {
            non_negative("softening", eps)?;
        }
        if let Some(g) = ctx.gravitational_constant {
            positive("gravitational-constant", g)?;
        }
        if let Some(cap) = ctx.tree_depth_cap {
            if !(1..=128).contains(&cap) {
                return config_err(format!("tree-depth-cap must be in 1..=128, got {cap}"));
            }
        }
        if let Some(a) = ctx.accel_warning_threshold {
            positive("accel-warning-threshold", a)?;
        }

        three_vector("initial-conditions.position", &ic.position)?;
        three_vector("initial-conditions.velocity", &ic.velocity)?;
        if let Some(d) = ic.sun_gc_distance {
            non_negative("initial-conditions.sun-gc-distance", d)?;
        }

        Ok(())
    }
}

fn positive(name: &str, x: f64) -> Result<()> {
    if x > 0.0 && x.is_finite() {
        Ok(())
    } else {
        config_err(format!("{name} must be > 0, got {x}"))
    }
}

fn non_negative(name: &str, x: f64) -> Result<()> {
    if x >= 0.0 && x.is_finite() {
        Ok(())
    } else {
        config_err(format!("{name} must be >= 0, got {x}"))
    }
}

fn three_vector(name: &str, v: &[f64]) -> Result<()> {
    if v.len() != 3 {
        return config_err(format!("{name} needs 3 components, got {}", v.len()));
    }
    if v.iter().any(|c| !c.is_finite()) {
        return config_err(format!("{name} has a non-finite component"));
    }
    Ok(())
}
