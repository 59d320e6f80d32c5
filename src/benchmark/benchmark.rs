use std::time::Instant;

use log::info;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::simulation::criterion::Criterion;
use crate::simulation::barnes_hut::DEFAULT_DEPTH_CAP;
use crate::simulation::error::Result;
use crate::simulation::forces::{AccelSet, DirectGravity, TreeGravity};
use crate::simulation::integrator::prime_accelerations;
use crate::simulation::params::default_softening;
use crate::simulation::plummer::PlummerModel;
use crate::simulation::states::{BodyStore, NVec3};

const BENCH_SEED: u64 = 42;
const BENCH_G: f64 = 1.0;

/// Seeded Plummer sphere of `n` bodies at the origin
fn make_store(n: usize) -> Result<BodyStore> {
    let model = PlummerModel {
        mass: 1.0,
        nbody: n,
        scale_radius: 1.0,
    };
    let mut rng = SmallRng::seed_from_u64(BENCH_SEED);
    let bodies = model.sample(&mut rng, NVec3::zeros(), NVec3::zeros(), BENCH_G)?;
    Ok(BodyStore::new(bodies))
}

/// Time one self-gravity evaluation, direct sum vs. SW93 tree (theta = 0.7,
/// quadrupole on), for each size in `ns`.
///
/// Returns `(n, direct_ms, tree_ms)` rows; also printed as CSV so the
/// output can be pasted straight into a spreadsheet.
pub fn bench_forces(ns: &[usize]) -> Result<Vec<(usize, f64, f64)>> {
    println!("N,direct_ms,tree_ms");

    let mut rows = Vec::with_capacity(ns.len());
    for &n in ns {
        let eps = default_softening(n, 1.0);
        let eps2 = eps * eps;

        let direct = AccelSet::new().with(DirectGravity { G: BENCH_G, eps2 });
        let tree = AccelSet::new().with(TreeGravity {
            G: BENCH_G,
            eps2,
            criterion: Criterion::Sw93 { theta: 0.7 },
            use_quadrupole: true,
            depth_cap: DEFAULT_DEPTH_CAP,
        });

        // Warm-up also leaves a prior estimate so SW93 runs its error test
        let mut store = make_store(n)?;
        prime_accelerations(&mut store, &direct)?;

        let mut out = vec![NVec3::zeros(); n];

        let t0 = Instant::now();
        direct.accumulate_accels(&store, &mut out)?;
        let ms_direct = t0.elapsed().as_secs_f64() * 1000.0;

        let t1 = Instant::now();
        let stats = tree.accumulate_accels(&store, &mut out)?;
        let ms_tree = t1.elapsed().as_secs_f64() * 1000.0;

        info!(
            "N = {n}: {} nodes, {} body-body, {} body-cell",
            stats.nodes, stats.body_body, stats.body_cell
        );
        println!("{},{:.6},{:.6}", n, ms_direct, ms_tree);
        rows.push((n, ms_direct, ms_tree));
    }
    Ok(rows)
}
