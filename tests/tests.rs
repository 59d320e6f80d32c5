use approx::assert_relative_eq;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use galactic_nbody::simulation::barnes_hut::{Octree, DEFAULT_DEPTH_CAP};
use galactic_nbody::simulation::criterion::Criterion;
use galactic_nbody::simulation::engine::Engine;
use galactic_nbody::simulation::error::NBodyError;
use galactic_nbody::simulation::forces::{AccelSet, Acceleration, DirectGravity, TreeGravity};
use galactic_nbody::simulation::integrator::{integrate_orbit, leapfrog_step, prime_accelerations};
use galactic_nbody::simulation::params::Parameters;
use galactic_nbody::simulation::plummer::{lbr_to_cartesian, PlummerModel};
use galactic_nbody::simulation::potential::{
    GalacticPotential, HernquistSphere, LogarithmicHalo, MiyamotoNagaiDisk, PotentialComponent,
};
use galactic_nbody::simulation::scenario::Simulation;
use galactic_nbody::simulation::states::{Body, BodyStore, NVec3};

/// Build a simple 2-body store separated along the x-axis
pub fn two_body_store(dist: f64, m1: f64, m2: f64) -> BodyStore {
    BodyStore::new(vec![
        Body::dwarf(NVec3::new(-dist / 2.0, 0.0, 0.0), NVec3::zeros(), m1),
        Body::dwarf(NVec3::new(dist / 2.0, 0.0, 0.0), NVec3::zeros(), m2),
    ])
}

/// Default physics parameters for tests
pub fn test_params() -> Parameters {
    Parameters {
        dt: 0.01,
        t_orbit: 0.0,
        t_dwarf: 1.0,
        eps2: 0.0,
        G: 1.0,
        seed: 42,
        accel_warning: 1.0e5,
    }
}

/// Build a direct gravity term + AccelSet
pub fn gravity_set(p: &Parameters) -> AccelSet {
    AccelSet::new().with(DirectGravity { G: p.G, eps2: p.eps2 })
}

pub fn tree(criterion: Criterion, use_quadrupole: bool, eps2: f64) -> TreeGravity {
    TreeGravity { G: 1.0, eps2, criterion, use_quadrupole, depth_cap: DEFAULT_DEPTH_CAP }
}

/// Seeded Plummer sphere of `n` unit-mass-total bodies around `centre`
pub fn plummer_bodies(n: usize, seed: u64, centre: NVec3) -> Vec<Body> {
    let model = PlummerModel { mass: 1.0, nbody: n, scale_radius: 1.0 };
    let mut rng = SmallRng::seed_from_u64(seed);
    model.sample(&mut rng, centre, NVec3::zeros(), 1.0).unwrap()
}

/// Two Plummer spheres side by side
pub fn two_clusters(n: usize) -> BodyStore {
    let mut bodies = plummer_bodies(n, 1, NVec3::new(-3.0, 0.0, 0.0));
    bodies.extend(plummer_bodies(n, 2, NVec3::new(3.0, 0.5, 0.0)));
    BodyStore::new(bodies)
}

pub fn accels(term: &impl Acceleration, store: &BodyStore) -> Vec<NVec3> {
    let mut out = vec![NVec3::zeros(); store.len()];
    term.acceleration(store, &mut out).unwrap();
    out
}

/// RMS of |a - a_ref| / |a_ref| over all bodies
pub fn rms_relative_error(a: &[NVec3], reference: &[NVec3]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(reference)
        .map(|(x, r)| ((x - r).norm() / r.norm()).powi(2))
        .sum();
    (sum / a.len() as f64).sqrt()
}

/// Background from the orbit fixture
pub fn fixture_potential() -> GalacticPotential {
    GalacticPotential {
        disk: MiyamotoNagaiDisk { mass: 4.45865888e5, scale_length: 6.5, scale_height: 0.26 },
        sphere: HernquistSphere { mass: 1.52954402e5, r0: 0.7 },
        halo: LogarithmicHalo { vhalo: 73.0, scale_length: 12.0, z_flattening: 1.0 },
    }
}

/// A background that exerts no force
pub fn empty_potential() -> GalacticPotential {
    GalacticPotential {
        disk: MiyamotoNagaiDisk { mass: 0.0, scale_length: 1.0, scale_height: 1.0 },
        sphere: HernquistSphere { mass: 0.0, r0: 1.0 },
        halo: LogarithmicHalo { vhalo: 0.0, scale_length: 1.0, z_flattening: 1.0 },
    }
}

pub fn fixture_point() -> NVec3 {
    lbr_to_cartesian(&NVec3::new(218.0, 53.5, 28.6), 8.0, false)
}

pub fn assert_vec_close(a: &NVec3, expected: [f64; 3], rel: f64) {
    for k in 0..3 {
        assert_relative_eq!(a[k], expected[k], max_relative = rel);
    }
}

// ==================================================================================
// Gravity tests
// ==================================================================================

#[test]
fn gravity_newton_third_law() {
    let store = two_body_store(1.0, 2.0, 3.0);
    let p = test_params();
    let forces = gravity_set(&p);

    let mut acc = vec![NVec3::zeros(); 2];
    forces.accumulate_accels(&store, &mut acc).unwrap();

    let net = acc[0] * store.bodies[0].m + acc[1] * store.bodies[1].m;

    assert!(net.norm() < 1e-12, "Net momentum not zero: {:?}", net);
}

#[test]
fn gravity_points_toward_other_body() {
    let store = two_body_store(2.0, 1.0, 1.0);
    let acc = accels(&DirectGravity { G: 1.0, eps2: 0.0 }, &store);

    let dx = store.bodies[1].x - store.bodies[0].x;
    assert!(acc[0].dot(&dx) > 0.0);
    assert!(acc[1].dot(&dx) < 0.0);
}

#[test]
fn gravity_inverse_square_law() {
    let g = DirectGravity { G: 1.0, eps2: 0.0 };
    let a1 = accels(&g, &two_body_store(1.0, 1.0, 1.0))[0].norm();
    let a2 = accels(&g, &two_body_store(2.0, 1.0, 1.0))[0].norm();

    assert_relative_eq!(a1 / a2, 4.0, max_relative = 1e-12);
}

#[test]
fn gravity_softening_prevents_blowup() {
    let store = two_body_store(1e-12, 1.0, 1.0);
    let acc = accels(&DirectGravity { G: 1.0, eps2: 1e-4 }, &store);

    assert!(acc[0].iter().all(|c| c.is_finite()));
    assert!(acc[0].norm() < 1.0);
}

#[test]
fn tracers_feel_gravity_but_exert_none() {
    let mut store = two_body_store(2.0, 1.0, 1.0);
    store.bodies.push(Body::tracer(NVec3::new(0.0, 1.0, 0.0), NVec3::zeros()));
    store.acc.push(NVec3::zeros());
    let without = two_body_store(2.0, 1.0, 1.0);

    let g = DirectGravity { G: 1.0, eps2: 0.0 };
    let a = accels(&g, &store);
    let a_ref = accels(&g, &without);

    assert_eq!(a[0], a_ref[0]);
    assert_eq!(a[1], a_ref[1]);
    assert!(a[2].y < 0.0);
    assert!(a[2].x.abs() < 1e-15);
}

// ==================================================================================
// Background potential tests
// ==================================================================================

#[test]
fn lbr_conversion_matches_hand_computed_point() {
    let x = fixture_point();
    assert_vec_close(&x, [-21.405585120080726, -10.473590969231397, 22.990306213652417], 1e-12);
}

#[test]
fn lbr_conversion_accepts_radians() {
    let deg = lbr_to_cartesian(&NVec3::new(218.0, 53.5, 28.6), 8.0, false);
    let rad = lbr_to_cartesian(&NVec3::new(218f64.to_radians(), 53.5f64.to_radians(), 28.6), 8.0, true);
    assert_relative_eq!((deg - rad).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn potential_components_at_fixture_point() {
    let pot = fixture_potential();
    let x = fixture_point();

    assert_vec_close(&pot.disk.acceleration(&x), [175.08423448587607, 85.66739226603998, -241.20877286402626], 1e-12);
    assert_vec_close(&pot.sphere.acceleration(&x), [86.48398427118757, 42.31595966961562, -92.88665877701563], 1e-12);
    assert_vec_close(&pot.halo.acceleration(&x), [183.91780689576933, 89.9895924628249, -197.53380601170807], 1e-12);

    let total = PotentialComponent::acceleration(&pot, &x);
    assert_vec_close(&total, [445.48602565283295, 217.9729443984805, -531.6292376527499], 1e-12);
    assert_relative_eq!(pot.potential(&x), 21676.949870529745, max_relative = 1e-12);
}

#[test]
fn potential_acceleration_is_minus_gradient() {
    let pot = fixture_potential();
    let x = NVec3::new(3.0, -2.0, 0.7);
    let a = PotentialComponent::acceleration(&pot, &x);
    let h = 1e-5;

    for k in 0..3 {
        let mut dx = NVec3::zeros();
        dx[k] = h;
        let grad = (pot.potential(&(x + dx)) - pot.potential(&(x - dx))) / (2.0 * h);
        assert_relative_eq!(a[k], -grad, max_relative = 1e-6);
    }
}

#[test]
fn tidal_tensor_is_symmetric() {
    let pot = fixture_potential();
    let t = pot.tidal_tensor(&fixture_point(), 1e-4);

    let asym = (t - t.transpose()).norm();
    assert!(asym < 1e-6 * t.norm(), "asymmetry {asym} for {t}");
}

#[test]
fn orbit_integration_is_reversible() {
    let pot = fixture_potential();
    let x0 = fixture_point();
    let v0 = NVec3::new(-156.0, 79.0, 107.0);

    let (x1, v1) = integrate_orbit(&pot, x0, v0, 0.5, 1e-4);
    let (x2, v2) = integrate_orbit(&pot, x1, v1, 0.5, -1e-4);

    assert!((x1 - x0).norm() > 1.0);
    assert_relative_eq!((x2 - x0).norm() / x0.norm(), 0.0, epsilon = 1e-8);
    assert_relative_eq!((v2 - v0).norm() / v0.norm(), 0.0, epsilon = 1e-8);
}

// ==================================================================================
// Octree tests
// ==================================================================================

#[test]
fn tree_mass_equals_sum_of_sources() {
    let store = BodyStore::new(plummer_bodies(500, 7, NVec3::new(1.0, 2.0, 3.0)));
    let t = tree(Criterion::Sw93 { theta: 0.7 }, true, 0.0).build_tree(&store).unwrap();

    assert_relative_eq!(t.total_mass(), store.source_mass(), max_relative = 1e-12);
    let root = t.node(t.root.unwrap());
    let (com, _) = store.center_of_mass();
    assert_relative_eq!((root.com - com).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn tree_node_count_is_bounded() {
    let n = 500;
    let store = BodyStore::new(plummer_bodies(n, 11, NVec3::zeros()));
    let t = Octree::build(&store, DEFAULT_DEPTH_CAP).unwrap();

    assert!(t.node_count() <= 2 * n - 1, "{} nodes for {} bodies", t.node_count(), n);
}

#[test]
fn every_source_lands_in_exactly_one_leaf() {
    let mut bodies = plummer_bodies(200, 3, NVec3::zeros());
    bodies.push(Body::tracer(NVec3::new(0.1, 0.1, 0.1), NVec3::zeros()));
    let store = BodyStore::new(bodies);
    let t = Octree::build(&store, DEFAULT_DEPTH_CAP).unwrap();

    let mut seen = vec![0usize; store.len()];
    for node in t.nodes.iter().filter(|n| n.is_leaf()) {
        for &i in t.bodies_of(node) {
            seen[i] += 1;
        }
    }

    assert!(seen[..200].iter().all(|&c| c == 1));
    assert_eq!(seen[200], 0);
    assert!(t.leaf_of[200].is_none());
}

#[test]
fn coincident_bodies_share_a_leaf() {
    let store = BodyStore::new(vec![
        Body::dwarf(NVec3::new(1.0, 1.0, 1.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(-1.0, 0.0, 0.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(1.0, 1.0, 1.0), NVec3::zeros(), 2.0),
    ]);
    let t = tree(Criterion::Exact, false, 1e-4);
    let built = t.build_tree(&store).unwrap();

    let leaf = built.leaf_of[0].unwrap();
    assert_eq!(built.leaf_of[2], Some(leaf));
    assert_eq!(built.node(leaf).body_count, 2);
    assert_relative_eq!(built.node(leaf).mass, 3.0);

    let a = accels(&t, &store);
    assert!(a.iter().all(|v| v.iter().all(|c| c.is_finite())));
}

#[test]
fn coincident_bodies_without_softening_stay_finite() {
    let store = BodyStore::new(vec![
        Body::dwarf(NVec3::new(1.0, 1.0, 1.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(-1.0, 0.0, 0.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(1.0, 1.0, 1.0), NVec3::zeros(), 2.0),
    ]);
    let direct = DirectGravity { G: 1.0, eps2: 0.0 };
    let a_direct = accels(&direct, &store);
    assert!(direct.potential_energy(&store).is_finite());

    for criterion in [Criterion::Sw93 { theta: 1.0 }, Criterion::Exact] {
        let a = accels(&tree(criterion, true, 0.0), &store);
        assert!(a.iter().all(|v| v.iter().all(|c| c.is_finite())), "{a:?}");

        // the merged pair only feels body 1
        assert_relative_eq!((a[0] - a_direct[0]).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((a[2] - a_direct[2]).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((a[0] - a[2]).norm(), 0.0, epsilon = 1e-12);
    }

    let mut stepped = store.clone();
    let forces = AccelSet::new().with(tree(Criterion::Sw93 { theta: 1.0 }, true, 0.0));
    prime_accelerations(&mut stepped, &forces).unwrap();
    leapfrog_step(&mut stepped, &forces, &test_params()).unwrap();
}

#[test]
fn unresolvable_bodies_fail_at_depth_cap() {
    let store = BodyStore::new(vec![
        Body::dwarf(NVec3::new(0.0, 0.0, 0.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(1.0, 1.0, 1.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(1e-9, 0.0, 0.0), NVec3::zeros(), 1.0),
    ]);

    match Octree::build(&store, 4) {
        Err(NBodyError::TreeConstruction { bodies, depth }) => {
            assert!(bodies.contains(&0) && bodies.contains(&2));
            assert_eq!(depth, 4);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("tree should not resolve bodies 1e-9 apart at depth 4"),
    }

    assert!(Octree::build(&store, DEFAULT_DEPTH_CAP).is_ok());
}

// ==================================================================================
// Barnes-Hut tests
// ==================================================================================

#[test]
fn exact_walk_matches_direct_sum() {
    let store = BodyStore::new(plummer_bodies(16, 5, NVec3::zeros()));
    let eps2 = 1e-4;

    let a_tree = accels(&tree(Criterion::Exact, true, eps2), &store);
    let a_direct = accels(&DirectGravity { G: 1.0, eps2 }, &store);

    assert!(rms_relative_error(&a_tree, &a_direct) < 1e-10);
}

#[test]
fn small_theta_sw93_matches_direct_sum() {
    let store = BodyStore::new(plummer_bodies(300, 9, NVec3::zeros()));
    let eps2 = 1e-4;

    let a_tree = accels(&tree(Criterion::Sw93 { theta: 0.1 }, true, eps2), &store);
    let a_direct = accels(&DirectGravity { G: 1.0, eps2 }, &store);

    assert!(rms_relative_error(&a_tree, &a_direct) < 1e-3);
}

#[test]
fn single_body_feels_no_self_force() {
    let store = BodyStore::new(vec![Body::dwarf(NVec3::new(2.0, 1.0, 0.0), NVec3::zeros(), 5.0)]);
    for criterion in [Criterion::Sw93 { theta: 1.0 }, Criterion::Bh86 { theta: 1.0 }, Criterion::Exact] {
        let a = accels(&tree(criterion, true, 0.0), &store);
        assert_eq!(a[0], NVec3::zeros());
    }
}

#[test]
fn tree_excludes_self_from_aggregates() {
    // theta = 10 accepts the root from anywhere; it must still be opened
    let store = two_body_store(1.0, 1.0, 3.0);
    let a_tree = accels(&tree(Criterion::Sw93 { theta: 10.0 }, true, 0.0), &store);
    let a_direct = accels(&DirectGravity { G: 1.0, eps2: 0.0 }, &store);

    assert_relative_eq!((a_tree[0] - a_direct[0]).norm(), 0.0, epsilon = 1e-12);
    assert_relative_eq!((a_tree[1] - a_direct[1]).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn error_decreases_with_opening_angle() {
    let store = two_clusters(150);
    let eps2 = 1e-4;
    let a_direct = accels(&DirectGravity { G: 1.0, eps2 }, &store);

    let errors: Vec<f64> = [1.0, 0.5, 0.25]
        .into_iter()
        .map(|theta| {
            let a = accels(&tree(Criterion::Sw93 { theta }, false, eps2), &store);
            rms_relative_error(&a, &a_direct)
        })
        .collect();
    let exact = rms_relative_error(&accels(&tree(Criterion::Exact, false, eps2), &store), &a_direct);

    assert!(errors[0] > errors[1] && errors[1] > errors[2], "errors not monotone: {errors:?}");
    assert!(exact < errors[2]);
    assert!(exact < 1e-10);
}

#[test]
fn quadrupole_improves_accuracy() {
    let store = two_clusters(150);
    let eps2 = 1e-4;
    let a_direct = accels(&DirectGravity { G: 1.0, eps2 }, &store);

    let mono = rms_relative_error(&accels(&tree(Criterion::Sw93 { theta: 0.7 }, false, eps2), &store), &a_direct);
    let quad = rms_relative_error(&accels(&tree(Criterion::Sw93 { theta: 0.7 }, true, eps2), &store), &a_direct);

    assert!(quad < mono, "quadrupole {quad} vs monopole {mono}");
}

#[test]
fn sw93_error_bound_opens_more_nodes() {
    let mut store = two_clusters(150);
    let eps2 = 1e-4;
    let t = AccelSet::new().with(tree(Criterion::Sw93 { theta: 1.0 }, true, eps2));

    // no prior estimate: geometric test only
    let mut out = vec![NVec3::zeros(); store.len()];
    let loose = t.accumulate_accels(&store, &mut out).unwrap();

    prime_accelerations(&mut store, &AccelSet::new().with(DirectGravity { G: 1.0, eps2 })).unwrap();
    let strict = t.accumulate_accels(&store, &mut out).unwrap();

    assert!(strict.body_body >= loose.body_body);
    assert_eq!(strict.nodes, loose.nodes);
}

#[test]
fn missing_leaf_is_a_malformed_tree() {
    let store = BodyStore::new(plummer_bodies(32, 17, NVec3::zeros()));
    let t = tree(Criterion::Sw93 { theta: 0.7 }, true, 1e-4);
    let mut built = t.build_tree(&store).unwrap();
    built.leaf_of[5] = None;

    match t.force_on_body(&built, 5, &store) {
        Err(NBodyError::MalformedTree { body }) => assert_eq!(body, 5),
        other => panic!("expected MalformedTree, got {other:?}"),
    }
    assert!(t.force_on_body(&built, 6, &store).is_ok());
}

#[test]
fn unreached_leaf_is_a_malformed_tree() {
    // bodies 0 and 1 share a cell far from body 2
    let store = BodyStore::new(vec![
        Body::dwarf(NVec3::new(0.0, 0.0, 0.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(1.0, 0.0, 0.0), NVec3::zeros(), 1.0),
        Body::dwarf(NVec3::new(10.0, 10.0, 10.0), NVec3::zeros(), 1.0),
    ]);
    let t = tree(Criterion::Sw93 { theta: 10.0 }, false, 0.0);
    let mut built = t.build_tree(&store).unwrap();
    assert!(t.force_on_body(&built, 0, &store).is_ok());

    // point body 0 at body 2's leaf: its own cell now looks foreign and is accepted
    built.leaf_of[0] = built.leaf_of[2];
    match t.force_on_body(&built, 0, &store) {
        Err(NBodyError::MalformedTree { body }) => assert_eq!(body, 0),
        other => panic!("expected MalformedTree, got {other:?}"),
    }
}

#[test]
fn tracer_walk_matches_direct_sum() {
    let mut bodies = plummer_bodies(64, 13, NVec3::zeros());
    bodies.push(Body::tracer(NVec3::new(0.3, -0.2, 0.1), NVec3::zeros()));
    let store = BodyStore::new(bodies);

    let a_tree = accels(&tree(Criterion::Exact, false, 1e-4), &store);
    let a_direct = accels(&DirectGravity { G: 1.0, eps2: 1e-4 }, &store);

    assert_relative_eq!((a_tree[64] - a_direct[64]).norm() / a_direct[64].norm(), 0.0, epsilon = 1e-10);
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn binary_orbit_conserves_energy() {
    // equal masses, separation 1, G M = 1: circular with period 2 pi
    let bodies = vec![
        Body::dwarf(NVec3::new(-0.5, 0.0, 0.0), NVec3::new(0.0, -0.5, 0.0), 0.5),
        Body::dwarf(NVec3::new(0.5, 0.0, 0.0), NVec3::new(0.0, 0.5, 0.0), 0.5),
    ];
    let params = Parameters { t_dwarf: 100.0 * 2.0 * std::f64::consts::PI, ..test_params() };
    let engine = Engine { criterion: Criterion::Sw93 { theta: 0.5 }, use_quadrupole: true, depth_cap: DEFAULT_DEPTH_CAP };

    let mut sim = Simulation::new(engine, params, empty_potential(), bodies).unwrap();
    let e0 = sim.energy().total();
    assert_relative_eq!(e0, -0.125, max_relative = 1e-12);

    let mut steps = 0;
    sim.run_with(|report, _| {
        steps += 1;
        assert!(report.warnings.is_empty());
    })
    .unwrap();
    let drift = ((sim.energy().total() - e0) / e0).abs();

    assert_eq!(steps, sim.parameters.steps_for(sim.parameters.t_dwarf));
    assert!(drift < 0.01, "energy drift {drift}");
}

#[test]
fn galactic_orbit_conserves_energy() {
    let pot = fixture_potential();
    let r = 8.0;
    let v_c = (PotentialComponent::acceleration(&pot, &NVec3::new(r, 0.0, 0.0)).norm() * r).sqrt();
    let period = 2.0 * std::f64::consts::PI * r / v_c;

    let bodies = vec![
        Body::dwarf(NVec3::new(r - 0.05, 0.0, 0.0), NVec3::new(0.0, v_c, 0.0), 0.5),
        Body::dwarf(NVec3::new(r + 0.05, 0.0, 0.0), NVec3::new(0.0, v_c, 0.0), 0.5),
    ];
    let params = Parameters { dt: period / 400.0, t_dwarf: 100.0 * period, eps2: 1e-4, ..test_params() };
    let engine = Engine { criterion: Criterion::Sw93 { theta: 0.5 }, use_quadrupole: true, depth_cap: DEFAULT_DEPTH_CAP };

    let direct = DirectGravity { G: params.G, eps2: params.eps2 };
    let mut sim = Simulation::new(engine, params, pot, bodies).unwrap();
    let e0 = sim.energy();
    assert!(e0.external.abs() > 1e3 * e0.self_potential.abs());

    let mut max_drift: f64 = 0.0;
    sim.run_with(|_, store| {
        let e = store.kinetic_energy() + direct.potential_energy(store) + pot.potential_energy(store);
        max_drift = max_drift.max(((e - e0.total()) / e0.total()).abs());
    })
    .unwrap();
    assert_relative_eq!(sim.energy().total(), e0.total(), max_relative = 0.01);

    assert!(sim.store.t >= 100.0 * period);
    assert!(max_drift < 0.01, "energy drift {max_drift}");
}

#[test]
fn non_finite_initial_state_is_rejected() {
    let mut store = two_body_store(1.0, 1.0, 1.0);
    store.bodies[0].x.y = f64::NAN;
    let forces = AccelSet::new().with(tree(Criterion::Sw93 { theta: 0.7 }, true, 0.0));

    match prime_accelerations(&mut store, &forces) {
        Err(NBodyError::IntegrationFatal { step, body, .. }) => {
            assert_eq!(step, 0);
            assert_eq!(body, 0);
        }
        other => panic!("expected IntegrationFatal, got {other:?}"),
    }
    assert!(store.acc.iter().all(|a| *a == NVec3::zeros()));
}

#[test]
fn step_count_rounds_up() {
    let p = Parameters { dt: 0.3, ..test_params() };
    assert_eq!(p.steps_for(1.0), 4);
    assert_eq!(p.steps_for(0.9), 3);
    assert_eq!(p.steps_for(0.0), 0);
}

#[test]
fn non_finite_state_keeps_last_valid_snapshot() {
    let mut store = two_body_store(1.0, 1.0, 1.0);
    let p = test_params();
    let forces = gravity_set(&p);
    prime_accelerations(&mut store, &forces).unwrap();

    leapfrog_step(&mut store, &forces, &p).unwrap();
    let before = store.snapshot();

    store.bodies[1].v.x = f64::NAN;
    match leapfrog_step(&mut store, &forces, &p) {
        Err(NBodyError::IntegrationFatal { step, last_valid, .. }) => {
            assert_eq!(step, 2);
            assert_eq!(last_valid.step, 1);
            assert_eq!(last_valid.bodies[0], before.bodies[0]);
        }
        other => panic!("expected IntegrationFatal, got {other:?}"),
    }

    // the store was not advanced
    assert_eq!(store.step, 1);
    assert_eq!(store.bodies[0].x, before.bodies[0].x);
}

#[test]
fn large_acceleration_is_reported() {
    let mut store = two_body_store(0.1, 1.0, 1.0);
    let p = Parameters { dt: 1e-4, accel_warning: 1.0, ..test_params() };
    let forces = gravity_set(&p);
    prime_accelerations(&mut store, &forces).unwrap();

    let report = leapfrog_step(&mut store, &forces, &p).unwrap();

    assert_eq!(report.step, 1);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings.iter().all(|w| w.accel > 1.0));
}

// ==================================================================================
// Snapshot tests
// ==================================================================================

#[test]
fn snapshot_text_has_one_line_per_body() {
    let store = BodyStore::new(plummer_bodies(10, 21, NVec3::zeros()));
    let snap = store.snapshot();

    let mut buf = Vec::new();
    snap.write_text(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 11);
    assert!(lines[0].starts_with("# nbody 10 step 0"));
    assert!(lines[1..].iter().all(|l| l.split_whitespace().count() == 7));
}

#[test]
fn fingerprint_tracks_bit_changes() {
    let store = BodyStore::new(plummer_bodies(10, 21, NVec3::zeros()));
    let a = store.snapshot();
    let mut b = a.clone();

    assert!(a.bitwise_eq(&b));
    assert_eq!(a.fingerprint(), b.fingerprint());

    b.bodies[3].v.z = f64::from_bits(b.bodies[3].v.z.to_bits() ^ 1);
    assert!(!a.bitwise_eq(&b));
    assert_ne!(a.fingerprint(), b.fingerprint());
}
