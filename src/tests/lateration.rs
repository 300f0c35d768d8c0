use crate::prelude::{
    Config, Error, InliersData, Lateration, LaterationMethod, Method, RadioSourceEstimator,
    ReferencePosition, Sphere, Vector2, Vector3,
};
use crate::tests::{data::ring, init_logger, Dataset, TestConfig};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rstest::*;

fn spheres<const D: usize>(dataset: &Dataset<D>) -> Vec<Sphere<D>> {
    (0..dataset.references.len())
        .map(|i| {
            Sphere::new(
                ReferencePosition::new(dataset.references[i]),
                dataset.distance(i),
                1.0,
            )
        })
        .collect()
}

#[rstest]
#[case(LaterationMethod::Homogeneous)]
#[case(LaterationMethod::Inhomogeneous)]
#[case(LaterationMethod::NonLinear)]
fn three_references_around_origin(#[case] method: LaterationMethod) {
    init_logger();

    let dataset = Dataset::new(
        Vector2::new(0.0, 0.0),
        vec![
            Vector2::new(10.0, 0.0),
            Vector2::new(0.0, 10.0),
            Vector2::new(-10.0, 0.0),
        ],
    );

    for i in 0..3 {
        assert_eq!(dataset.distance(i), 10.0);
    }

    let solution = Lateration::new(method).solve(&spheres(&dataset)).unwrap();
    assert!(solution.position.norm() < 1.0E-6, "{:?}", solution.position);
}

#[rstest]
#[case(LaterationMethod::Homogeneous)]
#[case(LaterationMethod::Inhomogeneous)]
#[case(LaterationMethod::NonLinear)]
fn noise_free_random_geometries(#[case] method: LaterationMethod) {
    init_logger();

    let mut rng = SmallRng::seed_from_u64(7);

    for _ in 0..10 {
        let source = Vector3::new(
            rng.random_range(-20.0..20.0),
            rng.random_range(-20.0..20.0),
            rng.random_range(-5.0..5.0),
        );

        let references = (0..8)
            .map(|_| {
                Vector3::new(
                    rng.random_range(-50.0..50.0),
                    rng.random_range(-50.0..50.0),
                    rng.random_range(-30.0..30.0),
                )
            })
            .collect::<Vec<_>>();

        let dataset = Dataset::new(source, references);

        let solution = Lateration::new(method).solve(&spheres(&dataset)).unwrap();
        assert!(
            (solution.position - source).norm() < 1.0E-6,
            "{}: {:?} instead of {:?}",
            method,
            solution.position,
            source
        );
    }
}

#[rstest]
#[case(Method::Ransac)]
#[case(Method::LMedS)]
#[case(Method::Msac)]
#[case(Method::Prosac)]
#[case(Method::PROMedS)]
fn minimal_readings_exact_fit(#[case] method: Method) {
    init_logger();

    let dataset = Dataset::new(Vector2::new(3.0, -4.0), ring((0.0, 0.0), 25.0, 3));

    let mut estimator = RadioSourceEstimator::from_readings(
        Config::ranging_preset(method),
        dataset.ranging(0.0, &[], 0),
    )
    .unwrap();

    assert_eq!(estimator.min_readings(), 3);
    estimator
        .set_quality_scores(Some(vec![1.0, 0.5, 0.25]))
        .unwrap();

    let estimate = estimator.estimate().unwrap();
    TestConfig::default().check_position(&estimate, &dataset.source_coordinates());

    let ranging = estimate.ranging.unwrap();
    let inliers: InliersData = ranging.inliers.unwrap();
    assert_eq!(inliers.num_inliers, 3);
    for residual in inliers.residuals.unwrap() {
        assert!(residual < 1.0E-9, "residual {}", residual);
    }
    assert!(ranging.refinement.is_refined());
}

#[test]
fn too_few_readings() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(3.0, -4.0), ring((0.0, 0.0), 25.0, 2));

    let sphere_set = spheres(&dataset);
    assert_eq!(
        Lateration::new(LaterationMethod::NonLinear)
            .solve(&sphere_set)
            .err(),
        Some(Error::NotEnoughReadings {
            required: 3,
            provided: 2
        })
    );

    let mut estimator = RadioSourceEstimator::from_readings(
        Config::ranging_preset(Method::LMedS),
        dataset.ranging(0.0, &[], 0),
    )
    .unwrap();

    assert!(!estimator.is_ready());
    assert_eq!(estimator.estimate().err(), Some(Error::NotReady));
}

#[test]
fn nonlinear_iteration_cap() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(30.0, -40.0), ring((0.0, 0.0), 10.0, 5));

    let mut solver = Config::default().solver;
    solver.max_iterations = 1;

    let lateration = Lateration::new(LaterationMethod::NonLinear).with_solver_opts(&solver);

    match lateration.solve(&spheres(&dataset)) {
        Err(Error::Estimation(_)) => {},
        other => panic!("should not have converged: {:?}", other),
    }
}
