use crate::prelude::{
    Config, Matrix2, Method, RadioSourceEstimator, Reading, ReferencePosition, Refinement,
    RssiReading, Vector2,
};
use crate::tests::{data::ring, init_logger, Dataset, TestConfig};
use rstest::*;

#[rstest]
#[case(Method::LMedS)]
#[case(Method::Msac)]
fn combined_readings(#[case] method: Method) {
    init_logger();

    let dataset = Dataset::new(Vector2::new(-6.0, 4.0), ring((0.0, 0.0), 40.0, 12))
        .with_power_dbm(15.0);

    let mut cfg = Config::default().with_method(method);
    cfg.ranging.threshold_m = 0.5;

    let mut estimator =
        RadioSourceEstimator::from_readings(cfg, dataset.combined(0.05, &[0, 7], 20)).unwrap();

    let estimate = estimator.estimate().unwrap();

    TestConfig::noisy(0.1, 0.1, 0.0).check_position(&estimate, &dataset.source_coordinates());
    TestConfig::noisy(0.1, 0.1, 0.0).check_power(&estimate, 15.0);

    let ranging = estimate.ranging.as_ref().unwrap();
    let rssi = estimate.rssi.as_ref().unwrap();

    for outlier in [0, 7] {
        assert!(!ranging.inliers.as_ref().unwrap().is_inlier(outlier));
        assert!(!rssi.inliers.as_ref().unwrap().is_inlier(outlier));
    }

    // position block, then transmitted power: both stages are independent
    let covariance = estimate.covariance.unwrap();
    assert_eq!(covariance.shape(), (3, 3));
    assert_eq!(covariance[(0, 2)], 0.0);
    assert_eq!(covariance[(1, 2)], 0.0);
    assert_eq!(covariance[(2, 0)], 0.0);
    assert_eq!(covariance[(2, 1)], 0.0);

    let position_covariance = estimate.position_covariance.unwrap();
    assert_eq!(covariance[(0, 0)], position_covariance[(0, 0)]);
    assert_eq!(covariance[(0, 1)], position_covariance[(0, 1)]);
    assert_eq!(covariance[(1, 1)], position_covariance[(1, 1)]);
    assert_eq!(
        Some(covariance[(2, 2)]),
        estimate.transmitted_power_variance
    );
}

#[test]
fn separate_ranging_and_rssi_readings() {
    init_logger();

    let ranging = Dataset::new(Vector2::new(3.0, 9.0), ring((0.0, 0.0), 20.0, 6));

    let rssi = Dataset::new(Vector2::new(3.0, 9.0), ring((10.0, -10.0), 35.0, 4))
        .with_power_dbm(-5.0)
        .with_exponent(2.8);

    let mut readings = ranging.ranging(0.0, &[], 21);
    readings.extend(rssi.rssi(0.0, &[], 22));

    let mut estimator =
        RadioSourceEstimator::from_readings(Config::rssi_preset(Method::LMedS), readings).unwrap();

    assert_eq!(estimator.min_readings(), 4);

    let estimate = estimator.estimate().unwrap();

    let cfg = TestConfig::default();
    cfg.check_position(&estimate, &ranging.source_coordinates());
    cfg.check_power(&estimate, -5.0);
    cfg.check_exponent(&estimate, 2.8);

    assert_eq!(estimate.ranging.unwrap().num_inliers, 6);
    assert_eq!(estimate.rssi.unwrap().num_inliers, 4);

    let covariance = estimate.covariance.unwrap();
    assert_eq!(covariance.shape(), (4, 4));
    assert!(estimate.path_loss_exponent_variance.is_some());
}

#[test]
fn few_distances_fall_back_to_rssi() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(2.0, 3.0), ring((0.0, 0.0), 15.0, 6))
        .with_power_dbm(0.0);

    // only two readings carry a distance
    let readings = dataset
        .combined(0.0, &[], 23)
        .into_iter()
        .enumerate()
        .map(|(i, reading)| match reading {
            Reading::RangingAndRssi(r) if i > 1 => {
                RssiReading::new(r.reference, r.rssi_dbm).into()
            },
            reading => reading,
        })
        .collect::<Vec<_>>();

    let mut estimator = RadioSourceEstimator::from_readings(Config::default(), readings).unwrap();
    estimator
        .set_initial_position(Some(Vector2::new(1.0, 1.0)))
        .unwrap();

    let estimate = estimator.estimate().unwrap();

    assert!(estimate.ranging.is_none());
    assert_eq!(estimate.rssi.as_ref().unwrap().num_inliers, 6);

    TestConfig::noisy(1.0E-4, 1.0E-4, 0.0).check_position(&estimate, &dataset.source_coordinates());
}

#[test]
fn refinement_failure_is_not_fatal() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(4.0, -1.0), ring((0.0, 0.0), 25.0, 8));

    let mut cfg = Config::ranging_preset(Method::LMedS);
    cfg.solver.max_iterations = 1;

    let mut estimator =
        RadioSourceEstimator::from_readings(cfg, dataset.ranging(0.1, &[], 24)).unwrap();

    let estimate = estimator.estimate().unwrap();

    let ranging = estimate.ranging.as_ref().unwrap();
    assert!(
        matches!(ranging.refinement, Refinement::Failed(_)),
        "{:?}",
        ranging.refinement
    );

    // unrefined consensus solution
    assert!(estimate.position_covariance.is_none());
    assert!(estimate.covariance.is_none());
    TestConfig::noisy(0.5, 0.0, 0.0).check_position(&estimate, &dataset.source_coordinates());
}

#[test]
fn refinement_not_requested() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(4.0, -1.0), ring((0.0, 0.0), 25.0, 8));

    let mut cfg = Config::ranging_preset(Method::Ransac);
    cfg.refine = false;

    let mut estimator =
        RadioSourceEstimator::from_readings(cfg, dataset.ranging(0.0, &[3], 25)).unwrap();

    let estimate = estimator.estimate().unwrap();

    assert_eq!(
        estimate.ranging.as_ref().unwrap().refinement,
        Refinement::NotRequested
    );
    assert!(estimate.covariance.is_none());
    TestConfig::default().check_position(&estimate, &dataset.source_coordinates());
}

#[test]
fn reference_position_uncertainty() {
    init_logger();

    let dataset = Dataset::new(Vector2::new(1.0, 2.0), ring((0.0, 0.0), 30.0, 6));

    let uncertain = dataset
        .ranging(0.0, &[], 26)
        .into_iter()
        .map(|reading| match reading {
            Reading::Ranging(mut r) => {
                r.reference = ReferencePosition::new(r.reference.position)
                    .with_covariance(Matrix2::new(0.25, 0.0, 0.0, 0.25));
                r.into()
            },
            reading => reading,
        })
        .collect::<Vec<_>>();

    let mut cfg = Config::ranging_preset(Method::LMedS);
    cfg.adjust_covariance = false;

    let mut estimator = RadioSourceEstimator::from_readings(cfg.clone(), uncertain.clone()).unwrap();
    let nominal = estimator.estimate().unwrap();

    cfg.ranging.use_position_covariance = true;
    estimator.set_config(cfg).unwrap();
    let folded = estimator.estimate().unwrap();

    TestConfig::default().check_position(&nominal, &dataset.source_coordinates());
    TestConfig::default().check_position(&folded, &dataset.source_coordinates());

    let nominal = nominal.position_covariance.unwrap();
    let folded = folded.position_covariance.unwrap();

    // uncertain references degrade the position accuracy
    assert!(
        folded.trace() > nominal.trace(),
        "{} should exceed {}",
        folded.trace(),
        nominal.trace()
    );
}
