use crate::{test_environment, test_initial_state, test_propagator};
use approx::assert_abs_diff_eq;
use indexmap::IndexMap;
use rstest::*;
use std::sync::atomic::Ordering;
use tracklink::linalg::{DMatrix, DVector};
use tracklink::od::prelude::*;

fn two_way(station: &str) -> LinkEnds {
    let ground = LinkEndId::station("Earth", station);
    LinkEnds::from_path(vec![ground.clone(), LinkEndId::body("sat"), ground]).unwrap()
}

fn downlink() -> LinkEnds {
    LinkEnds::one_way(LinkEndId::body("sat"), LinkEndId::station("Earth", "DSS-65"))
}

fn sat_state() -> ParameterKind {
    ParameterKind::InitialState {
        body: "sat".to_string(),
    }
}

/// Two way ranges from the three stations, the DSS-34 ones with a constant bias of 20 m, and
/// angular positions seen from DSS-65.
fn manager_with(
    parameters: impl FnOnce(BiasId) -> Vec<ParameterKind>,
) -> OrbitDeterminationManager {
    let _ = pretty_env_logger::try_init();

    let mut env = test_environment();
    let mut settings: Vec<ObservationModelSettings> = ["DSS-14", "DSS-65"]
        .iter()
        .map(|station| {
            ObservationModelSettings::builder()
                .observable(ObservableType::NWayRange)
                .link_ends(two_way(station))
                .build()
        })
        .collect();
    settings.push(
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayRange)
            .link_ends(two_way("DSS-34"))
            .bias(BiasSettings::Constant { offset: vec![0.02] })
            .build(),
    );
    settings.push(
        ObservationModelSettings::builder()
            .observable(ObservableType::AngularPosition)
            .link_ends(downlink())
            .build(),
    );
    let models = ObservationModelSet::from_settings(&settings, &mut env).unwrap();
    let bias = models
        .get(ObservableType::NWayRange, &two_way("DSS-34"))
        .unwrap()
        .bias()
        .unwrap();

    OrbitDeterminationManager::new(
        env,
        models,
        Some(Box::new(test_propagator(test_initial_state()))),
        parameters(bias),
    )
    .unwrap()
}

fn requests(noisy: bool) -> Vec<ObservationSimulationSettings> {
    let epochs = uniform_epochs(
        Epoch::from_tdb_seconds(300.0),
        Epoch::from_tdb_seconds(7000.0),
        2 * Unit::Minute,
    );
    let mut requests: Vec<ObservationSimulationSettings> = ["DSS-14", "DSS-34", "DSS-65"]
        .iter()
        .map(|station| {
            ObservationSimulationSettings::builder()
                .observable(ObservableType::NWayRange)
                .link_ends(two_way(station))
                .epochs(epochs.clone())
                .noise_sigma(if noisy { vec![1e-3] } else { vec![] })
                .build()
        })
        .collect();
    requests.push(
        ObservationSimulationSettings::builder()
            .observable(ObservableType::AngularPosition)
            .link_ends(downlink())
            .epochs(epochs)
            .noise_sigma(if noisy { vec![1e-6, 1e-6] } else { vec![] })
            .build(),
    );
    requests
}

/// Offset of about 1 km and 1 m/s from the true initial state.
fn perturbed(truth: &DVector<f64>) -> DVector<f64> {
    let mut values = truth.clone();
    for (i, delta) in [1.0, -0.5, 0.3, 1e-3, -5e-4, 2e-4].iter().enumerate() {
        values[i] += delta;
    }
    values
}

#[test]
fn recover_state_and_bias() {
    let mut manager = manager_with(|bias| vec![sat_state(), ParameterKind::ConstantBias { bias }]);
    let truth = manager.parameter_values().unwrap();
    assert_eq!(truth.len(), 7);
    assert_eq!(truth[6], 0.02);

    let mut observations = manager
        .simulate_observations(&requests(false), &mut ObservationSimulator::with_seed(0))
        .unwrap();
    let simulated = observations.len();
    assert_eq!(simulated, 4 * 56);
    // After the end of the trajectory, so it cannot be computed
    observations.push(ObservationRecord::new(
        ObservableType::NWayRange,
        two_way("DSS-14"),
        Epoch::from_tdb_seconds(8000.0),
        LinkEndType::Receiver,
        DVector::from_element(1, 1.0e4),
    ));

    let mut start = perturbed(&truth);
    start[6] = 0.0;
    manager.set_parameter_values(&start).unwrap();
    let config = EstimationConfig::builder().absolute_tolerance(1e-7).build();
    let output = manager
        .estimate(
            &EstimationInput::builder().observations(observations).build(),
            &config,
        )
        .unwrap();
    println!("{output}");

    assert!(output.converged(), "{}", output.termination);
    assert!(output.result().is_ok());
    assert!(output.iterations.len() <= config.max_iterations + 1);
    assert_eq!(output.valid.len(), simulated + 1);
    assert_eq!(output.valid_count(), simulated);
    assert!(!output.valid[simulated]);
    assert!(output.residuals[simulated].is_none());
    assert!(output.rms < 1e-7);
    assert_eq!(output.column_names.len(), 7);

    assert_abs_diff_eq!(output.values.rows(0, 3), truth.rows(0, 3), epsilon = 1e-4);
    assert_abs_diff_eq!(output.values.rows(3, 3), truth.rows(3, 3), epsilon = 1e-7);
    assert_abs_diff_eq!(output.values[6], 0.02, epsilon = 1e-5);
    // The manager holds the estimate
    assert_eq!(manager.parameter_values().unwrap(), output.values);
    assert!(output.covariance.is_some());

    // Each iteration records the parameters it linearized about
    assert_eq!(output.iterations[0].values, start);
    assert!(output.iterations[0].correction.is_some());
    assert!(output.iterations[0].rms > output.rms);
}

#[rstest]
#[case(Solver::NormalEquations)]
#[case(Solver::LevenbergMarquardt)]
fn noisy_observations(#[case] solver: Solver) {
    let mut manager = manager_with(|_| vec![sat_state()]);
    let truth = manager.parameter_values().unwrap();
    let observations = manager
        .simulate_observations(&requests(true), &mut ObservationSimulator::with_seed(1))
        .unwrap();

    manager.set_parameter_values(&perturbed(&truth)).unwrap();
    let mut weights = IndexMap::new();
    weights.insert(ObservableType::NWayRange, 1e6);
    weights.insert(ObservableType::AngularPosition, 1e12);
    // Only the DSS-34 ranges are biased, and the bias is not estimated: leave them out
    let observations = ObservationCollection::new(
        observations
            .iter()
            .filter(|r| r.link_ends != two_way("DSS-34"))
            .cloned()
            .collect(),
    );
    let input = EstimationInput::builder()
        .observations(observations)
        .weights(weights)
        .build();
    let config = EstimationConfig::builder()
        .solver(solver)
        .max_iterations(30)
        .parallel(solver == Solver::NormalEquations)
        .build();
    let output = manager.estimate(&input, &config).unwrap();
    println!("{output}");

    assert!(output.converged(), "{}", output.termination);
    // Weighted residuals are unit-less and of the order of one
    assert!(output.rms > 0.5 && output.rms < 2.0, "RMS {}", output.rms);
    let sigmas = output.sigmas().unwrap();
    for i in 0..6 {
        assert!(
            (output.values[i] - truth[i]).abs() < 5.0 * sigmas[i],
            "{}: error {:e}, sigma {:e}",
            output.column_names[i],
            output.values[i] - truth[i],
            sigmas[i]
        );
    }
    if solver == Solver::LevenbergMarquardt {
        assert!(output.iterations.iter().any(|it| it.lambda.is_some()));
    }
}

#[test]
fn degenerate_parameters() {
    // Nothing observes the gravitational parameter of the Moon
    let mut manager = manager_with(|_| {
        vec![
            sat_state(),
            ParameterKind::GravitationalParameter {
                body: "Moon".to_string(),
            },
        ]
    });
    let truth = manager.parameter_values().unwrap();
    let observations = manager
        .simulate_observations(&requests(false), &mut ObservationSimulator::with_seed(0))
        .unwrap();
    let initial = perturbed(&truth);
    manager.set_parameter_values(&initial).unwrap();

    let output = manager
        .estimate(
            &EstimationInput::builder().observations(observations).build(),
            &EstimationConfig::default(),
        )
        .unwrap();
    assert!(matches!(output.termination, Termination::Degenerate { .. }));
    assert!(matches!(
        output.result(),
        Err(ODError::EstimationDegenerate { .. })
    ));
    assert_eq!(output.values, initial);
    assert!(output.covariance.is_none());
    assert_eq!(output.iterations.len(), 1);
}

#[test]
fn apriori_constraint() {
    let mut manager = manager_with(|_| vec![sat_state()]);
    let truth = manager.parameter_values().unwrap();
    let observations = manager
        .simulate_observations(&requests(false)[..1], &mut ObservationSimulator::with_seed(0))
        .unwrap();
    let start = perturbed(&truth);
    manager.set_parameter_values(&start).unwrap();

    // A very tight a priori keeps the state where it is
    let input = EstimationInput::builder()
        .observations(observations.clone())
        .inverse_apriori_covariance(DMatrix::identity(6, 6) * 1e16)
        .build();
    let output = manager.estimate(&input, &EstimationConfig::default()).unwrap();
    assert!(output.converged());
    assert_abs_diff_eq!(output.values, start, epsilon = 1e-6);

    // A priori of the wrong size
    let input = EstimationInput::builder()
        .observations(observations)
        .inverse_apriori_covariance(DMatrix::identity(3, 3))
        .build();
    assert!(matches!(
        manager.estimate(&input, &EstimationConfig::default()),
        Err(ODError::DimensionMismatch { .. })
    ));
}

#[test]
fn too_few_observations() {
    let mut manager = manager_with(|_| vec![sat_state()]);
    let input = EstimationInput::builder()
        .observations(ObservationCollection::default())
        .build();
    assert!(matches!(
        manager.estimate(&input, &EstimationConfig::default()),
        Err(ODError::TooFewMeasurements { .. })
    ));

    // Three ranges cannot determine six parameters
    let mut request = requests(false).remove(0);
    request.epochs.truncate(3);
    let observations = manager
        .simulate_observations(&[request], &mut ObservationSimulator::with_seed(0))
        .unwrap();
    let input = EstimationInput::builder().observations(observations).build();
    assert!(matches!(
        manager.estimate(&input, &EstimationConfig::default()),
        Err(ODError::TooFewMeasurements { need: 6, .. })
    ));
}

#[test]
fn cancelled_between_iterations() {
    let mut manager = manager_with(|_| vec![sat_state()]);
    let truth = manager.parameter_values().unwrap();
    let observations = manager
        .simulate_observations(&requests(false), &mut ObservationSimulator::with_seed(0))
        .unwrap();
    let start = perturbed(&truth);
    manager.set_parameter_values(&start).unwrap();

    // The first iteration always runs
    manager.cancel_handle().store(true, Ordering::Relaxed);
    let output = manager
        .estimate(
            &EstimationInput::builder().observations(observations).build(),
            &EstimationConfig::default(),
        )
        .unwrap();
    assert_eq!(output.termination, Termination::Cancelled);
    assert_eq!(output.iterations.len(), 1);
    // Back to the parameters of the last residuals
    assert_eq!(output.values, start);
    assert_eq!(manager.parameter_values().unwrap(), start);
}

#[test]
fn failed_iteration_keeps_last_estimate() {
    let mut manager = manager_with(|_| vec![sat_state()]);
    let truth = manager.parameter_values().unwrap();
    let epochs = uniform_epochs(
        Epoch::from_tdb_seconds(2.0),
        Epoch::from_tdb_seconds(61.0),
        1 * Unit::Second,
    );
    let requests: Vec<ObservationSimulationSettings> = ["DSS-14", "DSS-65"]
        .iter()
        .map(|station| {
            ObservationSimulationSettings::builder()
                .observable(ObservableType::NWayRange)
                .link_ends(two_way(station))
                .epochs(epochs.clone())
                .build()
        })
        .collect();
    let simulated = manager
        .simulate_observations(&requests, &mut ObservationSimulator::with_seed(0))
        .unwrap();
    // Ranges this far off move the spacecraft so far that, after the first correction, no
    // observation near the start of the trajectory can be computed anymore
    let observations = ObservationCollection::new(
        simulated
            .iter()
            .map(|record| {
                let mut record = record.clone();
                record.value[0] += 3e7;
                record
            })
            .collect(),
    );
    let count = observations.len();

    let output = manager
        .estimate(
            &EstimationInput::builder().observations(observations).build(),
            &EstimationConfig::default(),
        )
        .unwrap();
    println!("{output}");

    assert!(
        matches!(output.termination, Termination::Failed { .. }),
        "{}",
        output.termination
    );
    assert!(!output.converged());
    assert!(output.termination.to_string().starts_with("failed"));
    // Everything reported comes from the last iteration that could be computed
    let last = output.iterations.last().unwrap();
    assert!(last.correction.is_some());
    assert_eq!(output.values, last.values);
    assert_eq!(output.iterations[0].values, truth);
    assert_eq!(output.valid.len(), count);
    assert_eq!(output.residuals.len(), count);
    assert!(output.valid_count() > 0);
    // The manager does not keep the step which could not be computed
    assert_eq!(manager.parameter_values().unwrap(), output.values);
}
