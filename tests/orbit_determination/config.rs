use crate::{test_environment, test_initial_state};
use std::path::PathBuf;
use tracklink::io::ConfigRepr;
use tracklink::od::prelude::*;

fn config_path(name: &str) -> PathBuf {
    [env!("CARGO_MANIFEST_DIR"), "data", "tests", "config", name]
        .iter()
        .collect()
}

#[test]
fn load_models() {
    let _ = pretty_env_logger::try_init();

    let path = config_path("models.yaml");
    let settings = load_model_settings(path.to_str().unwrap()).unwrap();
    assert_eq!(settings.len(), 5);
    assert_eq!(settings[0].observable, ObservableType::NWayRange);
    assert_eq!(settings[0].link_ends.len(), 3);
    assert_eq!(
        settings[0].corrections,
        vec![CorrectionSettings::FirstOrderRelativistic {
            perturbing_bodies: vec!["Earth".to_string()]
        }]
    );
    assert_eq!(
        settings[1].bias,
        Some(BiasSettings::Constant { offset: vec![0.02] })
    );
    assert_eq!(settings[2].light_time.tolerance_s, 1e-11);
    // Unspecified settings take their defaults
    assert_eq!(settings[2].light_time.max_iterations, 50);
    assert_eq!(settings[3].integration_time_s, Some(60.0));
    assert_eq!(settings[4].observable, ObservableType::NWayRangeRate);
    assert_eq!(settings[4].observable.unit(), "km/s");

    let prop_settings = PropagatorSettings::load(config_path("propagator.yaml")).unwrap();
    assert_eq!(prop_settings.step_s, 20.0);
    let propagator = PointMassPropagator::from_settings(&prop_settings).unwrap();
    assert_eq!(propagator.initial_state(), test_initial_state());

    let manager = OrbitDeterminationManager::from_settings(
        test_environment(),
        &settings,
        Some(Box::new(propagator)),
        vec![ParameterKind::InitialState {
            body: "sat".to_string(),
        }],
    )
    .unwrap();
    assert_eq!(manager.models().len(), 5);
    for model in manager.models().iter() {
        let evaluated = manager
            .evaluate(
                model.observable(),
                model.link_ends(),
                3600.0,
                LinkEndType::Receiver,
            )
            .unwrap();
        assert_eq!(evaluated.jacobian.shape(), (model.observable().size(), 6));
    }
}

#[test]
fn load_estimation_config() {
    let config = EstimationConfig::load(config_path("estimation.yaml")).unwrap();
    assert_eq!(config.solver, Solver::LevenbergMarquardt);
    assert_eq!(config.max_iterations, 20);
    assert_eq!(config.relative_tolerance, 1e-4);
    assert_eq!(config.lm_lambda_init, 1.0);
    assert!(!config.parallel);
    // Defaults
    assert_eq!(config.lm_lambda_increase, 10.0);
    assert!(config.lm_use_diag_scaling);

    let serialized = serde_yaml::to_string(&config).unwrap();
    assert_eq!(EstimationConfig::loads(&serialized).unwrap(), config);
}

#[test]
fn invalid_configs() {
    assert!(EstimationConfig::load(config_path("missing.yaml")).is_err());
    assert!(EstimationConfig::loads("solver: gradient_descent\n").is_err());
    assert!(ObservationModelSettings::loads(
        "observable: one_way_range\nlink_ends:\n  - body: sat\n"
    )
    .map_err(|e| e.to_string())
    .and_then(|settings| {
        ObservationModel::from_settings(&settings, &mut test_environment())
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .is_err());
}
