use crate::{test_environment, test_initial_state, test_propagator};
use approx::assert_abs_diff_eq;
use rstest::*;
use tracklink::linalg::{DMatrix, DVector};
use tracklink::od::prelude::*;

fn station(name: &str) -> LinkEndId {
    LinkEndId::station("Earth", name)
}

fn sat() -> LinkEndId {
    LinkEndId::body("sat")
}

fn uplink() -> LinkEnds {
    LinkEnds::one_way(station("DSS-65"), sat())
}

fn downlink() -> LinkEnds {
    LinkEnds::one_way(sat(), station("DSS-65"))
}

fn two_way() -> LinkEnds {
    LinkEnds::from_path(vec![station("DSS-65"), sat(), station("DSS-14")]).unwrap()
}

/// Relayed by the spacecraft, then by a transponder on the Moon.
fn relayed() -> LinkEnds {
    LinkEnds::from_path(vec![
        station("DSS-65"),
        sat(),
        LinkEndId::body("Moon"),
        station("DSS-14"),
    ])
    .unwrap()
}

fn shapiro() -> Vec<CorrectionSettings> {
    vec![CorrectionSettings::FirstOrderRelativistic {
        perturbing_bodies: vec!["Earth".to_string()],
    }]
}

fn gm(body: &str) -> ParameterKind {
    ParameterKind::GravitationalParameter {
        body: body.to_string(),
    }
}

/// Every observable between the DSS-65 and DSS-14 stations and a spacecraft in Earth orbit, and a
/// range relayed through the Moon. The parameters are the initial state, both gravitational
/// parameters, a station position, PPN gamma, and the biases of the one way and the two way
/// ranges.
#[fixture]
fn manager() -> OrbitDeterminationManager {
    let _ = pretty_env_logger::try_init();

    let mut env = test_environment();
    let settings = vec![
        ObservationModelSettings::builder()
            .observable(ObservableType::OneWayRange)
            .link_ends(uplink())
            .corrections(shapiro())
            .bias(BiasSettings::Constant { offset: vec![0.01] })
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayRange)
            .link_ends(two_way())
            .corrections(shapiro())
            .bias(BiasSettings::Relative {
                factor: vec![1e-3],
            })
            .retransmission_delays_s(vec![1e-3])
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::AngularPosition)
            .link_ends(downlink())
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::OneWayDifferencedRange)
            .link_ends(downlink())
            .integration_time_s(60.0)
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayDifferencedRange)
            .link_ends(two_way())
            .corrections(shapiro())
            .integration_time_s(60.0)
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::OneWayRangeRate)
            .link_ends(downlink())
            .integration_time_s(60.0)
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayRangeRate)
            .link_ends(two_way())
            .corrections(shapiro())
            .retransmission_delays_s(vec![1e-3])
            .integration_time_s(10.0)
            .build(),
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayRange)
            .link_ends(relayed())
            .corrections(shapiro())
            .retransmission_delays_s(vec![1e-3, 2e-3])
            .build(),
    ];
    let models = ObservationModelSet::from_settings(&settings, &mut env).unwrap();
    let constant = models
        .get(ObservableType::OneWayRange, &uplink())
        .unwrap()
        .bias()
        .unwrap();
    let relative = models
        .get(ObservableType::NWayRange, &two_way())
        .unwrap()
        .bias()
        .unwrap();

    OrbitDeterminationManager::new(
        env,
        models,
        Some(Box::new(test_propagator(test_initial_state()))),
        vec![
            ParameterKind::InitialState {
                body: "sat".to_string(),
            },
            gm("Earth"),
            gm("Moon"),
            ParameterKind::StationPosition {
                body: "Earth".to_string(),
                station: "DSS-65".to_string(),
            },
            ParameterKind::PpnGamma,
            ParameterKind::ConstantBias { bias: constant },
            ParameterKind::RelativeBias { bias: relative },
        ],
    )
    .unwrap()
}

/// Central difference steps of each column of the manager's parameters.
fn steps() -> Vec<f64> {
    vec![
        1e-3, 1e-3, 1e-3, 1e-6, 1e-6, 1e-6, // initial state
        1.0,  // Earth GM
        1.0,  // Moon GM
        1e-3, 1e-3, 1e-3, // station
        1.0,  // PPN gamma
        1e-3, // constant bias
        1e-6, // relative bias
    ]
}

/// Compares each column with a relative tolerance, and an absolute floor for the columns which
/// are at the level of the numerical noise of the central differences.
fn assert_columns_match(analytic: &DMatrix<f64>, numerical: &DMatrix<f64>, names: &[String]) {
    assert_eq!(analytic.shape(), numerical.shape());
    for (j, name) in names.iter().enumerate() {
        let a = analytic.column(j);
        let n = numerical.column(j);
        let error = (a - n).norm();
        assert!(
            error <= 1e-4 * n.norm() + 1e-7,
            "{name}: analytic {a:?} vs numerical {n:?} (error {error:e})"
        );
    }
}

#[rstest]
#[case(ObservableType::OneWayRange, uplink(), LinkEndType::Receiver)]
#[case(ObservableType::OneWayRange, uplink(), LinkEndType::Transmitter)]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Retransmitter(1))]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Transmitter)]
#[case(ObservableType::AngularPosition, downlink(), LinkEndType::Receiver)]
#[case(ObservableType::AngularPosition, downlink(), LinkEndType::Transmitter)]
#[case(ObservableType::OneWayDifferencedRange, downlink(), LinkEndType::Receiver)]
#[case(ObservableType::NWayDifferencedRange, two_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayDifferencedRange, two_way(), LinkEndType::Retransmitter(1))]
#[case(ObservableType::OneWayRangeRate, downlink(), LinkEndType::Receiver)]
#[case(ObservableType::OneWayRangeRate, downlink(), LinkEndType::Transmitter)]
#[case(ObservableType::NWayRangeRate, two_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayRangeRate, two_way(), LinkEndType::Transmitter)]
#[case(ObservableType::NWayRange, relayed(), LinkEndType::Receiver)]
#[case(ObservableType::NWayRange, relayed(), LinkEndType::Retransmitter(1))]
#[case(ObservableType::NWayRange, relayed(), LinkEndType::Retransmitter(2))]
#[case(ObservableType::NWayRange, relayed(), LinkEndType::Transmitter)]
fn analytic_matches_central_difference(
    mut manager: OrbitDeterminationManager,
    #[case] observable: ObservableType,
    #[case] link_ends: LinkEnds,
    #[case] anchor: LinkEndType,
) {
    let names = manager.parameters().column_names();
    let nominal = manager.parameter_values().unwrap();
    for epoch_s in [1800.0, 5400.0] {
        let evaluated = manager
            .evaluate(observable, &link_ends, epoch_s, anchor)
            .unwrap();
        let numerical = manager
            .central_difference(observable, &link_ends, epoch_s, anchor, &steps())
            .unwrap();
        assert_columns_match(&evaluated.jacobian, &numerical, &names);

        // The nominal parameters and trajectory are restored
        assert_eq!(manager.parameter_values().unwrap(), nominal);
        let again = manager
            .evaluate(observable, &link_ends, epoch_s, anchor)
            .unwrap();
        assert_eq!(again.value, evaluated.value);
    }
}

#[rstest]
fn unrelated_parameters(manager: OrbitDeterminationManager) {
    let evaluated = manager
        .evaluate(ObservableType::OneWayRange, &uplink(), 3600.0, LinkEndType::Receiver)
        .unwrap();
    assert_eq!(evaluated.partials.len(), manager.parameters().len());

    // The Moon does not attract the spacecraft and does not delay the signal
    let moon = evaluated
        .partials
        .iter()
        .find(|p| p.parameter == gm("Moon"))
        .unwrap();
    assert_eq!(moon.total(), DMatrix::zeros(1, 1));

    // The bias of the two way range does not change the one way range
    let offset = manager.parameters().offset_of(&gm("Moon")).unwrap();
    let rel_col = manager.parameters().size() - 1;
    assert_eq!(evaluated.jacobian[(0, offset)], 0.0);
    assert_eq!(evaluated.jacobian[(0, rel_col)], 0.0);
    // but its own constant bias does, one for one
    assert_eq!(evaluated.jacobian[(0, rel_col - 1)], 1.0);
    assert_abs_diff_eq!(evaluated.value[0], evaluated.ideal[0] + 0.01, epsilon = 1e-12);
}

#[rstest]
fn partial_entries_at_link_end_times(manager: OrbitDeterminationManager) {
    let evaluated = manager
        .evaluate(ObservableType::NWayRange, &two_way(), 3600.0, LinkEndType::Receiver)
        .unwrap();
    let data = &evaluated.data;
    assert_eq!(data.len(), 4);

    let state = evaluated
        .partials
        .iter()
        .find(|p| matches!(p.parameter, ParameterKind::InitialState { .. }))
        .unwrap();
    // The spacecraft receives the uplink, then retransmits after its delay
    let epochs: Vec<f64> = state.entries.iter().map(|e| e.epoch_s).collect();
    assert_eq!(epochs, vec![data.epochs_s[1], data.epochs_s[2]]);
    assert_abs_diff_eq!(data.epochs_s[2] - data.epochs_s[1], 1e-3, epsilon = 1e-9);

    // The relative bias partial is the ideal observation
    let relative = evaluated.partials.last().unwrap();
    assert_eq!(relative.total()[(0, 0)], evaluated.ideal[0]);
    assert_abs_diff_eq!(
        evaluated.value[0],
        evaluated.ideal[0] * (1.0 + 1e-3),
        epsilon = 1e-6
    );
}

#[rstest]
fn scaling_from_model_data(manager: OrbitDeterminationManager) {
    let env = manager.environment();
    for (observable, link_ends) in [
        (ObservableType::OneWayRange, uplink()),
        (ObservableType::AngularPosition, downlink()),
    ] {
        let model = manager.models().get(observable, &link_ends).unwrap();
        for fixed in [LinkEndType::Receiver, LinkEndType::Transmitter] {
            let (ideal, data) = model
                .compute_ideal_observation_with_link_end_data(2000.0, fixed, env)
                .unwrap();
            let mut scaling = PositionPartialScaling::for_observable(observable);
            scaling.update(&data, fixed, &ideal).unwrap();
            let first = scaling.clone();
            scaling.update(&data, fixed, &ideal).unwrap();
            assert_eq!(first, scaling);

            let tx = scaling
                .scaling_factor(LinkEndType::Transmitter, fixed)
                .unwrap();
            let rx = scaling.scaling_factor(LinkEndType::Receiver, fixed).unwrap();
            assert_eq!(rx, -tx);
            assert_eq!(rx.shape(), (observable.size(), 3));

            // The receiver sees the transmitter move away along the line of sight
            if observable == ObservableType::OneWayRange {
                let leg = data.leg_at(0).unwrap();
                let los = (position(&leg.receiver) - position(&leg.transmitter)).normalize();
                let projected = (&rx * DVector::from_column_slice(los.as_slice()))[0];
                assert!((projected - 1.0).abs() < 1e-4);
            }
        }
    }
}
