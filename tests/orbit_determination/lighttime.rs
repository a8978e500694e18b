use crate::test_environment;
use approx::assert_abs_diff_eq;
use rstest::*;
use std::sync::Arc;
use tracklink::io::ConfigError;
use tracklink::linalg::Vector3;
use tracklink::od::prelude::*;

/// The test environment with a probe on a straight line, about a light second and a half away.
#[fixture]
fn env() -> Environment {
    let _ = pretty_env_logger::try_init();
    test_environment().with_body(Body::new(
        "probe",
        0.0,
        Arc::new(LinearEphemeris::new(
            0.0,
            CartesianState::new(4.0e5, 1.0e5, -2.0e4, -1.0, 2.0, 0.5),
        )),
    ))
}

fn one_way() -> LinkEnds {
    LinkEnds::one_way(
        LinkEndId::station("Earth", "DSS-65"),
        LinkEndId::body("probe"),
    )
}

fn two_way() -> LinkEnds {
    LinkEnds::from_path(vec![
        LinkEndId::station("Earth", "DSS-65"),
        LinkEndId::body("probe"),
        LinkEndId::station("Earth", "DSS-14"),
    ])
    .unwrap()
}

#[rstest]
#[case(LegAnchor::Receiver)]
#[case(LegAnchor::Transmitter)]
fn light_time_matches_endpoints(env: Environment, #[case] anchor: LegAnchor) {
    let calculator = LightTimeCalculator::new(
        LinkEndId::station("Earth", "DSS-65"),
        LinkEndId::body("probe"),
    );
    for epoch_s in [0.0, 600.0, 3600.0] {
        let solution = calculator.solve(epoch_s, anchor, &env).unwrap();
        let leg = &solution.endpoints;
        // Converged to 1e-12 s, i.e. less than a meter
        assert_abs_diff_eq!(
            solution.light_time_s * SPEED_OF_LIGHT_KM_S,
            leg.range_km(),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            leg.reception_epoch_s - leg.transmission_epoch_s,
            solution.light_time_s,
            epsilon = 1e-9
        );
        match anchor {
            LegAnchor::Receiver => assert_eq!(leg.reception_epoch_s, epoch_s),
            LegAnchor::Transmitter => assert_eq!(leg.transmission_epoch_s, epoch_s),
        }
        // Both endpoints were evaluated at their own time
        assert_eq!(
            leg.receiver,
            env.link_end_state(&LinkEndId::body("probe"), leg.reception_epoch_s)
                .unwrap()
        );
        assert!(solution.iterations > 1);
    }
}

#[rstest]
fn constant_delay(mut env: Environment) {
    let delay = env.register_correction(Arc::new(ConstantDelay { delay_s: 1e-3 }));
    let geometric = LightTimeCalculator::new(LinkEndId::body("Earth"), LinkEndId::body("probe"));
    let delayed = geometric.clone().with_corrections(vec![delay]);

    let solution = delayed.solve(100.0, LegAnchor::Receiver, &env).unwrap();
    assert_abs_diff_eq!(
        solution.light_time_s,
        solution.endpoints.range_km() / SPEED_OF_LIGHT_KM_S + 1e-3,
        epsilon = 1e-11
    );
    // The delay moves the transmission earlier, so the probe was slightly elsewhere
    let reference = geometric.solve(100.0, LegAnchor::Receiver, &env).unwrap();
    assert!(solution.endpoints.transmission_epoch_s < reference.endpoints.transmission_epoch_s);
}

#[rstest]
fn non_convergence(env: Environment) {
    let calculator = LightTimeCalculator::new(LinkEndId::body("Earth"), LinkEndId::body("probe"))
        .with_convergence(
            LightTimeConvergence::builder()
                .max_iterations(1)
                .tolerance_s(1e-15)
                .build(),
        );
    // The moving body is the free end, so a single iteration cannot settle the light time
    let err = calculator.solve(0.0, LegAnchor::Transmitter, &env).unwrap_err();
    assert!(matches!(err, ODError::NonConvergence { iterations: 1, .. }), "{err}");
    assert!(err.is_epoch_recoverable());
}

#[rstest]
#[case(ObservableType::OneWayRange, one_way(), LinkEndType::Receiver)]
#[case(ObservableType::OneWayRange, one_way(), LinkEndType::Transmitter)]
#[case(ObservableType::AngularPosition, one_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Retransmitter(1))]
#[case(ObservableType::NWayRange, two_way(), LinkEndType::Transmitter)]
#[case(ObservableType::OneWayDifferencedRange, one_way(), LinkEndType::Receiver)]
#[case(ObservableType::NWayDifferencedRange, two_way(), LinkEndType::Receiver)]
#[case(ObservableType::OneWayRangeRate, one_way(), LinkEndType::Transmitter)]
#[case(ObservableType::NWayRangeRate, two_way(), LinkEndType::Retransmitter(1))]
fn ideal_matches_link_end_data(
    mut env: Environment,
    #[case] observable: ObservableType,
    #[case] link_ends: LinkEnds,
    #[case] anchor: LinkEndType,
) {
    let mut settings = ObservationModelSettings::builder()
        .observable(observable)
        .link_ends(link_ends)
        .corrections(vec![CorrectionSettings::FirstOrderRelativistic {
            perturbing_bodies: vec!["Earth".to_string()],
        }])
        .build();
    if observable.is_differenced() {
        settings.integration_time_s = Some(60.0);
    }
    let model = ObservationModel::from_settings(&settings, &mut env).unwrap();

    let ideal = model.compute_ideal_observation(1000.0, anchor, &env).unwrap();
    let (with_data, data) = model
        .compute_ideal_observation_with_link_end_data(1000.0, anchor, &env)
        .unwrap();
    assert_eq!(ideal, with_data);
    assert_eq!(ideal.len(), observable.size());

    let legs = model.legs().len() * if observable.is_differenced() { 2 } else { 1 };
    assert_eq!(data.len(), 2 * legs);
    assert_eq!(data.epochs_s.len(), data.states.len());
    // Signal flow order: every leg is received after it is transmitted
    for leg in 0..data.leg_count() {
        let endpoints = data.leg_at(2 * leg).unwrap();
        assert!(endpoints.reception_epoch_s > endpoints.transmission_epoch_s);
    }
}

#[rstest]
fn two_way_range_with_delay(mut env: Environment) {
    let delay_s = 0.25;
    let settings = ObservationModelSettings::builder()
        .observable(ObservableType::NWayRange)
        .link_ends(two_way())
        .retransmission_delays_s(vec![delay_s])
        .build();
    let model = ObservationModel::from_settings(&settings, &mut env).unwrap();

    let mut previous: Option<f64> = None;
    for anchor in [
        LinkEndType::Receiver,
        LinkEndType::Retransmitter(1),
        LinkEndType::Transmitter,
    ] {
        let (range, data) = model
            .compute_ideal_observation_with_link_end_data(2000.0, anchor, &env)
            .unwrap();
        let up = data.leg_at(0).unwrap();
        let down = data.leg_at(2).unwrap();
        // The retransmitter waits before sending the signal back down
        assert_abs_diff_eq!(
            down.transmission_epoch_s - up.reception_epoch_s,
            delay_s,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            range[0],
            up.range_km() + down.range_km() + delay_s * SPEED_OF_LIGHT_KM_S,
            epsilon = 1e-5
        );
        match anchor {
            LinkEndType::Receiver => assert_eq!(down.reception_epoch_s, 2000.0),
            LinkEndType::Transmitter => assert_eq!(up.transmission_epoch_s, 2000.0),
            _ => assert_eq!(up.reception_epoch_s, 2000.0),
        }
        // Different anchors observe signals a few seconds apart
        if let Some(prev) = previous {
            assert!((range[0] - prev).abs() < 50.0);
        }
        previous = Some(range[0]);
    }
}

#[rstest]
fn differenced_range_is_range_change(mut env: Environment) {
    let dt = 60.0;
    let mut models = ObservationModelSet::from_settings(
        &[
            ObservationModelSettings::builder()
                .observable(ObservableType::OneWayRange)
                .link_ends(one_way())
                .build(),
            ObservationModelSettings::builder()
                .observable(ObservableType::OneWayDifferencedRange)
                .link_ends(one_way())
                .integration_time_s(dt)
                .build(),
        ],
        &mut env,
    )
    .unwrap();
    let range = models.get(ObservableType::OneWayRange, &one_way()).unwrap();
    let at = |t: f64| {
        range
            .compute_observation(t, LinkEndType::Receiver, &env)
            .unwrap()[0]
    };
    let differenced = models
        .get(ObservableType::OneWayDifferencedRange, &one_way())
        .unwrap()
        .compute_observation(500.0, LinkEndType::Receiver, &env)
        .unwrap();
    assert_abs_diff_eq!(differenced[0], at(500.0) - at(500.0 - dt), epsilon = 1e-9);

    // The range rate is the same change over the integration time
    models.insert(
        ObservationModel::from_settings(
            &ObservationModelSettings::builder()
                .observable(ObservableType::OneWayRangeRate)
                .link_ends(one_way())
                .integration_time_s(dt)
                .build(),
            &mut env,
        )
        .unwrap(),
    );
    let rate = models
        .get(ObservableType::OneWayRangeRate, &one_way())
        .unwrap()
        .compute_observation(500.0, LinkEndType::Receiver, &env)
        .unwrap();
    assert_abs_diff_eq!(rate[0], differenced[0] / dt, epsilon = 1e-12);
    // Bounded by the speeds of both link ends
    assert!(rate[0].abs() < 3.0, "{}", rate[0]);

    // Without an integration time, the differenced model cannot be built
    let err = ObservationModel::from_settings(
        &ObservationModelSettings::builder()
            .observable(ObservableType::NWayDifferencedRange)
            .link_ends(two_way())
            .build(),
        &mut env,
    );
    assert!(err.is_err());

    // Replacing a model keeps one model per observable and link ends
    let replaced = models.insert(
        ObservationModel::from_settings(
            &ObservationModelSettings::builder()
                .observable(ObservableType::OneWayRange)
                .link_ends(one_way())
                .build(),
            &mut env,
        )
        .unwrap(),
    );
    assert!(replaced.is_some());
    assert_eq!(models.len(), 3);
}

#[rstest]
fn unused_settings_rejected(mut env: Environment) {
    let invalid = |settings: ObservationModelSettings, env: &mut Environment| {
        match ObservationModel::from_settings(&settings, env) {
            Err(ODError::ODConfigError {
                source: ConfigError::InvalidConfig { msg },
            }) => msg,
            other => panic!("expected an invalid configuration, got {other:?}"),
        }
    };

    // A one way link has no retransmitter
    let msg = invalid(
        ObservationModelSettings::builder()
            .observable(ObservableType::OneWayRange)
            .link_ends(one_way())
            .retransmission_delays_s(vec![1e-3])
            .build(),
        &mut env,
    );
    assert!(msg.contains("retransmitter"), "{msg}");

    // Only differenced observables integrate
    for (observable, link_ends) in [
        (ObservableType::NWayRange, two_way()),
        (ObservableType::AngularPosition, one_way()),
    ] {
        let msg = invalid(
            ObservationModelSettings::builder()
                .observable(observable)
                .link_ends(link_ends)
                .integration_time_s(60.0)
                .build(),
            &mut env,
        );
        assert!(msg.contains("integration time"), "{msg}");
    }

    // A range rate needs a positive integration time
    let msg = invalid(
        ObservationModelSettings::builder()
            .observable(ObservableType::NWayRangeRate)
            .link_ends(two_way())
            .integration_time_s(0.0)
            .build(),
        &mut env,
    );
    assert!(msg.contains("positive"), "{msg}");

    // but takes retransmission delays like the n-way range it differences
    assert!(ObservationModel::from_settings(
        &ObservationModelSettings::builder()
            .observable(ObservableType::NWayRangeRate)
            .link_ends(two_way())
            .retransmission_delays_s(vec![1e-3])
            .integration_time_s(10.0)
            .build(),
        &mut env,
    )
    .is_ok());
}

#[rstest]
fn angular_position_points_at_transmitter(mut env: Environment) {
    let settings = ObservationModelSettings::builder()
        .observable(ObservableType::AngularPosition)
        .link_ends(LinkEnds::one_way(
            LinkEndId::body("probe"),
            LinkEndId::body("Earth"),
        ))
        .build();
    let model = ObservationModel::from_settings(&settings, &mut env).unwrap();
    let (angles, data) = model
        .compute_ideal_observation_with_link_end_data(0.0, LinkEndType::Receiver, &env)
        .unwrap();
    let leg = data.leg_at(0).unwrap();
    let los: Vector3<f64> = position(&leg.transmitter) - position(&leg.receiver);
    let (ra, dec) = (angles[0], angles[1]);
    let unit = Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin());
    assert_abs_diff_eq!(unit, los.normalize(), epsilon = 1e-12);
}
