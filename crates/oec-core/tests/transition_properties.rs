use oec_core::*;
use proptest::prelude::*;

fn platform_model() -> DiscretizedModel<PlatformDynamics> {
    let config = ClusterConfig::default();
    let spec = DynamicsSpec::new(platform_dynamics(&config.gtg, &config.pump)).unwrap();
    DiscretizedModel::new(spec, config.platform.horizon, config.platform.steps, config.platform.finite_elements)
        .unwrap()
}

fn wind_farm_model() -> DiscretizedModel<WindFarmDynamics> {
    let config = ClusterConfig::default();
    let wf = &config.wind_farm;
    let dynamics = WindFarmDynamics::new(&config.wind, &config.battery, config.grid.base_kw, wf.time_unit_h);
    DiscretizedModel::new(DynamicsSpec::new(dynamics).unwrap(), wf.horizon, wf.steps, wf.finite_elements).unwrap()
}

#[test]
fn test_zero_control_platform_settles_toward_valve() {
    // valves held open with u = 0: fuel and load creep toward the valve position
    let model = platform_model();
    let mut x = vec![0.0; 8];
    x[PlatformState::Valve1.index()] = 0.8;
    let traj = model.rollout(&x, &vec![vec![0.0; 3]; 20], &[]).unwrap();
    let last = traj.last().unwrap();
    assert!((last[PlatformState::Fuel1.index()] - 0.8).abs() < 1e-6);
    assert!((last[PlatformState::Load1.index()] - 0.8).abs() < 1e-4);
    assert_eq!(last[PlatformState::Load2.index()], 0.0);
}

#[test]
fn test_wind_farm_available_power_converges_to_curve() {
    let model = wind_farm_model();
    let target = model.spec().model().available_power(12.0);
    let traj = model.rollout(&[0.0; 7], &vec![vec![0.0; 5]; 20], &[vec![12.0]]).unwrap();
    let reached = traj.last().unwrap()[WindFarmState::Available.index()];
    assert!((reached - target).abs() < 1e-6, "reached {reached}, target {target}");
}

#[test]
fn test_checked_step_rejects_wrong_lengths() {
    let model = platform_model();
    let err = model.step_checked(&[0.0; 7], &[0.0; 3], &[]).unwrap_err();
    assert!(matches!(err, ModelError::DimensionMismatch { expected: 8, actual: 7, .. }));
}

/// Wind speeds over which both blends are within `t` of saturation
fn saturated_band(config: &WindConfig, t: f64) -> (f64, f64) {
    let logit = ((1.0 - t) / t).ln();
    (
        config.cut_in_m_s + logit / config.cut_in_steepness,
        config.cut_out_m_s - logit / config.cut_out_steepness,
    )
}

proptest! {
    #[test]
    fn power_curve_holds_rated_across_saturated_band(
        cut_in_steepness in 0.5_f64..3.0,
        cut_out_steepness in 2.0_f64..10.0,
        frac in 0.0_f64..=1.0,
    ) {
        let config = WindConfig { cut_in_steepness, cut_out_steepness, ..WindConfig::default() };
        let t = 5e-3;
        let (lo, hi) = saturated_band(&config, t);
        prop_assume!(lo < hi);
        let v = lo + frac * (hi - lo);

        // deficit is bounded by both blend tails, the cubic term stays below 2× rated
        let p: f64 = WindTurbine::new(&config).power_curve(v);
        prop_assert!((p - 1.0).abs() <= 3.0 * t, "P({}) = {}", v, p);
    }

    #[test]
    fn power_curve_falls_through_cut_out_shoulder(v in 0.0_f64..1.0) {
        let config = WindConfig::default();
        let (_, hi) = saturated_band(&config, 5e-3);
        let v = hi + v * (config.cut_out_m_s + 1.0 - hi);
        let turbine = WindTurbine::new(&config);
        let (here, later): (f64, f64) = (turbine.power_curve(v), turbine.power_curve(v + 0.05));
        prop_assert!(later < here, "P({}) = {} then {}", v, here, later);
    }

    #[test]
    fn rollout_equals_repeated_steps(
        x0 in prop::collection::vec(0.0_f64..1.0, 8),
        controls in prop::collection::vec(prop::collection::vec(-0.2_f64..0.2, 3), 1..12),
    ) {
        let model = platform_model();
        let traj = model.rollout(&x0, &controls, &[]).unwrap();

        let mut x = x0.clone();
        for (u, from_rollout) in controls.iter().zip(&traj) {
            x = model.step(&x, u, &[]);
            for (a, b) in x.iter().zip(from_rollout) {
                prop_assert!((a - b).abs() <= 1e-12);
            }
        }
    }

    #[test]
    fn per_interval_params_match_single_steps(
        winds in prop::collection::vec(0.0_f64..30.0, 1..8),
    ) {
        let model = wind_farm_model();
        let controls = vec![vec![0.0; 5]; winds.len()];
        let params: Vec<Vec<f64>> = winds.iter().map(|&v| vec![v]).collect();
        let traj = model.rollout(&[0.5; 7], &controls, &params).unwrap();

        let mut x = vec![0.5; 7];
        for (i, v) in winds.iter().enumerate() {
            x = model.step(&x, &controls[i], &[*v]);
            prop_assert_eq!(&x, &traj[i]);
        }
    }

    #[test]
    fn interior_transition_stays_bounded(
        x0 in prop::collection::vec(0.05_f64..0.95, 8),
        u in prop::collection::vec(-0.05_f64..0.05, 3),
    ) {
        // lags are contractive and rate states move by at most |u|·dt
        let model = platform_model();
        let next = model.step(&x0, &u, &[]);
        let slack = 0.05 * model.dt() + 1e-9;
        for v in next {
            prop_assert!(v >= -slack && v <= 1.0 + slack);
        }
    }
}
