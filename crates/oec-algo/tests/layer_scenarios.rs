use oec_algo::nlp::AugmentedLagrangian;
use oec_algo::*;
use oec_core::{ClusterConfig, PlatformState};
use std::sync::Arc;

fn solver(config: SolverConfig) -> Solver {
    Solver::with_backend(Arc::new(AugmentedLagrangian), config)
}

fn platform() -> PlatformMpc {
    PlatformMpc::build(&ClusterConfig::default(), 2.0, 5, 2).unwrap()
}

fn solve_platform(mpc: &PlatformMpc, inputs: PlatformInputs) -> SolveResult {
    let params = mpc.bind(&[0.0; 8], &inputs).unwrap();
    solver(SolverConfig::control_loop()).solve(mpc.problem(), &params, None).unwrap()
}

#[test]
fn test_platform_at_rest_is_optimal() {
    let mpc = platform();
    let result = solve_platform(&mpc, PlatformInputs::default());
    assert_eq!(result.status, SolveStatus::Optimal);
    assert!(result.objective.abs() < 1e-9);

    let plan = mpc.extract(&result);
    for column in &plan.states {
        assert!(column.iter().all(|v| v.abs() < 1e-6));
    }
    assert!(mpc.first_action(&plan).iter().all(|u| u.abs() < 1e-6));
}

#[test]
fn test_platform_objective_grows_with_delivered_power() {
    // delivered power nobody consumes can only be absorbed by the slack or the pump
    let mpc = platform();
    let objectives: Vec<f64> = [0.0, 0.2, 0.4]
        .iter()
        .map(|&pdel| solve_platform(&mpc, PlatformInputs { qd: 0.0, pdel }).objective)
        .collect();
    assert!(objectives[0] <= objectives[1] + 1e-9, "{objectives:?}");
    assert!(objectives[1] <= objectives[2] + 1e-9, "{objectives:?}");
    // node 0 is pinned to rest: the whole surplus there lands in the slack
    assert!(objectives[2] >= 100.0 * 0.6 * 0.6 - 1e-3, "{objectives:?}");
}

#[test]
fn test_platform_energy_balance_holds_at_solution() {
    let mpc = platform();
    let inputs = PlatformInputs { qd: 0.3, pdel: 0.2 };
    let params = mpc.bind(&[0.0; 8], &inputs).unwrap();
    let result = solver(SolverConfig::control_loop())
        .solve(mpc.problem(), &params, None)
        .unwrap();
    let plan = mpc.extract(&result);

    for i in 0..mpc.vars().nodes {
        let row = mpc
            .problem()
            .constraint_values(&format!("energy[{i}]"), &result.primal, params.as_slice())
            .unwrap();
        assert!(row[0].abs() < 1e-3, "energy[{i}] = {}", row[0]);
    }

    // the slack cost in the objective is the one implied by the slack values
    let q_slack = ClusterConfig::default().platform.q_slack;
    let slack_cost: f64 = plan.slack.iter().map(|s| q_slack * s * s).sum();
    let terms = mpc.problem().objective_terms(&result.primal, params.as_slice());
    let reported: f64 = terms.iter().filter(|(name, _)| name == "slack").map(|(_, v)| v).sum();
    assert!((reported - slack_cost).abs() < 1e-9);
    assert!(plan.states[0][PlatformState::PumpFlow.index()].abs() < 1e-6);
}

#[test]
fn test_scheduler_volume_target_beyond_reach_uses_slack() {
    let mpc = SchedulerMpc::build(&ClusterConfig::default(), 4.0, 4, 1).unwrap();
    let inputs = SchedulerInputs::persistence(0.0, mpc.intervals(), [1.5, 0.5], 0.5);
    let params = mpc.bind(&[0.5], &inputs).unwrap();
    let result = solver(SolverConfig::control_loop().with_error_on_fail(false))
        .solve(mpc.problem(), &params, None)
        .unwrap();
    assert_ne!(result.status, SolveStatus::Infeasible);

    let plan = mpc.extract(&result);
    // the pump is capped at full flow, so the unmet half of the target is slack
    assert!((plan.slack[0] - 0.5).abs() < 1e-2, "slack {:?}", plan.slack);
    let volume = mpc
        .problem()
        .constraint_values("volume", &result.primal, params.as_slice())
        .unwrap();
    assert!(volume.iter().all(|r| r.abs() < 1e-3), "volume residual {volume:?}");
}

#[test]
fn test_scheduler_state_outside_box_is_held() {
    let config = ClusterConfig::default();
    let mpc = SchedulerMpc::build(&config, 3.0, 3, 1).unwrap();
    let inputs = SchedulerInputs::persistence(0.2, mpc.intervals(), [0.3, 0.3], 0.5);
    let mut controller = MpcController::new(mpc, &config.solver, vec![1.5]).unwrap();

    let report = controller.tick(&inputs).unwrap();
    assert!(report.held);
    assert!(report.status.map_or(true, |s| !s.is_success()));
    assert!(report.plan.is_none());
    assert_eq!(report.action, vec![0.0; 3]);
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[test]
fn test_wind_farm_follows_setpoints() {
    let config = ClusterConfig::default();
    let mpc = WindFarmMpc::build(&config, 6.0, 4, 1).unwrap();
    let mut x0 = vec![0.0; 7];
    x0[3] = 0.5;
    let mut controller = MpcController::new(mpc, &config.solver, x0).unwrap();

    let inputs = WindFarmInputs {
        wind_speed: 12.0,
        setpoints: [0.2, 0.2, 0.0, 0.0, 0.0],
    };
    let report = controller.tick(&inputs).unwrap();
    assert!(!report.held, "{:?}", report.error);
    let plan = report.plan.unwrap();
    // the rate limit keeps the first move within one interval's reach
    let action = &report.action;
    assert!(action[0] > 0.0 && action[0] <= 0.2 + 1e-9);
    assert!(action[1] > 0.0 && action[1] <= 0.2 + 1e-9);
    assert_eq!(plan.states.len(), 4);
}
