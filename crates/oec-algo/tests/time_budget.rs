use oec_algo::nlp::AugmentedLagrangian;
use oec_algo::*;
use oec_core::ClusterConfig;
use std::sync::Arc;
use std::time::Duration;

fn solver(config: SolverConfig) -> Solver {
    Solver::with_backend(Arc::new(AugmentedLagrangian), config)
}

const BUSY: PlatformInputs = PlatformInputs { qd: 0.3, pdel: 0.2 };

#[test]
fn test_platform_solve_stops_at_budget() {
    let mpc = PlatformMpc::from_config(&ClusterConfig::default()).unwrap();
    let params = mpc.bind(&[0.0; 8], &BUSY).unwrap();
    let tight = SolverConfig::control_loop().with_timeout(Duration::from_millis(1));

    let result = solver(tight.clone().with_error_on_fail(false))
        .solve(mpc.problem(), &params, None)
        .unwrap();
    assert_eq!(result.status, SolveStatus::Timeout);
    assert!(result.primal.iter().all(|v| v.is_finite()));

    let err = solver(tight).solve(mpc.problem(), &params, None).unwrap_err();
    assert!(matches!(err, SolveError::Timeout(_)), "{err}");
    assert_eq!(err.status(), Some(SolveStatus::Timeout));
}

#[test]
fn test_timed_out_tick_holds_previous_action() {
    let config = ClusterConfig::default();
    let mpc = PlatformMpc::build(&config, 2.0, 5, 2).unwrap();
    let mut controller =
        MpcController::with_solver(mpc, solver(SolverConfig::control_loop()), vec![0.0; 8]).unwrap();

    let first = controller.tick(&BUSY).unwrap();
    assert!(!first.held, "{:?}", first.error);
    assert!(first.action.iter().any(|v| v.abs() > 1e-6));

    controller.set_solver(solver(SolverConfig::control_loop().with_timeout(Duration::ZERO)));
    let second = controller.tick(&BUSY).unwrap();
    assert!(second.held);
    assert_eq!(second.status, Some(SolveStatus::Timeout));
    assert!(second.plan.is_none());
    assert_eq!(second.action, first.action);
    assert_eq!(controller.last_action(), first.action.as_slice());
    assert_eq!(controller.state(), ControllerState::Idle);
}
