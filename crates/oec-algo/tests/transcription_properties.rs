use oec_algo::*;
use oec_core::ClusterConfig;
use proptest::prelude::*;

fn platform() -> PlatformMpc {
    PlatformMpc::build(&ClusterConfig::default(), 2.0, 5, 2).unwrap()
}

/// Primal vector holding a rollout of `controls` from `x0`
fn rollout_point(mpc: &PlatformMpc, x0: &[f64], controls: &[Vec<f64>]) -> Vec<f64> {
    let vars = mpc.vars();
    let traj = mpc.model().rollout(x0, controls, &[]).unwrap();
    let mut z = vec![0.0; mpc.problem().n_variables()];
    for (r, &v) in x0.iter().enumerate() {
        z[vars.x.index(r, 0)] = v;
    }
    for (i, (x, u)) in traj.iter().zip(controls).enumerate() {
        for (r, &v) in x.iter().enumerate() {
            z[vars.x.index(r, i + 1)] = v;
        }
        for (r, &v) in u.iter().enumerate() {
            z[vars.u.index(r, i)] = v;
        }
    }
    z
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn continuity_vanishes_on_rollouts(
        x0 in prop::collection::vec(0.0_f64..1.0, 8),
        controls in prop::collection::vec(prop::collection::vec(-0.1_f64..0.1, 3), 4),
    ) {
        let mpc = platform();
        let z = rollout_point(&mpc, &x0, &controls);
        let params = mpc.bind(&x0, &PlatformInputs::default()).unwrap();
        for i in 0..mpc.vars().intervals() {
            let rows = mpc
                .problem()
                .constraint_values(&format!("dynamics[{i}]"), &z, params.as_slice())
                .unwrap();
            prop_assert_eq!(rows.len(), 8);
            for (k, r) in rows.iter().enumerate() {
                prop_assert!(r.abs() <= 1e-12, "dynamics[{}][{}] = {}", i, k, r);
            }
        }
    }

    #[test]
    fn energy_residual_rises_linearly_with_delivery(
        z in prop::collection::vec(0.0_f64..1.0, 8 * 5 + 3 * 4 + 5),
        pdel_a in 0.0_f64..1.0,
        pdel_b in 0.0_f64..1.0,
    ) {
        let config = ClusterConfig::default();
        let scale = config.grid.max_delivered_kw.value() / config.grid.base_kw.value();
        let mpc = platform();
        prop_assert_eq!(z.len(), mpc.problem().n_variables());

        let residuals = |pdel: f64| {
            let params = mpc.bind(&[0.0; 8], &PlatformInputs { qd: 0.0, pdel }).unwrap();
            (0..mpc.vars().nodes)
                .map(|i| {
                    mpc.problem()
                        .constraint_values(&format!("energy[{i}]"), &z, params.as_slice())
                        .unwrap()[0]
                })
                .collect::<Vec<f64>>()
        };
        let (ra, rb) = (residuals(pdel_a), residuals(pdel_b));
        for (a, b) in ra.iter().zip(&rb) {
            prop_assert!(((b - a) - (pdel_b - pdel_a) * scale).abs() <= 1e-9);
        }
    }
}
