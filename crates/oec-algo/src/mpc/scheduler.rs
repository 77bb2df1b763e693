//! Scheduler layer: the hours-scale plan for the battery, the wind split and
//! the pumping volume of both platforms.
//!
//! ```text
//! parameters   x0 (SOC)   P_expected (N-1)   V_target (2)   SOC_d
//! variables    x = SOC (1×N)   u = [P_charge, P_b1, P_b2] (3×(N-1))
//!              P_wtg (2×(N-1))   P_l (4×(N-1), GTG loads)   Q (2×(N-1))   s (2)
//!
//! forecast[i]:  P_wtg1 + P_wtg2 + P_charge = P_expected[i]
//! balance[i]:   Q_k·P_pump − gtg(l_2k) − gtg(l_2k+1) − P_wtg_k − P_b_k = 0
//! delivery[i]:  P_wtg_k + P_b_k ≤ P_del,max
//! volume:       mean_i Q_k + s_k = V_target_k
//!
//! minimize      q_soc Σ (SOC − SOC_d)² + q_emissions Σ P_l² + N² q_slack Σ s²
//! ```

use crate::mpc::{check_finite, Layer, MpcError};
use crate::nlp::{Constraint, MultipleShooting, ParameterValues, Problem, ShootingVars, SolveResult, SolveStatus, VarBlock};
use num_dual::Dual64;
use oec_core::{ClusterConfig, DiscretizedModel, DynamicsSpec, GasTurbine, Pump, SchedulerDynamics};
use serde::Serialize;

/// Inputs of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerInputs {
    /// Wind power forecast per interval, per-unit of base
    pub expected_power: Vec<f64>,
    /// Mean normalized pump flow required of each platform over the horizon
    pub volume_target: [f64; 2],
    pub soc_target: f64,
}

impl SchedulerInputs {
    /// Persistence forecast: `power` held for every interval
    pub fn persistence(power: f64, intervals: usize, volume_target: [f64; 2], soc_target: f64) -> Self {
        Self {
            expected_power: vec![power; intervals],
            volume_target,
            soc_target,
        }
    }
}

/// Decoded scheduler solve. Per-platform quantities are one row per platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerPlan {
    pub status: SolveStatus,
    pub objective: f64,
    /// SOC at every node
    pub soc: Vec<f64>,
    pub charge: Vec<f64>,
    pub discharge: Vec<Vec<f64>>,
    pub wind: Vec<Vec<f64>>,
    /// GTG loads, `[gtg1 of platform 1, gtg2 of platform 1, gtg1 of platform 2, …]`
    pub loads: Vec<Vec<f64>>,
    pub flow: Vec<Vec<f64>>,
    /// Volume-target slack per platform
    pub slack: Vec<f64>,
}

impl SchedulerPlan {
    /// Mean planned flow of each platform
    pub fn mean_flow(&self) -> Vec<f64> {
        self.flow
            .iter()
            .map(|row| if row.is_empty() { 0.0 } else { row.iter().sum::<f64>() / row.len() as f64 })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Blocks {
    wind: VarBlock,
    loads: VarBlock,
    flow: VarBlock,
    slack: VarBlock,
}

pub struct SchedulerMpc {
    problem: Problem,
    vars: ShootingVars,
    blocks: Blocks,
    model: DiscretizedModel<SchedulerDynamics>,
}

impl SchedulerMpc {
    pub fn build(config: &ClusterConfig, horizon: f64, steps: usize, finite_elements: usize) -> Result<Self, MpcError> {
        let sc = &config.scheduler;
        let base = config.grid.base_kw;
        let dynamics = SchedulerDynamics::new(&config.battery, base, sc.time_unit_h);
        let model = DiscretizedModel::new(DynamicsSpec::new(dynamics)?, horizon, steps, finite_elements)?;

        let gtg = GasTurbine::new("gtg", &config.gtg);
        let pump = Pump::new("pump", &config.pump);
        let cap = config.grid.max_delivered_kw / base;
        let (q_soc, q_emissions) = (sc.q_soc, sc.q_emissions);
        let q_slack = (steps * steps) as f64 * sc.q_slack;

        let shooting = MultipleShooting::new(model.clone())?
            .with_uniform_state_bounds(0.0, 1.0)
            .with_control_bounds(vec![(0.0, 1.0); 3])?;

        let (problem, vars) = shooting.build(
            |b, v| {
                let soc_d = b.find_parameter("SOC_d")?;
                let loads = b.find_variable("P_l")?;
                let slack = b.find_variable("s")?;
                b.minimize("soc", [v.x.all()], move |z, p| sum_of_squares(z, soc_d.get(p, 0)) * q_soc);
                b.minimize("emissions", [loads.all()], move |z, _| sum_of_squares(z, 0.0) * q_emissions);
                b.minimize("volume_slack", [slack.all()], move |z, _| sum_of_squares(z, 0.0) * q_slack);
                Ok(())
            },
            |b, v| {
                let intervals = v.intervals();
                let wind = b.variable("P_wtg", 2, intervals)?;
                let loads = b.variable("P_l", 4, intervals)?;
                let flow = b.variable("Q", 2, intervals)?;
                let slack = b.variable("s", 2, 1)?;
                for block in [wind, loads, flow] {
                    b.bound_all(block, 0.0, 1.0);
                }

                let expected = b.parameter("P_expected", intervals)?;
                let target = b.parameter("V_target", 2)?;
                b.parameter("SOC_d", 1)?;

                for i in 0..intervals {
                    b.subject_to(
                        Constraint::new(
                            format!("forecast[{i}]"),
                            [wind.col(i), v.u.at(0, i)],
                            move |z, p| vec![z[0] + z[1] + z[2] - expected.get(p, i)],
                        )
                        .equal_to(0.0),
                    );

                    let (g, pp) = (gtg.clone(), pump.clone());
                    b.subject_to(
                        Constraint::new(
                            format!("balance[{i}]"),
                            [flow.col(i), loads.col(i), wind.col(i), v.u.at(1, i), v.u.at(2, i)],
                            move |z, _| {
                                // z = [Q1, Q2, l1, l2, l3, l4, P_wtg1, P_wtg2, P_b1, P_b2]
                                (0..2)
                                    .map(|k| {
                                        pp.power_on_base(z[k], base)
                                            - g.output_on_base(z[2 + 2 * k], base)
                                            - g.output_on_base(z[3 + 2 * k], base)
                                            - z[6 + k]
                                            - z[8 + k]
                                    })
                                    .collect()
                            },
                        )
                        .equal_to(0.0),
                    );

                    b.subject_to(
                        Constraint::new(
                            format!("delivery[{i}]"),
                            [wind.col(i), v.u.at(1, i), v.u.at(2, i)],
                            |z, _| vec![z[0] + z[2], z[1] + z[3]],
                        )
                        .at_most(cap),
                    );
                }

                b.subject_to(
                    Constraint::new("volume", [flow.row(0), flow.row(1), slack.all()], move |z, p| {
                        let [v1, v2] = volume_rows(z, intervals);
                        vec![v1 - target.get(p, 0), v2 - target.get(p, 1)]
                    })
                    .equal_to(0.0),
                );
                Ok(())
            },
        )?;

        let blocks = Blocks {
            wind: problem.variable("P_wtg")?,
            loads: problem.variable("P_l")?,
            flow: problem.variable("Q")?,
            slack: problem.variable("s")?,
        };
        tracing::debug!(
            variables = problem.n_variables(),
            constraints = problem.n_constraints(),
            nodes = vars.nodes,
            "scheduler MPC built"
        );
        Ok(Self {
            problem,
            vars,
            blocks,
            model,
        })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self, MpcError> {
        let sc = &config.scheduler;
        Self::build(config, sc.horizon, sc.steps, sc.finite_elements)
    }

    pub fn vars(&self) -> &ShootingVars {
        &self.vars
    }

    pub fn intervals(&self) -> usize {
        self.vars.intervals()
    }

    pub fn model(&self) -> &DiscretizedModel<SchedulerDynamics> {
        &self.model
    }
}

fn sum_of_squares(z: &[Dual64], target: f64) -> Dual64 {
    z.iter().fold(Dual64::from(0.0), |acc, &v| acc + (v - target) * (v - target))
}

/// `mean_i Q_k + s_k` for both platforms; `z = [Q1 row, Q2 row, s1, s2]`
fn volume_rows(z: &[Dual64], intervals: usize) -> [Dual64; 2] {
    let mean = |row: &[Dual64]| row.iter().fold(Dual64::from(0.0), |acc, &q| acc + q) / intervals as f64;
    [
        mean(&z[..intervals]) + z[2 * intervals],
        mean(&z[intervals..2 * intervals]) + z[2 * intervals + 1],
    ]
}

impl Layer for SchedulerMpc {
    type Inputs = SchedulerInputs;
    type Output = SchedulerPlan;

    fn name(&self) -> &str {
        "scheduler"
    }

    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn state_dim(&self) -> usize {
        1
    }

    fn bind(&self, x0: &[f64], inputs: &SchedulerInputs) -> Result<ParameterValues, MpcError> {
        check_finite(self.name(), "expected_power", &inputs.expected_power)?;
        check_finite(self.name(), "volume_target", &inputs.volume_target)?;
        check_finite(self.name(), "soc_target", &[inputs.soc_target])?;
        Ok(self.problem.bind(&[
            ("x0", x0),
            ("P_expected", &inputs.expected_power),
            ("V_target", &inputs.volume_target),
            ("SOC_d", &[inputs.soc_target]),
        ])?)
    }

    fn extract(&self, result: &SolveResult) -> SchedulerPlan {
        let rows = |block: VarBlock| (0..block.rows()).map(|r| result.row(block, r)).collect::<Vec<_>>();
        let u = self.vars.u;
        SchedulerPlan {
            status: result.status,
            objective: result.objective,
            soc: result.row(self.vars.x, 0),
            charge: result.row(u, 0),
            discharge: vec![result.row(u, 1), result.row(u, 2)],
            wind: rows(self.blocks.wind),
            loads: rows(self.blocks.loads),
            flow: rows(self.blocks.flow),
            slack: self.blocks.slack.column(&result.primal, 0).to_vec(),
        }
    }

    fn first_action(&self, plan: &SchedulerPlan) -> Vec<f64> {
        let first = |row: &[f64]| row.first().copied().unwrap_or(0.0);
        vec![first(&plan.charge), first(&plan.discharge[0]), first(&plan.discharge[1])]
    }

    fn advance(&self, x: &[f64], action: &[f64], _inputs: &SchedulerInputs) -> Result<Vec<f64>, MpcError> {
        Ok(self.model.step_checked(x, action, &[])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(steps: usize) -> SchedulerMpc {
        SchedulerMpc::build(&ClusterConfig::default(), steps as f64, steps, 1).unwrap()
    }

    #[test]
    fn test_parameter_contract() {
        let mpc = small(4);
        let p = mpc.problem();
        assert_eq!(p.parameter("x0").unwrap().len(), 1);
        assert_eq!(p.parameter("P_expected").unwrap().len(), 3);
        assert_eq!(p.parameter("V_target").unwrap().len(), 2);
        assert_eq!(p.parameter("SOC_d").unwrap().len(), 1);
        assert_eq!(p.variable("P_l").unwrap().rows(), 4);
        assert_eq!(p.variable("s").unwrap().len(), 2);
    }

    #[test]
    fn test_forecast_length_is_validated() {
        let mpc = small(4);
        let inputs = SchedulerInputs::persistence(0.5, 5, [0.5, 0.5], 0.5);
        let err = mpc.bind(&[0.5], &inputs).unwrap_err();
        assert!(matches!(
            err,
            MpcError::Problem(crate::nlp::ProblemError::ParameterLength { expected: 3, actual: 5, .. })
        ));
    }

    #[test]
    fn test_volume_row_is_mean_plus_slack() {
        let mpc = small(5);
        let inputs = SchedulerInputs::persistence(0.0, 4, [0.5, 1.5], 0.5);
        let params = mpc.bind(&[0.5], &inputs).unwrap();
        let mut z = vec![0.0; mpc.problem().n_variables()];
        let flow = mpc.problem().variable("Q").unwrap();
        let slack = mpc.problem().variable("s").unwrap();
        for i in 0..4 {
            z[flow.index(0, i)] = 0.5;
            z[flow.index(1, i)] = 1.0;
        }
        z[slack.index(1, 0)] = 0.5;
        let rows = mpc.problem().constraint_values("volume", &z, params.as_slice()).unwrap();
        assert!(rows[0].abs() < 1e-12);
        assert!(rows[1].abs() < 1e-12);
    }

    #[test]
    fn test_balance_units() {
        // a full-flow pump needs 1.5 pu; both GTGs at full load give 0.891
        let mpc = small(3);
        let params = mpc.bind(&[0.5], &SchedulerInputs::persistence(0.0, 2, [0.0; 2], 0.5)).unwrap();
        let mut z = vec![0.0; mpc.problem().n_variables()];
        let flow = mpc.problem().variable("Q").unwrap();
        let loads = mpc.problem().variable("P_l").unwrap();
        z[flow.index(0, 0)] = 1.0;
        z[loads.index(0, 0)] = 1.0;
        z[loads.index(1, 0)] = 1.0;
        let rows = mpc.problem().constraint_values("balance[0]", &z, params.as_slice()).unwrap();
        let eta: f64 = -0.5714 + 1.286 + 0.2757;
        assert!((rows[0] - (1.5 - 2.0 * 0.45 * eta)).abs() < 1e-12);
        assert_eq!(rows[1], 0.0);
    }

    #[test]
    fn test_mean_flow() {
        let plan = SchedulerPlan {
            status: SolveStatus::Optimal,
            objective: 0.0,
            soc: vec![0.5; 3],
            charge: vec![0.0; 2],
            discharge: vec![vec![0.0; 2]; 2],
            wind: vec![vec![0.0; 2]; 2],
            loads: vec![vec![0.0; 2]; 4],
            flow: vec![vec![0.2, 0.4], vec![]],
            slack: vec![0.0, 0.0],
        };
        let mean = plan.mean_flow();
        assert!((mean[0] - 0.3).abs() < 1e-12);
        assert_eq!(mean[1], 0.0);
    }
}
