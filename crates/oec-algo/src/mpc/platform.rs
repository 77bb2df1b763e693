//! Platform layer: one water-injection pump and two GTGs.
//!
//! ```text
//! parameters   x0 (8)   Qd (flow demand)   Pdel (delivered power, pu of max delivery)
//! variables    x (8×N)  u (3×(N-1))        s (1×N, energy-balance slack)
//!
//! energy[i]:   gtg1(l₁) + gtg2(l₂) + Pdel·P_del,max − Pp·P_pump = s        (pu of base)
//!
//! minimize     Σ_i q_flow (Q − Qd)² + q_eff Σ_k (l_k − η(l_k)·l_k)² + q_slack s²
//!            + Σ_i uᵢᵀ R uᵢ,   R = diag(r_power_rate, r_valve_rate, r_valve_rate)
//! ```

use crate::mpc::{check_finite, Layer, MpcError};
use crate::nlp::{Constraint, MultipleShooting, ParameterValues, Problem, ShootingVars, SolveResult, SolveStatus, VarBlock};
use oec_core::{platform_dynamics, ClusterConfig, DiscretizedModel, DynamicsSpec, PlatformDynamics, PlatformState};
use serde::Serialize;

/// Inputs of one platform tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlatformInputs {
    /// Normalized pump-flow demand
    pub qd: f64,
    /// Delivered wind/battery power, per-unit of the delivery cap
    pub pdel: f64,
}

/// Decoded platform solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformPlan {
    pub status: SolveStatus,
    pub objective: f64,
    /// State columns, one per node
    pub states: Vec<Vec<f64>>,
    /// Control columns, one per interval
    pub controls: Vec<Vec<f64>>,
    pub slack: Vec<f64>,
}

pub struct PlatformMpc {
    problem: Problem,
    vars: ShootingVars,
    slack: VarBlock,
    model: DiscretizedModel<PlatformDynamics>,
}

impl PlatformMpc {
    /// Build the platform problem over `horizon` with `steps` shooting nodes
    pub fn build(config: &ClusterConfig, horizon: f64, steps: usize, finite_elements: usize) -> Result<Self, MpcError> {
        let spec = DynamicsSpec::new(platform_dynamics(&config.gtg, &config.pump))?;
        let model = DiscretizedModel::new(spec, horizon, steps, finite_elements)?;

        let dynamics = model.spec().model();
        let (gtg1, gtg2, pump) = (dynamics.gtg1().clone(), dynamics.gtg2().clone(), dynamics.pump().clone());
        let base = config.grid.base_kw;
        let delivery_scale = config.grid.max_delivered_kw / base;
        let weights = config.platform.clone();

        let valve_rate = config.gtg.max_valve_rate;
        let power_rate = config.pump.max_power_rate;
        let shooting = MultipleShooting::new(model.clone())?
            .with_uniform_state_bounds(0.0, 1.0)
            .with_control_bounds(vec![
                (-power_rate, power_rate),
                (-valve_rate, valve_rate),
                (-valve_rate, valve_rate),
            ])?;

        let (problem, vars) = shooting.build(
            |b, v| {
                let s = b.find_variable("s")?;
                let qd = b.find_parameter("Qd")?;
                for i in 0..v.nodes {
                    let (g1, g2) = (gtg1.clone(), gtg2.clone());
                    let w = weights.clone();
                    b.minimize(
                        "tracking",
                        [
                            v.x.at(PlatformState::PumpFlow.index(), i),
                            v.x.at(PlatformState::Load1.index(), i),
                            v.x.at(PlatformState::Load2.index(), i),
                        ],
                        move |z, p| {
                            let flow_err = z[0] - qd.get(p, 0);
                            let e1 = z[1] - g1.output_per_unit(z[1]);
                            let e2 = z[2] - g2.output_per_unit(z[2]);
                            flow_err * flow_err * w.q_flow + (e1 * e1 + e2 * e2) * w.q_efficiency
                        },
                    );
                    let q_slack = weights.q_slack;
                    b.minimize("slack", [s.at(0, i)], move |z, _| z[0] * z[0] * q_slack);
                }
                let r = [weights.r_power_rate, weights.r_valve_rate, weights.r_valve_rate];
                for i in 0..v.intervals() {
                    b.minimize("control_effort", [v.u.col(i)], move |z, _| {
                        z[0] * z[0] * r[0] + z[1] * z[1] * r[1] + z[2] * z[2] * r[2]
                    });
                }
                Ok(())
            },
            |b, v| {
                let s = b.variable("s", 1, v.nodes)?;
                b.parameter("Qd", 1)?;
                let pdel = b.parameter("Pdel", 1)?;
                for i in 0..v.nodes {
                    let (g1, g2, pp) = (gtg1.clone(), gtg2.clone(), pump.clone());
                    b.subject_to(
                        Constraint::new(
                            format!("energy[{i}]"),
                            [
                                v.x.at(PlatformState::Load1.index(), i),
                                v.x.at(PlatformState::Load2.index(), i),
                                v.x.at(PlatformState::PumpPower.index(), i),
                                s.at(0, i),
                            ],
                            move |z, p| {
                                let generated = g1.output_on_base(z[0], base) + g2.output_on_base(z[1], base);
                                let consumed = pp.power_on_base(z[2], base);
                                vec![generated + pdel.get(p, 0) * delivery_scale - consumed - z[3]]
                            },
                        )
                        .equal_to(0.0),
                    );
                }
                Ok(())
            },
        )?;

        let slack = problem.variable("s")?;
        tracing::debug!(
            variables = problem.n_variables(),
            constraints = problem.n_constraints(),
            nodes = vars.nodes,
            "platform MPC built"
        );
        Ok(Self {
            problem,
            vars,
            slack,
            model,
        })
    }

    /// Build with the horizon from `config.platform`
    pub fn from_config(config: &ClusterConfig) -> Result<Self, MpcError> {
        let p = &config.platform;
        Self::build(config, p.horizon, p.steps, p.finite_elements)
    }

    pub fn vars(&self) -> &ShootingVars {
        &self.vars
    }

    pub fn slack(&self) -> VarBlock {
        self.slack
    }

    pub fn model(&self) -> &DiscretizedModel<PlatformDynamics> {
        &self.model
    }
}

impl Layer for PlatformMpc {
    type Inputs = PlatformInputs;
    type Output = PlatformPlan;

    fn name(&self) -> &str {
        "platform"
    }

    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn state_dim(&self) -> usize {
        PlatformState::COUNT
    }

    fn bind(&self, x0: &[f64], inputs: &PlatformInputs) -> Result<ParameterValues, MpcError> {
        check_finite(self.name(), "inputs", &[inputs.qd, inputs.pdel])?;
        Ok(self
            .problem
            .bind(&[("x0", x0), ("Qd", &[inputs.qd]), ("Pdel", &[inputs.pdel])])?)
    }

    fn extract(&self, result: &SolveResult) -> PlatformPlan {
        PlatformPlan {
            status: result.status,
            objective: result.objective,
            states: result.columns(self.vars.x),
            controls: result.columns(self.vars.u),
            slack: result.row(self.slack, 0),
        }
    }

    fn first_action(&self, plan: &PlatformPlan) -> Vec<f64> {
        plan.controls.first().cloned().unwrap_or_else(|| vec![0.0; 3])
    }

    fn advance(&self, x: &[f64], action: &[f64], _inputs: &PlatformInputs) -> Result<Vec<f64>, MpcError> {
        Ok(self.model.step_checked(x, action, &[])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> PlatformMpc {
        PlatformMpc::build(&ClusterConfig::default(), 2.0, 5, 2).unwrap()
    }

    #[test]
    fn test_parameter_contract() {
        let mpc = small();
        let problem = mpc.problem();
        assert_eq!(problem.parameter("x0").unwrap().len(), 8);
        assert_eq!(problem.parameter("Qd").unwrap().len(), 1);
        assert_eq!(problem.parameter("Pdel").unwrap().len(), 1);
        assert_eq!(problem.variable("x").unwrap().cols(), 5);
        assert_eq!(problem.variable("u").unwrap().rows(), 3);
        assert_eq!(mpc.slack().cols(), 5);
    }

    #[test]
    fn test_energy_balance_units() {
        // full load on both GTGs with no delivery: 2 · 0.45 · η(1) = 1.5 · Pp + s
        let mpc = small();
        let problem = mpc.problem();
        let params = mpc.bind(&[0.0; 8], &PlatformInputs::default()).unwrap();
        let mut z = vec![0.0; problem.n_variables()];
        let x = mpc.vars().x;
        z[x.index(PlatformState::Load1.index(), 2)] = 1.0;
        z[x.index(PlatformState::Load2.index(), 2)] = 1.0;
        let residual = problem.constraint_values("energy[2]", &z, params.as_slice()).unwrap()[0];
        let eta: f64 = -0.5714 + 1.286 + 0.2757;
        assert!((residual - 2.0 * 0.45 * eta).abs() < 1e-12);
    }

    #[test]
    fn test_bind_rejects_non_finite_inputs() {
        let mpc = small();
        let err = mpc
            .bind(&[0.0; 8], &PlatformInputs { qd: f64::NAN, pdel: 0.0 })
            .unwrap_err();
        assert!(matches!(err, MpcError::InvalidInput { .. }));
    }

    #[test]
    fn test_zero_point_is_feasible() {
        let mpc = small();
        let params = mpc.bind(&[0.0; 8], &PlatformInputs::default()).unwrap();
        let z = vec![0.0; mpc.problem().n_variables()];
        assert_eq!(mpc.problem().max_violation(&z, params.as_slice()), 0.0);
        assert_eq!(mpc.problem().objective(&z, params.as_slice()), 0.0);
    }
}
