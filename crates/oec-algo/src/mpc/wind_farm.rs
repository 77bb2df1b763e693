//! Wind-farm layer: turbine dispatch, battery discharge and charging.
//!
//! ```text
//! parameters   x0 (7)   v (wind speed, m/s)   setpoints (5)
//!              setpoints = [P_wtg1, P_wtg2, P_b1, P_b2, P_charge] from the scheduler
//! variables    x (7×N)  u (5×(N-1))   s (1×N)
//!
//! distribution[i]:  P_v − (P_wtg1 + P_wtg2 + P_charge) = s
//! delivery[i]:      P_wtg_k + P_b_k ≤ P_del,max        k = 1, 2
//! ```
//!
//! Delivered power to platform `k` is `P_wtg_k + P_b_k`. The cost tracks it
//! against the scheduler's split and tracks every setpoint individually.

use crate::mpc::{check_finite, Layer, MpcError};
use crate::nlp::{
    Constraint, Exogenous, MultipleShooting, ParameterValues, Problem, ShootingVars, SolveResult, SolveStatus,
    SolverConfig, VarBlock,
};
use oec_core::{ClusterConfig, DiscretizedModel, DynamicsSpec, WindFarmDynamics, WindFarmState};
use serde::Serialize;

use WindFarmState::{Available, Battery1, Battery2, Charge, Turbine1, Turbine2};

/// Inputs of one wind-farm tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindFarmInputs {
    /// Measured wind speed, held over the horizon
    pub wind_speed: f64,
    /// `[P_wtg1, P_wtg2, P_b1, P_b2, P_charge]`, per-unit of base
    pub setpoints: [f64; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindFarmPlan {
    pub status: SolveStatus,
    pub objective: f64,
    pub states: Vec<Vec<f64>>,
    pub controls: Vec<Vec<f64>>,
    pub slack: Vec<f64>,
}

impl WindFarmPlan {
    /// Power delivered to both platforms at `node`, per-unit of base
    pub fn delivered(&self, node: usize) -> Option<[f64; 2]> {
        self.states.get(node).map(|x| {
            [
                x[Turbine1.index()] + x[Battery1.index()],
                x[Turbine2.index()] + x[Battery2.index()],
            ]
        })
    }
}

pub struct WindFarmMpc {
    problem: Problem,
    vars: ShootingVars,
    slack: VarBlock,
    model: DiscretizedModel<WindFarmDynamics>,
}

impl WindFarmMpc {
    pub fn build(config: &ClusterConfig, horizon: f64, steps: usize, finite_elements: usize) -> Result<Self, MpcError> {
        let wf = &config.wind_farm;
        let base = config.grid.base_kw;
        let dynamics = WindFarmDynamics::new(&config.wind, &config.battery, base, wf.time_unit_h);
        let model = DiscretizedModel::new(DynamicsSpec::new(dynamics)?, horizon, steps, finite_elements)?;
        let cap = config.grid.max_delivered_kw / base;

        let (rate, charge_rate) = (wf.max_power_rate, wf.max_charge_rate);
        let shooting = MultipleShooting::new(model.clone())?
            .with_exogenous(Exogenous::Constant {
                name: "v".into(),
                len: 1,
            })
            .with_uniform_state_bounds(0.0, 1.0)
            .with_control_bounds(vec![
                (-rate, rate),
                (-rate, rate),
                (-rate, rate),
                (-rate, rate),
                (-charge_rate, charge_rate),
            ])?;

        let weights = wf.clone();
        let (problem, vars) = shooting.build(
            |b, v| {
                let s = b.find_variable("s")?;
                let sp = b.find_parameter("setpoints")?;
                let w = weights.clone();
                for i in 0..v.nodes {
                    let w = w.clone();
                    b.minimize("tracking", [v.x.col(i)], move |z, p| {
                        let d1 = z[Turbine1.index()] + z[Battery1.index()] - (sp.get(p, 0) + sp.get(p, 2));
                        let d2 = z[Turbine2.index()] + z[Battery2.index()] - (sp.get(p, 1) + sp.get(p, 3));
                        let t1 = z[Turbine1.index()] - sp.get(p, 0);
                        let t2 = z[Turbine2.index()] - sp.get(p, 1);
                        let b1 = z[Battery1.index()] - sp.get(p, 2);
                        let b2 = z[Battery2.index()] - sp.get(p, 3);
                        let c = z[Charge.index()] - sp.get(p, 4);
                        (d1 * d1 + d2 * d2) * w.q_delivered
                            + (t1 * t1 + t2 * t2) * w.q_turbine
                            + (b1 * b1 + b2 * b2) * w.q_battery
                            + c * c * w.q_charge
                    });
                    let q_slack = w.q_slack;
                    b.minimize("slack", [s.at(0, i)], move |z, _| z[0] * z[0] * q_slack);
                }
                let r = w.r_rate;
                for i in 0..v.intervals() {
                    b.minimize("control_effort", [v.u.col(i)], move |z, _| {
                        (z[0] * z[0] + z[1] * z[1] + z[2] * z[2] + z[3] * z[3] + z[4] * z[4]) * r
                    });
                }
                Ok(())
            },
            |b, v| {
                let s = b.variable("s", 1, v.nodes)?;
                b.parameter("setpoints", 5)?;
                for i in 0..v.nodes {
                    b.subject_to(
                        Constraint::new(
                            format!("distribution[{i}]"),
                            [
                                v.x.at(Available.index(), i),
                                v.x.at(Turbine1.index(), i),
                                v.x.at(Turbine2.index(), i),
                                v.x.at(Charge.index(), i),
                                s.at(0, i),
                            ],
                            |z, _| vec![z[0] - (z[1] + z[2] + z[3]) - z[4]],
                        )
                        .equal_to(0.0),
                    );
                    b.subject_to(
                        Constraint::new(
                            format!("delivery[{i}]"),
                            [
                                v.x.at(Turbine1.index(), i),
                                v.x.at(Battery1.index(), i),
                                v.x.at(Turbine2.index(), i),
                                v.x.at(Battery2.index(), i),
                            ],
                            |z, _| vec![z[0] + z[1], z[2] + z[3]],
                        )
                        .at_most(cap),
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
            "wind-farm MPC built"
        );
        Ok(Self {
            problem,
            vars,
            slack,
            model,
        })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self, MpcError> {
        let wf = &config.wind_farm;
        Self::build(config, wf.horizon, wf.steps, wf.finite_elements)
    }

    pub fn vars(&self) -> &ShootingVars {
        &self.vars
    }

    pub fn slack(&self) -> VarBlock {
        self.slack
    }

    pub fn model(&self) -> &DiscretizedModel<WindFarmDynamics> {
        &self.model
    }
}

impl Layer for WindFarmMpc {
    type Inputs = WindFarmInputs;
    type Output = WindFarmPlan;

    fn name(&self) -> &str {
        "wind_farm"
    }

    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn state_dim(&self) -> usize {
        WindFarmState::COUNT
    }

    fn solver_config(&self) -> SolverConfig {
        SolverConfig::relaxed()
    }

    fn bind(&self, x0: &[f64], inputs: &WindFarmInputs) -> Result<ParameterValues, MpcError> {
        check_finite(self.name(), "wind_speed", &[inputs.wind_speed])?;
        check_finite(self.name(), "setpoints", &inputs.setpoints)?;
        Ok(self.problem.bind(&[
            ("x0", x0),
            ("v", &[inputs.wind_speed]),
            ("setpoints", &inputs.setpoints),
        ])?)
    }

    fn extract(&self, result: &SolveResult) -> WindFarmPlan {
        WindFarmPlan {
            status: result.status,
            objective: result.objective,
            states: result.columns(self.vars.x),
            controls: result.columns(self.vars.u),
            slack: result.row(self.slack, 0),
        }
    }

    fn first_action(&self, plan: &WindFarmPlan) -> Vec<f64> {
        plan.controls.first().cloned().unwrap_or_else(|| vec![0.0; 5])
    }

    fn advance(&self, x: &[f64], action: &[f64], inputs: &WindFarmInputs) -> Result<Vec<f64>, MpcError> {
        Ok(self.model.step_checked(x, action, &[inputs.wind_speed])?)
    }
}
