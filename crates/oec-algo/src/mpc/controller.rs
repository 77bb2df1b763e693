use crate::mpc::{Layer, MpcError};
use crate::nlp::{ParameterValues, Solver, SolveStatus};
use oec_core::SolverSettings;
use serde::Serialize;
use std::fmt;

/// Position of a controller in its receding-horizon cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    ParametersBound,
    Solved,
    ActionApplied,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::ParametersBound => write!(f, "parameters_bound"),
            ControllerState::Solved => write!(f, "solved"),
            ControllerState::ActionApplied => write!(f, "action_applied"),
        }
    }
}

/// What one control tick did
#[derive(Debug, Clone, Serialize)]
pub struct TickReport<O> {
    pub layer: String,
    /// Control applied to the plant
    pub action: Vec<f64>,
    /// Solver status, `None` if the solve never ran
    pub status: Option<SolveStatus>,
    /// The previous action was re-applied because the solve failed
    pub held: bool,
    pub error: Option<String>,
    /// Fresh plan; absent on a hold
    pub plan: Option<O>,
    /// Plant state after the action
    pub state: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Attempt<O> {
    status: Option<SolveStatus>,
    error: Option<String>,
    plan: Option<O>,
}

/// Receding-horizon driver of one [`Layer`].
///
/// Each tick binds the measured state and the tick's inputs, solves from the
/// shifted previous solution, applies the first control of the plan and
/// advances the plant. A failed solve re-applies the last good action and
/// leaves the warm start untouched.
pub struct MpcController<L: Layer> {
    layer: L,
    solver: Solver,
    state: ControllerState,
    x: Vec<f64>,
    params: Option<ParameterValues>,
    warm_start: Option<Vec<f64>>,
    last_plan: Option<L::Output>,
    last_action: Vec<f64>,
    attempt: Option<Attempt<L::Output>>,
}

impl<L: Layer> MpcController<L> {
    /// Controller on the layer's own solver preset with `settings` applied
    pub fn new(layer: L, settings: &SolverSettings, x0: Vec<f64>) -> Result<Self, MpcError> {
        let solver = Solver::new(layer.solver_config().with_settings(settings));
        Self::with_solver(layer, solver, x0)
    }

    pub fn with_solver(layer: L, solver: Solver, x0: Vec<f64>) -> Result<Self, MpcError> {
        check_state(&layer, &x0)?;
        let controls = layer.problem().variable("u")?.rows();
        Ok(Self {
            layer,
            solver,
            state: ControllerState::Idle,
            x: x0,
            params: None,
            warm_start: None,
            last_plan: None,
            last_action: vec![0.0; controls],
            attempt: None,
        })
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// Swap the solver used from the next solve on; the warm start is kept
    pub fn set_solver(&mut self, solver: Solver) {
        self.solver = solver;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Current plant state
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Most recent successful plan
    pub fn last_plan(&self) -> Option<&L::Output> {
        self.last_plan.as_ref()
    }

    pub fn last_action(&self) -> &[f64] {
        &self.last_action
    }

    /// Replace the plant state with a new measurement
    pub fn set_state(&mut self, x: Vec<f64>) -> Result<(), MpcError> {
        self.expect_state(ControllerState::Idle, "set the state")?;
        check_state(&self.layer, &x)?;
        self.x = x;
        Ok(())
    }

    /// Bind the current state and `inputs`
    pub fn bind(&mut self, inputs: &L::Inputs) -> Result<(), MpcError> {
        self.expect_state(ControllerState::Idle, "bind parameters")?;
        check_state(&self.layer, &self.x)?;
        self.params = Some(self.layer.bind(&self.x, inputs)?);
        self.state = ControllerState::ParametersBound;
        Ok(())
    }

    /// Solve the bound problem. Solver failures do not surface as errors:
    /// they switch the tick to a hold of the last good action.
    pub fn solve(&mut self) -> Result<(), MpcError> {
        self.expect_state(ControllerState::ParametersBound, "solve")?;
        let params = self.params.take().ok_or_else(|| MpcError::InvalidTransition {
            layer: self.layer.name().to_string(),
            action: "solve",
            state: self.state,
        })?;

        let problem = self.layer.problem();
        let attempt = match self.solver.solve(problem, &params, self.warm_start.as_deref()) {
            Ok(result) if result.status.is_success() => {
                let plan = self.layer.extract(&result);
                let action = self.layer.first_action(&plan);
                if action.iter().all(|v| v.is_finite()) {
                    self.warm_start = Some(problem.shift_warm_start(&result.primal));
                    self.last_action = action;
                    self.last_plan = Some(plan.clone());
                    Attempt {
                        status: Some(result.status),
                        error: None,
                        plan: Some(plan),
                    }
                } else {
                    Attempt {
                        status: Some(SolveStatus::NumericalError),
                        error: Some("first action is not finite".into()),
                        plan: None,
                    }
                }
            }
            Ok(result) => Attempt {
                status: Some(result.status),
                error: Some(format!("solve ended {}: {}", result.status, result.diagnostics)),
                plan: None,
            },
            Err(err) => Attempt {
                status: err.status(),
                error: Some(err.to_string()),
                plan: None,
            },
        };

        if let Some(reason) = &attempt.error {
            tracing::warn!(layer = self.layer.name(), action = ?self.last_action, "holding last action: {reason}");
        }
        self.attempt = Some(attempt);
        self.state = ControllerState::Solved;
        Ok(())
    }

    /// Advance the plant under the chosen action and return the new state.
    ///
    /// A failed or non-finite transition leaves the state untouched and
    /// returns the controller to `Idle`.
    pub fn apply(&mut self, inputs: &L::Inputs) -> Result<&[f64], MpcError> {
        self.expect_state(ControllerState::Solved, "apply an action")?;
        let next = self
            .layer
            .advance(&self.x, &self.last_action, inputs)
            .and_then(|next| check_state(&self.layer, &next).map(|()| next));
        match next {
            Ok(next) => {
                self.x = next;
                self.state = ControllerState::ActionApplied;
                Ok(self.x.as_slice())
            }
            Err(err) => {
                self.state = ControllerState::Idle;
                Err(err)
            }
        }
    }

    /// Close the cycle
    pub fn finish(&mut self) -> Result<(), MpcError> {
        self.expect_state(ControllerState::ActionApplied, "finish")?;
        self.state = ControllerState::Idle;
        Ok(())
    }

    /// One full `Idle → … → Idle` cycle
    pub fn tick(&mut self, inputs: &L::Inputs) -> Result<TickReport<L::Output>, MpcError> {
        self.bind(inputs)?;
        self.solve()?;
        self.apply(inputs)?;
        self.finish()?;

        let attempt = self.attempt.take().unwrap_or(Attempt {
            status: None,
            error: None,
            plan: None,
        });
        tracing::debug!(
            layer = self.layer.name(),
            status = ?attempt.status,
            held = attempt.error.is_some(),
            "tick"
        );
        Ok(TickReport {
            layer: self.layer.name().to_string(),
            action: self.last_action.clone(),
            status: attempt.status,
            held: attempt.error.is_some(),
            error: attempt.error,
            plan: attempt.plan,
            state: self.x.clone(),
        })
    }

    /// Abandon a half-finished cycle
    pub fn reset(&mut self) {
        self.params = None;
        self.attempt = None;
        self.state = ControllerState::Idle;
    }

    fn expect_state(&self, expected: ControllerState, action: &'static str) -> Result<(), MpcError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(MpcError::InvalidTransition {
                layer: self.layer.name().to_string(),
                action,
                state: self.state,
            })
        }
    }
}

fn check_state<L: Layer>(layer: &L, x: &[f64]) -> Result<(), MpcError> {
    if x.len() != layer.state_dim() {
        return Err(MpcError::StateDimension {
            layer: layer.name().to_string(),
            expected: layer.state_dim(),
            actual: x.len(),
        });
    }
    match x.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MpcError::NonFiniteState {
            layer: layer.name().to_string(),
            index,
        }),
        None => Ok(()),
    }
}
