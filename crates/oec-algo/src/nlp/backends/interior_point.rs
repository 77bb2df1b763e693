//! IPOPT interior-point backend.
//!
//! Hands IPOPT the sparse constraint Jacobian of the [`Problem`] and lets it
//! approximate the Hessian of the Lagrangian with limited-memory BFGS updates.

#![cfg(feature = "solver-ipopt")]

use crate::nlp::backends::NlpBackend;
use crate::nlp::config::SolverConfig;
use crate::nlp::problem::{ParameterValues, Problem, INFINITE_BOUND};
use crate::nlp::solution::{Diagnostics, SolveError, SolveResult, SolveStatus};
use ipopt::{BasicProblem, ConstrainedProblem, Index, Number};
use std::time::Instant;

/// IPOPT's own encoding of an absent bound
const IPOPT_INFINITY: f64 = 1e20;

/// Interior-point backend (requires the `solver-ipopt` feature)
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipopt;

/// A bound [`Problem`] seen through IPOPT's callback interface
struct IpoptNlp<'a> {
    problem: &'a Problem,
    params: &'a [f64],
    start: &'a [f64],
}

fn encode_bounds(src: &[f64], dst: &mut [Number]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = if s <= -INFINITE_BOUND {
            -IPOPT_INFINITY
        } else if s >= INFINITE_BOUND {
            IPOPT_INFINITY
        } else {
            s
        };
    }
}

impl BasicProblem for IpoptNlp<'_> {
    fn num_variables(&self) -> usize {
        self.problem.n_variables()
    }

    fn bounds(&self, x_l: &mut [Number], x_u: &mut [Number]) -> bool {
        let (lo, hi) = self.problem.variable_bounds();
        encode_bounds(lo, x_l);
        encode_bounds(hi, x_u);
        true
    }

    fn initial_point(&self, x: &mut [Number]) -> bool {
        x.copy_from_slice(self.start);
        true
    }

    fn objective(&self, x: &[Number], _new_x: bool, obj: &mut Number) -> bool {
        *obj = self.problem.objective(x, self.params);
        obj.is_finite()
    }

    fn objective_grad(&self, x: &[Number], _new_x: bool, grad_f: &mut [Number]) -> bool {
        let grad = self.problem.gradient(x, self.params);
        grad_f.copy_from_slice(&grad);
        grad.iter().all(|g| g.is_finite())
    }
}

impl ConstrainedProblem for IpoptNlp<'_> {
    fn num_constraints(&self) -> usize {
        self.problem.n_constraints()
    }

    fn num_constraint_jacobian_non_zeros(&self) -> usize {
        self.problem.jacobian_structure().0.len()
    }

    fn constraint_bounds(&self, g_l: &mut [Number], g_u: &mut [Number]) -> bool {
        let (lo, hi) = self.problem.constraint_bounds();
        encode_bounds(lo, g_l);
        encode_bounds(hi, g_u);
        true
    }

    fn constraint(&self, x: &[Number], _new_x: bool, g: &mut [Number]) -> bool {
        let values = self.problem.constraints(x, self.params);
        g.copy_from_slice(&values);
        values.iter().all(|v| v.is_finite())
    }

    fn constraint_jacobian_indices(&self, irow: &mut [Index], jcol: &mut [Index]) -> bool {
        let (rows, cols) = self.problem.jacobian_structure();
        for (k, (&r, &c)) in rows.iter().zip(cols).enumerate() {
            irow[k] = r as Index;
            jcol[k] = c as Index;
        }
        true
    }

    fn constraint_jacobian_values(&self, x: &[Number], _new_x: bool, vals: &mut [Number]) -> bool {
        let (_, jac) = self.problem.constraints_and_jacobian(x, self.params);
        vals.copy_from_slice(&jac);
        jac.iter().all(|v| v.is_finite())
    }

    // Limited-memory Hessian: IPOPT never asks for these
    fn num_hessian_non_zeros(&self) -> usize {
        0
    }

    fn hessian_indices(&self, _irow: &mut [Index], _jcol: &mut [Index]) -> bool {
        true
    }

    fn hessian_values(
        &self,
        _x: &[Number],
        _new_x: bool,
        _obj_factor: Number,
        _lambda: &[Number],
        _vals: &mut [Number],
    ) -> bool {
        true
    }
}

fn map_status(status: ipopt::SolveStatus) -> SolveStatus {
    match status {
        ipopt::SolveStatus::SolveSucceeded => SolveStatus::Optimal,
        ipopt::SolveStatus::SolvedToAcceptableLevel => SolveStatus::Acceptable,
        ipopt::SolveStatus::InfeasibleProblemDetected => SolveStatus::Infeasible,
        ipopt::SolveStatus::MaximumIterationsExceeded => SolveStatus::IterationLimit,
        ipopt::SolveStatus::MaximumCpuTimeExceeded => SolveStatus::Timeout,
        _ => SolveStatus::NumericalError,
    }
}

impl NlpBackend for Ipopt {
    fn id(&self) -> &str {
        "ipopt"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: &Problem,
        params: &ParameterValues,
        start: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolveError> {
        let started = Instant::now();
        let nlp = IpoptNlp {
            problem,
            params: params.as_slice(),
            start,
        };

        let mut solver = ipopt::Ipopt::new(nlp).map_err(|e| SolveError::Backend {
            backend: self.id().to_string(),
            message: format!("IPOPT init failed: {e:?}"),
        })?;

        solver.set_option("max_iter", config.max_iterations as i32);
        solver.set_option("tol", config.tol);
        solver.set_option("dual_inf_tol", config.dual_inf_tol);
        solver.set_option("compl_inf_tol", config.compl_inf_tol);
        solver.set_option("constr_viol_tol", config.tol);
        solver.set_option("acceptable_tol", config.acceptable_tol);
        solver.set_option("acceptable_constr_viol_tol", config.acceptable_tol);
        solver.set_option("acceptable_dual_inf_tol", config.acceptable_dual_inf_tol);
        solver.set_option("acceptable_compl_inf_tol", config.acceptable_compl_inf_tol);
        solver.set_option("acceptable_iter", config.acceptable_iter as i32);
        solver.set_option("print_level", 0);
        solver.set_option("sb", "yes");
        solver.set_option("hessian_approximation", "limited-memory");
        solver.set_option("limited_memory_max_history", config.lbfgs_memory as i32);
        if let Some(limit) = config.timeout {
            solver.set_option("max_cpu_time", limit.as_secs_f64());
        }

        let result = solver.solve();
        let status = map_status(result.status);
        let z = result.solver_data.solution.primal_variables.to_vec();
        let p = params.as_slice();

        let diagnostics = Diagnostics {
            backend: self.id().to_string(),
            primal_infeasibility: problem.max_violation(&z, p),
            elapsed: started.elapsed(),
            worst_violations: problem.violations(&z, p, config.tol, 5),
            ..Default::default()
        };

        Ok(SolveResult {
            status,
            objective: problem.objective(&z, p),
            primal: z,
            diagnostics,
        })
    }
}
