//! Parametrized nonlinear programs assembled from small differentiable blocks.
//!
//! ```text
//! minimize    Σ_k f_k(z[S_k], p)
//! subject to  lo_c ≤ c_b(z[S_b], p) ≤ hi_c      for every constraint block b
//!             lo_z ≤ z ≤ hi_z
//! ```
//!
//! Decision variables are declared as named matrix blocks (`rows × cols`,
//! column-major, one column per shooting node for time-indexed quantities).
//! Parameters are named vectors that stay symbolic until [`Problem::bind`]
//! turns concrete values into a [`ParameterValues`] snapshot.
//!
//! Every objective term and constraint block only sees the variables it was
//! declared over (`S_k`, `S_b`). That keeps the constraint Jacobian sparse: a
//! block contributes a dense `rows × |S_b|` patch and nothing else.
//!
//! # Example
//!
//! ```
//! use oec_algo::nlp::{Constraint, ProblemBuilder};
//!
//! let mut b = ProblemBuilder::new();
//! let x = b.variable("x", 1, 2).unwrap();
//! let target = b.parameter("target", 1).unwrap();
//! b.bound_all(x, 0.0, 10.0);
//! b.subject_to(
//!     Constraint::new("sum", [x.all()], |v, _| vec![v[0] + v[1]]).equal_to(3.0),
//! );
//! b.minimize("track", [x.all()], move |v, p| {
//!     let t = target.get(p, 0);
//!     (v[0] - t) * (v[0] - t) + (v[1] - t) * (v[1] - t)
//! });
//! let problem = b.build().unwrap();
//! assert_eq!(problem.n_variables(), 2);
//! assert_eq!(problem.n_constraints(), 1);
//! ```

use num_dual::Dual64;
use oec_core::{ClosureExpression, DifferentiableExpression, DualFn, ModelError};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Magnitude at or beyond which a bound counts as absent
pub const INFINITE_BOUND: f64 = 1e19;

/// Errors raised while building or binding a problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("variable `{0}` declared twice")]
    DuplicateVariable(String),

    #[error("parameter `{0}` declared twice")]
    DuplicateParameter(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("parameter `{0}` was not bound")]
    MissingParameter(String),

    #[error("parameter `{name}` has length {actual}, expected {expected}")]
    ParameterLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("`{name}` references variable index {index}, problem has {len}")]
    IndexOutOfRange { name: String, index: usize, len: usize },

    #[error("constraint `{constraint}` produces {actual} rows, expected {expected}")]
    ConstraintDimension {
        constraint: String,
        expected: usize,
        actual: usize,
    },

    #[error("constraint `{constraint}` takes {expected} inputs, {actual} variables selected")]
    ExpressionInputs {
        constraint: String,
        expected: usize,
        actual: usize,
    },

    #[error("`{name}` has lower bound {lower} above upper bound {upper}")]
    InvalidBound { name: String, lower: f64, upper: f64 },

    #[error("invalid shooting setup: {0}")]
    InvalidShooting(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

// =============================================================================
// Handles
// =============================================================================

/// A `rows × cols` block of decision variables, stored column-major
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarBlock {
    offset: usize,
    rows: usize,
    cols: usize,
}

impl VarBlock {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Global index of entry `(row, col)`
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        self.offset + col * self.rows + row
    }

    /// Single entry
    pub fn at(&self, row: usize, col: usize) -> Selection {
        Selection(vec![self.index(row, col)])
    }

    /// Column `col` (all rows), e.g. the state at one shooting node
    pub fn col(&self, col: usize) -> Selection {
        Selection((0..self.rows).map(|r| self.index(r, col)).collect())
    }

    /// Row `row` across every column
    pub fn row(&self, row: usize) -> Selection {
        Selection((0..self.cols).map(|c| self.index(row, c)).collect())
    }

    pub fn all(&self) -> Selection {
        Selection((self.offset..self.offset + self.len()).collect())
    }

    /// Value of entry `(row, col)` in a primal vector
    pub fn value(&self, z: &[f64], row: usize, col: usize) -> f64 {
        z[self.index(row, col)]
    }

    /// Column `col` of a primal vector
    pub fn column<'a>(&self, z: &'a [f64], col: usize) -> &'a [f64] {
        let start = self.index(0, col);
        &z[start..start + self.rows]
    }

    /// The block as a list of columns
    pub fn columns(&self, z: &[f64]) -> Vec<Vec<f64>> {
        (0..self.cols).map(|c| self.column(z, c).to_vec()).collect()
    }
}

/// A named parameter vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBlock {
    offset: usize,
    len: usize,
}

impl ParamBlock {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Entry `k` of this parameter in the full parameter vector
    #[inline]
    pub fn get(&self, p: &[f64], k: usize) -> f64 {
        p[self.offset + k]
    }

    pub fn slice<'a>(&self, p: &'a [f64]) -> &'a [f64] {
        &p[self.offset..self.offset + self.len]
    }
}

/// Global variable indices feeding an expression, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(Vec<usize>);

impl Selection {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<VarBlock> for Selection {
    fn from(block: VarBlock) -> Self {
        block.all()
    }
}

fn flatten(vars: impl IntoIterator<Item = Selection>) -> Vec<usize> {
    vars.into_iter().flat_map(|s| s.0).collect()
}

// =============================================================================
// Constraints and objective terms
// =============================================================================

/// Right-hand side of a constraint: broadcast scalar or one value per row
#[derive(Debug, Clone, PartialEq)]
pub enum Rhs {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<f64> for Rhs {
    fn from(v: f64) -> Self {
        Rhs::Scalar(v)
    }
}

impl From<Vec<f64>> for Rhs {
    fn from(v: Vec<f64>) -> Self {
        Rhs::Vector(v)
    }
}

impl Rhs {
    fn expand(&self, name: &str, rows: usize) -> Result<Vec<f64>, ProblemError> {
        match self {
            Rhs::Scalar(v) => Ok(vec![*v; rows]),
            Rhs::Vector(v) if v.len() == rows => Ok(v.clone()),
            Rhs::Vector(v) => Err(ProblemError::ConstraintDimension {
                constraint: name.to_string(),
                expected: rows,
                actual: v.len(),
            }),
        }
    }
}

enum ConstraintBody {
    Closure(DualFn),
    Expression(Arc<dyn DifferentiableExpression>),
}

/// A block of constraint rows over a selection of variables.
///
/// Defaults to `== 0` until one of the relation methods is applied.
pub struct Constraint {
    name: String,
    vars: Vec<usize>,
    body: ConstraintBody,
    lower: Rhs,
    upper: Rhs,
}

impl Constraint {
    pub fn new<F>(name: impl Into<String>, vars: impl IntoIterator<Item = Selection>, f: F) -> Self
    where
        F: Fn(&[Dual64], &[f64]) -> Vec<Dual64> + Send + Sync + 'static,
    {
        Self::with_body(name, vars, ConstraintBody::Closure(Arc::new(f)))
    }

    /// Rows given by a prebuilt expression; its input count must match the
    /// selected variables.
    pub fn from_expression<E>(name: impl Into<String>, vars: impl IntoIterator<Item = Selection>, expr: E) -> Self
    where
        E: DifferentiableExpression + 'static,
    {
        Self::with_body(name, vars, ConstraintBody::Expression(Arc::new(expr)))
    }

    fn with_body(name: impl Into<String>, vars: impl IntoIterator<Item = Selection>, body: ConstraintBody) -> Self {
        Self {
            name: name.into(),
            vars: flatten(vars),
            body,
            lower: Rhs::Scalar(0.0),
            upper: Rhs::Scalar(0.0),
        }
    }

    pub fn equal_to(mut self, rhs: impl Into<Rhs>) -> Self {
        let rhs = rhs.into();
        self.lower = rhs.clone();
        self.upper = rhs;
        self
    }

    pub fn between(mut self, lower: impl Into<Rhs>, upper: impl Into<Rhs>) -> Self {
        self.lower = lower.into();
        self.upper = upper.into();
        self
    }

    pub fn at_most(mut self, upper: impl Into<Rhs>) -> Self {
        self.lower = Rhs::Scalar(f64::NEG_INFINITY);
        self.upper = upper.into();
        self
    }

    pub fn at_least(mut self, lower: impl Into<Rhs>) -> Self {
        self.lower = lower.into();
        self.upper = Rhs::Scalar(f64::INFINITY);
        self
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct ConstraintBlock {
    name: String,
    vars: Vec<usize>,
    expr: Arc<dyn DifferentiableExpression>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    row_offset: usize,
}

#[derive(Debug, Clone)]
struct ObjectiveTerm {
    name: String,
    vars: Vec<usize>,
    expr: ClosureExpression,
}

#[derive(Debug, Clone)]
struct NamedVar {
    name: String,
    block: VarBlock,
}

#[derive(Debug, Clone)]
struct NamedParam {
    name: String,
    block: ParamBlock,
}

// =============================================================================
// Builder
// =============================================================================

/// Incrementally declares variables, parameters, constraints and cost terms
#[derive(Debug, Default)]
pub struct ProblemBuilder {
    variables: Vec<NamedVar>,
    parameters: Vec<NamedParam>,
    n_var: usize,
    n_param: usize,
    lower: Vec<f64>,
    upper: Vec<f64>,
    constraints: Vec<Constraint>,
    objective: Vec<(String, Vec<usize>, ClosureExpression)>,
    /// First bounded index past the declared variables
    stray_bound: Option<usize>,
}

impl ProblemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a `rows × cols` variable block, unbounded until bounded
    pub fn variable(&mut self, name: &str, rows: usize, cols: usize) -> Result<VarBlock, ProblemError> {
        if self.variables.iter().any(|v| v.name == name) {
            return Err(ProblemError::DuplicateVariable(name.to_string()));
        }
        let block = VarBlock {
            offset: self.n_var,
            rows,
            cols,
        };
        self.n_var += block.len();
        self.lower.resize(self.n_var, f64::NEG_INFINITY);
        self.upper.resize(self.n_var, f64::INFINITY);
        self.variables.push(NamedVar {
            name: name.to_string(),
            block,
        });
        Ok(block)
    }

    pub fn parameter(&mut self, name: &str, len: usize) -> Result<ParamBlock, ProblemError> {
        if self.parameters.iter().any(|p| p.name == name) {
            return Err(ProblemError::DuplicateParameter(name.to_string()));
        }
        let block = ParamBlock {
            offset: self.n_param,
            len,
        };
        self.n_param += len;
        self.parameters.push(NamedParam {
            name: name.to_string(),
            block,
        });
        Ok(block)
    }

    /// Box-bound an arbitrary selection.
    ///
    /// Indices past the declared variables are reported by [`Self::build`].
    pub fn bound(&mut self, sel: Selection, lower: f64, upper: f64) -> &mut Self {
        for i in sel.0 {
            if i < self.n_var {
                self.lower[i] = lower;
                self.upper[i] = upper;
            } else if self.stray_bound.is_none() {
                self.stray_bound = Some(i);
            }
        }
        self
    }

    /// Box-bound one row of a block across all its columns
    pub fn bound_row(&mut self, block: VarBlock, row: usize, lower: f64, upper: f64) -> &mut Self {
        self.bound(block.row(row), lower, upper)
    }

    /// Box-bound every entry of a block
    pub fn bound_all(&mut self, block: VarBlock, lower: f64, upper: f64) -> &mut Self {
        self.bound(block.all(), lower, upper)
    }

    pub fn subject_to(&mut self, constraint: Constraint) -> &mut Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a scalar cost term over a selection of variables
    pub fn minimize<F>(&mut self, name: &str, vars: impl IntoIterator<Item = Selection>, f: F) -> &mut Self
    where
        F: Fn(&[Dual64], &[f64]) -> Dual64 + Send + Sync + 'static,
    {
        let vars = flatten(vars);
        let expr = ClosureExpression::scalar(vars.len(), f);
        self.objective.push((name.to_string(), vars, expr));
        self
    }

    pub fn n_variables(&self) -> usize {
        self.n_var
    }

    /// Handle of a variable declared earlier
    pub fn find_variable(&self, name: &str) -> Result<VarBlock, ProblemError> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.block)
            .ok_or_else(|| ProblemError::UnknownVariable(name.to_string()))
    }

    /// Handle of a parameter declared earlier
    pub fn find_parameter(&self, name: &str) -> Result<ParamBlock, ProblemError> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.block)
            .ok_or_else(|| ProblemError::UnknownParameter(name.to_string()))
    }

    /// Validate every block once and freeze the problem
    pub fn build(self) -> Result<Problem, ProblemError> {
        let n_var = self.n_var;
        let zero_params = vec![0.0; self.n_param];

        if let Some(index) = self.stray_bound {
            return Err(ProblemError::IndexOutOfRange {
                name: "bound".to_string(),
                index,
                len: n_var,
            });
        }

        for v in &self.variables {
            for i in v.block.offset..v.block.offset + v.block.len() {
                if self.lower[i] > self.upper[i] {
                    return Err(ProblemError::InvalidBound {
                        name: v.name.clone(),
                        lower: self.lower[i],
                        upper: self.upper[i],
                    });
                }
            }
        }

        let check_indices = |name: &str, vars: &[usize]| -> Result<(), ProblemError> {
            match vars.iter().find(|&&i| i >= n_var) {
                Some(&index) => Err(ProblemError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                    len: n_var,
                }),
                None => Ok(()),
            }
        };

        let mut constraints = Vec::with_capacity(self.constraints.len());
        let mut row_offset = 0;
        for c in self.constraints {
            check_indices(&c.name, &c.vars)?;
            let expr: Arc<dyn DifferentiableExpression> = match c.body {
                ConstraintBody::Closure(f) => {
                    let zeros = vec![Dual64::from(0.0); c.vars.len()];
                    let rows = f(&zeros, &zero_params).len();
                    Arc::new(ClosureExpression::new(c.vars.len(), rows, move |x, p| f(x, p)))
                }
                ConstraintBody::Expression(e) if e.input_len() != c.vars.len() => {
                    return Err(ProblemError::ExpressionInputs {
                        constraint: c.name,
                        expected: e.input_len(),
                        actual: c.vars.len(),
                    });
                }
                ConstraintBody::Expression(e) => e,
            };
            let rows = expr.output_len();
            if rows == 0 {
                return Err(ProblemError::ConstraintDimension {
                    constraint: c.name,
                    expected: 1,
                    actual: 0,
                });
            }
            let lower = c.lower.expand(&c.name, rows)?;
            let upper = c.upper.expand(&c.name, rows)?;
            if let Some((l, u)) = lower.iter().zip(&upper).find(|(l, u)| l > u) {
                return Err(ProblemError::InvalidBound {
                    name: c.name,
                    lower: *l,
                    upper: *u,
                });
            }
            constraints.push(ConstraintBlock {
                name: c.name,
                vars: c.vars,
                expr,
                lower,
                upper,
                row_offset,
            });
            row_offset += rows;
        }

        let mut objective = Vec::with_capacity(self.objective.len());
        for (name, vars, expr) in self.objective {
            check_indices(&name, &vars)?;
            objective.push(ObjectiveTerm { name, vars, expr });
        }

        let mut jac_rows = Vec::new();
        let mut jac_cols = Vec::new();
        for block in &constraints {
            for i in 0..block.lower.len() {
                for &j in &block.vars {
                    jac_rows.push(block.row_offset + i);
                    jac_cols.push(j);
                }
            }
        }

        let mut con_lower = Vec::with_capacity(row_offset);
        let mut con_upper = Vec::with_capacity(row_offset);
        for block in &constraints {
            con_lower.extend_from_slice(&block.lower);
            con_upper.extend_from_slice(&block.upper);
        }

        tracing::debug!(
            variables = n_var,
            parameters = self.n_param,
            constraints = row_offset,
            jacobian_nnz = jac_rows.len(),
            "problem built"
        );

        Ok(Problem {
            variables: self.variables,
            parameters: self.parameters,
            n_var,
            n_param: self.n_param,
            n_con: row_offset,
            lower: self.lower,
            upper: self.upper,
            con_lower,
            con_upper,
            constraints,
            objective,
            jac_rows,
            jac_cols,
        })
    }
}

// =============================================================================
// Problem
// =============================================================================

/// Concrete values for every declared parameter, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterValues {
    values: Vec<f64>,
}

impl ParameterValues {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One violated constraint row or variable bound
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub name: String,
    pub magnitude: f64,
}

/// A frozen, parametrized NLP
#[derive(Debug, Clone)]
pub struct Problem {
    variables: Vec<NamedVar>,
    parameters: Vec<NamedParam>,
    n_var: usize,
    n_param: usize,
    n_con: usize,
    lower: Vec<f64>,
    upper: Vec<f64>,
    con_lower: Vec<f64>,
    con_upper: Vec<f64>,
    constraints: Vec<ConstraintBlock>,
    objective: Vec<ObjectiveTerm>,
    jac_rows: Vec<usize>,
    jac_cols: Vec<usize>,
}

impl Problem {
    pub fn n_variables(&self) -> usize {
        self.n_var
    }

    pub fn n_constraints(&self) -> usize {
        self.n_con
    }

    pub fn n_parameters(&self) -> usize {
        self.n_param
    }

    pub fn variable(&self, name: &str) -> Result<VarBlock, ProblemError> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.block)
            .ok_or_else(|| ProblemError::UnknownVariable(name.to_string()))
    }

    pub fn parameter(&self, name: &str) -> Result<ParamBlock, ProblemError> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.block)
            .ok_or_else(|| ProblemError::UnknownParameter(name.to_string()))
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn variable_bounds(&self) -> (&[f64], &[f64]) {
        (&self.lower, &self.upper)
    }

    pub fn constraint_bounds(&self) -> (&[f64], &[f64]) {
        (&self.con_lower, &self.con_upper)
    }

    /// Turn named values into a parameter snapshot.
    ///
    /// Every declared parameter must be bound exactly once with its declared
    /// length; unknown names are rejected.
    pub fn bind(&self, bindings: &[(&str, &[f64])]) -> Result<ParameterValues, ProblemError> {
        let mut values = vec![0.0; self.n_param];
        let mut seen = HashSet::new();
        for (name, value) in bindings {
            let block = self.parameter(name)?;
            if value.len() != block.len {
                return Err(ProblemError::ParameterLength {
                    name: name.to_string(),
                    expected: block.len,
                    actual: value.len(),
                });
            }
            values[block.offset..block.offset + block.len].copy_from_slice(value);
            seen.insert(*name);
        }
        if let Some(missing) = self.parameters.iter().find(|p| !seen.contains(p.name.as_str())) {
            return Err(ProblemError::MissingParameter(missing.name.clone()));
        }
        Ok(ParameterValues { values })
    }

    /// Zero start projected onto the variable box
    pub fn initial_guess(&self) -> Vec<f64> {
        self.project(&vec![0.0; self.n_var])
    }

    /// Clamp a primal vector onto the variable box
    pub fn project(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(&v, (&lo, &hi))| v.max(lo).min(hi))
            .collect()
    }

    /// Shift every time-indexed block (more than one column) one column
    /// earlier, repeating the last column.
    pub fn shift_warm_start(&self, z: &[f64]) -> Vec<f64> {
        let mut shifted = z.to_vec();
        for v in &self.variables {
            let b = v.block;
            if b.cols < 2 {
                continue;
            }
            for c in 0..b.cols - 1 {
                for r in 0..b.rows {
                    shifted[b.index(r, c)] = z[b.index(r, c + 1)];
                }
            }
        }
        shifted
    }

    // -------------------------------------------------------------------------
    // Objective
    // -------------------------------------------------------------------------

    pub fn objective(&self, z: &[f64], p: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|t| t.expr.evaluate(&gather(z, &t.vars), p)[0])
            .sum()
    }

    /// Objective value split by term name (terms sharing a name are summed)
    pub fn objective_terms(&self, z: &[f64], p: &[f64]) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = Vec::new();
        for t in &self.objective {
            let v = t.expr.evaluate(&gather(z, &t.vars), p)[0];
            match out.iter_mut().find(|(n, _)| *n == t.name) {
                Some((_, acc)) => *acc += v,
                None => out.push((t.name.clone(), v)),
            }
        }
        out
    }

    pub fn gradient(&self, z: &[f64], p: &[f64]) -> Vec<f64> {
        self.objective_and_gradient(z, p).1
    }

    pub fn objective_and_gradient(&self, z: &[f64], p: &[f64]) -> (f64, Vec<f64>) {
        let mut grad = vec![0.0; self.n_var];
        let mut value = 0.0;
        for t in &self.objective {
            let (v, jac) = t.expr.jacobian(&gather(z, &t.vars), p);
            value += v.first().copied().unwrap_or(0.0);
            for (&j, d) in t.vars.iter().zip(jac) {
                grad[j] += d;
            }
        }
        (value, grad)
    }

    // -------------------------------------------------------------------------
    // Constraints
    // -------------------------------------------------------------------------

    pub fn constraints(&self, z: &[f64], p: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_con);
        for block in &self.constraints {
            out.extend(block.expr.evaluate(&gather(z, &block.vars), p));
        }
        out
    }

    /// Values of one named constraint block
    pub fn constraint_values(&self, name: &str, z: &[f64], p: &[f64]) -> Option<Vec<f64>> {
        self.constraints
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.expr.evaluate(&gather(z, &b.vars), p))
    }

    /// Sparsity pattern `(rows, cols)` of the constraint Jacobian
    pub fn jacobian_structure(&self) -> (&[usize], &[usize]) {
        (&self.jac_rows, &self.jac_cols)
    }

    /// Constraint values and Jacobian entries in [`Self::jacobian_structure`] order
    pub fn constraints_and_jacobian(&self, z: &[f64], p: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut values = Vec::with_capacity(self.n_con);
        let mut jac = Vec::with_capacity(self.jac_rows.len());
        for block in &self.constraints {
            let (v, j) = block.expr.jacobian(&gather(z, &block.vars), p);
            values.extend(v);
            jac.extend(j);
        }
        (values, jac)
    }

    /// Name of constraint row `row`, e.g. `dynamics[3][1]`
    pub fn row_name(&self, row: usize) -> String {
        let idx = self.constraints.partition_point(|b| b.row_offset <= row);
        match idx.checked_sub(1).and_then(|i| self.constraints.get(i)) {
            Some(b) if b.lower.len() == 1 => b.name.clone(),
            Some(b) => format!("{}[{}]", b.name, row - b.row_offset),
            None => format!("row[{row}]"),
        }
    }

    /// Name of variable entry `index`, e.g. `x[2,5]`
    pub fn variable_name(&self, index: usize) -> String {
        for v in &self.variables {
            let b = v.block;
            if index >= b.offset && index < b.offset + b.len() {
                let local = index - b.offset;
                return format!("{}[{},{}]", v.name, local % b.rows.max(1), local / b.rows.max(1));
            }
        }
        format!("z[{index}]")
    }

    /// Largest constraint or bound violation
    pub fn max_violation(&self, z: &[f64], p: &[f64]) -> f64 {
        let c = self.constraints(z, p);
        row_violations(&c, &self.con_lower, &self.con_upper)
            .chain(row_violations(z, &self.lower, &self.upper))
            .fold(0.0, f64::max)
    }

    /// Largest variable bound violation
    pub fn bound_violation(&self, z: &[f64]) -> f64 {
        row_violations(z, &self.lower, &self.upper).fold(0.0, f64::max)
    }

    /// Violated rows and bounds above `threshold`, largest first, at most `limit`
    pub fn violations(&self, z: &[f64], p: &[f64], threshold: f64, limit: usize) -> Vec<Violation> {
        let c = self.constraints(z, p);
        let mut out: Vec<Violation> = row_violations(&c, &self.con_lower, &self.con_upper)
            .enumerate()
            .filter(|(_, m)| *m > threshold)
            .map(|(r, m)| Violation {
                name: self.row_name(r),
                magnitude: m,
            })
            .collect();
        out.extend(
            row_violations(z, &self.lower, &self.upper)
                .enumerate()
                .filter(|(_, m)| *m > threshold)
                .map(|(i, m)| Violation {
                    name: format!("{} bound", self.variable_name(i)),
                    magnitude: m,
                }),
        );
        out.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        out.truncate(limit);
        out
    }
}

fn gather(z: &[f64], vars: &[usize]) -> Vec<f64> {
    vars.iter().map(|&i| z[i]).collect()
}

fn row_violations<'a>(v: &'a [f64], lo: &'a [f64], hi: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    v.iter().zip(lo.iter().zip(hi)).map(|(&x, (&l, &h))| {
        let below = if l > -INFINITE_BOUND { l - x } else { 0.0 };
        let above = if h < INFINITE_BOUND { x - h } else { 0.0 };
        below.max(above).max(0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_problem() -> Problem {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 2, 3).unwrap();
        let s = b.variable("s", 1, 1).unwrap();
        let target = b.parameter("target", 1).unwrap();
        b.bound_all(x, 0.0, 1.0);
        for i in 0..3 {
            b.subject_to(
                Constraint::new(format!("sum[{i}]"), [x.col(i), s.all()], |v, _| vec![v[0] + v[1] - v[2]])
                    .equal_to(0.5),
            );
        }
        b.subject_to(Constraint::new("cap", [x.row(0)], |v, _| vec![v[0], v[1], v[2]]).at_most(0.8));
        b.minimize("track", [x.all()], move |v, p| {
            let t = target.get(p, 0);
            v.iter().fold(Dual64::from(0.0), |acc, &vi| acc + (vi - t) * (vi - t))
        });
        b.minimize("slack", [s.all()], |v, _| v[0] * v[0] * 10.0);
        b.build().unwrap()
    }

    #[test]
    fn test_layout_is_column_major() {
        let p = small_problem();
        let x = p.variable("x").unwrap();
        assert_eq!(x.index(1, 2), 5);
        assert_eq!(x.col(1).indices(), &[2, 3]);
        assert_eq!(x.row(0).indices(), &[0, 2, 4]);
        assert_eq!(p.variable("s").unwrap().offset(), 6);
        assert_eq!(p.variable_name(5), "x[1,2]");
    }

    #[test]
    fn test_counts_and_sparsity() {
        let p = small_problem();
        assert_eq!(p.n_variables(), 7);
        assert_eq!(p.n_constraints(), 6);
        let (rows, cols) = p.jacobian_structure();
        // three 1×3 balance rows plus a 3×3 cap block
        assert_eq!(rows.len(), 9 + 9);
        assert_eq!(rows[0], 0);
        assert_eq!(cols[..3], [0, 1, 6]);
    }

    #[test]
    fn test_bind_rejects_unknown_and_missing() {
        let p = small_problem();
        assert!(matches!(
            p.bind(&[("nope", &[1.0])]),
            Err(ProblemError::UnknownParameter(_))
        ));
        assert!(matches!(p.bind(&[]), Err(ProblemError::MissingParameter(_))));
        assert!(matches!(
            p.bind(&[("target", &[1.0, 2.0])]),
            Err(ProblemError::ParameterLength { expected: 1, actual: 2, .. })
        ));
        let values = p.bind(&[("target", &[0.25])]).unwrap();
        assert_eq!(values.as_slice(), &[0.25]);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let p = small_problem();
        let params = [0.3];
        let z = vec![0.1, 0.7, 0.4, 0.2, 0.9, 0.5, 0.05];
        let (f, g) = p.objective_and_gradient(&z, &params);
        assert!((f - p.objective(&z, &params)).abs() < 1e-12);
        let h = 1e-6;
        for i in 0..z.len() {
            let mut zp = z.clone();
            zp[i] += h;
            let fd = (p.objective(&zp, &params) - f) / h;
            assert!((fd - g[i]).abs() < 1e-4, "component {i}: {fd} vs {}", g[i]);
        }
    }

    #[test]
    fn test_jacobian_values_follow_structure() {
        let p = small_problem();
        let z = vec![0.1, 0.7, 0.4, 0.2, 0.9, 0.5, 0.05];
        let (values, jac) = p.constraints_and_jacobian(&z, &[0.0]);
        assert_eq!(values, p.constraints(&z, &[0.0]));
        assert_eq!(&jac[..3], &[1.0, 1.0, -1.0]);
        // cap block is the identity over x[0, :]
        assert_eq!(&jac[9..18], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_violations_sorted_and_named() {
        let p = small_problem();
        let z = vec![0.95, 0.0, 0.0, 0.0, 1.3, 0.0, 0.0];
        let v = p.violations(&z, &[0.0], 1e-9, 10);
        assert_eq!(v[0].name, "sum[2]");
        assert!((v[0].magnitude - 0.8).abs() < 1e-12);
        assert!(v.iter().any(|x| x.name == "x[0,2] bound"));
        assert!(v.windows(2).all(|w| w[0].magnitude >= w[1].magnitude));
        assert!((p.max_violation(&z, &[0.0]) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_shift_warm_start() {
        let p = small_problem();
        let z = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let shifted = p.shift_warm_start(&z);
        assert_eq!(shifted, vec![3.0, 4.0, 5.0, 6.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut b = ProblemBuilder::new();
        b.variable("x", 1, 1).unwrap();
        assert!(matches!(b.variable("x", 2, 2), Err(ProblemError::DuplicateVariable(_))));
        b.parameter("p", 1).unwrap();
        assert!(matches!(b.parameter("p", 1), Err(ProblemError::DuplicateParameter(_))));
    }

    #[test]
    fn test_vector_rhs_length_checked() {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 2, 1).unwrap();
        b.subject_to(Constraint::new("pair", [x.all()], |v, _| v.to_vec()).equal_to(vec![1.0, 2.0, 3.0]));
        assert!(matches!(
            b.build(),
            Err(ProblemError::ConstraintDimension { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_bound_outside_problem_rejected() {
        let mut wide = ProblemBuilder::new();
        wide.variable("a", 4, 1).unwrap();
        let foreign = wide.variable("b", 2, 1).unwrap();

        let mut b = ProblemBuilder::new();
        b.variable("x", 3, 1).unwrap();
        b.bound(foreign.all(), 0.0, 1.0);
        assert_eq!(
            b.build().unwrap_err(),
            ProblemError::IndexOutOfRange {
                name: "bound".into(),
                index: 4,
                len: 3
            }
        );
    }

    #[test]
    fn test_expression_constraint_matches_closure() {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 2, 1).unwrap();
        b.subject_to(Constraint::new("closure", [x.all()], |v, p| vec![v[0] * v[1] * p[0]]));
        b.subject_to(Constraint::from_expression(
            "expr",
            [x.all()],
            ClosureExpression::new(2, 1, |v, p| vec![v[0] * v[1] * p[0]]),
        ));
        let p = b.build().unwrap();
        let (values, jac) = p.constraints_and_jacobian(&[2.0, 3.0], &[0.5]);
        assert_eq!(values, vec![3.0, 3.0]);
        assert_eq!(jac, vec![1.5, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_expression_input_count_checked() {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 3, 1).unwrap();
        b.subject_to(Constraint::from_expression(
            "short",
            [x.all()],
            ClosureExpression::new(2, 1, |v, _| vec![v[0] + v[1]]),
        ));
        assert!(matches!(
            b.build(),
            Err(ProblemError::ExpressionInputs { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 1, 1).unwrap();
        b.bound_all(x, 1.0, 0.0);
        assert!(matches!(b.build(), Err(ProblemError::InvalidBound { .. })));
    }
}
