//! Backend-independent constraint model.
//!
//! [`CpModel`] is the constraint system the pipeline poses: integer and
//! boolean variables, linear constraints (optionally guarded by a boolean),
//! exactly-one, no-overlap over intervals, a binary multiplication equality
//! and a table upper bound. It carries the objective, solver parameters and
//! warm-start hints; lowering and search live in the backend.
//!
//! The shape deliberately mirrors a CP-SAT model so each optimization stage
//! can freeze the previous objective as a floor constraint on the same model
//! instance and re-solve.

use std::time::Duration;

/// Integer decision variable handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IntVar(pub(crate) usize);

/// Boolean decision variable handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoolVar(pub(crate) usize);

/// An integer linear expression `sum(coeff * var) + constant`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub(crate) terms: Vec<(IntVar, i64)>,
    pub(crate) constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of variables with coefficient one.
    pub fn sum<I: IntoIterator<Item = IntVar>>(vars: I) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1)).collect(),
            constant: 0,
        }
    }

    pub fn term(mut self, var: IntVar, coeff: i64) -> Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn constant(mut self, constant: i64) -> Self {
        self.constant += constant;
        self
    }
}

impl From<IntVar> for LinearExpr {
    fn from(var: IntVar) -> Self {
        LinearExpr::new().term(var, 1)
    }
}

/// Comparison operator of a linear constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Le,
    Ge,
    Eq,
}

/// A task interval for the no-overlap constraint. Zero-length flexible
/// intervals overlap nothing.
#[derive(Clone, Debug)]
pub enum Interval {
    Flexible { start: IntVar, len: IntVar, end: IntVar },
    Fixed { start: i64, len: i64 },
}

#[derive(Clone, Debug)]
pub(crate) enum Constraint {
    Linear {
        expr: LinearExpr,
        op: CmpOp,
        rhs: i64,
        guard: Option<BoolVar>,
    },
    ExactlyOne {
        literals: Vec<BoolVar>,
    },
    NoOverlap {
        intervals: Vec<Interval>,
    },
    /// `target == a * b`.
    Multiplication {
        target: IntVar,
        a: IntVar,
        b: LinearExpr,
    },
    /// `bound <= table[index]`, the piecewise link between available time and
    /// utility. The table is indexed at every slot, so the "piecewise linear"
    /// function is a plain lookup.
    TableUpperBound {
        bound: IntVar,
        index: IntVar,
        table: Vec<i64>,
    },
}

#[derive(Clone, Debug, Default)]
pub(crate) enum Objective {
    #[default]
    None,
    Maximize(LinearExpr),
    Minimize(LinearExpr),
}

/// Solver invocation parameters.
#[derive(Clone, Debug)]
pub struct SolverParams {
    /// Stop when provably within this fraction of the optimum (where the
    /// backend supports gap-based termination).
    pub relative_gap: f64,
    /// Wall-clock ceiling per solve.
    pub timeout: Duration,
    /// Log search progress.
    pub log_search_progress: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            relative_gap: 0.02,
            timeout: Duration::from_secs(120),
            log_search_progress: false,
        }
    }
}

/// A satisfying assignment extracted from the backend.
#[derive(Clone, Debug)]
pub struct Solution {
    pub(crate) objective: i64,
    pub(crate) values: Vec<i64>,
}

impl Solution {
    /// Objective value of this solution.
    pub fn objective(&self) -> i64 {
        self.objective
    }

    /// Assigned value of an integer variable.
    pub fn value(&self, var: IntVar) -> i64 {
        self.values[var.0]
    }
}

/// In-flight linear constraint, allowing a guard to be attached CP-SAT style.
pub struct ConstraintBuilder<'a> {
    model: &'a mut CpModel,
    index: usize,
}

impl ConstraintBuilder<'_> {
    /// Enforce the constraint only when `guard` is true.
    pub fn only_enforce_if(self, guard: BoolVar) {
        if let Constraint::Linear { guard: slot, .. } = &mut self.model.constraints[self.index] {
            *slot = Some(guard);
        }
    }
}

/// The constraint model.
#[derive(Clone, Debug, Default)]
pub struct CpModel {
    pub(crate) int_vars: Vec<(i64, i64)>,
    pub(crate) bool_count: usize,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) objective: Objective,
    pub(crate) hints: Vec<(IntVar, i64)>,
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, lb: i64, ub: i64) -> IntVar {
        debug_assert!(lb <= ub, "empty domain [{lb}, {ub}]");
        self.int_vars.push((lb, ub));
        IntVar(self.int_vars.len() - 1)
    }

    pub fn new_bool_var(&mut self) -> BoolVar {
        self.bool_count += 1;
        BoolVar(self.bool_count - 1)
    }

    /// Number of integer variables created so far.
    pub fn int_var_count(&self) -> usize {
        self.int_vars.len()
    }

    /// Iterate over all integer variables.
    pub fn int_vars(&self) -> impl Iterator<Item = IntVar> {
        (0..self.int_vars.len()).map(IntVar)
    }

    /// Add a linear constraint `expr <op> rhs`.
    pub fn add(
        &mut self,
        expr: impl Into<LinearExpr>,
        op: CmpOp,
        rhs: i64,
    ) -> ConstraintBuilder<'_> {
        self.constraints.push(Constraint::Linear {
            expr: expr.into(),
            op,
            rhs,
            guard: None,
        });
        let index = self.constraints.len() - 1;
        ConstraintBuilder { model: self, index }
    }

    /// Exactly one of the booleans is true.
    pub fn add_exactly_one(&mut self, literals: Vec<BoolVar>) {
        self.constraints.push(Constraint::ExactlyOne { literals });
    }

    /// The intervals must not overlap pairwise.
    pub fn add_no_overlap(&mut self, intervals: Vec<Interval>) {
        self.constraints.push(Constraint::NoOverlap { intervals });
    }

    /// `target == a * b`.
    pub fn add_multiplication_equality(&mut self, target: IntVar, a: IntVar, b: LinearExpr) {
        self.constraints
            .push(Constraint::Multiplication { target, a, b });
    }

    /// `bound <= table[index]`. The index variable's domain must lie within
    /// the table.
    pub fn add_table_upper_bound(&mut self, bound: IntVar, index: IntVar, table: Vec<i64>) {
        self.constraints.push(Constraint::TableUpperBound {
            bound,
            index,
            table,
        });
    }

    pub fn maximize(&mut self, expr: LinearExpr) {
        self.objective = Objective::Maximize(expr);
    }

    pub fn minimize(&mut self, expr: LinearExpr) {
        self.objective = Objective::Minimize(expr);
    }

    pub fn clear_objective(&mut self) {
        self.objective = Objective::None;
    }

    /// Record a warm-start hint for the next solve. Backends without hint
    /// support ignore these.
    pub fn add_hint(&mut self, var: IntVar, value: i64) {
        self.hints.push((var, value));
    }

    pub fn clear_hints(&mut self) {
        self.hints.clear();
    }

    /// Reinstall the previous solution as hints for every integer variable.
    pub fn hint_solution(&mut self, solution: &Solution) {
        self.clear_hints();
        for var in (0..self.int_vars.len().min(solution.values.len())).map(IntVar) {
            self.hints.push((var, solution.value(var)));
        }
    }
}
