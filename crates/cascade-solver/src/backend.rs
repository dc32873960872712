//! Lowering of [`CpModel`] onto the Pumpkin constraint solver.
//!
//! Every solve gets a fresh `Solver`: the model description is the durable
//! artifact, the solver instance is not. The lowering is mechanical:
//!
//! - linear constraints become scaled-view linear constraints, half-reified
//!   when guarded;
//! - exactly-one becomes a clause plus pairwise exclusion clauses;
//! - no-overlap becomes pairwise ordering disjunctions over a fresh literal
//!   (zero-length intervals satisfy either side trivially);
//! - the table upper bound becomes an element constraint over a constant
//!   array;
//! - the linear objective is materialized into a single variable optimized
//!   with linear SAT-UNSAT search under a wall-clock budget.
//!
//! Warm-start hints and the relative gap limit recorded on the model are not
//! supported by this backend and are ignored; the time budget is the
//! effective stop criterion.

use crate::model::{CmpOp, Constraint, CpModel, Interval, LinearExpr, Objective, Solution, SolverParams};
use crate::SolveError;

use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;

pub(crate) fn solve(model: &CpModel, params: &SolverParams) -> Result<Solution, SolveError> {
    let (objective_expr, direction) = match &model.objective {
        Objective::Maximize(expr) => (expr, OptimisationDirection::Maximise),
        Objective::Minimize(expr) => (expr, OptimisationDirection::Minimise),
        Objective::None => {
            return Err(SolveError::Internal("solve called without an objective".into()))
        }
    };

    let mut solver = Solver::default();
    let constraint_tag = solver.new_constraint_tag();

    let vars: Vec<DomainId> = model
        .int_vars
        .iter()
        .map(|&(lb, ub)| solver.new_bounded_integer(lb as i32, ub as i32))
        .collect();
    let literals: Vec<_> = (0..model.bool_count)
        .map(|_| solver.new_literal())
        .collect();

    let views = |expr: &LinearExpr| {
        expr.terms
            .iter()
            .map(|&(var, coeff)| vars[var.0].scaled(coeff as i32))
            .collect::<Vec<_>>()
    };

    for constraint in &model.constraints {
        match constraint {
            Constraint::Linear {
                expr,
                op,
                rhs,
                guard,
            } => {
                let terms = views(expr);
                let rhs = (rhs - expr.constant) as i32;
                match (op, guard) {
                    (CmpOp::Le, None) => {
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(terms, rhs, constraint_tag))
                            .post();
                    }
                    (CmpOp::Le, Some(g)) => {
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(terms, rhs, constraint_tag))
                            .implied_by(literals[g.0]);
                    }
                    (CmpOp::Ge, None) => {
                        let _ = solver
                            .add_constraint(cp::greater_than_or_equals(terms, rhs, constraint_tag))
                            .post();
                    }
                    (CmpOp::Ge, Some(g)) => {
                        let _ = solver
                            .add_constraint(cp::greater_than_or_equals(terms, rhs, constraint_tag))
                            .implied_by(literals[g.0]);
                    }
                    (CmpOp::Eq, None) => {
                        let _ = solver
                            .add_constraint(cp::equals(terms, rhs, constraint_tag))
                            .post();
                    }
                    (CmpOp::Eq, Some(g)) => {
                        let _ = solver
                            .add_constraint(cp::equals(terms, rhs, constraint_tag))
                            .implied_by(literals[g.0]);
                    }
                }
            }

            Constraint::ExactlyOne { literals: bits } => {
                let clause: Vec<_> = bits.iter().map(|b| literals[b.0]).collect();
                let _ = solver
                    .add_constraint(cp::clause(clause, constraint_tag))
                    .post();
                for (i, a) in bits.iter().enumerate() {
                    for b in &bits[i + 1..] {
                        let _ = solver
                            .add_constraint(cp::clause(
                                vec![!literals[a.0], !literals[b.0]],
                                constraint_tag,
                            ))
                            .post();
                    }
                }
            }

            Constraint::NoOverlap { intervals } => {
                // Pairwise ordering disjunctions over a fresh literal; the
                // constraints are over start/end expressions, so unscheduled
                // (zero-length) intervals stay feasible on either side.
                for (i, first) in intervals.iter().enumerate() {
                    for second in &intervals[i + 1..] {
                        match (first, second) {
                            (
                                Interval::Flexible {
                                    start: s1, end: e1, ..
                                },
                                Interval::Flexible {
                                    start: s2, end: e2, ..
                                },
                            ) => {
                                let order = solver.new_literal();
                                let _ = solver
                                    .add_constraint(cp::less_than_or_equals(
                                        vec![vars[e1.0].scaled(1), vars[s2.0].scaled(-1)],
                                        0,
                                        constraint_tag,
                                    ))
                                    .implied_by(order);
                                let _ = solver
                                    .add_constraint(cp::less_than_or_equals(
                                        vec![vars[e2.0].scaled(1), vars[s1.0].scaled(-1)],
                                        0,
                                        constraint_tag,
                                    ))
                                    .implied_by(!order);
                            }
                            (
                                Interval::Flexible { start, end, .. },
                                Interval::Fixed { start: fs, len },
                            )
                            | (
                                Interval::Fixed { start: fs, len },
                                Interval::Flexible { start, end, .. },
                            ) => {
                                let order = solver.new_literal();
                                let _ = solver
                                    .add_constraint(cp::less_than_or_equals(
                                        vec![vars[end.0].scaled(1)],
                                        *fs as i32,
                                        constraint_tag,
                                    ))
                                    .implied_by(order);
                                let _ = solver
                                    .add_constraint(cp::greater_than_or_equals(
                                        vec![vars[start.0].scaled(1)],
                                        (*fs + *len) as i32,
                                        constraint_tag,
                                    ))
                                    .implied_by(!order);
                            }
                            // Background blocks are pre-merged into a
                            // disjoint cover.
                            (Interval::Fixed { .. }, Interval::Fixed { .. }) => {}
                        }
                    }
                }
            }

            Constraint::Multiplication { target, a, b } => {
                // The model layer only emits affine factors (one variable
                // plus a constant, or a bare constant).
                let b_view = match b.terms.first() {
                    Some(&(var, coeff)) => {
                        vars[var.0].scaled(coeff as i32).offset(b.constant as i32)
                    }
                    None => {
                        let c = b.constant as i32;
                        solver.new_bounded_integer(c, c).scaled(1).offset(0)
                    }
                };
                let _ = solver
                    .add_constraint(cp::times(
                        vars[a.0].scaled(1),
                        b_view,
                        vars[target.0].scaled(1),
                        constraint_tag,
                    ))
                    .post();
            }

            Constraint::TableUpperBound {
                bound,
                index,
                table,
            } => {
                let min = table.iter().copied().min().unwrap_or(0) as i32;
                let max = table.iter().copied().max().unwrap_or(0) as i32;
                let array: Vec<DomainId> = table
                    .iter()
                    .map(|&v| solver.new_bounded_integer(v as i32, v as i32))
                    .collect();
                let value = solver.new_bounded_integer(min, max);
                let _ = solver
                    .add_constraint(cp::element(vars[index.0], array, value, constraint_tag))
                    .post();
                let _ = solver
                    .add_constraint(cp::less_than_or_equals(
                        vec![vars[bound.0].scaled(1), value.scaled(-1)],
                        0,
                        constraint_tag,
                    ))
                    .post();
            }
        }
    }

    // Materialize the linear objective into one variable.
    let (mut lb, mut ub) = (objective_expr.constant, objective_expr.constant);
    for &(var, coeff) in &objective_expr.terms {
        let (vlb, vub) = model.int_vars[var.0];
        if coeff >= 0 {
            lb += coeff * vlb;
            ub += coeff * vub;
        } else {
            lb += coeff * vub;
            ub += coeff * vlb;
        }
    }
    let objective_var = solver.new_bounded_integer(lb as i32, ub as i32);
    let mut terms = views(objective_expr);
    terms.push(objective_var.scaled(-1));
    let _ = solver
        .add_constraint(cp::equals(terms, -objective_expr.constant as i32, constraint_tag))
        .post();

    if !model.hints.is_empty() {
        tracing::debug!(
            hints = model.hints.len(),
            "warm-start hints recorded on the model are not supported by this backend"
        );
    }
    if params.log_search_progress {
        tracing::info!(
            int_vars = vars.len(),
            constraints = model.constraints.len(),
            timeout_secs = params.timeout.as_secs(),
            "starting solve"
        );
    }

    let mut brancher = solver.default_brancher();
    let mut termination = TimeBudget::starting_now(params.timeout);

    fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
    let result = solver.optimise(
        &mut brancher,
        &mut termination,
        LinearSatUnsat::new(direction, objective_var, noop_callback),
    );

    let solution = match result {
        OptimisationResult::Optimal(solution) => extract(&vars, objective_var, &solution),
        OptimisationResult::Satisfiable(solution) => extract(&vars, objective_var, &solution),
        OptimisationResult::Unsatisfiable => return Err(SolveError::Infeasible),
        OptimisationResult::Unknown => return Err(SolveError::SolverLimit),
    };

    if params.log_search_progress {
        tracing::info!(objective = solution.objective, "solve finished");
    }
    Ok(solution)
}

fn extract<S: ProblemSolution>(vars: &[DomainId], objective_var: DomainId, solution: &S) -> Solution {
    Solution {
        objective: solution.get_integer_value(objective_var) as i64,
        values: vars
            .iter()
            .map(|&v| solution.get_integer_value(v) as i64)
            .collect(),
    }
}
