//! The staged optimization pipeline.
//!
//! Stage 1 ([`TotalUtilityModel`]) maximizes total utility. Stage 2
//! ([`CufModel`]) freezes that optimum as a floor and maximizes the
//! cumulative-utility-function integral, preferring earlier completion.
//! Stage 3 ([`IntervalLenModel`]) freezes the CUF optimum and minimizes total
//! scheduled length. The lexicographic order guarantees primary wins beat
//! secondary wins beat wasted time.
//!
//! All stages mutate the same [`CpModel`] description; every solve lowers it
//! onto a fresh backend solver. The previous stage's assignment is
//! reinstalled as hints between solves.

use crate::model::{CmpOp, CpModel, IntVar, Interval, LinearExpr, SolverParams};
use crate::{backend, background, curve, ProcessedAST, SolveError};
use cascade_core::{Schedule, ScheduleEntry, TaskId, SLOT_SECONDS, YSCALE};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Compute a schedule for the window, running all three stages.
pub fn schedule(
    ast: &ProcessedAST,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
) -> Result<Schedule, SolveError> {
    BasicModel::from_processed_ast(ast, start, end)?
        .into_total_utility_model()
        .into_cuf_model()?
        .into_interval_len_model()?
        .into_schedule()
}

/// Snap a timestamp up to the next slot boundary, measured from local
/// midnight of its day.
pub fn snap_to_slot(start: DateTime<Tz>) -> DateTime<Tz> {
    let local = start.naive_local();
    let midnight = local.date().and_time(NaiveTime::MIN);
    let elapsed = (local - midnight).num_seconds();
    let snapped = (elapsed + SLOT_SECONDS - 1).div_euclid(SLOT_SECONDS) * SLOT_SECONDS;
    start + Duration::seconds(snapped - elapsed)
}

/// Slot offset of an instant relative to the (snapped) schedule start,
/// rounding down.
fn instant_to_slot(instant: DateTime<Utc>, schedule_start: DateTime<Tz>) -> i64 {
    (instant - schedule_start.with_timezone(&Utc))
        .num_seconds()
        .div_euclid(SLOT_SECONDS)
}

#[derive(Clone, Copy, Debug)]
struct StepVars {
    start: IntVar,
    end: IntVar,
    len: IntVar,
}

/// Stage 0: variables, no-overlap and precedence. Carries no objective yet.
pub struct BasicModel<'a> {
    ast: &'a ProcessedAST,
    model: CpModel,
    steps: BTreeMap<TaskId, StepVars>,
    schedule_start: DateTime<Tz>,
    schedule_end: DateTime<Tz>,
    total_slots: i64,
    params: SolverParams,
}

impl<'a> BasicModel<'a> {
    /// Build the base constraint system over the window. The start is snapped
    /// up to the next slot boundary; the end must lie strictly after it.
    pub fn from_processed_ast(
        ast: &'a ProcessedAST,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Self, SolveError> {
        let schedule_start = snap_to_slot(start);
        if end <= schedule_start {
            return Err(SolveError::Window {
                start: schedule_start.to_string(),
                end: end.to_string(),
            });
        }
        let total_slots = (end - schedule_start)
            .num_seconds()
            .div_euclid(SLOT_SECONDS);

        let mut model = CpModel::new();
        let mut steps = BTreeMap::new();
        let mut intervals = Vec::new();

        for (id, node) in ast.nodes() {
            let start_var = model.new_int_var(0, total_slots);
            let end_var = model.new_int_var(0, total_slots);
            // len == 0 encodes "not scheduled"; the ceiling leaves room to
            // keep working past the estimate.
            let len_var = model.new_int_var(0, 2 * node.duration);
            model.add(
                LinearExpr::new()
                    .term(end_var, 1)
                    .term(start_var, -1)
                    .term(len_var, -1),
                CmpOp::Eq,
                0,
            );
            intervals.push(Interval::Flexible {
                start: start_var,
                len: len_var,
                end: end_var,
            });
            steps.insert(
                id.clone(),
                StepVars {
                    start: start_var,
                    end: end_var,
                    len: len_var,
                },
            );
        }

        let blocks = background::background_blocks(
            ast.background(),
            ast.config().default_tz,
            schedule_start,
            end,
        )?;
        for block in blocks {
            let begin_slot = instant_to_slot(block.begin, schedule_start);
            let len = block.duration().num_seconds().div_euclid(SLOT_SECONDS);
            // Clip to the window; blocks fully outside are dropped.
            let clipped_start = begin_slot.max(0);
            let clipped_end = (begin_slot + len).min(total_slots);
            if clipped_end > clipped_start {
                intervals.push(Interval::Fixed {
                    start: clipped_start,
                    len: clipped_end - clipped_start,
                });
            }
        }

        model.add_no_overlap(intervals);

        for (id, node) in ast.nodes() {
            for dep in &node.deps {
                let pred = steps[dep];
                let step = steps[id];
                model.add(
                    LinearExpr::new().term(pred.end, 1).term(step.start, -1),
                    CmpOp::Le,
                    0,
                );
            }
        }

        let config = ast.config();
        let params = SolverParams {
            timeout: std::time::Duration::from_secs(config.solver_timeout),
            log_search_progress: config.log,
            ..SolverParams::default()
        };

        Ok(Self {
            ast,
            model,
            steps,
            schedule_start,
            schedule_end: end,
            total_slots,
            params,
        })
    }

    pub fn total_slots(&self) -> i64 {
        self.total_slots
    }

    pub fn schedule_start(&self) -> DateTime<Tz> {
        self.schedule_start
    }

    /// Layer deadline clipping, utility curves and the CUF pieces on top.
    pub fn into_total_utility_model(mut self) -> TotalUtilityModel<'a> {
        let total_slots = self.total_slots;
        let mut utilities = BTreeMap::new();
        let mut cufs = BTreeMap::new();

        for (id, node) in self.ast.nodes() {
            let step = self.steps[id];
            let model = &mut self.model;
            let avail = model.new_int_var(0, total_slots);

            match node.deadline {
                Some(deadline) => {
                    let k = instant_to_slot(deadline.with_timezone(&Utc), self.schedule_start)
                        .clamp(-1, total_slots);
                    let before = model.new_bool_var();
                    let clipped = model.new_bool_var();
                    let after = model.new_bool_var();
                    model.add_exactly_one(vec![before, clipped, after]);

                    // before: end <= k, all of len counts.
                    model.add(step.end, CmpOp::Le, k).only_enforce_if(before);
                    model
                        .add(
                            LinearExpr::new().term(avail, 1).term(step.len, -1),
                            CmpOp::Eq,
                            0,
                        )
                        .only_enforce_if(before);

                    // straddling: start <= k < end, only the part up to the
                    // deadline counts.
                    model.add(step.start, CmpOp::Le, k).only_enforce_if(clipped);
                    model.add(step.end, CmpOp::Ge, k + 1).only_enforce_if(clipped);
                    model
                        .add(
                            LinearExpr::new().term(avail, 1).term(step.start, 1),
                            CmpOp::Eq,
                            k,
                        )
                        .only_enforce_if(clipped);

                    // after: k < start, nothing counts.
                    model.add(step.start, CmpOp::Ge, k + 1).only_enforce_if(after);
                    model.add(avail, CmpOp::Eq, 0).only_enforce_if(after);
                }
                None => {
                    model
                        .add(
                            LinearExpr::new().term(avail, 1).term(step.len, -1),
                            CmpOp::Eq,
                            0,
                        );
                }
            }

            let utility_table =
                curve::utility_table(node.duration, node.confidence, node.priority, total_slots);
            let integral_table = curve::utility_integral_table(
                node.duration,
                node.confidence,
                node.priority,
                total_slots,
            );
            let integral_max = integral_table.last().copied().unwrap_or(0);

            let utility = model.new_int_var(0, node.priority * YSCALE);
            model.add_table_upper_bound(utility, avail, utility_table);

            let cuf_int = model.new_int_var(0, integral_max);
            model.add_table_upper_bound(cuf_int, avail, integral_table);

            // cuf_prod == utility * (total - end): the terminal utility held
            // over the remaining window.
            let cuf_prod = model.new_int_var(0, node.priority * YSCALE * total_slots);
            model.add_multiplication_equality(
                cuf_prod,
                utility,
                LinearExpr::new().term(step.end, -1).constant(total_slots),
            );

            let cuf = model.new_int_var(0, node.priority * YSCALE * total_slots);
            model.add(
                LinearExpr::new()
                    .term(cuf, 1)
                    .term(cuf_int, -1)
                    .term(cuf_prod, -1),
                CmpOp::Eq,
                0,
            );

            utilities.insert(id.clone(), utility);
            cufs.insert(id.clone(), cuf);
        }

        self.model
            .maximize(LinearExpr::sum(utilities.values().copied()));

        TotalUtilityModel {
            basic: self,
            utilities,
            cufs,
        }
    }
}

/// Stage 1: maximize total utility.
pub struct TotalUtilityModel<'a> {
    basic: BasicModel<'a>,
    utilities: BTreeMap<TaskId, IntVar>,
    cufs: BTreeMap<TaskId, IntVar>,
}

impl<'a> TotalUtilityModel<'a> {
    /// Solve stage 1, freeze its optimum as a floor and switch the objective
    /// to the CUF sum.
    pub fn into_cuf_model(mut self) -> Result<CufModel<'a>, SolveError> {
        let solution = backend::solve(&self.basic.model, &self.basic.params)?;
        tracing::debug!(objective = solution.objective(), "total utility stage solved");

        let model = &mut self.basic.model;
        model.clear_objective();
        model.add(
            LinearExpr::sum(self.utilities.values().copied()),
            CmpOp::Ge,
            solution.objective(),
        );
        model.hint_solution(&solution);
        model.maximize(LinearExpr::sum(self.cufs.values().copied()));

        Ok(CufModel { stage: self })
    }
}

/// Stage 2: maximize the CUF integral under the utility floor.
pub struct CufModel<'a> {
    stage: TotalUtilityModel<'a>,
}

impl<'a> CufModel<'a> {
    /// Solve stage 2, freeze its optimum as a floor and switch the objective
    /// to total length minimization.
    pub fn into_interval_len_model(mut self) -> Result<IntervalLenModel<'a>, SolveError> {
        let solution = backend::solve(&self.stage.basic.model, &self.stage.basic.params)?;
        tracing::debug!(objective = solution.objective(), "CUF stage solved");

        let model = &mut self.stage.basic.model;
        model.clear_objective();
        model.add(
            LinearExpr::sum(self.stage.cufs.values().copied()),
            CmpOp::Ge,
            solution.objective(),
        );
        model.hint_solution(&solution);
        model.minimize(LinearExpr::sum(
            self.stage.basic.steps.values().map(|s| s.len),
        ));

        Ok(IntervalLenModel { stage: self.stage })
    }
}

/// Stage 3: minimize total scheduled length under both floors. Solving this
/// stage produces the emitted schedule.
pub struct IntervalLenModel<'a> {
    stage: TotalUtilityModel<'a>,
}

impl IntervalLenModel<'_> {
    pub fn into_schedule(self) -> Result<Schedule, SolveError> {
        let basic = &self.stage.basic;
        let solution = backend::solve(&basic.model, &basic.params)?;
        tracing::debug!(objective = solution.objective(), "interval length stage solved");

        let mut entries = BTreeMap::new();
        for (id, node) in basic.ast.nodes() {
            let step = basic.steps[id];
            let slot_ts = |slots: i64| {
                basic.schedule_start + Duration::seconds(slots * SLOT_SECONDS)
            };
            entries.insert(
                id.clone(),
                ScheduleEntry {
                    name: node.name.clone(),
                    start: slot_ts(solution.value(step.start)),
                    end: slot_ts(solution.value(step.end)),
                    length_slots: solution.value(step.len),
                    utility: solution.value(self.stage.utilities[id]),
                    max_utility: node.priority,
                },
            );
        }

        Ok(Schedule {
            objective: solution.objective(),
            entries,
            window_start: basic.schedule_start,
            window_end: basic.schedule_end,
        })
    }
}
