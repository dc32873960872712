//! The flat, solver-shaped AST.
//!
//! [`ProcessedAST`] holds only atomic steps: goals are gone, every dependency
//! is an `after` edge between surviving steps, durations are integer slot
//! counts and deadlines are timezone-aware. Steps already done are dropped,
//! and dropped prerequisites count as satisfied.

use crate::SolveError;
use cascade_core::{slots_in, Background, CascadeConfig, Status, TaskAST, TaskId, TaskKind};
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};

/// A leaf step as the solver sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomicTask {
    pub name: String,
    pub id: TaskId,
    pub status: Status,
    /// Propagated priority (goal priorities multiplied in).
    pub priority: i64,
    pub confidence: i64,
    /// Duration in slots, rounded up.
    pub duration: i64,
    /// Prerequisite step ids, filtered to surviving steps.
    pub deps: BTreeSet<TaskId>,
    /// Propagated, timezone-aware deadline.
    pub deadline: Option<DateTime<Tz>>,
    /// Session multiplier, reserved for multi-session scheduling. Carried but
    /// not yet modeled.
    pub dup: u32,
}

/// The second-pass AST fed to the model stages.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedAST {
    nodes: BTreeMap<TaskId, AtomicTask>,
    config: CascadeConfig,
    bg: BTreeMap<String, Background>,
}

impl ProcessedAST {
    /// Derive the flat AST from a validated task tree: propagate properties,
    /// normalize dependencies, integerize durations, and drop done steps.
    pub fn from_ast(ast: &TaskAST) -> Result<Self, SolveError> {
        let propagated = ast.propagate_properties()?;
        let steps = propagated.normalize_dependencies();

        let survivors: BTreeSet<TaskId> = steps
            .iter()
            .filter(|t| step_status(t) == Some(Status::Todo))
            .map(|t| t.id.clone())
            .collect();

        let mut nodes = BTreeMap::new();
        for task in steps {
            let TaskKind::Step {
                status,
                duration,
                confidence,
            } = task.kind
            else {
                continue;
            };
            if status != Status::Todo {
                continue;
            }
            nodes.insert(
                task.id.clone(),
                AtomicTask {
                    name: task.name,
                    id: task.id,
                    status,
                    priority: task.priority,
                    confidence,
                    duration: slots_in(duration),
                    // A prerequisite that was filtered out as done is
                    // semantically satisfied.
                    deps: task
                        .deps
                        .after
                        .into_iter()
                        .filter(|dep| survivors.contains(dep))
                        .collect(),
                    deadline: task.deadline.and_then(|d| match d {
                        cascade_core::Deadline::Anchored(dt) => Some(dt),
                        cascade_core::Deadline::Floating(_) => None,
                    }),
                    dup: 1,
                },
            );
        }

        Ok(Self {
            nodes,
            config: ast.config().clone(),
            bg: ast.background().clone(),
        })
    }

    /// Live (todo) steps indexed by id.
    pub fn nodes(&self) -> &BTreeMap<TaskId, AtomicTask> {
        &self.nodes
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn background(&self) -> &BTreeMap<String, Background> {
        &self.bg
    }
}

fn step_status(task: &cascade_core::Task) -> Option<Status> {
    match task.kind {
        TaskKind::Step { status, .. } => Some(status),
        TaskKind::Goal { .. } => None,
    }
}
