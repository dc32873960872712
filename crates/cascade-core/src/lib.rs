//! # cascade-core
//!
//! Core domain model for the cascade scheduling engine.
//!
//! This crate provides:
//! - Domain types: [`Task`] (a Step/Goal tagged sum), [`Dependencies`],
//!   [`Deadline`], background obligations, [`CascadeConfig`]
//! - [`TaskAST`]: the validating task tree — construction enforces unique
//!   ids, reference closure, acyclic dependencies and deadline monotonicity
//! - The two pure AST transforms: [`TaskAST::normalize_dependencies`] and
//!   [`TaskAST::propagate_properties`]
//! - The [`Schedule`] result type and error enums
//!
//! ## Example
//!
//! ```rust
//! use cascade_core::{CascadeConfig, Task, TaskAST};
//! use chrono::Duration;
//! use chrono_tz::Tz;
//!
//! let config = CascadeConfig::new(Tz::Europe__London);
//! let ast = TaskAST::new(
//!     config,
//!     Default::default(),
//!     vec![
//!         Task::step("Write report", Duration::minutes(90)),
//!         Task::step("Send report", Duration::minutes(10)).after(["write-report"]),
//!     ],
//! )
//! .unwrap();
//! assert_eq!(ast.tasks().len(), 2);
//! ```

mod transform;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ============================================================================
// Type Aliases & Time Units
// ============================================================================

/// Unique identifier for a task
pub type TaskId = String;

/// Length of one scheduling slot in minutes. All solver-facing durations and
/// timestamps are integers in this unit.
pub const SLOT_MINUTES: i64 = 5;

/// Length of one scheduling slot in seconds.
pub const SLOT_SECONDS: i64 = SLOT_MINUTES * 60;

/// Scale applied to fractional utility values (CDF in `[0, 1]`) so the solver
/// works on integers.
pub const YSCALE: i64 = 100;

/// One scheduling slot as a [`chrono::Duration`].
pub fn slot() -> Duration {
    Duration::minutes(SLOT_MINUTES)
}

/// Number of slots covering `d`, rounding up. Negative durations count as zero.
pub fn slots_in(d: Duration) -> i64 {
    let secs = d.num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + SLOT_SECONDS - 1) / SLOT_SECONDS
}

/// Derive a task id from its human name: lowercase, alphanumeric runs joined
/// by `-` (`"Task A"` becomes `"task-a"`).
pub fn slugify(name: &str) -> TaskId {
    let mut id = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !id.is_empty() {
                id.push('-');
            }
            pending_sep = false;
            for lc in c.to_lowercase() {
                id.push(lc);
            }
        } else {
            pending_sep = true;
        }
    }
    id
}

// ============================================================================
// Deadline
// ============================================================================

/// A task deadline over its life cycle.
///
/// Deadlines are parsed as naive wall-clock timestamps (`Floating`) and become
/// timezone-aware (`Anchored`) during property propagation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    /// As written in the task file; not yet attached to a timezone.
    Floating(NaiveDateTime),
    /// Localized by the task's timezone (or the config default).
    Anchored(DateTime<Tz>),
}

impl Deadline {
    /// Attach `tz` to a floating deadline. Anchored deadlines are returned
    /// unchanged, making the operation idempotent.
    pub fn anchor(self, tz: Tz) -> Self {
        match self {
            Deadline::Floating(naive) => Deadline::Anchored(anchor_local(naive, tz)),
            anchored @ Deadline::Anchored(_) => anchored,
        }
    }

    /// The absolute instant, available once anchored.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Deadline::Floating(_) => None,
            Deadline::Anchored(dt) => Some(dt.with_timezone(&Utc)),
        }
    }

    /// The wall-clock value as written (local time for anchored deadlines).
    /// Construction-time monotonicity checks compare these, since anchoring
    /// has not happened yet at that point.
    pub fn local_naive(&self) -> NaiveDateTime {
        match self {
            Deadline::Floating(naive) => *naive,
            Deadline::Anchored(dt) => dt.naive_local(),
        }
    }

    /// Keep the earlier of two anchored deadlines (comparison in UTC).
    pub fn tightened(self, other: Deadline) -> Deadline {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) if b < a => other,
            _ => self,
        }
    }
}

/// Localize a naive timestamp. Ambiguous local times (DST fold) take the
/// earlier offset; nonexistent ones (DST gap) fall back to the UTC reading.
fn anchor_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earlier, _) => earlier,
        chrono::LocalResult::None => Utc.from_utc_datetime(&naive).with_timezone(&tz),
    }
}

// ============================================================================
// Task
// ============================================================================

/// Completion status of a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Todo,
    Done,
}

/// Declarative predecessor/successor sets. Normalization collapses both into
/// `after` edges among leaf steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Tasks this task must finish before.
    pub before: BTreeSet<TaskId>,
    /// Tasks that must finish before this task starts.
    pub after: BTreeSet<TaskId>,
}

/// The Step/Goal split. Goals carry no work of their own; their deadline and
/// priority are pushed onto subtasks during propagation and they are erased by
/// normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Step {
        status: Status,
        duration: Duration,
        /// Confidence in the duration estimate (`>= 1`). Higher values narrow
        /// the utility curve around the estimate.
        confidence: i64,
    },
    Goal {
        /// Ordered child task ids.
        subtasks: Vec<TaskId>,
        /// When set, subtask `i` implicitly depends on subtasks `0..i`.
        implicit_deps_by_order: bool,
    },
}

/// A single entry of the task file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Unique identifier (defaults to the slugified name).
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    pub desc: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Latest useful completion time.
    pub deadline: Option<Deadline>,
    /// Timezone the deadline is written in; the config default applies when
    /// absent.
    pub timezone: Option<Tz>,
    /// Scheduling priority, `>= 1`, higher is more important. Goal priorities
    /// multiply into subtasks, so values are relative per subtree.
    pub priority: i64,
    pub deps: Dependencies,
    pub kind: TaskKind,
}

impl Task {
    /// Create a todo step with the given name and duration. The id defaults
    /// to the slugified name.
    pub fn step(name: impl Into<String>, duration: Duration) -> Self {
        let name = name.into();
        Self {
            id: slugify(&name),
            name,
            desc: None,
            tags: Vec::new(),
            deadline: None,
            timezone: None,
            priority: 1,
            deps: Dependencies::default(),
            kind: TaskKind::Step {
                status: Status::Todo,
                duration,
                confidence: 1,
            },
        }
    }

    /// Create a goal over the given subtask ids. The id defaults to the
    /// slugified name.
    pub fn goal<I, S>(name: impl Into<String>, subtasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            id: slugify(&name),
            name,
            desc: None,
            tags: Vec::new(),
            deadline: None,
            timezone: None,
            priority: 1,
            deps: Dependencies::default(),
            kind: TaskKind::Goal {
                subtasks: subtasks.into_iter().map(Into::into).collect(),
                implicit_deps_by_order: false,
            },
        }
    }

    /// Override the id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Add `after` dependencies: the given tasks must finish first.
    pub fn after<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.after.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add `before` dependencies: this task must finish before the given ones.
    pub fn before<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.before.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set a (floating) deadline.
    pub fn deadline(mut self, naive: NaiveDateTime) -> Self {
        self.deadline = Some(Deadline::Floating(naive));
        self
    }

    /// Set the timezone the deadline is interpreted in.
    pub fn timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Mark a step as already done.
    pub fn done(mut self) -> Self {
        if let TaskKind::Step { status, .. } = &mut self.kind {
            *status = Status::Done;
        }
        self
    }

    /// Set a step's estimate confidence.
    pub fn confidence(mut self, confidence: i64) -> Self {
        if let TaskKind::Step { confidence: c, .. } = &mut self.kind {
            *c = confidence;
        }
        self
    }

    /// Turn on implicit ordering of a goal's subtasks.
    pub fn ordered(mut self) -> Self {
        if let TaskKind::Goal {
            implicit_deps_by_order,
            ..
        } = &mut self.kind
        {
            *implicit_deps_by_order = true;
        }
        self
    }

    pub fn is_goal(&self) -> bool {
        matches!(self.kind, TaskKind::Goal { .. })
    }

    pub fn is_step(&self) -> bool {
        matches!(self.kind, TaskKind::Step { .. })
    }

    /// Subtask ids when this is a goal.
    pub fn subtasks(&self) -> Option<&[TaskId]> {
        match &self.kind {
            TaskKind::Goal { subtasks, .. } => Some(subtasks),
            TaskKind::Step { .. } => None,
        }
    }
}

// ============================================================================
// Background Obligations
// ============================================================================

/// A recurring or external obligation blocking out schedule time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Background {
    Task(BackgroundTask),
    Calendar(BackgroundCalendar),
}

/// A cron-driven recurring block (sleep, meals, standing meetings). Firing
/// times are interpreted in the configuration's default timezone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundTask {
    /// Cron expression, validated at parse time.
    pub schedule: String,
    /// Length of each session.
    pub duration: Duration,
}

/// An external ICS feed whose events block out schedule time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundCalendar {
    /// `http(s)://` or `file://` location of the feed.
    pub url: String,
    /// Case-insensitive substrings matched against event names.
    pub filter: BTreeSet<String>,
    /// Keep matching events when set; drop them otherwise.
    pub whitelist: bool,
}

impl BackgroundCalendar {
    /// Whether an event with this name survives the filter.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let hit = self
            .filter
            .iter()
            .any(|s| name.contains(&s.to_lowercase()));
        if self.whitelist {
            hit
        } else {
            !hit
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Run-wide configuration carried by the task file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadeConfig {
    /// Timezone applied to deadlines without one and to cron firings.
    pub default_tz: Tz,
    /// Log solver search progress.
    pub log: bool,
    /// Wall-clock ceiling per solver stage, in seconds.
    pub solver_timeout: u64,
}

impl CascadeConfig {
    pub fn new(default_tz: Tz) -> Self {
        Self {
            default_tz,
            log: false,
            solver_timeout: 120,
        }
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn solver_timeout(mut self, seconds: u64) -> Self {
        self.solver_timeout = seconds;
        self
    }
}

// ============================================================================
// TaskAST
// ============================================================================

/// The validated task tree.
///
/// Construction enforces, in order:
/// 1. ids are unique and priorities/confidences are `>= 1`;
/// 2. every referenced id (deps and subtasks) is defined;
/// 3. implicit ordering edges are injected for goals that request them;
/// 4. the dependency graph — with `before` inverted and each goal depending
///    on its subtasks — is acyclic;
/// 5. no task has an `after`-predecessor with a strictly later deadline.
///
/// The AST is immutable afterwards; the transforms in this crate produce
/// copies.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskAST {
    config: CascadeConfig,
    bg: BTreeMap<String, Background>,
    tasks: Vec<Task>,
}

impl TaskAST {
    pub fn new(
        config: CascadeConfig,
        bg: BTreeMap<String, Background>,
        mut tasks: Vec<Task>,
    ) -> Result<Self, AstError> {
        check_properties(&tasks)?;
        check_refs(&tasks)?;
        // Implicit ordering edges may themselves create cycles, so they are
        // injected before the graph check and kept in the final AST.
        inject_implicit_deps(&mut tasks);

        let ast = Self { config, bg, tasks };
        let flat = transform::flattened_copy(&ast.tasks);
        transform::check_cycles(&flat)?;
        check_deadlines(&flat)?;
        Ok(ast)
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn background(&self) -> &BTreeMap<String, Background> {
        &self.bg
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// All defined ids.
    pub fn ids(&self) -> BTreeSet<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut Vec<Task> {
        &mut self.tasks
    }
}

fn check_properties(tasks: &[Task]) -> Result<(), AstError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(AstError::DuplicateId(task.id.clone()));
        }
        if task.priority < 1 {
            return Err(AstError::InvalidProperty {
                task: task.id.clone(),
                message: format!("priority must be >= 1, got {}", task.priority),
            });
        }
        if let TaskKind::Step {
            confidence,
            duration,
            ..
        } = &task.kind
        {
            if *confidence < 1 {
                return Err(AstError::InvalidProperty {
                    task: task.id.clone(),
                    message: format!("confidence must be >= 1, got {confidence}"),
                });
            }
            if *duration <= Duration::zero() {
                return Err(AstError::InvalidProperty {
                    task: task.id.clone(),
                    message: "duration must be positive".into(),
                });
            }
        }
    }
    Ok(())
}

fn check_refs(tasks: &[Task]) -> Result<(), AstError> {
    let defined: BTreeSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut undefined: BTreeSet<TaskId> = BTreeSet::new();
    for task in tasks {
        let refs = task
            .deps
            .before
            .iter()
            .chain(task.deps.after.iter())
            .chain(task.subtasks().into_iter().flatten());
        undefined.extend(
            refs.filter(|id| !defined.contains(id.as_str()))
                .cloned(),
        );
    }
    if undefined.is_empty() {
        Ok(())
    } else {
        Err(AstError::UndefinedReference { ids: undefined })
    }
}

fn inject_implicit_deps(tasks: &mut Vec<Task>) {
    let mut edges: Vec<(TaskId, Vec<TaskId>)> = Vec::new();
    for task in tasks.iter() {
        if let TaskKind::Goal {
            subtasks,
            implicit_deps_by_order: true,
        } = &task.kind
        {
            for (i, sub) in subtasks.iter().enumerate().skip(1) {
                edges.push((sub.clone(), subtasks[..i].to_vec()));
            }
        }
    }
    for (target, preds) in edges {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == target) {
            task.deps.after.extend(preds);
        }
    }
}

/// Deadline monotonicity over the flattened graph: an `after`-predecessor may
/// not have a strictly later deadline than its successor.
fn check_deadlines(flat: &[Task]) -> Result<(), AstError> {
    let by_id: BTreeMap<&str, &Task> = flat.iter().map(|t| (t.id.as_str(), t)).collect();
    for task in flat {
        let Some(deadline) = &task.deadline else {
            continue;
        };
        let mut offenders: BTreeSet<TaskId> = BTreeSet::new();
        for dep in &task.deps.after {
            if let Some(pred) = by_id.get(dep.as_str()) {
                if let Some(pred_deadline) = &pred.deadline {
                    if pred_deadline.local_naive() > deadline.local_naive() {
                        offenders.insert(dep.clone());
                    }
                }
            }
        }
        if !offenders.is_empty() {
            return Err(AstError::DeadlineConflict {
                task: task.id.clone(),
                offenders,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Schedule (Result)
// ============================================================================

/// One task's placement in the emitted schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Human-readable task name.
    pub name: String,
    /// Slot-aligned start.
    pub start: DateTime<Tz>,
    /// Slot-aligned end.
    pub end: DateTime<Tz>,
    /// Scheduled length in slots; `0` means the task was not scheduled.
    pub length_slots: i64,
    /// Utility achieved, in units of `1 / YSCALE` of a priority point.
    pub utility: i64,
    /// Utility ceiling (the task's propagated priority).
    pub max_utility: i64,
}

impl ScheduleEntry {
    pub fn is_scheduled(&self) -> bool {
        self.length_slots > 0
    }
}

/// The result of a scheduling run over a window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// Final-stage objective value.
    pub objective: i64,
    /// Placements indexed by task id. Every live task appears, scheduled or
    /// not.
    pub entries: BTreeMap<TaskId, ScheduleEntry>,
    pub window_start: DateTime<Tz>,
    pub window_end: DateTime<Tz>,
}

impl Schedule {
    /// Sum of achieved utilities (in `1 / YSCALE` units).
    pub fn total_utility(&self) -> i64 {
        self.entries.values().map(|e| e.utility).sum()
    }

    /// Sum of scheduled lengths in slots.
    pub fn total_length_slots(&self) -> i64 {
        self.entries.values().map(|e| e.length_slots).sum()
    }

    /// Entries ordered by start time (id as tie break).
    pub fn by_start(&self) -> Vec<(&TaskId, &ScheduleEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(id, e)| (e.start, id.as_str()));
        entries
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Output rendering
pub trait Renderer {
    type Output;

    /// Render a schedule to the output format
    fn render(&self, schedule: &Schedule) -> Result<Self::Output, RenderError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Structural validation failure while building a [`TaskAST`].
#[derive(Debug, Error)]
pub enum AstError {
    #[error("duplicate task id: {0}")]
    DuplicateId(TaskId),

    #[error("reference to undefined task ids: {ids:?}")]
    UndefinedReference { ids: BTreeSet<TaskId> },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<TaskId> },

    #[error("tasks {offenders:?} have deadlines later than \"{task}\", contradicting the dependency relation")]
    DeadlineConflict {
        task: TaskId,
        offenders: BTreeSet<TaskId>,
    },

    #[error("invalid property on task {task}: {message}")]
    InvalidProperty { task: TaskId, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Rendering error
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("Task A"), "task-a");
        assert_eq!(slugify("  Write  (draft) report! "), "write-draft-report");
        assert_eq!(slugify("Ünïcode Name"), "ünïcode-name");
    }

    #[test]
    fn slot_rounding() {
        assert_eq!(slots_in(Duration::minutes(5)), 1);
        assert_eq!(slots_in(Duration::minutes(6)), 2);
        assert_eq!(slots_in(Duration::minutes(90)), 18);
        assert_eq!(slots_in(Duration::seconds(1)), 1);
        assert_eq!(slots_in(Duration::zero()), 0);
    }

    #[test]
    fn step_builder() {
        let task = Task::step("Task A", Duration::minutes(30))
            .priority(3)
            .confidence(4)
            .after(["task-b"])
            .deadline(naive("2025-06-01 18:00"));

        assert_eq!(task.id, "task-a");
        assert_eq!(task.priority, 3);
        assert!(task.deps.after.contains("task-b"));
        match task.kind {
            TaskKind::Step {
                status, confidence, ..
            } => {
                assert_eq!(status, Status::Todo);
                assert_eq!(confidence, 4);
            }
            TaskKind::Goal { .. } => panic!("expected a step"),
        }
    }

    #[test]
    fn deadline_anchor_is_idempotent() {
        let tz = Tz::Europe__London;
        let dl = Deadline::Floating(naive("2025-06-01 18:00"));
        let anchored = dl.anchor(tz);
        assert_eq!(anchored, anchored.anchor(Tz::Asia__Tokyo));
    }

    #[test]
    fn deadline_tighten_keeps_earlier() {
        let tz = Tz::UTC;
        let early = Deadline::Floating(naive("2025-06-01 10:00")).anchor(tz);
        let late = Deadline::Floating(naive("2025-06-01 12:00")).anchor(tz);
        assert_eq!(late.tightened(early), early);
        assert_eq!(early.tightened(late), early);
    }

    #[test]
    fn calendar_filter_whitelist_and_blacklist() {
        let mut cal = BackgroundCalendar {
            url: "file:///dev/null".into(),
            filter: ["Standup".to_string()].into_iter().collect(),
            whitelist: true,
        };
        assert!(cal.matches("Team STANDUP (daily)"));
        assert!(!cal.matches("1:1 with Sam"));

        cal.whitelist = false;
        assert!(!cal.matches("Team STANDUP (daily)"));
        assert!(cal.matches("1:1 with Sam"));
    }

    fn ast(tasks: Vec<Task>) -> Result<TaskAST, AstError> {
        TaskAST::new(
            CascadeConfig::new(Tz::Europe__London),
            BTreeMap::new(),
            tasks,
        )
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task A", Duration::minutes(10)),
        ])
        .unwrap_err();
        assert!(matches!(err, AstError::DuplicateId(id) if id == "task-a"));
    }

    #[test]
    fn undefined_reference_rejected() {
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5)).after(["ghost"])
        ])
        .unwrap_err();
        match err {
            AstError::UndefinedReference { ids } => {
                assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["ghost"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn two_cycle_reported_with_path() {
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5)).after(["task-b"]),
            Task::step("Task B", Duration::minutes(5)).after(["task-a"]),
        ])
        .unwrap_err();
        match err {
            AstError::CyclicDependency { path } => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn implicit_ordering_can_create_cycle() {
        // task-b explicitly runs before task-a, but the goal's order says
        // a then b. The injected edges must be visible to the cycle check.
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)).before(["task-a"]),
            Task::goal("Goal", ["task-a", "task-b"]).ordered(),
        ])
        .unwrap_err();
        assert!(matches!(err, AstError::CyclicDependency { .. }));
    }

    #[test]
    fn implicit_ordering_edges_are_kept() {
        let ast = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)),
            Task::goal("Goal", ["task-a", "task-b"]).ordered(),
        ])
        .unwrap();
        assert!(ast.get("task-b").unwrap().deps.after.contains("task-a"));
    }

    #[test]
    fn predecessor_deadline_must_not_be_later() {
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5))
                .deadline(naive("2025-06-02 12:00")),
            Task::step("Task B", Duration::minutes(5))
                .after(["task-a"])
                .deadline(naive("2025-06-01 12:00")),
        ])
        .unwrap_err();
        match err {
            AstError::DeadlineConflict { task, offenders } => {
                assert_eq!(task, "task-b");
                assert!(offenders.contains("task-a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn goal_subtask_deadline_checked_through_goal_edge() {
        // The goal depends on its subtask; a goal deadline earlier than the
        // subtask's is a conflict.
        let err = ast(vec![
            Task::step("Task A", Duration::minutes(5))
                .deadline(naive("2025-06-03 12:00")),
            Task::goal("Goal", ["task-a"]).deadline(naive("2025-06-01 12:00")),
        ])
        .unwrap_err();
        assert!(matches!(err, AstError::DeadlineConflict { .. }));
    }

    #[test]
    fn schedule_accessors() {
        let tz = Tz::UTC;
        let start = tz.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let entry = |offset: i64, len: i64, utility: i64| ScheduleEntry {
            name: "x".into(),
            start: start + Duration::minutes(offset * SLOT_MINUTES),
            end: start + Duration::minutes((offset + len) * SLOT_MINUTES),
            length_slots: len,
            utility,
            max_utility: 1,
        };
        let schedule = Schedule {
            objective: 0,
            entries: [
                ("b".to_string(), entry(4, 2, 100)),
                ("a".to_string(), entry(0, 3, 100)),
                ("c".to_string(), entry(0, 0, 0)),
            ]
            .into_iter()
            .collect(),
            window_start: start,
            window_end: start + Duration::hours(8),
        };

        assert_eq!(schedule.total_utility(), 200);
        assert_eq!(schedule.total_length_slots(), 5);
        let order: Vec<&str> = schedule.by_start().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
        assert!(!schedule.entries["c"].is_scheduled());
    }
}
