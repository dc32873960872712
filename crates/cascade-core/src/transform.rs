//! Pure transforms over the validated [`TaskAST`].
//!
//! The user-shaped tree (goals, `before` edges, floating deadlines) is for
//! AUTHORING. The solver wants leaf steps with `after` edges and anchored
//! deadlines. These must be completely separated, so both transforms produce
//! copies and leave the source AST untouched:
//!
//! - [`TaskAST::normalize_dependencies`] collapses every `before` edge and
//!   every goal reference into `after` edges among leaf steps;
//! - [`TaskAST::propagate_properties`] anchors deadlines in their timezone,
//!   tightens goal deadlines onto subtasks and multiplies goal priorities
//!   downward.

use crate::{AstError, Task, TaskAST, TaskId, TaskKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

impl TaskAST {
    /// Rewrite all dependencies as `after` edges between leaf steps.
    ///
    /// `before` edges are inverted onto their target, goal references inside
    /// any `after` set are replaced by the leaf steps under the goal, and
    /// goals themselves are dropped. The returned tasks are all step-kind and
    /// reference only surviving steps.
    pub fn normalize_dependencies(&self) -> Vec<Task> {
        let mut tasks = self.tasks().to_vec();
        invert_before(&mut tasks);

        let by_id: BTreeMap<TaskId, Task> =
            tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();

        for task in &mut tasks {
            let mut expanded: BTreeSet<TaskId> = BTreeSet::new();
            for dep in &task.deps.after {
                match by_id.get(dep) {
                    Some(target) if target.is_goal() => {
                        collect_leaf_steps(target, &by_id, &mut expanded);
                    }
                    _ => {
                        expanded.insert(dep.clone());
                    }
                }
            }
            task.deps.after = expanded;
        }

        tasks.retain(Task::is_step);
        tasks
    }

    /// Push inheritable properties down the goal hierarchy, returning a copy.
    ///
    /// Deadlines are first anchored in each task's own timezone (config
    /// default when unset). Then, visiting goals outermost-first, each goal
    /// with a deadline tightens its direct subtasks' deadlines to the earlier
    /// value, and each goal multiplies its priority into its direct subtasks.
    /// A goal's priority is fully distributed by the visit and resets to 1,
    /// so re-propagation is a no-op.
    pub fn propagate_properties(&self) -> Result<TaskAST, AstError> {
        let mut out = self.clone();
        let default_tz = out.config().default_tz;

        for task in out.tasks_mut().iter_mut() {
            if let Some(deadline) = task.deadline {
                let tz = task.timezone.unwrap_or(default_tz);
                task.deadline = Some(deadline.anchor(tz));
            }
        }

        // Outer goals depend (via the merged goal edges) on inner ones, so
        // reversed topological order visits them outermost-first and nested
        // goals observe already-tightened values.
        let order = topo_sort(&flattened_copy(out.tasks()))?;
        let index: BTreeMap<TaskId, usize> = out
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        for id in order.iter().rev() {
            let Some(&goal_idx) = index.get(id) else {
                continue;
            };
            let (deadline, priority, subtasks) = {
                let task = &out.tasks()[goal_idx];
                match &task.kind {
                    TaskKind::Goal { subtasks, .. } => {
                        (task.deadline, task.priority, subtasks.clone())
                    }
                    TaskKind::Step { .. } => continue,
                }
            };

            for sub in &subtasks {
                let Some(&sub_idx) = index.get(sub) else {
                    continue;
                };
                let sub_task = &mut out.tasks_mut()[sub_idx];
                if let Some(goal_deadline) = deadline {
                    sub_task.deadline = Some(match sub_task.deadline {
                        Some(own) => own.tightened(goal_deadline),
                        None => goal_deadline,
                    });
                }
                sub_task.priority *= priority;
            }
            out.tasks_mut()[goal_idx].priority = 1;
        }

        Ok(out)
    }
}

/// Copy of the task list with `before` inverted into `after` and each goal
/// depending on all its subtasks. Sufficient for graph checks and ordering;
/// transitive goal expansion is not needed here.
pub(crate) fn flattened_copy(tasks: &[Task]) -> Vec<Task> {
    let mut flat = tasks.to_vec();
    invert_before(&mut flat);
    for task in &mut flat {
        if let TaskKind::Goal { subtasks, .. } = &task.kind {
            let subtasks = subtasks.clone();
            task.deps.after.extend(subtasks);
        }
    }
    flat
}

/// Invert every `before` edge: `t before p` becomes `p after t`.
fn invert_before(tasks: &mut [Task]) {
    let mut inverted: Vec<(TaskId, TaskId)> = Vec::new();
    for task in tasks.iter_mut() {
        for target in std::mem::take(&mut task.deps.before) {
            inverted.push((target, task.id.clone()));
        }
    }
    for (target, pred) in inverted {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == target) {
            task.deps.after.insert(pred);
        }
    }
}

/// Leaf steps under a goal, collected through nested goals.
fn collect_leaf_steps(
    goal: &Task,
    by_id: &BTreeMap<TaskId, Task>,
    out: &mut BTreeSet<TaskId>,
) {
    for sub in goal.subtasks().unwrap_or_default() {
        match by_id.get(sub) {
            Some(task) if task.is_goal() => collect_leaf_steps(task, by_id, out),
            Some(_) => {
                out.insert(sub.clone());
            }
            None => {}
        }
    }
}

/// Depth-first cycle detection over a flattened copy, reporting the cycle
/// path on failure.
pub(crate) fn check_cycles(flat: &[Task]) -> Result<(), AstError> {
    let by_id: BTreeMap<&str, &Task> = flat.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut safe: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();
    for task in flat {
        visit(task, &by_id, &mut safe, &mut stack)?;
    }
    Ok(())
}

fn visit<'a>(
    task: &'a Task,
    by_id: &BTreeMap<&'a str, &'a Task>,
    safe: &mut BTreeSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Result<(), AstError> {
    if safe.contains(task.id.as_str()) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|id| *id == task.id) {
        let mut path: Vec<TaskId> = stack[pos..].iter().map(ToString::to_string).collect();
        path.push(task.id.clone());
        return Err(AstError::CyclicDependency { path });
    }
    stack.push(&task.id);
    for dep in &task.deps.after {
        if let Some(target) = by_id.get(dep.as_str()) {
            visit(target, by_id, safe, stack)?;
        }
    }
    stack.pop();
    safe.insert(&task.id);
    Ok(())
}

/// Kahn's algorithm over a flattened copy: prerequisites come before their
/// dependents. Failure means the graph is not a DAG, which construction-time
/// validation rules out.
pub(crate) fn topo_sort(flat: &[Task]) -> Result<Vec<TaskId>, AstError> {
    let mut in_degree: BTreeMap<&str, usize> =
        flat.iter().map(|t| (t.id.as_str(), 0)).collect();
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for task in flat {
        for dep in &task.deps.after {
            if in_degree.contains_key(dep.as_str()) {
                successors.entry(dep.as_str()).or_default().push(&task.id);
                if let Some(deg) = in_degree.get_mut(task.id.as_str()) {
                    *deg += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut result: Vec<TaskId> = Vec::new();

    while let Some(id) = queue.pop_front() {
        result.push(id.to_string());
        if let Some(edges) = successors.get(id) {
            for succ in edges {
                if let Some(deg) = in_degree.get_mut(succ) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }
    }

    if result.len() == flat.len() {
        Ok(result)
    } else {
        Err(AstError::Internal(
            "dependency graph is not a DAG after validation".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CascadeConfig, Deadline};
    use chrono::{Duration, NaiveDateTime};
    use chrono_tz::Tz;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap as Map;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn ast(tasks: Vec<Task>) -> TaskAST {
        TaskAST::new(CascadeConfig::new(Tz::Europe__London), Map::new(), tasks).unwrap()
    }

    fn after_of<'a>(steps: &'a [Task], id: &str) -> &'a BTreeSet<TaskId> {
        &steps.iter().find(|t| t.id == id).unwrap().deps.after
    }

    #[test]
    fn normalize_inverts_before_edges() {
        let steps = ast(vec![
            Task::step("Task A", Duration::minutes(5)).before(["task-b"]),
            Task::step("Task B", Duration::minutes(5)),
        ])
        .normalize_dependencies();

        assert!(after_of(&steps, "task-a").is_empty());
        assert_eq!(
            after_of(&steps, "task-b").iter().collect::<Vec<_>>(),
            vec!["task-a"]
        );
    }

    #[test]
    fn normalize_expands_goal_references_to_leaves() {
        let steps = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)),
            Task::goal("Inner", ["task-b"]),
            Task::goal("Outer", ["task-a", "inner"]),
            Task::step("Task C", Duration::minutes(5)).after(["outer"]),
        ])
        .normalize_dependencies();

        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(Task::is_step));
        assert_eq!(
            after_of(&steps, "task-c").iter().collect::<Vec<_>>(),
            vec!["task-a", "task-b"]
        );
    }

    #[test]
    fn normalize_ordering_through_nested_goals() {
        // Goal A orders goal-b before task-a; goal-b wraps task-b, which in
        // turn runs after task-c.
        let steps = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)).after(["task-c"]),
            Task::step("Task C", Duration::minutes(5)),
            Task::goal("Goal A", ["goal-b", "task-a"]).ordered(),
            Task::goal("Goal B", ["task-b"]),
        ])
        .normalize_dependencies();

        assert_eq!(steps.len(), 3);
        assert_eq!(
            after_of(&steps, "task-a").iter().collect::<Vec<_>>(),
            vec!["task-b"]
        );
        assert_eq!(
            after_of(&steps, "task-b").iter().collect::<Vec<_>>(),
            vec!["task-c"]
        );
        assert!(after_of(&steps, "task-c").is_empty());
    }

    #[test]
    fn propagate_anchors_deadlines_with_default_tz() {
        let out = ast(vec![
            Task::step("Task A", Duration::minutes(5)).deadline(naive("2025-06-01 18:00"))
        ])
        .propagate_properties()
        .unwrap();

        match out.get("task-a").unwrap().deadline.unwrap() {
            Deadline::Anchored(dt) => assert_eq!(dt.timezone(), Tz::Europe__London),
            Deadline::Floating(_) => panic!("deadline not anchored"),
        }
    }

    #[test]
    fn propagate_respects_own_timezone() {
        let out = ast(vec![Task::step("Task A", Duration::minutes(5))
            .deadline(naive("2025-06-01 18:00"))
            .timezone(Tz::Asia__Tokyo)])
        .propagate_properties()
        .unwrap();

        match out.get("task-a").unwrap().deadline.unwrap() {
            Deadline::Anchored(dt) => assert_eq!(dt.timezone(), Tz::Asia__Tokyo),
            Deadline::Floating(_) => panic!("deadline not anchored"),
        }
    }

    #[test]
    fn propagate_tightens_deadlines_through_nested_goals() {
        let out = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)).deadline(naive("2025-06-01 10:00")),
            Task::goal("Inner", ["task-a", "task-b"]),
            Task::goal("Outer", ["inner"]).deadline(naive("2025-06-02 09:00")),
        ])
        .propagate_properties()
        .unwrap();

        // task-a inherits the outer deadline via the inner goal; task-b keeps
        // its earlier one.
        let deadline_of = |id: &str| out.get(id).unwrap().deadline.unwrap().instant().unwrap();
        assert_eq!(
            deadline_of("task-a"),
            Deadline::Floating(naive("2025-06-02 09:00"))
                .anchor(Tz::Europe__London)
                .instant()
                .unwrap()
        );
        assert_eq!(
            deadline_of("task-b"),
            Deadline::Floating(naive("2025-06-01 10:00"))
                .anchor(Tz::Europe__London)
                .instant()
                .unwrap()
        );
    }

    #[test]
    fn propagate_multiplies_priorities() {
        let out = ast(vec![
            Task::step("Task A", Duration::minutes(5)).priority(2),
            Task::goal("Inner", ["task-a"]).priority(3),
            Task::goal("Outer", ["inner"]).priority(5),
        ])
        .propagate_properties()
        .unwrap();

        assert_eq!(out.get("task-a").unwrap().priority, 2 * 3 * 5);
    }

    #[test]
    fn propagate_is_idempotent() {
        let src = ast(vec![
            Task::step("Task A", Duration::minutes(5)).priority(2),
            Task::step("Task B", Duration::minutes(5)).deadline(naive("2025-06-01 10:00")),
            Task::goal("Goal", ["task-a", "task-b"])
                .priority(4)
                .deadline(naive("2025-06-03 10:00")),
        ]);
        let once = src.propagate_properties().unwrap();
        let twice = once.propagate_properties().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn propagate_leaves_source_untouched() {
        let src = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::goal("Goal", ["task-a"]).priority(7),
        ]);
        let _ = src.propagate_properties().unwrap();
        assert_eq!(src.get("task-a").unwrap().priority, 1);
        assert_eq!(src.get("goal").unwrap().priority, 7);
    }

    #[test]
    fn topo_sort_puts_prerequisites_first() {
        let src = ast(vec![
            Task::step("Task A", Duration::minutes(5)).after(["task-b"]),
            Task::step("Task B", Duration::minutes(5)).after(["task-c"]),
            Task::step("Task C", Duration::minutes(5)),
        ]);
        let order = topo_sort(&flattened_copy(src.tasks())).unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("task-c") < pos("task-b"));
        assert!(pos("task-b") < pos("task-a"));
    }

    #[test]
    fn normalized_steps_reference_only_steps() {
        let src = ast(vec![
            Task::step("Task A", Duration::minutes(5)),
            Task::step("Task B", Duration::minutes(5)).after(["goal-x"]),
            Task::goal("Goal X", ["task-a"]),
        ]);
        let steps = src.normalize_dependencies();
        let ids: BTreeSet<&str> = steps.iter().map(|t| t.id.as_str()).collect();
        for step in &steps {
            assert!(step.is_step(), "goal {} survived normalization", step.id);
            for dep in &step.deps.after {
                assert!(ids.contains(dep.as_str()), "dangling dep {dep}");
            }
        }
    }
}
