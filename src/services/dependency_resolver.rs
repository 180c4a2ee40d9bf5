//! Pure dependency-graph operations (§4.2). No I/O, no persistence.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    OnStack,
    Done,
}

/// True iff every id in `task.depends_on` maps to an entry in `task_map`
/// with status `completed`. A missing entry is "not satisfied".
pub fn can_execute(task: &Task, task_map: &HashMap<Uuid, Task>) -> bool {
    task.depends_on.iter().all(|dep_id| {
        task_map
            .get(dep_id)
            .map(|dep| dep.status == TaskStatus::Completed)
            .unwrap_or(false)
    })
}

/// True iff any dependency is `failed` or `cancelled`.
pub fn has_failed_dependency(task: &Task, task_map: &HashMap<Uuid, Task>) -> bool {
    task.depends_on.iter().any(|dep_id| {
        task_map
            .get(dep_id)
            .map(|dep| matches!(dep.status, TaskStatus::Failed | TaskStatus::Cancelled))
            .unwrap_or(false)
    })
}

/// Three-color DFS. Returns a witness path (the cycle itself) if one
/// exists among `tasks`.
pub fn detect_cycle(tasks: &[Task]) -> Option<Vec<Uuid>> {
    let graph: HashMap<Uuid, &HashSet<Uuid>> = tasks.iter().map(|t| (t.id, &t.depends_on)).collect();
    let mut color: HashMap<Uuid, Color> = tasks.iter().map(|t| (t.id, Color::Unvisited)).collect();
    let mut path = Vec::new();

    for task in tasks {
        if color.get(&task.id) == Some(&Color::Unvisited) {
            if let Some(witness) = visit(task.id, &graph, &mut color, &mut path) {
                return Some(witness);
            }
        }
    }
    None
}

fn visit(
    node: Uuid,
    graph: &HashMap<Uuid, &HashSet<Uuid>>,
    color: &mut HashMap<Uuid, Color>,
    path: &mut Vec<Uuid>,
) -> Option<Vec<Uuid>> {
    color.insert(node, Color::OnStack);
    path.push(node);

    if let Some(deps) = graph.get(&node) {
        for &dep in deps.iter() {
            match color.get(&dep) {
                Some(Color::OnStack) => {
                    let start = path.iter().position(|&id| id == dep).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                Some(Color::Done) | None => {}
                Some(Color::Unvisited) => {
                    if let Some(witness) = visit(dep, graph, color, path) {
                        return Some(witness);
                    }
                }
            }
        }
    }

    path.pop();
    color.insert(node, Color::Done);
    None
}

/// Filters `tasks` to `pending`|`queued` entries whose dependencies are
/// all satisfied.
pub fn get_executable_task_ids(tasks: &[Task]) -> Vec<Uuid> {
    let task_map: HashMap<Uuid, Task> = tasks.iter().map(|t| (t.id, t.clone())).collect();
    tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Queued))
        .filter(|t| can_execute(t, &task_map))
        .map(|t| t.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_deps(deps: Vec<Uuid>) -> Task {
        Task::new("x").with_dependencies(deps)
    }

    #[test]
    fn can_execute_true_when_all_deps_completed() {
        let mut dep = Task::new("dep");
        dep.transition_to(TaskStatus::Queued).unwrap();
        dep.transition_to(TaskStatus::Running).unwrap();
        dep.transition_to(TaskStatus::Completed).unwrap();

        let task = task_with_deps(vec![dep.id]);
        let map: HashMap<Uuid, Task> = [(dep.id, dep)].into_iter().collect();
        assert!(can_execute(&task, &map));
    }

    #[test]
    fn can_execute_false_when_dependency_missing() {
        let task = task_with_deps(vec![Uuid::new_v4()]);
        assert!(!can_execute(&task, &HashMap::new()));
    }

    #[test]
    fn has_failed_dependency_detects_failed_and_cancelled() {
        let mut dep = Task::new("dep");
        dep.transition_to(TaskStatus::Queued).unwrap();
        dep.transition_to(TaskStatus::Running).unwrap();
        dep.transition_to(TaskStatus::Failed).unwrap();

        let task = task_with_deps(vec![dep.id]);
        let map: HashMap<Uuid, Task> = [(dep.id, dep)].into_iter().collect();
        assert!(has_failed_dependency(&task, &map));
    }

    #[test]
    fn detect_cycle_finds_none_in_acyclic_graph() {
        let a = Task::new("a");
        let b = task_with_deps(vec![a.id]);
        assert!(detect_cycle(&[a, b]).is_none());
    }

    #[test]
    fn detect_cycle_returns_witness_path() {
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let mut a = task_with_deps(vec![b_id]);
        a.id = a_id;
        let mut b = task_with_deps(vec![a_id]);
        b.id = b_id;

        let witness = detect_cycle(&[a, b]).expect("cycle expected");
        assert!(witness.contains(&a_id));
        assert!(witness.contains(&b_id));
    }

    #[test]
    fn get_executable_task_ids_filters_pending_and_queued_with_satisfied_deps() {
        let mut dep = Task::new("dep");
        dep.transition_to(TaskStatus::Queued).unwrap();
        dep.transition_to(TaskStatus::Running).unwrap();
        dep.transition_to(TaskStatus::Completed).unwrap();

        let waiting = task_with_deps(vec![Uuid::new_v4()]);
        let ready = task_with_deps(vec![dep.id]);
        let ready_id = ready.id;

        let ids = get_executable_task_ids(&[dep, waiting, ready]);
        assert_eq!(ids, vec![ready_id]);
    }
}
