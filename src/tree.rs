//! Task tree builder
//!
//! Reconstructs the parent→children forest for one project from the flat task
//! list the store hands back. Pure: no store access, no mutation. The
//! children-by-parent index is built once so nesting never re-scans the list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Task;

/// A task with its recursively nested children. Serializes as the task's own
/// fields plus a `children` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    /// Total number of tasks in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TaskNode::count).sum::<usize>()
    }
}

/// Builds the forest rooted under `parent_id` (`None` for the project's root
/// tasks). Siblings are ordered ascending by `sort_order`; ties keep their
/// relative order in `tasks`. A task whose parent id does not appear in
/// `tasks` is an orphan and is omitted from the result entirely.
pub fn build_task_tree(tasks: &[Task], parent_id: Option<&str>) -> Vec<TaskNode> {
    let mut by_parent: HashMap<Option<&str>, Vec<&Task>> = HashMap::new();
    for task in tasks {
        by_parent
            .entry(task.parent_task_id.as_deref())
            .or_default()
            .push(task);
    }
    build_level(&by_parent, parent_id)
}

fn build_level(
    by_parent: &HashMap<Option<&str>, Vec<&Task>>,
    parent_id: Option<&str>,
) -> Vec<TaskNode> {
    let mut siblings = match by_parent.get(&parent_id) {
        Some(bucket) => bucket.clone(),
        None => return Vec::new(),
    };
    // Vec::sort_by_key is stable, which is exactly the tie rule we want.
    siblings.sort_by_key(|t| t.sort_order);
    siblings
        .into_iter()
        .map(|task| TaskNode {
            task: task.clone(),
            children: build_level(by_parent, Some(task.id.as_str())),
        })
        .collect()
}
