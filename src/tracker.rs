//! Completion aggregation engine
//!
//! The tracker owns the invariant that a parent task's and a project's
//! percent-complete are always the arithmetic mean of their direct children,
//! propagated through arbitrary-depth task trees. Every mutation path, the
//! HTTP API and the action interpreter alike, funnels through the methods
//! here so the cascade discipline lives in one place.
//!
//! Aggregate recomputation is deliberately best-effort: both entry points fall
//! silent on a missing id, because they are routinely invoked right after a
//! deletion and their job is to fix up whatever still exists.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskStatus};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rounded arithmetic mean of percent values, half away from zero.
/// `None` for an empty input.
fn rounded_mean<I: IntoIterator<Item = u8>>(values: I) -> Option<u8> {
    let (sum, count) = values
        .into_iter()
        .fold((0u32, 0u32), |(s, n), v| (s + v as u32, n + 1));
    if count == 0 {
        None
    } else {
        Some((sum as f64 / count as f64).round() as u8)
    }
}

/// The engine shared by the server, the CLI, and the assistant. Cloning is
/// cheap; observers subscribe to a broadcast channel that fires after every
/// committed mutation.
#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn Store>,
    update_tx: broadcast::Sender<()>,
}

impl Tracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (update_tx, _rx) = broadcast::channel(100);
        Self { store, update_tx }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Subscribe to change notifications (used by the SSE endpoint).
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.update_tx.subscribe()
    }

    fn notify(&self) {
        let _ = self.update_tx.send(());
    }

    /// Recomputes a project's percent-complete from its root tasks and
    /// persists it unconditionally. Zero root tasks means 0. Missing project:
    /// no-op.
    pub async fn recalc_project(&self, project_id: &str) -> Result<(), TrackerError> {
        if self.store.get_project(project_id).await?.is_none() {
            return Ok(());
        }
        let tasks = self.store.tasks_by_project(project_id).await?;
        let pct = rounded_mean(
            tasks
                .iter()
                .filter(|t| t.parent_task_id.is_none())
                .map(|t| t.percent_complete),
        )
        .unwrap_or(0);
        self.store
            .update_project(
                project_id,
                ProjectPatch {
                    percent_complete: Some(pct),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Recomputes a task's aggregate from its direct children, then walks up
    /// the ancestor chain to the root task. A childless task is left alone;
    /// its percent is leaf-authoritative. The project-level aggregate is NOT
    /// touched here; callers pair this with [`Tracker::recalc_project`].
    pub async fn recalc_parent(&self, task_id: &str) -> Result<(), TrackerError> {
        let mut current = task_id.to_string();
        loop {
            let task = match self.store.get_task(&current).await? {
                Some(task) => task,
                None => break,
            };
            let siblings = self.store.tasks_by_project(&task.project_id).await?;
            let avg = match rounded_mean(
                siblings
                    .iter()
                    .filter(|t| t.parent_task_id.as_deref() == Some(current.as_str()))
                    .map(|t| t.percent_complete),
            ) {
                Some(avg) => avg,
                None => break,
            };
            // An aggregate of zero keeps whatever status the task already
            // had; forcing "pending" would clobber a manually-set state.
            let status = if avg == 100 {
                Some(TaskStatus::Completed)
            } else if avg > 0 {
                Some(TaskStatus::InProgress)
            } else {
                None
            };
            self.store
                .update_task(
                    &current,
                    TaskPatch {
                        percent_complete: Some(avg),
                        is_completed: Some(avg == 100),
                        status,
                        ..Default::default()
                    },
                )
                .await?;
            match task.parent_task_id {
                Some(parent_id) => current = parent_id,
                None => break,
            }
        }
        Ok(())
    }

    /// Deletes a task and every descendant, children before parents. Returns
    /// whether the task existed. Aggregate fix-up of the former parent and
    /// the project is the caller's job (see [`Tracker::remove_task`]).
    pub async fn delete_task_tree(&self, task_id: &str) -> Result<bool, TrackerError> {
        let root = match self.store.get_task(task_id).await? {
            Some(task) => task,
            None => return Ok(false),
        };
        let tasks = self.store.tasks_by_project(&root.project_id).await?;

        // One index pass, then an explicit worklist: tree depth never turns
        // into call-stack depth.
        let mut order = vec![root.id.clone()];
        let mut i = 0;
        while i < order.len() {
            let parent = order[i].clone();
            order.extend(
                tasks
                    .iter()
                    .filter(|t| t.parent_task_id.as_deref() == Some(parent.as_str()))
                    .map(|t| t.id.clone()),
            );
            i += 1;
        }
        for id in order.iter().rev() {
            self.store.delete_task(id).await?;
        }
        Ok(true)
    }

    // --- Mutation paths shared by the API and the action interpreter --- //

    /// Inserts a task and runs the full cascade: parent chain (when nested)
    /// and project aggregate.
    pub async fn create_task(&self, input: NewTask) -> Result<Task, TrackerError> {
        let task = self.store.create_task(input).await?;
        if let Some(parent_id) = &task.parent_task_id {
            self.recalc_parent(parent_id).await?;
        }
        self.recalc_project(&task.project_id).await?;
        self.notify();
        Ok(task)
    }

    /// Patches a task and runs the cascade. Returns `None` when the id does
    /// not exist.
    pub async fn update_task(
        &self,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<Task>, TrackerError> {
        let task = match self.store.update_task(task_id, patch).await? {
            Some(task) => task,
            None => return Ok(None),
        };
        if let Some(parent_id) = &task.parent_task_id {
            self.recalc_parent(parent_id).await?;
        }
        self.recalc_project(&task.project_id).await?;
        self.notify();
        Ok(Some(task))
    }

    /// Deletes a task subtree, then fixes up the former parent's chain and
    /// the project aggregate. Returns whether the task existed.
    pub async fn remove_task(&self, task_id: &str) -> Result<bool, TrackerError> {
        let task = match self.store.get_task(task_id).await? {
            Some(task) => task,
            None => return Ok(false),
        };
        let parent_id = task.parent_task_id.clone();
        let project_id = task.project_id.clone();
        self.delete_task_tree(task_id).await?;
        if let Some(parent_id) = &parent_id {
            self.recalc_parent(parent_id).await?;
        }
        self.recalc_project(&project_id).await?;
        self.notify();
        Ok(true)
    }

    pub async fn create_project(&self, input: NewProject) -> Result<Project, TrackerError> {
        let project = self.store.create_project(input).await?;
        self.notify();
        Ok(project)
    }

    /// Writes project fields directly, bypassing aggregation. This is the escape
    /// hatch the assistant uses to assert an analysis-derived value.
    pub async fn override_project(
        &self,
        project_id: &str,
        patch: ProjectPatch,
    ) -> Result<Option<Project>, TrackerError> {
        let project = self.store.update_project(project_id, patch).await?;
        if project.is_some() {
            self.notify();
        }
        Ok(project)
    }

    /// Deletes a project together with all of its tasks.
    pub async fn remove_project(&self, project_id: &str) -> Result<bool, TrackerError> {
        let existed = self.store.delete_project(project_id).await?;
        if existed {
            self.notify();
        }
        Ok(existed)
    }
}
