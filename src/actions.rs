//! Action interpreter
//!
//! Turns the assistant's loosely-structured action batch into ordered,
//! validated mutations against the store. Actions run strictly in array
//! order and are individually caught: a bad reference skips that one action
//! and the batch keeps going. There is no rollback: partial progress beats
//! all-or-nothing for a best-effort conversational agent.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{Category, NewProject, NewTask, ProjectPatch, TaskPatch, TaskStatus};
use crate::store::Store;
use crate::tracker::{Tracker, TrackerError};

/// Sentinel the model uses as a `create_task` project id to reference the
/// project created earlier in the same batch.
pub const NEW_PROJECT_PLACEHOLDER: &str = "NEW_PROJECT";

/// One step of an interpreted batch, as emitted by the model. The tag is
/// snake_case, the fields camelCase. This is the model-facing wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Action {
    CreateProject {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        category_id: Option<String>,
    },
    CreateTask {
        project_id: String,
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parent_task_id: Option<String>,
    },
    UpdateTask {
        task_id: String,
        #[serde(default)]
        percent_complete: Option<u8>,
        #[serde(default)]
        is_completed: Option<bool>,
        #[serde(default)]
        roadblocks: Option<Option<String>>,
    },
    UpdateProject {
        project_id: String,
        #[serde(default)]
        percent_complete: Option<u8>,
        #[serde(default)]
        roadblocks: Option<Option<String>>,
    },
}

/// What a batch did: one human-readable line per executed action, in order.
/// `executed == 0` signals a purely conversational turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub log: Vec<String>,
    pub executed: usize,
    pub new_project_id: Option<String>,
}

/// Per-action failures. Reference errors skip the single action; a store
/// failure wrapped in `Tracker` aborts the whole request.
#[derive(Debug, Error)]
enum ActionError {
    #[error("unknown project id {0:?}")]
    UnknownProject(String),
    #[error("unknown task id {0:?}")]
    UnknownTask(String),
    #[error("NEW_PROJECT placeholder used before any project was created in this batch")]
    UnresolvedPlaceholder,
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Mutable batch state threaded through execution. A single slot, not a
/// stack: with several `create_project` actions in one batch, only the most
/// recent id answers the placeholder.
#[derive(Default)]
struct BatchState {
    last_project: Option<String>,
}

/// Executes action batches against a [`Tracker`].
pub struct Interpreter<'a> {
    tracker: &'a Tracker,
}

impl<'a> Interpreter<'a> {
    pub fn new(tracker: &'a Tracker) -> Self {
        Self { tracker }
    }

    /// Runs the batch in order. `categories` is the caller-supplied list used
    /// for `create_project` category resolution.
    pub async fn execute(
        &self,
        actions: Vec<Action>,
        categories: &[Category],
    ) -> Result<BatchOutcome, TrackerError> {
        let mut state = BatchState::default();
        let mut log = Vec::new();
        for (position, action) in actions.into_iter().enumerate() {
            match self.apply(action, categories, &mut state).await {
                Ok(line) => log.push(line),
                Err(ActionError::Tracker(err)) => return Err(err),
                Err(err) => warn!(position, error = %err, "skipping action"),
            }
        }
        Ok(BatchOutcome {
            executed: log.len(),
            log,
            new_project_id: state.last_project,
        })
    }

    async fn apply(
        &self,
        action: Action,
        categories: &[Category],
        state: &mut BatchState,
    ) -> Result<String, ActionError> {
        match action {
            Action::CreateProject {
                name,
                description,
                category_id,
            } => {
                let category_id = resolve_category(categories, category_id.as_deref());
                let project = self
                    .tracker
                    .create_project(NewProject {
                        name: name.clone(),
                        description,
                        category_id,
                    })
                    .await?;
                state.last_project = Some(project.id);
                Ok(format!("Created project \"{}\"", name))
            }

            Action::CreateTask {
                project_id,
                name,
                description,
                parent_task_id,
            } => {
                let project_id = if project_id == NEW_PROJECT_PLACEHOLDER {
                    state
                        .last_project
                        .clone()
                        .ok_or(ActionError::UnresolvedPlaceholder)?
                } else {
                    project_id
                };
                let store = self.tracker.store();
                if store
                    .get_project(&project_id)
                    .await
                    .map_err(TrackerError::from)?
                    .is_none()
                {
                    return Err(ActionError::UnknownProject(project_id));
                }
                if let Some(parent_id) = &parent_task_id {
                    match store.get_task(parent_id).await.map_err(TrackerError::from)? {
                        Some(parent) if parent.project_id == project_id => {}
                        _ => return Err(ActionError::UnknownTask(parent_id.clone())),
                    }
                }
                self.tracker
                    .create_task(NewTask {
                        project_id,
                        parent_task_id,
                        name: name.clone(),
                        description,
                        sort_order: 0,
                    })
                    .await?;
                Ok(format!("Created task \"{}\"", name))
            }

            Action::UpdateTask {
                task_id,
                percent_complete,
                is_completed,
                roadblocks,
            } => {
                let existing = self
                    .tracker
                    .store()
                    .get_task(&task_id)
                    .await
                    .map_err(TrackerError::from)?
                    .ok_or_else(|| ActionError::UnknownTask(task_id.clone()))?;

                let mut patch = TaskPatch::default();
                if let Some(pct) = percent_complete {
                    let pct = pct.min(100);
                    patch.percent_complete = Some(pct);
                    patch.is_completed = Some(pct == 100);
                    patch.status = match pct {
                        100 => Some(TaskStatus::Completed),
                        p if p > 0 => Some(TaskStatus::InProgress),
                        // Zero leaves the existing status alone instead of
                        // forcing "pending".
                        _ => None,
                    };
                }
                // An explicit flag overrides the derived one; completion
                // without an explicit percent drags percent up to 100.
                if let Some(flag) = is_completed {
                    patch.is_completed = Some(flag);
                    if flag && percent_complete.is_none() {
                        patch.percent_complete = Some(100);
                        patch.status = Some(TaskStatus::Completed);
                    }
                }
                if let Some(rb) = roadblocks {
                    patch.roadblocks = Some(rb);
                }

                self.tracker.update_task(&task_id, patch).await?;
                Ok(format!("Updated task \"{}\"", existing.name))
            }

            Action::UpdateProject {
                project_id,
                percent_complete,
                roadblocks,
            } => {
                let mut patch = ProjectPatch::default();
                if let Some(pct) = percent_complete {
                    patch.percent_complete = Some(pct.min(100));
                }
                if let Some(rb) = roadblocks {
                    patch.roadblocks = Some(rb);
                }
                // Direct override, no aggregation cascade: the assistant is
                // allowed to assert a project-level value outright.
                let project = self
                    .tracker
                    .override_project(&project_id, patch)
                    .await?
                    .ok_or(ActionError::UnknownProject(project_id))?;
                Ok(format!("Updated project \"{}\"", project.name))
            }
        }
    }
}

/// Category resolution for `create_project`: explicit id match, then
/// case-insensitive name match, then the first category in the list, then
/// none at all when the list is empty.
fn resolve_category(categories: &[Category], requested: Option<&str>) -> Option<String> {
    match requested {
        Some(wanted) => categories
            .iter()
            .find(|c| c.id == wanted)
            .or_else(|| categories.iter().find(|c| c.name.eq_ignore_ascii_case(wanted)))
            .or_else(|| categories.first())
            .map(|c| c.id.clone()),
        None => categories.first().map(|c| c.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCategory;
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;

    fn tracker() -> Tracker {
        Tracker::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_action_wire_format() {
        let raw = r#"{"type":"create_task","projectId":"NEW_PROJECT","name":"Kickoff"}"#;
        let action: Action = serde_json::from_str(raw).unwrap();
        match action {
            Action::CreateTask {
                project_id, name, ..
            } => {
                assert_eq!(project_id, NEW_PROJECT_PLACEHOLDER);
                assert_eq!(name, "Kickoff");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_project_placeholder_resolves_to_batch_project() {
        let tracker = tracker();
        let outcome = Interpreter::new(&tracker)
            .execute(
                vec![
                    Action::CreateProject {
                        name: "Q2".to_string(),
                        description: None,
                        category_id: None,
                    },
                    Action::CreateTask {
                        project_id: NEW_PROJECT_PLACEHOLDER.to_string(),
                        name: "Kickoff".to_string(),
                        description: None,
                        parent_task_id: None,
                    },
                ],
                &[],
            )
            .await
            .unwrap();

        assert_eq!(outcome.executed, 2);
        assert_eq!(
            outcome.log,
            vec!["Created project \"Q2\"", "Created task \"Kickoff\""]
        );

        let projects = tracker.store().list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Q2");
        // One root task at 0%, so the cascade recomputed the aggregate.
        assert_eq!(projects[0].percent_complete, 0);

        let tasks = tracker.store().tasks_by_project(&projects[0].id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id, projects[0].id);
        assert_eq!(outcome.new_project_id.as_deref(), Some(projects[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_placeholder_without_create_is_skipped() {
        let tracker = tracker();
        let outcome = Interpreter::new(&tracker)
            .execute(
                vec![Action::CreateTask {
                    project_id: NEW_PROJECT_PLACEHOLDER.to_string(),
                    name: "Orphan".to_string(),
                    description: None,
                    parent_task_id: None,
                }],
                &[],
            )
            .await
            .unwrap();

        assert_eq!(outcome.executed, 0);
        assert!(tracker.store().list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_created_project_wins_the_placeholder() {
        let tracker = tracker();
        Interpreter::new(&tracker)
            .execute(
                vec![
                    Action::CreateProject {
                        name: "First".to_string(),
                        description: None,
                        category_id: None,
                    },
                    Action::CreateProject {
                        name: "Second".to_string(),
                        description: None,
                        category_id: None,
                    },
                    Action::CreateTask {
                        project_id: NEW_PROJECT_PLACEHOLDER.to_string(),
                        name: "Lands in Second".to_string(),
                        description: None,
                        parent_task_id: None,
                    },
                ],
                &[],
            )
            .await
            .unwrap();

        let projects = tracker.store().list_projects().await.unwrap();
        let second = projects.iter().find(|p| p.name == "Second").unwrap();
        let tasks = tracker.store().tasks_by_project(&second.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_reference_skips_without_aborting_batch() {
        let tracker = tracker();
        let project = tracker
            .create_project(NewProject {
                name: "Real".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();

        let outcome = Interpreter::new(&tracker)
            .execute(
                vec![
                    Action::UpdateTask {
                        task_id: "does-not-exist".to_string(),
                        percent_complete: Some(50),
                        is_completed: None,
                        roadblocks: None,
                    },
                    Action::CreateTask {
                        project_id: project.id.clone(),
                        name: "Still lands".to_string(),
                        description: None,
                        parent_task_id: None,
                    },
                ],
                &[],
            )
            .await
            .unwrap();

        assert_eq!(outcome.executed, 1);
        assert_eq!(outcome.log, vec!["Created task \"Still lands\""]);
    }

    #[tokio::test]
    async fn test_update_task_percent_drives_status() {
        let tracker = tracker();
        let project = tracker
            .create_project(NewProject {
                name: "P".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();
        let task = tracker
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_task_id: None,
                name: "T".to_string(),
                description: None,
                sort_order: 0,
            })
            .await
            .unwrap();

        Interpreter::new(&tracker)
            .execute(
                vec![Action::UpdateTask {
                    task_id: task.id.clone(),
                    percent_complete: Some(100),
                    is_completed: None,
                    roadblocks: None,
                }],
                &[],
            )
            .await
            .unwrap();

        let task = tracker.store().get_task(&task.id).await.unwrap().unwrap();
        assert!(task.is_completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.percent_complete, 100);
    }

    #[tokio::test]
    async fn test_update_task_zero_percent_preserves_custom_status() {
        let tracker = tracker();
        let project = tracker
            .create_project(NewProject {
                name: "P".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();
        let task = tracker
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_task_id: None,
                name: "T".to_string(),
                description: None,
                sort_order: 0,
            })
            .await
            .unwrap();
        tracker
            .store()
            .update_task(
                &task.id,
                TaskPatch {
                    status: Some(TaskStatus::Custom("blocked".to_string())),
                    percent_complete: Some(20),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        Interpreter::new(&tracker)
            .execute(
                vec![Action::UpdateTask {
                    task_id: task.id.clone(),
                    percent_complete: Some(0),
                    is_completed: None,
                    roadblocks: None,
                }],
                &[],
            )
            .await
            .unwrap();

        let task = tracker.store().get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.percent_complete, 0);
        assert!(!task.is_completed);
        assert_eq!(task.status, TaskStatus::Custom("blocked".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_completion_forces_percent() {
        let tracker = tracker();
        let project = tracker
            .create_project(NewProject {
                name: "P".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();
        let task = tracker
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_task_id: None,
                name: "T".to_string(),
                description: None,
                sort_order: 0,
            })
            .await
            .unwrap();

        Interpreter::new(&tracker)
            .execute(
                vec![Action::UpdateTask {
                    task_id: task.id.clone(),
                    percent_complete: None,
                    is_completed: Some(true),
                    roadblocks: None,
                }],
                &[],
            )
            .await
            .unwrap();

        let task = tracker.store().get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.percent_complete, 100);
        assert!(task.is_completed);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_project_bypasses_aggregation() {
        let tracker = tracker();
        let project = tracker
            .create_project(NewProject {
                name: "P".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();
        // A root task at 0% would normally pin the aggregate to 0.
        tracker
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_task_id: None,
                name: "T".to_string(),
                description: None,
                sort_order: 0,
            })
            .await
            .unwrap();

        Interpreter::new(&tracker)
            .execute(
                vec![Action::UpdateProject {
                    project_id: project.id.clone(),
                    percent_complete: Some(40),
                    roadblocks: Some(Some("vendor delay".to_string())),
                }],
                &[],
            )
            .await
            .unwrap();

        let project = tracker
            .store()
            .get_project(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.percent_complete, 40);
        assert_eq!(project.roadblocks.as_deref(), Some("vendor delay"));
    }

    #[tokio::test]
    async fn test_category_resolution_order() {
        let tracker = tracker();
        let store = tracker.store();
        let work = store
            .create_category(NewCategory {
                name: "Work".to_string(),
                color: "#3498db".to_string(),
            })
            .await
            .unwrap();
        let home = store
            .create_category(NewCategory {
                name: "Home".to_string(),
                color: "#2ecc71".to_string(),
            })
            .await
            .unwrap();
        let categories = store.list_categories().await.unwrap();

        // Exact id wins.
        assert_eq!(
            resolve_category(&categories, Some(home.id.as_str())),
            Some(home.id.clone())
        );
        // Case-insensitive name match.
        assert_eq!(
            resolve_category(&categories, Some("hOmE")),
            Some(home.id.clone())
        );
        // Unknown falls back to the first category.
        assert_eq!(
            resolve_category(&categories, Some("nonsense")),
            Some(work.id.clone())
        );
        // Omitted also defaults to the first.
        assert_eq!(resolve_category(&categories, None), Some(work.id.clone()));
        // Empty list means no category at all.
        assert_eq!(resolve_category(&[], Some("anything")), None);
    }
}
