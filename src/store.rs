//! Record store boundary
//!
//! Everything above this module talks to storage through the [`Store`] trait:
//! atomic single-record operations plus query-by-project. No cross-record
//! transactions are assumed, and none are offered. [`MemoryStore`] is the
//! in-process implementation used by the server, the CLI, and the tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::models::{
    Category, ChatMessage, Conversation, NewCategory, NewProject, NewTask, Project, ProjectPatch,
    ProjectStatus, Role, Task, TaskPatch, TaskStatus,
};

/// Errors surfaced by a store backend. Lookups that simply find nothing are
/// not errors; they return `None`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Storage collaborator consumed by the tracker, the action interpreter, and
/// the assistant. Every method is an independent await point; callers must not
/// assume two calls see a consistent snapshot.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;
    /// All tasks belonging to a project, in insertion order.
    async fn tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>, StoreError>;
    async fn create_task(&self, input: NewTask) -> Result<Task, StoreError>;
    /// Applies the patch and returns the updated record, or `None` if the id
    /// does not exist.
    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>, StoreError>;
    /// Deletes a single record (no cascade). Returns whether it existed.
    async fn delete_task(&self, id: &str) -> Result<bool, StoreError>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError>;
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn create_project(&self, input: NewProject) -> Result<Project, StoreError>;
    async fn update_project(
        &self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<Option<Project>, StoreError>;
    /// Deletes the project and every task that belongs to it.
    async fn delete_project(&self, id: &str) -> Result<bool, StoreError>;

    /// Categories in their natural storage order. "First" is deterministic.
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn create_category(&self, input: NewCategory) -> Result<Category, StoreError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;
    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError>;
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError>;
    /// Deletes the conversation and its messages.
    async fn delete_conversation(&self, id: &str) -> Result<bool, StoreError>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError>;
    /// Appends a message and bumps the conversation's `updated_at`. Returns
    /// `None` if the conversation does not exist.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Option<ChatMessage>, StoreError>;
}

struct Inner {
    categories: Vec<Category>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    rng: StdRng,
}

impl Inner {
    fn next_id(&mut self) -> String {
        format!("{:032x}", self.rng.gen::<u128>())
    }
}

/// In-memory [`Store`] backed by insertion-ordered vectors behind a mutex.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                categories: Vec::new(),
                projects: Vec::new(),
                tasks: Vec::new(),
                conversations: Vec::new(),
                messages: Vec::new(),
                rng: StdRng::from_entropy(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_task_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(name) = patch.name {
        task.name = name;
    }
    if let Some(description) = patch.description {
        task.description = Some(description);
    }
    if let Some(pct) = patch.percent_complete {
        task.percent_complete = pct;
    }
    if let Some(flag) = patch.is_completed {
        task.is_completed = flag;
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(roadblocks) = patch.roadblocks {
        task.roadblocks = roadblocks;
    }
    if let Some(suggestions) = patch.ai_suggestions {
        task.ai_suggestions = suggestions;
    }
    if let Some(sort_order) = patch.sort_order {
        task.sort_order = sort_order;
    }
}

fn apply_project_patch(project: &mut Project, patch: ProjectPatch) {
    if let Some(name) = patch.name {
        project.name = name;
    }
    if let Some(description) = patch.description {
        project.description = Some(description);
    }
    if let Some(status) = patch.status {
        project.status = status;
    }
    if let Some(pct) = patch.percent_complete {
        project.percent_complete = pct;
    }
    if let Some(roadblocks) = patch.roadblocks {
        project.roadblocks = roadblocks;
    }
    if let Some(suggestions) = patch.ai_suggestions {
        project.ai_suggestions = suggestions;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let inner = self.lock();
        Ok(inner.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_task(&self, input: NewTask) -> Result<Task, StoreError> {
        let mut inner = self.lock();
        let task = Task {
            id: inner.next_id(),
            project_id: input.project_id,
            parent_task_id: input.parent_task_id,
            name: input.name,
            description: input.description,
            percent_complete: 0,
            is_completed: false,
            status: TaskStatus::Pending,
            roadblocks: None,
            ai_suggestions: None,
            sort_order: input.sort_order,
            created_at: Utc::now(),
        };
        inner.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let mut inner = self.lock();
        match inner.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                apply_task_patch(task, patch);
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.tasks.len();
        inner.tasks.retain(|t| t.id != id);
        Ok(inner.tasks.len() < before)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let inner = self.lock();
        Ok(inner.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let inner = self.lock();
        Ok(inner.projects.clone())
    }

    async fn create_project(&self, input: NewProject) -> Result<Project, StoreError> {
        let mut inner = self.lock();
        let project = Project {
            id: inner.next_id(),
            name: input.name,
            description: input.description,
            category_id: input.category_id,
            status: ProjectStatus::Active,
            percent_complete: 0,
            roadblocks: None,
            ai_suggestions: None,
            created_at: Utc::now(),
        };
        inner.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<Option<Project>, StoreError> {
        let mut inner = self.lock();
        match inner.projects.iter_mut().find(|p| p.id == id) {
            Some(project) => {
                apply_project_patch(project, patch);
                Ok(Some(project.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_project(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.projects.len();
        inner.projects.retain(|p| p.id != id);
        let existed = inner.projects.len() < before;
        if existed {
            inner.tasks.retain(|t| t.project_id != id);
        }
        Ok(existed)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let inner = self.lock();
        Ok(inner.categories.clone())
    }

    async fn create_category(&self, input: NewCategory) -> Result<Category, StoreError> {
        let mut inner = self.lock();
        let category = Category {
            id: inner.next_id(),
            name: input.name,
            color: input.color,
        };
        inner.categories.push(category.clone());
        Ok(category)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let inner = self.lock();
        Ok(inner.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.lock();
        Ok(inner.conversations.clone())
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let mut inner = self.lock();
        let conversation = Conversation {
            id: inner.next_id(),
            title: title.to_string(),
            updated_at: Utc::now(),
        };
        inner.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.conversations.len();
        inner.conversations.retain(|c| c.id != id);
        let existed = inner.conversations.len() < before;
        if existed {
            inner.messages.retain(|m| m.conversation_id != id);
        }
        Ok(existed)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();
        match inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            Some(conversation) => conversation.updated_at = now,
            None => return Ok(None),
        }
        let message = ChatMessage {
            id: inner.next_id(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        };
        inner.messages.push(message.clone());
        Ok(Some(message))
    }
}
