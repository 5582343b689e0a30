//! Assistant layer
//!
//! Isolates the language-model call behind a narrow trait and turns its
//! loosely-typed reply into the canonical `{actions, responseMessage}` shape.
//! Anything the model sends that does not parse degrades to a canned fallback
//! with zero actions; malformed output never reaches the interpreter and
//! never fails the request.

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::actions::{Action, BatchOutcome, Interpreter};
use crate::models::Role;
use crate::store::{Store, StoreError};
use crate::tracker::{Tracker, TrackerError};
use crate::tree::build_task_tree;

/// Reply shown when the model's output cannot be interpreted.
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't work out what to change there. Could you rephrase that?";

lazy_static! {
    static ref ACTION_GUIDE: Vec<String> = vec![
        r#"{"type": "create_project", "name": "...", "description": "...", "categoryId": "..."}"#
            .to_string(),
        r#"{"type": "create_task", "projectId": "... or NEW_PROJECT", "name": "...", "parentTaskId": null}"#
            .to_string(),
        r#"{"type": "update_task", "taskId": "...", "percentComplete": 0-100, "isCompleted": true, "roadblocks": "... or null"}"#
            .to_string(),
        r#"{"type": "update_project", "projectId": "...", "percentComplete": 0-100, "roadblocks": "... or null"}"#
            .to_string(),
    ];
}

/// One prior turn of the conversation, as sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// The canonical parsed model reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReply {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub response_message: String,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API error: {0}")]
    Api(String),
}

/// The opaque model call: system instruction plus conversation turns in, raw
/// text out. Implementations must not interpret the reply.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, turns: &[ChatTurn]) -> Result<String, ModelError>;
}

/// Coerces raw model output into an [`AiReply`]. Tries a direct parse first,
/// then the outermost brace span (models love code fences), and otherwise
/// returns the fallback with zero actions.
pub fn parse_reply(raw: &str) -> AiReply {
    if let Ok(reply) = serde_json::from_str::<AiReply>(raw) {
        return reply;
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(reply) = serde_json::from_str::<AiReply>(&raw[start..=end]) {
                return reply;
            }
        }
    }
    AiReply {
        actions: Vec::new(),
        response_message: FALLBACK_REPLY.to_string(),
    }
}

/// Configuration for the HTTP model adapter, read from the environment.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl ModelConfig {
    /// `TALLY_MODEL_URL`, `TALLY_MODEL_KEY`, `TALLY_MODEL` with
    /// OpenAI-compatible defaults.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TALLY_MODEL_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("TALLY_MODEL_KEY").unwrap_or_default(),
            model: std::env::var("TALLY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

/// [`LanguageModel`] backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpModel {
    http: reqwest::Client,
    config: ModelConfig,
}

impl HttpModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for HttpModel {
    async fn complete(&self, system: &str, turns: &[ChatTurn]) -> Result<String, ModelError> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: system,
        }];
        messages.extend(turns.iter().map(|turn| WireMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &turn.content,
        }));

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": &self.config.model,
                "messages": messages,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ModelError::Api(format!(
                "chat completion failed with status {}",
                response.status()
            )));
        }
        let completion: Completion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::Api("completion carried no choices".to_string()))
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// What one chat turn produced, after all mutations were committed.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub reply: String,
    pub executed: usize,
    pub log: Vec<String>,
}

/// Orchestrates a chat turn: conversation bookkeeping, context snapshot,
/// model call, interpretation, and the final user-facing reply.
pub struct Assistant {
    tracker: Tracker,
    model: std::sync::Arc<dyn LanguageModel>,
}

impl Assistant {
    pub fn new(tracker: Tracker, model: std::sync::Arc<dyn LanguageModel>) -> Self {
        Self { tracker, model }
    }

    /// Handles one user message end to end. The conversation is created
    /// lazily when none is given (or the given id no longer exists).
    pub async fn handle_message(
        &self,
        conversation_id: Option<String>,
        text: &str,
    ) -> Result<ChatOutcome, AssistantError> {
        let store = self.tracker.store();

        let conversation = match conversation_id {
            Some(id) => match store.get_conversation(&id).await? {
                Some(conversation) => conversation,
                None => store.create_conversation(&derive_title(text)).await?,
            },
            None => store.create_conversation(&derive_title(text)).await?,
        };
        store
            .append_message(&conversation.id, Role::User, text)
            .await?;

        let turns: Vec<ChatTurn> = store
            .list_messages(&conversation.id)
            .await?
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content,
            })
            .collect();

        let system = self.system_prompt().await?;
        let reply = match self.model.complete(&system, &turns).await {
            Ok(raw) => parse_reply(&raw),
            Err(err) => {
                // The chat path must keep answering even when the model is
                // down; degrade exactly like malformed output.
                error!(error = %err, "model call failed");
                parse_reply("")
            }
        };

        let categories = store.list_categories().await?;
        let outcome = Interpreter::new(&self.tracker)
            .execute(reply.actions, &categories)
            .await?;
        let message = compose_reply(&reply.response_message, &outcome);

        store
            .append_message(&conversation.id, Role::Assistant, &message)
            .await?;

        Ok(ChatOutcome {
            conversation_id: conversation.id,
            reply: message,
            executed: outcome.executed,
            log: outcome.log,
        })
    }

    /// System instruction plus a JSON snapshot of the current workspace so
    /// the model can reference real ids.
    async fn system_prompt(&self) -> Result<String, AssistantError> {
        let store = self.tracker.store();
        let categories = store.list_categories().await?;
        let mut projects = Vec::new();
        for project in store.list_projects().await? {
            let tasks = store.tasks_by_project(&project.id).await?;
            let forest = build_task_tree(&tasks, None);
            projects.push(json!({
                "id": project.id,
                "name": project.name,
                "description": project.description,
                "categoryId": project.category_id,
                "percentComplete": project.percent_complete,
                "roadblocks": project.roadblocks,
                "tasks": forest,
            }));
        }
        let snapshot = json!({
            "categories": categories,
            "projects": projects,
        });

        Ok(format!(
            "You are the assistant inside tally, a project and task tracker. \
             The user talks to you in natural language; you answer with a single \
             JSON object: {{\"actions\": [...], \"responseMessage\": \"...\"}}. \
             Use an empty actions array for purely conversational replies. \
             Each action takes one of these forms:\n{}\n\
             Use \"NEW_PROJECT\" as a projectId to reference a project created \
             earlier in the same reply. Current workspace state:\n{}",
            ACTION_GUIDE.join("\n"),
            snapshot
        ))
    }
}

/// Conversation title from the first message: first line, truncated on a
/// char boundary.
fn derive_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "New conversation".to_string();
    }
    let mut title: String = first_line.chars().take(48).collect();
    if first_line.chars().count() > 48 {
        title.push('…');
    }
    title
}

/// Prefixes the model's message with a summary of what actually happened.
/// Zero executed actions means a pure conversational reply.
fn compose_reply(response_message: &str, outcome: &BatchOutcome) -> String {
    if outcome.executed == 0 {
        return response_message.to_string();
    }
    let mut summary = String::from("Here's what I did:\n");
    for line in &outcome.log {
        summary.push_str("• ");
        summary.push_str(line);
        summary.push('\n');
    }
    if response_message.is_empty() {
        summary.trim_end().to_string()
    } else {
        format!("{}\n{}", summary, response_message)
    }
}
