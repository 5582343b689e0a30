//! API Server module
//!
//! HTTP surface for the tally tracker: record CRUD on the same mutation paths
//! the action interpreter uses, the chat endpoint with its word-by-word
//! response stream, a server-sent-events feed for UI refresh, and a minimal
//! read-only HTML view.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::assistant::Assistant;
use crate::models::{NewCategory, NewProject, NewTask, ProjectPatch, TaskPatch};
use crate::store::Store;
use crate::tracker::Tracker;
use crate::tree::build_task_tree;

/// Request body for the chat endpoint.
#[derive(Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3210).into(),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Tracker,
    pub assistant: Arc<Assistant>,
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(format!("{} not found", what))),
    )
        .into_response()
}

/// Store/engine failures are fatal for the request: generic message out,
/// detail into the log.
fn internal_error<E: std::fmt::Display>(err: E) -> Response {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("internal server error".to_string())),
    )
        .into_response()
}

/// Builds the application router. Split from [`serve`] so tests can drive it
/// with `tower::ServiceExt::oneshot`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/categories",
            get(list_categories_handler).post(create_category_handler),
        )
        .route(
            "/api/projects",
            get(list_projects_handler).post(create_project_handler),
        )
        .route(
            "/api/projects/:id",
            get(get_project_handler)
                .post(update_project_handler)
                .delete(delete_project_handler),
        )
        .route("/api/projects/:id/tasks", get(project_tasks_handler))
        .route("/api/tasks", post(create_task_handler))
        .route(
            "/api/tasks/:id",
            post(update_task_handler).delete(delete_task_handler),
        )
        .route("/api/conversations", get(list_conversations_handler))
        .route(
            "/api/conversations/:id",
            delete(delete_conversation_handler),
        )
        .route(
            "/api/conversations/:id/messages",
            get(list_messages_handler),
        )
        .route("/api/chat", post(chat_handler))
        .route("/ui", get(ui_handler))
        .route("/ui/events", get(events_handler))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
pub async fn serve(state: AppState, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let app = router(state);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Category handlers --- //

async fn list_categories_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.tracker.store().list_categories().await {
        Ok(categories) => ok(categories),
        Err(e) => internal_error(e),
    }
}

async fn create_category_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewCategory>,
) -> impl IntoResponse {
    match state.tracker.store().create_category(payload).await {
        Ok(category) => ok(category),
        Err(e) => internal_error(e),
    }
}

// --- Project handlers --- //

async fn list_projects_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.tracker.store().list_projects().await {
        Ok(projects) => ok(projects),
        Err(e) => internal_error(e),
    }
}

async fn create_project_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewProject>,
) -> impl IntoResponse {
    match state.tracker.create_project(payload).await {
        Ok(project) => ok(project),
        Err(e) => internal_error(e),
    }
}

async fn get_project_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let project = match state.tracker.store().get_project(&id).await {
        Ok(Some(project)) => project,
        Ok(None) => return not_found("project"),
        Err(e) => return internal_error(e),
    };
    let tasks = match state.tracker.store().tasks_by_project(&id).await {
        Ok(tasks) => tasks,
        Err(e) => return internal_error(e),
    };
    ok(json!({
        "project": project,
        "tasks": build_task_tree(&tasks, None),
    }))
}

async fn update_project_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ProjectPatch>,
) -> impl IntoResponse {
    match state.tracker.override_project(&id, patch).await {
        Ok(Some(project)) => ok(project),
        Ok(None) => not_found("project"),
        Err(e) => internal_error(e),
    }
}

async fn delete_project_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.remove_project(&id).await {
        Ok(true) => ok(()),
        Ok(false) => not_found("project"),
        Err(e) => internal_error(e),
    }
}

async fn project_tasks_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.store().tasks_by_project(&id).await {
        Ok(tasks) => ok(build_task_tree(&tasks, None)),
        Err(e) => internal_error(e),
    }
}

// --- Task handlers --- //

async fn create_task_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewTask>,
) -> impl IntoResponse {
    // Same validation the interpreter applies: the project must exist, and a
    // parent must live in the same project.
    match state.tracker.store().get_project(&payload.project_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("project"),
        Err(e) => return internal_error(e),
    }
    if let Some(parent_id) = &payload.parent_task_id {
        match state.tracker.store().get_task(parent_id).await {
            Ok(Some(parent)) if parent.project_id == payload.project_id => {}
            Ok(_) => return not_found("parent task"),
            Err(e) => return internal_error(e),
        }
    }
    match state.tracker.create_task(payload).await {
        Ok(task) => ok(task),
        Err(e) => internal_error(e),
    }
}

async fn update_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> impl IntoResponse {
    match state.tracker.update_task(&id, patch).await {
        Ok(Some(task)) => ok(task),
        Ok(None) => not_found("task"),
        Err(e) => internal_error(e),
    }
}

async fn delete_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.remove_task(&id).await {
        Ok(true) => ok(()),
        Ok(false) => not_found("task"),
        Err(e) => internal_error(e),
    }
}

// --- Conversation handlers --- //

async fn list_conversations_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.tracker.store().list_conversations().await {
        Ok(conversations) => ok(conversations),
        Err(e) => internal_error(e),
    }
}

async fn delete_conversation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.store().delete_conversation(&id).await {
        Ok(true) => ok(()),
        Ok(false) => not_found("conversation"),
        Err(e) => internal_error(e),
    }
}

async fn list_messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.store().list_messages(&id).await {
        Ok(messages) => ok(messages),
        Err(e) => internal_error(e),
    }
}

// --- Chat --- //

const WORD_DELAY: Duration = Duration::from_millis(30);

async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    // All mutations commit before the first byte streams; the pacing below is
    // purely cosmetic.
    let stream = match state
        .assistant
        .handle_message(payload.conversation_id, &payload.message)
        .await
    {
        Ok(outcome) => WordStream::new(
            &outcome.reply,
            format!(
                "event: done\ndata: {}\n\n",
                json!({
                    "conversationId": &outcome.conversation_id,
                    "executed": outcome.executed,
                })
            ),
        ),
        Err(e) => {
            // Even a failed chat turn terminates its stream cleanly so the
            // client's reader never hangs.
            tracing::error!(error = %e, "chat turn failed");
            WordStream::new(
                "Something went wrong. Please try again.",
                format!(
                    "event: done\ndata: {}\n\n",
                    json!({ "error": "internal server error" })
                ),
            )
        }
    };

    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];
    (headers, axum::body::Body::from_stream(stream))
}

/// Streams a committed reply one word per frame, then a terminating `done`
/// frame. The inter-word delay is cosmetic pacing, nothing more.
struct WordStream {
    words: VecDeque<String>,
    done_frame: Option<String>,
    timer: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl WordStream {
    fn new(reply: &str, done_frame: String) -> Self {
        Self {
            words: reply.split_whitespace().map(str::to_string).collect(),
            done_frame: Some(done_frame),
            timer: None,
        }
    }
}

impl Stream for WordStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(timer) = self.timer.as_mut() {
            match timer.as_mut().poll(cx) {
                Poll::Ready(()) => self.timer = None,
                Poll::Pending => return Poll::Pending,
            }
        }
        if let Some(word) = self.words.pop_front() {
            if !self.words.is_empty() {
                self.timer = Some(Box::pin(tokio::time::sleep(WORD_DELAY)));
            }
            return Poll::Ready(Some(Ok(format!("data: {}\n\n", word))));
        }
        match self.done_frame.take() {
            Some(frame) => Poll::Ready(Some(Ok(frame))),
            None => Poll::Ready(None),
        }
    }
}

// --- UI events (SSE) --- //

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let receiver = state.tracker.subscribe();
    let stream = EventStream {
        tracker: state.tracker.clone(),
        receiver,
    };

    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];
    (headers, axum::body::Body::from_stream(stream))
}

struct EventStream {
    tracker: Tracker,
    receiver: tokio::sync::broadcast::Receiver<()>,
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.try_recv() {
            Ok(()) => Poll::Ready(Some(Ok("event: update\ndata: change\n\n".to_string()))),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {
                // No updates right now; check back shortly.
                let waker = cx.waker().clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    waker.wake();
                });
                Poll::Pending
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => {
                // Missed some notifications; a single refresh covers them all.
                Poll::Ready(Some(Ok("event: update\ndata: change\n\n".to_string())))
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Closed) => {
                self.receiver = self.tracker.subscribe();
                Poll::Pending
            }
        }
    }
}

// --- UI --- //

async fn ui_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.tracker.store();
    let projects = match store.list_projects().await {
        Ok(projects) => projects,
        Err(e) => return internal_error(e),
    };

    let mut html = String::from(HTML_TEMPLATE_HEADER);
    if projects.is_empty() {
        html.push_str("<p>No projects yet. Talk to the assistant or use the API.</p>");
    }
    for project in projects {
        let tasks = match store.tasks_by_project(&project.id).await {
            Ok(tasks) => tasks,
            Err(e) => return internal_error(e),
        };
        let forest = build_task_tree(&tasks, None);
        html.push_str(&format!(
            "<div class='project'><h2>{} <span class='pct'>{}%</span></h2>",
            html_escape::encode_text(&project.name),
            project.percent_complete
        ));
        if let Some(roadblocks) = &project.roadblocks {
            html.push_str(&format!(
                "<p class='roadblocks'>⚠ {}</p>",
                html_escape::encode_text(roadblocks)
            ));
        }
        render_forest_html(&mut html, &forest);
        html.push_str("</div>");
    }
    html.push_str(HTML_TEMPLATE_FOOTER);
    Html(html).into_response()
}

fn render_forest_html(html: &mut String, forest: &[crate::tree::TaskNode]) {
    if forest.is_empty() {
        return;
    }
    html.push_str("<ul class='task-tree'>");
    for node in forest {
        let class = if node.task.is_completed {
            "completed"
        } else {
            ""
        };
        html.push_str(&format!(
            "<li class='{}'><span class='task-name'>{}</span> <span class='task-pct'>{}%</span> <span class='task-status'>{}</span>",
            class,
            html_escape::encode_text(&node.task.name),
            node.task.percent_complete,
            node.task.status
        ));
        render_forest_html(html, &node.children);
        html.push_str("</li>");
    }
    html.push_str("</ul>");
}

const HTML_TEMPLATE_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>tally</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; color: #333; max-width: 900px; margin: 0 auto; padding: 20px; background: #f7f9fc; }
        h1 { color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }
        .project { background: white; border-radius: 8px; padding: 16px 20px; margin-bottom: 16px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
        .pct { color: #3498db; font-size: 0.8em; }
        .roadblocks { color: #c0392b; }
        .task-tree { list-style-type: none; padding-left: 20px; }
        .task-tree li { padding: 4px 0; }
        .task-pct { color: #7f8c8d; font-size: 0.85em; }
        .task-status { color: #95a5a6; font-size: 0.85em; }
        .completed > .task-name { color: #7f8c8d; text-decoration: line-through; }
    </style>
</head>
<body>
    <h1>tally</h1>
"#;

const HTML_TEMPLATE_FOOTER: &str = r#"
    <script>
        const source = new EventSource('/ui/events');
        source.addEventListener('update', () => window.location.reload());
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{ChatTurn, LanguageModel, ModelError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt; // for `collect`
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    struct CannedModel {
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, _system: &str, _turns: &[ChatTurn]) -> Result<String, ModelError> {
            Ok(self.reply.clone())
        }
    }

    fn test_app(model_reply: &str) -> (AppState, Router) {
        let tracker = Tracker::new(Arc::new(MemoryStore::new()));
        let assistant = Arc::new(Assistant::new(
            tracker.clone(),
            Arc::new(CannedModel {
                reply: model_reply.to_string(),
            }),
        ));
        let state = AppState { tracker, assistant };
        let app = router(state.clone());
        (state, app)
    }

    async fn request_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_category_and_project_crud() {
        let (_state, app) = test_app("{}");

        let (status, body) = request_json(
            &app,
            "POST",
            "/api/categories",
            json!({"name": "Work", "color": "#3498db"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], Value::Bool(true));

        let (status, body) = request_json(
            &app,
            "POST",
            "/api/projects",
            json!({"name": "Website refresh"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let project_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["percent_complete"], json!(0));
        assert_eq!(body["data"]["status"], json!("active"));

        let (status, body) = get_json(&app, "/api/projects").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _body) = get_json(&app, &format!("/api/projects/{}", project_id)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_task_mutations_cascade_through_api() {
        let (_state, app) = test_app("{}");

        let (_, body) =
            request_json(&app, "POST", "/api/projects", json!({"name": "P"})).await;
        let project_id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = request_json(
            &app,
            "POST",
            "/api/tasks",
            json!({"project_id": &project_id, "name": "parent"}),
        )
        .await;
        let parent_id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = request_json(
            &app,
            "POST",
            "/api/tasks",
            json!({"project_id": &project_id, "parent_task_id": &parent_id, "name": "leaf"}),
        )
        .await;
        let leaf_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = request_json(
            &app,
            "POST",
            &format!("/api/tasks/{}", leaf_id),
            json!({"percent_complete": 100, "is_completed": true, "status": "completed"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The parent aggregated to 100 and the project followed.
        let (_, body) = get_json(&app, &format!("/api/projects/{}/tasks", project_id)).await;
        let forest = body["data"].as_array().unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0]["percent_complete"], json!(100));
        assert_eq!(forest[0]["is_completed"], json!(true));
        assert_eq!(forest[0]["children"][0]["percent_complete"], json!(100));

        let (_, body) = get_json(&app, &format!("/api/projects/{}", project_id)).await;
        assert_eq!(body["data"]["project"]["percent_complete"], json!(100));

        // Deleting the parent removes the subtree and resets the aggregate.
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/tasks/{}", parent_id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = get_json(&app, &format!("/api/projects/{}/tasks", project_id)).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
        let (_, body) = get_json(&app, &format!("/api/projects/{}", project_id)).await;
        assert_eq!(body["data"]["project"]["percent_complete"], json!(0));
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_404() {
        let (_state, app) = test_app("{}");
        let (status, body) = request_json(
            &app,
            "POST",
            "/api/tasks/nope",
            json!({"percent_complete": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], Value::Bool(false));
    }

    #[tokio::test]
    async fn test_chat_streams_words_and_commits_mutations() {
        let (state, app) = test_app(
            r#"{"actions": [{"type": "create_project", "name": "Q2"}], "responseMessage": "All set."}"#,
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"message": "make me a Q2 project"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/event-stream"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        // Word frames for the committed reply, then the terminating frame.
        assert!(body.contains("data: Created"));
        assert!(body.contains("data: All"));
        assert!(body.contains("event: done"));
        assert!(body.contains("\"executed\":1"));

        let projects = state.tracker.store().list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Q2");
    }

    #[tokio::test]
    async fn test_chat_with_garbage_model_reply_still_terminates() {
        let (state, app) = test_app("not json at all");

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .body(Body::from(json!({"message": "hello"}).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("event: done"));
        assert!(body.contains("\"executed\":0"));
        assert!(state.tracker.store().list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ui_renders_and_escapes() {
        let (state, app) = test_app("{}");
        state
            .tracker
            .create_project(NewProject {
                name: "<script>alert(1)</script>".to_string(),
                description: None,
                category_id: None,
            })
            .await
            .unwrap();

        let (status, _) = get_json(&app, "/api/projects").await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder()
            .method("GET")
            .uri("/ui")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&bytes);
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
