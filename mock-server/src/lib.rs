use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const API_VERSION: &str = "v1";
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub public: bool,
    pub exposed_to_agents: bool,
    pub project_id: String,
    pub revisions: Vec<Revision>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub active: bool,
    pub system_prompt: String,
    pub user_prompt: String,
    pub llm_model_id: String,
    pub image_required: bool,
    pub optimise_images: bool,
    pub output_modality: String,
    pub output_format: Value,
    pub input_params: Vec<String>,
    pub input_processors: Option<Value>,
    pub rag: Option<Value>,
    pub task_forwarder_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub alias: String,
    pub provider: String,
    pub description: String,
    pub supports_vision: bool,
}

/// Creatable task fields. Missing fields default so validation can report
/// them the way the real API does.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskInput {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub public: bool,
    pub exposed_to_agents: bool,
    pub system_prompt: String,
    pub user_prompt: String,
    pub llm_model_id: String,
    pub image_required: bool,
    pub optimise_images: bool,
    pub output_modality: String,
    pub output_format: Value,
    pub input_processors: Option<Value>,
    pub rag: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRevision {
    pub task_revision_id: String,
    #[serde(default)]
    pub weight: u32,
}

impl TaskInput {
    fn validate(&self) -> Result<(), ApiFailure> {
        if self.name.trim().is_empty() {
            return Err(invalid("name required"));
        }
        Ok(())
    }

    fn revision(&self, active: bool) -> Revision {
        Revision {
            id: Uuid::new_v4().to_string(),
            active,
            system_prompt: self.system_prompt.clone(),
            user_prompt: self.user_prompt.clone(),
            llm_model_id: self.llm_model_id.clone(),
            image_required: self.image_required,
            optimise_images: self.optimise_images,
            output_modality: self.output_modality.clone(),
            output_format: if self.output_format.is_null() {
                json!({})
            } else {
                self.output_format.clone()
            },
            input_params: placeholders(&self.user_prompt),
            input_processors: self.input_processors.clone(),
            rag: self.rag.clone(),
            task_forwarder_id: None,
        }
    }

    fn apply(&self, task: &mut Task) {
        task.name = self.name.clone();
        task.description = self.description.clone();
        task.enabled = self.enabled;
        task.public = self.public;
        task.exposed_to_agents = self.exposed_to_agents;
    }
}

/// The `{name}` placeholders of a prompt, in first-seen order.
fn placeholders(prompt: &str) -> Vec<String> {
    let mut params: Vec<String> = Vec::new();
    let mut rest = prompt;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        let name = after[..end].trim();
        if !name.is_empty() && !params.iter().any(|p| p == name) {
            params.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    params
}

type ApiFailure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: &str) -> ApiFailure {
    (status, Json(json!({ "message": message })))
}

fn invalid(message: &str) -> ApiFailure {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "details": [{ "message": message }] })),
    )
}

struct Inner {
    basic_credentials: String,
    tokens: RwLock<HashSet<String>>,
    token_grants: AtomicUsize,
    tasks: RwLock<HashMap<String, Task>>,
    models: Vec<Model>,
}

/// Shared server state: accepted client credentials, issued tokens, tasks
/// and the model catalog.
#[derive(Clone)]
pub struct MockState(Arc<Inner>);

impl MockState {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self::with_models(client_id, client_secret, default_models())
    }

    pub fn with_models(client_id: &str, client_secret: &str, models: Vec<Model>) -> Self {
        let encoded = BASE64_STANDARD.encode(format!("{client_id}:{client_secret}"));
        Self(Arc::new(Inner {
            basic_credentials: format!("Basic {encoded}"),
            tokens: RwLock::new(HashSet::new()),
            token_grants: AtomicUsize::new(0),
            tasks: RwLock::new(HashMap::new()),
            models,
        }))
    }

    /// Number of access tokens issued so far.
    pub fn token_grants(&self) -> usize {
        self.0.token_grants.load(Ordering::SeqCst)
    }
}

pub fn default_models() -> Vec<Model> {
    vec![
        Model {
            id: "0190fd3c-2f2a-7a10-a0de-24a6c3f0b9a2".to_string(),
            name: "gpt-4o".to_string(),
            alias: "gpt-4o-2024-08-06".to_string(),
            provider: "openai".to_string(),
            description: "Multimodal flagship model".to_string(),
            supports_vision: true,
        },
        Model {
            id: "0190fd3c-7d41-7b6e-91c5-0e2d8f4a1c37".to_string(),
            name: "claude-3-5-sonnet".to_string(),
            alias: "claude-3-5-sonnet-20240620".to_string(),
            provider: "anthropic".to_string(),
            description: "Balanced reasoning model".to_string(),
            supports_vision: true,
        },
        Model {
            id: "0190fd3c-9a12-7f00-b3d4-6c1e2a5b8d90".to_string(),
            name: "llama-3-8b".to_string(),
            alias: "llama-3-8b-instruct".to_string(),
            provider: "meta".to_string(),
            description: "Small open-weights model".to_string(),
            supports_vision: false,
        },
    ]
}

#[derive(Deserialize)]
struct ProjectPath {
    version: String,
    org_id: String,
    project_id: String,
}

#[derive(Deserialize)]
struct TaskPath {
    version: String,
    org_id: String,
    project_id: String,
    id: String,
}

pub fn app() -> Router {
    app_with_state(MockState::new("client-id", "client-secret"))
}

pub fn app_with_state(state: MockState) -> Router {
    let scope = "/api/{version}/org/{org_id}/project/{project_id}";
    Router::new()
        .route("/oauth2/token", post(issue_token))
        .route(&format!("{scope}/task"), post(create_task))
        .route(
            &format!("{scope}/task/{{id}}"),
            get(get_task).post(post_task).delete(delete_task),
        )
        .route(&format!("{scope}/model"), get(list_models))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn issue_token(
    State(state): State<MockState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiFailure> {
    let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if presented != Some(state.0.basic_credentials.as_str()) {
        return Err(failure(StatusCode::UNAUTHORIZED, "invalid client credentials"));
    }
    let token = Uuid::new_v4().to_string();
    state.0.tokens.write().await.insert(token.clone());
    state.0.token_grants.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": TOKEN_LIFETIME_SECS,
    })))
}

async fn authorize(state: &MockState, headers: &HeaderMap, version: &str) -> Result<(), ApiFailure> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let known = match bearer {
        Some(token) => state.0.tokens.read().await.contains(token),
        None => false,
    };
    if !known {
        return Err(failure(StatusCode::UNAUTHORIZED, "unauthorized"));
    }
    if version != API_VERSION {
        return Err(failure(StatusCode::NOT_FOUND, "unknown api version"));
    }
    Ok(())
}

async fn create_task(
    State(state): State<MockState>,
    Path(path): Path<ProjectPath>,
    headers: HeaderMap,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, ApiFailure> {
    authorize(&state, &headers, &path.version).await?;
    input.validate()?;
    tracing::debug!(org_id = %path.org_id, project_id = %path.project_id, "creating task");

    let mut task = Task {
        id: Uuid::new_v4().to_string(),
        name: String::new(),
        description: String::new(),
        enabled: false,
        public: false,
        exposed_to_agents: false,
        project_id: path.project_id,
        revisions: vec![input.revision(true)],
    };
    input.apply(&mut task);
    state.0.tasks.write().await.insert(task.id.clone(), task.clone());
    Ok(Json(task))
}

async fn get_task(
    State(state): State<MockState>,
    Path(path): Path<TaskPath>,
    headers: HeaderMap,
) -> Result<Json<Task>, ApiFailure> {
    authorize(&state, &headers, &path.version).await?;
    let tasks = state.0.tasks.read().await;
    tasks
        .get(&path.id)
        .filter(|t| t.project_id == path.project_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "task not found"))
}

/// Either activates revisions (body carries `active_revisions`) or submits a
/// new, inactive revision.
async fn post_task(
    State(state): State<MockState>,
    Path(path): Path<TaskPath>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Task>, ApiFailure> {
    authorize(&state, &headers, &path.version).await?;
    tracing::debug!(org_id = %path.org_id, task_id = %path.id, "posting to task");

    let mut tasks = state.0.tasks.write().await;
    let task = tasks
        .get_mut(&path.id)
        .filter(|t| t.project_id == path.project_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "task not found"))?;

    if let Some(active) = body.get("active_revisions") {
        let active: Vec<ActiveRevision> = serde_json::from_value(active.clone())
            .map_err(|e| invalid(&e.to_string()))?;
        if active.is_empty() {
            return Err(invalid("at least one active revision required"));
        }
        for entry in &active {
            if !task.revisions.iter().any(|r| r.id == entry.task_revision_id) {
                return Err(invalid(&format!("unknown revision {}", entry.task_revision_id)));
            }
        }
        for revision in &mut task.revisions {
            revision.active = active
                .iter()
                .any(|a| a.task_revision_id == revision.id && a.weight > 0);
        }
        return Ok(Json(task.clone()));
    }

    let input: TaskInput = serde_json::from_value(body).map_err(|e| invalid(&e.to_string()))?;
    input.validate()?;
    input.apply(task);
    task.revisions.insert(0, input.revision(false));
    Ok(Json(task.clone()))
}

async fn delete_task(
    State(state): State<MockState>,
    Path(path): Path<TaskPath>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiFailure> {
    authorize(&state, &headers, &path.version).await?;
    let mut tasks = state.0.tasks.write().await;
    let owned = tasks
        .get(&path.id)
        .is_some_and(|t| t.project_id == path.project_id);
    if !owned {
        return Err(failure(StatusCode::NOT_FOUND, "task not found"));
    }
    tasks.remove(&path.id);
    Ok(StatusCode::OK)
}

async fn list_models(
    State(state): State<MockState>,
    Path(path): Path<ProjectPath>,
    headers: HeaderMap,
) -> Result<Json<Vec<Model>>, ApiFailure> {
    authorize(&state, &headers, &path.version).await?;
    Ok(Json(state.0.models.clone()))
}
