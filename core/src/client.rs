//! Authenticated client for the tasks API.
//!
//! # Design
//! Each operation is split into a `build_*` method that produces an
//! unauthenticated `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`, exactly as a host doing its own I/O would drive it. The
//! high-level methods (`fetch`, `create`, `update`, `delete`, `list_models`)
//! glue the two together: build, attach a bearer token from the shared
//! `TokenStore`, send through the injected `Transport`, parse.
//!
//! Nothing is retried. Every failure is returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{token_endpoint, ClientConfig};
use crate::error::{check_status, Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::requests::{ActivateRevisionsRequest, CreateTaskRequest, UpdateTaskRequest};
use crate::token::TokenStore;
use crate::types::{Model, Task};

const FETCH_CONTEXT: &str = "cannot fetch task";
const CREATE_CONTEXT: &str = "cannot create task";
const UPDATE_CONTEXT: &str = "cannot update task";
const ACTIVATE_CONTEXT: &str = "cannot make revision active";
const DELETE_CONTEXT: &str = "cannot delete task";
const MODELS_CONTEXT: &str = "cannot obtain model list";

/// Upper bound on one HTTP round-trip for clients built by `connect`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one org/project scope.
///
/// Cheap to clone; clones share the transport and the credential cache.
#[derive(Clone)]
pub struct TasksClient {
    config: ClientConfig,
    base_url: String,
    tokens: Arc<TokenStore>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TasksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasksClient")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl TasksClient {
    pub fn new(config: ClientConfig, tokens: Arc<TokenStore>, transport: Arc<dyn Transport>) -> Self {
        let base_url = config.base_url();
        Self {
            config,
            base_url,
            tokens,
            transport,
        }
    }

    /// Build a client talking to the real network, with the token endpoint
    /// served by `oauth_host`. Every call is aborted after `DEFAULT_TIMEOUT`.
    pub fn connect(config: ClientConfig, oauth_host: &str) -> Result<Self> {
        Self::connect_with_timeout(config, oauth_host, DEFAULT_TIMEOUT)
    }

    /// Like `connect`, but a call that has not completed within `timeout`
    /// fails with a transport error instead of blocking.
    pub fn connect_with_timeout(
        config: ClientConfig,
        oauth_host: &str,
        timeout: Duration,
    ) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(UreqTransport::with_timeout(timeout));
        let tokens = TokenStore::with_system_clock(&token_endpoint(oauth_host), transport.clone())?;
        Ok(Self::new(config, Arc::new(tokens), transport))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    pub fn fetch(&self, id: &str) -> Result<Task> {
        let req = self.build_fetch_task(id);
        tracing::info!(task_id = id, url = %req.url, "fetching task");
        self.parse_fetch_task(self.send_authorized(req)?)
    }

    pub fn create(&self, input: &CreateTaskRequest) -> Result<Task> {
        let req = self.build_create_task(input)?;
        tracing::info!(url = %req.url, "creating task");
        self.parse_create_task(self.send_authorized(req)?)
    }

    /// Submit a new revision, promote it to active, and return the task as
    /// the server reports it afterwards.
    ///
    /// If the promotion fails the new revision exists but is not active;
    /// that state is reported as `Error::Consistency`.
    pub fn update(&self, input: &UpdateTaskRequest) -> Result<Task> {
        let req = self.build_update_task(input)?;
        tracing::info!(task_id = %input.id, url = %req.url, "updating task");
        let updated = self.parse_update_task(self.send_authorized(req)?)?;

        let revision_id = updated.latest_revision()?.id.clone();
        self.activate_revision(&input.id, &revision_id)
            .map_err(|source| {
                tracing::error!(
                    task_id = %input.id,
                    revision_id = %revision_id,
                    error = %source,
                    "revision created but not activated"
                );
                Error::Consistency {
                    task_id: input.id.clone(),
                    revision_id: revision_id.clone(),
                    source: Box::new(source),
                }
            })?;

        self.fetch(&input.id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let req = self.build_delete_task(id);
        tracing::info!(task_id = id, url = %req.url, "deleting task");
        self.parse_delete_task(self.send_authorized(req)?)
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        let req = self.build_list_models();
        tracing::info!(url = %req.url, "listing models");
        self.parse_list_models(self.send_authorized(req)?)
    }

    /// First catalog entry whose name matches `name` exactly.
    pub fn find_model(&self, name: &str) -> Result<Model> {
        self.list_models()?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    fn activate_revision(&self, task_id: &str, revision_id: &str) -> Result<()> {
        let req = self.build_activate_revision(task_id, revision_id)?;
        tracing::info!(task_id, revision_id, url = %req.url, "activating revision");
        self.parse_activate_revision(self.send_authorized(req)?)
    }

    /// Attach a bearer token and send.
    pub fn send_authorized(&self, mut req: HttpRequest) -> Result<HttpResponse> {
        let token = self
            .tokens
            .fetch(&self.config.client_id, &self.config.client_secret)?;
        req.set_header("authorization", format!("Bearer {token}"));
        Ok(self.transport.send(&req)?)
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_fetch_task(&self, id: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, self.task_url(id))
    }

    pub fn build_create_task(&self, input: &CreateTaskRequest) -> Result<HttpRequest> {
        let url = format!("{}/task", self.base_url);
        Ok(HttpRequest::new(HttpMethod::Post, url).with_json_body(encode(input)?))
    }

    pub fn build_update_task(&self, input: &UpdateTaskRequest) -> Result<HttpRequest> {
        Ok(HttpRequest::new(HttpMethod::Post, self.task_url(&input.id)).with_json_body(encode(input)?))
    }

    pub fn build_activate_revision(&self, task_id: &str, revision_id: &str) -> Result<HttpRequest> {
        let body = encode(&ActivateRevisionsRequest::single(revision_id))?;
        Ok(HttpRequest::new(HttpMethod::Post, self.task_url(task_id)).with_json_body(body))
    }

    pub fn build_delete_task(&self, id: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Delete, self.task_url(id))
    }

    pub fn build_list_models(&self) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, format!("{}/model", self.base_url))
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    pub fn parse_fetch_task(&self, response: HttpResponse) -> Result<Task> {
        check_status(FETCH_CONTEXT, 200, &response)?;
        decode(&response)
    }

    pub fn parse_create_task(&self, response: HttpResponse) -> Result<Task> {
        check_status(CREATE_CONTEXT, 200, &response)?;
        decode(&response)
    }

    pub fn parse_update_task(&self, response: HttpResponse) -> Result<Task> {
        check_status(UPDATE_CONTEXT, 200, &response)?;
        decode(&response)
    }

    /// The activation response body is ignored; callers re-fetch instead.
    pub fn parse_activate_revision(&self, response: HttpResponse) -> Result<()> {
        check_status(ACTIVATE_CONTEXT, 200, &response)
    }

    pub fn parse_delete_task(&self, response: HttpResponse) -> Result<()> {
        check_status(DELETE_CONTEXT, 200, &response)
    }

    pub fn parse_list_models(&self, response: HttpResponse) -> Result<Vec<Model>> {
        check_status(MODELS_CONTEXT, 200, &response)?;
        decode(&response)
    }

    fn task_url(&self, id: &str) -> String {
        format!("{}/task/{id}", self.base_url)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| Error::Decode(e.to_string()))
}
