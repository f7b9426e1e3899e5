//! Request payloads for creating, updating and activating tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::output_format::OutputFormatValue;
use crate::types::InputProcessor;

/// The creatable fields of a task. Each create or update sends the full set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProperties {
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
    pub output_format: BTreeMap<String, OutputFormatValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_processors: Option<Vec<InputProcessor>>,
}

/// Payload for `POST /task`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(flatten)]
    pub properties: TaskProperties,
}

impl CreateTaskRequest {
    pub fn new(properties: TaskProperties) -> Self {
        Self { properties }
    }
}

/// Payload for `POST /task/{id}`. The server answers with a new, inactive
/// revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub id: String,
    #[serde(flatten)]
    pub properties: TaskProperties,
}

impl UpdateTaskRequest {
    pub fn new(id: impl Into<String>, properties: TaskProperties) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }
}

/// Payload promoting revisions to active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateRevisionsRequest {
    pub active_revisions: Vec<ActiveRevision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRevision {
    pub weight: u32,
    pub task_revision_id: String,
}

impl ActivateRevisionsRequest {
    /// Route all traffic to a single revision.
    pub fn single(revision_id: impl Into<String>) -> Self {
        Self {
            active_revisions: vec![ActiveRevision {
                weight: 1,
                task_revision_id: revision_id.into(),
            }],
        }
    }
}
