//! Domain entities decoded from the tasks API.
//!
//! # Design
//! Entities are created by decoding a server response and dropped after each
//! operation; the remote API is the system of record. Missing fields and
//! explicit `null`s decode to zero values so partial payloads stay readable.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::output_format::OutputFormatValue;

/// A named, versioned prompt configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub public: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub exposed_to_agents: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Newest first, as listed by the server.
    #[serde(deserialize_with = "null_as_default")]
    pub revisions: Vec<Revision>,
}

impl Task {
    /// The revision currently in effect.
    pub fn active_revision(&self) -> Result<&Revision> {
        self.revisions
            .iter()
            .find(|r| r.active)
            .ok_or_else(|| Error::RevisionNotFound {
                task_id: self.id.clone(),
                which: "active",
            })
    }

    /// The most recently created revision, active or not.
    pub fn latest_revision(&self) -> Result<&Revision> {
        self.revisions.first().ok_or_else(|| Error::RevisionNotFound {
            task_id: self.id.clone(),
            which: "latest",
        })
    }
}

/// One immutable version of a task's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Revision {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub system_prompt: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_prompt: String,
    #[serde(deserialize_with = "null_as_default")]
    pub llm_model_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image_required: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub optimise_images: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub output_modality: String,
    #[serde(deserialize_with = "null_as_default")]
    pub output_format: BTreeMap<String, OutputFormatValue>,
    #[serde(deserialize_with = "null_as_default")]
    pub input_params: Vec<String>,
    pub input_processors: Option<Vec<InputProcessor>>,
    pub rag: Option<Rag>,
    pub task_forwarder_id: Option<String>,
}

impl Revision {
    pub fn has_input_processors(&self) -> bool {
        self.input_processors
            .as_ref()
            .is_some_and(|processors| !processors.is_empty())
    }

    pub fn rag_collection_id(&self) -> Option<&str> {
        self.rag.as_ref().and_then(|r| r.collection_id.as_deref())
    }

    pub fn rag_param(&self) -> Option<&str> {
        self.rag.as_ref().and_then(|r| r.rag_param.as_deref())
    }
}

/// A preprocessing step applied to one input parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputProcessor {
    #[serde(deserialize_with = "null_as_default")]
    pub param_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub input_processor: String,
    #[serde(deserialize_with = "null_as_default")]
    pub config: BTreeMap<String, String>,
}

/// Retrieval-augmentation settings of a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rag {
    pub collection_id: Option<String>,
    pub rag_param: Option<String>,
}

/// A read-only LLM catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub alias: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub supports_vision: bool,
}

/// Read an explicit `null` as the zero value, the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
