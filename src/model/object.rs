//! Stored objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resources::ResourceId;

/// Descriptive fields of a stored object. Only `id` and `etag` mean
/// anything to the store; the rest is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: ResourceId,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,

    /// Concurrency token. Assigned by the store on every successful save;
    /// any value set by the caller is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A resource or scope with its JSON state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub metadata: Metadata,
    pub data: serde_json::Value,
}

impl Object {
    pub fn new(id: ResourceId, data: serde_json::Value) -> Self {
        Self {
            metadata: Metadata {
                id,
                api_version: String::new(),
                content_type: String::new(),
                etag: None,
            },
            data,
        }
    }

    /// Build an object from any serializable value.
    pub fn from_typed<T: Serialize>(id: ResourceId, value: &T) -> Result<Self> {
        Ok(Self::new(id, serde_json::to_value(value)?))
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.metadata.api_version = api_version.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.metadata.content_type = content_type.into();
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.metadata.id
    }

    pub fn etag(&self) -> Option<&str> {
        self.metadata.etag.as_deref()
    }

    /// Decode `data` into a typed value.
    pub fn as_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
