//! Queries over the resource hierarchy.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resources::ResourceId;

/// Equality predicate against a dot-separated path into an object's data,
/// e.g. `properties.application`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub value: String,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when the value at `field` in `data` is a string equal to `value`.
    pub fn matches(&self, data: &serde_json::Value) -> bool {
        let mut current = data;
        for key in self.field.split('.') {
            match current.get(key) {
                Some(next) => current = next,
                None => return false,
            }
        }
        matches!(current, serde_json::Value::String(s) if *s == self.value)
    }
}

/// A query over resources (or scopes) below a root scope.
///
/// Without `scope_recursive` only entries whose scope path equals
/// `root_scope` match; nested resources under that scope still match
/// since nesting lives in the routing path, not the scope path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub root_scope: ResourceId,
    #[serde(default)]
    pub scope_recursive: bool,
    #[serde(default)]
    pub routing_scope_prefix: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub is_scope_query: bool,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
}

impl Query {
    /// Query resources within `root_scope`.
    pub fn resources(root_scope: ResourceId) -> Self {
        Self {
            root_scope,
            scope_recursive: false,
            routing_scope_prefix: None,
            resource_type: None,
            is_scope_query: false,
            filters: Vec::new(),
        }
    }

    /// Query scopes nested under `root_scope`.
    pub fn scopes(root_scope: ResourceId) -> Self {
        Self {
            is_scope_query: true,
            ..Self::resources(root_scope)
        }
    }

    pub fn recursive(mut self) -> Self {
        self.scope_recursive = true;
        self
    }

    pub fn routing_scope_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.routing_scope_prefix = Some(prefix.into());
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(QueryFilter::new(field, value));
        self
    }

    /// Reject shapes that can never match anything meaningful.
    pub fn validate(&self) -> Result<()> {
        if !self.root_scope.type_segments().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "query root scope '{}' must not contain resource types",
                self.root_scope
            )));
        }
        if self.is_scope_query && self.routing_scope_prefix.is_some() {
            return Err(Error::InvalidArgument(
                "a scope query cannot specify a routing scope prefix".to_string(),
            ));
        }
        if self.filters.iter().any(|f| f.field.is_empty()) {
            return Err(Error::InvalidArgument(
                "query filter field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
