//! Storage keys derived from resource identifiers.
//!
//! Every stored id is flattened into a `(kind, root scope, routing scope,
//! resource type)` tuple of normalized strings. Backends index on these
//! columns so that scope and prefix queries become string comparisons.

use std::fmt;

use crate::error::{Error, Result};
use crate::model::Query;
use crate::resources::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    Resource,
    Scope,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Resource => "resource",
            StorageKind::Scope => "scope",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageParts {
    pub kind: StorageKind,
    pub root_scope: String,
    pub routing_scope: String,
    pub resource_type: String,
}

impl StorageParts {
    /// Decompose a stored id. Empty ids and collections cannot be stored.
    ///
    /// A resource keeps its whole scope path as root. A scope is keyed by
    /// its parent's scope path with its own `type/name` as routing scope,
    /// so listing the scopes below `/planes/radius/local` is a root-scope
    /// match just like listing resources.
    pub fn from_id(id: &ResourceId) -> Result<Self> {
        validate_storable(id)?;

        if id.is_scope() {
            let scopes = id.scope_segments();
            let (last, parents) = match scopes.split_last() {
                Some(split) => split,
                None => return Err(Error::InvalidArgument("id must not be empty".into())),
            };
            let parent = ResourceId::from_parts(id.is_ucp_qualified(), parents.to_vec(), Vec::new());
            return Ok(Self {
                kind: StorageKind::Scope,
                root_scope: normalize_part(&parent.root_scope()),
                routing_scope: normalize_part(&format!("{}/{}", last.scope_type, last.name)),
                resource_type: normalize_type(&last.scope_type),
            });
        }

        Ok(Self {
            kind: StorageKind::Resource,
            root_scope: normalize_part(&id.root_scope()),
            routing_scope: normalize_part(&id.routing_scope()),
            resource_type: normalize_type(&id.resource_type()),
        })
    }

    /// Sortable key. Entries sharing a root scope are contiguous, and a
    /// recursive scope is a prefix of all of its descendants.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.kind, self.root_scope, self.routing_scope)
    }
}

/// Reject ids that name nothing storable.
pub fn validate_storable(id: &ResourceId) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidArgument("id must not be empty".into()));
    }
    if id.is_scope_collection() || id.is_resource_collection() {
        return Err(Error::InvalidArgument(format!(
            "'{id}' must refer to a named resource, not a collection"
        )));
    }
    Ok(())
}

/// Lowercase and wrap in `/`. The empty string stays empty.
pub fn normalize_part(part: &str) -> String {
    if part.is_empty() {
        return String::new();
    }
    let mut out = part.to_lowercase();
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Lowercase and strip surrounding `/`.
pub fn normalize_type(resource_type: &str) -> String {
    resource_type.trim_matches('/').to_lowercase()
}

/// Key prefix that every match of `query` starts with. Backends scan from
/// this prefix and confirm each entry with [`parts_match_query`].
pub fn query_key_prefix(query: &Query) -> String {
    let kind = if query.is_scope_query {
        StorageKind::Scope
    } else {
        StorageKind::Resource
    };
    let root = normalize_part(&query.root_scope.root_scope());
    if query.scope_recursive {
        return format!("{kind}|{root}");
    }
    match &query.routing_scope_prefix {
        Some(prefix) => format!("{kind}|{root}|{}", normalize_part(prefix)),
        None => format!("{kind}|{root}|"),
    }
}

/// Whether stored parts satisfy the structural part of `query` (everything
/// except data filters).
pub fn parts_match_query(parts: &StorageParts, query: &Query) -> bool {
    let want_kind = if query.is_scope_query {
        StorageKind::Scope
    } else {
        StorageKind::Resource
    };
    if parts.kind != want_kind {
        return false;
    }

    let root = normalize_part(&query.root_scope.root_scope());
    if query.scope_recursive {
        if !parts.root_scope.starts_with(&root) {
            return false;
        }
    } else if parts.root_scope != root {
        return false;
    }

    if let Some(prefix) = &query.routing_scope_prefix {
        if !parts.routing_scope.starts_with(&normalize_part(prefix)) {
            return false;
        }
    }

    if let Some(resource_type) = &query.resource_type {
        if parts.resource_type != normalize_type(resource_type) {
            return false;
        }
    }

    true
}

/// Whether `id` satisfies the structural part of `query`.
pub fn id_matches_query(id: &ResourceId, query: &Query) -> Result<bool> {
    let parts = StorageParts::from_id(id)?;
    Ok(parts_match_query(&parts, query))
}
