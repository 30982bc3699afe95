//! Hierarchical resource identifiers.
//!
//! An identifier is a scope path (`/planes/radius/local/resourceGroups/rg`)
//! optionally followed by `providers` and a routing path of
//! `(type, name)` pairs (`Applications.Core/applications/app/nested/n`).
//! Identifiers that start with `/planes` are UCP-qualified; anything else
//! (e.g. `/subscriptions/...`) is a relative identifier.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

pub const SEGMENT_SEPARATOR: &str = "/";
pub const PLANES_SEGMENT: &str = "planes";
pub const PROVIDERS_SEGMENT: &str = "providers";

/// One `(type, name)` pair of the scope path. An empty name marks a
/// scope collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeSegment {
    pub scope_type: String,
    pub name: String,
}

impl ScopeSegment {
    pub fn new(scope_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope_type: scope_type.into(),
            name: name.into(),
        }
    }
}

/// One `(type, name)` pair of the routing path. The first segment's type
/// includes the provider namespace (`Applications.Core/applications`).
/// An empty name marks a resource collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSegment {
    pub resource_type: String,
    pub name: String,
}

impl TypeSegment {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

/// A parsed resource or scope identifier.
///
/// Display preserves the original casing. Equality and hashing use the
/// case-folded form, so `/planes/Radius/Local` equals `/planes/radius/local`.
#[derive(Debug, Clone)]
pub struct ResourceId {
    id: String,
    folded: String,
    ucp_qualified: bool,
    scopes: Vec<ScopeSegment>,
    types: Vec<TypeSegment>,
}

impl ResourceId {
    /// Parse an identifier. Fails with [`Error::MalformedIdentifier`].
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = || Error::MalformedIdentifier(input.to_string());

        if !input.starts_with(SEGMENT_SEPARATOR) || input.starts_with("//") {
            return Err(malformed());
        }

        let rest = &input[1..];
        let rest = rest.strip_suffix(SEGMENT_SEPARATOR).unwrap_or(rest);

        let (ucp_qualified, rest) = if rest.eq_ignore_ascii_case(PLANES_SEGMENT) {
            (true, "")
        } else if rest.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("planes/")) {
            (true, &rest[7..])
        } else {
            (false, rest)
        };

        if rest.is_empty() {
            return Ok(Self::from_parts(ucp_qualified, Vec::new(), Vec::new()));
        }

        let segments: Vec<&str> = rest.split(SEGMENT_SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed());
        }

        let is_providers = |s: &str| s.eq_ignore_ascii_case(PROVIDERS_SEGMENT);

        // Scope path: pairs until `providers` or the end.
        let mut scopes = Vec::new();
        let mut i = 0;
        while i < segments.len() {
            if is_providers(segments[i]) {
                if i + 1 == segments.len() {
                    return Err(malformed());
                }
                i += 1;
                break;
            }

            if segments.len() - i < 2 {
                scopes.push(ScopeSegment::new(segments[i], ""));
                i += 1;
                break;
            }

            if is_providers(segments[i + 1]) {
                return Err(malformed());
            }

            scopes.push(ScopeSegment::new(segments[i], segments[i + 1]));
            i += 2;
        }

        if i == segments.len() {
            return Ok(Self::from_parts(ucp_qualified, scopes, Vec::new()));
        }

        // Routing path: `namespace/type[/name]` then `type[/name]` pairs.
        if segments.len() - i < 2 {
            return Err(malformed());
        }

        let mut first = TypeSegment::new(format!("{}/{}", segments[i], segments[i + 1]), "");
        i += 2;
        if i < segments.len() {
            first.name = segments[i].to_string();
            i += 1;
        }
        let mut types = vec![first];

        while i < segments.len() {
            // A second `providers` would start an extension resource.
            if is_providers(segments[i]) {
                return Err(malformed());
            }

            let mut segment = TypeSegment::new(segments[i], "");
            i += 1;
            if i < segments.len() {
                segment.name = segments[i].to_string();
                i += 1;
            }
            types.push(segment);
        }

        Ok(Self::from_parts(ucp_qualified, scopes, types))
    }

    /// Parse an identifier that must refer to a scope.
    pub fn parse_scope(input: &str) -> Result<Self> {
        let id = Self::parse(input)?;
        if !id.is_scope() {
            return Err(Error::InvalidArgument(format!(
                "'{input}' is a valid resource id but does not refer to a scope"
            )));
        }
        Ok(id)
    }

    /// Parse an identifier that must refer to a named resource.
    pub fn parse_resource(input: &str) -> Result<Self> {
        let id = Self::parse(input)?;
        if !id.is_resource() {
            return Err(Error::InvalidArgument(format!(
                "'{input}' is a valid resource id but does not refer to a resource"
            )));
        }
        Ok(id)
    }

    /// Build an identifier from its segments.
    pub fn from_parts(
        ucp_qualified: bool,
        scopes: Vec<ScopeSegment>,
        types: Vec<TypeSegment>,
    ) -> Self {
        let id = make_id(ucp_qualified, &scopes, &types);
        let folded = id.to_lowercase();
        Self {
            id,
            folded,
            ucp_qualified,
            scopes,
            types,
        }
    }

    /// No scope and no type segments (`/` or `/planes`).
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.types.is_empty()
    }

    pub fn is_ucp_qualified(&self) -> bool {
        self.ucp_qualified
    }

    /// A named scope such as a plane or resource group.
    pub fn is_scope(&self) -> bool {
        self.types.is_empty() && self.scopes.last().is_some_and(|s| !s.name.is_empty())
    }

    /// A named resource.
    pub fn is_resource(&self) -> bool {
        self.types.last().is_some_and(|t| !t.name.is_empty())
    }

    /// A scope path ending in an unnamed scope type (`.../resourceGroups`).
    pub fn is_scope_collection(&self) -> bool {
        self.types.is_empty() && self.scopes.last().is_some_and(|s| s.name.is_empty())
    }

    /// A routing path ending in an unnamed type (`.../applications`).
    pub fn is_resource_collection(&self) -> bool {
        self.types.last().is_some_and(|t| t.name.is_empty())
    }

    pub fn scope_segments(&self) -> &[ScopeSegment] {
        &self.scopes
    }

    pub fn type_segments(&self) -> &[TypeSegment] {
        &self.types
    }

    /// The scope path with original casing, e.g. `/planes/radius/local/resourceGroups/rg`.
    pub fn root_scope(&self) -> String {
        make_id(self.ucp_qualified, &self.scopes, &[])
    }

    /// The routing path without leading separator, e.g.
    /// `Applications.Core/applications/app/nested/n`. Empty for scopes.
    pub fn routing_scope(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for t in &self.types {
            parts.push(&t.resource_type);
            if !t.name.is_empty() {
                parts.push(&t.name);
            }
        }
        parts.join(SEGMENT_SEPARATOR)
    }

    /// The fully-qualified resource type (`Applications.Core/applications/nested`).
    /// For a scope this is the type of its last scope segment.
    pub fn resource_type(&self) -> String {
        if self.types.is_empty() {
            return self
                .scopes
                .last()
                .map(|s| s.scope_type.clone())
                .unwrap_or_default();
        }
        self.types
            .iter()
            .map(|t| t.resource_type.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }

    /// Name of the last segment (type segment if any, otherwise scope).
    pub fn name(&self) -> &str {
        if let Some(t) = self.types.last() {
            return &t.name;
        }
        self.scopes.last().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Name of the first scope whose type matches `scope_type` (case-insensitive).
    pub fn find_scope(&self, scope_type: &str) -> Option<&str> {
        self.scopes
            .iter()
            .find(|s| s.scope_type.eq_ignore_ascii_case(scope_type))
            .map(|s| s.name.as_str())
    }

    /// `type/name` of the plane for UCP-qualified ids (`radius/local`).
    pub fn plane_namespace(&self) -> Option<String> {
        if !self.ucp_qualified {
            return None;
        }
        self.scopes
            .first()
            .map(|s| format!("{}/{}", s.scope_type, s.name))
    }

    /// Drop the last segment, yielding the enclosing resource or scope.
    /// A top-level resource truncates to its scope; `/` and `/planes`
    /// have nothing to drop.
    pub fn truncate(&self) -> Option<ResourceId> {
        if !self.types.is_empty() {
            let types = self.types[..self.types.len() - 1].to_vec();
            return Some(Self::from_parts(
                self.ucp_qualified,
                self.scopes.clone(),
                types,
            ));
        }
        if !self.scopes.is_empty() {
            let scopes = self.scopes[..self.scopes.len() - 1].to_vec();
            return Some(Self::from_parts(self.ucp_qualified, scopes, Vec::new()));
        }
        None
    }

    /// Nest a child type segment under this identifier.
    pub fn append(&self, segment: TypeSegment) -> ResourceId {
        let mut types = self.types.clone();
        types.push(segment);
        Self::from_parts(self.ucp_qualified, self.scopes.clone(), types)
    }

    /// Case-folded string form used for comparisons and storage keys.
    pub fn normalized(&self) -> &str {
        &self.folded
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

fn make_id(ucp_qualified: bool, scopes: &[ScopeSegment], types: &[TypeSegment]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for s in scopes {
        parts.push(&s.scope_type);
        if !s.name.is_empty() {
            parts.push(&s.name);
        }
    }

    if !types.is_empty() {
        parts.push(PROVIDERS_SEGMENT);
        for t in types {
            parts.push(&t.resource_type);
            if !t.name.is_empty() {
                parts.push(&t.name);
            }
        }
    }

    let joined = parts.join(SEGMENT_SEPARATOR);
    if ucp_qualified && joined.is_empty() {
        format!("/{PLANES_SEGMENT}")
    } else if ucp_qualified {
        format!("/{PLANES_SEGMENT}/{joined}")
    } else {
        format!("/{joined}")
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
