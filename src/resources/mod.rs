//! Resource addressing.

mod id;

pub use id::{
    PLANES_SEGMENT, PROVIDERS_SEGMENT, ResourceId, SEGMENT_SEPARATOR, ScopeSegment, TypeSegment,
};
