//! Core data model.
//!
//! An [`Object`] is the stored unit of the resource store: a resource or
//! scope identifier, some opaque descriptive metadata, and the JSON state.
//! A [`Query`] describes a read over the identifier hierarchy. Queue
//! messages are modelled separately in [`message`].

pub mod message;
pub mod object;
pub mod query;

pub use message::{CONTENT_TYPE_JSON, Message, NewMessage};
pub use object::{Metadata, Object};
pub use query::{Query, QueryFilter};
