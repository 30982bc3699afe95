//! Queue messages.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The only payload encoding the queue accepts.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A message to enqueue. The queue assigns identity and lease state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl NewMessage {
    /// Wrap raw bytes that are already JSON-encoded.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON.to_string(),
            data: data.into(),
        }
    }

    /// Serialize `value` as the JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::from_bytes(serde_json::to_vec(value)?))
    }

    /// Fails `EmptyMessage` for an empty payload and
    /// `UnsupportedContentType` for anything but JSON.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::EmptyMessage);
        }
        if !self.content_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            return Err(Error::UnsupportedContentType(self.content_type.clone()));
        }
        Ok(())
    }
}

/// A message handed out by `dequeue`.
///
/// The pair `(id, dequeue_count)` names the lease this handle was issued
/// under. Once the message is leased again the count moves on and this
/// handle can no longer extend or finish it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub dequeue_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub next_visible_at: DateTime<Utc>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Message {
    /// Decode the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    /// Guard for finish/extend: a handle without an id was never issued
    /// by a queue.
    pub(crate) fn ensure_issued(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_rejected() {
        let msg = NewMessage::from_bytes(Vec::new());
        assert!(matches!(msg.validate(), Err(Error::EmptyMessage)));
    }

    #[test]
    fn only_json_is_accepted() {
        let mut msg = NewMessage::from_bytes(b"hello".to_vec());
        msg.content_type = "text/plain".into();
        assert!(matches!(
            msg.validate(),
            Err(Error::UnsupportedContentType(ct)) if ct == "text/plain"
        ));
    }

    #[test]
    fn json_helper_round_trips() {
        let msg = NewMessage::json(&serde_json::json!({ "id": "0" })).unwrap();
        assert_eq!(msg.content_type, CONTENT_TYPE_JSON);
        assert!(msg.validate().is_ok());
    }
}
