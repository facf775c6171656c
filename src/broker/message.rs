//! The unit that travels through a channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message queued on a channel.
///
/// `payload` is handed to every handler of the channel. `correlation_id` and
/// `reply_to` are set on request/reply traffic: a handler that returns
/// `Some(value)` for a message with `reply_to` has its value published to
/// that channel under the same correlation id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Body handed to handlers.
    pub payload: Value,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,
    /// Request/reply pairing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Channel a reply should be published to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Message {
    /// Creates a message with no headers and no RPC fields.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Adds a header.
    #[inline]
    pub fn with_header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Sets the correlation id.
    #[inline]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the reply channel.
    #[inline]
    pub fn with_reply_to(mut self, channel: impl Into<String>) -> Self {
        self.reply_to = Some(channel.into());
        self
    }

    /// `(reply_to, correlation_id)` when the sender is waiting for an answer.
    pub fn reply_route(&self) -> Option<(&str, &str)> {
        Some((self.reply_to.as_deref()?, self.correlation_id.as_deref()?))
    }
}

impl From<Value> for Message {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}
