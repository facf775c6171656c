//! # LogHandler: simple message logger
//!
//! A minimal handler that logs every delivered message through `tracing`.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! INFO scopebus::handlers::log: message delivered handler="log" event_type="user.created" source="users" correlation_id=None
//! ```

use async_trait::async_trait;
use serde_json::Value;

use super::Handler;
use crate::broker::Message;
use crate::error::HandlerError;

/// Message logging handler.
#[derive(Default)]
pub struct LogHandler;

impl LogHandler {
    /// Construct a new [`LogHandler`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for LogHandler {
    async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError> {
        let field = |key: &str| msg.payload.get(key).and_then(Value::as_str);
        tracing::info!(
            handler = "log",
            event_type = field("type"),
            source = field("source"),
            correlation_id = ?msg.correlation_id,
            "message delivered"
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "log"
    }
}
