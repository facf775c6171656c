//! # Core handler trait
//!
//! `Handler` is the extension point for code that reacts to messages. A
//! handler is registered on a channel of a [`Broker`](crate::Broker) and is
//! invoked by that channel's consumer task once per message.
//!
//! ## Contract
//! - Handlers of the same message run concurrently; they must not rely on
//!   each other's side effects.
//! - An `Err` or a panic is contained: it is logged, counted in the broker
//!   statistics and never reaches the publisher or sibling handlers.
//! - Returning `Some(value)` answers a request: if the message carries
//!   `reply_to`, the value is published there with the same correlation id.
//!
//! ## Example (skeleton)
//! ```rust
//! use scopebus::{Handler, HandlerError, Message};
//! use serde_json::Value;
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Handler for Audit {
//!     async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError> {
//!         let _ = &msg.payload; // write audit record...
//!         Ok(None)
//!     }
//!     fn name(&self) -> &str { "audit" }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::broker::Message;
use crate::error::HandlerError;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// Introspection record of a registered handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandlerDescriptor {
    pub function_name: String,
    pub module: String,
}

/// Contract for message handlers.
///
/// Called from a channel consumer task. Implementations should avoid
/// blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError>;

    /// Human-readable name (for logs and introspection).
    fn name(&self) -> &str {
        split_type_path(std::any::type_name::<Self>()).1
    }

    /// Module path the handler lives in.
    fn module(&self) -> &str {
        split_type_path(std::any::type_name::<Self>()).0
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            function_name: self.name().to_string(),
            module: self.module().to_string(),
        }
    }
}

/// Splits a Rust type path into `(module, name)`.
///
/// Generic arguments are dropped and closure frames are folded into the
/// enclosing function, so `app::users::on_created::{{closure}}` yields
/// `("app::users", "on_created")`.
pub(crate) fn split_type_path(full: &str) -> (&str, &str) {
    let mut path = full.find('<').map_or(full, |i| &full[..i]);
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path.rsplit_once("::").unwrap_or(("", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_frames_fold_into_function() {
        assert_eq!(
            split_type_path("app::users::on_created::{{closure}}"),
            ("app::users", "on_created")
        );
    }

    #[test]
    fn generics_are_dropped() {
        assert_eq!(
            split_type_path("scopebus::handlers::LogHandler<alloc::string::String>"),
            ("scopebus::handlers", "LogHandler")
        );
        assert_eq!(split_type_path("plain"), ("", "plain"));
    }

    struct Sample;

    #[async_trait]
    impl Handler for Sample {
        async fn handle(&self, _msg: &Message) -> Result<Option<Value>, HandlerError> {
            Ok(None)
        }
    }

    #[test]
    fn default_descriptor_uses_type_path() {
        let d = Sample.descriptor();
        assert_eq!(d.function_name, "Sample");
        assert!(d.module.ends_with("handler::tests"));
    }
}
