//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Message) -> Fut`, producing a fresh
//! future per message. The closure receives its own copy of the message, so
//! the future owns everything it touches; shared state goes through an
//! explicit `Arc<...>` captured by the closure.
//!
//! The descriptor is derived from the closure's type path (the function it
//! is defined in) unless a name is given with [`HandlerFn::named`].
//!
//! ## Example
//! ```rust
//! use scopebus::{Handler, HandlerFn, HandlerRef, HandlerError, Message};
//!
//! let h: HandlerRef = HandlerFn::arc(|msg: Message| async move {
//!     let _ = msg.payload;
//!     Ok::<Option<serde_json::Value>, HandlerError>(None)
//! });
//!
//! let named = HandlerFn::named("audit", |_msg: Message| async {
//!     Ok::<Option<serde_json::Value>, HandlerError>(None)
//! })
//! .with_module("billing")
//! .shared();
//!
//! assert_eq!(named.name(), "audit");
//! assert_eq!(named.module(), "billing");
//! # let _ = h;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::handler::{Handler, split_type_path};
use crate::broker::Message;
use crate::error::HandlerError;

/// Function-backed handler implementation.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    module: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a handler named after the function the closure is defined in.
    pub fn new(f: F) -> Self {
        let (module, name) = split_type_path(std::any::type_name::<F>());
        Self {
            name: Cow::Owned(name.to_string()),
            module: Cow::Owned(module.to_string()),
            f,
        }
    }

    /// Creates a handler with an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        let mut handler = Self::new(f);
        handler.name = name.into();
        handler
    }

    /// Overrides the module reported by the descriptor.
    pub fn with_module(mut self, module: impl Into<Cow<'static, str>>) -> Self {
        self.module = module.into();
        self
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }

    /// Moves an already configured handler behind an `Arc`.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
{
    async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError> {
        (self.f)(msg.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn module(&self) -> &str {
        &self.module
    }
}
