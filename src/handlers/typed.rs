//! # Typed handlers
//!
//! [`EnvelopeHandler`] adapts a function over [`TypedEvent<D>`] to the
//! untyped [`Handler`] contract. Before the body runs, the message payload is
//! converted:
//!
//! ```text
//!   payload ─► unwrap argument ─► Envelope::from_value ─► D from envelope data ─► body
//!                 │                       │                       │
//!                 └───────────────────────┴───────────────────────┴─► HandlerError::Conversion
//! ```
//!
//! Two payload shapes are accepted:
//! - positional: the payload *is* the envelope object (what the in-memory
//!   broker delivers);
//! - named: `{ "<argument>": { envelope } }`, a single-key wrapper used by
//!   transports that pass handler arguments by name.
//!
//! A conversion failure is returned as an error, so the consumer counts and
//! logs it like any other handler failure; the body never sees bad input.

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::handler::{Handler, split_type_path};
use crate::broker::Message;
use crate::envelope::{Envelope, EventData};
use crate::error::HandlerError;

/// A decoded event: the validated envelope plus its typed payload.
#[derive(Clone, Debug)]
pub struct TypedEvent<D> {
    pub envelope: Envelope,
    pub data: D,
}

/// Handler that decodes the payload into [`TypedEvent<D>`] before calling `f`.
pub struct EnvelopeHandler<D, F> {
    name: Cow<'static, str>,
    module: Cow<'static, str>,
    f: F,
    _data: PhantomData<fn() -> D>,
}

impl<D, F> EnvelopeHandler<D, F> {
    /// Creates a typed handler named after the function `f` is defined in.
    pub fn new(f: F) -> Self {
        let (module, name) = split_type_path(std::any::type_name::<F>());
        Self {
            name: Cow::Owned(name.to_string()),
            module: Cow::Owned(module.to_string()),
            f,
            _data: PhantomData,
        }
    }

    /// Creates a typed handler with an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        let mut handler = Self::new(f);
        handler.name = name.into();
        handler
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<D, F, Fut> Handler for EnvelopeHandler<D, F>
where
    D: EventData,
    F: Fn(TypedEvent<D>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
{
    async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError> {
        let event = decode_event::<D>(&msg.payload)?;
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn module(&self) -> &str {
        &self.module
    }
}

/// Converts a delivered payload into a typed event.
pub fn decode_event<D: EventData>(payload: &Value) -> Result<TypedEvent<D>, HandlerError> {
    let raw = unwrap_argument(payload).ok_or_else(|| HandlerError::Conversion {
        target: "Envelope",
        reason: "payload is neither an envelope nor a single named argument".into(),
    })?;

    let envelope = Envelope::from_value(raw.clone()).map_err(|e| HandlerError::Conversion {
        target: "Envelope",
        reason: e.to_string(),
    })?;

    if envelope.event_type() != D::TYPE {
        return Err(HandlerError::Conversion {
            target: std::any::type_name::<D>(),
            reason: format!(
                "event type '{}' does not match '{}'",
                envelope.event_type(),
                D::TYPE
            ),
        });
    }

    let data = envelope
        .payload()
        .map_or(Value::Null, |m| Value::Object(m.clone()));
    let data = serde_json::from_value::<D>(data).map_err(|e| HandlerError::Conversion {
        target: std::any::type_name::<D>(),
        reason: e.to_string(),
    })?;

    Ok(TypedEvent { envelope, data })
}

/// Picks the envelope object out of a positional or named payload.
fn unwrap_argument(payload: &Value) -> Option<&Value> {
    let obj = payload.as_object()?;
    if obj.contains_key("type") || obj.contains_key("source") {
        return Some(payload);
    }
    match obj.len() {
        1 => obj.values().next().filter(|v| v.is_object()),
        _ => None,
    }
}
