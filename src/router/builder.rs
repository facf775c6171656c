use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::event_bus::EventBus;
use crate::broker::Broker;
use crate::envelope::EventData;
use crate::error::{BusError, HandlerError};
use crate::handlers::{EnvelopeHandler, HandlerRef, TypedEvent};

/// Collects handler registrations before the [`EventBus`] is built.
///
/// Registrations are applied in the order they were added.
pub struct EventBusBuilder {
    process: Arc<dyn Broker>,
    app: Arc<dyn Broker>,
    registrations: Vec<(String, HandlerRef)>,
}

impl EventBusBuilder {
    /// Creates a new builder over the two brokers.
    pub fn new(process: Arc<dyn Broker>, app: Arc<dyn Broker>) -> Self {
        Self {
            process,
            app,
            registrations: Vec::new(),
        }
    }

    /// Queues `handler` for `event_type`.
    pub fn with_handler(mut self, event_type: impl Into<String>, handler: HandlerRef) -> Self {
        self.registrations.push((event_type.into(), handler));
        self
    }

    /// Queues a typed handler for `D::TYPE`.
    pub fn with_event<D, F, Fut>(self, f: F) -> Self
    where
        D: EventData,
        F: Fn(TypedEvent<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
    {
        self.with_handler(D::TYPE, EnvelopeHandler::<D, F>::arc(f))
    }

    /// Builds the router and applies every queued registration.
    ///
    /// Fails on the first registration the router rejects (e.g. an empty
    /// event type).
    pub fn build(self) -> Result<EventBus, BusError> {
        let bus = EventBus::new(self.process, self.app);
        for (event_type, handler) in self.registrations {
            bus.subscribe(&event_type, handler)?;
        }
        Ok(bus)
    }
}
