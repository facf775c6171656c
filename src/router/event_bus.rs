//! # EventBus: scope-routed front over two brokers.
//!
//! The [`EventBus`] owns two brokers, a **process** broker for events that
//! must stay inside this process and an **app** broker for events every
//! instance of the application should see. Handlers are registered on both;
//! each published envelope goes to exactly one, chosen by its [`Scope`].
//!
//! ## Architecture
//! ```text
//!   subscribe("user.created", h)
//!        ├──► process.subscriber("events.user.created", h)
//!        ├──► app.subscriber("events.user.created", h)
//!        └──► registry["user.created"].push(h.descriptor())
//!
//!   publish(&envelope)
//!        ├─ scope = Process ──► process.publish("events.<type>", envelope)
//!        └─ scope = App     ──► app.publish("events.<type>", envelope)
//!
//!   start(): process.start() ─ok─► app.start() ─err─► process.stop(), BrokerStart{App}
//!   stop():  process.stop() ; app.stop()   (both always attempted, failures aggregated)
//! ```
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use scopebus::{BrokerConfig, Envelope, EventBus, HandlerError, HandlerFn, Message, Scope};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::in_memory(BrokerConfig::default());
//!     bus.subscribe("user.created", HandlerFn::arc(|msg: Message| async move {
//!         println!("got {}", msg.payload["data"]);
//!         Ok::<Option<Value>, HandlerError>(None)
//!     }))?;
//!
//!     bus.start().await?;
//!     let ev = Envelope::new("users", "user.created")?
//!         .with_scope(Scope::Process)
//!         .with_json(json!({"username": "alice"}))?;
//!     assert_eq!(bus.publish(&ev).await?, 1);
//!     bus.stop().await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

use super::builder::EventBusBuilder;
use super::state::{BusState, StateCell};
use crate::broker::{Broker, MemoryBroker, Message};
use crate::config::BrokerConfig;
use crate::envelope::{Envelope, EventData, Scope, channel_name};
use crate::error::{BusError, HandlerError, StopFailure, ValidationError};
use crate::handlers::{EnvelopeHandler, HandlerDescriptor, HandlerRef, TypedEvent};
use crate::lifecycle;

/// Routes envelopes to a process-local or an application-wide broker.
pub struct EventBus {
    process: Arc<dyn Broker>,
    app: Arc<dyn Broker>,
    registry: RwLock<BTreeMap<String, Vec<HandlerDescriptor>>>,
    state: StateCell,
    /// Serializes `start`/`stop`.
    transition: Mutex<()>,
}

impl EventBus {
    /// Creates an idle router over two brokers.
    pub fn new(process: Arc<dyn Broker>, app: Arc<dyn Broker>) -> Self {
        Self {
            process,
            app,
            registry: RwLock::new(BTreeMap::new()),
            state: StateCell::new(),
            transition: Mutex::new(()),
        }
    }

    /// Creates a router over two independent [`MemoryBroker`]s sharing `cfg`.
    pub fn in_memory(cfg: BrokerConfig) -> Self {
        Self::new(
            Arc::new(MemoryBroker::new(cfg.clone())),
            Arc::new(MemoryBroker::new(cfg)),
        )
    }

    /// Starts a builder that collects registrations before the router exists.
    pub fn builder(process: Arc<dyn Broker>, app: Arc<dyn Broker>) -> EventBusBuilder {
        EventBusBuilder::new(process, app)
    }

    /// Registers `handler` for `event_type` on both brokers.
    ///
    /// Valid in any state; on a running router the handler sees the next
    /// message published for that type.
    ///
    /// Both brokers are always attempted. If one refuses, the first error is
    /// returned and the handler stays listed in [`get_handlers`](Self::get_handlers)
    /// as long as the other broker accepted it.
    pub fn subscribe(&self, event_type: &str, handler: HandlerRef) -> Result<(), BusError> {
        if event_type.is_empty() {
            return Err(ValidationError::MissingType.into());
        }
        let channel = channel_name(event_type);

        let mut accepted = 0;
        let mut first_error = None;
        for (scope, broker) in self.brokers() {
            match broker.subscriber(&channel, Arc::clone(&handler)) {
                Ok(()) => accepted += 1,
                Err(source) => {
                    tracing::warn!(%scope, event_type, error = %source, "subscribe refused");
                    first_error.get_or_insert(BusError::Broker { scope, source });
                }
            }
        }
        if accepted == 0 {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        let descriptor = handler.descriptor();
        tracing::debug!(
            event_type,
            handler = %descriptor.function_name,
            module = %descriptor.module,
            "handler subscribed"
        );
        self.registry
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(descriptor);
        first_error.map_or(Ok(()), Err)
    }

    /// Registers a typed handler for `D::TYPE`.
    ///
    /// The payload is decoded into [`TypedEvent<D>`] before `f` runs; a
    /// payload that does not decode is counted as a handler error.
    pub fn subscribe_event<D, F, Fut>(&self, f: F) -> Result<(), BusError>
    where
        D: EventData,
        F: Fn(TypedEvent<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
    {
        self.subscribe(D::TYPE, EnvelopeHandler::<D, F>::arc(f))
    }

    /// Publishes `envelope` on the broker selected by its scope.
    ///
    /// Returns the number of handlers the message was delivered to.
    pub async fn publish(&self, envelope: &Envelope) -> Result<usize, BusError> {
        let state = self.state.get();
        if state != BusState::Running {
            tracing::debug!(%state, event_type = envelope.event_type(), "publish on idle bus");
            return Err(BusError::NotRunning);
        }

        let scope = envelope.scope();
        let channel = envelope.channel();
        let message = Message::new(envelope.to_value())
            .with_header("event_id", Value::String(envelope.id().to_string()))
            .with_header("scope", Value::String(scope.as_str().to_string()));

        match self.broker(scope).publish(&channel, message).await {
            Ok(delivered) => {
                tracing::trace!(
                    %scope,
                    channel = %channel,
                    event_id = envelope.id(),
                    delivered,
                    "event published"
                );
                Ok(delivered)
            }
            Err(source) => {
                tracing::warn!(
                    %scope,
                    channel = %channel,
                    event_id = envelope.id(),
                    error = %source,
                    "publish failed"
                );
                Err(BusError::Broker { scope, source })
            }
        }
    }

    /// Starts the process broker, then the app broker.
    ///
    /// If the app broker fails, the process broker is stopped again and the
    /// router stays idle. A failure of that stop is returned in
    /// [`BusError::BrokerStart`]'s `rollback`. Idempotent while running.
    pub async fn start(&self) -> Result<(), BusError> {
        let _guard = self.transition.lock().await;
        if self.state.get() == BusState::Running {
            return Ok(());
        }
        self.state.set(BusState::Starting);

        if let Err(source) = self.process.start().await {
            self.state.set(BusState::Idle);
            tracing::error!(error = %source, "process broker failed to start");
            return Err(BusError::BrokerStart {
                scope: Scope::Process,
                source,
                rollback: None,
            });
        }

        if let Err(source) = self.app.start().await {
            tracing::error!(error = %source, "app broker failed to start, rolling back");
            let rollback = match self.process.stop().await {
                Ok(()) => None,
                Err(error) => {
                    tracing::warn!(error = %error, "process broker rollback failed");
                    Some(StopFailure {
                        scope: Scope::Process,
                        error,
                    })
                }
            };
            self.state.set(BusState::Idle);
            return Err(BusError::BrokerStart {
                scope: Scope::App,
                source,
                rollback,
            });
        }

        self.state.set(BusState::Running);
        tracing::info!(
            process = self.process.kind(),
            app = self.app.kind(),
            event_types = self.registry.read().len(),
            "event bus started"
        );
        Ok(())
    }

    /// Stops both brokers, attempting each even if the other fails.
    pub async fn stop(&self) -> Result<(), BusError> {
        let _guard = self.transition.lock().await;
        if self.state.get() == BusState::Idle {
            return Ok(());
        }
        self.state.set(BusState::Stopping);

        let mut failures = Vec::new();
        for (scope, broker) in self.brokers() {
            if let Err(error) = broker.stop().await {
                tracing::warn!(%scope, error = %error, "broker failed to stop");
                failures.push(StopFailure { scope, error });
            }
        }
        self.state.set(BusState::Idle);

        if failures.is_empty() {
            tracing::info!("event bus stopped");
            Ok(())
        } else {
            Err(BusError::BrokerStop { failures })
        }
    }

    /// Starts the router, awaits `body`, and stops the router on every exit path.
    ///
    /// A panic inside `body` is re-raised after both brokers were stopped.
    pub async fn run_scoped<Fut, T>(&self, body: Fut) -> Result<T, BusError>
    where
        Fut: Future<Output = T>,
    {
        self.start().await?;
        lifecycle::guarded(body, || self.stop()).await
    }

    /// Event type → descriptors of its handlers, in registration order.
    pub fn get_handlers(&self) -> BTreeMap<String, Vec<HandlerDescriptor>> {
        self.registry.read().clone()
    }

    pub fn state(&self) -> BusState {
        self.state.get()
    }

    pub fn process_broker(&self) -> &Arc<dyn Broker> {
        &self.process
    }

    pub fn app_broker(&self) -> &Arc<dyn Broker> {
        &self.app
    }

    /// Broker responsible for `scope`.
    pub fn broker(&self, scope: Scope) -> &Arc<dyn Broker> {
        match scope {
            Scope::Process => &self.process,
            Scope::App => &self.app,
        }
    }

    fn brokers(&self) -> [(Scope, &Arc<dyn Broker>); 2] {
        [(Scope::Process, &self.process), (Scope::App, &self.app)]
    }
}
