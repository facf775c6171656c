//! # scopebus
//!
//! **Scopebus** is a lightweight event-dispatch core for async Rust services.
//!
//! It provides a validated event record ([`Envelope`]), an in-process
//! publish/subscribe broker with request/reply ([`MemoryBroker`]), and a
//! router ([`EventBus`]) that sends each event either to a process-local
//! broker or to an application-wide broker, depending on the event's
//! [`Scope`]. Remote transports plug in by implementing [`Broker`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Envelope   │   │   Envelope   │   │   Envelope   │
//!     │scope=process │   │  scope=app   │   │  scope=app   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus (router)                                                │
//! │  - registry: event type → handler descriptors                     │
//! │  - state: Idle → Starting → Running → Stopping → Idle             │
//! │  - publish(): channel = "events." + type, broker chosen by scope  │
//! └──────┬──────────────────────────────────────────────────┬─────────┘
//!        ▼                                                  ▼
//! ┌──────────────────────────┐                ┌──────────────────────────┐
//! │ process: Arc<dyn Broker> │                │   app: Arc<dyn Broker>   │
//! │   (MemoryBroker)         │                │ (MemoryBroker or remote) │
//! └──────┬───────────────────┘                └──────┬───────────────────┘
//!        ▼                                           ▼
//!   [queue "events.a"] ─► consumer ─┬─► handler 1     (same shape per channel)
//!                                   ├─► handler 2
//!                                   └─► handler N     join_all, panics caught
//! ```
//!
//! ### Request/reply
//! ```text
//! request(ch, payload) ──► pending[uuid] ──► publish(ch, {payload, correlation_id, reply_to})
//!                                                     │
//! handler returns Some(v) ──► publish(reply_to, {v, correlation_id}) ──► pending[uuid].send(v)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Validated CloudEvents-style records with a routing scope.    | [`Envelope`], [`Scope`], [`EventData`]      |
//! | **Brokers**       | Channel fan-out, bounded queues, request/reply, statistics.  | [`Broker`], [`MemoryBroker`], [`Message`]   |
//! | **Handlers**      | Closures, typed envelope handlers, result republishing.      | [`Handler`], [`HandlerFn`], [`Publisher`]   |
//! | **Routing**       | Two brokers behind one lifecycle, picked per event.          | [`EventBus`], [`EventBusBuilder`]           |
//! | **Errors**        | Typed errors with stable labels.                             | [`BrokerError`], [`BusError`]               |
//! | **Configuration** | Queue size, backpressure, stop grace, request timeout.       | [`BrokerConfig`], [`Backpressure`]          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in `LogHandler` _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use serde_json::Value;
//! use scopebus::{BrokerConfig, Envelope, EventBus, EventData, HandlerError, Scope};
//!
//! #[derive(Serialize, Deserialize)]
//! struct UserCreated {
//!     username: String,
//! }
//!
//! impl EventData for UserCreated {
//!     const TYPE: &'static str = "user.created";
//!     const SCOPE: Scope = Scope::Process;
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::in_memory(BrokerConfig::default());
//!     bus.subscribe_event::<UserCreated, _, _>(|ev| async move {
//!         println!("welcome, {}", ev.data.username);
//!         Ok::<Option<Value>, HandlerError>(None)
//!     })?;
//!
//!     let delivered = bus
//!         .run_scoped(async {
//!             let ev = Envelope::from_data("users", &UserCreated { username: "alice".into() })?;
//!             bus.publish(&ev).await
//!         })
//!         .await??;
//!     assert_eq!(delivered, 1);
//!     Ok(())
//! }
//! ```
mod broker;
mod config;
mod envelope;
mod error;
mod handlers;
mod lifecycle;
mod router;

// ---- Public re-exports ----

pub use broker::{Broker, ChannelStats, MemoryBroker, Message, REPLY_PREFIX, StatsSnapshot};
pub use config::{Backpressure, BrokerConfig};
pub use envelope::{
    CHANNEL_PREFIX, Envelope, EventData, JSON_CONTENT_TYPE, SPEC_VERSION, Scope, channel_name,
};
pub use error::{BrokerError, BusError, HandlerError, StopFailure, ValidationError};
pub use handlers::{
    EnvelopeHandler, Handler, HandlerDescriptor, HandlerFn, HandlerRef, Publisher, Sink,
    TypedEvent, decode_event,
};
pub use router::{BusState, EventBus, EventBusBuilder};

// Optional: expose a simple built-in logger handler (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use handlers::LogHandler;
