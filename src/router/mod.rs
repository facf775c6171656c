//! Scope routing across two brokers.
//!
//! - [`EventBus`] the router and its registry
//! - [`EventBusBuilder`] registrations collected ahead of construction
//! - [`BusState`] router lifecycle

mod builder;
mod event_bus;
mod state;

pub use builder::EventBusBuilder;
pub use event_bus::EventBus;
pub use state::BusState;
