//! # Message handlers
//!
//! Everything that can be registered on a channel implements [`Handler`].
//!
//! ## Contents
//! - [`Handler`] the async trait invoked once per message
//! - [`HandlerFn`] closure-backed handler
//! - [`EnvelopeHandler`] / [`TypedEvent`] typed handler that decodes the envelope first
//! - [`Publisher`] / [`Sink`] wrapper that republishes a handler's result
//! - [`HandlerDescriptor`] introspection metadata
//! - `LogHandler` reference handler that logs every message (feature `logging`)

mod handler;
mod handler_fn;
mod publisher;
mod typed;

#[cfg(feature = "logging")]
mod log;

pub use handler::{Handler, HandlerDescriptor, HandlerRef};
pub use handler_fn::HandlerFn;
pub use publisher::{Publisher, Sink};
pub use typed::{EnvelopeHandler, TypedEvent, decode_event};

#[cfg(feature = "logging")]
pub use log::LogHandler;
