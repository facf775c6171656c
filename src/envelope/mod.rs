//! Event envelope: the validated record every publisher hands to the router.
//!
//! ## Contents
//! - [`Envelope`] identity, origin, type, scope, payload and CloudEvents attributes
//! - [`Scope`] routing discriminator (process-local vs application-wide)
//! - [`EventData`] typed payloads that know their event type and default scope
//! - [`channel_name`] the fixed event-type → channel mapping
//!
//! ## Wire form
//! ```text
//! {
//!   "id": "5f0c…", "source": "users", "specversion": "1.0",
//!   "type": "user.created", "datacontenttype": "application/json",
//!   "time": "2024-02-09T12:00:00Z", "scope": "app",
//!   "data": { "username": "alice" },
//!   "tenant": "acme"                 ◄── extensions live at the top level
//! }
//! ```

mod data;
mod record;
mod scope;

pub use data::EventData;
pub use record::{Envelope, JSON_CONTENT_TYPE, SPEC_VERSION};
pub use scope::Scope;

/// Prefix of every channel derived from an event type.
pub const CHANNEL_PREFIX: &str = "events.";

/// Maps an event type to its channel: `"a.b"` → `"events.a.b"`.
#[inline]
pub fn channel_name(event_type: &str) -> String {
    format!("{CHANNEL_PREFIX}{event_type}")
}
