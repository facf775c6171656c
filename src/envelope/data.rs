//! Typed event payloads.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Scope;

/// A payload type bound to one event type.
///
/// Implementors are plain serde structs. [`Envelope::from_data`](crate::Envelope::from_data)
/// builds an envelope from them, and
/// [`EventBus::subscribe_event`](crate::EventBus::subscribe_event) registers a
/// handler that receives them already decoded.
///
/// ## Example
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use scopebus::{EventData, Scope};
///
/// #[derive(Serialize, Deserialize)]
/// struct CacheInvalidated {
///     key: String,
/// }
///
/// impl EventData for CacheInvalidated {
///     const TYPE: &'static str = "cache.invalidated";
///     const SCOPE: Scope = Scope::Process;
/// }
/// ```
pub trait EventData: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Dotted event type, e.g. `"user.created"`.
    const TYPE: &'static str;

    /// Scope used when the envelope is built from this payload.
    const SCOPE: Scope = Scope::App;
}
