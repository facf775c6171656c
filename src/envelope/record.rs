//! # Envelope: one validated event.
//!
//! An [`Envelope`] follows the CloudEvents v1.0 attribute set and adds a
//! routing [`Scope`]. It is validated once, at construction or decode time,
//! and is immutable afterwards: fields are private and the `with_*` methods
//! consume the value, so they are only usable before the envelope is shared.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use scopebus::{Envelope, Scope};
//!
//! let ev = Envelope::new("users-service", "user.created")?
//!     .with_scope(Scope::Process)
//!     .with_json(json!({ "username": "alice" }))?
//!     .with_extension("tenant", json!("acme"));
//!
//! assert_eq!(ev.channel(), "events.user.created");
//! assert_eq!(ev.scope(), Scope::Process);
//! assert_eq!(ev.to_value()["tenant"], json!("acme"));
//! # Ok::<(), scopebus::ValidationError>(())
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{EventData, Scope, channel_name};
use crate::error::ValidationError;

/// CloudEvents specification version written by default.
pub const SPEC_VERSION: &str = "1.0";

/// Content type written by default.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Top-level attribute names that can never be used as extensions.
const RESERVED: [&str; 10] = [
    "id",
    "source",
    "specversion",
    "type",
    "datacontenttype",
    "dataschema",
    "subject",
    "time",
    "scope",
    "data",
];

/// Validated, immutable event record.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    id: String,
    source: String,
    specversion: String,
    event_type: String,
    datacontenttype: Option<String>,
    dataschema: Option<String>,
    subject: Option<String>,
    timestamp: DateTime<Utc>,
    scope: Scope,
    payload: Option<Map<String, Value>>,
    extensions: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with a fresh id, the current time and [`Scope::App`].
    ///
    /// Fails with [`ValidationError::MissingSource`] / [`ValidationError::MissingType`]
    /// when either string is empty.
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let source = source.into();
        let event_type = event_type.into();
        if source.is_empty() {
            return Err(ValidationError::MissingSource);
        }
        if event_type.is_empty() {
            return Err(ValidationError::MissingType);
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source,
            specversion: SPEC_VERSION.to_string(),
            event_type,
            datacontenttype: Some(JSON_CONTENT_TYPE.to_string()),
            dataschema: None,
            subject: None,
            timestamp: Utc::now(),
            scope: Scope::default(),
            payload: None,
            extensions: Map::new(),
        })
    }

    /// Creates an envelope for a typed payload.
    ///
    /// Type and scope come from [`EventData::TYPE`] and [`EventData::SCOPE`];
    /// the payload must serialize to a JSON object.
    pub fn from_data<D: EventData>(
        source: impl Into<String>,
        data: &D,
    ) -> Result<Self, ValidationError> {
        let value = serde_json::to_value(data).map_err(|e| ValidationError::Malformed {
            reason: e.to_string(),
        })?;
        Self::new(source, D::TYPE)?
            .with_scope(D::SCOPE)
            .with_json(value)
    }

    /// Replaces the generated id.
    #[inline]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the routing scope.
    #[inline]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Attaches a key/value payload.
    #[inline]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches a JSON payload; `null` clears it, anything but an object is rejected.
    pub fn with_json(mut self, payload: Value) -> Result<Self, ValidationError> {
        self.payload = payload_from_value(payload)?;
        Ok(self)
    }

    /// Overrides the creation timestamp.
    #[inline]
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }

    /// Sets the CloudEvents `subject`.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the CloudEvents `dataschema`.
    #[inline]
    pub fn with_dataschema(mut self, schema: impl Into<String>) -> Self {
        self.dataschema = Some(schema.into());
        self
    }

    /// Sets the CloudEvents `datacontenttype`.
    #[inline]
    pub fn with_datacontenttype(mut self, content_type: impl Into<String>) -> Self {
        self.datacontenttype = Some(content_type.into());
        self
    }

    /// Adds an extension attribute. Reserved attribute names are ignored.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if RESERVED.contains(&key.as_str()) {
            tracing::debug!(key = %key, "ignoring extension with reserved attribute name");
            return self;
        }
        self.extensions.insert(key, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Dotted event type, e.g. `"order.created"`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn specversion(&self) -> &str {
        &self.specversion
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn dataschema(&self) -> Option<&str> {
        self.dataschema.as_deref()
    }

    pub fn datacontenttype(&self) -> Option<&str> {
        self.datacontenttype.as_deref()
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        &self.extensions
    }

    /// Channel this envelope is published on (`"events." + type`).
    pub fn channel(&self) -> String {
        channel_name(&self.event_type)
    }

    /// Encodes the envelope; extensions are merged into the top level.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.clone()));
        out.insert("source".into(), Value::String(self.source.clone()));
        out.insert(
            "specversion".into(),
            Value::String(self.specversion.clone()),
        );
        out.insert("type".into(), Value::String(self.event_type.clone()));
        if let Some(ct) = &self.datacontenttype {
            out.insert("datacontenttype".into(), Value::String(ct.clone()));
        }
        if let Some(schema) = &self.dataschema {
            out.insert("dataschema".into(), Value::String(schema.clone()));
        }
        if let Some(subject) = &self.subject {
            out.insert("subject".into(), Value::String(subject.clone()));
        }
        out.insert(
            "time".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        out.insert("scope".into(), Value::String(self.scope.as_str().into()));
        if let Some(payload) = &self.payload {
            out.insert("data".into(), Value::Object(payload.clone()));
        }
        for (k, v) in &self.extensions {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }

    /// Encodes the envelope as a JSON string.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Decodes and validates an envelope; unknown top-level keys become extensions.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let raw: RawEnvelope =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed {
                reason: e.to_string(),
            })?;
        Self::try_from(raw)
    }

    /// Decodes and validates an envelope from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| ValidationError::Malformed {
                reason: e.to_string(),
            })?;
        Self::try_from(raw)
    }
}

fn payload_from_value(value: Value) -> Result<Option<Map<String, Value>>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(ValidationError::PayloadNotObject),
    }
}

/// Decoder-side shape: everything optional, validated in `TryFrom`.
#[derive(Deserialize)]
struct RawEnvelope {
    id: Option<String>,
    source: Option<String>,
    specversion: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    datacontenttype: Option<String>,
    dataschema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
    scope: Option<Scope>,
    data: Option<Value>,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ValidationError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let source = raw.source.filter(|s| !s.is_empty());
        let source = source.ok_or(ValidationError::MissingSource)?;
        let event_type = raw.event_type.filter(|s| !s.is_empty());
        let event_type = event_type.ok_or(ValidationError::MissingType)?;
        let specversion = raw.specversion.unwrap_or_else(|| SPEC_VERSION.to_string());
        if specversion.is_empty() {
            return Err(ValidationError::MissingSpecVersion);
        }

        Ok(Self {
            id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            source,
            specversion,
            event_type,
            datacontenttype: raw
                .datacontenttype
                .or_else(|| Some(JSON_CONTENT_TYPE.to_string())),
            dataschema: raw.dataschema,
            subject: raw.subject,
            timestamp: raw.time.unwrap_or_else(Utc::now),
            scope: raw.scope.unwrap_or_default(),
            payload: payload_from_value(raw.data.unwrap_or(Value::Null))?,
            extensions: raw.extensions,
        })
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        Envelope::try_from(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_source_and_type() {
        assert_eq!(
            Envelope::new("", "user.created"),
            Err(ValidationError::MissingSource)
        );
        assert_eq!(
            Envelope::new("svc", ""),
            Err(ValidationError::MissingType)
        );
    }

    #[test]
    fn defaults() {
        let ev = Envelope::new("svc", "user.created").unwrap();
        assert_eq!(ev.scope(), Scope::App);
        assert_eq!(ev.specversion(), "1.0");
        assert_eq!(ev.datacontenttype(), Some("application/json"));
        assert!(ev.payload().is_none());
        assert!(!ev.id().is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let a = Envelope::new("svc", "t").unwrap();
        let b = Envelope::new("svc", "t").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn payload_must_be_an_object() {
        let err = Envelope::new("svc", "t")
            .unwrap()
            .with_json(json!([1, 2, 3]))
            .unwrap_err();
        assert_eq!(err, ValidationError::PayloadNotObject);
    }

    #[test]
    fn wire_round_trip_keeps_extensions() {
        let ev = Envelope::new("svc", "order.created")
            .unwrap()
            .with_scope(Scope::Process)
            .with_subject("order-1")
            .with_json(json!({"amount": 99.5}))
            .unwrap()
            .with_extension("tenant", json!("acme"));

        let wire = ev.to_value();
        assert_eq!(wire["type"], json!("order.created"));
        assert_eq!(wire["scope"], json!("process"));
        assert_eq!(wire["data"], json!({"amount": 99.5}));
        assert_eq!(wire["tenant"], json!("acme"));

        let back = Envelope::from_value(wire).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn reserved_extension_names_are_ignored() {
        let ev = Envelope::new("svc", "t")
            .unwrap()
            .with_extension("type", json!("spoofed"));
        assert!(ev.extensions().is_empty());
        assert_eq!(ev.to_value()["type"], json!("t"));
    }

    #[test]
    fn decode_fills_defaults_and_validates() {
        let ev = Envelope::from_value(json!({"source": "svc", "type": "a.b"})).unwrap();
        assert_eq!(ev.scope(), Scope::App);
        assert!(!ev.id().is_empty());

        let missing = Envelope::from_value(json!({"type": "a.b"}));
        assert_eq!(missing, Err(ValidationError::MissingSource));

        let empty = Envelope::from_value(json!({"source": "svc", "type": ""}));
        assert_eq!(empty, Err(ValidationError::MissingType));

        let bad_scope = Envelope::from_value(json!({"source": "s", "type": "t", "scope": "x"}));
        assert!(matches!(bad_scope, Err(ValidationError::Malformed { .. })));
    }

    #[test]
    fn serde_impls_agree_with_to_value() {
        let ev = Envelope::new("svc", "t").unwrap();
        let text = serde_json::to_string(&ev).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ev);
        assert_eq!(Envelope::from_json(&ev.to_json()).unwrap(), ev);
    }
}
