//! Error types used by the broker engine, the router and handlers.
//!
//! This module defines four enums:
//!
//! - [`ValidationError`]: a malformed [`Envelope`](crate::Envelope).
//! - [`BrokerError`]: failures of a [`Broker`](crate::Broker) operation.
//! - [`HandlerError`]: failures raised while a handler processes a message.
//! - [`BusError`]: failures of the [`EventBus`](crate::EventBus) router.
//!
//! Every type provides `as_label()`, a short stable snake_case label for
//! logs and metrics.

use std::time::Duration;

use thiserror::Error;

use crate::envelope::Scope;

/// # Envelope validation failures.
///
/// Raised when an envelope is constructed or decoded with missing required
/// attributes or with a payload of the wrong shape.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `source` is missing or empty.
    #[error("envelope source must not be empty")]
    MissingSource,

    /// `type` is missing or empty.
    #[error("envelope type must not be empty")]
    MissingType,

    /// `specversion` is empty.
    #[error("envelope specversion must not be empty")]
    MissingSpecVersion,

    /// The payload is present but is not a key/value object.
    #[error("envelope payload must be a JSON object")]
    PayloadNotObject,

    /// The envelope could not be decoded at all.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// Decoder message.
        reason: String,
    },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scopebus::ValidationError;
    ///
    /// assert_eq!(ValidationError::MissingSource.as_label(), "envelope_missing_source");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::MissingSource => "envelope_missing_source",
            ValidationError::MissingType => "envelope_missing_type",
            ValidationError::MissingSpecVersion => "envelope_missing_specversion",
            ValidationError::PayloadNotObject => "envelope_payload_not_object",
            ValidationError::Malformed { .. } => "envelope_malformed",
        }
    }
}

/// # Errors produced by broker operations.
///
/// Handler failures never show up here: they are contained inside the
/// consumer loop and only counted in the broker statistics.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// `publish`/`request` was called while the broker is not running.
    #[error("broker is not running; call start() first")]
    NotRunning,

    /// An operation was given an empty channel name.
    #[error("channel name must not be empty")]
    EmptyChannel,

    /// The channel queue is at capacity (reject policy, or block deadline hit).
    #[error("channel '{channel}' is full (capacity {capacity})")]
    QueueFull {
        /// Target channel.
        channel: String,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// No reply with a matching correlation id arrived in time.
    #[error("request on channel '{channel}' timed out after {timeout:?}")]
    RequestTimeout {
        /// Channel the request was published to.
        channel: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The pending request was dropped before a reply arrived (broker stopped).
    #[error("request on channel '{channel}' was cancelled before a reply arrived")]
    RequestCancelled {
        /// Channel the request was published to.
        channel: String,
    },

    /// The channel consumer is gone; the message could not be enqueued.
    #[error("channel '{channel}' is closed")]
    ChannelClosed {
        /// Target channel.
        channel: String,
    },

    /// Consumers did not finish within the stop grace period and were aborted.
    #[error("stop grace {grace:?} exceeded; aborted consumers: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Channels whose consumer had to be aborted.
        stuck: Vec<String>,
    },

    /// Failure reported by a remote-transport implementation.
    #[error("transport error: {reason}")]
    Transport {
        /// Transport-specific message.
        reason: String,
    },
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scopebus::BrokerError;
    ///
    /// let err = BrokerError::QueueFull { channel: "events.a".into(), capacity: 1 };
    /// assert_eq!(err.as_label(), "broker_queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::NotRunning => "broker_not_running",
            BrokerError::EmptyChannel => "broker_empty_channel",
            BrokerError::QueueFull { .. } => "broker_queue_full",
            BrokerError::RequestTimeout { .. } => "broker_request_timeout",
            BrokerError::RequestCancelled { .. } => "broker_request_cancelled",
            BrokerError::ChannelClosed { .. } => "broker_channel_closed",
            BrokerError::GraceExceeded { .. } => "broker_grace_exceeded",
            BrokerError::Transport { .. } => "broker_transport",
        }
    }

    /// True for [`BrokerError::RequestTimeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrokerError::RequestTimeout { .. })
    }
}

/// # Errors raised by handlers.
///
/// Returned from [`Handler::handle`](crate::Handler::handle). The consumer
/// loop logs them and increments the `errors` counter; they never reach the
/// publisher or sibling handlers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler body failed.
    #[error("handler failed: {reason}")]
    Failed {
        /// Failure message.
        reason: String,
    },

    /// The incoming payload could not be converted into the declared type.
    #[error("cannot convert payload into {target}: {reason}")]
    Conversion {
        /// Declared target type.
        target: &'static str,
        /// Conversion failure message.
        reason: String,
    },

    /// A publisher wrapper could not publish the handler's result.
    #[error("publishing handler result failed: {0}")]
    Publish(#[from] BrokerError),

    /// The handler panicked.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Conversion { .. } => "handler_conversion",
            HandlerError::Publish(_) => "handler_publish",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }
}

/// A single broker failure collected while stopping the router.
#[derive(Debug)]
pub struct StopFailure {
    /// Which broker failed.
    pub scope: Scope,
    /// The failure it reported.
    pub error: BrokerError,
}

/// # Errors produced by the [`EventBus`](crate::EventBus) router.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// `publish` was called while the router is not running.
    #[error("event bus is not running; call start() first")]
    NotRunning,

    /// The envelope or event type is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A broker rejected a publish or a registration.
    #[error("{scope} broker failed: {source}")]
    Broker {
        /// Broker that failed.
        scope: Scope,
        /// Underlying error.
        #[source]
        source: BrokerError,
    },

    /// A broker failed to start.
    ///
    /// No broker is left running unless `rollback` is set: then stopping the
    /// broker that had already started failed too, and it may still run.
    #[error("failed to start {scope} broker: {source}{}", rollback_note(rollback))]
    BrokerStart {
        /// Broker that failed to start.
        scope: Scope,
        /// Underlying error.
        #[source]
        source: BrokerError,
        /// Failed stop of the broker started before `scope`.
        rollback: Option<StopFailure>,
    },

    /// One or both brokers failed to stop; both were attempted.
    #[error("failed to stop {} broker(s): {}", failures.len(), describe(failures))]
    BrokerStop {
        /// Every failure, in stop order.
        failures: Vec<StopFailure>,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scopebus::BusError;
    ///
    /// assert_eq!(BusError::NotRunning.as_label(), "bus_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::NotRunning => "bus_not_running",
            BusError::Validation(_) => "bus_validation",
            BusError::Broker { .. } => "bus_broker",
            BusError::BrokerStart { .. } => "bus_broker_start",
            BusError::BrokerStop { .. } => "bus_broker_stop",
        }
    }
}

fn rollback_note(rollback: &Option<StopFailure>) -> String {
    match rollback {
        Some(f) => format!(" (rollback of {} broker failed: {})", f.scope, f.error),
        None => String::new(),
    }
}

fn describe(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.scope, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_failure_message_lists_every_broker() {
        let err = BusError::BrokerStop {
            failures: vec![
                StopFailure {
                    scope: Scope::Process,
                    error: BrokerError::Transport {
                        reason: "local down".into(),
                    },
                },
                StopFailure {
                    scope: Scope::App,
                    error: BrokerError::Transport {
                        reason: "redis down".into(),
                    },
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("failed to stop 2 broker(s)"));
        assert!(text.contains("process: transport error: local down"));
        assert!(text.contains("app: transport error: redis down"));
    }

    #[test]
    fn start_failure_keeps_source() {
        let err = BusError::BrokerStart {
            scope: Scope::App,
            source: BrokerError::Transport {
                reason: "refused".into(),
            },
            rollback: None,
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("transport error: refused"));
        assert_eq!(err.as_label(), "bus_broker_start");
        assert_eq!(err.to_string(), "failed to start app broker: transport error: refused");
    }

    #[test]
    fn start_failure_mentions_failed_rollback() {
        let err = BusError::BrokerStart {
            scope: Scope::App,
            source: BrokerError::Transport {
                reason: "refused".into(),
            },
            rollback: Some(StopFailure {
                scope: Scope::Process,
                error: BrokerError::Transport {
                    reason: "stuck".into(),
                },
            }),
        };
        assert_eq!(
            err.to_string(),
            "failed to start app broker: transport error: refused \
             (rollback of process broker failed: transport error: stuck)"
        );
    }

    #[test]
    fn timeout_is_distinguishable() {
        let err = BrokerError::RequestTimeout {
            channel: "rpc.x".into(),
            timeout: Duration::from_millis(50),
        };
        assert!(err.is_timeout());
        assert!(!BrokerError::NotRunning.is_timeout());
    }
}
