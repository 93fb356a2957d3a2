//! Error Types for the Aggregation Engine
//!
//! ## Design Philosophy
//!
//! Only one class of failure ever crosses the public API: configuration
//! mistakes. Everything that can go wrong while events are flowing is
//! absorbed where it happens and surfaced as a counter instead.
//!
//! | Category             | Example                         | Handling                          |
//! |----------------------|---------------------------------|-----------------------------------|
//! | Configuration        | unknown pool name               | `Err(PulseError)` at the call site |
//! | Resource exhaustion  | empty pool free list            | fresh allocation or refusal, miss counted |
//! | Subscriber failure   | callback returns `Err` / panics | caught by the bus, counted        |
//! | Malformed input      | empty source id, NaN amount     | event skipped, counted            |
//!
//! The live ingestion path must never be taken down by one bad event, so
//! per-event problems degrade accuracy (a dropped sample, a skipped refresh)
//! rather than interrupt the data flow.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use pulsemeter_core::{EngineConfig, PulseError};
//!
//! match EngineConfig::from_json_str(r#"{ "pools": { "bogus": { "capacity": 4 } } }"#) {
//!     Ok(_) => unreachable!(),
//!     Err(PulseError::UnknownPool(name)) => assert_eq!(name, "bogus"),
//!     Err(other) => panic!("unexpected: {other}"),
//! }
//! ```

use thiserror_no_std::Error;

/// Result type for engine operations
pub type PulseResult<T> = Result<T, PulseError>;

/// Configuration errors - the only failures that reach callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PulseError {
    /// Pool name is not one of the recognized record pools
    #[error("Unknown pool '{0}'")]
    UnknownPool(String),

    /// Topic name does not match any bus topic
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    /// Metric name does not match any metric kind
    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    /// Metric kind is valid but no accumulator is registered for it
    #[error("No accumulator registered for metric '{0}'")]
    UnregisteredMetric(&'static str),

    /// A configuration value is out of its accepted range
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Dotted path of the offending field
        field: &'static str,
        /// What the accepted range is
        reason: &'static str,
    },

    /// Configuration document could not be parsed
    #[error("Malformed configuration: {0}")]
    MalformedConfig(String),
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::MalformedConfig(err.to_string())
    }
}

/// Failure reported by an event bus subscriber
///
/// Subscribers return this instead of panicking; the bus counts it and moves
/// on to the next subscriber. It never reaches the publisher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// Subscriber could not handle the event
    #[error("Subscriber failed: {0}")]
    Failed(String),

    /// Subscriber panicked; the payload message is preserved when it was a string
    #[error("Subscriber panicked: {0}")]
    Panicked(String),
}

impl SubscriberError {
    /// Convenience constructor for handler failures
    pub fn failed(reason: impl Into<String>) -> Self {
        SubscriberError::Failed(reason.into())
    }
}
