//! Capability contracts that features agree on without knowing each other.
//!
//! A provider defines a value under a well-known key; consumers import the key
//! and downcast to the shared handle type declared here.

use std::fmt::Debug;
use std::sync::Arc;

/// Well-known key of the logging capability.
pub const LOGGER_KEY: &str = "logger";

/// Operation a logging capability must declare.
pub const LOG_OPERATION: &str = "log";

/// Destination for messages logged on behalf of a feature.
pub trait LogSink: Send + Sync + Debug {
    fn log(&self, source: &str, message: &str);
}

/// Value stored under [`LOGGER_KEY`].
pub type SharedLogSink = Arc<dyn LogSink>;
