//! The `error` module defines the error types returned by `topicsub`.
//!
//! Only structural problems with the arguments of a manager operation are
//! reported to the caller. Failures inside listener or source callbacks never
//! surface here; the dispatcher logs and counts them instead.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The topic key was rejected by [`Topic::validate`](crate::subscription::Topic::validate).
    /// The registry is left untouched.
    #[error("invalid topic {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// The listener handle no longer refers to a live listener.
    #[error("invalid listener {listener}: dropped before subscribing")]
    InvalidListener { listener: String },
}

impl SubscriptionError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscriptionError::InvalidTopic { .. } => "invalid_topic",
            SubscriptionError::InvalidListener { .. } => "invalid_listener",
        }
    }
}

pub type Result<T> = std::result::Result<T, SubscriptionError>;
