//! Subscription states and the notifications computed for them.

use serde::{Deserialize, Serialize};

use crate::subscription::listener::{ListenerRef, SourceRef};

/// State of a topic as observed by one of its subscribers.
///
/// `Disconnected` is never a sustained state: it is delivered exactly once,
/// when the subscriber leaves the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// Subscribed, no source attached.
    Granted,
    /// Subscribed, source attached.
    Connected,
    /// The subscriber was removed from the topic.
    Disconnected,
}

/// A single notification for one listener.
#[derive(Debug, PartialEq, Eq)]
pub enum Notification<K> {
    State(SubscriptionState),
    Source { attached: bool, source: SourceRef<K> },
}

impl<K> Clone for Notification<K> {
    fn clone(&self) -> Self {
        match self {
            Notification::State(state) => Notification::State(*state),
            Notification::Source { attached, source } => Notification::Source {
                attached: *attached,
                source: source.clone(),
            },
        }
    }
}

/// Which side of the source's binding changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Added,
    Removed,
}

/// One unit of work for the dispatcher, in the order it must be delivered.
#[derive(Debug)]
pub enum Delivery<K> {
    Listener {
        listener: ListenerRef<K>,
        notification: Notification<K>,
    },
    Source {
        source: SourceRef<K>,
        binding: Binding,
        listeners: Vec<ListenerRef<K>>,
    },
}
