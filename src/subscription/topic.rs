//! Topic keys and per-topic subscription state.
//!
//! A `TopicEntry` holds the listeners subscribed to one topic and the source
//! currently backing it, if any. Callers must hold the registry guard
//! for the topic while touching an entry.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use crate::subscription::listener::{ListenerRef, SourceRef};
use crate::subscription::state::SubscriptionState;

/// Key of a subscribable resource.
///
/// `validate` lets a key type reject malformed values before anything is
/// registered; the default accepts every value.
pub trait Topic: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Topic for String {}
impl Topic for &'static str {}
impl Topic for u16 {}
impl Topic for u32 {}
impl Topic for u64 {}
impl Topic for usize {}
impl Topic for i32 {}
impl Topic for i64 {}

#[derive(Debug)]
pub struct TopicEntry<K> {
    pub subscribers: HashSet<ListenerRef<K>>,
    pub source: Option<SourceRef<K>>,
}

impl<K> Default for TopicEntry<K> {
    fn default() -> Self {
        Self {
            subscribers: HashSet::new(),
            source: None,
        }
    }
}

impl<K> TopicEntry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry with neither subscribers nor source must not stay registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty() && self.source.is_none()
    }

    /// The state every subscriber currently observes, `None` without subscribers.
    pub fn state(&self) -> Option<SubscriptionState> {
        if self.subscribers.is_empty() {
            None
        } else if self.source.is_some() {
            Some(SubscriptionState::Connected)
        } else {
            Some(SubscriptionState::Granted)
        }
    }

    /// Drops listeners whose owners released them without unsubscribing and
    /// returns their handles.
    pub fn prune_dropped(&mut self) -> Vec<ListenerRef<K>> {
        let dropped: Vec<ListenerRef<K>> = self
            .subscribers
            .iter()
            .filter(|listener| !listener.is_alive())
            .cloned()
            .collect();
        for listener in &dropped {
            self.subscribers.remove(listener);
        }
        dropped
    }
}
