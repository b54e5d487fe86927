//! Subscription manager
//!
//! The public façade over registry, state machine and dispatcher.
//!
//! Every operation follows the same path: validate the topic, enter the
//! topic's critical section, let the state machine mutate the entry and
//! compute deliveries, restore the registry invariant, queue the deliveries
//! on the topic's lane, leave the critical section, and finally deliver.
//!
//! Concurrency and usage notes:
//! - All methods take `&self`; share the manager as `Arc<SubscriptionManager<K>>`.
//! - Operations on the same topic are linearized. Operations on topics in
//!   different registry shards never contend.
//! - An operation returns after its deliveries went out, waiting behind
//!   earlier operations on the same topic if needed. Calls made from inside
//!   a listener or source callback never wait: when the topic is busy their
//!   deliveries are left to the thread delivering it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ManagerSettings;
use crate::subscription::dispatch::Dispatcher;
use crate::subscription::listener::{ListenerRef, SourceRef, SubscriptionListener};
use crate::subscription::machine::{self, Operation};
use crate::subscription::registry::{Slot, TopicRegistry};
use crate::subscription::state::SubscriptionState;
use crate::subscription::topic::Topic;
use crate::utils::error::{Result, SubscriptionError};

/// Snapshot of one topic, for administrative tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStatus {
    /// `None` while the topic has no subscribers.
    pub state: Option<SubscriptionState>,
    pub subscribers: usize,
    pub has_source: bool,
}

#[derive(Debug)]
pub struct SubscriptionManager<K: Topic> {
    registry: TopicRegistry<K>,
    dispatcher: Dispatcher,
    granted_includes_connected: bool,
}

impl<K: Topic> Default for SubscriptionManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Topic> SubscriptionManager<K> {
    pub fn new() -> Self {
        Self::from_settings(&ManagerSettings::default())
    }

    pub fn from_settings(settings: &ManagerSettings) -> Self {
        Self {
            registry: TopicRegistry::new(settings.shards),
            dispatcher: Dispatcher::new(),
            granted_includes_connected: settings.granted_includes_connected,
        }
    }

    /// Subscribes `listener` to `topic`, creating the topic if needed.
    ///
    /// The listener is synchronized to the current topic status: `GRANTED`, or
    /// `CONNECTED` followed by the attached source. Subscribing twice is a no-op.
    /// The manager keeps only a weak reference to `listener`.
    pub fn subscribe<L>(&self, topic: &K, listener: &Arc<L>) -> Result<()>
    where
        L: SubscriptionListener<K> + 'static,
    {
        self.subscribe_ref(topic, ListenerRef::new(listener))
    }

    /// Fails with [`SubscriptionError::InvalidListener`] if the listener
    /// behind `listener` was already dropped.
    pub fn subscribe_ref(&self, topic: &K, listener: ListenerRef<K>) -> Result<()> {
        if !listener.is_alive() {
            let err = SubscriptionError::InvalidListener {
                listener: format!("{listener:?}"),
            };
            warn!(?topic, label = err.as_label(), "{err}");
            return Err(err);
        }
        self.execute(topic, Operation::Subscribe(listener))
    }

    /// Removes `listener` from `topic`; it receives `DISCONNECTED` last.
    /// Unknown topics and listeners are ignored.
    pub fn unsubscribe<L>(&self, topic: &K, listener: &Arc<L>) -> Result<()>
    where
        L: SubscriptionListener<K> + 'static,
    {
        self.unsubscribe_ref(topic, ListenerRef::new(listener))
    }

    pub fn unsubscribe_ref(&self, topic: &K, listener: ListenerRef<K>) -> Result<()> {
        self.execute(topic, Operation::Unsubscribe(listener))
    }

    /// Attaches, replaces or (with `None`) clears the source backing `topic`.
    ///
    /// Setting the source that is already attached does nothing.
    pub fn set_source(&self, topic: &K, source: Option<SourceRef<K>>) -> Result<()> {
        self.execute(topic, Operation::SetSource(source))
    }

    /// Removes `listener` from every topic it is subscribed to.
    ///
    /// Each topic is handled as an independent unsubscribe. Returns the number
    /// of topics the listener was removed from.
    pub fn unsubscribe_all<L>(&self, listener: &Arc<L>) -> usize
    where
        L: SubscriptionListener<K> + 'static,
    {
        let listener = ListenerRef::new(listener);
        let topics = self.registry.topics_of(&listener);

        let removed = topics
            .iter()
            .filter(|topic| self.run(topic, Operation::Unsubscribe(listener.clone())) > 0)
            .count();

        debug!(?listener, removed, "unsubscribed from all topics");
        removed
    }

    /// Topics that currently have at least one subscriber.
    ///
    /// With `granted_includes_connected` disabled, topics that have a source
    /// attached are left out.
    pub fn all_granted_topics(&self) -> HashSet<K> {
        if self.granted_includes_connected {
            self.registry.snapshot_all_granted_topics()
        } else {
            self.registry
                .snapshot_topics(|entry| entry.state() == Some(SubscriptionState::Granted))
        }
    }

    /// Total number of (topic, listener) subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    /// Number of registered topics, with or without subscribers.
    pub fn topic_count(&self) -> usize {
        self.registry.topic_count()
    }

    pub fn topic_status(&self, topic: &K) -> Option<TopicStatus> {
        let slot = self.registry.get(topic)?;
        let entry = &slot.entry;
        (!entry.is_empty()).then(|| TopicStatus {
            state: entry.state(),
            subscribers: entry.subscribers.len(),
            has_source: entry.source.is_some(),
        })
    }

    /// Number of listener or source callbacks that panicked.
    pub fn delivery_failures(&self) -> u64 {
        self.dispatcher.failures()
    }

    fn execute(&self, topic: &K, operation: Operation<K>) -> Result<()> {
        if let Err(reason) = topic.validate() {
            let err = SubscriptionError::InvalidTopic {
                topic: format!("{topic:?}"),
                reason,
            };
            warn!(label = err.as_label(), "{err}");
            return Err(err);
        }

        self.run(topic, operation);
        Ok(())
    }

    /// Applies `operation` and delivers the result. Returns how many
    /// deliveries the operation itself produced.
    fn run(&self, topic: &K, operation: Operation<K>) -> usize {
        debug!(?topic, operation = operation.label(), "applying");

        let creates = matches!(
            operation,
            Operation::Subscribe(_) | Operation::SetSource(Some(_))
        );

        let (produced, enqueued) = {
            let slot = if creates {
                Some(self.registry.get_or_create(topic))
            } else {
                self.registry.get_mut(topic)
            };
            let Some(mut slot) = slot else {
                return 0;
            };
            let Slot { entry, lane } = &mut *slot;

            let dropped = entry.prune_dropped();
            if !dropped.is_empty() {
                debug!(?topic, pruned = dropped.len(), "pruned dropped listeners");
            }
            let mut deliveries: Vec<_> = machine::release_dropped(entry, dropped)
                .into_iter()
                .collect();

            let changes = machine::apply(entry, operation);
            let produced = changes.len();
            deliveries.extend(changes);

            (produced, self.dispatcher.enqueue(lane, deliveries))
        };

        if self.registry.remove_if_idle(topic) {
            debug!(?topic, "topic removed");
        }

        self.dispatcher.dispatch(&self.registry, topic, enqueued);
        produced
    }
}
