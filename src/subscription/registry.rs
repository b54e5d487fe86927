//! Topic registry
//!
//! Maps topic keys to a [`Slot`]: the topic's [`TopicEntry`] and its
//! delivery [`Lane`]. The map is a `DashMap`; the guard returned by
//! [`TopicRegistry::get_or_create`] or [`TopicRegistry::get_mut`] is the
//! critical section that linearizes every operation on one topic, while
//! topics living in other map shards proceed in parallel.
//!
//! Deliveries are queued on the lane while that guard is held, so lane order
//! is the order of the state changes that produced them.
//!
//! Invariant: a slot is present iff its entry has a subscriber or a source,
//! or its lane is still being delivered. Every mutating path ends with
//! [`TopicRegistry::remove_if_idle`].
//!
//! Drop a guard before calling any other registry method on the same thread.

use std::collections::HashSet;

use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};

use crate::subscription::dispatch::Lane;
use crate::subscription::listener::ListenerRef;
use crate::subscription::topic::{Topic, TopicEntry};

#[derive(Debug)]
pub struct Slot<K> {
    pub entry: TopicEntry<K>,
    pub lane: Lane<K>,
}

impl<K> Default for Slot<K> {
    fn default() -> Self {
        Self {
            entry: TopicEntry::default(),
            lane: Lane::default(),
        }
    }
}

impl<K> Slot<K> {
    /// No subscribers, no source and nothing left to deliver.
    pub fn is_idle(&self) -> bool {
        self.entry.is_empty() && !self.lane.is_busy()
    }
}

#[derive(Debug)]
pub struct TopicRegistry<K: Topic> {
    topics: DashMap<K, Slot<K>>,
    shards: usize,
}

impl<K: Topic> TopicRegistry<K> {
    /// Creates a registry spread over `shards` map shards, rounded up to a
    /// power of two of at least 2.
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(2).next_power_of_two();
        Self {
            topics: DashMap::with_shard_amount(shards),
            shards,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Enters the critical section of `topic`, creating an empty slot if absent.
    pub fn get_or_create(&self, topic: &K) -> RefMut<'_, K, Slot<K>> {
        self.topics.entry(topic.clone()).or_default()
    }

    /// Enters the critical section of `topic` if it is registered.
    pub fn get_mut(&self, topic: &K) -> Option<RefMut<'_, K, Slot<K>>> {
        self.topics.get_mut(topic)
    }

    pub fn get(&self, topic: &K) -> Option<Ref<'_, K, Slot<K>>> {
        self.topics.get(topic)
    }

    /// Deletes the slot iff it is idle. Returns whether a slot was removed.
    pub fn remove_if_idle(&self, topic: &K) -> bool {
        self.topics
            .remove_if(topic, |_, slot| slot.is_idle())
            .is_some()
    }

    /// Copies the keys of every registered entry matching `filter`.
    ///
    /// Not an atomic cut across all topics.
    pub fn snapshot_topics<F>(&self, filter: F) -> HashSet<K>
    where
        F: Fn(&TopicEntry<K>) -> bool,
    {
        self.topics
            .iter()
            .filter(|slot| !slot.entry.is_empty() && filter(&slot.entry))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Topics with at least one subscriber (granted or connected).
    pub fn snapshot_all_granted_topics(&self) -> HashSet<K> {
        self.snapshot_topics(|entry| !entry.subscribers.is_empty())
    }

    /// Topics `listener` is currently subscribed to.
    pub fn topics_of(&self, listener: &ListenerRef<K>) -> Vec<K> {
        self.snapshot_topics(|entry| entry.subscribers.contains(listener))
            .into_iter()
            .collect()
    }

    /// Total number of (topic, subscriber) relations.
    pub fn subscription_count(&self) -> usize {
        self.topics
            .iter()
            .map(|slot| slot.entry.subscribers.len())
            .sum()
    }

    /// Topics with a subscriber or a source.
    pub fn topic_count(&self) -> usize {
        self.topics
            .iter()
            .filter(|slot| !slot.entry.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::listener::{SourceRef, SubscriptionListener, SubscriptionSource};
    use crate::subscription::state::SubscriptionState;
    use std::sync::Arc;

    struct Quiet;

    impl SubscriptionListener<String> for Quiet {
        fn state_changed(&self, _topic: &String, _state: SubscriptionState) {}
        fn source_changed(&self, _topic: &String, _source: &SourceRef<String>, _attached: bool) {}
    }

    struct Plain;

    impl SubscriptionSource<String> for Plain {}

    #[test]
    fn idle_slots_are_removed_and_removal_is_idempotent() {
        let registry = TopicRegistry::<String>::new(4);
        let topic = "a".to_string();

        drop(registry.get_or_create(&topic));
        assert!(registry.get(&topic).is_some());
        assert!(registry.remove_if_idle(&topic));
        assert!(!registry.remove_if_idle(&topic));
        assert!(registry.get(&topic).is_none());
    }

    #[test]
    fn slots_with_a_source_only_are_kept() {
        let registry = TopicRegistry::<String>::new(1);
        let topic = "a".to_string();

        registry.get_or_create(&topic).entry.source = Some(SourceRef::new(Arc::new(Plain)));
        assert!(!registry.remove_if_idle(&topic));

        assert_eq!(registry.topic_count(), 1);
        assert_eq!(registry.subscription_count(), 0);
        assert!(registry.snapshot_all_granted_topics().is_empty());
    }

    #[test]
    fn empty_slots_are_invisible_to_queries() {
        let registry = TopicRegistry::<String>::new(2);
        let topic = "a".to_string();

        drop(registry.get_or_create(&topic));
        assert_eq!(registry.topic_count(), 0);
        assert!(registry.snapshot_topics(|_| true).is_empty());
    }

    #[test]
    fn counts_and_snapshots_span_all_shards() {
        let registry = TopicRegistry::<String>::new(8);
        let a = Arc::new(Quiet);
        let b = Arc::new(Quiet);
        let ra = ListenerRef::<String>::new(&a);
        let rb = ListenerRef::<String>::new(&b);

        for name in ["t1", "t2", "t3"] {
            let topic = name.to_string();
            let mut slot = registry.get_or_create(&topic);
            slot.entry.subscribers.insert(ra.clone());
            if name == "t2" {
                slot.entry.subscribers.insert(rb.clone());
            }
        }

        assert_eq!(registry.topic_count(), 3);
        assert_eq!(registry.subscription_count(), 4);

        let granted = registry.snapshot_all_granted_topics();
        let expected: HashSet<String> = ["t1", "t2", "t3"].iter().map(|t| t.to_string()).collect();
        assert_eq!(granted, expected);

        assert_eq!(registry.topics_of(&rb), vec!["t2".to_string()]);
    }

    #[test]
    fn shard_count_is_rounded_to_a_power_of_two() {
        assert_eq!(TopicRegistry::<u64>::new(0).shard_count(), 2);
        assert_eq!(TopicRegistry::<u64>::new(3).shard_count(), 4);
        assert_eq!(TopicRegistry::<u64>::new(16).shard_count(), 16);
    }
}
