//! Subscription state machine
//!
//! [`apply`] mutates a [`TopicEntry`] according to one operation and returns
//! the deliveries that transition implies, in delivery order. It performs no
//! I/O and never calls a listener or source.
//!
//! Ordering: gaining a source announces the state before the source detail
//! (`CONNECTED`, then `source(attached)`); losing one gives the detail first
//! (`source(detached)`, then `GRANTED` or `DISCONNECTED`). The source's own
//! binding hooks follow the same rule: `listeners_added` comes after the
//! listener events, `listeners_removed` before them.

use crate::subscription::listener::{ListenerRef, SourceRef};
use crate::subscription::state::{Binding, Delivery, Notification, SubscriptionState};
use crate::subscription::topic::TopicEntry;

#[derive(Debug)]
pub enum Operation<K> {
    Subscribe(ListenerRef<K>),
    Unsubscribe(ListenerRef<K>),
    SetSource(Option<SourceRef<K>>),
}

impl<K> Operation<K> {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Subscribe(_) => "subscribe",
            Operation::Unsubscribe(_) => "unsubscribe",
            Operation::SetSource(Some(_)) => "set_source",
            Operation::SetSource(None) => "clear_source",
        }
    }
}

/// Applies `operation` to `entry`, returning what must be delivered.
pub fn apply<K>(entry: &mut TopicEntry<K>, operation: Operation<K>) -> Vec<Delivery<K>> {
    match operation {
        Operation::Subscribe(listener) => subscribe(entry, listener),
        Operation::Unsubscribe(listener) => unsubscribe(entry, &listener),
        Operation::SetSource(source) => set_source(entry, source),
    }
}

/// Tells the attached source that `dropped` listeners are gone.
///
/// `dropped` must already be out of `entry.subscribers`.
pub fn release_dropped<K>(
    entry: &TopicEntry<K>,
    dropped: Vec<ListenerRef<K>>,
) -> Option<Delivery<K>> {
    if dropped.is_empty() {
        return None;
    }
    entry.source.as_ref().map(|source| Delivery::Source {
        source: source.clone(),
        binding: Binding::Removed,
        listeners: dropped,
    })
}

fn subscribe<K>(entry: &mut TopicEntry<K>, listener: ListenerRef<K>) -> Vec<Delivery<K>> {
    if !entry.subscribers.insert(listener.clone()) {
        return Vec::new();
    }

    match &entry.source {
        Some(source) => vec![
            to_listener(&listener, Notification::State(SubscriptionState::Connected)),
            to_listener(&listener, attached(source)),
            Delivery::Source {
                source: source.clone(),
                binding: Binding::Added,
                listeners: vec![listener],
            },
        ],
        None => vec![to_listener(
            &listener,
            Notification::State(SubscriptionState::Granted),
        )],
    }
}

fn unsubscribe<K>(entry: &mut TopicEntry<K>, listener: &ListenerRef<K>) -> Vec<Delivery<K>> {
    if !entry.subscribers.remove(listener) {
        return Vec::new();
    }

    let disconnected = to_listener(listener, Notification::State(SubscriptionState::Disconnected));

    match &entry.source {
        Some(source) => vec![
            Delivery::Source {
                source: source.clone(),
                binding: Binding::Removed,
                listeners: vec![listener.clone()],
            },
            to_listener(listener, detached(source)),
            disconnected,
        ],
        None => vec![disconnected],
    }
}

fn set_source<K>(entry: &mut TopicEntry<K>, source: Option<SourceRef<K>>) -> Vec<Delivery<K>> {
    if entry.source == source {
        return Vec::new();
    }

    let previous = std::mem::replace(&mut entry.source, source.clone());

    // Without subscribers the new source just waits for the next subscribe.
    if entry.subscribers.is_empty() {
        return Vec::new();
    }
    let listeners: Vec<ListenerRef<K>> = entry.subscribers.iter().cloned().collect();

    let per_listener = match (&previous, &source) {
        (None, Some(new)) => vec![
            Notification::State(SubscriptionState::Connected),
            attached(new),
        ],
        (Some(old), None) => vec![
            detached(old),
            Notification::State(SubscriptionState::Granted),
        ],
        (Some(old), Some(new)) => vec![detached(old), attached(new)],
        (None, None) => Vec::new(),
    };

    let mut deliveries = Vec::with_capacity(listeners.len() * per_listener.len() + 2);

    if let Some(old) = previous {
        deliveries.push(Delivery::Source {
            source: old,
            binding: Binding::Removed,
            listeners: listeners.clone(),
        });
    }

    for listener in &listeners {
        deliveries.extend(
            per_listener
                .iter()
                .map(|notification| to_listener(listener, notification.clone())),
        );
    }

    if let Some(new) = source {
        deliveries.push(Delivery::Source {
            source: new,
            binding: Binding::Added,
            listeners,
        });
    }

    deliveries
}

fn to_listener<K>(listener: &ListenerRef<K>, notification: Notification<K>) -> Delivery<K> {
    Delivery::Listener {
        listener: listener.clone(),
        notification,
    }
}

fn attached<K>(source: &SourceRef<K>) -> Notification<K> {
    Notification::Source {
        attached: true,
        source: source.clone(),
    }
}

fn detached<K>(source: &SourceRef<K>) -> Notification<K> {
    Notification::Source {
        attached: false,
        source: source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::listener::{SubscriptionListener, SubscriptionSource};
    use std::sync::Arc;

    struct Quiet;

    impl SubscriptionListener<&'static str> for Quiet {
        fn state_changed(&self, _topic: &&'static str, _state: SubscriptionState) {}
        fn source_changed(
            &self,
            _topic: &&'static str,
            _source: &SourceRef<&'static str>,
            _attached: bool,
        ) {
        }
    }

    struct Plain;

    impl SubscriptionSource<&'static str> for Plain {}

    type Key = &'static str;

    /// Listener notifications addressed to `listener`, in order.
    fn seen_by(deliveries: &[Delivery<Key>], listener: &ListenerRef<Key>) -> Vec<Notification<Key>> {
        deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Listener {
                    listener: l,
                    notification,
                } if l == listener => Some(notification.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(s: SubscriptionState) -> Notification<Key> {
        Notification::State(s)
    }

    fn src(attached: bool, source: &SourceRef<Key>) -> Notification<Key> {
        Notification::Source {
            attached,
            source: source.clone(),
        }
    }

    #[test]
    fn subscribe_without_source_grants() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let mut entry = TopicEntry::<Key>::new();

        let out = apply(&mut entry, Operation::Subscribe(lr.clone()));
        assert_eq!(seen_by(&out, &lr), vec![state(SubscriptionState::Granted)]);
        assert_eq!(out.len(), 1);
        assert_eq!(entry.state(), Some(SubscriptionState::Granted));
    }

    #[test]
    fn subscribe_with_source_connects_then_binds() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let s = SourceRef::new(Arc::new(Plain));
        let mut entry = TopicEntry::<Key>::new();

        assert!(apply(&mut entry, Operation::SetSource(Some(s.clone()))).is_empty());

        let out = apply(&mut entry, Operation::Subscribe(lr.clone()));
        assert_eq!(
            seen_by(&out, &lr),
            vec![state(SubscriptionState::Connected), src(true, &s)]
        );
        match out.last() {
            Some(Delivery::Source {
                source,
                binding: Binding::Added,
                listeners,
            }) => {
                assert_eq!(source, &s);
                assert_eq!(listeners, &vec![lr.clone()]);
            }
            other => panic!("expected source binding last, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_subscribe_and_unknown_unsubscribe_are_silent() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let mut entry = TopicEntry::<Key>::new();

        assert!(apply(&mut entry, Operation::Unsubscribe(lr.clone())).is_empty());
        assert_eq!(apply(&mut entry, Operation::Subscribe(lr.clone())).len(), 1);
        assert!(apply(&mut entry, Operation::Subscribe(lr.clone())).is_empty());
        assert_eq!(entry.subscribers.len(), 1);
    }

    #[test]
    fn unsubscribe_with_source_unbinds_first() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let s = SourceRef::new(Arc::new(Plain));
        let mut entry = TopicEntry::<Key>::new();
        apply(&mut entry, Operation::SetSource(Some(s.clone())));
        apply(&mut entry, Operation::Subscribe(lr.clone()));

        let out = apply(&mut entry, Operation::Unsubscribe(lr.clone()));
        assert!(matches!(
            out.first(),
            Some(Delivery::Source {
                binding: Binding::Removed,
                ..
            })
        ));
        assert_eq!(
            seen_by(&out, &lr),
            vec![src(false, &s), state(SubscriptionState::Disconnected)]
        );
        assert!(entry.subscribers.is_empty());
        assert!(!entry.is_empty());
    }

    #[test]
    fn replacing_source_keeps_every_listener_connected() {
        let a = Arc::new(Quiet);
        let b = Arc::new(Quiet);
        let ra = ListenerRef::new(&a);
        let rb = ListenerRef::new(&b);
        let s1 = SourceRef::new(Arc::new(Plain));
        let s2 = SourceRef::new(Arc::new(Plain));
        let mut entry = TopicEntry::<Key>::new();

        apply(&mut entry, Operation::Subscribe(ra.clone()));
        apply(&mut entry, Operation::Subscribe(rb.clone()));

        let out = apply(&mut entry, Operation::SetSource(Some(s1.clone())));
        for lr in [&ra, &rb] {
            assert_eq!(
                seen_by(&out, lr),
                vec![state(SubscriptionState::Connected), src(true, &s1)]
            );
        }

        let out = apply(&mut entry, Operation::SetSource(Some(s2.clone())));
        for lr in [&ra, &rb] {
            assert_eq!(seen_by(&out, lr), vec![src(false, &s1), src(true, &s2)]);
        }
        assert!(matches!(
            out.first(),
            Some(Delivery::Source { source, binding: Binding::Removed, listeners }) if source == &s1 && listeners.len() == 2
        ));
        assert!(matches!(
            out.last(),
            Some(Delivery::Source { source, binding: Binding::Added, listeners }) if source == &s2 && listeners.len() == 2
        ));

        let out = apply(&mut entry, Operation::SetSource(None));
        for lr in [&ra, &rb] {
            assert_eq!(
                seen_by(&out, lr),
                vec![src(false, &s2), state(SubscriptionState::Granted)]
            );
        }
        assert_eq!(entry.state(), Some(SubscriptionState::Granted));
    }

    #[test]
    fn same_source_twice_is_a_no_op() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let s = SourceRef::new(Arc::new(Plain));
        let mut entry = TopicEntry::<Key>::new();
        apply(&mut entry, Operation::Subscribe(lr));

        assert!(!apply(&mut entry, Operation::SetSource(Some(s.clone()))).is_empty());
        assert!(apply(&mut entry, Operation::SetSource(Some(s.clone()))).is_empty());
        assert!(apply(&mut entry, Operation::SetSource(Some(s))).is_empty());
    }

    #[test]
    fn dropped_listeners_are_released_from_the_source() {
        let l = Arc::new(Quiet);
        let lr = ListenerRef::new(&l);
        let s = SourceRef::new(Arc::new(Plain));
        let mut entry = TopicEntry::<Key>::new();
        apply(&mut entry, Operation::SetSource(Some(s.clone())));
        apply(&mut entry, Operation::Subscribe(lr.clone()));
        drop(l);

        let dropped = entry.prune_dropped();
        assert_eq!(dropped, vec![lr]);
        match release_dropped(&entry, dropped) {
            Some(Delivery::Source {
                source,
                binding: Binding::Removed,
                listeners,
            }) => {
                assert_eq!(source, s);
                assert_eq!(listeners.len(), 1);
            }
            other => panic!("expected an unbind, got {other:?}"),
        }

        entry.source = None;
        assert!(release_dropped(&entry, Vec::new()).is_none());
    }

    #[test]
    fn clearing_an_absent_source_is_a_no_op() {
        let mut entry = TopicEntry::<Key>::new();
        assert!(apply(&mut entry, Operation::SetSource(None)).is_empty());
        assert!(entry.is_empty());
    }
}
