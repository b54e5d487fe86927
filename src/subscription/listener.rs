//! Listener and source capabilities.
//!
//! Subscribers and sources are small trait contracts. The manager refers to
//! them through the handles defined here, which compare by allocation
//! identity rather than by value: two clones of the same `Arc` are the same
//! listener, two equal-looking sources in different allocations are not.
//!
//! A [`ListenerRef`] is non-owning. The registering caller keeps the `Arc`;
//! once every strong reference is gone the listener is never invoked again.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::subscription::state::SubscriptionState;

/// Receiver of state and source notifications for the topics it subscribed to.
///
/// Callbacks run outside every manager lock and may call back into the
/// manager, including to unsubscribe themselves. A panic raised here is caught
/// and logged; it never reaches the caller of the triggering operation.
pub trait SubscriptionListener<K>: Send + Sync {
    fn state_changed(&self, topic: &K, state: SubscriptionState);

    fn source_changed(&self, topic: &K, source: &SourceRef<K>, attached: bool);
}

/// A live data provider backing a topic.
///
/// Both hooks are optional. They tell the source which listeners are bound
/// to it, so a driver can for example poll only while someone is listening.
pub trait SubscriptionSource<K>: Send + Sync {
    fn listeners_added(&self, _topic: &K, _listeners: &[ListenerRef<K>]) {}

    fn listeners_removed(&self, _topic: &K, _listeners: &[ListenerRef<K>]) {}
}

/// Non-owning, identity-compared handle to a [`SubscriptionListener`].
pub struct ListenerRef<K> {
    inner: Weak<dyn SubscriptionListener<K>>,
}

impl<K> ListenerRef<K> {
    pub fn new<L>(listener: &Arc<L>) -> Self
    where
        L: SubscriptionListener<K> + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        Self { inner: weak }
    }

    pub fn from_dyn(listener: &Arc<dyn SubscriptionListener<K>>) -> Self {
        Self {
            inner: Arc::downgrade(listener),
        }
    }

    /// The listener, unless its owner already dropped it.
    pub fn upgrade(&self) -> Option<Arc<dyn SubscriptionListener<K>>> {
        self.inner.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Whether this handle refers to `listener`.
    pub fn is<L: ?Sized>(&self, listener: &Arc<L>) -> bool {
        std::ptr::addr_eq(self.inner.as_ptr(), Arc::as_ptr(listener))
    }

    fn addr(&self) -> usize {
        self.inner.as_ptr().cast::<()>() as usize
    }
}

impl<K> Clone for ListenerRef<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> PartialEq for ListenerRef<K> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.inner.as_ptr(), other.inner.as_ptr())
    }
}

impl<K> Eq for ListenerRef<K> {}

impl<K> Hash for ListenerRef<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<K> fmt::Debug for ListenerRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerRef({:#x})", self.addr())
    }
}

/// Shared, identity-compared handle to a [`SubscriptionSource`].
pub struct SourceRef<K> {
    inner: Arc<dyn SubscriptionSource<K>>,
}

impl<K> SourceRef<K> {
    pub fn new<S>(source: Arc<S>) -> Self
    where
        S: SubscriptionSource<K> + 'static,
    {
        Self { inner: source }
    }

    pub fn from_dyn(source: Arc<dyn SubscriptionSource<K>>) -> Self {
        Self { inner: source }
    }

    pub fn source(&self) -> &Arc<dyn SubscriptionSource<K>> {
        &self.inner
    }

    /// Whether this handle refers to `source`.
    pub fn is<S: ?Sized>(&self, source: &Arc<S>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(source))
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner).cast::<()>() as usize
    }
}

impl<K, S> From<Arc<S>> for SourceRef<K>
where
    S: SubscriptionSource<K> + 'static,
{
    fn from(source: Arc<S>) -> Self {
        Self::new(source)
    }
}

impl<K> Clone for SourceRef<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> PartialEq for SourceRef<K> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl<K> Eq for SourceRef<K> {}

impl<K> Hash for SourceRef<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<K> fmt::Debug for SourceRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceRef({:#x})", self.addr())
    }
}
