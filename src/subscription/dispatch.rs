//! Dispatcher
//!
//! Delivers the output of the state machine outside every registry lock.
//!
//! Each topic owns a *lane*, stored in its registry slot. Deliveries are
//! queued on the lane while the guard that ordered their state change is
//! still held, so lane order is the linearization order of the topic. At most
//! one thread delivers for a lane at a time: its *owner*.
//!
//! - A caller that finds the lane idle becomes its owner and delivers its own
//!   batch right after releasing the guard.
//! - A caller that finds the lane owned queues its batch with a turn handle
//!   and blocks. When the owner reaches that batch it hands the lane over,
//!   and the caller delivers its own batch. Every caller therefore returns
//!   only after its operation was delivered, and delivers nobody else's
//!   waiting batch.
//! - A call made from inside a callback never blocks: its batch is queued
//!   without a turn handle and whoever owns the lane delivers it. The owner
//!   keeps going through such batches and stops at the next waiting caller.
//!
//! A panicking callback is caught, logged and counted; the remaining
//! deliveries of the batch still go out.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender};

use tracing::{error, trace, warn};

use crate::subscription::registry::TopicRegistry;
use crate::subscription::state::{Binding, Delivery, Notification};
use crate::subscription::topic::Topic;

thread_local! {
    static DRAIN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current thread is delivering callbacks.
fn in_callback() -> bool {
    DRAIN_DEPTH.with(|depth| depth.get() > 0)
}

/// Marks the current thread as delivering until dropped.
struct Draining;

impl Draining {
    fn enter() -> Self {
        DRAIN_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Draining
    }
}

impl Drop for Draining {
    fn drop(&mut self) {
        DRAIN_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

type Batch<K> = Vec<Delivery<K>>;

#[derive(Debug)]
struct Queued<K> {
    batch: Batch<K>,
    /// The blocked caller that delivers this batch; `None` for batches
    /// queued from inside a callback.
    turn: Option<Sender<Batch<K>>>,
}

/// Per-topic delivery queue.
#[derive(Debug)]
pub struct Lane<K> {
    owned: bool,
    pending: VecDeque<Queued<K>>,
}

impl<K> Default for Lane<K> {
    fn default() -> Self {
        Self {
            owned: false,
            pending: VecDeque::new(),
        }
    }
}

impl<K> Lane<K> {
    /// Whether some thread is still delivering for this topic.
    pub fn is_busy(&self) -> bool {
        self.owned
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Outcome of [`Dispatcher::enqueue`].
#[derive(Debug)]
pub enum Enqueued<K> {
    /// Nothing to deliver.
    Nothing,
    /// The lane was idle and now belongs to the caller.
    Owner(Batch<K>),
    /// Queued behind the current owner; the caller waits for its turn.
    Waiting(Receiver<Batch<K>>),
    /// Queued from inside a callback; the lane owner delivers it.
    HandedOff,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    failures: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks that panicked.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Queues `batch` on `lane`.
    ///
    /// Must be called while holding the registry guard of the lane's topic.
    pub fn enqueue<K>(&self, lane: &mut Lane<K>, batch: Batch<K>) -> Enqueued<K> {
        if batch.is_empty() {
            return Enqueued::Nothing;
        }

        if !lane.owned {
            lane.owned = true;
            return Enqueued::Owner(batch);
        }

        if in_callback() {
            lane.pending.push_back(Queued { batch, turn: None });
            return Enqueued::HandedOff;
        }

        let (turn, wait) = mpsc::channel();
        lane.pending.push_back(Queued {
            batch,
            turn: Some(turn),
        });
        Enqueued::Waiting(wait)
    }

    /// Delivers what [`enqueue`](Self::enqueue) left to the caller, waiting
    /// for its turn first if needed.
    ///
    /// Must be called without holding any registry guard.
    pub fn dispatch<K: Topic>(
        &self,
        registry: &TopicRegistry<K>,
        topic: &K,
        enqueued: Enqueued<K>,
    ) {
        let batch = match enqueued {
            Enqueued::Nothing | Enqueued::HandedOff => return,
            Enqueued::Owner(batch) => batch,
            Enqueued::Waiting(wait) => match wait.recv() {
                Ok(batch) => batch,
                Err(_) => {
                    warn!(?topic, "lane owner went away before handing over");
                    return;
                }
            },
        };

        self.drain(registry, topic, batch);
    }

    fn drain<K: Topic>(&self, registry: &TopicRegistry<K>, topic: &K, first: Batch<K>) {
        let _draining = Draining::enter();
        let mut batch = first;

        loop {
            for delivery in batch {
                self.deliver(topic, delivery);
            }

            let next = {
                let Some(mut slot) = registry.get_mut(topic) else {
                    return;
                };
                match slot.lane.pending.pop_front() {
                    None => {
                        slot.lane.owned = false;
                        None
                    }
                    Some(Queued { batch, turn: None }) => Some(batch),
                    // The lane stays owned; ownership moves to the waiting caller.
                    Some(Queued {
                        batch,
                        turn: Some(turn),
                    }) => match turn.send(batch) {
                        Ok(()) => {
                            trace!(?topic, "lane handed to waiting caller");
                            return;
                        }
                        Err(SendError(batch)) => Some(batch),
                    },
                }
            };

            match next {
                Some(queued) => batch = queued,
                None => {
                    registry.remove_if_idle(topic);
                    return;
                }
            }
        }
    }

    fn deliver<K: Topic>(&self, topic: &K, delivery: Delivery<K>) {
        let result = catch_unwind(AssertUnwindSafe(|| match &delivery {
            Delivery::Listener {
                listener,
                notification,
            } => {
                let Some(target) = listener.upgrade() else {
                    trace!(?topic, ?listener, "listener dropped, skipping delivery");
                    return;
                };
                trace!(?topic, ?listener, ?notification, "delivering");
                match notification {
                    Notification::State(state) => target.state_changed(topic, *state),
                    Notification::Source { attached, source } => {
                        target.source_changed(topic, source, *attached)
                    }
                }
            }
            Delivery::Source {
                source,
                binding,
                listeners,
            } => {
                trace!(?topic, ?source, ?binding, count = listeners.len(), "binding");
                match binding {
                    Binding::Added => source.source().listeners_added(topic, listeners),
                    Binding::Removed => source.source().listeners_removed(topic, listeners),
                }
            }
        }));

        if let Err(panic) = result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                ?topic,
                callback = %delivery_target(&delivery),
                "subscription callback panicked: {}",
                panic_message(&*panic)
            );
        }
    }
}

fn delivery_target<K>(delivery: &Delivery<K>) -> String {
    match delivery {
        Delivery::Listener { listener, .. } => format!("{listener:?}"),
        Delivery::Source { source, .. } => format!("{source:?}"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
