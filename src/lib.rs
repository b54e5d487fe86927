//! # topicsub
//!
//! `topicsub` is a generic, topic-based subscription manager. Many independent
//! consumers subscribe to named topics whose live data may or may not
//! currently be backed by a producer (a *source*), and every subscriber gets
//! a deterministic sequence of state and source events no matter how
//! subscribe, unsubscribe and source changes interleave across threads.
//!
//! ## Core Modules
//!
//! - `subscription`: the manager façade, topic registry, state machine and dispatcher.
//! - `config`: loading manager and logging settings from files and the environment.
//! - `utils`: error types and logging bootstrap.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use topicsub::subscription::{
//!     SourceRef, SubscriptionListener, SubscriptionManager, SubscriptionSource, SubscriptionState,
//! };
//!
//! #[derive(Default)]
//! struct Log(Mutex<Vec<SubscriptionState>>);
//!
//! impl SubscriptionListener<String> for Log {
//!     fn state_changed(&self, _topic: &String, state: SubscriptionState) {
//!         self.0.lock().unwrap().push(state);
//!     }
//!     fn source_changed(&self, _topic: &String, _source: &SourceRef<String>, _attached: bool) {}
//! }
//!
//! struct Driver;
//! impl SubscriptionSource<String> for Driver {}
//!
//! let manager = SubscriptionManager::<String>::new();
//! let log = Arc::new(Log::default());
//! let topic = "pump1.flow".to_string();
//!
//! manager.subscribe(&topic, &log).unwrap();
//! manager.set_source(&topic, Some(SourceRef::new(Arc::new(Driver)))).unwrap();
//! manager.unsubscribe(&topic, &log).unwrap();
//!
//! assert_eq!(
//!     *log.0.lock().unwrap(),
//!     vec![
//!         SubscriptionState::Granted,
//!         SubscriptionState::Connected,
//!         SubscriptionState::Disconnected,
//!     ]
//! );
//! ```

pub mod config;
pub mod subscription;
pub mod utils;

pub use subscription::{
    ListenerRef, SourceRef, SubscriptionListener, SubscriptionManager, SubscriptionSource,
    SubscriptionState, Topic, TopicStatus,
};
pub use utils::error::SubscriptionError;
