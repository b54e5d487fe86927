pub mod dispatch;
pub mod engine;
pub mod listener;
pub mod machine;
pub mod registry;
pub mod state;
pub mod topic;

pub use engine::{SubscriptionManager, TopicStatus};
pub use listener::{ListenerRef, SourceRef, SubscriptionListener, SubscriptionSource};
pub use state::SubscriptionState;
pub use topic::Topic;
