//! Live event fan-out

mod hub;

pub use hub::{Hub, SubscriberId, Subscription};
