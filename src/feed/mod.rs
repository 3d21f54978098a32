//! Notification feed store.

mod sound;
mod store;

pub use sound::{Silent, SoundCue, TerminalBell};
pub use store::{FeedConfig, FeedSnapshot, NotificationFeed, DEFAULT_FEED_CAPACITY};
