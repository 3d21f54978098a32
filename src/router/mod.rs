//! Event routing.
//!
//! The router is the only place that turns transport events into feed
//! entries and update broadcasts. Each recognized event is looked up in a
//! static table, appended to the feed (unless broadcast-only) and then
//! broadcast to every registered update callback.

mod routing;
mod table;

pub use routing::{Attachment, EventRouter, EventSink, LiveSink, RouteOutcome};
pub use table::{lookup, EventSpec, ACTIVITY_UPDATE, EVENT_TABLE};
