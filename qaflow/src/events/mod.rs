//! Event emission for monitoring circuit transitions, run state
//! changes, cache activity and fallback substitutions.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
