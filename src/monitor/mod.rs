//! Notification gating, monitoring jobs and their scheduler.
//!
//! Everything here is in-process. Events leave the crate only through an
//! [`EventSink`]; [`event_channel`] provides a bounded in-memory one.

/// Notification records and the sink boundary.
pub mod events;
/// Suppressed notification patterns.
pub(crate) mod gate;
/// Job handles, variants and the running-job registry.
pub mod job;
/// Timer thread for time-based jobs.
pub(crate) mod scheduler;
/// Channel-backed sink and its receiving stream.
pub mod stream;

pub use events::{EventSink, MonitorEvent, TOPIC};
pub use job::{JobId, JobKind, MonitoringJob};
pub use stream::{event_channel, ChannelEventSink, EventStream, StreamError};
