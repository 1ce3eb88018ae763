use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::warn;

use super::events::{EventSink, MonitorEvent};

/// Create a bounded event channel.
///
/// The sink half never blocks: when the stream is full or gone, the event is
/// dropped and counted.
#[must_use]
pub fn event_channel(capacity: usize) -> (ChannelEventSink, EventStream) {
    let (tx, rx) = bounded::<MonitorEvent>(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ChannelEventSink {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventStream { rx, dropped },
    )
}

/// Sending half of [`event_channel`].
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: Sender<MonitorEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink for ChannelEventSink {
    fn post(&self, event: MonitorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) | Err(TrySendError::Disconnected(ev)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    monitorable = %ev.monitorable_id,
                    variable = %ev.status_variable_name,
                    dropped_total = total,
                    "event stream unavailable, notification dropped"
                );
            }
        }
    }
}

/// Receiving half of [`event_channel`].
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<MonitorEvent>,
    dropped: Arc<AtomicU64>,
}

/// Error receiving from an [`EventStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("no event received within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("event stream disconnected")]
    Disconnected,
}

impl EventStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<MonitorEvent, StreamError> {
        self.rx.recv().map_err(|_| StreamError::Disconnected)
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<MonitorEvent, StreamError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StreamError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => StreamError::Disconnected,
        })
    }

    /// Drain every event already queued, without waiting.
    pub fn try_iter_now(&self) -> Vec<MonitorEvent> {
        self.rx.try_iter().collect()
    }

    /// Events dropped because the stream was full or disconnected.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
