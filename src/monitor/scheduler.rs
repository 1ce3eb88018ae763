//! Timer thread for periodic and one-shot jobs.
//!
//! The scheduler owns a min-heap of due times and runs ticks on its own
//! named thread. Jobs are armed and cancelled over a bounded control
//! channel whose sending half lives in the engine core, so stopping a job
//! releases its timer right away instead of at its next due time.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::engine::core::EngineCore;
use crate::error::{MonitorError, MonitorResult};

use super::job::{JobId, MonitoringJob, TickOutcome};

/// Upper bound for one timer period. Longer schedules are clamped.
const MAX_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug)]
enum SchedulerMsg {
    Arm { job: MonitoringJob, delay: Duration },
    Cancel { id: JobId },
    Purge,
    Shutdown,
}

/// Sending half of the scheduler control channel.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerHandle {
    control_tx: Sender<SchedulerMsg>,
}

/// Create the control channel. The receiver goes to [`Scheduler::spawn`].
pub(crate) fn control_channel(capacity: usize) -> (SchedulerHandle, SchedulerInbox) {
    let (control_tx, control_rx) = bounded::<SchedulerMsg>(capacity.max(1));
    (SchedulerHandle { control_tx }, SchedulerInbox { control_rx })
}

/// Receiving half of the scheduler control channel.
#[derive(Debug)]
pub(crate) struct SchedulerInbox {
    control_rx: Receiver<SchedulerMsg>,
}

impl SchedulerHandle {
    /// Arm `job` to tick once `delay` has elapsed.
    pub(crate) fn arm(&self, job: MonitoringJob, delay: Duration) -> MonitorResult<()> {
        self.control_tx
            .send(SchedulerMsg::Arm { job, delay })
            .map_err(|_| MonitorError::internal("scheduler is shut down"))
    }

    /// Release the timer of a stopped job.
    pub(crate) fn cancel(&self, id: JobId) {
        self.notify(SchedulerMsg::Cancel { id });
    }

    /// Release the timers of every stopped job.
    pub(crate) fn purge(&self) {
        self.notify(SchedulerMsg::Purge);
    }

    fn notify(&self, msg: SchedulerMsg) {
        match self.control_tx.try_send(msg) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            // The timer is still dropped at its due time.
            Err(TrySendError::Full(msg)) => debug!(?msg, "scheduler queue full, timer release deferred"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Scheduler {
    control: SchedulerHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the timer thread. One schedule second lasts `unit`.
    pub(crate) fn spawn(
        thread_name: &str,
        unit: Duration,
        core: Weak<EngineCore>,
        control: SchedulerHandle,
        inbox: SchedulerInbox,
    ) -> MonitorResult<Self> {
        let join = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker_loop(unit, core, inbox.control_rx))
            .map_err(|e| MonitorError::internal(format!("failed to spawn scheduler thread: {e}")))?;

        Ok(Self {
            control,
            join: Mutex::new(Some(join)),
        })
    }

    /// Stop the timer thread and wait for it, unless called from that thread.
    pub(crate) fn shutdown(&self) {
        let handle = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        let _ = self.control.control_tx.send(SchedulerMsg::Shutdown);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("scheduler thread panicked");
        }
    }
}

struct Pending {
    due: Instant,
    seq: u64,
    job: MonitoringJob,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

/// Pending timers ordered by `(due, seq)`.
#[derive(Default)]
struct Timers {
    heap: BinaryHeap<Reverse<Pending>>,
    seq: u64,
}

impl Timers {
    fn push(&mut self, job: MonitoringJob, due: Instant) {
        self.seq += 1;
        self.heap.push(Reverse(Pending {
            due,
            seq: self.seq,
            job,
        }));
    }

    fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(p)| p.due)
    }

    fn pop_due(&mut self, now: Instant) -> Option<Pending> {
        if self.next_due()? > now {
            return None;
        }
        self.heap.pop().map(|Reverse(p)| p)
    }

    fn cancel(&mut self, id: JobId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(p)| p.job.id() != id);
        before - self.heap.len()
    }

    fn purge_stopped(&mut self) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(p)| p.job.is_running());
        before - self.heap.len()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Wall-clock length of `schedule` units, clamped to [`MAX_PERIOD`].
fn period(unit: Duration, schedule: u32) -> Duration {
    unit.checked_mul(schedule)
        .map_or(MAX_PERIOD, |p| p.min(MAX_PERIOD))
}

/// Fixed-rate successor of `due`. Falls back to `now + period` when more
/// than a period behind.
fn next_due(due: Instant, now: Instant, period: Duration) -> Option<Instant> {
    match due.checked_add(period) {
        Some(next) if next >= now => Some(next),
        _ => now.checked_add(period),
    }
}

fn worker_loop(unit: Duration, core: Weak<EngineCore>, control_rx: Receiver<SchedulerMsg>) {
    debug!("scheduler thread started");

    let mut timers = Timers::default();

    loop {
        let msg = match timers.next_due() {
            Some(due) => {
                let wait = due.saturating_duration_since(Instant::now());
                match control_rx.recv_timeout(wait) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match control_rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        match msg {
            Some(SchedulerMsg::Arm { job, delay }) => {
                trace!(job = %job.id(), ?delay, "job armed");
                let now = Instant::now();
                timers.push(job, now.checked_add(delay).unwrap_or(now));
            }
            Some(SchedulerMsg::Cancel { id }) => {
                let released = timers.cancel(id);
                trace!(job = %id, released, "timer released");
            }
            Some(SchedulerMsg::Purge) => {
                let released = timers.purge_stopped();
                trace!(released, "stopped timers released");
            }
            Some(SchedulerMsg::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        while let Some(entry) = timers.pop_due(now) {
            let Some(core) = core.upgrade() else {
                debug!("engine dropped, scheduler exiting");
                return;
            };

            if entry.job.tick(&core) == TickOutcome::Rearm {
                let every = period(unit, entry.job.schedule());
                match next_due(entry.due, now, every) {
                    Some(due) => timers.push(entry.job, due),
                    None => warn!(job = %entry.job.id(), period = ?every, "next tick out of range, timer dropped"),
                }
            }
        }
    }

    debug!(dropped_timers = timers.len(), "scheduler thread stopped");
}
