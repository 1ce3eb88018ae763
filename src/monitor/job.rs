//! Monitoring jobs and the registry of running jobs.
//!
//! A job moves through `Created -> Running -> Stopped`. It becomes Running
//! when registered and Stopped when `stop()` is called, when its report
//! budget runs out, or when the engine shuts down. Stopped is terminal.
//!
//! Lock order is always job fire lock, then registry lock. Registry scans
//! never take a job's fire lock; they read the atomic `running` flag, which
//! is only cleared while the registry lock is held. Neither lock is held
//! while reading a monitorable.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::engine::core::EngineCore;
use crate::error::{lock_err, MonitorResult};
use crate::path::PathAddress;
use crate::variable::StatusVariable;

use super::events::MonitorEvent;

/// Unique identifier for a monitoring job.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Fires on every value change of one of its targets.
    UpdateTriggered,
    /// Fires on a fixed-rate timer, reading every target.
    Periodic {
        interval_secs: u32,
    },
    /// Fires once immediately, then on value changes for any remaining budget.
    OneShot,
}

impl JobKind {
    pub(crate) const fn reacts_to_updates(self) -> bool {
        matches!(self, Self::UpdateTriggered | Self::OneShot)
    }

    /// Whether the job owns a scheduler timer.
    pub(crate) const fn is_scheduled(self) -> bool {
        matches!(self, Self::Periodic { .. } | Self::OneShot)
    }

    pub(crate) const fn interval_secs(self) -> u32 {
        match self {
            Self::Periodic { interval_secs } => interval_secs,
            Self::UpdateTriggered | Self::OneShot => 0,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::UpdateTriggered => "UpdateTriggeredJob",
            Self::Periodic { .. } => "PeriodicJob",
            Self::OneShot => "OneShotJob",
        }
    }
}

/// Outcome of a scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Arm the timer again after one interval.
    Rearm,
    /// Do not arm again.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Unbounded,
    Remaining(u32),
}

impl Budget {
    const fn from_report_count(count: u32) -> Self {
        if count == 0 {
            Self::Unbounded
        } else {
            Self::Remaining(count)
        }
    }

    /// Consume one report. Returns true once the budget is exhausted.
    fn consume(&mut self) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Remaining(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        }
    }
}

#[derive(Debug)]
struct FireState {
    budget: Budget,
    ticked: bool,
}

struct JobInner {
    id: JobId,
    initiator: String,
    targets: BTreeSet<PathAddress>,
    kind: JobKind,
    report_count: u32,
    started_at: DateTime<Utc>,
    running: AtomicBool,
    fire: Mutex<FireState>,
    core: Weak<EngineCore>,
}

/// Handle to a monitoring job.
///
/// Handles are cheap to clone and refer to the engine weakly: holding one
/// never keeps the engine alive.
#[derive(Clone)]
pub struct MonitoringJob {
    inner: Arc<JobInner>,
}

impl MonitoringJob {
    pub(crate) fn new(
        core: Weak<EngineCore>,
        initiator: String,
        targets: BTreeSet<PathAddress>,
        kind: JobKind,
        report_count: u32,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::new(),
                initiator,
                targets,
                kind,
                report_count,
                started_at: Utc::now(),
                running: AtomicBool::new(false),
                fire: Mutex::new(FireState {
                    budget: Budget::from_report_count(report_count),
                    ticked: false,
                }),
                core,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Identity attached to every event this job publishes.
    #[must_use]
    pub fn initiator(&self) -> &str {
        &self.inner.initiator
    }

    /// Target paths rendered as `monitorable/variable`, in sorted order.
    #[must_use]
    pub fn status_variable_names(&self) -> Vec<String> {
        self.inner.targets.iter().map(ToString::to_string).collect()
    }

    /// Target paths, in sorted order.
    pub fn target_paths(&self) -> impl Iterator<Item = &PathAddress> {
        self.inner.targets.iter()
    }

    /// Interval in seconds between ticks; 0 for jobs without a repeating timer.
    #[must_use]
    pub fn schedule(&self) -> u32 {
        self.inner.kind.interval_secs()
    }

    /// Configured number of reports, 0 meaning unbounded.
    #[must_use]
    pub fn report_count(&self) -> u32 {
        self.inner.report_count
    }

    /// Reports left before the job stops itself; `None` when unbounded.
    #[must_use]
    pub fn remaining_reports(&self) -> Option<u32> {
        match self.lock_fire().budget {
            Budget::Unbounded => None,
            Budget::Remaining(n) => Some(n),
        }
    }

    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.inner.kind
    }

    /// Always true: remote jobs are not supported.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        true
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stop the job and remove it from the running set.
    ///
    /// Idempotent. A fire already in progress completes its emission; no
    /// further fire happens afterwards.
    pub fn stop(&self) {
        match self.inner.core.upgrade() {
            Some(core) => {
                core.stop_job(self);
            }
            None => {
                self.inner.running.store(false, Ordering::Release);
            }
        }
    }

    /// Whether an update on `path` should be routed to this job.
    pub(crate) fn watches(&self, path: &PathAddress) -> bool {
        self.inner.kind.reacts_to_updates() && self.is_running() && self.inner.targets.contains(path)
    }

    /// Handle a value change on one of the targets.
    pub(crate) fn on_update(&self, core: &EngineCore, path: &PathAddress, variable: &StatusVariable) {
        let mut state = self.lock_fire();
        if !self.is_running() {
            return;
        }
        if self.inner.kind == JobKind::OneShot && !state.ticked {
            return;
        }

        core.sink
            .post(MonitorEvent::for_job(path, variable, &self.inner.initiator));

        if state.budget.consume() {
            self.finish(core);
        }
    }

    /// Collect every target and publish one event per path.
    ///
    /// Targets are read without the fire lock held, so a monitorable may
    /// push changes from inside its read.
    pub(crate) fn tick(&self, core: &EngineCore) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Done;
        }

        let readings: Vec<(&PathAddress, StatusVariable)> = self
            .inner
            .targets
            .iter()
            .filter_map(|path| match core.read_variable(path) {
                Ok(variable) => Some((path, variable)),
                Err(err) => {
                    warn!(job = %self.inner.id, %path, error = %err, "target unavailable, skipped");
                    None
                }
            })
            .collect();

        let mut state = self.lock_fire();
        if !self.is_running() {
            return TickOutcome::Done;
        }
        for (path, variable) in &readings {
            core.sink
                .post(MonitorEvent::for_job(path, variable, &self.inner.initiator));
        }
        state.ticked = true;

        if state.budget.consume() {
            self.finish(core);
            return TickOutcome::Done;
        }
        match self.inner.kind {
            JobKind::Periodic { .. } => TickOutcome::Rearm,
            JobKind::UpdateTriggered | JobKind::OneShot => TickOutcome::Done,
        }
    }

    fn finish(&self, core: &EngineCore) {
        if core.jobs.deregister(self) {
            debug!(job = %self.inner.id, initiator = %self.inner.initiator, "report budget exhausted");
        }
    }

    fn lock_fire(&self) -> MutexGuard<'_, FireState> {
        self.inner.fire.lock().unwrap_or_else(|poisoned| {
            error!(job = %self.inner.id, "job fire lock poisoned");
            PoisonError::into_inner(poisoned)
        })
    }

    fn same_job(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MonitoringJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringJob")
            .field("id", &self.inner.id)
            .field("initiator", &self.inner.initiator)
            .field("targets", &self.inner.targets)
            .field("kind", &self.inner.kind)
            .field("report_count", &self.inner.report_count)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for MonitoringJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{initiator='{}', paths=[{}], schedule={}, count={}}}",
            self.inner.kind.label(),
            self.inner.initiator,
            self.status_variable_names().join(", "),
            self.schedule(),
            self.inner.report_count
        )
    }
}

/// The authoritative set of running jobs, in start order.
#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
    jobs: Mutex<Vec<MonitoringJob>>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark `job` running and add it.
    pub(crate) fn register(&self, job: &MonitoringJob) -> MonitorResult<()> {
        let mut jobs = self.jobs.lock().map_err(|_| lock_err("jobs.register"))?;
        job.inner.running.store(true, Ordering::Release);
        jobs.push(job.clone());
        debug!(job = %job.id(), summary = %job, "job started");
        Ok(())
    }

    /// Mark `job` stopped and remove it. Returns false if it was already stopped.
    pub(crate) fn deregister(&self, job: &MonitoringJob) -> bool {
        let mut jobs = self.lock("jobs.deregister");
        let was_running = job.inner.running.swap(false, Ordering::AcqRel);
        jobs.retain(|j| !j.same_job(job));
        if was_running {
            debug!(job = %job.id(), initiator = %job.initiator(), "job stopped");
        }
        was_running
    }

    pub(crate) fn running(&self) -> MonitorResult<Vec<MonitoringJob>> {
        let jobs = self.jobs.lock().map_err(|_| lock_err("jobs.running"))?;
        Ok(jobs.clone())
    }

    /// Running jobs that react to updates on `path`.
    pub(crate) fn watching(&self, path: &PathAddress) -> Vec<MonitoringJob> {
        let jobs = self.lock("jobs.watching");
        jobs.iter().filter(|j| j.watches(path)).cloned().collect()
    }

    /// Stop and remove every job. Returns how many were running.
    pub(crate) fn cancel_all(&self) -> usize {
        let mut jobs = self.lock("jobs.cancel_all");
        let count = jobs.len();
        for job in jobs.drain(..) {
            job.inner.running.store(false, Ordering::Release);
        }
        count
    }

    fn lock(&self, context: &'static str) -> MutexGuard<'_, Vec<MonitoringJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| {
            error!(context, "job registry lock poisoned");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    use crate::monitor::events::EventSink;
    use crate::monitor::scheduler::control_channel;
    use crate::registry::InMemoryRegistry;
    use crate::variable::CollectionMethod;

    fn targets(raw: &[&str]) -> BTreeSet<PathAddress> {
        raw.iter()
            .map(|p| PathAddress::parse(p, false).unwrap())
            .collect()
    }

    fn detached(kind: JobKind, count: u32) -> MonitoringJob {
        MonitoringJob::new(
            Weak::new(),
            "init1".to_string(),
            targets(&["com.acme.pid/sv.id2", "com.acme.pid/sv.id1"]),
            kind,
            count,
        )
    }

    #[test]
    fn budget_counts_down_to_exhaustion() {
        let mut budget = Budget::from_report_count(2);
        assert!(!budget.consume());
        assert!(budget.consume());

        let mut unbounded = Budget::from_report_count(0);
        for _ in 0..10 {
            assert!(!unbounded.consume());
        }
    }

    #[test]
    fn introspection() {
        let job = detached(JobKind::Periodic { interval_secs: 5 }, 3);
        assert_eq!(job.initiator(), "init1");
        assert_eq!(
            job.status_variable_names(),
            ["com.acme.pid/sv.id1", "com.acme.pid/sv.id2"]
        );
        assert_eq!(job.schedule(), 5);
        assert_eq!(job.report_count(), 3);
        assert_eq!(job.remaining_reports(), Some(3));
        assert!(job.is_local());
        assert!(!job.is_running());

        let unbounded = detached(JobKind::UpdateTriggered, 0);
        assert_eq!(unbounded.schedule(), 0);
        assert_eq!(unbounded.remaining_reports(), None);
    }

    #[test]
    fn display_summarises_job() {
        let job = detached(JobKind::OneShot, 1);
        let rendered = job.to_string();
        assert!(rendered.starts_with("OneShotJob{"));
        assert!(rendered.contains("initiator='init1'"));
        assert!(rendered.contains("com.acme.pid/sv.id1, com.acme.pid/sv.id2"));
        assert!(rendered.contains("count=1"));
    }

    #[test]
    fn registry_register_and_deregister() {
        let registry = JobRegistry::new();
        let a = detached(JobKind::UpdateTriggered, 1);
        let b = detached(JobKind::UpdateTriggered, 1);

        registry.register(&a).unwrap();
        registry.register(&b).unwrap();
        assert!(a.is_running());

        let running = registry.running().unwrap();
        assert_eq!(running.len(), 2);
        assert_eq!(running[0].id(), a.id());
        assert_eq!(running[1].id(), b.id());

        assert!(registry.deregister(&a));
        assert!(!a.is_running());
        assert!(!registry.deregister(&a));
        assert_eq!(registry.running().unwrap().len(), 1);
    }

    #[test]
    fn watching_filters_by_kind_and_target() {
        let registry = JobRegistry::new();
        let update = detached(JobKind::UpdateTriggered, 0);
        let periodic = detached(JobKind::Periodic { interval_secs: 1 }, 0);
        let one_shot = detached(JobKind::OneShot, 0);
        for job in [&update, &periodic, &one_shot] {
            registry.register(job).unwrap();
        }

        let path = PathAddress::parse("com.acme.pid/sv.id1", false).unwrap();
        let watching: Vec<JobId> = registry.watching(&path).iter().map(MonitoringJob::id).collect();
        assert_eq!(watching, [update.id(), one_shot.id()]);

        let other = PathAddress::parse("com.acme.pid/sv.id3", false).unwrap();
        assert!(registry.watching(&other).is_empty());

        registry.deregister(&update);
        assert_eq!(registry.watching(&path).len(), 1);
    }

    #[test]
    fn cancel_all_stops_everything() {
        let registry = JobRegistry::new();
        let a = detached(JobKind::UpdateTriggered, 0);
        let b = detached(JobKind::Periodic { interval_secs: 1 }, 0);
        registry.register(&a).unwrap();
        registry.register(&b).unwrap();

        assert_eq!(registry.cancel_all(), 2);
        assert!(!a.is_running());
        assert!(!b.is_running());
        assert!(registry.running().unwrap().is_empty());
        assert_eq!(registry.cancel_all(), 0);
    }

    struct CountingSink(AtomicUsize);

    impl EventSink for CountingSink {
        fn post(&self, event: MonitorEvent) {
            assert!(event.is_job_event());
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn concurrent_updates_consume_budget_exactly() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let (timers, _inbox) = control_channel(4);
        let core = Arc::new(EngineCore::new(
            Arc::new(InMemoryRegistry::new()),
            sink.clone(),
            timers,
        ));
        let job = MonitoringJob::new(
            Arc::downgrade(&core),
            "init1".to_string(),
            targets(&["com.acme.pid/sv.id1"]),
            JobKind::UpdateTriggered,
            25,
        );
        core.jobs.register(&job).unwrap();

        let path = PathAddress::parse("com.acme.pid/sv.id1", false).unwrap();
        let barrier = Barrier::new(8);
        thread::scope(|s| {
            for t in 0..8 {
                let (core, job, path, barrier) = (&core, &job, &path, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..20 {
                        let sv = StatusVariable::new("sv.id1", CollectionMethod::Gauge, t * 100 + i);
                        for watcher in core.jobs.watching(path) {
                            watcher.on_update(core, path, &sv);
                        }
                    }
                });
            }
        });

        assert_eq!(sink.0.load(Ordering::SeqCst), 25);
        assert!(!job.is_running());
        assert!(core.jobs.running().unwrap().is_empty());
    }

    #[test]
    fn stop_without_engine_only_flips_flag() {
        let job = detached(JobKind::UpdateTriggered, 1);
        JobRegistry::new().register(&job).unwrap();
        assert!(job.is_running());
        job.stop();
        assert!(!job.is_running());
        job.stop();
        assert!(!job.is_running());
    }
}
