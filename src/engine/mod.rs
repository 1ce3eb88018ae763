//! statmon engine façade.
//!
//! `MonitorEngine` exposes the read/reset/switch/start-job surface and
//! receives value changes pushed by monitorables. It owns the shared core
//! and the scheduler thread; job handles and listeners refer to it weakly.

pub(crate) mod config;
pub(crate) mod core;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::monitor::events::EventSink;
use crate::monitor::job::{JobKind, MonitoringJob};
use crate::monitor::scheduler::{self, Scheduler};
use crate::monitor::stream::{event_channel, EventStream};
use crate::path::{validate_identifier, PathAddress};
use crate::registry::{Monitorable, MonitorListener, MonitorableRegistry};
use crate::variable::StatusVariable;

pub use config::MonitorEngineConfig;

use self::core::{EngineCore, EngineListener};

/// statmon monitoring engine.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use statmon::{CollectionMethod, InMemoryMonitorable, InMemoryRegistry, MonitorEngine,
///     MonitorEngineConfig, StatusVariable};
///
/// let registry = Arc::new(InMemoryRegistry::new());
/// let monitorable = Arc::new(
///     InMemoryMonitorable::new("com.acme.pid")
///         .with_notifying_variable(StatusVariable::new("sv.id1", CollectionMethod::CumulativeCounter, 0)),
/// );
/// registry.register("com.acme.pid", monitorable.clone()).unwrap();
///
/// let (engine, events) = MonitorEngine::with_event_stream(registry, MonitorEngineConfig::default()).unwrap();
/// monitorable.set_listener(engine.listener());
///
/// let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 1).unwrap();
/// monitorable.set_value("sv.id1", 15).unwrap();
///
/// let delivered = events.try_iter_now();
/// assert_eq!(delivered.len(), 2);
/// assert_eq!(delivered[1].listener_id.as_deref(), Some("init1"));
/// assert!(!job.is_running());
/// ```
pub struct MonitorEngine {
    core: Arc<EngineCore>,
    scheduler: Scheduler,
    config: MonitorEngineConfig,
}

impl MonitorEngine {
    /// Create an engine with the default configuration.
    pub fn new(monitorables: Arc<dyn MonitorableRegistry>, sink: Arc<dyn EventSink>) -> MonitorResult<Self> {
        Self::with_config(monitorables, sink, MonitorEngineConfig::default())
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(
        monitorables: Arc<dyn MonitorableRegistry>,
        sink: Arc<dyn EventSink>,
        config: MonitorEngineConfig,
    ) -> MonitorResult<Self> {
        config.validate()?;

        let (timers, inbox) = scheduler::control_channel(config.scheduler_queue_capacity);
        let core = Arc::new(EngineCore::new(monitorables, sink, timers.clone()));
        let scheduler = Scheduler::spawn(
            &config.scheduler_thread_name,
            config.interval_unit(),
            Arc::downgrade(&core),
            timers,
            inbox,
        )?;

        Ok(Self {
            core,
            scheduler,
            config,
        })
    }

    /// Create an engine publishing into a fresh bounded [`EventStream`].
    pub fn with_event_stream(
        monitorables: Arc<dyn MonitorableRegistry>,
        config: MonitorEngineConfig,
    ) -> MonitorResult<(Self, EventStream)> {
        let (sink, stream) = event_channel(config.event_stream_capacity);
        let engine = Self::with_config(monitorables, Arc::new(sink), config)?;
        Ok((engine, stream))
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &MonitorEngineConfig {
        &self.config
    }

    /// Listener to hand to monitorables. It does not keep the engine alive.
    #[must_use]
    pub fn listener(&self) -> Arc<dyn MonitorListener> {
        Arc::new(EngineListener {
            core: Arc::downgrade(&self.core),
        })
    }

    /// Sorted ids of all addressable monitorables.
    ///
    /// Ids that are not valid identifiers are left out.
    #[must_use]
    pub fn get_monitorable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .core
            .monitorables
            .monitorable_ids()
            .into_iter()
            .filter(|id| match validate_identifier(id) {
                Ok(()) => true,
                Err(err) => {
                    debug!(monitorable = %id, error = %err, "monitorable id excluded");
                    false
                }
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Current value of the variable at `path`.
    pub fn get_status_variable(&self, path: &str) -> MonitorResult<StatusVariable> {
        let path = parse_concrete(path)?;
        self.core.read_variable(&path)
    }

    /// Current values of every variable of `monitorable_id`.
    pub fn get_status_variables(&self, monitorable_id: &str) -> MonitorResult<Vec<StatusVariable>> {
        let monitorable = self.bare_monitorable(monitorable_id)?;
        Ok(monitorable
            .status_variable_names()
            .iter()
            .filter_map(|name| monitorable.status_variable(name))
            .collect())
    }

    /// Variable ids of `monitorable_id`.
    pub fn get_status_variable_names(&self, monitorable_id: &str) -> MonitorResult<Vec<String>> {
        Ok(self.bare_monitorable(monitorable_id)?.status_variable_names())
    }

    /// Description of the variable at `path`, falling back to the variable id.
    pub fn get_description(&self, path: &str) -> MonitorResult<String> {
        let path = parse_concrete(path)?;
        let monitorable = self.core.resolve(&path)?;
        Ok(monitorable
            .description(path.status_variable_id())
            .unwrap_or_else(|| path.status_variable_id().to_string()))
    }

    /// Reset the variable at `path`. Returns false if the monitorable does not support it.
    pub fn reset_status_variable(&self, path: &str) -> MonitorResult<bool> {
        let path = parse_concrete(path)?;
        let monitorable = self.core.resolve(&path)?;
        Ok(monitorable.reset_status_variable(path.status_variable_id()))
    }

    /// Enable (`on`) or disable general notifications for `path`.
    ///
    /// Accepts `mon/var`, `*/var` and `*/*`. A concrete path must name an
    /// existing variable.
    pub fn switch_events(&self, path: &str, on: bool) -> MonitorResult<()> {
        let pattern = PathAddress::parse(path, true)
            .map_err(|source| MonitorError::invalid_address(path, source))?;
        if pattern.is_concrete() {
            self.core.resolve(&pattern)?;
        }
        self.core.gate.switch(&pattern, on)
    }

    /// Currently suppressed patterns, sorted.
    pub fn get_disabled_notification_paths(&self) -> MonitorResult<Vec<String>> {
        self.core.gate.disabled_paths()
    }

    /// Start a job that reports each change of `paths`.
    ///
    /// `report_count` of 0 means the job runs until stopped. Every target must
    /// support change notifications.
    pub fn start_job<S: AsRef<str>>(
        &self,
        initiator: &str,
        paths: &[S],
        report_count: i32,
    ) -> MonitorResult<MonitoringJob> {
        let initiator = check_initiator(initiator)?;
        let report_count = non_negative("report_count", report_count)?;
        let targets = self.resolve_targets(paths)?;

        for path in &targets {
            let monitorable = self.core.monitorable(path.monitorable_id())?;
            if !monitorable.notifies_on_change(path.status_variable_id()) {
                return Err(MonitorError::UnsupportedCapability {
                    path: path.to_string(),
                });
            }
        }

        let job = MonitoringJob::new(
            Arc::downgrade(&self.core),
            initiator,
            targets,
            JobKind::UpdateTriggered,
            report_count,
        );
        self.core.jobs.register(&job)?;
        Ok(job)
    }

    /// Start a job that reads `paths` every `interval_secs` schedule seconds.
    ///
    /// The first reading is taken immediately. An interval of 0 takes one
    /// immediate reading and then reports changes for any remaining budget.
    pub fn start_scheduled_job<S: AsRef<str>>(
        &self,
        initiator: &str,
        paths: &[S],
        report_count: i32,
        interval_secs: i32,
    ) -> MonitorResult<MonitoringJob> {
        let initiator = check_initiator(initiator)?;
        let report_count = non_negative("report_count", report_count)?;
        let interval_secs = non_negative("interval", interval_secs)?;
        let targets = self.resolve_targets(paths)?;

        let kind = if interval_secs == 0 {
            JobKind::OneShot
        } else {
            JobKind::Periodic { interval_secs }
        };

        let job = MonitoringJob::new(Arc::downgrade(&self.core), initiator, targets, kind, report_count);
        self.core.jobs.register(&job)?;
        if let Err(err) = self.core.timers.arm(job.clone(), Duration::ZERO) {
            job.stop();
            return Err(err);
        }
        Ok(job)
    }

    /// Running jobs, in start order.
    pub fn get_running_jobs(&self) -> MonitorResult<Vec<MonitoringJob>> {
        self.core.jobs.running()
    }

    /// Stop every running job.
    pub fn cancel_all_jobs(&self) {
        let cancelled = self.core.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "all jobs cancelled");
        }
    }

    /// Cancel every job and stop the scheduler thread. Idempotent.
    pub fn shutdown(&self) {
        self.cancel_all_jobs();
        self.scheduler.shutdown();
    }

    fn bare_monitorable(&self, monitorable_id: &str) -> MonitorResult<Arc<dyn Monitorable>> {
        validate_identifier(monitorable_id)
            .map_err(|source| MonitorError::invalid_address(monitorable_id, source))?;
        self.core.monitorable(monitorable_id)
    }

    fn resolve_targets<S: AsRef<str>>(&self, paths: &[S]) -> MonitorResult<BTreeSet<PathAddress>> {
        if paths.is_empty() {
            return Err(MonitorError::invalid_argument(
                "paths",
                "at least one status variable path is required",
            ));
        }

        let mut targets = BTreeSet::new();
        for raw in paths {
            let path = parse_concrete(raw.as_ref())?;
            self.core.resolve(&path)?;
            targets.insert(path);
        }
        Ok(targets)
    }
}

impl MonitorListener for MonitorEngine {
    fn updated(&self, monitorable_id: &str, variable: &StatusVariable) {
        self.core.status_variable_updated(monitorable_id, variable);
    }
}

impl Drop for MonitorEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MonitorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl MonitorEngine {
    fn core_weak(&self) -> std::sync::Weak<EngineCore> {
        Arc::downgrade(&self.core)
    }
}

fn parse_concrete(raw: &str) -> MonitorResult<PathAddress> {
    PathAddress::parse(raw, false).map_err(|source| MonitorError::invalid_address(raw, source))
}

fn check_initiator(initiator: &str) -> MonitorResult<String> {
    if initiator.trim().is_empty() {
        return Err(MonitorError::invalid_argument("initiator", "must not be blank"));
    }
    Ok(initiator.to_string())
}

fn non_negative(argument: &str, value: i32) -> MonitorResult<u32> {
    u32::try_from(value)
        .map_err(|_| MonitorError::invalid_argument(argument, format!("must be >= 0, got {value}")))
}
