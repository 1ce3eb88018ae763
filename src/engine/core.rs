//! Shared engine state and the value-change dispatch path.

use std::sync::{Arc, Weak};

use tracing::{trace, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::monitor::events::{EventSink, MonitorEvent};
use crate::monitor::gate::NotificationGate;
use crate::monitor::job::{JobRegistry, MonitoringJob};
use crate::monitor::scheduler::SchedulerHandle;
use crate::path::PathAddress;
use crate::registry::{Monitorable, MonitorListener, MonitorableRegistry};
use crate::variable::StatusVariable;

/// State shared by the façade, job handles and the scheduler thread.
///
/// Jobs and the scheduler hold it weakly; only `MonitorEngine` owns it.
pub(crate) struct EngineCore {
    pub(crate) monitorables: Arc<dyn MonitorableRegistry>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) gate: NotificationGate,
    pub(crate) jobs: JobRegistry,
    pub(crate) timers: SchedulerHandle,
}

impl EngineCore {
    pub(crate) fn new(
        monitorables: Arc<dyn MonitorableRegistry>,
        sink: Arc<dyn EventSink>,
        timers: SchedulerHandle,
    ) -> Self {
        Self {
            monitorables,
            sink,
            gate: NotificationGate::new(),
            jobs: JobRegistry::new(),
            timers,
        }
    }

    /// Deregister `job` and release its timer. Returns false if already stopped.
    pub(crate) fn stop_job(&self, job: &MonitoringJob) -> bool {
        let stopped = self.jobs.deregister(job);
        if stopped && job.kind().is_scheduled() {
            self.timers.cancel(job.id());
        }
        stopped
    }

    /// Stop every job and release their timers. Returns how many were running.
    pub(crate) fn cancel_all(&self) -> usize {
        let cancelled = self.jobs.cancel_all();
        if cancelled > 0 {
            self.timers.purge();
        }
        cancelled
    }

    pub(crate) fn monitorable(&self, monitorable_id: &str) -> MonitorResult<Arc<dyn Monitorable>> {
        self.monitorables
            .monitorable(monitorable_id)
            .ok_or_else(|| MonitorError::unknown_target(monitorable_id))
    }

    /// Resolve a concrete path to its monitorable, checking the variable exists.
    pub(crate) fn resolve(&self, path: &PathAddress) -> MonitorResult<Arc<dyn Monitorable>> {
        let monitorable = self.monitorable(path.monitorable_id())?;
        let known = monitorable
            .status_variable_names()
            .iter()
            .any(|name| name == path.status_variable_id());
        if !known {
            return Err(MonitorError::unknown_target(path.to_string()));
        }
        Ok(monitorable)
    }

    /// Current value of a concrete path, looked up at call time.
    pub(crate) fn read_variable(&self, path: &PathAddress) -> MonitorResult<StatusVariable> {
        self.monitorable(path.monitorable_id())?
            .status_variable(path.status_variable_id())
            .ok_or_else(|| MonitorError::unknown_target(path.to_string()))
    }

    /// Route a pushed value change to the gate and to watching jobs.
    pub(crate) fn status_variable_updated(&self, monitorable_id: &str, variable: &StatusVariable) {
        let path = match PathAddress::concrete(monitorable_id, &variable.id) {
            Ok(path) => path,
            Err(err) => {
                warn!(monitorable = %monitorable_id, variable = %variable.id, error = %err, "update with invalid path ignored");
                return;
            }
        };

        if self.gate.is_notification_enabled(&path) {
            self.sink.post(MonitorEvent::general(&path, variable));
        } else {
            trace!(%path, "general notification suppressed");
        }

        for job in self.jobs.watching(&path) {
            job.on_update(self, &path, variable);
        }
    }
}

/// Listener handle that does not keep the engine alive.
pub(crate) struct EngineListener {
    pub(crate) core: Weak<EngineCore>,
}

impl MonitorListener for EngineListener {
    fn updated(&self, monitorable_id: &str, variable: &StatusVariable) {
        match self.core.upgrade() {
            Some(core) => core.status_variable_updated(monitorable_id, variable),
            None => trace!(monitorable = %monitorable_id, "engine gone, update ignored"),
        }
    }
}
