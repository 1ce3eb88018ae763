//! Notification switches.
//!
//! The gate stores suppressed patterns. A concrete path is suppressed when
//! its exact entry, the `*/<variable>` entry for its variable, or `*/*` is
//! present. Re-enabling a wider pattern removes the narrower entries it
//! covers; re-enabling a narrow entry never lifts a wider one.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use tracing::{debug, error};

use crate::error::{lock_err, MonitorResult};
use crate::path::PathAddress;

#[derive(Debug, Default)]
pub(crate) struct NotificationGate {
    suppressed: RwLock<HashSet<PathAddress>>,
}

impl NotificationGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Suppress (`on == false`) or re-enable (`on == true`) `pattern`.
    pub(crate) fn switch(&self, pattern: &PathAddress, on: bool) -> MonitorResult<()> {
        let mut suppressed = self.suppressed.write().map_err(|_| lock_err("gate.switch"))?;

        if !on {
            suppressed.insert(pattern.clone());
            debug!(%pattern, "notifications disabled");
            return Ok(());
        }

        if pattern.is_global() {
            suppressed.clear();
        } else if pattern.is_monitorable_wildcard() {
            let variable = pattern.status_variable_id();
            suppressed.retain(|p| p.is_global() || p.status_variable_id() != variable);
        } else {
            suppressed.remove(pattern);
        }
        debug!(%pattern, "notifications enabled");
        Ok(())
    }

    /// Whether a general notification for the concrete `path` may be posted.
    pub(crate) fn is_notification_enabled(&self, path: &PathAddress) -> bool {
        let suppressed = self.suppressed.read().unwrap_or_else(|poisoned| {
            error!("notification gate lock poisoned");
            PoisonError::into_inner(poisoned)
        });
        if suppressed.is_empty() {
            return true;
        }

        !(suppressed.contains(path)
            || suppressed.contains(&PathAddress::any_monitorable(path.status_variable_id()))
            || suppressed.contains(&PathAddress::global()))
    }

    /// Suppressed patterns rendered as strings, sorted.
    pub(crate) fn disabled_paths(&self) -> MonitorResult<Vec<String>> {
        let suppressed = self
            .suppressed
            .read()
            .map_err(|_| lock_err("gate.disabled_paths"))?;
        let mut paths: Vec<String> = suppressed.iter().map(ToString::to_string).collect();
        paths.sort();
        Ok(paths)
    }
}
