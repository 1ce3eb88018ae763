//! Collaborator traits supplied by the hosting environment.

use std::sync::Arc;

use crate::variable::StatusVariable;

/// A data source exposing named status variables.
///
/// Implementations must be safe to call from any thread; the engine calls
/// them from caller threads and from its scheduler thread.
pub trait Monitorable: Send + Sync {
    /// Ids of all status variables, in the monitorable's preferred order.
    fn status_variable_names(&self) -> Vec<String>;

    /// Current value of `id`, or `None` if no such variable exists.
    fn status_variable(&self, id: &str) -> Option<StatusVariable>;

    /// Whether changes to `id` are pushed to the registered listener.
    fn notifies_on_change(&self, id: &str) -> bool;

    /// Reset `id` to its initial value. Returns false when reset is unsupported.
    fn reset_status_variable(&self, id: &str) -> bool;

    /// Human readable description of `id`.
    fn description(&self, _id: &str) -> Option<String> {
        None
    }
}

/// Lookup of the monitorables currently available.
pub trait MonitorableRegistry: Send + Sync {
    /// Ids of every registered monitorable, unfiltered and unordered.
    fn monitorable_ids(&self) -> Vec<String>;

    /// The monitorable registered under `id`.
    fn monitorable(&self, id: &str) -> Option<Arc<dyn Monitorable>>;
}

/// Receiver of status variable changes pushed by monitorables.
pub trait MonitorListener: Send + Sync {
    /// Called after `variable` of `monitorable_id` changed.
    fn updated(&self, monitorable_id: &str, variable: &StatusVariable);
}
