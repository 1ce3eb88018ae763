//! In-memory registry and monitorable implementations.
//!
//! Useful for embedding statmon in a process that owns its own counters, and
//! as the fixture backend in tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{lock_err, MonitorError, MonitorResult};
use crate::variable::{StatusVariable, VariableValue};

use super::traits::{Monitorable, MonitorListener, MonitorableRegistry};

/// Thread-safe in-memory monitorable registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    monitorables: RwLock<HashMap<String, Arc<dyn Monitorable>>>,
}

impl InMemoryRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `monitorable` under `id`, replacing any previous registration.
    ///
    /// The id is stored as given; malformed ids are filtered by the engine.
    pub fn register(&self, id: impl Into<String>, monitorable: Arc<dyn Monitorable>) -> MonitorResult<()> {
        let id = id.into();
        let mut map = self
            .monitorables
            .write()
            .map_err(|_| lock_err("registry.register"))?;
        debug!(monitorable = %id, "monitorable registered");
        map.insert(id, monitorable);
        Ok(())
    }

    /// Remove the monitorable registered under `id`. Returns whether one was present.
    pub fn unregister(&self, id: &str) -> MonitorResult<bool> {
        let mut map = self
            .monitorables
            .write()
            .map_err(|_| lock_err("registry.unregister"))?;
        let removed = map.remove(id).is_some();
        if removed {
            debug!(monitorable = %id, "monitorable unregistered");
        }
        Ok(removed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.monitorables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("monitorables", &self.monitorable_ids())
            .finish()
    }
}

impl MonitorableRegistry for InMemoryRegistry {
    fn monitorable_ids(&self) -> Vec<String> {
        self.monitorables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn monitorable(&self, id: &str) -> Option<Arc<dyn Monitorable>> {
        self.monitorables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[derive(Debug, Clone)]
struct VariableSlot {
    current: StatusVariable,
    initial: VariableValue,
    notifies: bool,
    resettable: bool,
    description: Option<String>,
}

/// A monitorable backed by an in-memory variable table.
///
/// Value changes made through [`InMemoryMonitorable::set_value`] are pushed to
/// the attached listener for variables that support notifications.
///
/// # Examples
///
/// ```
/// use statmon::{CollectionMethod, InMemoryMonitorable, Monitorable, StatusVariable};
///
/// let monitorable = InMemoryMonitorable::new("com.acme.pid")
///     .with_notifying_variable(StatusVariable::new("sv.id1", CollectionMethod::CumulativeCounter, 0))
///     .with_variable(StatusVariable::new("sv.id2", CollectionMethod::StatusInformation, "test"));
///
/// assert_eq!(monitorable.status_variable_names(), ["sv.id1", "sv.id2"]);
/// assert!(monitorable.notifies_on_change("sv.id1"));
/// assert!(!monitorable.notifies_on_change("sv.id2"));
/// ```
pub struct InMemoryMonitorable {
    id: String,
    slots: RwLock<Vec<VariableSlot>>,
    listener: RwLock<Option<Arc<dyn MonitorListener>>>,
}

impl InMemoryMonitorable {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slots: RwLock::new(Vec::new()),
            listener: RwLock::new(None),
        }
    }

    /// Add a variable that does not push change notifications.
    #[must_use]
    pub fn with_variable(self, variable: StatusVariable) -> Self {
        self.push_slot(variable, false);
        self
    }

    /// Add a variable whose changes are pushed to the listener.
    #[must_use]
    pub fn with_notifying_variable(self, variable: StatusVariable) -> Self {
        self.push_slot(variable, true);
        self
    }

    /// Attach a description to an already added variable.
    #[must_use]
    pub fn with_description(self, id: &str, description: impl Into<String>) -> Self {
        let description = description.into();
        self.update_slot(id, |slot| slot.description = Some(description));
        self
    }

    /// Mark an already added variable as not resettable.
    #[must_use]
    pub fn non_resettable(self, id: &str) -> Self {
        self.update_slot(id, |slot| slot.resettable = false);
        self
    }

    /// The id this monitorable reports its changes under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach the listener that receives change notifications.
    pub fn set_listener(&self, listener: Arc<dyn MonitorListener>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Detach the listener.
    pub fn clear_listener(&self) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Set the value of `id` and notify the listener if the variable supports it.
    pub fn set_value(&self, id: &str, value: impl Into<VariableValue>) -> MonitorResult<StatusVariable> {
        let (snapshot, notifies) = {
            let mut slots = self.slots.write().map_err(|_| lock_err("monitorable.set_value"))?;
            let slot = slots
                .iter_mut()
                .find(|s| s.current.id == id)
                .ok_or_else(|| MonitorError::unknown_target(format!("{}/{id}", self.id)))?;
            slot.current = slot.current.with_value(value);
            (slot.current.clone(), slot.notifies)
        };

        if notifies {
            self.notify(&snapshot);
        }
        Ok(snapshot)
    }

    fn notify(&self, snapshot: &StatusVariable) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.updated(&self.id, snapshot);
        }
    }

    fn push_slot(&self, variable: StatusVariable, notifies: bool) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|s| s.current.id != variable.id);
        slots.push(VariableSlot {
            initial: variable.value.clone(),
            current: variable,
            notifies,
            resettable: true,
            description: None,
        });
    }

    fn update_slot(&self, id: &str, f: impl FnOnce(&mut VariableSlot)) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.iter_mut().find(|s| s.current.id == id) {
            f(slot);
        }
    }

    fn with_slot<T>(&self, id: &str, f: impl FnOnce(&VariableSlot) -> T) -> Option<T> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().find(|s| s.current.id == id).map(f)
    }
}

impl fmt::Debug for InMemoryMonitorable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMonitorable")
            .field("id", &self.id)
            .field("variables", &self.status_variable_names())
            .finish_non_exhaustive()
    }
}

impl Monitorable for InMemoryMonitorable {
    fn status_variable_names(&self) -> Vec<String> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.current.id.clone())
            .collect()
    }

    fn status_variable(&self, id: &str) -> Option<StatusVariable> {
        self.with_slot(id, |s| s.current.clone())
    }

    fn notifies_on_change(&self, id: &str) -> bool {
        self.with_slot(id, |s| s.notifies).unwrap_or(false)
    }

    fn reset_status_variable(&self, id: &str) -> bool {
        let reset = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            match slots.iter_mut().find(|s| s.current.id == id) {
                Some(slot) if slot.resettable => {
                    slot.current = slot.current.with_value(slot.initial.clone());
                    Some((slot.current.clone(), slot.notifies))
                }
                _ => None,
            }
        };

        match reset {
            Some((snapshot, notifies)) => {
                if notifies {
                    self.notify(&snapshot);
                }
                true
            }
            None => false,
        }
    }

    fn description(&self, id: &str) -> Option<String> {
        self.with_slot(id, |s| s.description.clone()).flatten()
    }
}
