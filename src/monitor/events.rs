//! Notification records and the outbound sink boundary.
//!
//! Every notification carries the monitorable id, variable name and the
//! string-rendered value. Job-triggered notifications also carry the job's
//! initiator as `listener_id`; general notifications never do.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::PathAddress;
use crate::variable::StatusVariable;

/// Topic every statmon notification is published on.
pub const TOPIC: &str = "org/osgi/service/monitor";
/// Property key for the monitorable id.
pub const MONITORABLE_PID: &str = "mon.monitorable.pid";
/// Property key for the status variable name.
pub const STATUS_VARIABLE_NAME: &str = "mon.statusvariable.name";
/// Property key for the rendered status variable value.
pub const STATUS_VARIABLE_VALUE: &str = "mon.statusvariable.value";
/// Property key for the initiator of a job-triggered notification.
pub const LISTENER_ID: &str = "mon.listener.id";

/// A published status variable notification.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub monitorable_id: String,
    pub status_variable_name: String,
    pub status_variable_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_id: Option<String>,
}

impl MonitorEvent {
    /// General change notification, gated by the notification switches.
    #[must_use]
    pub fn general(path: &PathAddress, variable: &StatusVariable) -> Self {
        Self::build(path, variable, None)
    }

    /// Notification produced by a monitoring job on behalf of `initiator`.
    #[must_use]
    pub fn for_job(path: &PathAddress, variable: &StatusVariable, initiator: &str) -> Self {
        Self::build(path, variable, Some(initiator.to_string()))
    }

    fn build(path: &PathAddress, variable: &StatusVariable, listener_id: Option<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: TOPIC.to_string(),
            monitorable_id: path.monitorable_id().to_string(),
            status_variable_name: path.status_variable_id().to_string(),
            status_variable_value: variable.value.to_string(),
            listener_id,
        }
    }

    /// True when the event was produced by a monitoring job.
    #[must_use]
    pub const fn is_job_event(&self) -> bool {
        self.listener_id.is_some()
    }

    /// Flat property view keyed by the `mon.*` property names.
    #[must_use]
    pub fn properties(&self) -> BTreeMap<&'static str, String> {
        let mut props = BTreeMap::new();
        props.insert(MONITORABLE_PID, self.monitorable_id.clone());
        props.insert(STATUS_VARIABLE_NAME, self.status_variable_name.clone());
        props.insert(STATUS_VARIABLE_VALUE, self.status_variable_value.clone());
        if let Some(listener) = &self.listener_id {
            props.insert(LISTENER_ID, listener.clone());
        }
        props
    }
}

/// Outbound event transport.
///
/// `post` is called synchronously from caller, monitorable and scheduler
/// threads and must not block for long.
pub trait EventSink: Send + Sync {
    fn post(&self, event: MonitorEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::variable::CollectionMethod;

    fn fixture() -> (PathAddress, StatusVariable) {
        (
            PathAddress::parse("com.acme.pid/sv.id1", false).unwrap(),
            StatusVariable::new("sv.id1", CollectionMethod::CumulativeCounter, 15),
        )
    }

    #[test]
    fn general_event_has_no_listener() {
        let (path, sv) = fixture();
        let ev = MonitorEvent::general(&path, &sv);
        assert_eq!(ev.topic, TOPIC);
        assert_eq!(ev.monitorable_id, "com.acme.pid");
        assert_eq!(ev.status_variable_name, "sv.id1");
        assert_eq!(ev.status_variable_value, "15");
        assert!(!ev.is_job_event());
        assert!(!ev.properties().contains_key(LISTENER_ID));
    }

    #[test]
    fn job_event_carries_initiator() {
        let (path, sv) = fixture();
        let ev = MonitorEvent::for_job(&path, &sv, "init1");
        assert!(ev.is_job_event());
        let props = ev.properties();
        assert_eq!(props[MONITORABLE_PID], "com.acme.pid");
        assert_eq!(props[STATUS_VARIABLE_NAME], "sv.id1");
        assert_eq!(props[STATUS_VARIABLE_VALUE], "15");
        assert_eq!(props[LISTENER_ID], "init1");
    }

    #[test]
    fn general_event_omits_listener_when_serialized() {
        let (path, sv) = fixture();
        let json = serde_json::to_value(MonitorEvent::general(&path, &sv)).unwrap();
        assert!(json.get("listener_id").is_none());
        assert_eq!(json["topic"], TOPIC);
    }
}
