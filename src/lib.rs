//! # statmon - status variable monitoring
//!
//! statmon reads, resets and watches named status variables exposed by
//! pluggable data sources ("monitorables"). Value changes are published as
//! events through an [`EventSink`]; monitoring jobs add event streams tagged
//! with their initiator, either on every change or on a fixed schedule.
//!
//! ## Core Concepts
//!
//! - **PathAddress**: `monitorable_id/status_variable_id`, optionally with `*` wildcards
//! - **StatusVariable**: a typed, timestamped reading
//! - **Monitorable**: a data source owning status variables
//! - **MonitoringJob**: a handle for an update-triggered or time-based reporting job
//! - **MonitorEngine**: the façade tying the registry, notification gate and jobs together
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use statmon::{CollectionMethod, InMemoryMonitorable, InMemoryRegistry, MonitorEngine,
//!     MonitorEngineConfig, StatusVariable};
//!
//! let registry = Arc::new(InMemoryRegistry::new());
//! let monitorable = Arc::new(
//!     InMemoryMonitorable::new("com.acme.pid")
//!         .with_variable(StatusVariable::new("sv.id2", CollectionMethod::StatusInformation, "test")),
//! );
//! registry.register("com.acme.pid", monitorable).unwrap();
//!
//! let (engine, _events) = MonitorEngine::with_event_stream(registry, MonitorEngineConfig::default()).unwrap();
//! let sv = engine.get_status_variable("com.acme.pid/sv.id2").unwrap();
//! assert_eq!(sv.value.to_string(), "test");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod error;
pub mod monitor;
pub mod path;
pub mod registry;
pub mod variable;

// Re-export primary types at crate root for convenience
pub use engine::{MonitorEngine, MonitorEngineConfig};
pub use error::{AddressError, MonitorError, MonitorResult};
pub use monitor::{
    event_channel, ChannelEventSink, EventSink, EventStream, JobId, JobKind, MonitorEvent,
    MonitoringJob, StreamError, TOPIC,
};
pub use path::{PathAddress, MAX_ID_LENGTH, WILDCARD};
pub use registry::{InMemoryMonitorable, InMemoryRegistry, Monitorable, MonitorListener, MonitorableRegistry};
pub use variable::{CollectionMethod, StatusVariable, VariableValue};
