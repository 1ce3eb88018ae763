//! Monitorable registry boundary.
//!
//! The engine never owns the data sources it monitors. A host supplies a
//! [`MonitorableRegistry`]; every lookup goes back to it, so monitorables may
//! come and go between calls.

pub mod memory;
mod traits;

pub use memory::{InMemoryMonitorable, InMemoryRegistry};
pub use traits::{Monitorable, MonitorableRegistry, MonitorListener};
