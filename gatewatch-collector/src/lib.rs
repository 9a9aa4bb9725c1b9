//! Gatewatch collector - gateway telemetry from kernel counters
//!
//! Every tick the collector:
//! - Samples CPU, memory, temperature and interface counters
//! - Aggregates per-process CPU, memory and disk figures by command name
//! - Scans the connection-tracking table and attributes bytes to LAN devices
//! - Labels devices through the reservation directory
//! - Publishes one text snapshot with an atomic rename
//!
//! The exporter process serves whatever snapshot was published last.

pub mod collector;
pub mod config;
pub mod error;
pub mod flows;
pub mod identity;
pub mod sampler;
pub mod snapshot;

pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::CollectError;
pub use snapshot::Snapshot;
