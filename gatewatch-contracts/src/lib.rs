//! Exposition contract shared by the Gatewatch collector and exporter
//!
//! Both processes have to agree on:
//! - Metric family names, help text and types
//! - How samples are encoded
//! - Where the snapshot is published

pub mod encoding;
pub mod families;

pub use encoding::{encode_gauges, encode_samples, SampleRegistry};
pub use families::{header_block, Family, MetricKind, FAMILIES};

/// Prefix of every family name.
pub const NAMESPACE: &str = "gatewatch";

/// Where the collector publishes and the exporter reads, unless configured.
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/gatewatch/metrics.prom";
