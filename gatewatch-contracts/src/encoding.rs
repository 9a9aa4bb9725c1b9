//! Sample encoding through the prometheus text encoder
//!
//! The encoder writes a HELP/TYPE pair ahead of each family it encodes. The
//! exporter already serves [`header_block`](crate::header_block) for every
//! family, so those lines are dropped here and only samples come out.
//!
//! A [`SampleRegistry`] lives for one render: metrics are registered, set
//! once, encoded and thrown away. Nothing is cumulative across ticks.

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};

use crate::families::Family;

/// Sample lines of `families`, in the order given, newline terminated
pub fn encode_samples(families: &[MetricFamily]) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    let text = String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))?;
    Ok(text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| format!("{line}\n"))
        .collect())
}

/// Unlabelled gauges, one line each, kept in the order given instead of
/// being sorted by name
pub fn encode_gauges(values: &[(Family, f64)]) -> prometheus::Result<String> {
    let mut gathered = Vec::with_capacity(values.len());
    for (family, value) in values {
        let gauge = Gauge::with_opts(family.opts())?;
        gauge.set(*value);
        gathered.extend(gauge.collect());
    }
    encode_samples(&gathered)
}

/// Throwaway registry for one rendered section.
///
/// Families come out sorted by name, samples within a family by label
/// values, and label pairs by label name.
#[derive(Default)]
pub struct SampleRegistry {
    registry: Registry,
}

impl SampleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_vec(&self, family: &Family, labels: &[&str]) -> prometheus::Result<CounterVec> {
        let vec = CounterVec::new(family.opts(), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    }

    pub fn gauge_vec(&self, family: &Family, labels: &[&str]) -> prometheus::Result<GaugeVec> {
        let vec = GaugeVec::new(family.opts(), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    }

    /// Sample lines of everything registered; families without samples
    /// produce nothing
    pub fn encode(&self) -> prometheus::Result<String> {
        encode_samples(&self.registry.gather())
    }
}
