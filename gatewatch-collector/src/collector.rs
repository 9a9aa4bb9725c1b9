//! Tick orchestration
//!
//! One tick runs every step in order: identity build, kernel sampling,
//! tracking table scan, then compose and publish. The reads are blocking
//! file I/O, so collection runs on the blocking pool while the tick loop
//! stays free to notice shutdown. No state survives from one tick to the
//! next apart from the configuration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::flows::{self, Classifier};
use crate::identity::IdentityDirectory;
use crate::sampler;
use crate::snapshot::{self, Snapshot};

/// Collector state: the configuration and what's derived from it once.
/// Cheap to clone, clones share both.
#[derive(Clone)]
pub struct Collector {
    config: Arc<CollectorConfig>,
    classifier: Arc<Classifier>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        config.validate().context("Refusing to start with invalid config")?;
        let classifier = Arc::new(config.classifier());
        Ok(Self {
            config: Arc::new(config),
            classifier,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Gather every enabled family into one snapshot stamped `now`.
    /// Blocks on file reads.
    pub fn collect(&self, now: DateTime<Utc>) -> Snapshot {
        let settings = &self.config.collector;
        let sources = &self.config.sources;
        let families = &self.config.families;
        let hz = settings.clock_ticks_per_second;
        let mut sections = Vec::new();

        if families.cpu {
            let cores = sampler::collect_cpu(&sources.proc_root);
            sections.push(section("cpu", sampler::render_cpu(&cores, hz)));
        }
        if families.memory {
            if let Some(memory) = sampler::collect_memory(&sources.proc_root) {
                sections.push(section("memory", sampler::render_memory(&memory)));
            }
        }
        if families.temperature {
            let sensors = sampler::collect_temperature(&sources.sys_root);
            sections.push(section("temperature", sampler::render_temperature(&sensors)));
        }
        if families.network {
            let interfaces = sampler::collect_interfaces(&sources.proc_root);
            sections.push(section("network", sampler::render_interfaces(&interfaces)));
        }
        if families.processes {
            let processes = sampler::collect_processes(&sources.proc_root);
            sections.push(section(
                "processes",
                sampler::render_processes(&processes, hz, settings.page_size_bytes),
            ));
        }
        if families.flows {
            let directory = IdentityDirectory::build(
                &sources.reservations_path,
                &self.config.network.infrastructure,
            );
            let ledger = flows::collect_flows(&sources.conntrack_path, &self.classifier);
            sections.push(section("flows", flows::render_flows(&ledger, &directory)));
        }

        Snapshot::compose(now, sections)
    }

    /// [`Self::collect`] on the blocking pool, stamped with the current time
    pub async fn collect_blocking(&self) -> Result<Snapshot> {
        let collector = self.clone();
        tokio::task::spawn_blocking(move || collector.collect(Utc::now()))
            .await
            .context("Collection task failed")
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        let path = &self.config.collector.snapshot_path;
        snapshot::publish(path, snapshot)
            .await
            .context("Snapshot publication failed")?;
        debug!("Tick complete: {} samples", snapshot.sample_count());
        Ok(())
    }

    /// Collect and publish once
    pub async fn tick(&self) -> Result<Snapshot> {
        let snapshot = self.collect_blocking().await?;
        self.publish(&snapshot).await?;
        Ok(snapshot)
    }

    /// Tick on the configured interval until `shutdown` resolves, then
    /// withdraw the published snapshot.
    ///
    /// A tick that overruns the interval makes the missed ones be skipped
    /// rather than queued. Shutdown interrupts a collection in progress but
    /// never a publication.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.config.collector.interval_secs);
        info!(
            "⏱️ Collecting every {:?} into {}",
            period,
            self.config.collector.snapshot_path.display()
        );

        drive(
            period,
            shutdown,
            move || self.collect_blocking(),
            move |snapshot| async move {
                if let Err(e) = self.publish(&snapshot).await {
                    error!("{:#}", e);
                }
            },
        )
        .await;

        snapshot::remove(&self.config.collector.snapshot_path)
            .await
            .context("Failed to remove snapshot")?;
        Ok(())
    }
}

/// A rendering failure empties that section only
fn section(name: &str, rendered: Result<String, CollectError>) -> String {
    rendered.unwrap_or_else(|e| {
        warn!("Dropping {} samples: {}", name, e);
        String::new()
    })
}

/// Tick loop: collect then publish on every `period`, until `shutdown`
async fn drive<S, C, CF, P, PF>(period: Duration, shutdown: S, mut collect: C, mut publish: P)
where
    S: Future<Output = ()>,
    C: FnMut() -> CF,
    CF: Future<Output = Result<Snapshot>>,
    P: FnMut(Snapshot) -> PF,
    PF: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        let collected = tokio::select! {
            collected = collect() => collected,
            _ = &mut shutdown => break,
        };
        match collected {
            Ok(snapshot) => publish(snapshot).await,
            Err(e) => error!("{:#}", e),
        }
    }
    info!("🛑 Shutdown requested, stopping collection");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use tokio::time::{sleep, Instant};

    fn config_in(root: &std::path::Path) -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.sources.proc_root = root.join("proc");
        config.sources.sys_root = root.join("sys");
        config.sources.conntrack_path = root.join("proc/net/nf_conntrack");
        config.sources.reservations_path = root.join("reservations");
        config.collector.snapshot_path = root.join("out/metrics.prom");
        config
    }

    fn empty_snapshot() -> Result<Snapshot> {
        Ok(Snapshot::compose(Utc::now(), Vec::new()))
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = CollectorConfig::default();
        config.collector.interval_secs = 0;
        assert!(Collector::new(config).is_err());
    }

    #[test]
    fn test_missing_sources_give_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(config_in(dir.path())).unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let snapshot = collector.collect(now);
        assert_eq!(snapshot.sample_count(), 0);
        assert_eq!(snapshot.generated_at(), now);
    }

    #[test]
    fn test_disabled_families_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let proc_root = dir.path().join("proc");
        std::fs::create_dir_all(&proc_root).unwrap();
        std::fs::write(proc_root.join("stat"), "cpu  1 2 3 4\ncpu0 1 2 3 4\n").unwrap();

        let mut config = config_in(dir.path());
        let collector = Collector::new(config.clone()).unwrap();
        assert_eq!(collector.collect(Utc::now()).sample_count(), 10);

        config.families.cpu = false;
        let collector = Collector::new(config).unwrap();
        assert_eq!(collector.collect(Utc::now()).sample_count(), 0);
    }

    #[tokio::test]
    async fn test_run_removes_snapshot_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.collector.interval_secs = 3600;
        let path: PathBuf = config.collector.snapshot_path.clone();
        let collector = Collector::new(config).unwrap();

        collector.tick().await.unwrap();
        assert!(path.exists());

        // The first interval tick fires immediately, then shutdown wins
        collector
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_skips_missed_ticks() {
        let started = Instant::now();
        let collections = RefCell::new(Vec::new());
        let published = RefCell::new(0);

        // 10s period, the first collection takes 35s, shutdown at 45s
        drive(
            Duration::from_secs(10),
            sleep(Duration::from_secs(45)),
            || {
                let mut collections = collections.borrow_mut();
                collections.push(started.elapsed().as_secs());
                let slow = collections.len() == 1;
                async move {
                    if slow {
                        sleep(Duration::from_secs(35)).await;
                    }
                    empty_snapshot()
                }
            },
            |_| {
                *published.borrow_mut() += 1;
                async {}
            },
        )
        .await;

        // Ticks due at 10, 20 and 30 collapse into one at 35, then back on
        // the 10s grid at 40
        assert_eq!(*collections.borrow(), vec![0, 35, 40]);
        assert_eq!(*published.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_slow_collection() {
        let started = Instant::now();
        let published = RefCell::new(0);

        drive(
            Duration::from_secs(10),
            sleep(Duration::from_secs(5)),
            || async {
                sleep(Duration::from_secs(1000)).await;
                empty_snapshot()
            },
            |_| {
                *published.borrow_mut() += 1;
                async {}
            },
        )
        .await;

        assert_eq!(started.elapsed().as_secs(), 5);
        assert_eq!(*published.borrow(), 0);
    }

    #[tokio::test]
    async fn test_failed_collection_is_not_published() {
        let published = RefCell::new(0);
        let attempts = RefCell::new(0);

        drive(
            Duration::from_secs(3600),
            sleep(Duration::from_millis(50)),
            || {
                *attempts.borrow_mut() += 1;
                async { Err::<Snapshot, _>(anyhow::anyhow!("collection failed")) }
            },
            |_| {
                *published.borrow_mut() += 1;
                async {}
            },
        )
        .await;

        assert_eq!(*attempts.borrow(), 1);
        assert_eq!(*published.borrow(), 0);
    }
}
