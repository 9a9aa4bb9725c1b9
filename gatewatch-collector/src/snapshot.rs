//! Snapshot composition and atomic publication
//!
//! The snapshot is written next to its final path and renamed over it, so a
//! reader sees either the previous snapshot or the new one, never a torn
//! file. Each publish replaces the previous artifact wholesale.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;
use tracing::debug;

use crate::error::CollectError;

/// Rendered output of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    generated_at: DateTime<Utc>,
    body: String,
}

impl Snapshot {
    /// Concatenate rendered sections under a generation timestamp
    pub fn compose(generated_at: DateTime<Utc>, sections: impl IntoIterator<Item = String>) -> Self {
        Self {
            generated_at,
            body: sections.into_iter().collect(),
        }
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Number of sample lines
    pub fn sample_count(&self) -> usize {
        self.body.lines().count()
    }

    pub fn to_text(&self) -> String {
        format!(
            "# gatewatch snapshot generated_at={} unix={}\n{}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.generated_at.timestamp(),
            self.body
        )
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Write to `<path>.tmp`, then rename over `path`
pub async fn publish(path: &Path, snapshot: &Snapshot) -> Result<(), CollectError> {
    let publish_err = |source| CollectError::Publish {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(publish_err)?;
        }
    }

    let staging = staging_path(path);
    fs::write(&staging, snapshot.to_text()).await.map_err(publish_err)?;
    fs::rename(&staging, path).await.map_err(publish_err)?;

    debug!("Published {} samples to {}", snapshot.sample_count(), path.display());
    Ok(())
}

/// Remove the published snapshot; already gone is fine
pub async fn remove(path: &Path) -> Result<(), CollectError> {
    for target in [staging_path(path), path.to_path_buf()] {
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(CollectError::Publish { path: target, source }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_compose_leads_with_timestamp_comment() {
        let snapshot = Snapshot::compose(
            at(1_700_000_000),
            vec!["a 1\n".to_string(), String::new(), "b 2\n".to_string()],
        );
        assert_eq!(
            snapshot.to_text(),
            "# gatewatch snapshot generated_at=2023-11-14T22:13:20Z unix=1700000000\na 1\nb 2\n"
        );
        assert_eq!(snapshot.sample_count(), 2);
    }

    #[tokio::test]
    async fn test_publish_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/metrics.prom");

        let first = Snapshot::compose(at(1), vec!["old 1\nstale 2\n".to_string()]);
        publish(&path, &first).await.unwrap();
        let second = Snapshot::compose(at(2), vec!["new 3\n".to_string()]);
        publish(&path, &second).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, second.to_text());
        assert!(!text.contains("stale"));
        assert!(!staging_path(&path).exists());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        remove(&path).await.unwrap();

        publish(&path, &Snapshot::compose(at(3), Vec::new())).await.unwrap();
        assert!(path.exists());
        remove(&path).await.unwrap();
        assert!(!path.exists());
    }
}
