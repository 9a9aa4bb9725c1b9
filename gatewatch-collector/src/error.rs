//! Error taxonomy for the collector
//!
//! Per-item failures (a missing counter file, a malformed line) are absorbed
//! by the component that hits them: it logs and degrades that family to empty.
//! Only configuration and publication errors reach the tick loop.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unparsable {source_name} line: {line:?}")]
    ParseAnomaly {
        source_name: &'static str,
        line: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to encode samples: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("failed to publish snapshot to {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollectError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollectError::SourceUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn anomaly(source_name: &'static str, line: &str) -> Self {
        CollectError::ParseAnomaly {
            source_name,
            line: line.to_string(),
        }
    }
}
