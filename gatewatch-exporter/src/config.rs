use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use gatewatch_contracts::DEFAULT_SNAPSHOT_PATH;

/// Variable d'env qui remplace le chemin du fichier de config
pub const CONFIG_ENV: &str = "GATEWATCH_EXPORTER_CONFIG";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExporterConfig {
    pub bind_address: IpAddr, // 0.0.0.0 par défaut
    pub port: u16,
    pub snapshot_path: PathBuf,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9184,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl ExporterConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// `$GATEWATCH_EXPORTER_CONFIG`, sinon `exporter.yaml` dans le dossier courant.
/// Fichier absent, vide ou invalide : config par défaut.
pub async fn load_config() -> ExporterConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "exporter.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> ExporterConfig {
    if !path.exists() {
        info!("📄 Pas de {}, config par défaut", path.display());
        return ExporterConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("⚠️ Lecture de {} impossible : {}, config par défaut", path.display(), e);
            return ExporterConfig::default();
        }
    };
    if txt.trim().is_empty() {
        return ExporterConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("⚠️ Config invalide dans {} : {}", path.display(), e);
        ExporterConfig::default()
    })
}
