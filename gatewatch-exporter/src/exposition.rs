/*!
 * SERVEUR D'EXPOSITION - Sert le dernier snapshot publié en HTTP
 *
 * RÔLE : Répond à chaque requête avec les déclarations de familles, le
 * snapshot publié en dernier par le collecteur et deux lignes de vie.
 *
 * FONCTIONNEMENT :
 * - Une connexion à la fois : accept, HTTP/1 via hyper sans keep-alive, fermeture
 * - Routeur Axum avec une seule route fallback : tout chemin reçoit la même réponse
 * - Le fichier snapshot est relu à chaque requête, jamais mis en cache
 * - Pas de snapshot sur disque : `gatewatch_up 0`, déclarations toujours servies
 *
 * LIMITATION : pas de timeout par requête, un client qui n'envoie jamais la
 * fin de ses en-têtes occupe l'unique slot.
 */

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use gatewatch_contracts::{encode_gauges, families, header_block};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ExporterConfig;
use crate::error::ExpositionError;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Corps complet d'un scrape : déclarations, snapshot, puis up et horodatage
pub fn build_body(snapshot: Option<&str>, now: DateTime<Utc>) -> Result<String, ExpositionError> {
    let mut body = header_block();

    if let Some(text) = snapshot {
        body.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            body.push('\n');
        }
    }

    let up = if snapshot.is_some() { 1.0 } else { 0.0 };
    body.push_str(&encode_gauges(&[
        (families::UP, up),
        (families::EXPORTER_TIMESTAMP, now.timestamp() as f64),
    ])?);
    Ok(body)
}

/// Réponse HTTP d'un scrape ; 500 si l'encodage échoue
pub fn build_response(snapshot: Option<&str>, now: DateTime<Utc>) -> Response {
    match build_body(snapshot, now) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, CONTENT_TYPE), (header::CONNECTION, "close")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("❌ Scrape impossible : {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Contenu actuel du snapshot, `None` si rien n'est publié
pub async fn read_snapshot(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!("⚠️ Lecture du snapshot {} impossible : {}", path.display(), e);
            None
        }
    }
}

/// Handler unique : n'importe quel chemin, n'importe quelle méthode
async fn scrape(State(snapshot_path): State<Arc<PathBuf>>) -> Response {
    let snapshot = read_snapshot(&snapshot_path).await;
    debug!(
        "Scrape (snapshot {})",
        if snapshot.is_some() { "présent" } else { "absent" }
    );
    build_response(snapshot.as_deref(), Utc::now())
}

/// Routeur de l'exporter, état partagé = chemin du snapshot
pub fn router(snapshot_path: PathBuf) -> Router {
    Router::new()
        .fallback(scrape)
        .with_state(Arc::new(snapshot_path))
}

pub struct ExpositionServer {
    listener: TcpListener,
    app: Router,
    snapshot_path: PathBuf,
}

impl ExpositionServer {
    pub async fn bind(config: &ExporterConfig) -> Result<Self, ExpositionError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ExpositionError::Bind { addr, source })?;
        Ok(Self {
            listener,
            app: router(config.snapshot_path.clone()),
            snapshot_path: config.snapshot_path.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ExpositionError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepte une connexion et y répond
    pub async fn serve_one(&self) -> Result<(), ExpositionError> {
        let (stream, peer) = self.listener.accept().await?;
        self.respond(stream, peer).await
    }

    /// Une requête, une réponse, puis hyper ferme la connexion
    async fn respond(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ExpositionError> {
        debug!("Connexion de {}", peer);
        http1::Builder::new()
            .keep_alive(false)
            .serve_connection(TokioIo::new(stream), TowerToHyperService::new(self.app.clone()))
            .await?;
        Ok(())
    }

    /// Sert jusqu'à ce que `shutdown` se résolve. Une connexion en échec est
    /// loggée et la boucle passe à la suivante.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ExpositionError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "🌐 Exposition de {} sur http://{}",
            self.snapshot_path.display(),
            self.local_addr()?
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = self.respond(stream, peer).await {
                                warn!("⚠️ Scrape de {} en échec : {}", peer, e);
                            }
                        }
                        Err(e) => warn!("⚠️ Accept en échec : {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("🛑 Arrêt demandé, fermeture du listener");
                    return Ok(());
                }
            }
        }
    }
}
