use std::net::SocketAddr;

/// Erreurs du serveur d'exposition
#[derive(Debug, thiserror::Error)]
pub enum ExpositionError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    // Requête malformée, client parti avant la fin de la réponse...
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] prometheus::Error),
}
