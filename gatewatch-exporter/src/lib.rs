/*!
 * GATEWATCH EXPORTER - Sert le snapshot du collecteur aux scrapers
 *
 * L'exporter n'échantillonne rien lui-même : il relit le fichier publié par
 * le collecteur à chaque requête, scrapes et ticks restent indépendants.
 */

pub mod config;
pub mod error;
pub mod exposition;

pub use config::ExporterConfig;
pub use error::ExpositionError;
pub use exposition::{build_body, build_response, router, ExpositionServer};
