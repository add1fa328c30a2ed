use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};
use vdisc_catalogue::Catalogue;
use vdisc_scanner::ScanService;

/// Conditions that stop a run before any component is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightError {
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),
    #[error("unable to reach Service Catalogue: {0}")]
    CatalogueUnreachable(String),
    #[error("unable to connect to the scanning service API: {0}")]
    ScannerUnreachable(String),
}

/// Scanning client, or the reason one could not be built from configuration.
pub type ScannerSlot = Result<Arc<dyn ScanService>, PreflightError>;

/// Checks, in order: catalogue reachable, scanning credentials present, scanning service healthy.
pub async fn check(
    catalogue: &dyn Catalogue,
    scanner: &ScannerSlot,
) -> Result<Arc<dyn ScanService>, PreflightError> {
    catalogue.test_connection().await.map_err(|err| {
        error!("service catalogue connection not OK: {err}");
        PreflightError::CatalogueUnreachable(err.to_string())
    })?;

    let scanner = scanner.clone()?;

    scanner.healthcheck().await.map_err(|err| {
        error!("unable to connect to the scanning service API: {err}");
        PreflightError::ScannerUnreachable(err.to_string())
    })?;
    debug!("preflight checks passed");
    Ok(scanner)
}
