use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};
use vdisc_catalogue::{Catalogue, COMPONENTS_TABLE};
use vdisc_core::{EnrichmentResult, Entity};
use vdisc_scanner::ScanService;

use crate::errors::ErrorLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrichmentOutcome {
    /// Match and summary found; the component was updated.
    Enriched,
    /// No scan application carries the component's name.
    NoMatch,
    /// Matched, but the summary report was not usable.
    NoReport,
    /// Lookup, detail or write failed; recorded in the error log.
    Failed,
}

/// Per-component unit of work: lookup, summary, single catalogue write.
///
/// Never panics on external failures. Every `Failed` outcome leaves exactly
/// one message in the shared error log.
#[derive(Clone)]
pub struct EnrichmentWorker {
    catalogue: Arc<dyn Catalogue>,
    scanner: Arc<dyn ScanService>,
    errors: ErrorLog,
}

impl EnrichmentWorker {
    pub fn new(catalogue: Arc<dyn Catalogue>, scanner: Arc<dyn ScanService>, errors: ErrorLog) -> Self {
        Self {
            catalogue,
            scanner,
            errors,
        }
    }

    fn fail(&self, message: String) -> EnrichmentOutcome {
        error!("{message}");
        self.errors.push(message);
        EnrichmentOutcome::Failed
    }

    pub async fn enrich(&self, entity: &Entity) -> EnrichmentOutcome {
        let name = entity.name.as_str();
        info!(id = %entity.id, "processing component: {name}");

        let scan = match self.scanner.lookup(name).await {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                info!("no scan application found for {name} - skipping");
                return EnrichmentOutcome::NoMatch;
            }
            Err(err) => return self.fail(format!("error fetching scan data for {name}: {err}")),
        };
        debug!(guid = %scan.external_id, "scan data for {name}: {scan:?}");

        let summary = match self.scanner.summary_report(&scan.external_id).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                info!("no usable summary report for {name} - skipping");
                return EnrichmentOutcome::NoReport;
            }
            Err(err) => {
                return self.fail(format!(
                    "error fetching scan summary report for {name} (guid {}): {err}",
                    scan.external_id
                ))
            }
        };

        let result = EnrichmentResult::merge(scan, summary);
        let data = match serde_json::to_value(&result) {
            Ok(data) => data,
            Err(err) => return self.fail(format!("error serializing scan results for {name}: {err}")),
        };

        match self.catalogue.update(COMPONENTS_TABLE, &entity.id, &data).await {
            Ok(()) => EnrichmentOutcome::Enriched,
            Err(err) => self.fail(format!(
                "error updating {name} ({}) in service catalogue: {err}",
                entity.id
            )),
        }
    }
}
