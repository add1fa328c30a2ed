//! Discovery run orchestration: preflight, bounded enrichment, status reporting.

pub mod alert;
pub mod config;
pub mod errors;
pub mod gate;
pub mod preflight;
pub mod scheduler;
pub mod status;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;
use vdisc_catalogue::{try_fetch_entities, Catalogue, ServiceCatalogue};
use vdisc_core::{Entity, JobResult, RunSummary};
use vdisc_scanner::{ScanService, VeracodeClient};

pub use alert::{Alerter, LogAlerter, SlackAlerter};
pub use config::SyncConfig;
pub use errors::ErrorLog;
pub use preflight::{PreflightError, ScannerSlot};
pub use scheduler::{build_interval_scheduler, run_guarded, RunObserver};
pub use status::JobStatusReporter;
pub use worker::{EnrichmentOutcome, EnrichmentWorker};

pub const CRATE_NAME: &str = "vdisc-sync";

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub job_name: String,
    pub max_concurrent: usize,
    pub components_endpoint: String,
}

impl From<&SyncConfig> for RunSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            job_name: config.job_name.clone(),
            max_concurrent: config.max_concurrent,
            components_endpoint: config.catalogue_config().components_endpoint(),
        }
    }
}

/// Per-invocation state threaded through one run. Nothing here outlives the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub settings: RunSettings,
    pub errors: ErrorLog,
}

impl RunContext {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            settings,
            errors: ErrorLog::new(),
        }
    }

    fn summary(
        &self,
        outcomes: &[EnrichmentOutcome],
        components: usize,
        result: JobResult,
        status_persisted: bool,
    ) -> RunSummary {
        let count = |wanted: EnrichmentOutcome| outcomes.iter().filter(|o| **o == wanted).count();
        RunSummary {
            run_id: self.run_id,
            job_name: self.settings.job_name.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            components,
            enriched: count(EnrichmentOutcome::Enriched),
            no_match: count(EnrichmentOutcome::NoMatch),
            no_report: count(EnrichmentOutcome::NoReport),
            failed: count(EnrichmentOutcome::Failed),
            result,
            error_details: self.errors.snapshot(),
            status_persisted,
        }
    }
}

pub struct DiscoveryPipeline {
    settings: RunSettings,
    catalogue: Arc<dyn Catalogue>,
    scanner: ScannerSlot,
    alerter: Arc<dyn Alerter>,
}

impl DiscoveryPipeline {
    pub fn new(
        settings: RunSettings,
        catalogue: Arc<dyn Catalogue>,
        scanner: ScannerSlot,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        Self {
            settings,
            catalogue,
            scanner,
            alerter,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let catalogue: Arc<dyn Catalogue> =
            Arc::new(ServiceCatalogue::new(&config.catalogue_config())?);
        let scanner: ScannerSlot = match config.scan_credentials() {
            Ok(credentials) => {
                let client = VeracodeClient::new(config.scan_client_config(), credentials)?;
                Ok(Arc::new(client) as Arc<dyn ScanService>)
            }
            Err(missing) => Err(missing),
        };
        let alerter: Arc<dyn Alerter> = match &config.slack_token {
            Some(token) => Arc::new(SlackAlerter::new(
                token.clone(),
                config.slack_alert_channel.clone(),
            )?),
            None => Arc::new(LogAlerter),
        };
        Ok(Self::new(RunSettings::from(config), catalogue, scanner, alerter))
    }

    /// Executes one full run. Status is persisted only after every worker has finished.
    pub async fn run_once(&self) -> RunSummary {
        let ctx = RunContext::new(self.settings.clone());
        let span = info_span!(
            "discovery_run",
            run_id = %ctx.run_id,
            job = %ctx.settings.job_name
        );
        self.run_in_context(ctx).instrument(span).await
    }

    async fn run_in_context(&self, ctx: RunContext) -> RunSummary {
        let scanner = match preflight::check(self.catalogue.as_ref(), &self.scanner).await {
            Ok(scanner) => scanner,
            Err(err) => return self.fail_preflight(ctx, err).await,
        };

        let endpoint = ctx.settings.components_endpoint.as_str();
        let entities = match try_fetch_entities(self.catalogue.as_ref(), endpoint).await {
            Ok(entities) => entities,
            Err(err) => {
                let message = format!("unable to read components from service catalogue: {err}");
                error!("{message}");
                ctx.errors.push(message);
                Vec::new()
            }
        };
        let components = entities.len();
        info!(
            components,
            max_concurrent = ctx.settings.max_concurrent,
            "processing components"
        );

        let worker = EnrichmentWorker::new(self.catalogue.clone(), scanner, ctx.errors.clone());
        let run_id = ctx.run_id;
        let max_concurrent = ctx.settings.max_concurrent;
        let outcomes = gate::run_bounded(entities, max_concurrent, move |entity: Entity| {
            let worker = worker.clone();
            let span = info_span!("enrich", %run_id, component = %entity.name);
            async move { worker.enrich(&entity).await }.instrument(span)
        })
        .await;
        info!(components, "finished all workers");

        if outcomes.len() < components {
            ctx.errors.push(format!(
                "{} component workers did not complete",
                components - outcomes.len()
            ));
        }

        let result = JobResult::from_errors(&ctx.errors.snapshot());
        let persisted = JobStatusReporter::new(self.catalogue.clone(), &ctx.settings.job_name)
            .report(result, ctx.errors.snapshot())
            .await;
        if ctx.errors.is_empty() {
            info!("discovery job completed successfully");
        } else {
            info!("discovery job completed with errors");
        }
        ctx.summary(&outcomes, components, result, persisted)
    }

    async fn fail_preflight(&self, ctx: RunContext, err: PreflightError) -> RunSummary {
        let message = err.to_string();
        error!("{} failed: {message}", ctx.settings.job_name);
        self.alerter
            .alert(&format!("{} failed: {message}", ctx.settings.job_name))
            .await;
        ctx.errors.push(message);

        let persisted = JobStatusReporter::new(self.catalogue.clone(), &ctx.settings.job_name)
            .report(JobResult::Failed, ctx.errors.snapshot())
            .await;
        ctx.summary(&[], 0, JobResult::Failed, persisted)
    }
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = DiscoveryPipeline::from_config(&config)?;
    Ok(pipeline.run_once().await)
}
