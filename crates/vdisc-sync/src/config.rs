use std::fmt;
use std::time::Duration;

use vdisc_catalogue::CatalogueConfig;
use vdisc_scanner::{ApiCredentials, ScanClientConfig};

use crate::gate::DEFAULT_MAX_CONCURRENT;
use crate::preflight::PreflightError;

pub const DEFAULT_JOB_NAME: &str = "hmpps-veracode-discovery";

#[derive(Clone)]
pub struct SyncConfig {
    pub catalogue_url: String,
    pub catalogue_key: String,
    pub catalogue_filter: String,
    pub catalogue_page_size: usize,
    pub scan_key_id: Option<String>,
    pub scan_key_secret: Option<String>,
    pub scan_api_base: String,
    pub scan_results_base: String,
    pub slack_token: Option<String>,
    pub slack_alert_channel: String,
    pub job_name: String,
    pub max_concurrent: usize,
    pub refresh_interval_secs: u64,
    pub health_port: u16,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let catalogue_defaults = CatalogueConfig::default();
        let scan_defaults = ScanClientConfig::default();

        Self {
            catalogue_url: get("SERVICE_CATALOGUE_API_ENDPOINT").unwrap_or(catalogue_defaults.url),
            catalogue_key: get("SERVICE_CATALOGUE_API_KEY").unwrap_or_default(),
            catalogue_filter: get("SC_FILTER").unwrap_or_default(),
            catalogue_page_size: get("SC_PAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(catalogue_defaults.page_size),
            scan_key_id: get("VERACODE_API_KEY_ID"),
            scan_key_secret: get("VERACODE_API_KEY_SECRET"),
            scan_api_base: get("VERACODE_API_BASE").unwrap_or(scan_defaults.api_base),
            scan_results_base: get("VERACODE_RESULTS_BASE").unwrap_or(scan_defaults.results_base),
            slack_token: get("SLACK_BOT_TOKEN"),
            slack_alert_channel: get("SLACK_ALERT_CHANNEL").unwrap_or_default(),
            job_name: get("VDISC_JOB_NAME").unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()),
            max_concurrent: get("VDISC_MAX_CONCURRENT")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            refresh_interval_secs: get("VDISC_REFRESH_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(6 * 60 * 60),
            health_port: get("VDISC_HEALTH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }

    pub fn catalogue_config(&self) -> CatalogueConfig {
        CatalogueConfig {
            url: self.catalogue_url.clone(),
            key: self.catalogue_key.clone(),
            filter: self.catalogue_filter.clone(),
            page_size: self.catalogue_page_size,
            ..Default::default()
        }
    }

    pub fn scan_client_config(&self) -> ScanClientConfig {
        ScanClientConfig {
            api_base: self.scan_api_base.clone(),
            results_base: self.scan_results_base.clone(),
            ..Default::default()
        }
    }

    pub fn scan_credentials(&self) -> Result<ApiCredentials, PreflightError> {
        let key_id = self
            .scan_key_id
            .clone()
            .ok_or(PreflightError::MissingCredential("VERACODE_API_KEY_ID"))?;
        let key_secret = self
            .scan_key_secret
            .clone()
            .ok_or(PreflightError::MissingCredential("VERACODE_API_KEY_SECRET"))?;
        Ok(ApiCredentials::new(key_id, key_secret))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("catalogue_url", &self.catalogue_url)
            .field("catalogue_filter", &self.catalogue_filter)
            .field("catalogue_page_size", &self.catalogue_page_size)
            .field("scan_key_id", &self.scan_key_id)
            .field("scan_api_base", &self.scan_api_base)
            .field("slack_alert_channel", &self.slack_alert_channel)
            .field("job_name", &self.job_name)
            .field("max_concurrent", &self.max_concurrent)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("health_port", &self.health_port)
            .finish_non_exhaustive()
    }
}
