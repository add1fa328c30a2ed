//! Scanning service client: application lookup by name and summary report retrieval.

pub mod signing;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;
use vdisc_core::{ScanMatch, ScanSummary};

pub use signing::{ApiCredentials, SigningError};

pub const CRATE_NAME: &str = "vdisc-scanner";

#[derive(Debug, Clone)]
pub struct ScanClientConfig {
    pub api_base: String,
    /// Prefix joined to each application's `results_url` before it is written back.
    pub results_base: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ScanClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.veracode.com".to_string(),
            results_base: "https://analysiscenter.veracode.com/auth/index.jsp#".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: "vdisc/0.1".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// The two dependent calls made per component, plus the preflight reachability check.
#[async_trait]
pub trait ScanService: Send + Sync {
    async fn healthcheck(&self) -> Result<(), ScanError>;

    /// Resolves a component name to its scan application. `Ok(None)` means no
    /// application profile carries exactly this name.
    async fn lookup(&self, name: &str) -> Result<Option<ScanMatch>, ScanError>;

    /// Fetches the summary report. `Ok(None)` means a response arrived but did
    /// not hold a usable summary.
    async fn summary_report(&self, external_id: &str) -> Result<Option<ScanSummary>, ScanError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationsPage {
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<EmbeddedApplications>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedApplications {
    #[serde(default)]
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Application {
    pub guid: Option<String>,
    pub profile: Option<Profile>,
    pub results_url: Option<String>,
    pub last_completed_scan_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

/// Picks the first application whose profile name equals `name` exactly.
///
/// A matching profile without a guid is treated as no match.
pub fn find_match(page: &ApplicationsPage, name: &str, results_base: &str) -> Option<ScanMatch> {
    let app = page
        .embedded
        .as_ref()?
        .applications
        .iter()
        .find(|app| {
            app.profile
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .is_some_and(|profile_name| profile_name == name)
        })?;
    let external_id = app.guid.clone()?;
    Some(ScanMatch {
        external_id,
        results_url: format!("{results_base}{}", app.results_url.as_deref().unwrap_or_default()),
        last_scan_date: app.last_completed_scan_date.clone(),
    })
}

#[derive(Debug)]
pub struct VeracodeClient {
    client: reqwest::Client,
    config: ScanClientConfig,
    credentials: ApiCredentials,
}

impl VeracodeClient {
    pub fn new(config: ScanClientConfig, credentials: ApiCredentials) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building scanning service client")?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ScanError> {
        let raw = format!("{}{path}", self.config.api_base.trim_end_matches('/'));
        Url::parse(&raw).map_err(|err| ScanError::InvalidUrl {
            url: raw,
            reason: err.to_string(),
        })
    }

    async fn signed_get(&self, url: Url) -> Result<reqwest::Response, ScanError> {
        let nonce = Uuid::new_v4();
        let header = signing::authorization_header(
            &self.credentials,
            "GET",
            &url,
            Utc::now().timestamp_millis(),
            nonce.as_bytes(),
        )?;
        let resp = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, header)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ScanError::HttpStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ScanService for VeracodeClient {
    async fn healthcheck(&self) -> Result<(), ScanError> {
        let url = self.url("/healthcheck/status")?;
        let resp = self.signed_get(url.clone()).await?;
        // Healthy means exactly 200; other 2xx codes pass signed_get but not this.
        if resp.status() != StatusCode::OK {
            return Err(ScanError::HttpStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        debug!("scanning service connection test successful");
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Result<Option<ScanMatch>, ScanError> {
        let mut url = self.url("/appsec/v1/applications")?;
        url.query_pairs_mut().append_pair("name", name);
        let span = info_span!("scan_lookup", component = name);
        async move {
            let resp = self.signed_get(url.clone()).await?;
            let page: ApplicationsPage = resp.json().await.map_err(|err| ScanError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
            let found = find_match(&page, name, &self.config.results_base);
            if let Some(scan) = &found {
                debug!(guid = %scan.external_id, "found scan application");
            }
            Ok(found)
        }
        .instrument(span)
        .await
    }

    async fn summary_report(&self, external_id: &str) -> Result<Option<ScanSummary>, ScanError> {
        let url = self.url(&format!("/appsec/v2/applications/{external_id}/summary_report"))?;
        let span = info_span!("scan_summary", guid = external_id);
        async move {
            let resp = self.signed_get(url).await?;
            let report: JsonValue = match resp.json().await {
                Ok(report) => report,
                Err(err) => {
                    debug!("unable to extract summary data: {err}");
                    return Ok(None);
                }
            };
            Ok(ScanSummary::from_report(report))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(value: JsonValue) -> ApplicationsPage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn exact_name_match_only() {
        let page = page(json!({"_embedded": {"applications": [
            {"guid": "g-1", "profile": {"name": "Hmpps-Api"}, "results_url": "r1"},
            {"guid": "g-2", "profile": {"name": "hmpps-api-extra"}, "results_url": "r2"}
        ]}}));
        assert!(find_match(&page, "hmpps-api", "https://base#").is_none());
    }

    #[test]
    fn first_match_wins_and_results_url_is_prefixed() {
        let page = page(json!({"_embedded": {"applications": [
            {"guid": "g-1", "profile": {"name": "other"}, "results_url": "r0"},
            {"guid": "g-2", "profile": {"name": "hmpps-api"}, "results_url": "HomeAppProfile:1:2",
             "last_completed_scan_date": "2024-04-30T12:00:00.000Z"},
            {"guid": "g-3", "profile": {"name": "hmpps-api"}, "results_url": "dupe"}
        ]}}));
        let found = find_match(&page, "hmpps-api", "https://base#").expect("match");
        assert_eq!(found.external_id, "g-2");
        assert_eq!(found.results_url, "https://base#HomeAppProfile:1:2");
        assert_eq!(found.last_scan_date.as_deref(), Some("2024-04-30T12:00:00.000Z"));
    }

    #[test]
    fn missing_embedded_list_or_guid_is_no_match() {
        assert!(find_match(&page(json!({})), "x", "").is_none());
        let no_guid = page(json!({"_embedded": {"applications": [{"profile": {"name": "x"}}]}}));
        assert!(find_match(&no_guid, "x", "").is_none());
    }
}
