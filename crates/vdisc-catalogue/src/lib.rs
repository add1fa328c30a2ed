//! Service catalogue REST client: connection test, paginated reads and record updates.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use vdisc_core::Entity;

pub const CRATE_NAME: &str = "vdisc-catalogue";

pub const COMPONENTS_TABLE: &str = "components";
pub const SCHEDULED_JOBS_TABLE: &str = "scheduled-jobs";

#[derive(Debug, Clone)]
pub struct CatalogueConfig {
    pub url: String,
    pub key: String,
    /// Extra query appended to the components listing, e.g. `&filters[name][$contains]=api`.
    pub filter: String,
    pub page_size: usize,
    pub timeout: Duration,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:1337".to_string(),
            key: String::new(),
            filter: String::new(),
            page_size: 10,
            timeout: Duration::from_secs(10),
        }
    }
}

impl CatalogueConfig {
    pub fn components_endpoint(&self) -> String {
        format!(
            "{COMPONENTS_TABLE}?populate[0]=latest_commit&populate[1]=product&populate[2]=envs{}&pagination[pageSize]={}",
            self.filter,
            self.page_size.max(1)
        )
    }
}

pub fn scheduled_jobs_endpoint(job_name: &str) -> String {
    format!("{SCHEDULED_JOBS_TABLE}?filters[name][$eq]={job_name}")
}

/// Appends a query parameter, using `&` when the endpoint already carries a query.
pub fn with_query_param(endpoint: &str, param: &str) -> String {
    if endpoint.contains('?') {
        format!("{endpoint}&{param}")
    } else {
        format!("{endpoint}?{param}")
    }
}

pub fn page_endpoint(endpoint: &str, page: u64) -> String {
    with_query_param(endpoint, &format!("pagination[page]={page}"))
}

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Catalogue operations the discovery run depends on.
#[async_trait]
pub trait Catalogue: Send + Sync {
    /// Succeeds when the catalogue answers at all; only transport failures count as unreachable.
    async fn test_connection(&self) -> Result<(), CatalogueError>;

    /// Reads every page of `endpoint`. A non-200 on any page fails the whole read.
    async fn get_all_records(&self, endpoint: &str) -> Result<Vec<JsonValue>, CatalogueError>;

    /// PUTs `{data: ...}` to `table/id`; only HTTP 200 is success.
    async fn update(&self, table: &str, id: &str, data: &JsonValue) -> Result<(), CatalogueError>;
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    data: Vec<JsonValue>,
    meta: ListMeta,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u64,
    page_count: u64,
}

#[derive(Debug)]
pub struct ServiceCatalogue {
    client: reqwest::Client,
    url: String,
}

impl ServiceCatalogue {
    pub fn new(config: &CatalogueConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .context("catalogue API key is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .context("building catalogue client")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get_page(&self, endpoint: &str) -> Result<ListPage, CatalogueError> {
        let url = format!("{}/v1/{endpoint}", self.url);
        let resp = self.client.get(&url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(CatalogueError::HttpStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        resp.json::<ListPage>()
            .await
            .map_err(|err| CatalogueError::Decode {
                url,
                reason: err.to_string(),
            })
    }
}

#[async_trait]
impl Catalogue for ServiceCatalogue {
    async fn test_connection(&self) -> Result<(), CatalogueError> {
        info!(url = %self.url, "testing connection to the service catalogue");
        let resp = self.client.head(&self.url).send().await?;
        info!(url = %self.url, status = resp.status().as_u16(), "connected to the service catalogue");
        Ok(())
    }

    async fn get_all_records(&self, endpoint: &str) -> Result<Vec<JsonValue>, CatalogueError> {
        let span = info_span!("catalogue_list", endpoint);
        async move {
            let first = self.get_page(endpoint).await?;
            debug!(page = first.meta.pagination.page, "got result page");
            let page_count = first.meta.pagination.page_count;
            let mut records = first.data;

            for page in 2..=page_count {
                let next = self.get_page(&page_endpoint(endpoint, page)).await?;
                debug!(page = next.meta.pagination.page, "got result page");
                records.extend(next.data);
            }
            Ok(records)
        }
        .instrument(span)
        .await
    }

    async fn update(&self, table: &str, id: &str, data: &JsonValue) -> Result<(), CatalogueError> {
        let url = format!("{}/v1/{table}/{id}", self.url);
        debug!(%url, "uploading record data");
        let resp = self
            .client
            .put(&url)
            .json(&json!({ "data": data }))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(CatalogueError::HttpStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        info!(table, id, "updated catalogue record");
        Ok(())
    }
}

/// Reads every entity behind `endpoint`, or nothing at all.
///
/// A failed page discards the pages already read so a partial set is never processed.
pub async fn try_fetch_entities(
    catalogue: &dyn Catalogue,
    endpoint: &str,
) -> Result<Vec<Entity>, CatalogueError> {
    let records = catalogue.get_all_records(endpoint).await?;
    let total = records.len();
    let entities: Vec<Entity> = records.iter().filter_map(Entity::from_record).collect();
    if entities.len() < total {
        warn!(
            skipped = total - entities.len(),
            endpoint, "skipped catalogue records without an id or name"
        );
    }
    info!(count = entities.len(), endpoint, "read entities from service catalogue");
    Ok(entities)
}

/// Like [`try_fetch_entities`], but a failed read is logged and yields an empty set.
pub async fn fetch_entities(catalogue: &dyn Catalogue, endpoint: &str) -> Vec<Entity> {
    match try_fetch_entities(catalogue, endpoint).await {
        Ok(entities) => entities,
        Err(err) => {
            error!(endpoint, "problem with service catalogue API while reading all records: {err}");
            Vec::new()
        }
    }
}

/// Locates the scheduled-job record whose name exactly equals `job_name`.
pub async fn find_job_record_id(
    catalogue: &dyn Catalogue,
    job_name: &str,
) -> Result<Option<String>, CatalogueError> {
    let records = catalogue
        .get_all_records(&scheduled_jobs_endpoint(job_name))
        .await?;
    Ok(records
        .iter()
        .filter_map(Entity::from_record)
        .find(|record| record.name == job_name)
        .map(|record| record.id))
}
