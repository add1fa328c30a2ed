//! Core data model for catalogue scan discovery runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "vdisc-core";

/// Catalogued component, read once per run and never mutated by workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: JsonValue,
}

impl Entity {
    /// Builds an entity from a catalogue record.
    ///
    /// Both the flat shape (`{documentId, name, ...}`) and the nested shape
    /// (`{id, attributes: {name, ...}}`) are accepted. `documentId` wins over
    /// `id` when both are present. Returns `None` when either key is missing.
    pub fn from_record(record: &JsonValue) -> Option<Self> {
        let id = record
            .get("documentId")
            .and_then(id_string)
            .or_else(|| record.get("id").and_then(id_string))?;

        let attributes = match record.get("attributes") {
            Some(nested @ JsonValue::Object(_)) => nested.clone(),
            _ => record.clone(),
        };
        let name = attributes
            .get("name")
            .and_then(JsonValue::as_str)
            .filter(|name| !name.trim().is_empty())?
            .to_string();

        Some(Self {
            id,
            name,
            attributes,
        })
    }
}

fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scan application whose profile name matched a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMatch {
    pub external_id: String,
    pub results_url: String,
    pub last_scan_date: Option<String>,
}

/// Usable summary report for a matched application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub policy_rules_status: String,
    pub report: JsonValue,
    pub exempt: bool,
}

impl ScanSummary {
    /// Extracts a summary from a raw report payload. A report without a
    /// string `policy_rules_status` is not usable.
    ///
    /// Having a report at all means the component is not exempt.
    pub fn from_report(report: JsonValue) -> Option<Self> {
        let policy_rules_status = report
            .get("policy_rules_status")
            .and_then(JsonValue::as_str)?
            .to_string();
        Some(Self {
            policy_rules_status,
            report,
            exempt: false,
        })
    }
}

/// Fields written back to a component after a complete enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    #[serde(rename = "veracode_results_url")]
    pub results_url: String,
    #[serde(rename = "veracode_last_completed_scan_date")]
    pub last_scan_date: Option<String>,
    #[serde(rename = "veracode_results_summary")]
    pub results_summary: JsonValue,
    #[serde(rename = "veracode_policy_rules_status")]
    pub policy_rules_status: String,
    #[serde(rename = "veracode_exempt")]
    pub exempt: bool,
}

impl EnrichmentResult {
    pub fn merge(scan: ScanMatch, summary: ScanSummary) -> Self {
        Self {
            results_url: scan.results_url,
            last_scan_date: scan.last_scan_date,
            results_summary: summary.report,
            policy_rules_status: summary.policy_rules_status,
            exempt: summary.exempt,
        }
    }
}

/// Terminal status of a run as persisted on the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    Succeeded,
    Errors,
    Failed,
}

impl JobResult {
    /// Result of a run that got past preflight.
    pub fn from_errors(errors: &[String]) -> Self {
        if errors.is_empty() {
            Self::Succeeded
        } else {
            Self::Errors
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Succeeded => "Succeeded",
            Self::Errors => "Errors",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Body written to the job record at the end of every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRunUpdate {
    pub last_scheduled_run: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_run: Option<DateTime<Utc>>,
    pub result: JobResult,
    pub error_details: Vec<String>,
}

impl JobRunUpdate {
    pub fn new(result: JobResult, error_details: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            last_scheduled_run: now,
            last_successful_run: (result == JobResult::Succeeded).then_some(now),
            result,
            error_details,
        }
    }
}

/// Outcome of one run, returned to the caller and exposed on the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub components: usize,
    pub enriched: usize,
    pub no_match: usize,
    pub no_report: usize,
    pub failed: usize,
    pub result: JobResult,
    pub error_details: Vec<String>,
    pub status_persisted: bool,
}
