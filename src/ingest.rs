//! Extraction entry point.
//!
//! [`extract_and_store`] is what an ingestion pipeline calls once per
//! document. It runs discovery, resolution, catalog upsert, occurrence
//! replacement, and region observation recording, and it never returns an
//! error: every failure is logged with the raw-data id and reported in the
//! returned [`ExtractionReport`], leaving the caller's own work untouched.
//!
//! Extraction uses its own transactions. A failure here cannot roll back
//! anything the caller has written.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discover::discover_assets;
use crate::error::EngineError;
use crate::models::{
    ExtractionCandidate, FieldOrigin, RegionLocaleObservation, RequestMetadata, SourceDocument,
    SourceType,
};
use crate::resolve::{resolve_candidate, DocumentContext};
use crate::service::AssetService;
use crate::store;

/// Outcome class of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ExtractionStatus {
    Completed,
    /// `[extraction] enabled = false`.
    Disabled,
    /// Tables not provisioned; nothing was written.
    SchemaMissing,
    /// Any other failure; the previous occurrence set is left as it was.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub raw_data_id: String,
    #[serde(flatten)]
    pub status: ExtractionStatus,
    /// Asset-like nodes found by discovery.
    pub discovered: usize,
    /// Nodes dropped because they carried no URI or text.
    pub skipped: usize,
    /// Occurrence rows now stored for this source version.
    pub occurrences: usize,
    /// Distinct locales recorded with the region tracker.
    pub observed_locales: usize,
}

impl ExtractionReport {
    fn new(raw_data_id: &str, status: ExtractionStatus) -> Self {
        Self {
            raw_data_id: raw_data_id.to_string(),
            status,
            discovered: 0,
            skipped: 0,
            occurrences: 0,
            observed_locales: 0,
        }
    }
}

/// Runs one extraction. Never fails; see the module docs.
pub async fn extract_and_store(
    service: &AssetService,
    document: &Value,
    source: &SourceDocument,
) -> ExtractionReport {
    if !service.config().extraction.enabled {
        debug!(raw_data_id = %source.raw_data_id, "extraction disabled");
        return ExtractionReport::new(&source.raw_data_id, ExtractionStatus::Disabled);
    }

    match run_extraction(service, document, source).await {
        Ok(report) => {
            info!(
                raw_data_id = %report.raw_data_id,
                source_uri = %source.source_uri,
                version = ?source.source_version,
                discovered = report.discovered,
                occurrences = report.occurrences,
                "assets extracted"
            );
            report
        }
        Err(err) => {
            let status = match err.downcast_ref::<EngineError>() {
                Some(EngineError::SchemaMissing(_)) => ExtractionStatus::SchemaMissing,
                _ => ExtractionStatus::Failed(format!("{:#}", err)),
            };
            if status != ExtractionStatus::SchemaMissing {
                warn!(raw_data_id = %source.raw_data_id, error = %format!("{:#}", err), "asset extraction failed");
            }
            ExtractionReport::new(&source.raw_data_id, status)
        }
    }
}

async fn run_extraction(
    service: &AssetService,
    document: &Value,
    source: &SourceDocument,
) -> Result<ExtractionReport> {
    if source.source_uri.trim().is_empty() {
        return Err(EngineError::InvalidRequest("source URI must not be empty".to_string()).into());
    }
    service.ensure_schema().await?;

    let config = service.config();
    let ctx = DocumentContext::new(document, &source.source_uri, &source.metadata);
    let raw = discover_assets(document, service.rules());

    let mut candidates = Vec::with_capacity(raw.len());
    for node in &raw {
        match resolve_candidate(node, &ctx, service.rules(), &config.defaults) {
            Some(candidate) => candidates.push(candidate),
            None => debug!(path = %node.json_path, "skipping asset node with no uri or text"),
        }
    }

    let now = service.clock().now_ts();
    let request_json =
        serde_json::to_string(&Value::Object(ctx.request.to_map())).map_err(EngineError::from)?;

    let mut occurrences = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let entry = store::upsert_catalog(service.pool(), candidate, now).await?;
        occurrences.push(store::build_occurrence(
            source,
            candidate,
            &entry.id,
            &request_json,
            now,
        ));
    }
    let stored = store::replace_occurrences(service.pool(), source, occurrences).await?;

    // The occurrence set is committed at this point; a tracker failure only
    // costs this run's observations.
    let observed = match service
        .regions()
        .record_observations(SourceType::Upload, &observations(&candidates))
        .await
    {
        Ok(observed) => observed,
        Err(e) => {
            warn!(
                raw_data_id = %source.raw_data_id,
                error = %e,
                "failed to record region observations; continuing"
            );
            0
        }
    };

    Ok(ExtractionReport {
        raw_data_id: source.raw_data_id.clone(),
        status: ExtractionStatus::Completed,
        discovered: raw.len(),
        skipped: raw.len() - candidates.len(),
        occurrences: stored,
        observed_locales: observed,
    })
}

/// Locales that came from the request or the document itself. Configured
/// default locales are not observations.
fn observations(candidates: &[ExtractionCandidate]) -> Vec<RegionLocaleObservation> {
    candidates
        .iter()
        .filter(|c| c.locale_origin != FieldOrigin::Default)
        .filter_map(|c| {
            Some(RegionLocaleObservation {
                geo_code: c.context.geo.clone(),
                locale_code: c.context.locale.clone()?,
                display_name: None,
                storefront_path: None,
            })
        })
        .collect()
}

/// CLI entry point for `asset-finder ingest`.
pub async fn run_ingest(
    config: &Config,
    file: &Path,
    source: SourceDocument,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON document: {}", file.display()))?;

    let service = AssetService::open(config).await?;
    let report = extract_and_store(&service, &document, &source).await;
    service.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Ingest {}", report.raw_data_id);
    println!("  source:      {}", source.source_uri);
    if let Some(version) = source.source_version {
        println!("  version:     {}", version);
    }
    match &report.status {
        ExtractionStatus::Completed => {
            println!("  discovered:  {}", report.discovered);
            println!("  skipped:     {}", report.skipped);
            println!("  occurrences: {}", report.occurrences);
            println!("  locales:     {}", report.observed_locales);
            println!("ok");
        }
        ExtractionStatus::Disabled => println!("extraction disabled"),
        ExtractionStatus::SchemaMissing => {
            println!("schema not provisioned; run `asset-finder init` first")
        }
        ExtractionStatus::Failed(reason) => println!("failed: {}", reason),
    }
    Ok(())
}

/// Convenience for callers that only have the request fields at hand.
pub fn source_document(
    raw_data_id: &str,
    source_uri: &str,
    source_version: Option<i64>,
    metadata: RequestMetadata,
) -> SourceDocument {
    SourceDocument {
        raw_data_id: raw_data_id.to_string(),
        source_uri: source_uri.to_string(),
        source_version,
        metadata,
    }
}
