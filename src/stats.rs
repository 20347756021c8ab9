//! Per-document extraction count.
//!
//! A lightweight health signal for one raw document: how many occurrence
//! rows it currently has, and whether the feature and its schema are in
//! place at all.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::service::AssetService;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionCountResponse {
    pub raw_data_id: String,
    pub source_uri: Option<String>,
    pub source_version: Option<i64>,
    pub asset_count: i64,
    pub feature_enabled: bool,
    pub schema_present: bool,
}

pub async fn extraction_count(
    service: &AssetService,
    raw_data_id: &str,
) -> Result<ExtractionCountResponse> {
    let mut response = ExtractionCountResponse {
        raw_data_id: raw_data_id.to_string(),
        source_uri: None,
        source_version: None,
        asset_count: 0,
        feature_enabled: service.config().extraction.enabled,
        schema_present: service.schema_present().await?,
    };
    if !response.schema_present {
        return Ok(response);
    }

    response.asset_count =
        sqlx::query_scalar("SELECT COUNT(*) FROM asset_occurrence WHERE raw_data_id = ?")
            .bind(raw_data_id)
            .fetch_one(service.pool())
            .await?;

    let latest = sqlx::query(
        r#"
        SELECT source_uri, source_version FROM asset_occurrence
        WHERE raw_data_id = ?
        ORDER BY created_at DESC, source_version DESC
        LIMIT 1
        "#,
    )
    .bind(raw_data_id)
    .fetch_optional(service.pool())
    .await?;
    if let Some(row) = latest {
        response.source_uri = row.get("source_uri");
        response.source_version = row.get("source_version");
    }

    Ok(response)
}

/// CLI entry point for `asset-finder count`.
pub async fn run_count(config: &Config, raw_data_id: &str, json: bool) -> Result<()> {
    let service = AssetService::open(config).await?;
    let response = extraction_count(&service, raw_data_id).await;
    service.close().await;
    let response = response?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Extraction count");
    println!("  raw_data_id: {}", response.raw_data_id);
    println!(
        "  source:      {}",
        response.source_uri.as_deref().unwrap_or("-")
    );
    if let Some(version) = response.source_version {
        println!("  version:     {}", version);
    }
    println!("  assets:      {}", response.asset_count);
    println!(
        "  feature:     {}",
        if response.feature_enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  schema:      {}",
        if response.schema_present { "present" } else { "missing" }
    );
    Ok(())
}
