//! Asset detail by occurrence ID.
//!
//! Joins one occurrence with its catalog entry. Used by both the
//! `asset-finder get` CLI command and `GET /assets/{id}`.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::Row;

use crate::config::Config;
use crate::service::AssetService;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    pub id: String,
    pub catalog_id: String,
    pub raw_data_id: String,
    pub source_uri: String,
    pub source_version: Option<i64>,
    pub asset_key: String,
    pub asset_model: Option<String>,
    pub asset_node_path: String,
    pub section_key: Option<String>,
    pub section_path: Option<String>,
    pub section_uri: Option<String>,
    pub interactive_path: Option<String>,
    pub preview_uri: Option<String>,
    pub alt_text: Option<String>,
    pub accessibility_text: Option<String>,
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    pub site: Option<String>,
    pub geo: Option<String>,
    pub locale: Option<String>,
    pub viewports: Value,
    pub metadata: Value,
    pub request_metadata: Value,
    pub content_hash: String,
    pub slot_hash: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

/// Last non-empty segment of a section path.
pub fn section_key(section_path: &str) -> Option<String> {
    section_path
        .rsplit('/')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_map(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(serde_json::json!({}))
}

/// `Ok(None)` when the id is unknown or the schema is absent.
pub async fn get_asset(service: &AssetService, id: &str) -> Result<Option<AssetDetail>> {
    if !service.schema_present().await? {
        return Ok(None);
    }

    let row = sqlx::query(
        r#"
        SELECT o.id, o.catalog_id, o.raw_data_id, o.source_uri, o.source_version,
               o.slot_hash, o.asset_node_path, o.section_path, o.section_uri,
               o.tenant, o.environment, o.project, o.site, o.geo, o.locale,
               o.request_metadata_json, o.created_at, o.updated_at,
               c.content_hash, c.asset_key, c.asset_model, c.interactive_path,
               c.preview_uri, c.alt_text, c.accessibility_text,
               c.viewports_json, c.metadata_json
        FROM asset_occurrence o
        JOIN asset_catalog c ON c.id = o.catalog_id
        WHERE o.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(service.pool())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let section_path: Option<String> = row.get("section_path");
    let viewports_json: String = row.get("viewports_json");
    let metadata_json: String = row.get("metadata_json");
    let request_json: String = row.get("request_metadata_json");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    Ok(Some(AssetDetail {
        id: row.get("id"),
        catalog_id: row.get("catalog_id"),
        raw_data_id: row.get("raw_data_id"),
        source_uri: row.get("source_uri"),
        source_version: row.get("source_version"),
        asset_key: row.get("asset_key"),
        asset_model: row.get("asset_model"),
        asset_node_path: row.get("asset_node_path"),
        section_key: section_path.as_deref().and_then(section_key),
        section_path,
        section_uri: row.get("section_uri"),
        interactive_path: row.get("interactive_path"),
        preview_uri: row.get("preview_uri"),
        alt_text: row.get("alt_text"),
        accessibility_text: row.get("accessibility_text"),
        tenant: row.get("tenant"),
        environment: row.get("environment"),
        project: row.get("project"),
        site: row.get("site"),
        geo: row.get("geo"),
        locale: row.get("locale"),
        viewports: parse_map(&viewports_json),
        metadata: parse_map(&metadata_json),
        request_metadata: parse_map(&request_json),
        content_hash: row.get("content_hash"),
        slot_hash: row.get("slot_hash"),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
    }))
}

/// CLI entry point for `asset-finder get`.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let service = AssetService::open(config).await?;
    let detail = get_asset(&service, id).await;
    service.close().await;

    let asset = match detail? {
        Some(a) => a,
        None => {
            eprintln!("Error: asset not found: {}", id);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&asset)?);
        return Ok(());
    }

    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("--- Asset ---");
    println!("id:                 {}", asset.id);
    println!("asset_key:          {}", asset.asset_key);
    if let Some(ref model) = asset.asset_model {
        println!("asset_model:        {}", model);
    }
    println!("node_path:          {}", asset.asset_node_path);
    if let Some(ref key) = asset.section_key {
        println!("section:            {} ({})", key, or_dash(&asset.section_path));
    }
    println!("preview_uri:        {}", or_dash(&asset.preview_uri));
    println!("interactive_path:   {}", or_dash(&asset.interactive_path));
    println!("alt_text:           {}", or_dash(&asset.alt_text));
    println!("accessibility_text: {}", or_dash(&asset.accessibility_text));
    println!();

    println!("--- Context ---");
    println!("tenant:             {}", or_dash(&asset.tenant));
    println!("environment:        {}", or_dash(&asset.environment));
    println!("project:            {}", or_dash(&asset.project));
    println!("site:               {}", or_dash(&asset.site));
    println!("geo:                {}", or_dash(&asset.geo));
    println!("locale:             {}", or_dash(&asset.locale));
    println!();

    println!("--- Source ---");
    println!("raw_data_id:        {}", asset.raw_data_id);
    println!("source_uri:         {}", asset.source_uri);
    if let Some(version) = asset.source_version {
        println!("source_version:     {}", version);
    }
    println!("created_at:         {}", asset.created_at);
    println!("viewports:          {}", asset.viewports);
    println!("metadata:           {}", asset.metadata);

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
