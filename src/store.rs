//! Catalog and occurrence persistence.
//!
//! Catalog rows are content-addressed: [`upsert_catalog`] is a lock-free
//! get-or-create over the unique `content_hash` index, safe under any number
//! of concurrent writers. Occurrence rows are versioned per
//! `(source_uri, source_version)` and replaced wholesale by
//! [`replace_occurrences`] inside one transaction, so readers see either the
//! previous set or the new one and never a mix.
//!
//! Catalog entries are never deleted here. Once every occurrence pointing at
//! an entry has been replaced away the entry stays behind, unreferenced.

use anyhow::{bail, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::migrate::ColumnCheck;
use crate::models::{
    CatalogEntry, ExtractionCandidate, Occurrence, ResolvedContext, SourceDocument,
};

/// Tables the engine needs before it will read or write anything.
pub const REQUIRED_TABLES: &[&str] = &["asset_catalog", "asset_occurrence", "region_locale_ref"];

/// Cached "are the tables there" check.
///
/// Presence is sticky: once seen, it is never re-queried. Absence is
/// re-checked on every call (so a later `init` is picked up) but only
/// logged the first time.
#[derive(Debug, Default)]
pub struct SchemaProbe {
    present: AtomicBool,
    warned: AtomicBool,
}

impl SchemaProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_present(&self, pool: &SqlitePool) -> Result<bool> {
        if self.present.load(Ordering::Acquire) {
            return Ok(true);
        }
        let missing = missing_tables(pool).await?;
        if missing.is_empty() {
            self.present.store(true, Ordering::Release);
            return Ok(true);
        }
        if !self.warned.swap(true, Ordering::AcqRel) {
            warn!(
                missing = %missing.join(", "),
                "asset tables not provisioned; extraction and queries are disabled until `init` runs"
            );
        }
        Ok(false)
    }

    /// Like [`is_present`](Self::is_present) but fails with
    /// [`EngineError::SchemaMissing`].
    pub async fn ensure(&self, pool: &SqlitePool) -> Result<()> {
        if self.is_present(pool).await? {
            return Ok(());
        }
        let missing = missing_tables(pool).await?;
        Err(EngineError::SchemaMissing(missing.join(", ")).into())
    }
}

async fn missing_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let existing: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await?;
    let existing: HashSet<String> = existing.into_iter().collect();
    Ok(REQUIRED_TABLES
        .iter()
        .filter(|t| !existing.contains(**t))
        .map(|t| t.to_string())
        .collect())
}

/// How filter predicates compare stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// `lower(col) = lower(?)`; requires TEXT filter columns.
    CaseInsensitive,
    /// Plain equality against the normalized filter value. Used while a
    /// legacy column type is still awaiting `repair-schema`.
    Exact,
}

impl FilterMode {
    pub fn from_check(check: &ColumnCheck) -> Self {
        match check {
            ColumnCheck::Incompatible(_) => FilterMode::Exact,
            ColumnCheck::Compatible | ColumnCheck::Missing => FilterMode::CaseInsensitive,
        }
    }

    /// SQL predicate for one qualified column with a single bind slot.
    pub fn predicate(&self, column: &str) -> String {
        match self {
            FilterMode::CaseInsensitive => format!("lower({}) = lower(?)", column),
            FilterMode::Exact => format!("{} = ?", column),
        }
    }
}

const CATALOG_COLUMNS: &str = "id, content_hash, asset_key, asset_model, interactive_path, preview_uri, alt_text, accessibility_text, viewports_json, metadata_json, created_at, updated_at";

const OCCURRENCE_COLUMNS: &str = "id, catalog_id, raw_data_id, source_uri, source_version, slot_hash, asset_node_path, section_path, section_uri, tenant, environment, project, site, geo, locale, request_metadata_json, created_at, updated_at";

pub(crate) fn catalog_from_row(row: &SqliteRow) -> CatalogEntry {
    CatalogEntry {
        id: row.get("id"),
        content_hash: row.get("content_hash"),
        asset_key: row.get("asset_key"),
        asset_model: row.get("asset_model"),
        interactive_path: row.get("interactive_path"),
        preview_uri: row.get("preview_uri"),
        alt_text: row.get("alt_text"),
        accessibility_text: row.get("accessibility_text"),
        viewports_json: row.get("viewports_json"),
        metadata_json: row.get("metadata_json"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) fn occurrence_from_row(row: &SqliteRow) -> Occurrence {
    Occurrence {
        id: row.get("id"),
        catalog_id: row.get("catalog_id"),
        raw_data_id: row.get("raw_data_id"),
        source_uri: row.get("source_uri"),
        source_version: row.get("source_version"),
        slot_hash: row.get("slot_hash"),
        asset_node_path: row.get("asset_node_path"),
        section_path: row.get("section_path"),
        section_uri: row.get("section_uri"),
        context: ResolvedContext {
            tenant: row.get("tenant"),
            environment: row.get("environment"),
            project: row.get("project"),
            site: row.get("site"),
            geo: row.get("geo"),
            locale: row.get("locale"),
        },
        request_metadata_json: row.get("request_metadata_json"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn find_catalog_by_hash(
    pool: &SqlitePool,
    content_hash: &str,
) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM asset_catalog WHERE content_hash = ?",
        CATALOG_COLUMNS
    ))
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(catalog_from_row))
}

pub async fn get_catalog(pool: &SqlitePool, id: &str) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM asset_catalog WHERE id = ?",
        CATALOG_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(catalog_from_row))
}

/// Returns the catalog entry for the candidate's content hash, creating it
/// if this is the first time the content has been seen.
///
/// An existing row is returned unchanged. Concurrent callers racing on the
/// same hash all receive the single row that won the insert.
pub async fn upsert_catalog(
    pool: &SqlitePool,
    candidate: &ExtractionCandidate,
    now: i64,
) -> Result<CatalogEntry> {
    if let Some(existing) = find_catalog_by_hash(pool, &candidate.content_hash).await? {
        return Ok(existing);
    }

    let viewports_json = serde_json::to_string(&Value::Object(candidate.viewports.clone()))
        .map_err(EngineError::from)?;
    let metadata_json = serde_json::to_string(&Value::Object(candidate.metadata.clone()))
        .map_err(EngineError::from)?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO asset_catalog (id, content_hash, asset_key, asset_model, interactive_path, preview_uri, alt_text, accessibility_text, viewports_json, metadata_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&candidate.content_hash)
    .bind(&candidate.asset_key)
    .bind(&candidate.asset_model)
    .bind(&candidate.interactive_path)
    .bind(&candidate.preview_uri)
    .bind(&candidate.alt_text)
    .bind(&candidate.accessibility_text)
    .bind(&viewports_json)
    .bind(&metadata_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match inserted {
        Ok(result) if result.rows_affected() == 0 => {
            debug!(hash = %candidate.content_hash, "catalog insert lost race; re-reading");
        }
        Ok(_) => {}
        // Older schemas may lack the conflict target; fall back to re-read.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!(hash = %candidate.content_hash, "catalog unique violation; re-reading");
        }
        Err(e) => return Err(EngineError::from(e).into()),
    }

    match find_catalog_by_hash(pool, &candidate.content_hash).await? {
        Some(entry) => Ok(entry),
        None => bail!(
            "catalog entry for hash {} vanished after insert",
            candidate.content_hash
        ),
    }
}

/// Builds the occurrence row for one candidate of one source document.
pub fn build_occurrence(
    source: &SourceDocument,
    candidate: &ExtractionCandidate,
    catalog_id: &str,
    request_metadata_json: &str,
    now: i64,
) -> Occurrence {
    Occurrence {
        id: Uuid::new_v4().to_string(),
        catalog_id: catalog_id.to_string(),
        raw_data_id: source.raw_data_id.clone(),
        source_uri: source.source_uri.clone(),
        source_version: source.source_version,
        slot_hash: candidate.slot_hash.clone(),
        asset_node_path: candidate.asset_node_path.clone(),
        section_path: candidate.section_path.clone(),
        section_uri: candidate.section_uri.clone(),
        context: candidate.context.clone(),
        request_metadata_json: request_metadata_json.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Keeps the first occurrence of every slot hash, preserving order.
pub fn dedupe_by_slot(occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
    let mut seen = HashSet::new();
    occurrences
        .into_iter()
        .filter(|o| seen.insert(o.slot_hash.clone()))
        .collect()
}

/// Replaces the occurrence set of one source version with `occurrences`.
///
/// Rows are matched by `(source_uri, source_version)`; when the version is
/// unknown, by raw-data id. Delete and insert share one transaction. Returns
/// the number of rows inserted.
pub async fn replace_occurrences(
    pool: &SqlitePool,
    source: &SourceDocument,
    occurrences: Vec<Occurrence>,
) -> Result<usize> {
    let occurrences = dedupe_by_slot(occurrences);
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    // Remove the previous set for this version
    let deleted = match source.source_version {
        Some(version) => {
            sqlx::query("DELETE FROM asset_occurrence WHERE source_uri = ? AND source_version = ?")
                .bind(&source.source_uri)
                .bind(version)
                .execute(&mut *tx)
                .await?
        }
        None => {
            sqlx::query("DELETE FROM asset_occurrence WHERE raw_data_id = ?")
                .bind(&source.raw_data_id)
                .execute(&mut *tx)
                .await?
        }
    };

    for occ in &occurrences {
        sqlx::query(&format!(
            "INSERT INTO asset_occurrence ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            OCCURRENCE_COLUMNS
        ))
        .bind(&occ.id)
        .bind(&occ.catalog_id)
        .bind(&occ.raw_data_id)
        .bind(&occ.source_uri)
        .bind(occ.source_version)
        .bind(&occ.slot_hash)
        .bind(&occ.asset_node_path)
        .bind(&occ.section_path)
        .bind(&occ.section_uri)
        .bind(&occ.context.tenant)
        .bind(&occ.context.environment)
        .bind(&occ.context.project)
        .bind(&occ.context.site)
        .bind(&occ.context.geo)
        .bind(&occ.context.locale)
        .bind(&occ.request_metadata_json)
        .bind(occ.created_at)
        .bind(occ.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    debug!(
        source_uri = %source.source_uri,
        version = ?source.source_version,
        deleted = deleted.rows_affected(),
        inserted = occurrences.len(),
        "occurrences replaced"
    );
    Ok(occurrences.len())
}

/// Current occurrence set of one source version, in slot order.
pub async fn list_occurrences(
    pool: &SqlitePool,
    source_uri: &str,
    source_version: Option<i64>,
) -> Result<Vec<Occurrence>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM asset_occurrence WHERE source_uri = ? AND source_version IS ? ORDER BY slot_hash",
        OCCURRENCE_COLUMNS
    ))
    .bind(source_uri)
    .bind(source_version)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(occurrence_from_row).collect())
}

pub async fn get_occurrence(pool: &SqlitePool, id: &str) -> Result<Option<Occurrence>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM asset_occurrence WHERE id = ?",
        OCCURRENCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(occurrence_from_row))
}

/// Distinct non-empty sites across all occurrences, sorted.
pub async fn distinct_sites(pool: &SqlitePool) -> Result<Vec<String>> {
    let sites: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT site FROM asset_occurrence WHERE site IS NOT NULL AND trim(site) != '' ORDER BY site",
    )
    .fetch_all(pool)
    .await?;
    Ok(sites)
}

pub async fn count_catalog(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asset_catalog")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
