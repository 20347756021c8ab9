//! Schema creation and explicit repair steps.
//!
//! Every step here is idempotent and runs only when invoked (`init`,
//! `repair-schema`, or test setup); nothing on a read path alters the schema.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::models::SourceType;
use crate::regions;

/// Occurrence columns used as case-insensitive search filters.
pub const FILTER_COLUMNS: &[&str] = &["tenant", "environment", "project", "site", "geo", "locale"];

/// Declared-type check of the filter columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnCheck {
    Compatible,
    Incompatible(Vec<String>),
    Missing,
}

fn occurrence_table_ddl(name: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            id TEXT PRIMARY KEY,
            catalog_id TEXT NOT NULL,
            raw_data_id TEXT NOT NULL,
            source_uri TEXT NOT NULL,
            source_version INTEGER,
            slot_hash TEXT NOT NULL,
            asset_node_path TEXT NOT NULL,
            section_path TEXT,
            section_uri TEXT,
            tenant TEXT,
            environment TEXT,
            project TEXT,
            site TEXT,
            geo TEXT,
            locale TEXT,
            request_metadata_json TEXT NOT NULL DEFAULT '{{}}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source_uri, source_version, slot_hash),
            FOREIGN KEY (catalog_id) REFERENCES asset_catalog(id)
        )
        "#
    )
}

const OCCURRENCE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_asset_occurrence_catalog_id ON asset_occurrence(catalog_id)",
    "CREATE INDEX IF NOT EXISTS idx_asset_occurrence_raw_data_id ON asset_occurrence(raw_data_id)",
    "CREATE INDEX IF NOT EXISTS idx_asset_occurrence_source ON asset_occurrence(source_uri, source_version)",
    "CREATE INDEX IF NOT EXISTS idx_asset_occurrence_filters ON asset_occurrence(tenant, environment, project, site, geo, locale)",
    "CREATE INDEX IF NOT EXISTS idx_asset_occurrence_created_at ON asset_occurrence(created_at DESC)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations_on(pool: &SqlitePool) -> Result<()> {
    // Canonical catalog, one row per content hash
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_catalog (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            asset_key TEXT NOT NULL,
            asset_model TEXT,
            interactive_path TEXT,
            preview_uri TEXT,
            alt_text TEXT,
            accessibility_text TEXT,
            viewports_json TEXT NOT NULL DEFAULT '{}',
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Versioned occurrences
    sqlx::query(&occurrence_table_ddl("asset_occurrence"))
        .execute(pool)
        .await?;

    // Region/locale reference rows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS region_locale_ref (
            id TEXT PRIMARY KEY,
            geo_code TEXT NOT NULL,
            locale_code TEXT NOT NULL,
            display_name TEXT NOT NULL,
            storefront_path TEXT NOT NULL,
            source_type TEXT NOT NULL DEFAULT 'SYNC',
            active INTEGER NOT NULL DEFAULT 1,
            last_seen_at INTEGER NOT NULL,
            seen_count INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_asset_catalog_interactive ON asset_catalog(interactive_path)",
    )
    .execute(pool)
    .await?;
    for ddl in OCCURRENCE_INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_region_locale_ref_geo ON region_locale_ref(geo_code)",
    )
    .execute(pool)
    .await?;

    // Older databases may hold several active rows per locale; collapse them
    // before the partial unique index can be created.
    let now = SystemClock.now_ts();
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    for source in [SourceType::Upload, SourceType::Sync] {
        regions::deactivate_duplicates(&mut tx, source, now).await?;
    }
    tx.commit().await?;

    sqlx::query(regions::ACTIVE_LOCALE_INDEX)
        .execute(pool)
        .await?;

    Ok(())
}

/// Reports whether the filter columns carry TEXT affinity.
pub async fn inspect_filter_columns(pool: &SqlitePool) -> Result<ColumnCheck> {
    let rows = sqlx::query("SELECT name, type FROM pragma_table_info('asset_occurrence')")
        .fetch_all(pool)
        .await?;
    if rows.is_empty() {
        return Ok(ColumnCheck::Missing);
    }

    let mut incompatible = Vec::new();
    for column in FILTER_COLUMNS {
        let declared = rows
            .iter()
            .find(|r| r.get::<String, _>("name").eq_ignore_ascii_case(column))
            .map(|r| r.get::<String, _>("type").to_ascii_uppercase());
        let text_affinity = declared
            .as_deref()
            .is_some_and(|t| t.contains("TEXT") || t.contains("CHAR") || t.contains("CLOB"));
        if !text_affinity {
            incompatible.push(column.to_string());
        }
    }

    if incompatible.is_empty() {
        Ok(ColumnCheck::Compatible)
    } else {
        Ok(ColumnCheck::Incompatible(incompatible))
    }
}

/// Rebuilds `asset_occurrence` with TEXT filter columns when a legacy
/// declaration is found. Runs in one transaction; a failure leaves the
/// original table untouched. Returns the columns that were converted.
pub async fn repair_filter_columns(pool: &SqlitePool) -> Result<Vec<String>> {
    let columns = match inspect_filter_columns(pool).await? {
        ColumnCheck::Compatible | ColumnCheck::Missing => return Ok(Vec::new()),
        ColumnCheck::Incompatible(columns) => columns,
    };

    let select_list = [
        "id",
        "catalog_id",
        "raw_data_id",
        "source_uri",
        "source_version",
        "slot_hash",
        "asset_node_path",
        "section_path",
        "section_uri",
    ]
    .iter()
    .map(|c| c.to_string())
    .chain(
        FILTER_COLUMNS
            .iter()
            .map(|c| format!("CAST({c} AS TEXT) AS {c}")),
    )
    .chain(
        ["request_metadata_json", "created_at", "updated_at"]
            .iter()
            .map(|c| c.to_string()),
    )
    .collect::<Vec<_>>()
    .join(", ");

    let mut tx = pool.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS asset_occurrence_repaired")
        .execute(&mut *tx)
        .await?;
    sqlx::query(&occurrence_table_ddl("asset_occurrence_repaired"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        "INSERT INTO asset_occurrence_repaired SELECT {select_list} FROM asset_occurrence"
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query("DROP TABLE asset_occurrence")
        .execute(&mut *tx)
        .await?;
    sqlx::query("ALTER TABLE asset_occurrence_repaired RENAME TO asset_occurrence")
        .execute(&mut *tx)
        .await?;
    for ddl in OCCURRENCE_INDEXES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(columns)
}
