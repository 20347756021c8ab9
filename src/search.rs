//! Paged asset search.
//!
//! All filters are optional exact matches, compared case-insensitively when
//! the filter columns allow it. A locale filter wins over a geo filter.
//! Geo values that name a grouped business region (`EU`, `UK`, `WW`, ...)
//! are not stored on any row, so they are translated to that region's
//! default locale, or dropped when the region has none.
//!
//! Results are sorted newest occurrence first.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::config::Config;
use crate::normalize::{normalize_geo, normalize_locale, trim_to_none};
use crate::service::AssetService;
use crate::store::FilterMode;

/// Body of `POST search`. `page` is zero-based.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    pub site: Option<String>,
    pub geo: Option<String>,
    pub locale: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    pub id: String,
    pub asset_key: String,
    pub asset_model: Option<String>,
    pub section_path: Option<String>,
    pub section_uri: Option<String>,
    pub interactive_path: Option<String>,
    pub preview_uri: Option<String>,
    pub locale: Option<String>,
    pub site: Option<String>,
    pub geo: Option<String>,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub count: i64,
    pub page: i64,
    pub size: i64,
    pub total_pages: i64,
    pub items: Vec<SearchItem>,
}

/// Column/value pairs after normalization and geo translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFilters {
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    pub site: Option<String>,
    pub geo: Option<String>,
    pub locale: Option<String>,
}

impl ResolvedFilters {
    fn columns(&self) -> Vec<(&'static str, &str)> {
        [
            ("o.tenant", self.tenant.as_deref()),
            ("o.environment", self.environment.as_deref()),
            ("o.project", self.project.as_deref()),
            ("o.site", self.site.as_deref()),
            ("o.geo", self.geo.as_deref()),
            ("o.locale", self.locale.as_deref()),
        ]
        .into_iter()
        .filter_map(|(col, value)| value.map(|v| (col, v)))
        .collect()
    }
}

/// Normalizes the request filters and applies the locale/geo rules.
pub async fn resolve_filters(
    service: &AssetService,
    request: &SearchRequest,
) -> Result<ResolvedFilters> {
    let locale = trim_to_none(request.locale.as_deref())
        .map(|raw| normalize_locale(&raw).unwrap_or(raw));
    let raw_geo = trim_to_none(request.geo.as_deref()).map(|g| g.to_ascii_uppercase());

    let (geo, locale) = match (locale, raw_geo) {
        (Some(locale), _) => (None, Some(locale)),
        (None, None) => (None, None),
        (None, Some(geo)) => {
            let grouping = service.regions().grouping();
            if let Some(country) = grouping.single_country(&geo) {
                (Some(country), None)
            } else if grouping.is_bucket(&geo) {
                (None, service.regions().default_locale_for_geo(&geo).await?)
            } else {
                (normalize_geo(&geo), None)
            }
        }
    };

    Ok(ResolvedFilters {
        tenant: trim_to_none(request.tenant.as_deref()),
        environment: trim_to_none(request.environment.as_deref()),
        project: trim_to_none(request.project.as_deref()),
        site: trim_to_none(request.site.as_deref()),
        geo,
        locale,
    })
}

/// Clamps `(page, size)` to `page >= 0` and `1 <= size <= max_page_size`.
pub fn page_bounds(config: &Config, page: Option<i64>, size: Option<i64>) -> (i64, i64) {
    let max = config.search.max_page_size.max(1);
    let size = size
        .unwrap_or(config.search.default_page_size)
        .clamp(1, max);
    (page.unwrap_or(0).max(0), size)
}

pub async fn search_assets(
    service: &AssetService,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    let (page, size) = page_bounds(service.config(), request.page, request.size);
    let empty = SearchResponse {
        count: 0,
        page,
        size,
        total_pages: 0,
        items: Vec::new(),
    };
    if !service.schema_present().await? {
        return Ok(empty);
    }

    let filters = resolve_filters(service, request).await?;
    let columns = filters.columns();
    let mode: FilterMode = service.filter_mode();
    let where_clause = if columns.is_empty() {
        String::new()
    } else {
        let preds: Vec<String> = columns.iter().map(|(col, _)| mode.predicate(col)).collect();
        format!("WHERE {}", preds.join(" AND "))
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM asset_occurrence o JOIN asset_catalog c ON c.id = o.catalog_id {}",
        where_clause
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for (_, value) in &columns {
        count_query = count_query.bind(*value);
    }
    let count = count_query.fetch_one(service.pool()).await?;
    if count == 0 {
        return Ok(empty);
    }

    let select_sql = format!(
        r#"
        SELECT o.id, c.asset_key, c.asset_model, o.section_path, o.section_uri,
               c.interactive_path, c.preview_uri, o.locale, o.site, o.geo, c.alt_text
        FROM asset_occurrence o
        JOIN asset_catalog c ON c.id = o.catalog_id
        {}
        ORDER BY o.created_at DESC, o.id ASC
        LIMIT ? OFFSET ?
        "#,
        where_clause
    );
    let mut select_query = sqlx::query(&select_sql);
    for (_, value) in &columns {
        select_query = select_query.bind(*value);
    }
    let rows = select_query
        .bind(size)
        .bind(page.saturating_mul(size))
        .fetch_all(service.pool())
        .await?;

    let items = rows
        .iter()
        .map(|row| SearchItem {
            id: row.get("id"),
            asset_key: row.get("asset_key"),
            asset_model: row.get("asset_model"),
            section_path: row.get("section_path"),
            section_uri: row.get("section_uri"),
            interactive_path: row.get("interactive_path"),
            preview_uri: row.get("preview_uri"),
            locale: row.get("locale"),
            site: row.get("site"),
            geo: row.get("geo"),
            alt_text: row.get("alt_text"),
        })
        .collect();

    Ok(SearchResponse {
        count,
        page,
        size,
        total_pages: (count + size - 1) / size,
        items,
    })
}

/// CLI entry point for `asset-finder search`.
pub async fn run_search(config: &Config, request: SearchRequest, json: bool) -> Result<()> {
    let service = AssetService::open(config).await?;
    let response = search_assets(&service, &request).await;
    service.close().await;
    let response = response?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, item) in response.items.iter().enumerate() {
        println!(
            "{}. {} [{}] {}",
            response.page * response.size + i as i64 + 1,
            item.asset_key,
            item.locale.as_deref().unwrap_or("-"),
            item.preview_uri
                .as_deref()
                .or(item.interactive_path.as_deref())
                .unwrap_or("(no uri)")
        );
        println!("    id: {}", item.id);
        if let Some(ref alt) = item.alt_text {
            println!("    alt: \"{}\"", alt);
        }
        if let Some(ref section) = item.section_path {
            println!("    section: {}", section);
        }
        println!();
    }
    println!(
        "page {}/{} ({} total)",
        response.page + 1,
        response.total_pages,
        response.count
    );

    Ok(())
}
