//! Region/locale reference tracking.
//!
//! Every extraction run reports the (geo, locale) pairs it resolved from
//! document content. They are kept in `region_locale_ref` with recency and
//! frequency counters, one active row per `(source_type, locale_code)`, and
//! served back as the region filter options.
//!
//! Reads go through a [`TimedCache`] stamped by the injected [`Clock`];
//! writes go straight to storage and then reload the cache before returning.

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, TimedCache};
use crate::config::RegionsConfig;
use crate::models::{RegionLocaleObservation, RegionLocaleRef, SourceType};
use crate::normalize::{
    locale_country, normalize_geo, normalize_locale, normalize_storefront_path, normalize_text,
    storefront_path_for_locale, RegionGrouping,
};

/// Served when nothing has been observed yet.
const FALLBACK_LOCALES: &[(&str, &str)] = &[("WW", "en_US"), ("JP", "ja_JP"), ("KR", "ko_KR")];

const MAX_CACHE_TTL_SECS: u64 = 30 * 86_400;

/// One active row per `(source_type, locale_code)`; the observation upsert
/// targets it.
pub const ACTIVE_LOCALE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS uq_region_locale_ref_active \
     ON region_locale_ref(source_type, locale_code) WHERE active = 1";

/// Geo buckets and their locales, as shown in the filter UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOptionsSnapshot {
    pub geos: Vec<String>,
    pub geo_to_locales: BTreeMap<String, Vec<String>>,
}

impl RegionOptionsSnapshot {
    /// Groups `(country, locale)` pairs into business-region buckets.
    pub fn from_pairs<I>(pairs: I, grouping: &RegionGrouping) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut buckets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (country, locale) in pairs {
            let bucket = grouping.bucket_for(&country).to_string();
            buckets.entry(bucket).or_default().insert(locale);
        }
        let geos = grouping.order_buckets(buckets.keys().cloned());
        let geo_to_locales = buckets
            .into_iter()
            .map(|(bucket, locales)| (bucket, locales.into_iter().collect()))
            .collect();
        Self {
            geos,
            geo_to_locales,
        }
    }

    pub fn fallback(grouping: &RegionGrouping) -> Self {
        Self::from_pairs(
            FALLBACK_LOCALES
                .iter()
                .map(|(geo, locale)| (geo.to_string(), locale.to_string())),
            grouping,
        )
    }

    /// First locale of the bucket, if the bucket is known.
    pub fn default_locale_for(&self, geo: &str) -> Option<String> {
        self.geo_to_locales
            .get(geo.trim().to_ascii_uppercase().as_str())
            .and_then(|locales| locales.first().cloned())
    }
}

/// Observation after normalization, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedObservation {
    geo_code: String,
    locale_code: String,
    display_name: String,
    storefront_path: String,
}

/// Canonicalizes observations and keeps the first per distinct locale.
/// Entries without a parseable locale are dropped.
fn collapse_observations(
    source: SourceType,
    observations: &[RegionLocaleObservation],
) -> Vec<NormalizedObservation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for obs in observations {
        let Some(locale) = normalize_locale(&obs.locale_code) else {
            debug!(locale = %obs.locale_code, "dropping observation with unparseable locale");
            continue;
        };
        if !seen.insert(locale.clone()) {
            continue;
        }
        let geo = obs
            .geo_code
            .as_deref()
            .and_then(normalize_geo)
            .or_else(|| locale_country(&locale))
            .unwrap_or_default();
        let display_name = obs
            .display_name
            .as_deref()
            .and_then(normalize_text)
            .unwrap_or_else(|| match source {
                SourceType::Upload => format!("Uploaded locale {}", locale),
                SourceType::Sync => locale.clone(),
            });
        let storefront_path = obs
            .storefront_path
            .as_deref()
            .and_then(normalize_storefront_path)
            .unwrap_or_else(|| storefront_path_for_locale(&locale));
        out.push(NormalizedObservation {
            geo_code: geo,
            locale_code: locale,
            display_name,
            storefront_path,
        });
    }
    out
}

fn ref_from_row(row: &SqliteRow) -> RegionLocaleRef {
    let source_type: String = row.get("source_type");
    let active: i64 = row.get("active");
    RegionLocaleRef {
        id: row.get("id"),
        geo_code: row.get("geo_code"),
        locale_code: row.get("locale_code"),
        display_name: row.get("display_name"),
        storefront_path: row.get("storefront_path"),
        source_type: SourceType::parse(&source_type),
        active: active != 0,
        last_seen_at: row.get("last_seen_at"),
        seen_count: row.get("seen_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Deactivates all but the most recently seen active row per locale for one
/// source type, and rewrites the survivor's locale to canonical form.
/// Returns the number of rows deactivated.
pub async fn deactivate_duplicates(
    conn: &mut SqliteConnection,
    source: SourceType,
    now: i64,
) -> Result<u64> {
    let rows = sqlx::query(
        r#"
        SELECT id, locale_code FROM region_locale_ref
        WHERE source_type = ? AND active = 1
        ORDER BY last_seen_at DESC, seen_count DESC, id ASC
        "#,
    )
    .bind(source.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut kept = HashSet::new();
    let mut renames = Vec::new();
    let mut deactivated = 0;
    for row in &rows {
        let id: String = row.get("id");
        let raw_locale: String = row.get("locale_code");
        let canonical = normalize_locale(&raw_locale).unwrap_or_else(|| raw_locale.clone());

        if kept.insert(canonical.clone()) {
            if canonical != raw_locale {
                renames.push((id, canonical));
            }
        } else {
            sqlx::query("UPDATE region_locale_ref SET active = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(&id)
                .execute(&mut *conn)
                .await?;
            deactivated += 1;
        }
    }

    // Survivors are renamed only after the losers are inactive.
    for (id, canonical) in renames {
        sqlx::query("UPDATE region_locale_ref SET locale_code = ?, updated_at = ? WHERE id = ?")
            .bind(&canonical)
            .bind(now)
            .bind(&id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(deactivated)
}

/// Persistent (geo, locale) memory with a cached options view.
pub struct RegionTracker {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    grouping: RegionGrouping,
    ttl: Duration,
    upload_only: bool,
    cache: RwLock<Option<TimedCache<RegionOptionsSnapshot>>>,
}

impl RegionTracker {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, config: &RegionsConfig) -> Self {
        let ttl_secs = config.cache_ttl_secs.clamp(1, MAX_CACHE_TTL_SECS) as i64;
        Self {
            pool,
            clock,
            grouping: RegionGrouping::new(&config.groups),
            ttl: Duration::seconds(ttl_secs),
            upload_only: config.upload_only,
            cache: RwLock::new(None),
        }
    }

    pub fn grouping(&self) -> &RegionGrouping {
        &self.grouping
    }

    /// Records one run's observations: each distinct locale either bumps its
    /// active row (`seen_count + 1`, fresh labels and `last_seen_at`) or
    /// inserts a new one with `seen_count = 1`. Returns the number of
    /// distinct locales written.
    pub async fn record_observations(
        &self,
        source: SourceType,
        observations: &[RegionLocaleObservation],
    ) -> Result<usize> {
        let collapsed = collapse_observations(source, observations);
        if collapsed.is_empty() {
            return Ok(0);
        }
        let now = self.clock.now_ts();

        // Take the write lock up front; a deferred transaction that reads
        // first cannot upgrade once another connection has committed.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let deactivated = deactivate_duplicates(&mut tx, source, now).await?;
        if deactivated > 0 {
            debug!(deactivated, source = %source, "collapsed duplicate active locale rows");
        }
        sqlx::query(ACTIVE_LOCALE_INDEX).execute(&mut *tx).await?;

        for obs in &collapsed {
            sqlx::query(
                r#"
                INSERT INTO region_locale_ref (id, geo_code, locale_code, display_name, storefront_path, source_type, active, last_seen_at, seen_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 1, ?, 1, ?, ?)
                ON CONFLICT(source_type, locale_code) WHERE active = 1 DO UPDATE SET
                    geo_code = excluded.geo_code,
                    display_name = excluded.display_name,
                    storefront_path = excluded.storefront_path,
                    last_seen_at = excluded.last_seen_at,
                    seen_count = region_locale_ref.seen_count + 1,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&obs.geo_code)
            .bind(&obs.locale_code)
            .bind(&obs.display_name)
            .bind(&obs.storefront_path)
            .bind(source.as_str())
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.refresh().await?;
        Ok(collapsed.len())
    }

    /// Active rows of one source type, most recently seen first.
    pub async fn active_refs(&self, source: SourceType) -> Result<Vec<RegionLocaleRef>> {
        let rows = sqlx::query(
            r#"
            SELECT id, geo_code, locale_code, display_name, storefront_path, source_type, active, last_seen_at, seen_count, created_at, updated_at
            FROM region_locale_ref
            WHERE source_type = ? AND active = 1
            ORDER BY last_seen_at DESC, locale_code ASC
            "#,
        )
        .bind(source.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(ref_from_row).collect())
    }

    /// Cached options view; reloads from storage once the TTL has passed.
    pub async fn options_snapshot(&self) -> Result<RegionOptionsSnapshot> {
        let now = self.clock.now();
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref() {
                if !cached.is_expired(now, self.ttl) {
                    return Ok(cached.payload.clone());
                }
            }
        }
        self.refresh().await
    }

    /// Reloads the snapshot from storage and replaces the cached copy.
    pub async fn refresh(&self) -> Result<RegionOptionsSnapshot> {
        let snapshot = self.load_snapshot().await?;
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *cache = Some(TimedCache::new(snapshot.clone(), self.clock.now()));
        debug!(geos = snapshot.geos.len(), "region options reloaded");
        Ok(snapshot)
    }

    pub async fn default_locale_for_geo(&self, geo: &str) -> Result<Option<String>> {
        Ok(self.options_snapshot().await?.default_locale_for(geo))
    }

    /// Static options served when storage cannot be consulted.
    pub fn fallback_snapshot(&self) -> RegionOptionsSnapshot {
        RegionOptionsSnapshot::fallback(&self.grouping)
    }

    async fn load_snapshot(&self) -> Result<RegionOptionsSnapshot> {
        let uploads = self.active_refs(SourceType::Upload).await?;
        let rows = if self.upload_only && !uploads.is_empty() {
            uploads
        } else {
            let mut merged = uploads;
            merged.extend(self.active_refs(SourceType::Sync).await?);
            merged
        };

        if rows.is_empty() {
            return Ok(self.fallback_snapshot());
        }
        let pairs = rows.into_iter().filter_map(|r| {
            let country = normalize_geo(&r.geo_code).or_else(|| locale_country(&r.locale_code))?;
            let locale = normalize_locale(&r.locale_code)?;
            Some((country, locale))
        });
        Ok(RegionOptionsSnapshot::from_pairs(pairs, &self.grouping))
    }
}
