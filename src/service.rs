//! Shared engine handle.
//!
//! [`AssetService`] bundles the pool, configuration, clock, schema probe,
//! and region tracker so that the CLI, the HTTP server, and tests all drive
//! the same code paths. It is cheap to share behind an `Arc`.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::discover::DiscoveryRules;
use crate::migrate::{self, ColumnCheck};
use crate::regions::RegionTracker;
use crate::store::{FilterMode, SchemaProbe};

pub struct AssetService {
    config: Arc<Config>,
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    rules: DiscoveryRules,
    probe: SchemaProbe,
    filter_mode: FilterMode,
    regions: RegionTracker,
}

impl AssetService {
    /// Connects to the configured database using wall-clock time.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::with_pool(config.clone(), pool, Arc::new(SystemClock)).await
    }

    /// Builds a service over an existing pool and clock.
    ///
    /// Filter-column types are inspected (never altered) here; a legacy
    /// declaration switches filtering to [`FilterMode::Exact`] until
    /// `repair-schema` has been run.
    pub async fn with_pool(config: Config, pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let check = migrate::inspect_filter_columns(&pool).await?;
        if let ColumnCheck::Incompatible(columns) = &check {
            warn!(
                columns = %columns.join(", "),
                "filter columns are not TEXT; case-insensitive filtering unavailable until `repair-schema`"
            );
        }
        let filter_mode = FilterMode::from_check(&check);
        debug!(?filter_mode, "asset service opened");

        let regions = RegionTracker::new(pool.clone(), clock.clone(), &config.regions);
        Ok(Self {
            rules: DiscoveryRules::from_config(&config.extraction),
            config: Arc::new(config),
            pool,
            clock,
            probe: SchemaProbe::new(),
            filter_mode,
            regions,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn rules(&self) -> &DiscoveryRules {
        &self.rules
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    pub fn regions(&self) -> &RegionTracker {
        &self.regions
    }

    pub async fn schema_present(&self) -> Result<bool> {
        self.probe.is_present(&self.pool).await
    }

    /// Fails with `EngineError::SchemaMissing` when tables are absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.probe.ensure(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
