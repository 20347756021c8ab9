//! Filter options for the asset finder UI.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::normalize::trim_to_none;
use crate::service::AssetService;
use crate::store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsResponse {
    pub tenants: Vec<String>,
    pub environments: Vec<String>,
    pub projects: Vec<String>,
    pub sites: Vec<String>,
    pub geos: Vec<String>,
    pub geo_to_locales: BTreeMap<String, Vec<String>>,
}

/// Configured values in order, de-duplicated, falling back to the default
/// when the list is empty.
fn configured(values: &[String], default: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.iter().filter_map(|v| trim_to_none(Some(v))) {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    if out.is_empty() {
        out.extend(trim_to_none(Some(default)));
    }
    out
}

pub async fn get_options(service: &AssetService) -> Result<OptionsResponse> {
    let config = service.config();
    let defaults = &config.defaults;

    let mut sites = configured(&config.options.sites, &defaults.site);
    let (geos, geo_to_locales) = if service.schema_present().await? {
        for site in store::distinct_sites(service.pool()).await? {
            if !sites.contains(&site) {
                sites.push(site);
            }
        }
        let snapshot = service.regions().options_snapshot().await?;
        (snapshot.geos, snapshot.geo_to_locales)
    } else {
        let snapshot = service.regions().fallback_snapshot();
        (snapshot.geos, snapshot.geo_to_locales)
    };

    Ok(OptionsResponse {
        tenants: configured(&config.options.tenants, &defaults.tenant),
        environments: configured(&config.options.environments, &defaults.environment),
        projects: configured(&config.options.projects, &defaults.project),
        sites,
        geos,
        geo_to_locales,
    })
}

/// CLI entry point for `asset-finder options`.
pub async fn run_options(config: &Config, json: bool) -> Result<()> {
    let service = AssetService::open(config).await?;
    let options = get_options(&service).await;
    service.close().await;
    let options = options?;

    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }

    println!("tenants:      {}", options.tenants.join(", "));
    println!("environments: {}", options.environments.join(", "));
    println!("projects:     {}", options.projects.join(", "));
    println!(
        "sites:        {}",
        if options.sites.is_empty() {
            "(none)".to_string()
        } else {
            options.sites.join(", ")
        }
    );
    println!();
    println!("{:<8} LOCALES", "GEO");
    for geo in &options.geos {
        let locales = options
            .geo_to_locales
            .get(geo)
            .map(|l| l.join(", "))
            .unwrap_or_default();
        println!("{:<8} {}", geo, locales);
    }
    Ok(())
}
