use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub regions: RegionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Key fragments (case-insensitive) that mark a child object as a possible asset.
    #[serde(default = "default_asset_keywords")]
    pub asset_keywords: Vec<String>,
    /// Keys whose string value is treated as a direct URI of the asset.
    #[serde(default = "default_uri_keys")]
    pub uri_keys: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            asset_keywords: default_asset_keywords(),
            uri_keys: default_uri_keys(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_asset_keywords() -> Vec<String> {
    vec![
        "image".to_string(),
        "icon".to_string(),
        "thumbnail".to_string(),
    ]
}
fn default_uri_keys() -> Vec<String> {
    vec![
        "uri".to_string(),
        "_uri_path".to_string(),
        "src".to_string(),
        "url".to_string(),
    ]
}

/// Last link of the metadata resolution chain. Empty strings mean "unresolved".
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub geo: String,
    #[serde(default)]
    pub locale: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            environment: default_environment(),
            project: default_project(),
            site: String::new(),
            geo: String::new(),
            locale: String::new(),
        }
    }
}

fn default_tenant() -> String {
    "default".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}
fn default_project() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OptionsConfig {
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub sites: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> i64 {
    20
}
fn default_max_page_size() -> i64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegionsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_enabled")]
    pub upload_only: bool,
    /// Extra or overriding business-region buckets: `NAME = ["CC", ...]`.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            upload_only: true,
            groups: BTreeMap::new(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    3 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// A config with every section at its default, pointing at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            extraction: ExtractionConfig::default(),
            defaults: DefaultsConfig::default(),
            options: OptionsConfig::default(),
            search: SearchConfig::default(),
            regions: RegionsConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.max_page_size < 1 {
            anyhow::bail!("search.max_page_size must be >= 1");
        }
        if self.search.default_page_size < 1
            || self.search.default_page_size > self.search.max_page_size
        {
            anyhow::bail!(
                "search.default_page_size must be in [1, {}]",
                self.search.max_page_size
            );
        }

        if self
            .extraction
            .asset_keywords
            .iter()
            .all(|k| k.trim().is_empty())
        {
            anyhow::bail!("extraction.asset_keywords must contain at least one keyword");
        }
        if self.extraction.uri_keys.is_empty() {
            anyhow::bail!("extraction.uri_keys must not be empty");
        }

        for (name, members) in &self.regions.groups {
            if name.is_empty() || name.chars().any(|c| !c.is_ascii_uppercase()) {
                anyhow::bail!(
                    "regions.groups: '{}' must be a non-empty uppercase name",
                    name
                );
            }
            for code in members {
                if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                    anyhow::bail!(
                        "regions.groups.{}: '{}' is not a two-letter country code",
                        name,
                        code
                    );
                }
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
