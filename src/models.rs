//! Core data models used throughout the asset finder.
//!
//! Candidates are transient and live for one extraction run; catalog entries,
//! occurrences, and region/locale observations are their persisted forms.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::normalize::{normalize_locale, trim_to_none};

/// Optional business context supplied by the caller alongside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl RequestMetadata {
    /// Trims every field (blank becomes absent) and canonicalizes the locale
    /// to `ll_CC` when it has that shape.
    pub fn normalized(&self) -> Self {
        let locale = trim_to_none(self.locale.as_deref())
            .map(|raw| normalize_locale(&raw).unwrap_or(raw));
        Self {
            tenant: trim_to_none(self.tenant.as_deref()),
            environment: trim_to_none(self.environment.as_deref()),
            project: trim_to_none(self.project.as_deref()),
            site: trim_to_none(self.site.as_deref()),
            geo: trim_to_none(self.geo.as_deref()),
            locale,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Identifies one ingested document version.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub raw_data_id: String,
    pub source_uri: String,
    pub source_version: Option<i64>,
    pub metadata: RequestMetadata,
}

/// A node found by the discoverer, before any resolution.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    /// Object key under which the node was found (e.g. `heroImage`).
    pub key: String,
    /// JSON path of the node, `$.hero.heroImage` style.
    pub json_path: String,
    /// The node's own `_path`, or its JSON path when it has none.
    pub node_path: String,
    /// Nearest enclosing `_path` above the node, if any.
    pub context_path: Option<String>,
    pub section: SectionContext,
    pub node: Map<String, Value>,
}

/// Nearest enclosing section, carried down the tree during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionContext {
    pub path: Option<String>,
    pub uri: Option<String>,
}

/// Where a resolved field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    Request,
    Inferred,
    Default,
}

/// Business context resolved for one candidate. Empty values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedContext {
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    pub site: Option<String>,
    pub geo: Option<String>,
    pub locale: Option<String>,
}

/// A fully resolved candidate, ready for persistence.
#[derive(Debug, Clone)]
pub struct ExtractionCandidate {
    pub asset_key: String,
    pub asset_model: Option<String>,
    pub asset_node_path: String,
    pub section_path: Option<String>,
    pub section_uri: Option<String>,
    pub preview_uri: Option<String>,
    pub interactive_path: Option<String>,
    pub alt_text: Option<String>,
    pub accessibility_text: Option<String>,
    pub viewports: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub context: ResolvedContext,
    pub locale_origin: FieldOrigin,
    pub content_hash: String,
    pub slot_hash: String,
}

/// Canonical, deduplicated asset row.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub content_hash: String,
    pub asset_key: String,
    pub asset_model: Option<String>,
    pub interactive_path: Option<String>,
    pub preview_uri: Option<String>,
    pub alt_text: Option<String>,
    pub accessibility_text: Option<String>,
    pub viewports_json: String,
    pub metadata_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One asset at one slot of one source version.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub id: String,
    pub catalog_id: String,
    pub raw_data_id: String,
    pub source_uri: String,
    pub source_version: Option<i64>,
    pub slot_hash: String,
    pub asset_node_path: String,
    pub section_path: Option<String>,
    pub section_uri: Option<String>,
    pub context: ResolvedContext,
    pub request_metadata_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Origin of a region/locale reference row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// Observed in an uploaded document.
    Upload,
    /// Imported from an external reference source.
    Sync,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Upload => "UPLOAD",
            SourceType::Sync => "SYNC",
        }
    }

    /// Unknown labels are treated as external reference rows.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("UPLOAD") {
            SourceType::Upload
        } else {
            SourceType::Sync
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (geo, locale) pair seen during an extraction run, with optional labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLocaleObservation {
    pub geo_code: Option<String>,
    pub locale_code: String,
    pub display_name: Option<String>,
    pub storefront_path: Option<String>,
}

/// Persisted reference row.
#[derive(Debug, Clone)]
pub struct RegionLocaleRef {
    pub id: String,
    pub geo_code: String,
    pub locale_code: String,
    pub display_name: String,
    pub storefront_path: String,
    pub source_type: SourceType,
    pub active: bool,
    pub last_seen_at: i64,
    pub seen_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
