//! Candidate resolution: display fields, business context, and hashes.
//!
//! Each discovered node is turned into an [`ExtractionCandidate`]:
//!
//! 1. **Preview URI**: `viewportSmall` → `viewportMedium` → `viewportLarge`,
//!    then the node's own URI keys, then a best-effort scan of descendants.
//! 2. **Interactive path**: the node's own URI, else the preview URI.
//! 3. **Text**: `alt`/`altText` and `accessibilityText`, as plain strings
//!    or `{ "copy": "..." }` objects.
//! 4. **Viewports**: every `viewport*` object child; a lone direct URI
//!    becomes a synthetic `default` viewport.
//! 5. **Context**: each of tenant/environment/project/site/geo/locale is
//!    resolved independently: request metadata → path inference → defaults.
//! 6. **Hashes**: the content hash identifies the asset itself, the slot
//!    hash identifies its position within one document version.
//!
//! Resolution never fails. A node with no URI and no text at all is skipped.

use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::config::DefaultsConfig;
use crate::discover::{logical_path, DiscoveryRules};
use crate::models::{
    ExtractionCandidate, FieldOrigin, RawCandidate, RequestMetadata, ResolvedContext,
};
use crate::normalize::{
    locale_country, normalize_geo, normalize_locale, normalize_text, storefront_region,
    trim_to_none,
};

static LOCALE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]{2})[-_]([A-Z]{2})$").expect("valid locale regex"));

const VIEWPORT_PRIORITY: &[&str] = &["viewportsmall", "viewportmedium", "viewportlarge"];
const FIELD_SEPARATOR: &[u8] = &[0x1f];

/// Document-level inputs shared by every candidate of one extraction run.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub request: RequestMetadata,
    /// `_path` of the document root, if it has one.
    pub root_path: Option<String>,
    pub source_uri: String,
}

impl DocumentContext {
    pub fn new(document: &Value, source_uri: &str, request: &RequestMetadata) -> Self {
        Self {
            request: request.normalized(),
            root_path: document.as_object().and_then(logical_path),
            source_uri: source_uri.to_string(),
        }
    }
}

/// Business context hints parsed from one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHints {
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub locale: Option<String>,
    pub geo: Option<String>,
    pub site: Option<String>,
}

/// Parses the two known path shapes:
///
/// - CMS: `/content/dam/{tenant}/{environment}/{locale}/{site}/...`
/// - storefront asset: `.../v/{site}/...`
///
/// plus an `ll-CC`/`ll_CC` locale segment anywhere in the path.
pub fn parse_path_hints(path: &str) -> PathHints {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut hints = PathHints::default();

    let mut locale_index = segments.iter().position(|s| LOCALE_SEGMENT.is_match(s));
    if let Some(i) = locale_index {
        hints.locale = normalize_locale(segments[i]);
        hints.geo = hints.locale.as_deref().and_then(locale_country);
    }

    let is_cms = segments.len() >= 3 && segments[0] == "content" && segments[1] == "dam";
    if is_cms {
        let usable = |i: usize| -> Option<String> {
            segments
                .get(i)
                .filter(|s| !s.contains('.') && !LOCALE_SEGMENT.is_match(s))
                .map(|s| s.to_string())
        };
        hints.tenant = usable(2);
        if locale_index != Some(3) {
            hints.environment = usable(3);
        }
        if locale_index.is_none() {
            // Two-segment storefronts (`ca/fr`) win over their one-segment prefix.
            let paired = segments.get(5).and_then(|next| {
                storefront_region(&format!("{}/{}", segments[4], next)).map(|r| (r, 5))
            });
            let single = || segments.get(4).and_then(|s| storefront_region(s)).map(|r| (r, 4));
            if let Some(((geo, locale), index)) = paired.or_else(single) {
                hints.locale = Some(locale.to_string());
                hints.geo = Some(geo.to_string());
                locale_index = Some(index);
            }
        }
    }

    // A site segment must be followed by something; a trailing segment is
    // the file itself.
    let site_after = |i: usize| -> Option<String> {
        segments
            .get(i + 1)
            .filter(|s| i + 2 < segments.len() && !s.contains('.') && **s != "v")
            .map(|s| s.to_string())
    };
    hints.site = locale_index.and_then(site_after).or_else(|| {
        segments
            .iter()
            .position(|s| *s == "v")
            .and_then(site_after)
    });

    hints
}

/// Reads `alt`-style text in either `"text"` or `{"copy": "text"}` shape.
pub fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => normalize_text(s),
        Value::Object(map) => map.get("copy").and_then(Value::as_str).and_then(normalize_text),
        _ => None,
    }
}

fn viewport_entries(node: &Map<String, Value>) -> Vec<(&String, &Map<String, Value>)> {
    node.iter()
        .filter(|(k, _)| k.to_ascii_lowercase().starts_with("viewport"))
        .filter_map(|(k, v)| v.as_object().map(|m| (k, m)))
        .collect()
}

fn resolve_preview_uri(node: &Map<String, Value>, rules: &DiscoveryRules) -> Option<String> {
    let viewports = viewport_entries(node);
    for wanted in VIEWPORT_PRIORITY {
        let hit = viewports
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == *wanted)
            .and_then(|(_, m)| rules.direct_uri(m));
        if hit.is_some() {
            return hit;
        }
    }
    rules
        .direct_uri(node)
        .or_else(|| scan_descendants(&Value::Object(node.clone()), rules, 0))
}

fn scan_descendants(value: &Value, rules: &DiscoveryRules, depth: usize) -> Option<String> {
    const MAX_DEPTH: usize = 16;
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            if depth > 0 {
                if let Some(uri) = rules.direct_uri(map) {
                    return Some(uri);
                }
            }
            map.values()
                .find_map(|v| scan_descendants(v, rules, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|v| scan_descendants(v, rules, depth + 1)),
        _ => None,
    }
}

fn build_viewports(node: &Map<String, Value>, direct_uri: Option<&str>) -> Map<String, Value> {
    let mut viewports: Map<String, Value> = viewport_entries(node)
        .into_iter()
        .map(|(k, m)| (k.clone(), Value::Object(m.clone())))
        .collect();
    if viewports.is_empty() {
        if let Some(uri) = direct_uri {
            let mut entry = Map::new();
            entry.insert("uri".to_string(), Value::String(uri.to_string()));
            viewports.insert("default".to_string(), Value::Object(entry));
        }
    }
    viewports
}

/// Copy of `value` with every `_path` removed, at any depth.
pub fn strip_structural_paths(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "_path")
                .map(|(k, v)| (k.clone(), strip_structural_paths(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_structural_paths).collect()),
        other => other.clone(),
    }
}

fn digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR);
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Digest over the display-relevant fields; equal content ⇒ equal hash.
pub fn content_hash(
    asset_key: &str,
    interactive_path: Option<&str>,
    preview_uri: Option<&str>,
    alt_text: Option<&str>,
    accessibility_text: Option<&str>,
    viewports: &Map<String, Value>,
    metadata: &Map<String, Value>,
) -> String {
    // serde_json maps are key-sorted, so serialization is canonical.
    let viewports_json = serde_json::to_string(viewports).unwrap_or_default();
    let metadata_json = serde_json::to_string(metadata).unwrap_or_default();
    digest(&[
        asset_key,
        interactive_path.unwrap_or(""),
        preview_uri.unwrap_or(""),
        alt_text.unwrap_or(""),
        accessibility_text.unwrap_or(""),
        &viewports_json,
        &metadata_json,
    ])
}

/// Digest over the structural position of an asset within one document.
pub fn slot_hash(
    asset_key: &str,
    asset_node_path: &str,
    section_path: Option<&str>,
    section_uri: Option<&str>,
) -> String {
    digest(&[
        asset_key,
        asset_node_path,
        section_path.unwrap_or(""),
        section_uri.unwrap_or(""),
    ])
}

fn non_empty(value: &str) -> Option<String> {
    trim_to_none(Some(value))
}

/// Resolves business context for one candidate from the request, the
/// ordered inference paths, and the configured defaults.
pub fn resolve_context(
    request: &RequestMetadata,
    inference_paths: &[&str],
    defaults: &DefaultsConfig,
) -> (ResolvedContext, FieldOrigin) {
    let hints: Vec<PathHints> = inference_paths.iter().map(|p| parse_path_hints(p)).collect();
    let first_hint = |pick: fn(&PathHints) -> Option<String>| hints.iter().find_map(pick);

    let tenant = request
        .tenant
        .clone()
        .or_else(|| first_hint(|h| h.tenant.clone()))
        .or_else(|| non_empty(&defaults.tenant));
    let environment = request
        .environment
        .clone()
        .or_else(|| first_hint(|h| h.environment.clone()))
        .or_else(|| non_empty(&defaults.environment));
    let project = request
        .project
        .clone()
        .or_else(|| non_empty(&defaults.project));
    let site = request
        .site
        .clone()
        .or_else(|| first_hint(|h| h.site.clone()))
        .or_else(|| non_empty(&defaults.site));

    let request_locale = request.locale.as_deref().and_then(normalize_locale);
    let hinted = hints
        .iter()
        .find(|h| h.locale.is_some())
        .map(|h| (h.locale.clone(), h.geo.clone()));
    let (locale, hinted_geo, locale_origin) = match (request_locale, hinted) {
        (Some(l), _) => (Some(l), None, FieldOrigin::Request),
        (None, Some((l, g))) => (l, g, FieldOrigin::Inferred),
        (None, None) => (
            normalize_locale(&defaults.locale),
            None,
            FieldOrigin::Default,
        ),
    };

    let geo = request
        .geo
        .as_deref()
        .and_then(normalize_geo)
        .or(hinted_geo)
        .or_else(|| locale.as_deref().and_then(locale_country))
        .or_else(|| normalize_geo(&defaults.geo));

    (
        ResolvedContext {
            tenant,
            environment,
            project,
            site,
            geo,
            locale,
        },
        locale_origin,
    )
}

/// Turns one raw node into a candidate, or `None` for a structural skip.
pub fn resolve_candidate(
    raw: &RawCandidate,
    doc: &DocumentContext,
    rules: &DiscoveryRules,
    defaults: &DefaultsConfig,
) -> Option<ExtractionCandidate> {
    let node = &raw.node;
    let direct_uri = rules.direct_uri(node);
    let preview_uri = resolve_preview_uri(node, rules);
    // The node's own URI is the interactive target; the preview URI only
    // stands in when the node has none.
    let interactive_path = direct_uri.clone().or_else(|| preview_uri.clone());
    let alt_text = text_value(node.get("alt")).or_else(|| text_value(node.get("altText")));
    let accessibility_text = text_value(node.get("accessibilityText"));

    if preview_uri.is_none()
        && interactive_path.is_none()
        && alt_text.is_none()
        && accessibility_text.is_none()
    {
        return None;
    }

    let viewports = build_viewports(node, direct_uri.as_deref());
    let metadata = match strip_structural_paths(&Value::Object(node.clone())) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let asset_model = node
        .get("_model")
        .and_then(Value::as_str)
        .and_then(|s| trim_to_none(Some(s)));

    let asset_path = logical_path(node).or_else(|| raw.context_path.clone());
    let inference_paths: Vec<&str> = [
        asset_path.as_deref(),
        interactive_path.as_deref(),
        doc.root_path.as_deref(),
        Some(doc.source_uri.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect();
    let (context, locale_origin) = resolve_context(&doc.request, &inference_paths, defaults);

    let content_hash = content_hash(
        &raw.key,
        interactive_path.as_deref(),
        preview_uri.as_deref(),
        alt_text.as_deref(),
        accessibility_text.as_deref(),
        &viewports,
        &metadata,
    );
    let slot_hash = slot_hash(
        &raw.key,
        &raw.node_path,
        raw.section.path.as_deref(),
        raw.section.uri.as_deref(),
    );

    Some(ExtractionCandidate {
        asset_key: raw.key.clone(),
        asset_model,
        asset_node_path: raw.node_path.clone(),
        section_path: raw.section.path.clone(),
        section_uri: raw.section.uri.clone(),
        preview_uri,
        interactive_path,
        alt_text,
        accessibility_text,
        viewports,
        metadata,
        context,
        locale_origin,
        content_hash,
        slot_hash,
    })
}
