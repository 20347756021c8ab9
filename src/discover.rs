//! Structural asset discovery over arbitrary JSON.
//!
//! Uploaded documents have no fixed schema, so discovery is heuristic: an
//! object-valued entry whose key mentions one of the asset keywords (`image`,
//! `icon`, `thumbnail` by default) and whose value looks like an asset (a
//! URI-bearing key, alt/accessibility text, or a `viewport*` child) becomes
//! a candidate. Every object and array is walked regardless of matches, so
//! assets nested inside other assets are found too.
//!
//! Objects whose `_model` ends in `-section` open a new section context for
//! their subtree.

use serde_json::{Map, Value};

use crate::config::ExtractionConfig;
use crate::models::{RawCandidate, SectionContext};

const SECTION_MODEL_SUFFIX: &str = "-section";
const TEXT_KEYS: &[&str] = &["alt", "altText", "accessibilityText"];

/// Keyword and URI-key sets that drive discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    keywords: Vec<String>,
    uri_keys: Vec<String>,
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl DiscoveryRules {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            keywords: config
                .asset_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            uri_keys: config.uri_keys.clone(),
        }
    }

    pub fn uri_keys(&self) -> &[String] {
        &self.uri_keys
    }

    /// Case-insensitive containment of any keyword.
    pub fn is_asset_key(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Whether an object carries anything an asset would: a URI key, an
    /// alt/accessibility field, or a `viewport*` child.
    pub fn is_asset_like(&self, node: &Map<String, Value>) -> bool {
        self.uri_keys.iter().any(|k| node.contains_key(k))
            || TEXT_KEYS.iter().any(|k| node.contains_key(*k))
            || node
                .keys()
                .any(|k| k.to_ascii_lowercase().starts_with("viewport"))
    }

    /// First non-empty string under one of the URI keys.
    pub fn direct_uri(&self, node: &Map<String, Value>) -> Option<String> {
        self.uri_keys.iter().find_map(|k| {
            node.get(k)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

/// Walks `root` and returns every asset-like node, in traversal order.
pub fn discover_assets(root: &Value, rules: &DiscoveryRules) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    walk(root, "$", None, &SectionContext::default(), rules, &mut out);
    out
}

/// `_path` of an object, when it is a non-empty string.
pub fn logical_path(node: &Map<String, Value>) -> Option<String> {
    node.get("_path")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_section(node: &Map<String, Value>) -> bool {
    node.get("_model")
        .and_then(Value::as_str)
        .is_some_and(|m| m.trim().to_ascii_lowercase().ends_with(SECTION_MODEL_SUFFIX))
}

fn child_json_path(parent: &str, key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if plain {
        format!("{}.{}", parent, key)
    } else {
        let quoted = serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key));
        format!("{}[{}]", parent, quoted)
    }
}

fn walk(
    value: &Value,
    json_path: &str,
    enclosing_path: Option<&str>,
    section: &SectionContext,
    rules: &DiscoveryRules,
    out: &mut Vec<RawCandidate>,
) {
    match value {
        Value::Object(map) => {
            let own_path = logical_path(map);
            let node_path = own_path.as_deref().or(enclosing_path);

            let next_section = if is_section(map) {
                SectionContext {
                    path: own_path.clone().or_else(|| section.path.clone()),
                    uri: rules.direct_uri(map).or_else(|| section.uri.clone()),
                }
            } else {
                section.clone()
            };

            for (key, child) in map {
                let child_path = child_json_path(json_path, key);
                if let Value::Object(child_map) = child {
                    if rules.is_asset_key(key) && rules.is_asset_like(child_map) {
                        out.push(RawCandidate {
                            key: key.clone(),
                            node_path: logical_path(child_map)
                                .unwrap_or_else(|| child_path.clone()),
                            json_path: child_path.clone(),
                            context_path: node_path.map(str::to_string),
                            section: next_section.clone(),
                            node: child_map.clone(),
                        });
                    }
                }
                walk(child, &child_path, node_path, &next_section, rules, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", json_path, i);
                walk(item, &item_path, enclosing_path, section, rules, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> DiscoveryRules {
        DiscoveryRules::default()
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_asset_key_matching() {
        let r = rules();
        assert!(r.is_asset_key("heroImage"));
        assert!(r.is_asset_key("ICON"));
        assert!(r.is_asset_key("cardThumbnailLarge"));
        assert!(!r.is_asset_key("headline"));
    }

    #[test]
    fn test_asset_like_predicate() {
        let r = rules();
        assert!(r.is_asset_like(&obj(json!({"uri": "/a.png"}))));
        assert!(r.is_asset_like(&obj(json!({"_uri_path": "/a.png"}))));
        assert!(r.is_asset_like(&obj(json!({"alt": "x"}))));
        assert!(r.is_asset_like(&obj(json!({"accessibilityText": {"copy": "x"}}))));
        assert!(r.is_asset_like(&obj(json!({"viewportSmall": {}}))));
        assert!(!r.is_asset_like(&obj(json!({"copy": "hello", "_model": "text"}))));
    }

    #[test]
    fn test_discovers_nested_assets_at_any_depth() {
        let doc = json!({
            "hero": {
                "heroImage": {"uri": "/img/hero.png", "alt": "Hero"},
                "cards": [
                    {"cardIcon": {"uri": "/img/c1.svg"}},
                    {"cardIcon": {"uri": "/img/c2.svg"}},
                    {"title": "no asset here"}
                ]
            }
        });
        let found = discover_assets(&doc, &rules());
        let paths: Vec<&str> = found.iter().map(|c| c.json_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "$.hero.cards[0].cardIcon",
                "$.hero.cards[1].cardIcon",
                "$.hero.heroImage"
            ]
        );
        // Without their own `_path`, node paths fall back to the JSON path.
        assert_eq!(found[0].node_path, "$.hero.cards[0].cardIcon");
    }

    #[test]
    fn test_asset_inside_asset_is_found() {
        let doc = json!({
            "galleryImage": {
                "uri": "/outer.png",
                "badgeIcon": {"uri": "/inner.svg"}
            }
        });
        let found = discover_assets(&doc, &rules());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].key, "galleryImage");
        assert_eq!(found[1].key, "badgeIcon");
    }

    #[test]
    fn test_keyword_without_asset_shape_is_ignored() {
        let doc = json!({"imageSettings": {"lazy": true}, "image": "plain-string"});
        assert!(discover_assets(&doc, &rules()).is_empty());
    }

    #[test]
    fn test_section_context_is_nearest_enclosing() {
        let doc = json!({
            "_path": "/content/dam/acme/prod/en_US/page.json",
            "logoIcon": {"uri": "/logo.svg"},
            "sections": [{
                "_model": "hero-section",
                "_path": "/content/dam/acme/prod/en_US/page/hero",
                "_uri_path": "/en_US/page/hero",
                "heroImage": {"uri": "/hero.png"},
                "inner": {
                    "_model": "promo-section",
                    "promoImage": {"uri": "/promo.png"}
                }
            }]
        });
        let found = discover_assets(&doc, &rules());
        let by_key = |k: &str| found.iter().find(|c| c.key == k).unwrap();

        assert_eq!(by_key("logoIcon").section, SectionContext::default());
        assert_eq!(
            by_key("logoIcon").context_path.as_deref(),
            Some("/content/dam/acme/prod/en_US/page.json")
        );

        let hero = by_key("heroImage");
        assert_eq!(
            hero.section.path.as_deref(),
            Some("/content/dam/acme/prod/en_US/page/hero")
        );
        assert_eq!(hero.section.uri.as_deref(), Some("/en_US/page/hero"));

        // A section without its own `_path` keeps the parent's context.
        let promo = by_key("promoImage");
        assert_eq!(promo.section, hero.section);
    }

    #[test]
    fn test_own_path_wins_for_node_path() {
        let doc = json!({"hero": {"heroImage": {
            "_path": "/content/dam/acme/stage/ja_JP/mac/hero.json",
            "uri": "/img/hero.png"
        }}});
        let found = discover_assets(&doc, &rules());
        assert_eq!(found[0].node_path, "/content/dam/acme/stage/ja_JP/mac/hero.json");
        assert_eq!(found[0].json_path, "$.hero.heroImage");
    }

    #[test]
    fn test_unusual_keys_are_quoted_in_json_path() {
        let doc = json!({"hero banner": {"main image": {"uri": "/x.png"}}});
        let found = discover_assets(&doc, &rules());
        assert_eq!(found[0].json_path, "$[\"hero banner\"][\"main image\"]");
    }

    #[test]
    fn test_scalars_and_null_root() {
        assert!(discover_assets(&Value::Null, &rules()).is_empty());
        assert!(discover_assets(&json!(42), &rules()).is_empty());
        assert!(discover_assets(&json!([1, "two", null]), &rules()).is_empty());
    }
}
