//! Metadata normalization.
//!
//! Pure functions that canonicalize free-form text, locale strings, geo
//! codes, and storefront paths, plus the country → business-region grouping
//! used to present region filter options. Nothing here touches storage.
//!
//! Canonical formats:
//!
//! | Kind | Format | Example |
//! |------|--------|---------|
//! | locale | `ll_CC` | `fr_CA` |
//! | geo / country | two uppercase letters | `JP` |
//! | storefront path | lowercase, slash-terminated | `/ca/fr/` |

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bucket for every country without an explicit grouping.
pub const DEFAULT_REGION: &str = "WW";

/// Bucket display order; buckets not listed here follow alphabetically.
pub const PREFERRED_REGION_ORDER: &[&str] = &[
    "WW", "CA", "LA", "UK", "EU", "MEA", "APAC", "CN", "HK", "TW", "JP", "KR",
];

const DEFAULT_GROUPS: &[(&str, &[&str])] = &[
    ("CA", &["CA"]),
    (
        "LA",
        &[
            "MX", "BR", "AR", "CL", "CO", "PE", "EC", "UY", "PY", "BO", "VE", "CR", "PA", "GT",
            "DO", "SV", "HN", "NI",
        ],
    ),
    ("UK", &["GB"]),
    (
        "EU",
        &[
            "FR", "DE", "IT", "ES", "NL", "BE", "LU", "CH", "AT", "SE", "NO", "DK", "FI", "IE",
            "PT", "PL", "CZ", "SK", "HU", "RO", "BG", "GR", "HR", "SI", "EE", "LV", "LT", "IS",
            "UA", "RU",
        ],
    ),
    (
        "MEA",
        &[
            "AE", "SA", "QA", "KW", "BH", "OM", "JO", "IL", "TR", "EG", "MA", "ZA", "NG", "KE",
        ],
    ),
    (
        "APAC",
        &[
            "AU", "NZ", "SG", "IN", "TH", "ID", "MY", "PH", "VN", "MO", "KH", "LK", "BD",
        ],
    ),
    ("CN", &["CN"]),
    ("HK", &["HK"]),
    ("TW", &["TW"]),
    ("JP", &["JP"]),
    ("KR", &["KR"]),
];

/// Returns the trimmed value, or `None` when absent or blank.
pub fn trim_to_none(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Collapses internal whitespace runs to single spaces and trims.
pub fn normalize_text(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn two_letters(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(trimmed)
    } else {
        None
    }
}

pub fn normalize_language(value: &str) -> Option<String> {
    two_letters(value).map(|s| s.to_ascii_lowercase())
}

/// Uppercase two-letter code, or `None`.
pub fn normalize_geo(value: &str) -> Option<String> {
    two_letters(value).map(|s| s.to_ascii_uppercase())
}

/// Canonicalizes `en-US`, `en_us`, ` EN-us ` → `en_US`.
pub fn normalize_locale(value: &str) -> Option<String> {
    let replaced = value.trim().replace('-', "_");
    let mut parts = replaced.split('_');
    let language = normalize_language(parts.next()?)?;
    let country = normalize_geo(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(format!("{}_{}", language, country))
}

/// Country segment of a canonical or raw locale string.
pub fn locale_country(locale: &str) -> Option<String> {
    normalize_locale(locale).map(|l| l[3..].to_string())
}

/// Accepts `/cc/`, `/cc/ll/`, and `/cc-ll/` storefront paths (query and
/// fragment stripped); anything else is rejected.
pub fn normalize_storefront_path(value: &str) -> Option<String> {
    let mut trimmed = value.trim();
    if let Some(idx) = trimmed.find(['?', '#']) {
        trimmed = &trimmed[..idx];
    }
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut normalized = trimmed.to_ascii_lowercase();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    if normalized.len() < 3 {
        return None;
    }

    let inner: Vec<&str> = normalized[1..normalized.len() - 1].split('/').collect();
    let valid = match inner.as_slice() {
        [country] => {
            two_letters(country).is_some()
                || country
                    .split_once('-')
                    .is_some_and(|(c, l)| two_letters(c).is_some() && two_letters(l).is_some())
        }
        [country, language] => two_letters(country).is_some() && two_letters(language).is_some(),
        _ => false,
    };
    valid.then_some(normalized)
}

/// Storefront label synthesized from a locale: `/cc/` for English,
/// `/cc/ll/` otherwise. Unparseable locales map to `/us/`.
pub fn storefront_path_for_locale(locale: &str) -> String {
    match normalize_locale(locale) {
        Some(l) => {
            let language = &l[..2];
            let country = l[3..].to_ascii_lowercase();
            if language == "en" {
                format!("/{}/", country)
            } else {
                format!("/{}/{}/", country, language)
            }
        }
        None => "/us/".to_string(),
    }
}

/// Known storefront path segments and the (geo, locale) they serve.
pub fn storefront_region(segment: &str) -> Option<(&'static str, &'static str)> {
    let region = match segment.trim().to_ascii_lowercase().as_str() {
        "us" => ("US", "en_US"),
        "ca" => ("CA", "en_CA"),
        "ca/fr" => ("CA", "fr_CA"),
        "mx" => ("MX", "es_MX"),
        "jp" => ("JP", "ja_JP"),
        "kr" => ("KR", "ko_KR"),
        "au" => ("AU", "en_AU"),
        "cn" => ("CN", "zh_CN"),
        "hk" => ("HK", "zh_HK"),
        "hk/en" => ("HK", "en_HK"),
        "tw" => ("TW", "zh_TW"),
        "sg" => ("SG", "en_SG"),
        "in" => ("IN", "en_IN"),
        "th" => ("TH", "th_TH"),
        "vn" => ("VN", "vi_VN"),
        "uk" => ("GB", "en_GB"),
        "fr" => ("FR", "fr_FR"),
        "de" => ("DE", "de_DE"),
        "it" => ("IT", "it_IT"),
        "es" => ("ES", "es_ES"),
        "nl" => ("NL", "nl_NL"),
        "befr" => ("BE", "fr_BE"),
        "benl" => ("BE", "nl_BE"),
        "chde" => ("CH", "de_CH"),
        "chfr" => ("CH", "fr_CH"),
        "se" => ("SE", "sv_SE"),
        "ae" => ("AE", "en_AE"),
        "ae-ar" => ("AE", "ar_AE"),
        "sa" => ("SA", "en_SA"),
        "sa-ar" => ("SA", "ar_SA"),
        "br" => ("BR", "pt_BR"),
        "ww" => ("WW", "en_US"),
        _ => return None,
    };
    Some(region)
}

/// Country → business-region bucket mapping.
///
/// Built from a fixed default table, optionally extended by configured
/// groups (which take precedence for the countries they list).
#[derive(Debug, Clone)]
pub struct RegionGrouping {
    country_to_bucket: HashMap<String, String>,
    members: BTreeMap<String, BTreeSet<String>>,
}

impl Default for RegionGrouping {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

impl RegionGrouping {
    pub fn new(extra: &BTreeMap<String, Vec<String>>) -> Self {
        let mut country_to_bucket = HashMap::new();
        let mut members: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (bucket, countries) in DEFAULT_GROUPS {
            for country in *countries {
                country_to_bucket.insert(country.to_string(), bucket.to_string());
            }
        }
        for (bucket, countries) in extra {
            let bucket = bucket.trim().to_ascii_uppercase();
            for country in countries.iter().filter_map(|c| normalize_geo(c)) {
                country_to_bucket.insert(country, bucket.clone());
            }
        }
        for (country, bucket) in &country_to_bucket {
            members
                .entry(bucket.clone())
                .or_default()
                .insert(country.clone());
        }
        members.entry(DEFAULT_REGION.to_string()).or_default();

        Self {
            country_to_bucket,
            members,
        }
    }

    /// Every two-letter code resolves to exactly one bucket; unknown codes
    /// (and anything unparseable) land in [`DEFAULT_REGION`].
    pub fn bucket_for(&self, country: &str) -> &str {
        normalize_geo(country)
            .and_then(|c| self.country_to_bucket.get(&c))
            .map(String::as_str)
            .unwrap_or(DEFAULT_REGION)
    }

    pub fn is_bucket(&self, label: &str) -> bool {
        self.members.contains_key(label.trim().to_ascii_uppercase().as_str())
    }

    /// For a bucket that is exactly one country named like itself (e.g. `JP`),
    /// returns that country: such labels are storable geo values.
    pub fn single_country(&self, label: &str) -> Option<String> {
        let label = label.trim().to_ascii_uppercase();
        let members = self.members.get(&label)?;
        (members.len() == 1 && members.contains(&label)).then_some(label)
    }

    /// Orders bucket names: preferred order first, then the rest alphabetically.
    pub fn order_buckets<I>(&self, buckets: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let present: BTreeSet<String> = buckets.into_iter().collect();
        let mut ordered: Vec<String> = PREFERRED_REGION_ORDER
            .iter()
            .filter(|b| present.contains(**b))
            .map(|b| b.to_string())
            .collect();
        ordered.extend(
            present
                .into_iter()
                .filter(|b| !PREFERRED_REGION_ORDER.contains(&b.as_str())),
        );
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_forms_agree() {
        assert_eq!(normalize_locale("en-US").as_deref(), Some("en_US"));
        assert_eq!(normalize_locale("en_US").as_deref(), Some("en_US"));
        assert_eq!(normalize_locale(" EN-us ").as_deref(), Some("en_US"));
        assert_eq!(normalize_locale("en"), None);
        assert_eq!(normalize_locale("en_US_x"), None);
        assert_eq!(normalize_locale("eng_US"), None);
    }

    #[test]
    fn test_geo_and_language() {
        assert_eq!(normalize_geo(" jp").as_deref(), Some("JP"));
        assert_eq!(normalize_geo("JPN"), None);
        assert_eq!(normalize_language("FR").as_deref(), Some("fr"));
        assert_eq!(locale_country("ja-jp").as_deref(), Some("JP"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hero \n image ").as_deref(), Some("Hero image"));
        assert_eq!(normalize_text(" \t "), None);
        assert_eq!(trim_to_none(Some("  ")), None);
        assert_eq!(trim_to_none(None), None);
    }

    #[test]
    fn test_storefront_paths() {
        assert_eq!(normalize_storefront_path("/CA/fr").as_deref(), Some("/ca/fr/"));
        assert_eq!(normalize_storefront_path("/bh-ar/?x=1").as_deref(), Some("/bh-ar/"));
        assert_eq!(normalize_storefront_path("/jp/#top").as_deref(), Some("/jp/"));
        assert_eq!(normalize_storefront_path("jp/"), None);
        assert_eq!(normalize_storefront_path("/store/buy/"), None);
        assert_eq!(storefront_path_for_locale("en_GB"), "/gb/");
        assert_eq!(storefront_path_for_locale("fr-CA"), "/ca/fr/");
        assert_eq!(storefront_path_for_locale("bogus"), "/us/");
    }

    #[test]
    fn test_storefront_region_lookup() {
        assert_eq!(storefront_region("uk"), Some(("GB", "en_GB")));
        assert_eq!(storefront_region("CA/FR"), Some(("CA", "fr_CA")));
        assert_eq!(storefront_region("atlantis"), None);
    }

    #[test]
    fn test_every_country_has_one_bucket() {
        let grouping = RegionGrouping::default();
        assert_eq!(grouping.bucket_for("jp"), "JP");
        assert_eq!(grouping.bucket_for("GB"), "UK");
        assert_eq!(grouping.bucket_for("MX"), "LA");
        assert_eq!(grouping.bucket_for("US"), "WW");
        assert_eq!(grouping.bucket_for("ZZ"), "WW");
        assert_eq!(grouping.bucket_for("not-a-code"), "WW");

        // Exhaustive over all two-letter codes: never panics, always a known bucket.
        for a in b'A'..=b'Z' {
            for b in b'A'..=b'Z' {
                let code = format!("{}{}", a as char, b as char);
                assert!(grouping.is_bucket(grouping.bucket_for(&code)));
            }
        }
    }

    #[test]
    fn test_configured_groups_override() {
        let mut extra = BTreeMap::new();
        extra.insert(
            "NORDICS".to_string(),
            vec!["se".to_string(), "NO".to_string()],
        );
        let grouping = RegionGrouping::new(&extra);
        assert_eq!(grouping.bucket_for("SE"), "NORDICS");
        assert_eq!(grouping.bucket_for("DK"), "EU");
        assert!(grouping.is_bucket("nordics"));
    }

    #[test]
    fn test_single_country_buckets() {
        let grouping = RegionGrouping::default();
        assert_eq!(grouping.single_country("jp").as_deref(), Some("JP"));
        assert_eq!(grouping.single_country("UK"), None);
        assert_eq!(grouping.single_country("EU"), None);
        assert_eq!(grouping.single_country("FR"), None);
    }

    #[test]
    fn test_bucket_order() {
        let grouping = RegionGrouping::default();
        let ordered = grouping.order_buckets(vec![
            "KR".to_string(),
            "ZETA".to_string(),
            "WW".to_string(),
            "ALPHA".to_string(),
            "JP".to_string(),
        ]);
        assert_eq!(ordered, vec!["WW", "JP", "KR", "ALPHA", "ZETA"]);
    }
}
