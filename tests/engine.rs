use asset_finder::clock::ManualClock;
use asset_finder::config::Config;
use asset_finder::ingest::{extract_and_store, source_document, ExtractionStatus};
use asset_finder::models::{RequestMetadata, SourceDocument, SourceType};
use asset_finder::normalize::{normalize_locale, RegionGrouping, DEFAULT_REGION};
use asset_finder::search::{search_assets, SearchRequest};
use asset_finder::service::AssetService;
use asset_finder::{db, migrate, store};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

struct Env {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    service: AssetService,
}

async fn setup_with(config_fn: impl FnOnce(&mut Config)) -> Env {
    let dir = TempDir::new().unwrap();
    let mut config = Config::minimal(dir.path().join("assets.sqlite"));
    config_fn(&mut config);
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations_on(&pool).await.unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap(),
    ));
    let service = AssetService::with_pool(config, pool, clock.clone())
        .await
        .unwrap();
    Env {
        _dir: dir,
        clock,
        service,
    }
}

async fn setup() -> Env {
    setup_with(|_| {}).await
}

fn src(raw_id: &str, uri: &str, version: Option<i64>) -> SourceDocument {
    source_document(raw_id, uri, version, RequestMetadata::default())
}

async fn slot_hashes(env: &Env, uri: &str, version: Option<i64>) -> Vec<String> {
    store::list_occurrences(env.service.pool(), uri, version)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.slot_hash)
        .collect()
}

fn landing_page() -> Value {
    json!({
        "_path": "/content/dam/acme/production/en_US/landing.json",
        "sections": [
            {
                "_model": "hero-section",
                "_path": "/content/dam/acme/production/en_US/landing/hero",
                "heroImage": {
                    "viewportSmall": {"uri": "/img/hero-s.png"},
                    "viewportLarge": {"uri": "/img/hero-l.png"},
                    "alt": {"copy": "Launch"}
                }
            },
            {
                "_model": "tiles-section",
                "_path": "/content/dam/acme/production/en_US/landing/tiles",
                "tiles": [
                    {"tileIcon": {"_uri_path": "/icons/one.svg"}},
                    {"tileIcon": {"_uri_path": "/icons/two.svg"}}
                ]
            }
        ]
    })
}

#[tokio::test]
async fn test_identical_content_shares_catalog_entry_across_documents() {
    let env = setup().await;
    let shared = json!({"uri": "/img/shared.png", "alt": "Shared"});

    extract_and_store(
        &env.service,
        &json!({"a": {"promoImage": shared.clone()}}),
        &src("raw-a", "doc-a", Some(1)),
    )
    .await;
    extract_and_store(
        &env.service,
        &json!({"deep": [{"nested": {"promoImage": shared}}]}),
        &src("raw-b", "doc-b", Some(7)),
    )
    .await;

    let a = store::list_occurrences(env.service.pool(), "doc-a", Some(1))
        .await
        .unwrap();
    let b = store::list_occurrences(env.service.pool(), "doc-b", Some(7))
        .await
        .unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].catalog_id, b[0].catalog_id);
    assert_ne!(a[0].slot_hash, b[0].slot_hash);
    assert_eq!(store::count_catalog(env.service.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reextracting_same_version_is_stable() {
    let env = setup().await;
    let doc = landing_page();
    let source = src("raw-1", "landing", Some(3));

    let first = extract_and_store(&env.service, &doc, &source).await;
    assert_eq!(first.status, ExtractionStatus::Completed);
    assert_eq!(first.occurrences, 3);
    let before = slot_hashes(&env, "landing", Some(3)).await;

    env.clock.advance(Duration::minutes(1));
    let second = extract_and_store(&env.service, &doc, &source).await;
    assert_eq!(second.occurrences, 3);
    assert_eq!(slot_hashes(&env, "landing", Some(3)).await, before);
    assert_eq!(store::count_catalog(env.service.pool()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reprocessing_replaces_occurrence_set() {
    let env = setup().await;
    let source = src("raw-1", "landing", Some(3));
    extract_and_store(&env.service, &landing_page(), &source).await;
    let old = slot_hashes(&env, "landing", Some(3)).await;

    // Drop the tiles section, keep the hero slot.
    let mut modified = landing_page();
    modified["sections"].as_array_mut().unwrap().truncate(1);
    modified["sections"][0]["heroImage"]["alt"] = json!("Launch day");
    extract_and_store(&env.service, &modified, &source).await;

    let new = slot_hashes(&env, "landing", Some(3)).await;
    assert_eq!(new.len(), 1);
    assert!(old.contains(&new[0]));

    let rows = store::list_occurrences(env.service.pool(), "landing", Some(3))
        .await
        .unwrap();
    let entry = store::get_catalog(env.service.pool(), &rows[0].catalog_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.alt_text.as_deref(), Some("Launch day"));
    // Previous catalog rows remain even though nothing references them.
    assert_eq!(store::count_catalog(env.service.pool()).await.unwrap(), 4);
}

#[tokio::test]
async fn test_other_versions_are_untouched() {
    let env = setup().await;
    extract_and_store(&env.service, &landing_page(), &src("raw-1", "landing", Some(1))).await;
    extract_and_store(
        &env.service,
        &json!({"heroImage": {"uri": "/only.png"}}),
        &src("raw-2", "landing", Some(2)),
    )
    .await;

    assert_eq!(slot_hashes(&env, "landing", Some(1)).await.len(), 3);
    assert_eq!(slot_hashes(&env, "landing", Some(2)).await.len(), 1);
}

#[test]
fn test_locale_normalization_and_grouping() {
    assert_eq!(normalize_locale("en-US"), normalize_locale("en_US"));
    assert_eq!(normalize_locale("en_US").as_deref(), Some("en_US"));

    let grouping = RegionGrouping::default();
    for a in b'A'..=b'Z' {
        for b in b'A'..=b'Z' {
            let code = format!("{}{}", a as char, b as char);
            let bucket = grouping.bucket_for(&code);
            assert!(grouping.is_bucket(bucket), "{} -> {}", code, bucket);
        }
    }
    assert_eq!(grouping.bucket_for("QQ"), DEFAULT_REGION);
    assert_eq!(grouping.bucket_for("fr"), "EU");
}

#[tokio::test]
async fn test_observations_count_per_locale() {
    let env = setup().await;
    let doc = json!({"heroImage": {
        "_path": "/content/dam/acme/production/fr_CA/shop/hero.json",
        "uri": "/img/fr.png"
    }});

    extract_and_store(&env.service, &doc, &src("raw-1", "ca-page", Some(1))).await;
    let refs = env
        .service
        .regions()
        .active_refs(SourceType::Upload)
        .await
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].locale_code, "fr_CA");
    assert_eq!(refs[0].geo_code, "CA");
    assert_eq!(refs[0].seen_count, 1);
    assert_eq!(refs[0].display_name, "Uploaded locale fr_CA");

    extract_and_store(&env.service, &doc, &src("raw-2", "ca-page", Some(2))).await;
    let refs = env
        .service
        .regions()
        .active_refs(SourceType::Upload)
        .await
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].seen_count, 2);
}

#[tokio::test]
async fn test_default_locale_is_not_observed() {
    let env = setup_with(|c| c.defaults.locale = "en_US".to_string()).await;
    let report = extract_and_store(
        &env.service,
        &json!({"heroImage": {"uri": "/img/plain.png"}}),
        &src("raw-1", "plain", Some(1)),
    )
    .await;
    assert_eq!(report.occurrences, 1);
    assert_eq!(report.observed_locales, 0);

    let rows = store::list_occurrences(env.service.pool(), "plain", Some(1))
        .await
        .unwrap();
    assert_eq!(rows[0].context.locale.as_deref(), Some("en_US"));
}

#[tokio::test]
async fn test_unusable_asset_node_is_skipped_without_error() {
    let env = setup().await;
    let report = extract_and_store(
        &env.service,
        &json!({"heroImage": {"viewportSmall": {"width": 320}, "alt": "  "}}),
        &src("raw-1", "broken", Some(1)),
    )
    .await;
    assert_eq!(report.status, ExtractionStatus::Completed);
    assert_eq!(report.discovered, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.occurrences, 0);
    assert!(slot_hashes(&env, "broken", Some(1)).await.is_empty());
}

#[tokio::test]
async fn test_failures_are_reported_not_raised() {
    let env = setup().await;
    let report = extract_and_store(
        &env.service,
        &json!({"heroImage": {"uri": "/x.png"}}),
        &src("raw-1", "  ", Some(1)),
    )
    .await;
    assert!(matches!(report.status, ExtractionStatus::Failed(_)));
    assert_eq!(report.occurrences, 0);
}

#[tokio::test]
async fn test_disabled_feature_writes_nothing() {
    let env = setup_with(|c| c.extraction.enabled = false).await;
    let report = extract_and_store(
        &env.service,
        &json!({"heroImage": {"uri": "/x.png"}}),
        &src("raw-1", "off", Some(1)),
    )
    .await;
    assert_eq!(report.status, ExtractionStatus::Disabled);
    assert_eq!(store::count_catalog(env.service.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_schema_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = Config::minimal(dir.path().join("assets.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    let service = AssetService::with_pool(config, pool, Arc::new(ManualClock::new(Utc::now())))
        .await
        .unwrap();

    let report = extract_and_store(
        &service,
        &json!({"heroImage": {"uri": "/x.png"}}),
        &src("raw-1", "s1", Some(1)),
    )
    .await;
    assert_eq!(report.status, ExtractionStatus::SchemaMissing);
}

#[tokio::test]
async fn test_hero_scenario_end_to_end() {
    let env = setup().await;
    let doc = json!({"hero": {"heroImage": {
        "_path": "/content/dam/acme/stage/ja_JP/mac/hero.json",
        "uri": "/img/hero.png",
        "alt": "Hero"
    }}});
    extract_and_store(&env.service, &doc, &src("raw-1", "s1", Some(1))).await;

    let rows = store::list_occurrences(env.service.pool(), "s1", Some(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].context.locale.as_deref(), Some("ja_JP"));
    assert_eq!(rows[0].context.geo.as_deref(), Some("JP"));
    assert_eq!(rows[0].context.site.as_deref(), Some("mac"));
    assert_eq!(rows[0].context.tenant.as_deref(), Some("acme"));
    assert_eq!(rows[0].context.environment.as_deref(), Some("stage"));

    let entry = store::get_catalog(env.service.pool(), &rows[0].catalog_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.asset_key, "heroImage");
    assert_eq!(entry.preview_uri.as_deref(), Some("/img/hero.png"));
    assert_eq!(entry.alt_text.as_deref(), Some("Hero"));

    let by_geo = search_assets(
        &env.service,
        &SearchRequest {
            geo: Some("JP".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_geo.count, 1);
    assert_eq!(by_geo.items[0].asset_key, "heroImage");

    let by_locale = search_assets(
        &env.service,
        &SearchRequest {
            locale: Some("ko_KR".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_locale.count, 0);
}

#[tokio::test]
async fn test_grouped_geo_translates_to_default_locale() {
    let env = setup().await;
    for (raw, locale) in [("raw-de", "de_DE"), ("raw-fr", "fr_FR")] {
        let doc = json!({"heroImage": {
            "_path": format!("/content/dam/acme/production/{}/shop/hero.json", locale),
            "uri": format!("/img/{}.png", locale)
        }});
        extract_and_store(&env.service, &doc, &src(raw, raw, Some(1))).await;
    }

    // EU is not a stored geo; it resolves to its first locale, de_DE.
    let eu = search_assets(
        &env.service,
        &SearchRequest {
            geo: Some("eu".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(eu.count, 1);
    assert_eq!(eu.items[0].locale.as_deref(), Some("de_DE"));

    // A country code outside any bucket label filters directly.
    let fr = search_assets(
        &env.service,
        &SearchRequest {
            geo: Some("FR".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(fr.count, 1);

    // Unobserved grouped label: dropped, so nothing is filtered out.
    let mea = search_assets(
        &env.service,
        &SearchRequest {
            geo: Some("MEA".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(mea.count, 2);
}

#[tokio::test]
async fn test_search_pages_newest_first() {
    let env = setup().await;
    for i in 0..5 {
        env.clock.advance(Duration::seconds(10));
        let doc = json!({"cardIcon": {"uri": format!("/icons/{}.svg", i)}});
        extract_and_store(&env.service, &doc, &src(&format!("raw-{}", i), &format!("doc-{}", i), Some(1))).await;
    }

    let page0 = search_assets(
        &env.service,
        &SearchRequest {
            size: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page0.count, 5);
    assert_eq!(page0.total_pages, 3);
    assert_eq!(page0.items[0].interactive_path.as_deref(), Some("/icons/4.svg"));

    let page2 = search_assets(
        &env.service,
        &SearchRequest {
            page: Some(2),
            size: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page2.items.len(), 1);
    assert_eq!(page2.items[0].interactive_path.as_deref(), Some("/icons/0.svg"));
}

#[tokio::test]
async fn test_request_metadata_wins_and_is_stored() {
    let env = setup().await;
    let doc = json!({"heroImage": {
        "_path": "/content/dam/acme/stage/ja_JP/mac/hero.json",
        "uri": "/img/hero.png"
    }});
    let source = source_document(
        "raw-1",
        "s1",
        Some(1),
        RequestMetadata {
            tenant: Some(" globex ".to_string()),
            locale: Some("ko-kr".to_string()),
            ..Default::default()
        },
    );
    extract_and_store(&env.service, &doc, &source).await;

    let rows = store::list_occurrences(env.service.pool(), "s1", Some(1))
        .await
        .unwrap();
    assert_eq!(rows[0].context.tenant.as_deref(), Some("globex"));
    assert_eq!(rows[0].context.locale.as_deref(), Some("ko_KR"));
    assert_eq!(rows[0].context.geo.as_deref(), Some("KR"));
    // Environment still comes from the path.
    assert_eq!(rows[0].context.environment.as_deref(), Some("stage"));

    let stored: Value = serde_json::from_str(&rows[0].request_metadata_json).unwrap();
    assert_eq!(stored, json!({"tenant": "globex", "locale": "ko_KR"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_extraction_of_different_documents() {
    let env = setup().await;
    let service = Arc::new(env.service);
    let locales = ["ja_JP", "fr_CA", "de_DE", "ko_KR"];

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        let locale = locales[i % locales.len()];
        handles.push(tokio::spawn(async move {
            let doc = json!({"hero": {"heroImage": {
                "_path": format!("/content/dam/acme/stage/{}/mac/hero-{}.json", locale, i),
                "uri": format!("/img/{}.png", i)
            }}});
            let source = src(&format!("raw-{}", i), &format!("s-{}", i), Some(1));
            extract_and_store(&service, &doc, &source).await
        }));
    }
    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.status, ExtractionStatus::Completed, "{}", report.raw_data_id);
        assert_eq!(report.occurrences, 1);
        assert_eq!(report.observed_locales, 1);
    }

    let refs = service
        .regions()
        .active_refs(SourceType::Upload)
        .await
        .unwrap();
    assert_eq!(refs.len(), 4);
    assert!(refs.iter().all(|r| r.seen_count == 4));
    assert_eq!(store::count_catalog(service.pool()).await.unwrap(), 16);
}

#[tokio::test]
async fn test_tracker_failure_keeps_extraction_completed() {
    let env = setup().await;
    sqlx::query(
        "CREATE TRIGGER reject_observation BEFORE INSERT ON region_locale_ref
         BEGIN SELECT RAISE(ABORT, 'observation rejected'); END",
    )
    .execute(env.service.pool())
    .await
    .unwrap();

    let doc = json!({"hero": {"heroImage": {
        "_path": "/content/dam/acme/stage/ja_JP/mac/hero.json",
        "uri": "/img/hero.png",
        "alt": "Hero"
    }}});
    let report = extract_and_store(&env.service, &doc, &src("raw-1", "s1", Some(1))).await;
    assert_eq!(report.status, ExtractionStatus::Completed);
    assert_eq!(report.occurrences, 1);
    assert_eq!(report.observed_locales, 0);
    assert_eq!(slot_hashes(&env, "s1", Some(1)).await.len(), 1);
    assert!(env
        .service
        .regions()
        .active_refs(SourceType::Upload)
        .await
        .unwrap()
        .is_empty());
}
