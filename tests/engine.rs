//! End-to-end tests over a real on-disk store: source lifecycle, index
//! parity, search ranking, quarantine review, and the disabled-backend
//! degradation path.

use std::sync::Arc;

use docdex::config::RetrievalConfig;
use docdex::error::Error;
use docdex::models::{NewChunk, QuarantineTier, Severity};
use docdex::quarantine::{QuarantineService, ValidatedContent};
use docdex::search::{SearchOptions, SearchService};
use docdex::store::{ContentStore, NewAlert, NewSource};
use docdex::vector::disabled::DisabledBackend;
use docdex::vector::registry::BackendRegistry;
use docdex::vector::{VectorItem, VectorSearchOptions};
use tempfile::TempDir;

async fn open_store() -> (TempDir, Arc<ContentStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = ContentStore::open(&dir.path().join("docs.sqlite"))
        .await
        .unwrap();
    (dir, Arc::new(store))
}

fn search_service(store: Arc<ContentStore>) -> SearchService {
    let registry = Arc::new(BackendRegistry::new(vec![Arc::new(DisabledBackend)]));
    SearchService::new(store, registry, RetrievalConfig::default())
}

fn chunk(source_id: &str, position: i64, title: &str, content: &str) -> NewChunk {
    NewChunk {
        source_id: source_id.to_string(),
        url: format!("https://ex.test/page/{position}"),
        title: title.to_string(),
        content: content.to_string(),
        position,
        embedding: None,
    }
}

#[tokio::test]
async fn duplicate_source_url_is_rejected() {
    let (_dir, store) = open_store().await;

    store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: Some("Example".into()),
            config_json: None,
        })
        .await
        .unwrap();

    let err = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateUrl(_)));

    // A different url is fine.
    store
        .create_source(NewSource {
            url: "https://other.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();
    assert_eq!(store.list_sources().await.unwrap().len(), 2);
}

#[tokio::test]
async fn stored_chunks_are_searchable_until_cleared() {
    let (_dir, store) = open_store().await;
    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: Some("Example".into()),
            config_json: None,
        })
        .await
        .unwrap();

    let ids = store
        .store_chunks(vec![
            chunk(&source.id, 0, "Auth", "Use a bearer token for every request."),
            chunk(&source.id, 1, "Limits", "Rate limits apply per token per minute."),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    // Chunk counter refreshed inside the same transaction.
    assert_eq!(store.get_source(&source.id).await.unwrap().chunk_count, 2);

    let matches = store.search_chunks("bearer", None, 10).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].title, "Auth");
    assert_eq!(matches[0].source_name, "Example");

    // Clearing removes both the rows and the index entries.
    assert_eq!(store.clear_chunks(&source.id).await.unwrap(), 2);
    assert!(store.search_chunks("bearer", None, 10).await.unwrap().is_empty());
    assert_eq!(store.get_source(&source.id).await.unwrap().chunk_count, 0);
}

#[tokio::test]
async fn empty_chunk_batch_is_a_validation_error() {
    let (_dir, store) = open_store().await;
    let err = store.store_chunks(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn chunks_survive_quotes_and_backslashes() {
    let (_dir, store) = open_store().await;
    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();

    let tricky = r#"Set "PATH" to C:\tools\bin; escape with \" and '\n'."#;
    let id = store
        .store_chunk(chunk(&source.id, 0, r#"A "quoted" title"#, tricky))
        .await
        .unwrap();

    let fetched = store.get_chunk(&id).await.unwrap();
    assert_eq!(fetched.content, tricky);
    assert_eq!(fetched.title, r#"A "quoted" title"#);

    // Punctuation-heavy queries still match through sanitization.
    let matches = store.search_chunks(r#""PATH"!"#, None, 10).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn match_operator_words_are_plain_terms() {
    let (_dir, store) = open_store().await;
    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();
    store
        .store_chunk(chunk(&source.id, 0, "Tradeoffs", "weigh pros and cons"))
        .await
        .unwrap();

    // Uppercase OR/AND/NOT/NEAR in user input must not reach FTS5 as
    // operators.
    let matches = store.search_chunks("pros OR cons", None, 10).await.unwrap();
    assert_eq!(matches.len(), 1);

    let matches = store.search_chunks("pros AND NOT NEAR", None, 10).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn source_filter_restricts_matches() {
    let (_dir, store) = open_store().await;
    let a = store
        .create_source(NewSource {
            url: "https://a.test/".into(),
            name: Some("A".into()),
            config_json: None,
        })
        .await
        .unwrap();
    let b = store
        .create_source(NewSource {
            url: "https://b.test/".into(),
            name: Some("B".into()),
            config_json: None,
        })
        .await
        .unwrap();

    store
        .store_chunks(vec![
            chunk(&a.id, 0, "Auth", "bearer token usage"),
            chunk(&b.id, 0, "Auth", "bearer token usage"),
        ])
        .await
        .unwrap();

    let all = store.search_chunks("bearer", None, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_b = store
        .search_chunks("bearer", Some(&[b.id.clone()]), 10)
        .await
        .unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0].source_id, b.id);
}

#[tokio::test]
async fn end_to_end_search_with_snippets_and_removal() {
    let (_dir, store) = open_store().await;
    let service = search_service(Arc::clone(&store));

    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: Some("Example Docs".into()),
            config_json: None,
        })
        .await
        .unwrap();
    store
        .store_chunk(chunk(
            &source.id,
            0,
            "Auth",
            "To authenticate, send a bearer token.",
        ))
        .await
        .unwrap();

    let hits = service
        .search(
            "authenticate",
            &SearchOptions {
                with_snippets: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score.is_finite());
    assert_eq!(hits[0].source_name, "Example Docs");
    assert!(hits[0]
        .snippet
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("authenticate"));

    // Removal cascades: no hits, no source, no chunks.
    store.remove_source(&source.id).await.unwrap();
    assert!(service
        .search("authenticate", &SearchOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        store.get_source(&source.id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn min_score_filters_and_limit_truncates() {
    let (_dir, store) = open_store().await;
    let service = search_service(Arc::clone(&store));

    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();
    let chunks: Vec<NewChunk> = (0..5)
        .map(|i| chunk(&source.id, i, "Guide", &format!("token guide part {i}")))
        .collect();
    store.store_chunks(chunks).await.unwrap();

    let hits = service
        .search(
            "token",
            &SearchOptions {
                limit: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);

    // bm25 relevance is negative; an impossible floor drops everything.
    let none = service
        .search(
            "token",
            &SearchOptions {
                min_score: Some(1_000.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn grouped_search_caps_hits_per_source() {
    let (_dir, store) = open_store().await;
    let service = search_service(Arc::clone(&store));

    let a = store
        .create_source(NewSource {
            url: "https://a.test/".into(),
            name: Some("A".into()),
            config_json: None,
        })
        .await
        .unwrap();
    let b = store
        .create_source(NewSource {
            url: "https://b.test/".into(),
            name: Some("B".into()),
            config_json: None,
        })
        .await
        .unwrap();

    let mut chunks = Vec::new();
    for i in 0..4 {
        chunks.push(chunk(&a.id, i, "Guide", "token token token guide"));
    }
    chunks.push(chunk(&b.id, 0, "Note", "a single token mention"));
    store.store_chunks(chunks).await.unwrap();

    let groups = service
        .search_grouped("token", &SearchOptions::default(), 2)
        .await
        .unwrap();
    assert_eq!(groups.len(), 2);
    for group in &groups {
        assert!(group.hits.len() <= 2);
    }
    let names: Vec<&str> = groups.iter().map(|g| g.source_name.as_str()).collect();
    assert!(names.contains(&"A") && names.contains(&"B"));
}

#[tokio::test]
async fn disabled_backend_degrades_similarity_to_empty() {
    let (_dir, store) = open_store().await;
    let service = search_service(Arc::clone(&store));

    let registry = BackendRegistry::new(vec![Arc::new(DisabledBackend)]);
    let backend = registry.detect().await;
    assert_eq!(backend.name(), "disabled");

    // Writes are accepted and dropped.
    registry
        .store(VectorItem {
            chunk_id: "c1".into(),
            source_id: "s1".into(),
            embedding: vec![0.1; 8],
        })
        .await
        .unwrap();

    let similar = service
        .similar(&[0.1; 8], &VectorSearchOptions::default())
        .await
        .unwrap();
    assert!(similar.is_empty());
}

#[tokio::test]
async fn quarantine_actions_map_to_tiers() {
    let (_dir, store) = open_store().await;
    let service = QuarantineService::new(Arc::clone(&store));

    let cases = [
        ("approve", QuarantineTier::Clean),
        ("reject", QuarantineTier::Blocked),
        ("keep_flagged", QuarantineTier::Flagged),
        ("escalate", QuarantineTier::Quarantined),
    ];

    for (action, expected) in cases {
        let item = service
            .ingest(ValidatedContent {
                source_id: None,
                source_url: format!("https://ex.test/{action}"),
                source_name: "ex".into(),
                tier: QuarantineTier::Quarantined,
                content: "held content".into(),
            })
            .await
            .unwrap();

        let reviewed = service.review(&item.id, "alice", action).await.unwrap();
        assert_eq!(reviewed.tier, expected, "action {action}");
        assert!(reviewed.reviewed_at.is_some());
        assert_eq!(reviewed.review_action.as_deref(), Some(action));
    }

    // Every item above was reviewed, so nothing is pending.
    assert!(service.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn clean_items_never_enter_the_pending_queue() {
    let (_dir, store) = open_store().await;
    let service = QuarantineService::new(Arc::clone(&store));

    service
        .ingest(ValidatedContent {
            source_id: None,
            source_url: "https://ex.test/clean".into(),
            source_name: "ex".into(),
            tier: QuarantineTier::Clean,
            content: "harmless".into(),
        })
        .await
        .unwrap();
    service
        .ingest(ValidatedContent {
            source_id: None,
            source_url: "https://ex.test/flagged".into(),
            source_name: "ex".into(),
            tier: QuarantineTier::Flagged,
            content: "iffy".into(),
        })
        .await
        .unwrap();

    let pending = service.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_url, "https://ex.test/flagged");
}

#[tokio::test]
async fn alerts_order_by_severity_then_recency() {
    let (_dir, store) = open_store().await;

    for severity in [Severity::Low, Severity::Medium, Severity::Critical, Severity::High] {
        store
            .store_alert(NewAlert {
                source_id: None,
                alert_type: "pattern".into(),
                severity,
                description: format!("{} finding", severity.as_str()),
                matched_pattern: None,
            })
            .await
            .unwrap();
    }

    // A second critical alert, backdated so the two differ in detected_at.
    let older = store
        .store_alert(NewAlert {
            source_id: None,
            alert_type: "pattern".into(),
            severity: Severity::Critical,
            description: "older critical finding".into(),
            matched_pattern: None,
        })
        .await
        .unwrap();
    sqlx::query("UPDATE security_alerts SET detected_at = detected_at - 100 WHERE id = ?")
        .bind(&older.id)
        .execute(store.pool())
        .await
        .unwrap();

    let alerts = store.unresolved_alerts(None).await.unwrap();
    let severities: Vec<Severity> = alerts.iter().map(|a| a.severity).collect();
    assert_eq!(
        severities,
        vec![
            Severity::Critical,
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low
        ]
    );
    // Within the critical tier the newer alert sorts first.
    assert_eq!(alerts[0].description, "critical finding");
    assert_eq!(alerts[1].id, older.id);
    assert!(alerts[0].detected_at > alerts[1].detected_at);

    let stats = store.alert_stats().await.unwrap();
    assert_eq!(stats.critical, 2);
    assert_eq!(stats.high, 1);
    assert_eq!(stats.medium, 1);
    assert_eq!(stats.low, 1);
    assert_eq!(stats.affected_sources, 0);

    // Resolving removes the alert from the unresolved view, once.
    let first = alerts[0].id.clone();
    store.resolve_alert(&first, Some("false positive")).await.unwrap();
    assert_eq!(store.unresolved_alerts(None).await.unwrap().len(), 4);
    assert!(store.resolve_alert(&first, None).await.is_err());
}

#[tokio::test]
async fn job_updates_track_failed_attempts() {
    let (_dir, store) = open_store().await;
    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();

    let job = store
        .store_job(docdex::store::NewJob {
            source_id: source.id.clone(),
            url: "https://ex.test/page".into(),
            status: "pending".into(),
        })
        .await
        .unwrap();
    assert_eq!(job.attempts, 0);

    let failed = store
        .update_job(&job.id, "failed", Some("timeout"))
        .await
        .unwrap();
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.last_error.as_deref(), Some("timeout"));

    let done = store.update_job(&job.id, "done", None).await.unwrap();
    assert_eq!(done.attempts, 1);

    // Jobs are gone after source removal.
    store.remove_source(&source.id).await.unwrap();
    assert!(store.get_job(&job.id).await.is_err());
}

#[tokio::test]
async fn store_stats_reflect_state() {
    let (_dir, store) = open_store().await;
    let source = store
        .create_source(NewSource {
            url: "https://ex.test/".into(),
            name: None,
            config_json: None,
        })
        .await
        .unwrap();

    let mut with_embedding = chunk(&source.id, 0, "A", "alpha beta");
    with_embedding.embedding = Some(vec![0.1, 0.2, 0.3]);
    store
        .store_chunks(vec![with_embedding, chunk(&source.id, 1, "B", "gamma delta")])
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sources, 1);
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.embedded_chunks, 1);
    assert_eq!(stats.unresolved_alerts, 0);
    assert_eq!(stats.pending_quarantine, 0);
}
