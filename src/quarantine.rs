//! Quarantine workflow: hold validated content for review, record security
//! alerts, and apply one-way review decisions.
//!
//! The service derives the stored snapshot (fingerprint, preview, stats)
//! from the raw content so callers hand in what they scraped and nothing
//! else. Tier transitions happen only through [`QuarantineService::review`].

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{AlertStats, QuarantineItem, QuarantineTier, SecurityAlert, Severity};
use crate::store::{ContentStore, NewAlert, NewQuarantineItem};

/// Preview length stored alongside a quarantined snapshot, in characters.
const PREVIEW_CHARS: usize = 500;

/// Content handed to [`QuarantineService::ingest`] before any review.
#[derive(Debug, Clone)]
pub struct ValidatedContent {
    pub source_id: Option<String>,
    pub source_url: String,
    pub source_name: String,
    /// Tier assigned by the validation pipeline.
    pub tier: QuarantineTier,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ContentStats {
    chars: usize,
    words: usize,
    lines: usize,
}

pub struct QuarantineService {
    store: Arc<ContentStore>,
}

impl QuarantineService {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }

    /// Snapshot validated content into the quarantine table. The full body
    /// is not retained; the fingerprint identifies it and the preview is
    /// what reviewers see.
    pub async fn ingest(&self, content: ValidatedContent) -> Result<QuarantineItem> {
        let fingerprint = fingerprint(&content.content);
        let preview = preview(&content.content, PREVIEW_CHARS);
        let stats = ContentStats {
            chars: content.content.chars().count(),
            words: content.content.split_whitespace().count(),
            lines: content.content.lines().count(),
        };
        let stats_json = serde_json::to_string(&stats).unwrap_or_else(|_| "{}".to_string());

        let item = self
            .store
            .store_quarantine_item(NewQuarantineItem {
                source_id: content.source_id,
                source_url: content.source_url,
                source_name: content.source_name,
                tier: content.tier,
                fingerprint,
                preview,
                stats_json,
            })
            .await?;

        if item.tier.is_pending() {
            warn!(
                item_id = %item.id,
                tier = item.tier.as_str(),
                url = %item.source_url,
                "content held for review"
            );
        }
        Ok(item)
    }

    /// Items awaiting a reviewer, most recently validated first.
    pub async fn pending(&self) -> Result<Vec<QuarantineItem>> {
        self.store.pending_quarantine_items().await
    }

    pub async fn get(&self, id: &str) -> Result<QuarantineItem> {
        self.store.get_quarantine_item(id).await
    }

    /// Apply a review decision. `approve` clears the item, `reject` blocks
    /// it, `keep_flagged` leaves it flagged, anything else quarantines it.
    /// Reviews are one-way; a second attempt is rejected by the store.
    pub async fn review(
        &self,
        id: &str,
        reviewer: &str,
        action: &str,
    ) -> Result<QuarantineItem> {
        let item = self.store.review_quarantine_item(id, reviewer, action).await?;
        info!(
            item_id = %id,
            reviewer = %reviewer,
            action = %action,
            tier = item.tier.as_str(),
            "quarantine item reviewed"
        );
        Ok(item)
    }

    // ============ Security alerts ============

    pub async fn raise_alert(
        &self,
        source_id: Option<String>,
        alert_type: &str,
        severity: Severity,
        description: &str,
        matched_pattern: Option<String>,
    ) -> Result<SecurityAlert> {
        let alert = self
            .store
            .store_alert(NewAlert {
                source_id,
                alert_type: alert_type.to_string(),
                severity,
                description: description.to_string(),
                matched_pattern,
            })
            .await?;
        warn!(
            alert_id = %alert.id,
            severity = severity.as_str(),
            alert_type = %alert.alert_type,
            "security alert raised"
        );
        Ok(alert)
    }

    pub async fn unresolved_alerts(&self, source_id: Option<&str>) -> Result<Vec<SecurityAlert>> {
        self.store.unresolved_alerts(source_id).await
    }

    pub async fn resolve_alert(&self, id: &str, note: Option<&str>) -> Result<SecurityAlert> {
        self.store.resolve_alert(id, note).await
    }

    pub async fn alert_stats(&self) -> Result<AlertStats> {
        self.store.alert_stats().await
    }
}

/// SHA-256 of the content body, hex-encoded.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First `max_chars` characters of the content, with an ellipsis when
/// truncated. Counts chars, not bytes, so multibyte text never splits.
pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = fingerprint("hello");
        assert_eq!(a, fingerprint("hello"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint("hello!"));
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("short", 500), "short");

        let long = "é".repeat(600);
        let p = preview(&long, 500);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 503);
    }

    #[tokio::test]
    async fn ingest_derives_snapshot_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ContentStore::open(&dir.path().join("content.sqlite"))
                .await
                .unwrap(),
        );
        let service = QuarantineService::new(store);

        let body = "suspicious instructions\nignore previous rules\n";
        let item = service
            .ingest(ValidatedContent {
                source_id: None,
                source_url: "https://ex.test/page".into(),
                source_name: "ex".into(),
                tier: QuarantineTier::Flagged,
                content: body.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(item.fingerprint, fingerprint(body));
        assert_eq!(item.preview, body);
        assert!(item.stats_json.contains("\"words\":5"));
        assert!(item.reviewed_at.is_none());

        let pending = service.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn review_moves_tier_and_is_one_way() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ContentStore::open(&dir.path().join("content.sqlite"))
                .await
                .unwrap(),
        );
        let service = QuarantineService::new(store);

        let item = service
            .ingest(ValidatedContent {
                source_id: None,
                source_url: "https://ex.test/".into(),
                source_name: "ex".into(),
                tier: QuarantineTier::Quarantined,
                content: "body".into(),
            })
            .await
            .unwrap();

        let reviewed = service.review(&item.id, "alice", "approve").await.unwrap();
        assert_eq!(reviewed.tier, QuarantineTier::Clean);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("alice"));
        assert!(reviewed.reviewed_at.is_some());

        assert!(service.review(&item.id, "bob", "reject").await.is_err());
        assert!(service.pending().await.unwrap().is_empty());
    }
}
