//! Core data types stored and served by the engine.
//!
//! Timestamps are epoch seconds. Embeddings travel as `Vec<f32>` in memory
//! and as little-endian f32 blobs in SQLite.

use serde::{Deserialize, Serialize};

/// A registered documentation source (one site / doc set).
#[derive(Debug, Clone, Serialize)]
pub struct DocSource {
    pub id: String,
    pub url: String,
    pub name: String,
    /// Free-form lifecycle label ("created", "indexing", "ready", ...).
    pub status: String,
    pub page_count: i64,
    pub chunk_count: i64,
    pub security_tier: String,
    pub config_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One indexed content unit with a stable ordinal position in its source.
#[derive(Debug, Clone, Serialize)]
pub struct DocChunk {
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub position: i64,
    pub embedding: Option<Vec<f32>>,
    pub has_code: bool,
    pub quality_score: f64,
    pub created_at: i64,
}

/// Validated chunk handed to the store by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub position: i64,
    pub embedding: Option<Vec<f32>>,
}

/// A crawl work item, created externally and persisted here.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeJob {
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Alert severity, ordered critical-first for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Sort rank; lower sorts first.
    pub fn rank(self) -> i64 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// A security finding raised by the validation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub id: String,
    pub source_id: Option<String>,
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    pub matched_pattern: Option<String>,
    pub detected_at: i64,
    pub resolved_at: Option<i64>,
    pub resolution_note: Option<String>,
}

/// Aggregate view over unresolved alerts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertStats {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
    /// Distinct sources with at least one unresolved alert.
    pub affected_sources: i64,
}

/// Review state of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarantineTier {
    Clean,
    Flagged,
    Quarantined,
    Blocked,
}

impl QuarantineTier {
    pub fn as_str(self) -> &'static str {
        match self {
            QuarantineTier::Clean => "clean",
            QuarantineTier::Flagged => "flagged",
            QuarantineTier::Quarantined => "quarantined",
            QuarantineTier::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(QuarantineTier::Clean),
            "flagged" => Some(QuarantineTier::Flagged),
            "quarantined" => Some(QuarantineTier::Quarantined),
            "blocked" => Some(QuarantineTier::Blocked),
            _ => None,
        }
    }

    /// Tiers that wait for human review.
    pub fn is_pending(self) -> bool {
        matches!(self, QuarantineTier::Flagged | QuarantineTier::Quarantined)
    }
}

/// A content snapshot held for review before it can contribute to search.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineItem {
    pub id: String,
    pub source_id: Option<String>,
    pub source_url: String,
    pub source_name: String,
    pub tier: QuarantineTier,
    pub fingerprint: String,
    pub preview: String,
    pub stats_json: String,
    pub validated_at: i64,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub review_action: Option<String>,
}

/// A full-text match as the store reports it. `cost` is the raw bm25 rank:
/// lower is better, never comparable with similarity scores.
#[derive(Debug, Clone)]
pub struct FtsMatch {
    pub chunk_id: String,
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub cost: f64,
}

/// A ranked result leaving the search service. `score` is relevance,
/// higher is better.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub snippet: Option<String>,
}

// ============ Embedding blob helpers ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// length-mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
