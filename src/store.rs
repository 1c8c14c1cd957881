//! Durable content storage: sources, chunks, scrape jobs, alerts, and
//! quarantine items, plus the FTS5 full-text index over chunk title+content.
//!
//! All writes flow through a single-connection pool, so they never
//! interleave and batch inserts are atomic by construction. FTS entries are
//! derived data: they are written in the same transaction as their chunk
//! rows and can always be rebuilt from them.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{
    blob_to_vec, vec_to_blob, AlertStats, DocChunk, DocSource, FtsMatch, NewChunk,
    QuarantineItem, QuarantineTier, ScrapeJob, SecurityAlert, Severity,
};

/// Input for [`ContentStore::create_source`].
#[derive(Debug, Clone)]
pub struct NewSource {
    pub url: String,
    pub name: Option<String>,
    pub config_json: Option<String>,
}

/// Partial update applied to a source row.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub status: Option<String>,
    pub page_count: Option<i64>,
    pub chunk_count: Option<i64>,
    pub security_tier: Option<String>,
}

/// Input for [`ContentStore::store_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub source_id: String,
    pub url: String,
    pub status: String,
}

/// Input for [`ContentStore::store_alert`].
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub source_id: Option<String>,
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    pub matched_pattern: Option<String>,
}

/// Input for [`ContentStore::store_quarantine_item`]. The fingerprint and
/// preview are produced upstream (see `quarantine::QuarantineService`).
#[derive(Debug, Clone)]
pub struct NewQuarantineItem {
    pub source_id: Option<String>,
    pub source_url: String,
    pub source_name: String,
    pub tier: QuarantineTier,
    pub fingerprint: String,
    pub preview: String,
    pub stats_json: String,
}

/// Headline counts for status displays.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub sources: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub unresolved_alerts: i64,
    pub pending_quarantine: i64,
}

pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    /// Open (creating if necessary) the store at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared connections).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Sources ============

    pub async fn create_source(&self, new: NewSource) -> Result<DocSource> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM sources WHERE url = ?")
                .bind(&new.url)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(Error::DuplicateUrl(new.url));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let name = new.name.unwrap_or_else(|| new.url.clone());
        let config_json = new.config_json.unwrap_or_else(|| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO sources (id, url, name, status, page_count, chunk_count,
                                 security_tier, config_json, created_at, updated_at)
            VALUES (?, ?, ?, 'created', 0, 0, 'clean', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.url)
        .bind(&name)
        .bind(&config_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(source_id = %id, url = %new.url, "created source");
        self.get_source(&id).await
    }

    pub async fn get_source(&self, id: &str) -> Result<DocSource> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| source_from_row(&r))
            .ok_or_else(|| Error::not_found("source", id))
    }

    pub async fn get_source_by_url(&self, url: &str) -> Result<Option<DocSource>> {
        let row = sqlx::query("SELECT * FROM sources WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| source_from_row(&r)))
    }

    pub async fn source_exists(&self, url: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_sources(&self) -> Result<Vec<DocSource>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    pub async fn update_source(&self, id: &str, update: SourceUpdate) -> Result<DocSource> {
        let current = self.get_source(id).await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sources
            SET status = ?, page_count = ?, chunk_count = ?, security_tier = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.unwrap_or(current.status))
        .bind(update.page_count.unwrap_or(current.page_count))
        .bind(update.chunk_count.unwrap_or(current.chunk_count))
        .bind(update.security_tier.unwrap_or(current.security_tier))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_source(id).await
    }

    /// Remove a source and everything derived from it: FTS entries, chunks,
    /// scrape jobs, alerts, then the source row, in one transaction so a
    /// partial failure never leaves orphaned index entries.
    pub async fn remove_source(&self, id: &str) -> Result<()> {
        // Verify existence up front so a bad id is a NotFound, not a no-op.
        self.get_source(id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scrape_jobs WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM security_alerts WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(source_id = %id, "removed source");
        Ok(())
    }

    // ============ Chunks ============

    pub async fn store_chunk(&self, chunk: NewChunk) -> Result<String> {
        let ids = self.store_chunks(vec![chunk]).await?;
        Ok(ids.into_iter().next().expect("one chunk inserted"))
    }

    /// Insert a batch of chunks in one transaction: all chunks succeed or
    /// none, and each is mirrored into the FTS index in the same unit. The
    /// owning sources' chunk counts are refreshed inside the transaction.
    pub async fn store_chunks(&self, chunks: Vec<NewChunk>) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Err(Error::Validation("empty chunk batch".into()));
        }

        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(chunks.len());
        let mut source_ids: Vec<String> = Vec::new();

        let mut tx = self.pool.begin().await?;

        for chunk in &chunks {
            let id = Uuid::new_v4().to_string();
            let has_code = detect_code(&chunk.content);
            let quality = quality_score(&chunk.title, &chunk.content);
            let blob = chunk.embedding.as_ref().map(|e| vec_to_blob(e));

            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, url, title, content, position,
                                    embedding, has_code, quality_score, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&chunk.source_id)
            .bind(&chunk.url)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(chunk.position)
            .bind(blob)
            .bind(has_code as i64)
            .bind(quality)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, source_id, title, content) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&chunk.source_id)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
            if !source_ids.contains(&chunk.source_id) {
                source_ids.push(chunk.source_id.clone());
            }
        }

        for source_id in &source_ids {
            sqlx::query(
                r#"
                UPDATE sources
                SET chunk_count = (SELECT COUNT(*) FROM chunks WHERE source_id = ?),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(source_id)
            .bind(now)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = ids.len(), "stored chunk batch");
        Ok(ids)
    }

    /// Delete all chunks and FTS entries for a source. Must run before a
    /// source is re-indexed.
    pub async fn clear_chunks(&self, source_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("UPDATE sources SET chunk_count = 0 WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn get_chunk(&self, id: &str) -> Result<DocChunk> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| chunk_from_row(&r))
            .ok_or_else(|| Error::not_found("chunk", id))
    }

    /// Fetch a set of chunks by id. Missing ids are skipped, not errors;
    /// the caller decides whether a gap matters.
    pub async fn get_chunks(&self, ids: &[String]) -> Result<Vec<DocChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new("SELECT * FROM chunks WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    pub async fn chunks_for_source(&self, source_id: &str) -> Result<Vec<DocChunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE source_id = ? ORDER BY position")
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    // ============ Full-text search ============

    /// Ranked FTS5 match over chunk title+content. Returns raw bm25 cost
    /// (lower = better). `source_ids` optionally restricts the match.
    pub async fn search_chunks(
        &self,
        query: &str,
        source_ids: Option<&[String]>,
        limit: i64,
    ) -> Result<Vec<FtsMatch>> {
        let sanitized = sanitize_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id, c.source_id AS source_id,
                   s.name AS source_name, c.url AS url, c.title AS title,
                   c.content AS content, chunks_fts.rank AS cost
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            JOIN sources s ON s.id = c.source_id
            WHERE chunks_fts MATCH
            "#,
        );
        builder.push_bind(&sanitized);

        if let Some(filter) = source_ids {
            if !filter.is_empty() {
                builder.push(" AND c.source_id IN (");
                let mut separated = builder.separated(", ");
                for id in filter {
                    separated.push_bind(id);
                }
                separated.push_unseparated(")");
            }
        }

        builder.push(" ORDER BY chunks_fts.rank LIMIT ");
        builder.push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| FtsMatch {
                chunk_id: row.get("chunk_id"),
                source_id: row.get("source_id"),
                source_name: row.get("source_name"),
                url: row.get("url"),
                title: row.get("title"),
                content: row.get("content"),
                cost: row.get("cost"),
            })
            .collect())
    }

    // ============ Scrape jobs ============

    pub async fn store_job(&self, new: NewJob) -> Result<ScrapeJob> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO scrape_jobs (id, source_id, url, status, attempts, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.source_id)
        .bind(&new.url)
        .bind(&new.status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_job(&id).await
    }

    /// Update a job's status. A non-empty `last_error` records a failed
    /// attempt and bumps the attempt counter.
    pub async fn update_job(
        &self,
        id: &str,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<ScrapeJob> {
        let now = chrono::Utc::now().timestamp();
        let bump = if last_error.is_some() { 1 } else { 0 };

        let affected = sqlx::query(
            r#"
            UPDATE scrape_jobs
            SET status = ?, last_error = ?, attempts = attempts + ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(last_error)
        .bind(bump)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::not_found("scrape job", id));
        }
        self.get_job(id).await
    }

    pub async fn get_job(&self, id: &str) -> Result<ScrapeJob> {
        let row = sqlx::query("SELECT * FROM scrape_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| job_from_row(&r))
            .ok_or_else(|| Error::not_found("scrape job", id))
    }

    pub async fn jobs_for_source(&self, source_id: &str) -> Result<Vec<ScrapeJob>> {
        let rows =
            sqlx::query("SELECT * FROM scrape_jobs WHERE source_id = ? ORDER BY created_at")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    // ============ Security alerts ============

    pub async fn store_alert(&self, new: NewAlert) -> Result<SecurityAlert> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO security_alerts (id, source_id, alert_type, severity, description,
                                         matched_pattern, detected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.source_id)
        .bind(&new.alert_type)
        .bind(new.severity.as_str())
        .bind(&new.description)
        .bind(&new.matched_pattern)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_alert(&id).await
    }

    pub async fn get_alert(&self, id: &str) -> Result<SecurityAlert> {
        let row = sqlx::query("SELECT * FROM security_alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| alert_from_row(&r))
            .ok_or_else(|| Error::not_found("alert", id))
    }

    /// Unresolved alerts, most severe first, most recent first within a
    /// severity. Optionally restricted to one source.
    pub async fn unresolved_alerts(
        &self,
        source_id: Option<&str>,
    ) -> Result<Vec<SecurityAlert>> {
        let order = r#"
            ORDER BY CASE severity
                WHEN 'critical' THEN 0
                WHEN 'high' THEN 1
                WHEN 'medium' THEN 2
                ELSE 3
            END, detected_at DESC
        "#;

        let rows = match source_id {
            Some(sid) => {
                sqlx::query(&format!(
                    "SELECT * FROM security_alerts WHERE resolved_at IS NULL AND source_id = ? {order}"
                ))
                .bind(sid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT * FROM security_alerts WHERE resolved_at IS NULL {order}"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(alert_from_row).collect())
    }

    pub async fn resolve_alert(&self, id: &str, note: Option<&str>) -> Result<SecurityAlert> {
        let now = chrono::Utc::now().timestamp();
        let affected = sqlx::query(
            "UPDATE security_alerts SET resolved_at = ?, resolution_note = ? WHERE id = ? AND resolved_at IS NULL",
        )
        .bind(now)
        .bind(note)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            // Either missing or already resolved; distinguish.
            let existing = self.get_alert(id).await?;
            return Err(Error::Validation(format!(
                "alert {} already resolved at {}",
                id,
                existing.resolved_at.unwrap_or_default()
            )));
        }
        self.get_alert(id).await
    }

    /// Recompute unresolved alert counts by severity plus distinct affected
    /// sources. Always computed on demand, never cached.
    pub async fn alert_stats(&self) -> Result<AlertStats> {
        let rows = sqlx::query(
            "SELECT severity, COUNT(*) AS n FROM security_alerts WHERE resolved_at IS NULL GROUP BY severity",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = AlertStats::default();
        for row in &rows {
            let severity: String = row.get("severity");
            let n: i64 = row.get("n");
            match Severity::parse(&severity) {
                Some(Severity::Critical) => stats.critical = n,
                Some(Severity::High) => stats.high = n,
                Some(Severity::Medium) => stats.medium = n,
                Some(Severity::Low) | None => stats.low += n,
            }
        }

        stats.affected_sources = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT source_id) FROM security_alerts WHERE resolved_at IS NULL AND source_id IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    // ============ Quarantine ============

    pub async fn store_quarantine_item(&self, new: NewQuarantineItem) -> Result<QuarantineItem> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO quarantine_items (id, source_id, source_url, source_name, tier,
                                          fingerprint, preview, stats_json, validated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.source_id)
        .bind(&new.source_url)
        .bind(&new.source_name)
        .bind(new.tier.as_str())
        .bind(&new.fingerprint)
        .bind(&new.preview)
        .bind(&new.stats_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_quarantine_item(&id).await
    }

    pub async fn get_quarantine_item(&self, id: &str) -> Result<QuarantineItem> {
        let row = sqlx::query("SELECT * FROM quarantine_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| quarantine_from_row(&r))
            .ok_or_else(|| Error::not_found("quarantine item", id))
    }

    /// Unreviewed items with tier flagged or quarantined, most recent first.
    pub async fn pending_quarantine_items(&self) -> Result<Vec<QuarantineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM quarantine_items
            WHERE reviewed_at IS NULL AND tier IN ('flagged', 'quarantined')
            ORDER BY validated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(quarantine_from_row).collect())
    }

    /// Apply a one-way review: stamp reviewer/time/action and move the item
    /// to the tier the action maps to. A second review is rejected.
    pub async fn review_quarantine_item(
        &self,
        id: &str,
        reviewer: &str,
        action: &str,
    ) -> Result<QuarantineItem> {
        let item = self.get_quarantine_item(id).await?;
        if item.reviewed_at.is_some() {
            return Err(Error::Validation(format!(
                "quarantine item {} already reviewed",
                id
            )));
        }

        let tier = tier_for_action(action);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE quarantine_items
            SET tier = ?, reviewed_by = ?, reviewed_at = ?, review_action = ?
            WHERE id = ?
            "#,
        )
        .bind(tier.as_str())
        .bind(reviewer)
        .bind(now)
        .bind(action)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_quarantine_item(id).await
    }

    // ============ Stats ============

    pub async fn stats(&self) -> Result<StoreStats> {
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        let unresolved_alerts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM security_alerts WHERE resolved_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        let pending_quarantine: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM quarantine_items WHERE reviewed_at IS NULL AND tier IN ('flagged', 'quarantined')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            sources,
            chunks,
            embedded_chunks,
            unresolved_alerts,
            pending_quarantine,
        })
    }
}

/// Fixed review action → tier map. Unknown actions keep the item
/// quarantined.
pub fn tier_for_action(action: &str) -> QuarantineTier {
    match action {
        "approve" => QuarantineTier::Clean,
        "reject" => QuarantineTier::Blocked,
        "keep_flagged" => QuarantineTier::Flagged,
        _ => QuarantineTier::Quarantined,
    }
}

/// Normalize a user query into an FTS5 match expression: strip punctuation,
/// collapse whitespace, OR-join the remaining terms so any term can match.
/// Each term is quoted so words like OR, AND, NOT, NEAR stay plain terms
/// instead of being parsed as FTS5 operators.
pub fn sanitize_query(query: &str) -> String {
    query_terms(query)
        .iter()
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// The alphanumeric terms of a raw query, punctuation stripped.
pub fn query_terms(query: &str) -> Vec<String> {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Cheap code detection: fenced blocks or repeated 4-space indents.
fn detect_code(content: &str) -> bool {
    if content.contains("```") {
        return true;
    }
    content
        .lines()
        .filter(|line| line.starts_with("    ") && !line.trim().is_empty())
        .count()
        >= 2
}

/// Rough usefulness heuristic in [0, 1]: grows with content length, with a
/// small bonus for a real title.
fn quality_score(title: &str, content: &str) -> f64 {
    let words = content.split_whitespace().count() as f64;
    let base = (words / 200.0).min(0.9);
    let bonus = if title.trim().is_empty() { 0.0 } else { 0.1 };
    base + bonus
}

// ============ Row mapping ============

fn source_from_row(row: &SqliteRow) -> DocSource {
    DocSource {
        id: row.get("id"),
        url: row.get("url"),
        name: row.get("name"),
        status: row.get("status"),
        page_count: row.get("page_count"),
        chunk_count: row.get("chunk_count"),
        security_tier: row.get("security_tier"),
        config_json: row.get("config_json"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn chunk_from_row(row: &SqliteRow) -> DocChunk {
    let blob: Option<Vec<u8>> = row.get("embedding");
    DocChunk {
        id: row.get("id"),
        source_id: row.get("source_id"),
        url: row.get("url"),
        title: row.get("title"),
        content: row.get("content"),
        position: row.get("position"),
        embedding: blob.map(|b| blob_to_vec(&b)),
        has_code: row.get::<i64, _>("has_code") != 0,
        quality_score: row.get("quality_score"),
        created_at: row.get("created_at"),
    }
}

fn job_from_row(row: &SqliteRow) -> ScrapeJob {
    ScrapeJob {
        id: row.get("id"),
        source_id: row.get("source_id"),
        url: row.get("url"),
        status: row.get("status"),
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn alert_from_row(row: &SqliteRow) -> SecurityAlert {
    let severity: String = row.get("severity");
    SecurityAlert {
        id: row.get("id"),
        source_id: row.get("source_id"),
        alert_type: row.get("alert_type"),
        severity: Severity::parse(&severity).unwrap_or(Severity::Low),
        description: row.get("description"),
        matched_pattern: row.get("matched_pattern"),
        detected_at: row.get("detected_at"),
        resolved_at: row.get("resolved_at"),
        resolution_note: row.get("resolution_note"),
    }
}

fn quarantine_from_row(row: &SqliteRow) -> QuarantineItem {
    let tier: String = row.get("tier");
    QuarantineItem {
        id: row.get("id"),
        source_id: row.get("source_id"),
        source_url: row.get("source_url"),
        source_name: row.get("source_name"),
        tier: QuarantineTier::parse(&tier).unwrap_or(QuarantineTier::Quarantined),
        fingerprint: row.get("fingerprint"),
        preview: row.get("preview"),
        stats_json: row.get("stats_json"),
        validated_at: row.get("validated_at"),
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        review_action: row.get("review_action"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_punctuation_and_joins() {
        assert_eq!(
            sanitize_query("bearer-token auth!"),
            "\"bearer\" OR \"token\" OR \"auth\""
        );
        assert_eq!(sanitize_query("  spaced   out  "), "\"spaced\" OR \"out\"");
        assert_eq!(sanitize_query("one"), "\"one\"");
        assert_eq!(sanitize_query("!!!"), "");
    }

    #[test]
    fn sanitize_neutralizes_match_operators() {
        // Uppercase operator words must come out as plain quoted terms.
        assert_eq!(sanitize_query("pros OR cons"), "\"pros\" OR \"OR\" OR \"cons\"");
        assert_eq!(sanitize_query("NOT NEAR AND"), "\"NOT\" OR \"NEAR\" OR \"AND\"");
    }

    #[test]
    fn action_map_is_fixed() {
        assert_eq!(tier_for_action("approve"), QuarantineTier::Clean);
        assert_eq!(tier_for_action("reject"), QuarantineTier::Blocked);
        assert_eq!(tier_for_action("keep_flagged"), QuarantineTier::Flagged);
        assert_eq!(tier_for_action("escalate"), QuarantineTier::Quarantined);
        assert_eq!(tier_for_action(""), QuarantineTier::Quarantined);
    }

    #[test]
    fn code_detection() {
        assert!(detect_code("intro\n```rust\nfn main() {}\n```"));
        assert!(detect_code("text\n    let a = 1;\n    let b = 2;\n"));
        assert!(!detect_code("plain prose with no code at all"));
    }

    #[test]
    fn quality_score_bounds() {
        let long = "word ".repeat(500);
        assert!(quality_score("Title", &long) <= 1.0);
        assert!(quality_score("", "short") < 0.1);
        let titled = quality_score("Auth", "some words here");
        let untitled = quality_score("", "some words here");
        assert!(titled > untitled);
    }
}
