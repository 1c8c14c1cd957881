//! In-process file-backed vector index.
//!
//! A second SQLite file colocated with the content store holds one row per
//! embedded chunk; search is a brute-force cosine scan over the decoded
//! blobs. No network, no background loop. Suitable up to tens of thousands
//! of chunks, which covers local documentation sets comfortably.

use async_trait::async_trait;
use sqlx::{ConnectOptions, Row, SqlitePool};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{BackendTier, VectorBackend, VectorHit, VectorItem, VectorSearchOptions, VectorStats};
use crate::db;
use crate::error::Result;
use crate::models::{blob_to_vec, cosine_similarity, vec_to_blob};

pub struct EmbeddedBackend {
    path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl EmbeddedBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pool: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily open the index file and create its schema.
    async fn ensure_pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = db::connect(&self.path).await?;
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS vectors (
                        chunk_id TEXT PRIMARY KEY,
                        source_id TEXT NOT NULL,
                        embedding BLOB NOT NULL,
                        created_at INTEGER NOT NULL
                    )
                    "#,
                )
                .execute(&pool)
                .await?;
                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_vectors_source_id ON vectors(source_id)",
                )
                .execute(&pool)
                .await?;

                debug!(path = %self.path.display(), "opened embedded vector index");
                Ok(pool)
            })
            .await
    }
}

#[async_trait]
impl VectorBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn tier(&self) -> BackendTier {
        BackendTier::Embedded
    }

    /// The index is available when its file can actually be opened, or —
    /// for a first run — when the parent directory exists so it can be
    /// created.
    async fn available(&self) -> bool {
        if self.pool.get().is_some() {
            return true;
        }
        if self.path.exists() {
            let options = sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&self.path)
                .read_only(true);
            return match options.connect().await {
                Ok(conn) => {
                    drop(conn);
                    true
                }
                Err(_) => false,
            };
        }
        self.path.parent().map(|p| p.exists()).unwrap_or(false)
    }

    async fn start(&self) -> Result<()> {
        self.ensure_pool().await?;
        Ok(())
    }

    async fn store(&self, item: VectorItem) -> Result<()> {
        let pool = self.ensure_pool().await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO vectors (chunk_id, source_id, embedding, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                source_id = excluded.source_id,
                embedding = excluded.embedding
            "#,
        )
        .bind(&item.chunk_id)
        .bind(&item.source_id)
        .bind(vec_to_blob(&item.embedding))
        .bind(now)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn store_batch(&self, items: Vec<VectorItem>) -> Result<usize> {
        let pool = self.ensure_pool().await?;
        let now = chrono::Utc::now().timestamp();
        let n = items.len();

        let mut tx = pool.begin().await?;
        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO vectors (chunk_id, source_id, embedding, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    source_id = excluded.source_id,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&item.chunk_id)
            .bind(&item.source_id)
            .bind(vec_to_blob(&item.embedding))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(n)
    }

    async fn search(
        &self,
        embedding: &[f32],
        opts: &VectorSearchOptions,
    ) -> Result<Vec<VectorHit>> {
        let pool = self.ensure_pool().await?;

        let rows = match &opts.source_id {
            Some(source_id) => {
                sqlx::query("SELECT chunk_id, source_id, embedding FROM vectors WHERE source_id = ?")
                    .bind(source_id)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT chunk_id, source_id, embedding FROM vectors")
                    .fetch_all(pool)
                    .await?
            }
        };

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                VectorHit {
                    chunk_id: row.get("chunk_id"),
                    source_id: row.get("source_id"),
                    score: cosine_similarity(embedding, &stored) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let limit = if opts.limit > 0 { opts.limit as usize } else { 10 };
        hits.truncate(limit);

        Ok(hits)
    }

    async fn delete_for_source(&self, source_id: &str) -> Result<u64> {
        let pool = self.ensure_pool().await?;
        let deleted = sqlx::query("DELETE FROM vectors WHERE source_id = ?")
            .bind(source_id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn stats(&self) -> Result<VectorStats> {
        let pool = self.ensure_pool().await?;
        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(pool)
            .await?;
        Ok(VectorStats {
            backend: "embedded".to_string(),
            records: records as u64,
        })
    }

    async fn healthy(&self) -> bool {
        match self.ensure_pool().await {
            Ok(pool) => sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(pool)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}
