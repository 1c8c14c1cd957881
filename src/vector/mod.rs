//! Swappable similarity-search backends.
//!
//! One trait, three tiers: [`disabled::DisabledBackend`] (always-available
//! no-op), [`embedded::EmbeddedBackend`] (in-process file-backed index), and
//! [`remote::RemoteBackend`] (networked server with its own session
//! lifecycle). The [`registry::BackendRegistry`] picks the best available
//! backend from a priority list and caches the choice.
//!
//! Similarity scores rank higher-is-better — the inverse of the full-text
//! cost convention. Callers must never compare the two directly.

pub mod disabled;
pub mod embedded;
pub mod registry;
pub mod remote;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Capability class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTier {
    Disabled,
    Embedded,
    Server,
}

/// One embedding to store, keyed by its chunk.
#[derive(Debug, Clone)]
pub struct VectorItem {
    pub chunk_id: String,
    pub source_id: String,
    pub embedding: Vec<f32>,
}

/// A similarity match. `score` is higher-is-better.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub source_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VectorSearchOptions {
    pub limit: i64,
    /// Restrict matches to one source.
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VectorStats {
    pub backend: String,
    pub records: u64,
}

/// Contract every similarity backend implements.
///
/// `available()` is a cheap, side-effect-free probe used for backend
/// selection; `healthy()` may be expensive (a full round trip) and is what
/// periodic checks call. The two are deliberately distinct so detection
/// never blocks on a slow server.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn tier(&self) -> BackendTier;

    /// Cheap availability probe.
    async fn available(&self) -> bool;

    /// One-time initialization: open files, connect, set up schema,
    /// spawn periodic health checks. Idempotent.
    async fn start(&self) -> Result<()>;

    async fn store(&self, item: VectorItem) -> Result<()>;

    /// Store a batch atomically where the backend supports it. The default
    /// stores items sequentially.
    async fn store_batch(&self, items: Vec<VectorItem>) -> Result<usize> {
        let n = items.len();
        for item in items {
            self.store(item).await?;
        }
        Ok(n)
    }

    async fn search(
        &self,
        embedding: &[f32],
        opts: &VectorSearchOptions,
    ) -> Result<Vec<VectorHit>>;

    /// Drop every vector belonging to a source. Returns the removed count
    /// when the backend can report it.
    async fn delete_for_source(&self, source_id: &str) -> Result<u64>;

    async fn stats(&self) -> Result<VectorStats>;

    /// Possibly-expensive health check; used by periodic probes.
    async fn healthy(&self) -> bool;
}
