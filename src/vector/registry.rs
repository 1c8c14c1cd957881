//! Backend selection and the process-wide "current backend" handle.
//!
//! The registry holds backends in a fixed, enumerated priority order
//! (typically remote → embedded → disabled) and exposes one facade over
//! whichever is selected. Selection happens only through explicit
//! `detect()` or `set_backend()` calls — a failed operation never swaps
//! the cached choice behind the caller's back.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::disabled::DisabledBackend;
use super::embedded::EmbeddedBackend;
use super::remote::RemoteBackend;
use super::{VectorBackend, VectorHit, VectorItem, VectorSearchOptions, VectorStats};
use crate::config::Config;
use crate::error::{Error, Result};

pub struct BackendRegistry {
    /// Priority order, highest first. Always ends with a backend whose
    /// availability probe cannot fail.
    backends: Vec<Arc<dyn VectorBackend>>,
    current: RwLock<Option<Arc<dyn VectorBackend>>>,
}

impl BackendRegistry {
    /// Build the priority list from config. The disabled backend is
    /// appended if the configured priority leaves it out, so `detect()`
    /// is total.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut backends: Vec<Arc<dyn VectorBackend>> = Vec::new();

        for name in &config.vector.priority {
            match name.as_str() {
                "remote" => match &config.vector.remote {
                    Some(remote_cfg) => {
                        backends.push(Arc::new(RemoteBackend::new(
                            remote_cfg.clone(),
                            config.vector.health_check_secs,
                        )?));
                    }
                    None => {
                        warn!("remote backend listed in priority but not configured; skipping");
                    }
                },
                "embedded" => {
                    let path = config.vector.embedded_path(&config.db.path);
                    backends.push(Arc::new(EmbeddedBackend::new(path)));
                }
                "disabled" => backends.push(Arc::new(DisabledBackend)),
                other => {
                    return Err(Error::Config(format!("unknown vector backend '{other}'")))
                }
            }
        }

        if !backends.iter().any(|b| b.name() == "disabled") {
            backends.push(Arc::new(DisabledBackend));
        }

        Ok(Self::new(backends))
    }

    pub fn new(backends: Vec<Arc<dyn VectorBackend>>) -> Self {
        Self {
            backends,
            current: RwLock::new(None),
        }
    }

    pub fn backends(&self) -> &[Arc<dyn VectorBackend>] {
        &self.backends
    }

    /// Probe the priority list, start the first available backend, and
    /// cache it. A backend that probes available but fails to start is
    /// skipped. Total: the disabled backend always qualifies.
    pub async fn detect(&self) -> Arc<dyn VectorBackend> {
        for backend in &self.backends {
            if !backend.available().await {
                continue;
            }
            if let Err(err) = backend.start().await {
                warn!(
                    backend = backend.name(),
                    error = %err,
                    "backend failed to start; trying next"
                );
                continue;
            }
            debug!(backend = backend.name(), "selected vector backend");
            let mut current = self.current.write().await;
            *current = Some(Arc::clone(backend));
            return Arc::clone(backend);
        }

        // Unreachable in practice; the constructor guarantees a disabled
        // backend is present.
        let fallback: Arc<dyn VectorBackend> = Arc::new(DisabledBackend);
        let mut current = self.current.write().await;
        *current = Some(Arc::clone(&fallback));
        fallback
    }

    /// The cached selection, detecting on first use.
    pub async fn current(&self) -> Arc<dyn VectorBackend> {
        if let Some(backend) = self.current.read().await.as_ref() {
            return Arc::clone(backend);
        }
        self.detect().await
    }

    /// Explicit override. Fails if the backend's availability probe or its
    /// startup does, leaving the previous selection in place.
    pub async fn set_backend(&self, backend: Arc<dyn VectorBackend>) -> Result<()> {
        if !backend.available().await {
            return Err(Error::BackendUnavailable(backend.name()));
        }
        backend.start().await?;
        let mut current = self.current.write().await;
        *current = Some(backend);
        Ok(())
    }

    // Convenience ops delegating to the current backend.

    pub async fn store(&self, item: VectorItem) -> Result<()> {
        self.current().await.store(item).await
    }

    pub async fn store_batch(&self, items: Vec<VectorItem>) -> Result<usize> {
        self.current().await.store_batch(items).await
    }

    pub async fn search(
        &self,
        embedding: &[f32],
        opts: &VectorSearchOptions,
    ) -> Result<Vec<VectorHit>> {
        self.current().await.search(embedding, opts).await
    }

    pub async fn delete_for_source(&self, source_id: &str) -> Result<u64> {
        self.current().await.delete_for_source(source_id).await
    }

    pub async fn stats(&self) -> Result<VectorStats> {
        self.current().await.stats().await
    }
}
