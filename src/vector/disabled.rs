//! Always-available no-op backend.
//!
//! Selected when no richer backend is configured or reachable, so the
//! engine degrades to full-text-only search instead of failing.

use async_trait::async_trait;

use super::{BackendTier, VectorBackend, VectorHit, VectorItem, VectorSearchOptions, VectorStats};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct DisabledBackend;

#[async_trait]
impl VectorBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn tier(&self) -> BackendTier {
        BackendTier::Disabled
    }

    async fn available(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn store(&self, _item: VectorItem) -> Result<()> {
        Ok(())
    }

    async fn store_batch(&self, _items: Vec<VectorItem>) -> Result<usize> {
        Ok(0)
    }

    async fn search(
        &self,
        _embedding: &[f32],
        _opts: &VectorSearchOptions,
    ) -> Result<Vec<VectorHit>> {
        Ok(Vec::new())
    }

    async fn delete_for_source(&self, _source_id: &str) -> Result<u64> {
        Ok(0)
    }

    async fn stats(&self) -> Result<VectorStats> {
        Ok(VectorStats {
            backend: "disabled".to_string(),
            records: 0,
        })
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn everything_is_a_noop() {
        let backend = DisabledBackend;
        assert!(backend.available().await);
        assert!(backend.healthy().await);
        backend.start().await.unwrap();

        backend
            .store(VectorItem {
                chunk_id: "c1".into(),
                source_id: "s1".into(),
                embedding: vec![0.1, 0.2],
            })
            .await
            .unwrap();

        let hits = backend
            .search(&[0.1, 0.2], &VectorSearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());

        assert_eq!(backend.delete_for_source("s1").await.unwrap(), 0);
        assert_eq!(backend.stats().await.unwrap().records, 0);
    }
}
