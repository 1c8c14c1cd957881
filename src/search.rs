//! Query orchestration over the full-text index and the vector registry.
//!
//! The store reports full-text matches with a bm25 cost (lower = better);
//! this service negates it into a relevance score (higher = better) before
//! filtering, so `min_score` reads naturally. Similarity scores from the
//! vector registry are already higher-is-better and stay on their own code
//! path — the two conventions are never merged or compared.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{DocChunk, FtsMatch, SearchHit};
use crate::store::{query_terms, ContentStore};
use crate::vector::registry::BackendRegistry;
use crate::vector::VectorSearchOptions;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<i64>,
    /// Restrict results to these source ids.
    pub sources: Option<Vec<String>>,
    /// Minimum relevance score (negated bm25 cost). Results below it are
    /// dropped before truncation.
    pub min_score: Option<f64>,
    pub with_snippets: bool,
}

/// Full-text results for one source, in rank order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceGroup {
    pub source_id: String,
    pub source_name: String,
    pub hits: Vec<SearchHit>,
}

/// A similarity result joined back to its chunk row.
#[derive(Debug, Clone)]
pub struct SimilarChunk {
    pub chunk: DocChunk,
    /// Similarity score, higher = better. Not comparable with
    /// [`SearchHit::score`].
    pub score: f64,
}

pub struct SearchService {
    store: Arc<ContentStore>,
    registry: Arc<BackendRegistry>,
    retrieval: RetrievalConfig,
}

impl SearchService {
    pub fn new(
        store: Arc<ContentStore>,
        registry: Arc<BackendRegistry>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            registry,
            retrieval,
        }
    }

    /// Ranked full-text search. Store errors propagate unchanged — there
    /// is no fallback path.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let limit = opts.limit.unwrap_or(self.retrieval.final_limit).max(1);
        let candidate_limit = limit * self.retrieval.candidate_factor;

        let matches = self
            .store
            .search_chunks(query, opts.sources.as_deref(), candidate_limit)
            .await?;

        let mut hits: Vec<SearchHit> = matches
            .into_iter()
            .map(|m| self.to_hit(m, query, opts.with_snippets))
            .collect();

        if let Some(min_score) = opts.min_score {
            hits.retain(|hit| hit.score >= min_score);
        }
        hits.truncate(limit as usize);

        debug!(query = %query, results = hits.len(), "full-text search");
        Ok(hits)
    }

    /// Like [`search`](Self::search) but partitioned by source with a cap
    /// per group. The candidate limit is inflated so busy sources cannot
    /// crowd out quieter ones entirely.
    pub async fn search_grouped(
        &self,
        query: &str,
        opts: &SearchOptions,
        per_source: usize,
    ) -> Result<Vec<SourceGroup>> {
        let limit = opts.limit.unwrap_or(self.retrieval.final_limit).max(1);
        let inflated = SearchOptions {
            limit: Some(limit * 3),
            ..opts.clone()
        };

        let hits = self.search(query, &inflated).await?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, SourceGroup> = HashMap::new();
        for hit in hits {
            let group = groups
                .entry(hit.source_id.clone())
                .or_insert_with(|| {
                    order.push(hit.source_id.clone());
                    SourceGroup {
                        source_id: hit.source_id.clone(),
                        source_name: hit.source_name.clone(),
                        hits: Vec::new(),
                    }
                });
            if group.hits.len() < per_source.max(1) {
                group.hits.push(hit);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|source_id| groups.remove(&source_id))
            .collect())
    }

    /// Similarity search through the current vector backend, with hits
    /// resolved back to their chunk rows. With no richer backend available
    /// this returns empty — degrade to full-text, never an error.
    pub async fn similar(
        &self,
        embedding: &[f32],
        opts: &VectorSearchOptions,
    ) -> Result<Vec<SimilarChunk>> {
        let hits = self.registry.search(embedding, opts).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let chunks = self.store.get_chunks(&ids).await?;
        let by_id: HashMap<String, DocChunk> =
            chunks.into_iter().map(|c| (c.id.clone(), c)).collect();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                by_id.get(&hit.chunk_id).map(|chunk| SimilarChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    fn to_hit(&self, m: FtsMatch, query: &str, with_snippet: bool) -> SearchHit {
        let snippet = if with_snippet {
            make_snippet(&m.content, query, self.retrieval.snippet_window)
        } else {
            None
        };
        SearchHit {
            chunk_id: m.chunk_id,
            source_id: m.source_id,
            source_name: m.source_name,
            url: m.url,
            title: m.title,
            content: m.content,
            // bm25 cost is lower-is-better; expose relevance instead.
            score: -m.cost,
            snippet,
        }
    }
}

/// Build a highlighted excerpt around the first query term found in the
/// content (case-insensitive). The window starts a fixed lead before the
/// hit, gets trimmed to word boundaries, and carries `...` affixes when it
/// does not reach the string's edge.
pub fn make_snippet(content: &str, query: &str, window: usize) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() || content.is_empty() {
        return None;
    }

    let offset = terms
        .iter()
        .filter_map(|term| find_term_ci(content, term))
        .min()?;

    let lead = window / 4;
    let mut start = snap_to_boundary(content, offset.saturating_sub(lead));
    let mut end = snap_to_boundary(content, (start + window).min(content.len()));

    // Trim to word boundaries so the excerpt never opens or closes
    // mid-word.
    if start > 0 {
        if let Some(pos) = content[start..end].find(char::is_whitespace) {
            start = snap_to_boundary(content, start + pos + 1);
        }
    }
    if end < content.len() {
        if let Some(pos) = content[start..end].rfind(char::is_whitespace) {
            let candidate = snap_to_boundary(content, start + pos);
            // Keep at least the matched term inside the window.
            if candidate > start + (offset.saturating_sub(start)) {
                end = candidate;
            }
        }
    }

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(content[start..end].trim());
    if end < content.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

/// Byte offset of the first case-insensitive occurrence of `term` in
/// `content`. Folding happens per comparison, so the returned offset is
/// valid in the original string even when case folding changes a
/// character's byte length.
fn find_term_ci(content: &str, term: &str) -> Option<usize> {
    let term_lc: Vec<char> = term.chars().flat_map(char::to_lowercase).collect();
    if term_lc.is_empty() {
        return None;
    }

    for (offset, _) in content.char_indices() {
        let mut haystack = content[offset..].chars().flat_map(char::to_lowercase);
        if term_lc.iter().all(|&t| haystack.next() == Some(t)) {
            return Some(offset);
        }
    }
    None
}

/// Move a byte index back to the nearest char boundary.
fn snap_to_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
