//! Retrieval orchestrator
//!
//! `SearchEngine` sequences the per-query pipeline: keyword extraction,
//! BM25 candidates (optionally PRF-expanded), near-duplicate suppression,
//! adaptive rerank budgeting, one combined embedding call through the
//! two-tier cache, fusion with co-mention boosts, and gated MMR
//! diversification. Each stage either produces a value or a tagged failure;
//! the orchestrator picks degradation or abort.

use crate::fts;
use crate::retrieval::budget::RerankBudget;
use crate::retrieval::{dedup, fusion, mmr, prf, Candidate, RankStage, SearchHit};
use crate::store::Store;
use crate::{MAX_QUERY_TERMS, MMR_LAMBDA, MMR_MIN_VECTOR_COVERAGE, PRF_DRIFT_MIN_OVERLAP};
use kbfuse_common::cache::{self, keys, VectorCache};
use kbfuse_common::config::{AppConfig, EmbeddingConfig, SearchConfig};
use kbfuse_common::embeddings::{
    create_embedder, dot, Embedder, EmbeddingClient, ProviderIdentity,
};
use kbfuse_common::errors::Result;
use kbfuse_common::metrics::{record_cache, record_search};
use kbfuse_common::text;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Per-file hybrid retrieval engine.
///
/// Reentrant: per-query state is local, and the store, embedding client,
/// and vector caches tolerate concurrent use. Construct once and share.
pub struct SearchEngine {
    store: Arc<Store>,
    client: EmbeddingClient,
    identity: ProviderIdentity,
    search: SearchConfig,
    doc_cache: Arc<VectorCache>,
    query_cache: Arc<VectorCache>,
}

impl SearchEngine {
    /// Build an engine from explicit dependencies.
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        embedding: &EmbeddingConfig,
        search: SearchConfig,
        doc_cache: Arc<VectorCache>,
        query_cache: Arc<VectorCache>,
    ) -> Self {
        Self {
            store,
            client: EmbeddingClient::new(embedder, embedding),
            identity: ProviderIdentity::from_config(embedding),
            search,
            doc_cache,
            query_cache,
        }
    }

    /// Open the store and provider described by `config` and build an engine
    /// with fresh caches. Fails when the provider requires credentials and
    /// none are configured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.store)?);
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(
            store,
            embedder,
            &config.embedding,
            config.search.clone(),
            Arc::new(cache::doc_vector_cache()),
            Arc::new(cache::query_vector_cache()),
        ))
    }

    /// Search an indexed file for each query.
    ///
    /// Duplicate queries are coalesced in first-occurrence order; one inner
    /// list is returned per coalesced query. A file with no indexed chunks
    /// yields empty lists.
    #[instrument(skip(self, queries), fields(file_path = %file_path, query_count = queries.len()))]
    pub async fn search(&self, file_path: &str, queries: &[String]) -> Result<Vec<Vec<SearchHit>>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let unique = coalesce_queries(queries);

        let Some(file_uid) = self.store.file_uid_for_path(file_path)? else {
            debug!("file not indexed, returning empty results");
            return Ok(vec![Vec::new(); unique.len()]);
        };

        let mut results = Vec::with_capacity(unique.len());
        for query in &unique {
            results.push(self.search_one(query, &file_uid, file_path).await?);
        }
        Ok(results)
    }

    /// Run the full pipeline for a single query.
    async fn search_one(&self, query: &str, file_uid: &str, file_path: &str) -> Result<Vec<SearchHit>> {
        let started = Instant::now();

        // Keyword extraction and base match expression.
        let query_keys = text::keywords(query, MAX_QUERY_TERMS);
        let Some(match_expr) = fts::or_expression(&query_keys) else {
            return Ok(Vec::new());
        };

        // Lexical candidates, best first.
        let lexical_started = Instant::now();
        let mut rows = self
            .store
            .fts_search(&match_expr, file_uid, self.search.k_sql)?;
        debug!(
            elapsed_ms = lexical_started.elapsed().as_millis() as u64,
            hits = rows.len(),
            "lexical pass complete"
        );
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // Normalized scores of the unexpanded candidate set. The rerank
        // budget reads these even when expansion replaces the rows below.
        let initial_scores: Vec<f64> = rows.iter().map(|r| 1.0 / (1.0 + r.raw_score)).collect();

        // Pseudo-relevance feedback, at most once per query.
        if prf::should_expand(query, &initial_scores) {
            let query_terms: HashSet<String> = query_keys.iter().cloned().collect();
            let feedback: Vec<(i64, &str, f64)> = rows
                .iter()
                .zip(initial_scores.iter())
                .map(|(row, &score)| (row.chunk_id, row.text.as_str(), score))
                .collect();
            let terms =
                prf::expansion_terms(&feedback, &query_terms, self.search.prf_k, self.search.prf_m);

            if !terms.is_empty() {
                if let Some(expanded_expr) = fts::expanded_expression(&query_keys, &terms) {
                    let prf_started = Instant::now();
                    let expanded_rows =
                        self.store
                            .fts_search(&expanded_expr, file_uid, self.search.k_sql2())?;
                    if !expanded_rows.is_empty() {
                        let original_ids: Vec<i64> = rows.iter().map(|r| r.chunk_id).collect();
                        let expanded_ids: Vec<i64> =
                            expanded_rows.iter().map(|r| r.chunk_id).collect();
                        let overlap = prf::drift_overlap(&original_ids, &expanded_ids);
                        if overlap >= PRF_DRIFT_MIN_OVERLAP {
                            debug!(
                                expansion_terms = terms.len(),
                                overlap,
                                elapsed_ms = prf_started.elapsed().as_millis() as u64,
                                "expanded candidate set accepted"
                            );
                            rows = expanded_rows;
                        } else {
                            debug!(overlap, "expansion drifted, keeping original candidates");
                        }
                    }
                }
            }
        }

        // Slice to the rerank window, normalize, and suppress near-duplicates.
        rows.truncate(self.search.top_oai);
        let braw: Vec<f64> = rows.iter().map(|r| 1.0 / (1.0 + r.raw_score)).collect();
        let bnorm = fusion::minmax(&braw);

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .zip(bnorm.iter())
            .map(|(row, &norm)| Candidate {
                chunk_id: row.chunk_id,
                text: row.text.clone(),
                text_hash: row.text_hash,
                bm25_norm: norm,
            })
            .collect();

        if candidates.len() > 1 {
            let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
            let kept = dedup::jaccard_dedup(&texts, &bnorm, self.search.jaccard_threshold);
            candidates = kept.iter().map(|&i| candidates[i].clone()).collect();
        }

        // Queries that are nothing but compact numbers stay lexical.
        let tokens = text::tokenize(query);
        let is_compact_number = |t: &str| (3..=4).contains(&t.len()) && text::is_all_digits(t);
        let has_numbers = tokens.iter().any(|t| is_compact_number(t));
        let has_words = tokens
            .iter()
            .any(|t| !text::is_stopword(t) && !is_compact_number(t));
        if has_numbers && !has_words {
            let hits = self.lexical_hits(&candidates, file_uid, file_path, query, RankStage::Lexical);
            record_search(
                started.elapsed().as_secs_f64(),
                RankStage::Lexical.as_str(),
                hits.len(),
            );
            return Ok(hits);
        }

        // Adaptive rerank pool, capped by surviving candidates.
        let budget = RerankBudget::select(&initial_scores);
        let pool = budget.depth().min(candidates.len());
        candidates.truncate(pool);

        // Two-tier vector lookup: persistent cache, then the LRU.
        let hashes: Vec<[u8; 16]> = candidates.iter().map(|c| c.text_hash).collect();
        let mut vector_map = self.store.load_cached_vectors(&hashes, &self.identity)?;
        let mut missing: Vec<usize> = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            if vector_map.contains_key(&candidate.text_hash) {
                record_cache(true, "doc_vectors");
                continue;
            }
            let key = keys::doc_vector(&candidate.text_hash, &self.identity.model, self.identity.dim);
            match self.doc_cache.get(&key) {
                Some(vector) => {
                    record_cache(true, "doc_vectors");
                    vector_map.insert(candidate.text_hash, vector);
                }
                None => {
                    record_cache(false, "doc_vectors");
                    missing.push(i);
                }
            }
        }

        // One combined embedding call: the query plus every uncached doc.
        let mut inputs: Vec<String> = Vec::with_capacity(1 + missing.len());
        inputs.push(query.to_string());
        inputs.extend(missing.iter().map(|&i| candidates[i].text.clone()));

        let vectors = match self.client.embed_all(&inputs).await {
            Ok(vectors) => vectors,
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "embedding unavailable, degrading to lexical results");
                let hits = self.lexical_hits(
                    &candidates,
                    file_uid,
                    file_path,
                    query,
                    RankStage::LexicalEmbedFail,
                );
                record_search(
                    started.elapsed().as_secs_f64(),
                    RankStage::LexicalEmbedFail.as_str(),
                    hits.len(),
                );
                return Ok(hits);
            }
            Err(err) => return Err(err),
        };

        let query_vec = vectors[0].clone();
        self.query_cache.put(
            keys::query_vector(query, &self.identity.model, self.identity.dim),
            query_vec.clone(),
        );

        // Write fresh vectors to both tiers.
        let mut fresh: Vec<([u8; 16], Vec<f32>)> = Vec::with_capacity(missing.len());
        for (offset, &i) in missing.iter().enumerate() {
            let vector = vectors[1 + offset].clone();
            let key = keys::doc_vector(&candidates[i].text_hash, &self.identity.model, self.identity.dim);
            self.doc_cache.put(key, vector.clone());
            vector_map.insert(candidates[i].text_hash, vector.clone());
            fresh.push((candidates[i].text_hash, vector));
        }
        if !fresh.is_empty() {
            self.store.store_vectors(&fresh, &self.identity)?;
        }

        // Cosine similarity: dot of normalized vectors.
        let sims: Vec<f64> = candidates
            .iter()
            .map(|c| {
                vector_map
                    .get(&c.text_hash)
                    .map(|v| dot(v, &query_vec) as f64)
                    .unwrap_or(0.0)
            })
            .collect();

        // Fusion with distribution-adaptive embedding weight, then boost.
        let onorm = if sims.iter().any(|&s| s != 0.0) {
            fusion::minmax(&sims)
        } else {
            vec![0.0; sims.len()]
        };
        let weight = fusion::embedding_weight(&sims);
        let weighted: Vec<f64> = onorm.iter().map(|v| v * weight).collect();
        let rrf = fusion::rrf_scores(&weighted, self.search.rrf_k);

        let candidate_texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let features = fusion::boost_features(&candidate_texts, query);
        let final_scores = fusion::apply_boost(&rrf, &features);

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            final_scores[b]
                .partial_cmp(&final_scores[a])
                .unwrap_or(Ordering::Equal)
        });

        // Diversify only with enough vector coverage and surplus candidates.
        let coverage = mmr::vector_coverage(&sims);
        let (selected, stage) = if candidates.len() > self.search.k_final
            && coverage >= MMR_MIN_VECTOR_COVERAGE
        {
            let candidate_vectors: Vec<Option<Vec<f32>>> = candidates
                .iter()
                .map(|c| vector_map.get(&c.text_hash).cloned())
                .collect();
            let picked = mmr::diversify(
                &order,
                &candidate_vectors,
                &query_vec,
                MMR_LAMBDA,
                self.search.k_final,
            );
            (picked, RankStage::FusedDiversified)
        } else {
            let truncated: Vec<usize> = order.into_iter().take(self.search.k_final).collect();
            (truncated, RankStage::Fused)
        };

        let hits: Vec<SearchHit> = selected
            .iter()
            .map(|&i| SearchHit {
                file_uid: file_uid.to_string(),
                file_path: file_path.to_string(),
                chunk_id: candidates[i].chunk_id,
                score: final_scores[i],
                snippet: text::best_snippet(&candidates[i].text, query, self.search.snippet_max_chars),
                rank_stage: stage,
            })
            .collect();

        debug!(
            results = hits.len(),
            rerank_pool = pool,
            embed_batch = missing.len(),
            vector_coverage = coverage,
            stage = stage.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query complete"
        );
        record_search(started.elapsed().as_secs_f64(), stage.as_str(), hits.len());
        Ok(hits)
    }

    /// Emit the first `k_final` candidates as lexical-only hits.
    fn lexical_hits(
        &self,
        candidates: &[Candidate],
        file_uid: &str,
        file_path: &str,
        query: &str,
        stage: RankStage,
    ) -> Vec<SearchHit> {
        candidates
            .iter()
            .take(self.search.k_final)
            .map(|c| SearchHit {
                file_uid: file_uid.to_string(),
                file_path: file_path.to_string(),
                chunk_id: c.chunk_id,
                score: c.bm25_norm,
                snippet: text::best_snippet(&c.text, query, self.search.snippet_max_chars),
                rank_stage: stage,
            })
            .collect()
    }
}

/// Deduplicate queries preserving first occurrence.
fn coalesce_queries(queries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .iter()
        .filter(|q| seen.insert(q.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_preserves_first_occurrence() {
        let queries = vec![
            "alpha".to_string(),
            "beta".to_string(),
            "alpha".to_string(),
            "gamma".to_string(),
            "beta".to_string(),
        ];
        assert_eq!(coalesce_queries(&queries), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_coalesce_empty() {
        assert!(coalesce_queries(&[]).is_empty());
    }
}
