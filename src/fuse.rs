//! Ensemble fusion of dense and lexical rankings.
//!
//! Weighted reciprocal-rank fusion: a chunk at 1-based rank `r` in one
//! retriever's list contributes `weight / (rrf_k + r)` to its fused score.
//! Rank-based contributions are scale-free, so BM25 scores and cosine
//! similarities never need to share a unit. The formula is monotonic in each
//! retriever's rank, and a chunk returned by only one retriever simply gets
//! zero contribution from the other.

use std::collections::HashMap;

/// Fusion parameters. Defaults: equal halves, `rrf_k` 60.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f64,
    pub lexical: f64,
    pub rrf_k: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            lexical: 0.5,
            rrf_k: 60.0,
        }
    }
}

/// Fuse two ranked lists of `(chunk position, score)` into one ranking,
/// descending by fused score with ties broken by position ascending,
/// truncated to `top_k`. Input scores only matter through their order; both
/// lists are assumed sorted best-first.
pub fn fuse_rankings(
    vector_hits: &[(u32, f32)],
    lexical_hits: &[(u32, f64)],
    weights: FusionWeights,
    top_k: usize,
) -> Vec<(u32, f64)> {
    let mut fused: HashMap<u32, f64> = HashMap::new();

    for (rank, &(position, _)) in vector_hits.iter().enumerate() {
        *fused.entry(position).or_insert(0.0) +=
            weights.vector / (weights.rrf_k + (rank + 1) as f64);
    }
    for (rank, &(position, _)) in lexical_hits.iter().enumerate() {
        *fused.entry(position).or_insert(0.0) +=
            weights.lexical / (weights.rrf_k + (rank + 1) as f64);
    }

    let mut ranked: Vec<(u32, f64)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(top_k);
    ranked
}
