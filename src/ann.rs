//! Approximate-nearest-neighbor index over chunk embedding vectors.
//!
//! A navigable small-world graph: each vector is a node linked to up to
//! `fan_out` near neighbors, and queries run a best-first beam search from a
//! fixed entry point. Vector ids are global chunk positions, assigned in
//! insertion order, so the id↔position mapping is the identity.
//!
//! The index is immutable once built, serde-serializable, and deterministic:
//! identical inputs produce identical graphs and identical search results.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::error::{EngineError, Result};

/// Beam width used while wiring up nodes at build time.
const EF_CONSTRUCTION: usize = 100;

/// A vector id paired with its similarity to some query, ordered by
/// similarity descending with id-ascending tie-break.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    similarity: f32,
    id: u32,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Small-world graph index over fixed-dimension embedding vectors.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnIndex {
    dims: usize,
    fan_out: usize,
    vectors: Vec<Vec<f32>>,
    links: Vec<Vec<u32>>,
}

impl AnnIndex {
    /// Build the graph by inserting vectors in order. Every vector must have
    /// exactly `dims` components.
    pub fn build(dims: usize, fan_out: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        let fan_out = fan_out.max(1);
        let mut index = Self {
            dims,
            fan_out,
            vectors: Vec::with_capacity(vectors.len()),
            links: Vec::with_capacity(vectors.len()),
        };

        for vector in vectors {
            if vector.len() != dims {
                return Err(EngineError::EmbeddingService(format!(
                    "embedding dimensionality mismatch: expected {}, got {}",
                    dims,
                    vector.len()
                )));
            }
            index.insert(vector);
        }

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn insert(&mut self, vector: Vec<f32>) {
        let id = self.vectors.len() as u32;

        if id == 0 {
            self.vectors.push(vector);
            self.links.push(Vec::new());
            return;
        }

        let neighbors = self.beam_search(&vector, self.fan_out, EF_CONSTRUCTION.max(self.fan_out));
        let neighbor_ids: Vec<u32> = neighbors.iter().map(|s| s.id).collect();

        self.vectors.push(vector);
        self.links.push(neighbor_ids.clone());

        // Links are bidirectional; prune overfull adjacency lists back down
        // to fan_out, keeping the most similar neighbors.
        for neighbor in neighbor_ids {
            let entry = &mut self.links[neighbor as usize];
            entry.push(id);
            if entry.len() > self.fan_out {
                let anchor = &self.vectors[neighbor as usize];
                let mut scored: Vec<Scored> = entry
                    .iter()
                    .map(|&other| Scored {
                        similarity: cosine_similarity(anchor, &self.vectors[other as usize]),
                        id: other,
                    })
                    .collect();
                scored.sort_unstable_by(|a, b| b.cmp(a));
                scored.truncate(self.fan_out);
                self.links[neighbor as usize] = scored.into_iter().map(|s| s.id).collect();
            }
        }
    }

    /// Return the `k` nearest chunk positions for the query vector, ranked by
    /// descending cosine similarity, ties broken by position ascending.
    ///
    /// `ef` is the search beam width; it is clamped to at least `k`.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(u32, f32)>> {
        if query.len() != self.dims {
            return Err(EngineError::EmbeddingService(format!(
                "query dimensionality mismatch: expected {}, got {}",
                self.dims,
                query.len()
            )));
        }
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut nearest = self.beam_search(query, k, ef.max(k));
        nearest.sort_unstable_by(|a, b| b.cmp(a));
        Ok(nearest.into_iter().map(|s| (s.id, s.similarity)).collect())
    }

    /// Best-first graph traversal from the entry node, keeping a beam of the
    /// `ef` best candidates seen, returning the top `k`.
    fn beam_search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Scored> {
        let entry = Scored {
            similarity: cosine_similarity(query, &self.vectors[0]),
            id: 0,
        };

        let mut visited: HashSet<u32> = HashSet::from([0]);
        let mut frontier: BinaryHeap<Scored> = BinaryHeap::from([entry]);
        let mut beam: BinaryHeap<Reverse<Scored>> = BinaryHeap::from([Reverse(entry)]);

        while let Some(candidate) = frontier.pop() {
            let worst = beam.peek().map(|r| r.0).unwrap_or(candidate);
            if beam.len() >= ef && candidate < worst {
                break;
            }

            for &neighbor in &self.links[candidate.id as usize] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = Scored {
                    similarity: cosine_similarity(query, &self.vectors[neighbor as usize]),
                    id: neighbor,
                };
                if beam.len() < ef || scored > beam.peek().map(|r| r.0).unwrap() {
                    frontier.push(scored);
                    beam.push(Reverse(scored));
                    if beam.len() > ef {
                        beam.pop();
                    }
                }
            }
        }

        let mut results: Vec<Scored> = beam.into_iter().map(|r| r.0).collect();
        results.sort_unstable_by(|a, b| b.cmp(a));
        results.truncate(k);
        results
    }
}

/// Cosine similarity between two vectors; `0.0` for mismatched lengths or
/// zero-norm inputs.
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
