//! In-memory BM25 lexical retriever.
//!
//! Built fresh from the loaded session's chunk texts on every query —
//! construction over already-loaded text is cheap next to index I/O, so
//! nothing lexical is persisted. Chunk positions double as document ids.

use std::collections::HashMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Term-frequency ranking over a session's chunk corpus.
pub struct Bm25Index {
    /// term -> (chunk position, term frequency), positions ascending.
    postings: HashMap<String, Vec<(u32, u32)>>,
    doc_lens: Vec<u32>,
    avg_len: f64,
}

impl Bm25Index {
    /// Build the index over chunk texts in position order.
    pub fn build<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        let mut doc_lens = Vec::new();

        for (position, text) in texts.into_iter().enumerate() {
            let terms = tokenize(text);
            doc_lens.push(terms.len() as u32);

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_insert(0) += 1;
            }
            for (term, tf) in freqs {
                postings.entry(term).or_default().push((position as u32, tf));
            }
        }

        for entries in postings.values_mut() {
            entries.sort_unstable_by_key(|(position, _)| *position);
        }

        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().map(|&l| l as f64).sum::<f64>() / doc_lens.len() as f64
        };

        Self {
            postings,
            doc_lens,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Return the `k` chunk positions with the highest BM25 score for the
    /// query, descending, ties broken by position ascending. Chunks with no
    /// term overlap are not returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<(u32, f64)> {
        if self.doc_lens.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.doc_lens.len() as f64;
        let mut scores: HashMap<u32, f64> = HashMap::new();

        let mut query_terms = tokenize(query);
        query_terms.sort_unstable();
        query_terms.dedup();

        for term in &query_terms {
            let Some(entries) = self.postings.get(term) else {
                continue;
            };
            let df = entries.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for &(position, tf) in entries {
                let tf = tf as f64;
                let len_norm =
                    1.0 - B + B * self.doc_lens[position as usize] as f64 / self.avg_len;
                let contribution = idf * (tf * (K1 + 1.0)) / (tf + K1 * len_norm);
                *scores.entry(position).or_insert(0.0) += contribution;
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores
            .into_iter()
            .filter(|&(_, score)| score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

/// Lowercase alphanumeric tokenization shared by build and search.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
