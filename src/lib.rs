//! # Resumatch
//!
//! A hybrid retrieval and ranking engine for matching candidate resumes
//! against a job description.
//!
//! Ingestion chunks each document, embeds the chunks, and persists an
//! approximate-nearest-neighbor index per session. Querying fuses dense
//! (semantic) and sparse (BM25) retrieval into one ranking, extracts
//! keyword highlights per match, and asks a language model to rank and
//! critique the candidates.
//!
//! ## Architecture
//!
//! ```text
//! ingest:  documents ──▶ chunk ──▶ embed ──▶ ann ──▶ store (per session)
//!
//! query:   store.load ──┬▶ embed + ann search ──┐
//!                       │                       ├▶ fuse ──▶ highlight
//!                       └▶ bm25 build + search ─┘             │
//!                                                             ▼
//!                                                  analysis (LLM ranking)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ann`] | Approximate-nearest-neighbor graph index |
//! | [`lexical`] | BM25 lexical retrieval |
//! | [`fuse`] | Ensemble rank fusion |
//! | [`highlight`] | Keyword-overlap highlights |
//! | [`analysis`] | Language-model ranking client |
//! | [`store`] | Per-session artifact persistence |
//! | [`engine`] | `ingest` / `query` orchestration |

pub mod analysis;
pub mod ann;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fuse;
pub mod highlight;
pub mod lexical;
pub mod models;
pub mod store;

pub use engine::MatchEngine;
pub use error::{EngineError, Result};
