//! Core data models used throughout the matching engine.
//!
//! These types represent the documents, chunks, and matches that flow through
//! the ingestion and retrieval pipeline. Everything persisted per session
//! (manifest, chunks, document metadata) is serde-serializable JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-document metadata supplied by the parsing collaborator.
///
/// The engine carries these fields opaquely; only `file_name` is used
/// internally (as match provenance).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form collaborator-supplied fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One ingested document: the job description or a resume.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A chunk of one document's text, the unit of embedding and retrieval.
///
/// `position` is the chunk's stable global index in emission order across the
/// whole corpus (job description first, then resumes in upload order) and
/// doubles as its vector id in the ANN index. `document_index` points into the
/// session's document metadata set, so a match can always name the file it
/// came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub position: u32,
    pub document_index: usize,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
}

impl Chunk {
    pub fn new(position: u32, document_index: usize, chunk_index: usize, text: String) -> Self {
        let hash = Self::content_hash(&text);
        Self {
            position,
            document_index,
            chunk_index,
            text,
            hash,
        }
    }

    /// Hex SHA-256 of the chunk text; checked against `hash` when a session
    /// is reloaded.
    pub fn content_hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Session manifest persisted alongside the index artifacts.
///
/// Records the embedding space the session was built in; queries must use the
/// same model, and the loader rejects artifacts whose counts or dimensions
/// disagree with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub document_count: usize,
    pub chunk_count: usize,
}

/// One matched chunk in a query response. Transient, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    /// Fused ensemble score.
    pub score: f64,
    /// Query terms found verbatim in the chunk, joined for display.
    pub highlights: String,
    /// First 500 characters of the chunk text.
    pub content: String,
    /// File name of the document the chunk came from.
    pub source: String,
}

/// The response to one query: ranked matches plus free-text analysis.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub matches: Vec<Match>,
    pub analysis: String,
}
