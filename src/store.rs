//! Session persistence for the vector index and its companion artifacts.
//!
//! Each ingested corpus is written once under a fresh session id and only
//! ever read afterward. Four JSON artifacts live under
//! `<data_dir>/sessions/<session_id>/`:
//!
//! | File | Contents |
//! |------|----------|
//! | `manifest.json` | session id, creation time, embedding model/dims, counts |
//! | `index.json` | the ANN graph and its vectors |
//! | `chunks.json` | position-ordered chunk texts with document provenance |
//! | `documents.json` | the ordered document metadata set |
//!
//! Writes are staged into a temporary sibling directory, fsynced, and renamed
//! into place, so a session directory either exists completely or not at all,
//! and survives power loss once `persist` returns.
//! Session ids are random UUIDs; allocation never inspects existing
//! directory entries, so concurrent ingestions cannot collide.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ann::AnnIndex;
use crate::error::{EngineError, Result};
use crate::models::{Chunk, DocumentMetadata, SessionManifest};

const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "index.json";
const CHUNKS_FILE: &str = "chunks.json";
const DOCUMENTS_FILE: &str = "documents.json";

/// Everything needed to serve queries against one session.
#[derive(Debug)]
pub struct LoadedSession {
    pub manifest: SessionManifest,
    pub index: AnnIndex,
    pub chunks: Vec<Chunk>,
    pub documents: Vec<DocumentMetadata>,
}

/// On-disk store of per-session index artifacts.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Allocate a fresh collision-resistant session id.
    pub fn allocate_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    /// Persist all artifacts for the session named by `manifest.session_id`.
    /// On success every artifact is durably in place; on failure nothing is.
    pub fn persist(
        &self,
        manifest: &SessionManifest,
        index: &AnnIndex,
        chunks: &[Chunk],
        documents: &[DocumentMetadata],
    ) -> Result<()> {
        let session_id = &manifest.session_id;
        let final_dir = self.session_dir(session_id);
        let stage_dir = self.sessions_dir().join(format!(".stage-{session_id}"));

        fs::create_dir_all(&stage_dir)
            .map_err(|e| EngineError::IndexPersist(format!("create {:?}: {}", stage_dir, e)))?;

        let result = (|| -> Result<()> {
            write_json(&stage_dir.join(MANIFEST_FILE), manifest)?;
            write_json(&stage_dir.join(INDEX_FILE), index)?;
            write_json(&stage_dir.join(CHUNKS_FILE), &chunks)?;
            write_json(&stage_dir.join(DOCUMENTS_FILE), &documents)?;
            sync_dir(&stage_dir)?;
            fs::rename(&stage_dir, &final_dir).map_err(|e| {
                EngineError::IndexPersist(format!("commit session {}: {}", session_id, e))
            })?;
            // The rename itself is only durable once the parent is synced.
            sync_dir(&self.sessions_dir())
        })();

        if result.is_err() {
            let _ = fs::remove_dir_all(&stage_dir);
        } else {
            info!(%session_id, chunks = chunks.len(), "session persisted");
        }
        result
    }

    /// Reload all artifacts for a session.
    ///
    /// A missing session directory or artifact fails with `SessionNotFound`;
    /// an unreadable, unparseable, or internally inconsistent artifact fails
    /// with `IndexLoad`. Consistency covers counts and dims, chunk position
    /// order, document references, and chunk text hashes, so reads never
    /// return corrupt results.
    pub fn load(&self, session_id: &str) -> Result<LoadedSession> {
        if !is_valid_session_id(session_id) {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let dir = self.session_dir(session_id);
        if !dir.is_dir() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        debug!(session_id, "loading session artifacts");

        let manifest: SessionManifest = read_json(session_id, &dir.join(MANIFEST_FILE))?;
        let index: AnnIndex = read_json(session_id, &dir.join(INDEX_FILE))?;
        let chunks: Vec<Chunk> = read_json(session_id, &dir.join(CHUNKS_FILE))?;
        let documents: Vec<DocumentMetadata> = read_json(session_id, &dir.join(DOCUMENTS_FILE))?;

        if manifest.session_id != session_id {
            return Err(EngineError::IndexLoad(format!(
                "manifest names session {} but was loaded as {}",
                manifest.session_id, session_id
            )));
        }
        if manifest.chunk_count != chunks.len() || chunks.len() != index.len() {
            return Err(EngineError::IndexLoad(format!(
                "session {}: manifest declares {} chunks, found {} chunks and {} vectors",
                session_id,
                manifest.chunk_count,
                chunks.len(),
                index.len()
            )));
        }
        if manifest.embedding_dims != index.dims() {
            return Err(EngineError::IndexLoad(format!(
                "session {}: manifest dims {} but index dims {}",
                session_id,
                manifest.embedding_dims,
                index.dims()
            )));
        }
        if manifest.document_count != documents.len() {
            return Err(EngineError::IndexLoad(format!(
                "session {}: manifest declares {} documents, found {}",
                session_id,
                manifest.document_count,
                documents.len()
            )));
        }
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.position as usize != i {
                return Err(EngineError::IndexLoad(format!(
                    "session {}: chunk at index {} carries position {}",
                    session_id, i, chunk.position
                )));
            }
            if chunk.document_index >= documents.len() {
                return Err(EngineError::IndexLoad(format!(
                    "session {}: chunk {} references document {} of {}",
                    session_id,
                    chunk.position,
                    chunk.document_index,
                    documents.len()
                )));
            }
            if chunk.hash != Chunk::content_hash(&chunk.text) {
                return Err(EngineError::IndexLoad(format!(
                    "session {}: chunk {} text does not match its stored hash",
                    session_id, chunk.position
                )));
            }
        }

        Ok(LoadedSession {
            manifest,
            index,
            chunks,
            documents,
        })
    }
}

/// Session ids are UUIDs; anything else (path separators included) is
/// treated as unknown rather than joined into a filesystem path.
fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| EngineError::IndexPersist(format!("create {:?}: {}", path, e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .map_err(|e| EngineError::IndexPersist(format!("write {:?}: {}", path, e)))?;
    writer
        .into_inner()
        .map_err(|e| EngineError::IndexPersist(format!("flush {:?}: {}", path, e)))?
        .sync_all()
        .map_err(|e| EngineError::IndexPersist(format!("sync {:?}: {}", path, e)))
}

fn sync_dir(path: &Path) -> Result<()> {
    File::open(path)
        .map_err(|e| EngineError::IndexPersist(format!("open {:?}: {}", path, e)))?
        .sync_all()
        .map_err(|e| EngineError::IndexPersist(format!("sync {:?}: {}", path, e)))
}

fn read_json<T: DeserializeOwned>(session_id: &str, path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(EngineError::SessionNotFound(session_id.to_string()));
    }
    let file = File::open(path)
        .map_err(|e| EngineError::IndexLoad(format!("open {:?}: {}", path, e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| EngineError::IndexLoad(format!("parse {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn fixture() -> (SessionManifest, AnnIndex, Vec<Chunk>, Vec<DocumentMetadata>) {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.8, 0.2]];
        let index = AnnIndex::build(2, 4, vectors).unwrap();
        let chunks = vec![
            Chunk::new(0, 0, 0, "job description text".to_string()),
            Chunk::new(1, 1, 0, "first resume text".to_string()),
            Chunk::new(2, 2, 0, "second resume text".to_string()),
        ];
        let documents = vec![
            DocumentMetadata {
                file_name: "jd.txt".to_string(),
                file_type: "txt".to_string(),
                ..Default::default()
            },
            DocumentMetadata {
                file_name: "alice.txt".to_string(),
                file_type: "txt".to_string(),
                ..Default::default()
            },
            DocumentMetadata {
                file_name: "bob.txt".to_string(),
                file_type: "txt".to_string(),
                ..Default::default()
            },
        ];
        let manifest = SessionManifest {
            session_id: SessionStore::allocate_session_id(),
            created_at: Utc::now(),
            embedding_model: "test-model".to_string(),
            embedding_dims: 2,
            document_count: documents.len(),
            chunk_count: chunks.len(),
        };
        (manifest, index, chunks, documents)
    }

    #[test]
    fn test_round_trip_preserves_neighbor_results() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, chunks, documents) = fixture();

        store.persist(&manifest, &index, &chunks, &documents).unwrap();
        let loaded = store.load(&manifest.session_id).unwrap();

        let query = [0.9, 0.1];
        assert_eq!(
            index.search(&query, 3, 8).unwrap(),
            loaded.index.search(&query, 3, 8).unwrap()
        );
        assert_eq!(loaded.chunks.len(), 3);
        assert_eq!(loaded.documents[1].file_name, "alice.txt");
        assert_eq!(loaded.manifest.embedding_model, "test-model");
    }

    #[test]
    fn test_unknown_session_id() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let err = store.load("no-such-session").unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[test]
    fn test_path_like_session_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let err = store.load("../escape").unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[test]
    fn test_missing_artifact_is_session_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, chunks, documents) = fixture();
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        fs::remove_file(
            tmp.path()
                .join("sessions")
                .join(&manifest.session_id)
                .join(CHUNKS_FILE),
        )
        .unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[test]
    fn test_corrupt_artifact_is_index_load_error() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, chunks, documents) = fixture();
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        fs::write(
            tmp.path()
                .join("sessions")
                .join(&manifest.session_id)
                .join(INDEX_FILE),
            b"{ not json",
        )
        .unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::IndexLoad(_)));
    }

    #[test]
    fn test_inconsistent_counts_fail_loudly() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (mut manifest, index, chunks, documents) = fixture();
        manifest.chunk_count = 99;
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::IndexLoad(_)));
    }

    #[test]
    fn test_dangling_document_reference_fails_loudly() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, mut chunks, documents) = fixture();
        chunks[1].document_index = 7;
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::IndexLoad(_)));
    }

    #[test]
    fn test_out_of_order_chunk_positions_fail_loudly() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, mut chunks, documents) = fixture();
        chunks[0].position = 2;
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::IndexLoad(_)));
    }

    #[test]
    fn test_tampered_chunk_text_fails_hash_check() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, mut chunks, documents) = fixture();
        // The stored hash still describes the original text.
        chunks[2].text = "tampered resume text".to_string();
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        let err = store.load(&manifest.session_id).unwrap_err();
        assert!(matches!(err, EngineError::IndexLoad(_)));
    }

    #[test]
    fn test_no_stage_directory_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let (manifest, index, chunks, documents) = fixture();
        store.persist(&manifest, &index, &chunks, &documents).unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("sessions"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".stage-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_session_ids_unique() {
        let a = SessionStore::allocate_session_id();
        let b = SessionStore::allocate_session_id();
        assert_ne!(a, b);
    }
}
