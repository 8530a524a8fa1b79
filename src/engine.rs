//! The matching engine: `ingest` and `query` orchestration.
//!
//! Ingestion chunks each document separately (so every chunk keeps its
//! source-document provenance), embeds the chunks in batches, builds the ANN
//! index, and persists the session artifacts atomically. Querying reloads the
//! session, runs the dense and lexical retrieval paths concurrently, joins
//! both (either failure fails the whole query — no partial fusion), fuses the
//! rankings, and hands the matched chunk texts to the analysis model.
//!
//! Providers are constructed once from the configuration and injected at
//! engine construction; there is no global client state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::analysis::{self, AnalysisExcerpt, AnalysisProvider};
use crate::ann::AnnIndex;
use crate::chunk::split_text;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{EngineError, Result};
use crate::fuse::{fuse_rankings, FusionWeights};
use crate::highlight::extract_highlights;
use crate::lexical::Bm25Index;
use crate::models::{Chunk, Document, Match, QueryResponse, SessionManifest};
use crate::store::SessionStore;

/// Maximum characters of chunk text included in a match preview.
const PREVIEW_CHARS: usize = 500;

/// Hybrid retrieval and matching engine over one data directory.
pub struct MatchEngine {
    config: Config,
    store: SessionStore,
    embedder: Arc<dyn EmbeddingProvider>,
    analyst: Arc<dyn AnalysisProvider>,
}

impl MatchEngine {
    /// Build an engine with the HTTP providers described by the config.
    pub fn new(config: Config) -> Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let analyst = analysis::create_provider(&config.analysis)?;
        Ok(Self::with_providers(config, embedder, analyst))
    }

    /// Build an engine with injected providers. This is the seam used by
    /// tests and by callers bringing their own embedding or analysis backend.
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        analyst: Arc<dyn AnalysisProvider>,
    ) -> Self {
        let store = SessionStore::new(&config.storage.data_dir);
        Self {
            config,
            store,
            embedder,
            analyst,
        }
    }

    /// Ingest a job description and candidate resumes, returning the fresh
    /// session id. All artifacts are durably written before this returns.
    pub async fn ingest(&self, job: Document, resumes: Vec<Document>) -> Result<String> {
        if resumes.is_empty() {
            return Err(EngineError::Chunking(
                "at least one resume is required".to_string(),
            ));
        }
        if job.text.trim().is_empty() {
            return Err(EngineError::Chunking(
                "job description text is empty".to_string(),
            ));
        }
        for resume in &resumes {
            if resume.text.trim().is_empty() {
                return Err(EngineError::Chunking(format!(
                    "resume '{}' has no text",
                    resume.metadata.file_name
                )));
            }
        }

        // Job description first, then resumes in upload order. Chunking is
        // per-document, so no chunk straddles two documents.
        let mut documents = vec![job];
        documents.extend(resumes);

        let mut chunks: Vec<Chunk> = Vec::new();
        for (document_index, document) in documents.iter().enumerate() {
            let pieces = split_text(
                &document.text,
                self.config.chunking.max_chars,
                self.config.chunking.overlap_chars,
            );
            for (chunk_index, text) in pieces.into_iter().enumerate() {
                chunks.push(Chunk::new(
                    chunks.len() as u32,
                    document_index,
                    chunk_index,
                    text,
                ));
            }
        }
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "corpus chunked"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(EngineError::EmbeddingService(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let index = AnnIndex::build(self.embedder.dims(), self.config.index.fan_out, vectors)?;

        let metadata: Vec<_> = documents.iter().map(|d| d.metadata.clone()).collect();
        let manifest = SessionManifest {
            session_id: SessionStore::allocate_session_id(),
            created_at: Utc::now(),
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dims: self.embedder.dims(),
            document_count: metadata.len(),
            chunk_count: chunks.len(),
        };

        self.store.persist(&manifest, &index, &chunks, &metadata)?;
        info!(
            session_id = %manifest.session_id,
            documents = metadata.len(),
            chunks = manifest.chunk_count,
            "ingest complete"
        );

        Ok(manifest.session_id)
    }

    /// Query a previously ingested session, returning the fused top-`k`
    /// matches and the model's free-text analysis.
    pub async fn query(&self, query: &str, session_id: &str, k: usize) -> Result<QueryResponse> {
        if query.trim().is_empty() {
            return Err(EngineError::Chunking("query text is empty".to_string()));
        }
        if k == 0 {
            return Err(EngineError::Chunking("k must be >= 1".to_string()));
        }

        let session = self.store.load(session_id)?;

        // The two retrieval paths are independent; both must complete before
        // fusion. A failure on either side fails the query.
        let vector_path = async {
            let query_vector = self.embedder.embed_query(query).await?;
            session
                .index
                .search(&query_vector, k, self.config.index.ef_search)
        };
        let lexical_path = async {
            let bm25 = Bm25Index::build(session.chunks.iter().map(|c| c.text.as_str()));
            Ok::<_, EngineError>(bm25.search(query, k))
        };
        let (vector_hits, lexical_hits) = tokio::try_join!(vector_path, lexical_path)?;
        debug!(
            vector_hits = vector_hits.len(),
            lexical_hits = lexical_hits.len(),
            "retrieval paths joined"
        );

        let weights = FusionWeights {
            vector: self.config.retrieval.vector_weight,
            lexical: self.config.retrieval.lexical_weight,
            rrf_k: self.config.retrieval.rrf_k,
        };
        let fused = fuse_rankings(&vector_hits, &lexical_hits, weights, k);

        let mut matches = Vec::with_capacity(fused.len());
        let mut excerpts = Vec::with_capacity(fused.len());
        for &(position, score) in &fused {
            let chunk = &session.chunks[position as usize];
            let source = session.documents[chunk.document_index].file_name.clone();
            matches.push(Match {
                score,
                highlights: extract_highlights(&chunk.text, query),
                content: chunk.text.chars().take(PREVIEW_CHARS).collect(),
                source: source.clone(),
            });
            excerpts.push(AnalysisExcerpt {
                source,
                text: chunk.text.clone(),
            });
        }

        let analysis = self.analyst.analyze(query, &excerpts).await?;
        info!(
            session_id,
            matches = matches.len(),
            "query complete"
        );

        Ok(QueryResponse { matches, analysis })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Embedder that records whether it was ever called.
    struct TrackingEmbedder {
        called: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for TrackingEmbedder {
        fn model_name(&self) -> &str {
            "tracking"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.called.store(true, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    /// Embedder that drops one vector from every batch.
    struct MiscountEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MiscountEmbedder {
        fn model_name(&self) -> &str {
            "miscount"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0; 4]).collect())
        }
    }

    struct NoopAnalyst;

    #[async_trait]
    impl AnalysisProvider for NoopAnalyst {
        async fn analyze(&self, _query: &str, _excerpts: &[AnalysisExcerpt]) -> Result<String> {
            Ok("analysis".to_string())
        }
    }

    fn engine_with_tracking(dir: &std::path::Path) -> (MatchEngine, Arc<TrackingEmbedder>) {
        let embedder = Arc::new(TrackingEmbedder {
            called: AtomicBool::new(false),
        });
        let engine = MatchEngine::with_providers(
            Config::with_data_dir(dir),
            embedder.clone(),
            Arc::new(NoopAnalyst),
        );
        (engine, embedder)
    }

    fn doc(name: &str, text: &str) -> Document {
        Document::new(
            text,
            DocumentMetadata {
                file_name: name.to_string(),
                file_type: "txt".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_resume_list_fails_before_embedding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (engine, embedder) = engine_with_tracking(tmp.path());

        let err = engine
            .ingest(doc("jd.txt", "Seeking an engineer"), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Chunking(_)));
        assert!(!embedder.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_job_description_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (engine, _) = engine_with_tracking(tmp.path());

        let err = engine
            .ingest(doc("jd.txt", "   "), vec![doc("r.txt", "resume")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Chunking(_)));
    }

    #[tokio::test]
    async fn test_empty_resume_text_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (engine, embedder) = engine_with_tracking(tmp.path());

        let err = engine
            .ingest(doc("jd.txt", "Seeking"), vec![doc("r.txt", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Chunking(_)));
        assert!(!embedder.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_fails_ingest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let engine = MatchEngine::with_providers(
            Config::with_data_dir(tmp.path()),
            Arc::new(MiscountEmbedder),
            Arc::new(NoopAnalyst),
        );

        let err = engine
            .ingest(doc("jd.txt", "Seeking an engineer"), vec![doc("r.txt", "resume")])
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::EmbeddingService(_)));
        // The ingest must fail before anything is persisted.
        assert!(!tmp.path().join("sessions").exists());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (engine, _) = engine_with_tracking(tmp.path());

        let err = engine.query("  ", "some-session", 5).await.unwrap_err();
        assert!(matches!(err, EngineError::Chunking(_)));
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (engine, _) = engine_with_tracking(tmp.path());

        let err = engine.query("python", "some-session", 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Chunking(_)));
    }
}
