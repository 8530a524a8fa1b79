//! # Resumatch CLI (`rmx`)
//!
//! The `rmx` binary is the serving front for the matching engine. It reads
//! plain-text documents (a parsing collaborator is expected to have already
//! extracted text from PDFs or DOCX files) plus optional sidecar metadata,
//! and exposes the engine's two operations.
//!
//! ## Usage
//!
//! ```bash
//! rmx --config ./config/resumatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rmx ingest --job <file> --resume <file>...` | Ingest a corpus, print the session id |
//! | `rmx query "<text>" --session <id>` | Rank matches in a session |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest one job description and two resumes
//! rmx ingest --job jd.txt --resume alice.txt --resume bob.txt
//!
//! # Query the returned session
//! rmx query "Python backend experience" --session 6f2c...
//! ```
//!
//! A document `foo.txt` may carry collaborator-supplied metadata in a sidecar
//! file `foo.txt.meta.json` (fields of [`DocumentMetadata`]).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use resumatch::config::load_config;
use resumatch::models::{Document, DocumentMetadata};
use resumatch::MatchEngine;

/// Resumatch CLI — hybrid retrieval and ranking of resumes against a job
/// description.
#[derive(Parser)]
#[command(
    name = "rmx",
    about = "Resumatch — hybrid retrieval and ranking of resumes against a job description",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/resumatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a job description and resumes into a fresh session.
    ///
    /// Chunks each document, embeds the chunks, builds the vector index, and
    /// persists all session artifacts. Prints the session id to use with
    /// `query`.
    Ingest {
        /// Path to the job description text file.
        #[arg(long)]
        job: PathBuf,

        /// Path to a resume text file. Repeat for multiple resumes.
        #[arg(long = "resume", required = true)]
        resumes: Vec<PathBuf>,
    },

    /// Query an ingested session.
    ///
    /// Runs hybrid (semantic + lexical) retrieval over the session's chunks,
    /// prints the fused matches with highlights, then the model's ranked
    /// analysis.
    Query {
        /// The query text, e.g. a role summary or skill list.
        query: String,

        /// Session id returned by `ingest`.
        #[arg(long)]
        session: String,

        /// Number of fused matches to return; defaults to `retrieval.final_k`
        /// from the config.
        #[arg(long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let final_k = config.retrieval.final_k;
    let engine = MatchEngine::new(config)?;

    match cli.command {
        Commands::Ingest { job, resumes } => {
            let job = read_document(&job)?;
            let resumes = resumes
                .iter()
                .map(|path| read_document(path))
                .collect::<Result<Vec<_>>>()?;

            let session_id = engine.ingest(job, resumes).await?;
            println!("session: {}", session_id);
        }
        Commands::Query { query, session, k } => {
            let response = engine.query(&query, &session, k.unwrap_or(final_k)).await?;

            for (i, m) in response.matches.iter().enumerate() {
                println!("{}. [{:.4}] {}", i + 1, m.score, m.source);
                if !m.highlights.is_empty() {
                    println!("    highlights: {}", m.highlights);
                }
                println!("    excerpt: \"{}\"", m.content.replace('\n', " ").trim());
                println!();
            }

            println!("analysis:");
            println!("{}", response.analysis);
        }
    }

    Ok(())
}

/// Read one document: its text plus optional `<file>.meta.json` sidecar
/// metadata. Without a sidecar, metadata is derived from the file name.
fn read_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;

    let sidecar = PathBuf::from(format!("{}.meta.json", path.display()));
    let mut metadata: DocumentMetadata = if sidecar.is_file() {
        let raw = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("Failed to read metadata: {}", sidecar.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse metadata: {}", sidecar.display()))?
    } else {
        DocumentMetadata::default()
    };

    if metadata.file_name.is_empty() {
        metadata.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    if metadata.file_type.is_empty() {
        metadata.file_type = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    Ok(Document::new(text, metadata))
}
