//! Ingestion pipeline orchestration.
//!
//! Flow per file: extractor lookup → fingerprint check → text extraction →
//! chunking → inline embedding (non-fatal) → transactional index write →
//! registry update → cache invalidation. A file whose fingerprint matches
//! its registry entry is skipped without touching its bytes beyond the
//! fingerprint prefix.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::cache::IndexCache;
use crate::chunker::split_text;
use crate::config::{ChunkingConfig, Config, EmbeddingConfig};
use crate::embedding;
use crate::extract::ExtractorTable;
use crate::fingerprint::{fingerprint_file, Registry, RegistryEntry};
use crate::models::{Chunk, DocumentMetadata};

pub struct IngestPipeline {
    extractors: ExtractorTable,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
    index_dir: PathBuf,
    cache: Arc<IndexCache>,
}

/// Outcome of an `ingest_all` run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub succeeded: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub total: usize,
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunks written to the index.
    Indexed,
    /// Fingerprint matched the registry; nothing to do.
    Unchanged,
    /// Unsupported format or empty document; logged and skipped.
    Skipped,
}

impl IngestPipeline {
    pub fn new(config: &Config, cache: Arc<IndexCache>) -> Self {
        let extractors = ExtractorTable::with_defaults(config.documents.ocr);
        extractors.log_capabilities();
        Self {
            extractors,
            chunking: config.chunking.clone(),
            embedding: config.embedding.clone(),
            index_dir: config.index.dir.clone(),
            cache,
        }
    }

    pub fn extractors(&self) -> &ExtractorTable {
        &self.extractors
    }

    /// Ingest a single file.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome> {
        let source = path.display().to_string();

        let Some(extractor) = self.extractors.for_path(path) else {
            warn!(source = %source, "no extractor for file, skipping");
            return Ok(IngestOutcome::Skipped);
        };
        let extractor = extractor.clone();

        let fingerprint = fingerprint_file(path)?;
        let mut registry = Registry::load(&self.index_dir)?;
        if registry.is_current(&source, &fingerprint) {
            info!(source = %source, "unchanged since last ingest, skipping");
            return Ok(IngestOutcome::Unchanged);
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let text = extractor
            .extract_text(path, &bytes)
            .with_context(|| format!("Extraction failed for {}", path.display()))?;

        if text.trim().is_empty() {
            warn!(source = %source, extractor = extractor.name(), "no text extracted, skipping");
            return Ok(IngestOutcome::Skipped);
        }

        let metadata = file_metadata(path, &source, extractor.name())?;
        let metadata_json = serde_json::to_string(&metadata)?;

        let pieces = split_text(&text, self.chunking.chunk_size, self.chunking.chunk_overlap);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk {
                id: Uuid::new_v4().to_string(),
                source: source.clone(),
                chunk_index: i as i64,
                text: piece,
                metadata_json: metadata_json.clone(),
            })
            .collect();

        let embeddings = self.embed_chunks(&chunks).await;

        let store = self.cache.get().await?;
        store.replace_source(&source, &chunks, &embeddings).await?;

        registry.record(
            &source,
            RegistryEntry {
                fingerprint,
                last_processed: Utc::now(),
                chunk_count: chunks.len(),
                extractor_used: extractor.name().to_string(),
            },
        );
        registry.save()?;

        // Readers must see the new chunks on their next access.
        self.cache.invalidate().await;

        info!(
            source = %source,
            chunks = chunks.len(),
            extractor = extractor.name(),
            "file indexed"
        );
        Ok(IngestOutcome::Indexed)
    }

    /// Embed chunk texts in batches. Embedding failures are non-fatal:
    /// affected chunks are stored without vectors and a warning is logged.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Vec<Option<Vec<f32>>> {
        if !self.embedding.is_enabled() {
            return vec![None; chunks.len()];
        }

        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            match embedding::embed_texts(&self.embedding, &texts).await {
                Ok(vecs) if vecs.len() == batch.len() => {
                    embeddings.extend(vecs.into_iter().map(Some));
                }
                Ok(vecs) => {
                    warn!(
                        expected = batch.len(),
                        got = vecs.len(),
                        "embedding batch size mismatch, storing chunks unembedded"
                    );
                    embeddings.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
                Err(e) => {
                    warn!(error = %e, "embedding failed, storing chunks unembedded");
                    embeddings.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }
        embeddings
    }

    /// Walk a directory tree and ingest every supported file.
    pub async fn ingest_all(&self, root: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to walk directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.extractors.for_path(entry.path()).is_none() {
                continue;
            }

            report.total += 1;
            match self.ingest(entry.path()).await {
                Ok(IngestOutcome::Indexed) => report.succeeded += 1,
                Ok(IngestOutcome::Unchanged) => {
                    report.succeeded += 1;
                    report.skipped_unchanged += 1;
                }
                Ok(IngestOutcome::Skipped) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(source = %entry.path().display(), error = %e, "ingest failed");
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            total = report.total,
            unchanged = report.skipped_unchanged,
            "ingest run complete"
        );
        Ok(report)
    }
}

fn file_metadata(path: &Path, source: &str, extractor: &str) -> Result<DocumentMetadata> {
    let stat = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?;
    let modified_at: Option<DateTime<Utc>> = stat.modified().ok().map(DateTime::from);

    Ok(DocumentMetadata {
        source: source.to_string(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: stat.len(),
        modified_at,
        extractor: extractor.to_string(),
    })
}
