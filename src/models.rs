//! Core data models used throughout Docent.
//!
//! These types represent the documents, chunks, and answers that flow through
//! the ingestion pipeline and the question-answering agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to every chunk produced from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub file_name: String,
    pub file_size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub extractor: String,
}

/// A chunk of document text stored in the index.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata_json: String,
}

/// A chunk returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata_json: String,
    pub score: f64,
}

/// How a query was answered, recorded per turn for provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    DocumentOnly,
    DocumentAndInternet,
    InternetOnly,
    /// Answered without a classifiable tool route (plain model call or
    /// terminal fallback).
    Agent,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::DocumentOnly => "document_only",
            SearchType::DocumentAndInternet => "document+internet",
            SearchType::InternetOnly => "internet_only",
            SearchType::Agent => "agent",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source attribution for one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub chunk_index: i64,
    pub score: f64,
}

/// One completed question/answer exchange within a session.
#[derive(Debug, Clone)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub search_type: SearchType,
}

/// Result of answering one question, before it is appended to history.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub search_type: SearchType,
    pub success: bool,
}
