//! # Docent
//!
//! A multi-tenant retrieval-augmented question answering service over
//! mixed-format document collections.
//!
//! Docent ingests PDF, Word, PowerPoint, Excel, and (when tesseract is
//! installed) image files into a local vector index, then answers
//! questions over that index with an LLM, optionally reaching out to web
//! search for time-sensitive questions. Sessions give each conversation
//! its own history and agent, with idle-timeout cleanup and a hard cap on
//! concurrent sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Extractors  │──▶│   Pipeline    │──▶│ SQLite index   │
//! │ pdf/ooxml/  │   │ chunk+embed  │   │ + registry.json│
//! │ ocr         │   └──────────────┘   └──────┬────────┘
//! └─────────────┘                             │ cached handle
//!                                             ▼
//!                  ┌──────────┐   ┌──────────────────────┐
//!                  │ Sessions │──▶│ Agent: doc search +   │
//!                  │ registry │   │ web search + LLM      │
//!                  └──────────┘   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent init                    # create the index
//! docent ingest --all            # index the documents directory
//! docent query "What are the opening hours?"
//! docent stats                   # index and session counters
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`chunker`] | Recursive text splitting |
//! | [`fingerprint`] | Prefix hashing and the processed-file registry |
//! | [`store`] | The SQLite vector index |
//! | [`cache`] | Cached index handle with degrade-to-empty search |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat completion client |
//! | [`websearch`] | Tavily/SerpAPI web search with fallback |
//! | [`ingest`] | Ingestion pipeline |
//! | [`agent`] | Strategy-driven question answering |
//! | [`session`] | Session registry and lifecycle |
//! | [`service`] | Top-level service facade |

pub mod agent;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod service;
pub mod session;
pub mod store;
pub mod websearch;
