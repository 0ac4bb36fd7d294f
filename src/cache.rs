//! Cached access to the vector index.
//!
//! Opening the index means hitting the filesystem and running migrations,
//! so the handle is created lazily on first use and reused until
//! [`IndexCache::invalidate`] drops it (the ingestion pipeline invalidates
//! after every write so readers see fresh data). Query paths never
//! propagate index errors: a failed open or failed query embedding logs a
//! warning, bumps the error counter, and yields zero results so the caller
//! can fall back to other sources.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::embedding;
use crate::models::ScoredChunk;
use crate::store::IndexStore;

pub struct IndexCache {
    index_dir: PathBuf,
    embedding: EmbeddingConfig,
    cached: Mutex<Option<Arc<IndexStore>>>,
    access_count: AtomicU64,
    error_count: AtomicU64,
}

/// Snapshot returned by [`IndexCache::health_check`].
#[derive(Debug)]
pub struct CacheHealth {
    pub healthy: bool,
    pub access_count: u64,
    pub error_count: u64,
    pub chunk_count: Option<i64>,
    pub detail: String,
}

impl IndexCache {
    pub fn new(index_dir: PathBuf, embedding: EmbeddingConfig) -> Self {
        Self {
            index_dir,
            embedding,
            cached: Mutex::new(None),
            access_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Get the index handle, opening it on first access.
    pub async fn get(&self) -> Result<Arc<IndexStore>> {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        let mut cached = self.cached.lock().await;
        if let Some(store) = cached.as_ref() {
            return Ok(store.clone());
        }
        debug!(dir = %self.index_dir.display(), "opening vector index");
        match IndexStore::open(&self.index_dir).await {
            Ok(store) => {
                let store = Arc::new(store);
                *cached = Some(store.clone());
                Ok(store)
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Drop the cached handle so the next access reopens the index.
    ///
    /// Handles already held by readers stay usable; the underlying pool
    /// goes away when the last holder releases its `Arc`.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if cached.take().is_some() {
            debug!("vector index handle invalidated");
        }
    }

    /// Similarity search that never fails the caller.
    ///
    /// Any error along the way (opening the index, embedding the query,
    /// running the scan) is logged and converted to an empty result set.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<ScoredChunk> {
        match self.try_search(query, top_k).await {
            Ok(results) => results,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "document search failed, returning no results");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embedding::embed_query(&self.embedding, query).await?;
        let store = self.get().await?;
        store.search(&query_vec, top_k).await
    }

    /// Probe the index with a trivial query and report counters.
    pub async fn health_check(&self) -> CacheHealth {
        let access_count = self.access_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);

        let store = match self.get().await {
            Ok(store) => store,
            Err(e) => {
                return CacheHealth {
                    healthy: false,
                    access_count,
                    error_count: self.error_count.load(Ordering::Relaxed),
                    chunk_count: None,
                    detail: format!("index unavailable: {}", e),
                }
            }
        };

        let chunk_count = match store.chunk_count().await {
            Ok(n) => n,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                return CacheHealth {
                    healthy: false,
                    access_count,
                    error_count: self.error_count.load(Ordering::Relaxed),
                    chunk_count: None,
                    detail: format!("index query failed: {}", e),
                };
            }
        };

        // An empty index is healthy; a failing trivial search is not.
        if chunk_count > 0 && self.embedding.is_enabled() {
            if let Err(e) = self.try_search("health check", 1).await {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                return CacheHealth {
                    healthy: false,
                    access_count,
                    error_count: self.error_count.load(Ordering::Relaxed),
                    chunk_count: Some(chunk_count),
                    detail: format!("probe search failed: {}", e),
                };
            }
        }

        CacheHealth {
            healthy: true,
            access_count,
            error_count: self.error_count.load(Ordering::Relaxed),
            chunk_count: Some(chunk_count),
            detail: "ok".to_string(),
        }
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &std::path::Path) -> IndexCache {
        IndexCache::new(dir.to_path_buf(), EmbeddingConfig::default())
    }

    #[tokio::test]
    async fn handle_is_reused_between_accesses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let a = cache.get().await.unwrap();
        let b = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.access_count(), 2);
        assert_eq!(cache.error_count(), 0);
    }

    #[tokio::test]
    async fn invalidate_forces_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let a = cache.get().await.unwrap();
        cache.invalidate().await;
        let b = cache.get().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn invalidate_leaves_held_handles_usable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let held = cache.get().await.unwrap();
        cache.invalidate().await;
        // A reader that grabbed the handle before invalidation still gets
        // answers from it.
        assert_eq!(held.chunk_count().await.unwrap(), 0);
        assert_eq!(cache.error_count(), 0);
    }

    #[tokio::test]
    async fn search_degrades_to_empty_on_embed_failure() {
        // Disabled embedding provider: the query cannot be embedded.
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let results = cache.search("anything", 5).await;
        assert!(results.is_empty());
        assert_eq!(cache.error_count(), 1);
    }

    #[tokio::test]
    async fn health_check_reports_empty_index_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let health = cache.health_check().await;
        assert!(health.healthy);
        assert_eq!(health.chunk_count, Some(0));
    }
}
