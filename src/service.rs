//! Top-level question-answering service.
//!
//! Wires the index cache, session registry, web search, and LLM client
//! together behind one entry point, [`QaService::handle_query`]. All
//! dependencies are constructed here and passed down explicitly.

use anyhow::Result;
use std::sync::Arc;

use crate::agent::{AgentDeps, RetrievalAgent};
use crate::cache::{CacheHealth, IndexCache};
use crate::config::{Config, LlmConfig};
use crate::llm::LlmClient;
use crate::models::SourceRef;
use crate::session::{SessionRegistry, SessionStats};
use crate::websearch::WebSearch;

/// Structured reply for one handled query.
#[derive(Debug)]
pub struct QueryResponse {
    pub response: String,
    /// The session the query ran in; new when the caller supplied none
    /// (or an expired one).
    pub session_id: String,
    pub success: bool,
    pub source_type: String,
    pub sources: Vec<SourceRef>,
}

pub struct QaService {
    cache: Arc<IndexCache>,
    registry: Arc<SessionRegistry>,
    websearch: Option<Arc<WebSearch>>,
    llm_config: LlmConfig,
    top_k: usize,
}

impl QaService {
    /// Build the service and start the session reaper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        let cache = Arc::new(IndexCache::new(
            config.index.dir.clone(),
            config.embedding.clone(),
        ));
        let websearch = WebSearch::from_env(&config.websearch)?.map(Arc::new);
        let registry = Arc::new(SessionRegistry::new(&config.sessions));
        registry.spawn_reaper(config.sessions.sweep_interval_secs);

        Ok(Self {
            cache,
            registry,
            websearch,
            llm_config: config.llm.clone(),
            top_k: config.retrieval.top_k,
        })
    }

    fn build_agent(&self) -> Result<RetrievalAgent> {
        let llm = Arc::new(LlmClient::new(&self.llm_config)?);
        Ok(RetrievalAgent::new(AgentDeps {
            cache: self.cache.clone(),
            llm,
            websearch: self.websearch.clone(),
            top_k: self.top_k,
        }))
    }

    /// Answer one message, creating a session when the caller has none.
    ///
    /// An unknown or expired `session_id` silently gets a fresh session;
    /// the returned `session_id` tells the caller which one was used. The
    /// only error is session admission failure when the registry is full.
    pub async fn handle_query(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<QueryResponse> {
        let session = match session_id.and_then(|id| self.registry.get(id)) {
            Some(session) => session,
            None => self.registry.create_session()?,
        };

        let outcome = session.query(|| self.build_agent(), message).await;

        Ok(QueryResponse {
            response: outcome.answer,
            session_id: session.id.clone(),
            success: outcome.success,
            source_type: outcome.search_type.as_str().to_string(),
            sources: outcome.sources,
        })
    }

    /// Drop a session's chat history, keeping the session alive.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        match self.registry.get(session_id) {
            Some(session) => {
                session.clear_history().await;
                true
            }
            None => false,
        }
    }

    pub fn session_stats(&self) -> SessionStats {
        self.registry.stats()
    }

    /// Sweep expired sessions now. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        self.registry.remove_expired()
    }

    pub async fn health(&self) -> CacheHealth {
        self.cache.health_check().await
    }
}
