//! The question-answering agent.
//!
//! An agent answers one session's questions over the document index, with
//! optional web search. Tool routing is enforced in code, not left to the
//! model: the agent decides which tools run, runs them, and records which
//! ones contributed to the answer as the turn's search type.
//!
//! Answering walks an ordered list of [`QueryStrategy`] values. The first
//! strategy routes between document search and web search; if it fails
//! (typically an LLM outage) a plain retrieval chain is tried; if every
//! strategy fails the agent returns a fixed apology rather than an error,
//! so a session never observes a panic or a raw error string.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::IndexCache;
use crate::llm::{ChatMessage, LlmClient};
use crate::models::{QueryOutcome, ScoredChunk, SearchType, SourceRef, Turn};
use crate::websearch::WebSearch;

/// Fixed response when every strategy has failed.
pub const APOLOGY: &str =
    "I'm sorry, I'm having trouble processing your request right now. Please try again later.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about a document \
collection. Use the provided context to answer. If the context does not contain the answer, \
say you don't know instead of guessing.";

const CONDENSE_PROMPT: &str = "Given the conversation so far and a follow-up question, rephrase \
the follow-up into a single standalone question. Return only the question.";

/// Everything a strategy needs to answer a question.
pub struct AgentDeps {
    pub cache: Arc<IndexCache>,
    pub llm: Arc<LlmClient>,
    pub websearch: Option<Arc<WebSearch>>,
    pub top_k: usize,
}

/// One way of answering a question. Strategies are tried in order; an
/// `Err` means "let the next strategy try", not a user-visible failure.
#[async_trait]
pub trait QueryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn answer(
        &self,
        question: &str,
        history: &[Turn],
        deps: &AgentDeps,
    ) -> Result<QueryOutcome>;
}

pub struct RetrievalAgent {
    deps: AgentDeps,
    strategies: Vec<Box<dyn QueryStrategy>>,
    history: Vec<Turn>,
}

impl RetrievalAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self::with_strategies(
            deps,
            vec![
                Box::new(ToolRouteStrategy),
                Box::new(RetrievalChainStrategy),
            ],
        )
    }

    pub fn with_strategies(deps: AgentDeps, strategies: Vec<Box<dyn QueryStrategy>>) -> Self {
        Self {
            deps,
            strategies,
            history: Vec::new(),
        }
    }

    /// Answer one question, recording the turn in history.
    pub async fn query(&mut self, question: &str) -> QueryOutcome {
        let mut outcome = None;
        for strategy in &self.strategies {
            match strategy.answer(question, &self.history, &self.deps).await {
                Ok(result) => {
                    info!(
                        strategy = strategy.name(),
                        search_type = %result.search_type,
                        "question answered"
                    );
                    outcome = Some(result);
                    break;
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy failed, trying next");
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| QueryOutcome {
            answer: APOLOGY.to_string(),
            sources: Vec::new(),
            search_type: SearchType::Agent,
            success: false,
        });

        self.history.push(Turn {
            question: question.to_string(),
            answer: outcome.answer.clone(),
            sources: outcome.sources.clone(),
            search_type: outcome.search_type,
        });

        outcome
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

/// Routes between document search and web search, in code.
///
/// Document search always runs. Web search runs only when the tool is
/// configured and either the question looks time-sensitive or the index
/// produced nothing. The turn's search type reflects which tools actually
/// contributed results.
pub struct ToolRouteStrategy;

#[async_trait]
impl QueryStrategy for ToolRouteStrategy {
    fn name(&self) -> &'static str {
        "tool-route"
    }

    async fn answer(
        &self,
        question: &str,
        history: &[Turn],
        deps: &AgentDeps,
    ) -> Result<QueryOutcome> {
        let time_sensitive = is_time_sensitive(question);
        let doc_hits = deps.cache.search(question, deps.top_k).await;

        let mut web_results = Vec::new();
        if let Some(web) = &deps.websearch {
            if time_sensitive || doc_hits.is_empty() {
                match web.search(question).await {
                    Ok(results) => web_results = results,
                    Err(e) => warn!(error = %e, "web search failed, continuing without it"),
                }
            }
        }

        let search_type = classify(!doc_hits.is_empty(), !web_results.is_empty());

        let mut prompt = String::new();
        if !doc_hits.is_empty() {
            prompt.push_str("Document context:\n");
            for hit in &doc_hits {
                prompt.push_str(&format!("- {}\n", hit.text));
            }
            prompt.push('\n');
        }
        if !web_results.is_empty() {
            prompt.push_str("Web search results:\n");
            for result in &web_results {
                prompt.push_str(&format!("- {} ({}): {}\n", result.title, result.url, result.snippet));
            }
            prompt.push('\n');
        }
        if time_sensitive {
            prompt.push_str(&format!(
                "[TIME SENSITIVE] Today's date is {}. Prefer current information.\n\n",
                chrono::Utc::now().format("%Y-%m-%d")
            ));
        }
        prompt.push_str(&format!("Question: {}", question));

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(format_chat_history(history));
        messages.push(ChatMessage::user(prompt));

        let answer = deps.llm.complete(&messages).await?;

        Ok(QueryOutcome {
            answer,
            sources: source_refs(&doc_hits),
            search_type,
            success: true,
        })
    }
}

/// Plain condense-question + answer chain over the document index.
///
/// Fallback for when tool routing fails. Follow-up questions are first
/// rewritten into standalone questions using the chat history, then the
/// index is searched and the answer is grounded in whatever was found.
pub struct RetrievalChainStrategy;

#[async_trait]
impl QueryStrategy for RetrievalChainStrategy {
    fn name(&self) -> &'static str {
        "retrieval-chain"
    }

    async fn answer(
        &self,
        question: &str,
        history: &[Turn],
        deps: &AgentDeps,
    ) -> Result<QueryOutcome> {
        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let mut messages = vec![ChatMessage::system(CONDENSE_PROMPT)];
            messages.extend(format_chat_history(history));
            messages.push(ChatMessage::user(question.to_string()));
            deps.llm.complete(&messages).await?
        };

        let hits = deps.cache.search(&standalone, deps.top_k).await;
        let context = if hits.is_empty() {
            "No relevant context was found in the document collection.".to_string()
        } else {
            hits.iter()
                .map(|h| h.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Context:\n{}\n\nQuestion: {}", context, standalone)),
        ];
        let answer = deps.llm.complete(&messages).await?;

        Ok(QueryOutcome {
            answer,
            sources: source_refs(&hits),
            search_type: SearchType::DocumentOnly,
            success: true,
        })
    }
}

fn source_refs(hits: &[ScoredChunk]) -> Vec<SourceRef> {
    hits.iter()
        .map(|h| SourceRef {
            source: h.source.clone(),
            chunk_index: h.chunk_index,
            score: h.score,
        })
        .collect()
}

fn classify(docs_contributed: bool, web_contributed: bool) -> SearchType {
    match (docs_contributed, web_contributed) {
        (true, false) => SearchType::DocumentOnly,
        (true, true) => SearchType::DocumentAndInternet,
        (false, true) => SearchType::InternetOnly,
        (false, false) => SearchType::Agent,
    }
}

/// Heuristic for questions whose answers go stale: explicit recency words
/// or a four-digit year anywhere in the question.
pub fn is_time_sensitive(question: &str) -> bool {
    const MARKERS: [&str; 10] = [
        "today", "latest", "current", "currently", "now", "recent", "this year", "this month",
        "news", "weather",
    ];
    let lower = question.to_lowercase();
    if MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    contains_year(&lower)
}

fn contains_year(text: &str) -> bool {
    let mut digits = 0usize;
    let mut run_start = 0usize;
    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() {
            if digits == 0 {
                run_start = i;
            }
            digits += 1;
        } else {
            if digits == 4 {
                if let Ok(year) = text[run_start..run_start + 4].parse::<u32>() {
                    if (1900..=2100).contains(&year) {
                        return true;
                    }
                }
            }
            digits = 0;
        }
    }
    if digits == 4 {
        if let Ok(year) = text[run_start..run_start + 4].parse::<u32>() {
            return (1900..=2100).contains(&year);
        }
    }
    false
}

/// Render history as alternating user/assistant messages, skipping turns
/// whose answer is empty.
pub fn format_chat_history(history: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2);
    for turn in history {
        if turn.answer.trim().is_empty() {
            continue;
        }
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
    messages
}
