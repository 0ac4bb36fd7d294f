//! Session lifecycle and admission control.
//!
//! Each chat session owns its agent (and therefore its history) behind an
//! async mutex, so concurrent queries against one session serialize while
//! different sessions proceed in parallel. The registry map itself is
//! guarded by a std mutex that is never held across an await.
//!
//! Capacity is enforced at creation: when the registry is full, expired
//! sessions are swept once and creation fails if the map is still full.
//! A background reaper sweeps on an interval as well, so idle sessions do
//! not linger until the next admission attempt.
//!
//! Agent construction is deferred to the first query. If it fails (for
//! example a missing API key) the session is marked degraded and every
//! later query gets a fixed apology instead of an error.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::agent::RetrievalAgent;
use crate::config::SessionConfig;
use crate::models::{QueryOutcome, SearchType};

/// Fixed response for sessions whose agent could not be built.
pub const INIT_APOLOGY: &str =
    "I'm sorry, the assistant failed to initialize. Please try again later.";

#[derive(Debug)]
pub enum SessionError {
    LimitExceeded(usize),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::LimitExceeded(max) => {
                write!(f, "session limit reached ({} active sessions)", max)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Lazily-constructed per-session agent.
enum AgentSlot {
    Vacant,
    Ready(RetrievalAgent),
    /// Construction failed; the reason is kept for logs. Degradation is
    /// permanent for the session's lifetime.
    Degraded(String),
}

pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    last_activity: StdMutex<DateTime<Utc>>,
    slot: Mutex<AgentSlot>,
    /// Mirrors whether the slot holds a built agent, readable for stats
    /// without taking the slot lock.
    agent_ready: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("agent_ready", &self.agent_ready)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: StdMutex::new(now),
            slot: Mutex::new(AgentSlot::Vacant),
            agent_ready: AtomicBool::new(false),
        }
    }

    pub fn agent_initialized(&self) -> bool {
        self.agent_ready.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Utc::now();
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
            .lock()
            .map(|t| *t)
            .unwrap_or(self.created_at)
    }

    pub fn is_expired(&self, max_idle: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity() > max_idle
    }

    /// Answer a question in this session. Holds the session's agent lock
    /// for the duration, serializing concurrent queries to one session.
    pub async fn query(&self, build_agent: impl FnOnce() -> anyhow::Result<RetrievalAgent>, question: &str) -> QueryOutcome {
        let mut slot = self.slot.lock().await;
        self.touch();

        if matches!(*slot, AgentSlot::Vacant) {
            match build_agent() {
                Ok(agent) => {
                    *slot = AgentSlot::Ready(agent);
                    self.agent_ready.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(session = %self.id, error = %e, "agent construction failed, session degraded");
                    *slot = AgentSlot::Degraded(e.to_string());
                }
            }
        }

        match &mut *slot {
            AgentSlot::Ready(agent) => agent.query(question).await,
            AgentSlot::Degraded(reason) => {
                warn!(session = %self.id, reason = %reason, "query on degraded session");
                QueryOutcome {
                    answer: INIT_APOLOGY.to_string(),
                    sources: Vec::new(),
                    search_type: SearchType::Agent,
                    success: false,
                }
            }
            AgentSlot::Vacant => unreachable!("agent slot filled above"),
        }
    }

    /// Drop this session's chat history, keeping the session alive.
    pub async fn clear_history(&self) {
        let mut slot = self.slot.lock().await;
        self.touch();
        if let AgentSlot::Ready(agent) = &mut *slot {
            agent.clear_history();
        }
    }
}

/// Point-in-time view of one live session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub idle_minutes: i64,
    pub agent_initialized: bool,
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub active: usize,
    pub max: usize,
    pub sessions: Vec<SessionRecord>,
}

pub struct SessionRegistry {
    sessions: StdMutex<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    max_idle: Duration,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            max_sessions: config.max_sessions,
            max_idle: Duration::minutes(config.max_idle_minutes),
        }
    }

    #[cfg(test)]
    fn with_limits(max_sessions: usize, max_idle: Duration) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            max_sessions,
            max_idle,
        }
    }

    /// Create a new session, sweeping expired ones first when at capacity.
    pub fn create_session(&self) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if sessions.len() >= self.max_sessions {
            let removed = Self::sweep_locked(&mut sessions, self.max_idle);
            if removed > 0 {
                info!(removed, "swept expired sessions during admission");
            }
        }
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitExceeded(self.max_sessions));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));
        sessions.insert(id.clone(), session.clone());
        info!(session = %id, active = sessions.len(), "session created");
        Ok(session)
    }

    /// Look up a live session. An expired session is removed here and
    /// treated as absent, so callers never resurrect one by touching it;
    /// the background reaper only covers sessions nobody looks up.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get(id) {
            if session.is_expired(self.max_idle, Utc::now()) {
                sessions.remove(id);
                info!(session = %id, "expired session removed on lookup");
                return None;
            }
            return Some(session.clone());
        }
        None
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id).is_some()
    }

    /// Remove every expired session. Returns the number removed.
    pub fn remove_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep_locked(&mut sessions, self.max_idle)
    }

    fn sweep_locked(sessions: &mut HashMap<String, Arc<Session>>, max_idle: Duration) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(max_idle, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            info!(session = %id, "expired session removed");
        }
        expired.len()
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let mut records: Vec<SessionRecord> = sessions
            .values()
            .map(|s| {
                let last_activity = s.last_activity();
                SessionRecord {
                    session_id: s.id.clone(),
                    created_at: s.created_at,
                    last_activity,
                    idle_minutes: (now - last_activity).num_minutes(),
                    agent_initialized: s.agent_initialized(),
                }
            })
            .collect();
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        SessionStats {
            active: sessions.len(),
            max: self.max_sessions,
            sessions: records,
        }
    }

    /// Spawn the periodic reaper task.
    pub fn spawn_reaper(self: &Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.remove_expired();
                if removed > 0 {
                    info!(removed, "session reaper sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDeps, RetrievalAgent};
    use crate::cache::IndexCache;
    use crate::config::{EmbeddingConfig, LlmConfig};
    use crate::llm::LlmClient;

    fn build_agent() -> anyhow::Result<RetrievalAgent> {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let deps = AgentDeps {
            cache: Arc::new(IndexCache::new(
                std::env::temp_dir().join(format!("docent-session-{}", uuid::Uuid::new_v4())),
                EmbeddingConfig::default(),
            )),
            llm: Arc::new(LlmClient::new(&LlmConfig::default())?),
            websearch: None,
            top_k: 5,
        };
        Ok(RetrievalAgent::with_strategies(deps, Vec::new()))
    }

    #[test]
    fn admission_fails_when_full_of_live_sessions() {
        let registry = SessionRegistry::with_limits(2, Duration::minutes(30));
        registry.create_session().unwrap();
        registry.create_session().unwrap();
        let err = registry.create_session().unwrap_err();
        assert!(matches!(err, SessionError::LimitExceeded(2)));
        assert_eq!(registry.stats().active, 2);
    }

    #[test]
    fn admission_sweeps_expired_sessions_first() {
        // Zero idle allowance: every existing session is already expired.
        let registry = SessionRegistry::with_limits(1, Duration::zero());
        let first = registry.create_session().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = registry.create_session().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(registry.stats().active, 1);
        assert!(registry.get(&first.id).is_none());
    }

    #[test]
    fn get_returns_live_sessions_only() {
        let registry = SessionRegistry::with_limits(10, Duration::minutes(30));
        let session = registry.create_session().unwrap();
        assert!(registry.get(&session.id).is_some());
        assert!(registry.get("no-such-id").is_none());
        assert!(registry.remove(&session.id));
        assert!(registry.get(&session.id).is_none());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let registry = SessionRegistry::with_limits(10, Duration::milliseconds(50));
        let old = registry.create_session().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(80));
        let fresh = registry.create_session().unwrap();
        let removed = registry.remove_expired();
        assert_eq!(removed, 1);
        assert!(registry.get(&old.id).is_none());
        assert!(registry.get(&fresh.id).is_some());
    }

    #[test]
    fn expired_session_is_absent_on_lookup() {
        let registry = SessionRegistry::with_limits(10, Duration::milliseconds(30));
        let session = registry.create_session().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(60));
        // No sweep has run; the lookup itself must treat it as gone.
        assert!(registry.get(&session.id).is_none());
        assert_eq!(registry.stats().active, 0);
    }

    #[tokio::test]
    async fn stats_carries_per_session_detail() {
        let registry = SessionRegistry::with_limits(10, Duration::minutes(30));
        let session = registry.create_session().unwrap();

        let stats = registry.stats();
        assert_eq!(stats.active, 1);
        let record = &stats.sessions[0];
        assert_eq!(record.session_id, session.id);
        assert_eq!(record.created_at, session.created_at);
        assert_eq!(record.idle_minutes, 0);
        assert!(!record.agent_initialized);

        session.query(build_agent, "hello").await;
        let stats = registry.stats();
        assert!(stats.sessions[0].agent_initialized);
        assert!(stats.sessions[0].last_activity >= record.last_activity);
    }

    #[test]
    fn touch_defers_expiry() {
        let registry = SessionRegistry::with_limits(10, Duration::milliseconds(60));
        let session = registry.create_session().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(40));
        session.touch();
        std::thread::sleep(std::time::Duration::from_millis(40));
        // 80ms since creation but only 40ms since last activity.
        assert_eq!(registry.remove_expired(), 0);
        assert!(registry.get(&session.id).is_some());
    }

    #[tokio::test]
    async fn degraded_session_answers_with_apology() {
        let session = Session::new("s1".to_string());
        let outcome = session
            .query(|| anyhow::bail!("no api key"), "hello")
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.answer, INIT_APOLOGY);
        // Degradation sticks for the session's lifetime.
        let outcome = session
            .query(|| panic!("factory must not be called again"), "again")
            .await;
        assert_eq!(outcome.answer, INIT_APOLOGY);
    }
}
