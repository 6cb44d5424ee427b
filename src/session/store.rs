//! # Session Store
//!
//! In-memory table of live interview sessions, keyed by session ID.
//!
//! ## Thread Safety:
//! - The table itself sits behind a `std::sync::RwLock`; it is locked only
//!   long enough to insert, look up, or remove an entry.
//! - Each session has its own `tokio::sync::Mutex`, so work on one session
//!   never blocks another.
//! - Nothing is persisted. Sessions vanish when they finish or their
//!   connection closes.

use crate::error::{AppError, AppResult};
use crate::session::state::SessionState;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared handle to one session's record.
pub type SharedSession = Arc<Mutex<SessionState>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a freshly initialized session.
    ///
    /// ## Returns:
    /// - **Ok(handle)**: the session is now live
    /// - **Err(BadRequest)**: a session with this ID already exists
    /// - **Err(ValidationError)**: the concurrent session limit is reached
    pub fn insert(&self, state: SessionState) -> AppResult<SharedSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if sessions.contains_key(&state.session_id) {
            return Err(AppError::BadRequest(format!(
                "Session '{}' is already initialized",
                state.session_id
            )));
        }

        if sessions.len() >= self.max_sessions {
            return Err(AppError::ValidationError(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_sessions
            )));
        }

        let session_id = state.session_id.clone();
        let handle = Arc::new(Mutex::new(state));
        sessions.insert(session_id.clone(), handle.clone());

        info!(session_id = %session_id, active = sessions.len(), "Session registered");
        Ok(handle)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Look up a session or fail with `NotFound`.
    pub fn require(&self, session_id: &str) -> AppResult<SharedSession> {
        self.get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session '{}' not found", session_id)))
    }

    /// Evict a session. Returns true when it was present.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();

        if removed {
            debug!(session_id = %session_id, "Session evicted");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Question, QuestionSet, SessionMetadata};

    fn state(id: &str) -> SessionState {
        let metadata = SessionMetadata {
            candidate_name: "Ada".to_string(),
            job_role: "Engineer".to_string(),
            job_level: "Mid".to_string(),
            question_type: "Technical".to_string(),
            custom_instruction: None,
        };
        let questions = QuestionSet::new(vec![Question::new("q1", "Why this role?")]);
        SessionState::new(id.to_string(), metadata, questions)
    }

    #[test]
    fn test_insert_and_get() {
        let store = SessionStore::new(4);
        store.insert(state("a")).unwrap();

        assert!(store.contains("a"));
        assert!(store.get("a").is_some());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_duplicate_insert_is_bad_request() {
        let store = SessionStore::new(4);
        store.insert(state("a")).unwrap();

        match store.insert(state("a")) {
            Err(AppError::BadRequest(_)) => {}
            other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
        }
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_session_limit() {
        let store = SessionStore::new(1);
        store.insert(state("a")).unwrap();
        assert!(matches!(store.insert(state("b")), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_require_missing_is_not_found() {
        let store = SessionStore::new(1);
        assert!(matches!(store.require("nope"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new(2);
        store.insert(state("a")).unwrap();
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.count(), 0);
    }
}
