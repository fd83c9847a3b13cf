//! In-memory session registry.
//!
//! Sessions are held as `Arc<Mutex<Session>>`: the per-session mutex serialises turns
//! within a session, while the map lock is only held long enough to look up, insert
//! or remove a handle, so different sessions never wait on each other.
//!
//! ```rust
//! use classroom_sim::store::SessionStore;
//! use classroom_sim::{LessonConfig, Persona};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = SessionStore::new();
//! let id = store
//!     .create(LessonConfig::new("Science", "Photosynthesis", "7"), &Persona::default_classroom())
//!     .await
//!     .unwrap();
//! assert_eq!(store.active_count().await, 1);
//!
//! let (session, report) = store.end(&id).await.unwrap();
//! assert!(!session.is_active());
//! assert_eq!(report.total_turns, 0);
//! assert!(store.get(&id).await.is_err());
//! # });
//! ```

use crate::classroom::persona::Persona;
use crate::classroom::session::{LessonConfig, Session, SessionError};
use crate::classroom::summary::{SessionSummarizer, SummaryReport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    summarizer: SessionSummarizer,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            summarizer: SessionSummarizer::default(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: SessionSummarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Start a session and return its id.
    pub async fn create(
        &self,
        lesson: LessonConfig,
        personas: &[Persona],
    ) -> Result<String, SessionError> {
        let session = Session::new(lesson, personas)?;
        Ok(self.insert(session).await)
    }

    /// Register an already built session, replacing any session with the same id.
    pub async fn insert(&self, session: Session) -> String {
        let id = session.id.clone();
        log::info!("session {} created with {} agents", id, session.roster().len());
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        id
    }

    pub async fn get(&self, id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Remove the session, mark it ended and summarise it.
    ///
    /// Waits for an in-flight turn to finish. Handles obtained earlier with
    /// [`get`](Self::get) stay valid but refuse further turns.
    ///
    /// Uses the store's own summarizer and emits no events; hosts driving turns through
    /// an [`Engine`](crate::classroom::engine::Engine) should end sessions with
    /// [`Engine::end_stored_session`](crate::classroom::engine::Engine::end_stored_session).
    pub async fn end(&self, id: &str) -> Result<(Session, SummaryReport), SessionError> {
        let handle = self.remove(id).await?;
        let mut session = handle.lock().await;
        session.active = false;
        let report = self.summarizer.summarize(&session);
        log::info!("session {} ended after {} turns", id, session.turn_count());
        Ok((session.clone(), report))
    }

    /// Take the session out of the registry without ending it.
    pub async fn remove(&self, id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
