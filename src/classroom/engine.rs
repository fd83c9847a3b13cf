//! The turn engine: selection, generation, state updates and coaching for one
//! teacher utterance.
//!
//! # Per-turn flow
//!
//! ```text
//! teacher input
//!   │  turn_count += 1, teacher line appended to the timeline
//!   ▼
//! ResponderSelector ──► ordered agent ids
//!   ▼
//! GenerationPipeline ──► ordered response records (emitted as they finish)
//!   ▼
//! StateUpdater ──► roster mutated, agent lines appended
//!   ▼
//! CoachingAdvisor ──► hint
//! ```
//!
//! Nothing inside a turn is fatal: capability failures degrade the turn (fewer
//! responders, no audio, heuristic selection) but the turn always completes. The
//! only error [`Engine::run_turn`] returns is for a session that has already ended.
//!
//! The engine holds no per-session state, so one `Engine` can serve many sessions
//! concurrently. Turns within a session must be serialised by the caller; the
//! `&mut Session` receiver (or the store's per-session mutex) enforces that.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use classroom_sim::capability::{
//!     CapabilityError, DebateEntry, GeneratedReply, GenerationCapability,
//! };
//! use classroom_sim::roster::AgentSnapshot;
//! use classroom_sim::{Engine, EngineConfig, LessonConfig, Persona, Session};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl GenerationCapability for Echo {
//!     async fn generate(
//!         &self,
//!         agent: &AgentSnapshot,
//!         _input: &str,
//!         _history: &[DebateEntry],
//!         _lesson: &LessonConfig,
//!     ) -> Result<GeneratedReply, CapabilityError> {
//!         Ok(GeneratedReply {
//!             text: format!("{} here", agent.display_name),
//!             emotional_state: "engaged".into(),
//!             comprehension_delta: 2.0,
//!             engagement_delta: 3.0,
//!         })
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = Engine::new(EngineConfig::default().with_seed(3), Arc::new(Echo));
//! let mut session = Session::new(LessonConfig::default(), &Persona::default_classroom()).unwrap();
//!
//! let outcome = engine.run_turn(&mut session, "Good morning everyone!").await.unwrap();
//! assert_eq!(outcome.emitted_responses.len(), 5);
//! assert_eq!(session.turn_count(), 1);
//! # });
//! ```

use crate::classroom::advisor::CoachingAdvisor;
use crate::classroom::capability::{
    DecisionCapability, GenerationCapability, NoSynthesis, SynthesisCapability,
};
use crate::classroom::chaos::ChaosEvent;
use crate::classroom::config::EngineConfig;
use crate::classroom::event::{preview, ClassroomEvent, EventHandler};
use crate::classroom::pipeline::{GenerationPipeline, ResponseRecord};
use crate::classroom::roster::RosterSnapshot;
use crate::classroom::selector::{ResponderSelector, SelectionPath};
use crate::classroom::session::{Session, SessionError};
use crate::classroom::store::SessionStore;
use crate::classroom::summary::{SessionSummarizer, SummaryReport};
use crate::classroom::timeline::TimelineEvent;
use crate::classroom::updater::StateUpdater;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn: u32,
    pub path: SelectionPath,
    /// Records with text, in selection order.
    pub emitted_responses: Vec<ResponseRecord>,
    /// Every agent whose reply was applied this turn, silent ones included.
    pub responders: Vec<String>,
    pub roster: RosterSnapshot,
    pub coaching_hint: String,
}

pub struct Engine {
    config: EngineConfig,
    selector: ResponderSelector,
    pipeline: GenerationPipeline,
    generator: Arc<dyn GenerationCapability>,
    synthesizer: Arc<dyn SynthesisCapability>,
    advisor: CoachingAdvisor,
    summarizer: SessionSummarizer,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Engine {
    /// Text-only engine with heuristic selection.
    pub fn new(config: EngineConfig, generator: Arc<dyn GenerationCapability>) -> Self {
        let synthesizer: Arc<dyn SynthesisCapability> = Arc::new(NoSynthesis);
        Self {
            selector: ResponderSelector::new(&config),
            pipeline: GenerationPipeline::new(
                Arc::clone(&generator),
                Arc::clone(&synthesizer),
                config.generation_timeout,
                config.synthesis_timeout,
            ),
            generator,
            synthesizer,
            advisor: CoachingAdvisor::new(config.silence_window),
            summarizer: SessionSummarizer::new(config.key_moment_threshold),
            event_handler: None,
            config,
        }
    }

    /// Prefer a remote decision backend; the heuristic remains the fallback.
    pub fn with_decision(mut self, decision: Arc<dyn DecisionCapability>) -> Self {
        self.selector = ResponderSelector::new(&self.config).with_remote(decision);
        self
    }

    pub fn with_synthesis(mut self, synthesizer: Arc<dyn SynthesisCapability>) -> Self {
        self.synthesizer = synthesizer;
        self.rebuild_pipeline();
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self.rebuild_pipeline();
        self
    }

    fn rebuild_pipeline(&mut self) {
        let mut pipeline = GenerationPipeline::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.synthesizer),
            self.config.generation_timeout,
            self.config.synthesis_timeout,
        );
        if let Some(handler) = &self.event_handler {
            pipeline = pipeline.with_event_handler(Arc::clone(handler));
        }
        self.pipeline = pipeline;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `true` while the remote decision backend is being bypassed.
    pub fn is_decision_circuit_open(&self) -> bool {
        self.selector.is_circuit_open()
    }

    async fn emit(&self, event: ClassroomEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_classroom_event(&event).await;
        }
    }

    /// Run one teacher turn.
    ///
    /// # Errors
    ///
    /// [`SessionError::Ended`] if the session no longer accepts turns.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        teacher_input: &str,
    ) -> Result<TurnOutcome, SessionError> {
        self.drive_turn(session, teacher_input, None).await
    }

    /// Like [`run_turn`](Self::run_turn), but also sends each record with text to
    /// `outlet` as soon as its audio step resolves.
    pub async fn run_turn_streaming(
        &self,
        session: &mut Session,
        teacher_input: &str,
        outlet: &mpsc::UnboundedSender<ResponseRecord>,
    ) -> Result<TurnOutcome, SessionError> {
        self.drive_turn(session, teacher_input, Some(outlet)).await
    }

    /// Run a turn whose input is a classroom disruption instead of the teacher.
    pub async fn inject_chaos(
        &self,
        session: &mut Session,
        event: &ChaosEvent,
    ) -> Result<TurnOutcome, SessionError> {
        log::info!("session {}: injecting chaos event '{}'", session.id, event.id);
        self.drive_turn(session, event.prompt, None).await
    }

    /// Look up a stored session and run a turn on it, holding its lock for the turn.
    pub async fn run_stored_turn(
        &self,
        store: &SessionStore,
        session_id: &str,
        teacher_input: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let handle = store.get(session_id).await?;
        let mut session = handle.lock().await;
        self.run_turn(&mut session, teacher_input).await
    }

    async fn drive_turn(
        &self,
        session: &mut Session,
        teacher_input: &str,
        outlet: Option<&mpsc::UnboundedSender<ResponseRecord>>,
    ) -> Result<TurnOutcome, SessionError> {
        if !session.is_active() {
            return Err(SessionError::Ended(session.id.clone()));
        }

        session.turn_count += 1;
        let turn = session.turn_count;
        log::info!("session {}: turn {} started", session.id, turn);
        self.emit(ClassroomEvent::TurnStarted {
            session_id: session.id.clone(),
            turn,
            input_preview: preview(teacher_input, 120),
        })
        .await;
        session.timeline.push(TimelineEvent::teacher(turn, teacher_input));

        let snapshot = session.roster_snapshot();
        let selection = self.selector.select(teacher_input, &snapshot, turn).await;
        if let Some(notice) = &selection.fallback {
            self.emit(ClassroomEvent::DecisionFallback {
                session_id: session.id.clone(),
                turn,
                backend: notice.backend.clone(),
                error: notice.error.clone(),
            })
            .await;
        }
        log::info!(
            "session {}: turn {} responders {:?} via {:?}",
            session.id,
            turn,
            selection.agent_ids,
            selection.path
        );
        self.emit(ClassroomEvent::RespondersSelected {
            session_id: session.id.clone(),
            turn,
            path: selection.path,
            agent_ids: selection.agent_ids.clone(),
        })
        .await;

        let records = self
            .pipeline
            .run(&selection.agent_ids, teacher_input, session, outlet)
            .await;
        StateUpdater::apply(session, &records);
        let coaching_hint = self.advisor.hint(session);

        self.emit(ClassroomEvent::TurnCompleted {
            session_id: session.id.clone(),
            turn,
            responders: records.len(),
            coaching_hint: coaching_hint.clone(),
        })
        .await;
        log::info!(
            "session {}: turn {} completed with {} responses",
            session.id,
            turn,
            records.len()
        );

        Ok(TurnOutcome {
            turn,
            path: selection.path,
            responders: records.iter().map(|r| r.agent_id.clone()).collect(),
            emitted_responses: records.into_iter().filter(|r| !r.is_silent()).collect(),
            roster: session.roster_snapshot(),
            coaching_hint,
        })
    }

    /// Close the session and summarise it. Ending twice returns the same report.
    pub async fn end_session(&self, session: &mut Session) -> SummaryReport {
        if session.active {
            session.active = false;
            self.emit(ClassroomEvent::SessionEnded {
                session_id: session.id.clone(),
                total_turns: session.turn_count,
            })
            .await;
        }
        self.summarizer.summarize(session)
    }

    /// Remove a stored session and end it through [`end_session`](Self::end_session),
    /// so the report uses this engine's threshold and `SessionEnded` is emitted.
    ///
    /// Waits for an in-flight turn on the session to finish.
    pub async fn end_stored_session(
        &self,
        store: &SessionStore,
        session_id: &str,
    ) -> Result<(Session, SummaryReport), SessionError> {
        let handle = store.remove(session_id).await?;
        let mut session = handle.lock().await;
        let report = self.end_session(&mut session).await;
        log::info!(
            "session {} ended after {} turns",
            session_id,
            session.turn_count()
        );
        Ok((session.clone(), report))
    }

    pub fn roster_snapshot(&self, session: &Session) -> RosterSnapshot {
        session.roster_snapshot()
    }
}
