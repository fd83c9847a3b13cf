//! # classroom-sim
//!
//! A turn engine for simulated classrooms. A teacher speaks, a few synthetic students
//! answer, every student's engagement, comprehension and mood moves a little, and the
//! teacher gets a coaching hint back.
//!
//! The crate decides *who* speaks and *when*; it never writes the students' lines
//! itself. Language and audio come from three capability traits the host implements:
//!
//! * [`capability::DecisionCapability`]: which students want to answer
//! * [`capability::GenerationCapability`]: what a student says
//! * [`capability::SynthesisCapability`]: what it sounds like
//!
//! [`chat::ChatDecision`] and [`chat::ChatGeneration`] implement the first two on top of
//! any chat model exposed through [`chat::ChatClient`]; [`http_chat::OpenAiChatClient`]
//! speaks to OpenAI-compatible endpoints.
//!
//! ## Core Concepts
//!
//! ### Sessions and the store
//!
//! A [`Session`] owns the lesson, the [`roster::Roster`] of students and the append-only
//! [`timeline::Timeline`]. [`store::SessionStore`] keeps live sessions by id and
//! summarises them when they end.
//!
//! ### The engine
//!
//! [`Engine::run_turn`] runs one teacher utterance end to end:
//!
//! 1. [`selector::ResponderSelector`] picks an ordered list of responders
//!    (group address, named students, recency penalty, direct-question guarantee,
//!    heuristic fallback behind a circuit breaker)
//! 2. [`pipeline::GenerationPipeline`] generates their replies, overlapping each
//!    student's speech synthesis with the next student's text generation
//! 3. [`updater::StateUpdater`] applies reply deltas and passive drift
//! 4. [`advisor::CoachingAdvisor`] picks one hint
//!
//! [`Engine::end_session`] closes a session and returns a [`summary::SummaryReport`].
//!
//! ### Observability
//!
//! Diagnostics go through the [`log`] facade; call [`init_logger`] to route them to
//! `env_logger`. Structured [`event::ClassroomEvent`]s are delivered to an
//! [`event::EventHandler`] registered with [`Engine::with_event_handler`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use classroom_sim::chat::{ChatClient, ChatDecision, ChatGeneration, ChatMessage};
//! use classroom_sim::{Engine, EngineConfig, LessonConfig, Persona, Session};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct MyModel;
//!
//! #[async_trait]
//! impl ChatClient for MyModel {
//!     async fn send(
//!         &self,
//!         _messages: Vec<ChatMessage>,
//!     ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
//!         Ok(r#"{"responders": []}"#.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     classroom_sim::init_logger();
//!
//!     let model: Arc<dyn ChatClient> = Arc::new(MyModel);
//!     let engine = Engine::new(
//!         EngineConfig::default(),
//!         Arc::new(ChatGeneration::new(Arc::clone(&model))),
//!     )
//!     .with_decision(Arc::new(ChatDecision::new(model)));
//!
//!     let mut session = Session::new(
//!         LessonConfig::new("Math", "Fractions", "6"),
//!         &Persona::default_classroom(),
//!     )?;
//!
//!     let outcome = engine.run_turn(&mut session, "Who can tell me what 1/2 + 1/4 is?").await?;
//!     println!("{}", outcome.coaching_hint);
//!
//!     let report = engine.end_session(&mut session).await;
//!     println!("class engagement {:.2}", report.class_average_engagement);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding the engine can opt in to `RUST_LOG` driven diagnostics
/// without committing to a logging backend.
///
/// ```rust
/// classroom_sim::init_logger();
/// classroom_sim::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod classroom;

// Re-exporting key items for easier external access.
pub use classroom::advisor;
pub use classroom::capability;
pub use classroom::chaos;
pub use classroom::chat;
pub use classroom::config;
pub use classroom::emotion;
pub use classroom::engine;
pub use classroom::event;
pub use classroom::http_chat;
pub use classroom::persona;
pub use classroom::pipeline;
pub use classroom::roster;
pub use classroom::selector;
pub use classroom::session;
pub use classroom::store;
pub use classroom::summary;
pub use classroom::timeline;
pub use classroom::updater;

pub use classroom::chaos::ChaosEvent;
pub use classroom::config::EngineConfig;
pub use classroom::emotion::{EmotionParseError, EmotionalState};
pub use classroom::engine::{Engine, TurnOutcome};
pub use classroom::persona::Persona;
pub use classroom::pipeline::ResponseRecord;
pub use classroom::session::{LessonConfig, Session, SessionError};
pub use classroom::summary::SummaryReport;
