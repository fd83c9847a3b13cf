//! Classroom event system.
//!
//! Provides a callback-based observability layer for the turn engine.
//! Implement [`EventHandler`] to receive real-time notifications about:
//!
//! - **Turn lifecycle**: start and completion of every teacher turn
//! - **Selection**: who was picked to respond and which selection path decided it
//! - **Degradation**: decision fallbacks, dropped generations, missing audio
//! - **Emission**: each response record as it is released, in selection order
//! - **Session lifecycle**: session end
//!
//! # Event Flow (during a typical `run_turn()` call)
//!
//! ```text
//! TurnStarted
//!   └─ (DecisionFallback)            decision backend failed or was bypassed
//!   └─ RespondersSelected
//!   └─ for each responder, in order
//!       ├─ (GenerationDropped)       responder removed from the turn
//!       ├─ (SynthesisDegraded)       responder kept without audio
//!       └─ ResponseEmitted
//! TurnCompleted
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use classroom_sim::event::{ClassroomEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_classroom_event(&self, event: &ClassroomEvent) {
//!         if let ClassroomEvent::ResponseEmitted { agent_id, .. } = event {
//!             println!("{} spoke", agent_id);
//!         }
//!     }
//! }
//! ```

use crate::classroom::selector::SelectionPath;
use async_trait::async_trait;

/// Events emitted by the engine while a session runs.
///
/// Every variant carries `session_id` so one handler can observe many sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassroomEvent {
    /// A teacher utterance was accepted and the turn counter advanced.
    TurnStarted {
        session_id: String,
        /// 1-based turn number.
        turn: u32,
        /// First ~120 characters of the teacher's input.
        input_preview: String,
    },

    /// The remote decision backend failed or was bypassed by the circuit breaker,
    /// and the local heuristic was used instead.
    DecisionFallback {
        session_id: String,
        turn: u32,
        /// Name of the backend that could not be used.
        backend: String,
        /// Failure description, or `"circuit open"` when bypassed.
        error: String,
    },

    /// The ordered responder list for this turn is final.
    RespondersSelected {
        session_id: String,
        turn: u32,
        path: SelectionPath,
        agent_ids: Vec<String>,
    },

    /// Text generation failed or timed out; the responder is removed from the turn.
    GenerationDropped {
        session_id: String,
        turn: u32,
        agent_id: String,
        error: String,
    },

    /// Synthesis failed or timed out; the response is kept without audio.
    SynthesisDegraded {
        session_id: String,
        turn: u32,
        agent_id: String,
        error: String,
    },

    /// A response record was released to the outward channel.
    ResponseEmitted {
        session_id: String,
        turn: u32,
        agent_id: String,
        /// Character length of the response text.
        text_length: usize,
        has_audio: bool,
    },

    /// State updates and coaching are done for this turn.
    TurnCompleted {
        session_id: String,
        turn: u32,
        /// Number of agents whose replies were applied (silent ones included).
        responders: usize,
        coaching_hint: String,
    },

    /// The session was closed and summarised.
    SessionEnded {
        session_id: String,
        total_turns: u32,
    },
}

/// Receives [`ClassroomEvent`]s. The default implementation ignores them, so
/// implementors only override what they need.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_classroom_event(&self, _event: &ClassroomEvent) {}
}

/// Shorten `text` to at most `max_chars` characters for log-friendly previews.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
