//! Capability interfaces consumed by the engine.
//!
//! The engine never produces language or audio itself. It talks to three opaque
//! services through the traits below:
//!
//! ```text
//! ResponderSelector  ──► DecisionCapability    (who should speak)
//! GenerationPipeline ──► GenerationCapability  (what they say)
//!                    └─► SynthesisCapability   (how it sounds)
//! ```
//!
//! Every call may fail or hang; callers bound them with timeouts and degrade
//! instead of propagating. Implement the traits for a hosted model, a local
//! heuristic, or a test double.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use classroom_sim::capability::{AudioPayload, CapabilityError, SynthesisCapability};
//!
//! struct Silent;
//!
//! #[async_trait]
//! impl SynthesisCapability for Silent {
//!     async fn synthesize(
//!         &self,
//!         _text: &str,
//!         _voice_id: &str,
//!     ) -> Result<Option<AudioPayload>, CapabilityError> {
//!         Ok(None)
//!     }
//! }
//! ```

use crate::classroom::roster::{AgentSnapshot, RosterSnapshot};
use crate::classroom::session::LessonConfig;
use crate::classroom::timeline::Speaker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Failure of an external capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityError {
    /// The service is not configured or refused the connection.
    Unavailable(String),
    /// The call did not finish within its deadline.
    Timeout(Duration),
    /// The service answered with an error.
    Failed(String),
    /// The service answered, but the payload could not be understood.
    Malformed(String),
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityError::Unavailable(msg) => write!(f, "Capability unavailable: {}", msg),
            CapabilityError::Timeout(after) => {
                write!(f, "Capability timed out after {} ms", after.as_millis())
            }
            CapabilityError::Failed(msg) => write!(f, "Capability failed: {}", msg),
            CapabilityError::Malformed(msg) => write!(f, "Malformed capability output: {}", msg),
        }
    }
}

impl Error for CapabilityError {}

/// One agent proposed by a decision backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub agent_id: String,
    pub reason: String,
}

impl Candidate {
    pub fn new(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

/// Something said earlier that a responder can react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Raw output of a generation call.
///
/// `emotional_state` is kept as the label the service produced; it is validated
/// when the response record is built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub emotional_state: String,
    #[serde(default)]
    pub comprehension_delta: f64,
    #[serde(default)]
    pub engagement_delta: f64,
}

/// Synthesised speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Container/codec label, e.g. `"audio/mpeg"`.
    pub format: String,
    pub bytes: Vec<u8>,
}

/// Decides which agents want to answer the teacher.
#[async_trait]
pub trait DecisionCapability: Send + Sync {
    /// Return candidate agents in order of preference. Unknown ids are tolerated;
    /// the selector discards them.
    async fn decide(
        &self,
        teacher_input: &str,
        roster: &RosterSnapshot,
    ) -> Result<Vec<Candidate>, CapabilityError>;

    /// Short label used in logs and events.
    fn backend_name(&self) -> &str {
        "decision"
    }
}

/// Produces one agent's reply.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        agent: &AgentSnapshot,
        teacher_input: &str,
        debate_history: &[DebateEntry],
        lesson: &LessonConfig,
    ) -> Result<GeneratedReply, CapabilityError>;
}

/// Turns reply text into audio. `Ok(None)` means "no audio available".
#[async_trait]
pub trait SynthesisCapability: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<Option<AudioPayload>, CapabilityError>;
}

/// Synthesis backend for text-only deployments.
pub struct NoSynthesis;

#[async_trait]
impl SynthesisCapability for NoSynthesis {
    async fn synthesize(
        &self,
        _text: &str,
        _voice_id: &str,
    ) -> Result<Option<AudioPayload>, CapabilityError> {
        Ok(None)
    }
}
