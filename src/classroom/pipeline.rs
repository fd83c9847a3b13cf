//! Generation pipeline: text generation overlapped with speech synthesis.
//!
//! Responders are processed strictly in selection order with a pipeline depth of one:
//!
//! ```text
//! generate(0) ─┬─ synth(0) ───────────┐
//!              └─ generate(1) ─ await synth(0), emit 0 ─┬─ synth(1) ─┐
//!                                                       └─ generate(2) ...
//! ```
//!
//! Responder `k`'s generation sees the texts of responders `0..k` through the debate
//! context, which is extended as soon as a text exists (before its audio does). At
//! most one synthesis runs in the background; it is awaited, and its record emitted,
//! right after the next responder's text has been generated. The spawned task's join
//! handle is the single-slot handoff between the two stages.
//!
//! Failure handling is local to one call:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | generation error or timeout | responder dropped, no record |
//! | synthesis error, timeout or panic | record kept, `audio = None` |
//! | empty text | record kept for state updates, never emitted |

use crate::classroom::capability::{
    AudioPayload, CapabilityError, DebateEntry, GeneratedReply, GenerationCapability,
    SynthesisCapability,
};
use crate::classroom::emotion::EmotionalState;
use crate::classroom::event::{ClassroomEvent, EventHandler};
use crate::classroom::session::Session;
use crate::classroom::timeline::Speaker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bound on the deltas a generation backend may report.
pub const MAX_DELTA: f64 = 20.0;

/// One agent's reply for the current turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub agent_id: String,
    pub display_name: String,
    pub text: String,
    /// `None` when the backend reported a label outside the known set.
    pub emotional_state: Option<EmotionalState>,
    /// In `-20.0..=20.0`.
    pub comprehension_delta: f64,
    /// In `-20.0..=20.0`.
    pub engagement_delta: f64,
    pub audio: Option<AudioPayload>,
}

impl ResponseRecord {
    /// Build a record from raw backend output, validating the emotion label and
    /// clamping both deltas.
    pub fn from_reply(
        agent_id: impl Into<String>,
        display_name: impl Into<String>,
        reply: GeneratedReply,
    ) -> Self {
        let agent_id = agent_id.into();
        let emotional_state = EmotionalState::parse_lenient(&reply.emotional_state);
        if emotional_state.is_none() {
            log::debug!(
                "ignoring unknown emotional state '{}' from {}",
                reply.emotional_state,
                agent_id
            );
        }
        Self {
            agent_id,
            display_name: display_name.into(),
            text: reply.text.trim().to_string(),
            emotional_state,
            comprehension_delta: clamp_delta(reply.comprehension_delta),
            engagement_delta: clamp_delta(reply.engagement_delta),
            audio: None,
        }
    }

    /// An agent that chose to stay quiet.
    pub fn is_silent(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn clamp_delta(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-MAX_DELTA, MAX_DELTA)
    } else {
        0.0
    }
}

type SynthesisTask = JoinHandle<Result<Option<AudioPayload>, CapabilityError>>;

/// Drives generation and synthesis for one turn's responders.
pub struct GenerationPipeline {
    generator: Arc<dyn GenerationCapability>,
    synthesizer: Arc<dyn SynthesisCapability>,
    generation_timeout: Duration,
    synthesis_timeout: Duration,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GenerationPipeline {
    pub fn new(
        generator: Arc<dyn GenerationCapability>,
        synthesizer: Arc<dyn SynthesisCapability>,
        generation_timeout: Duration,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            generation_timeout,
            synthesis_timeout,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    async fn emit_event(&self, event: ClassroomEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_classroom_event(&event).await;
        }
    }

    /// History visible to every responder before anyone has answered this turn:
    /// the transcript of earlier turns.
    fn prior_history(session: &Session) -> Vec<DebateEntry> {
        let current = session.turn_count();
        session
            .timeline()
            .events()
            .iter()
            .filter(|e| e.turn < current)
            .map(|e| DebateEntry {
                speaker: e.speaker.clone(),
                text: e.text.clone(),
            })
            .collect()
    }

    fn start_synthesis(&self, text: String, voice_id: String) -> SynthesisTask {
        let synthesizer = Arc::clone(&self.synthesizer);
        let limit = self.synthesis_timeout;
        tokio::spawn(async move {
            tokio::time::timeout(limit, synthesizer.synthesize(&text, &voice_id))
                .await
                .unwrap_or(Err(CapabilityError::Timeout(limit)))
        })
    }

    /// Await a pending synthesis, attach its audio and release the record.
    async fn finish(
        &self,
        session: &Session,
        mut record: ResponseRecord,
        task: SynthesisTask,
        outlet: Option<&mpsc::UnboundedSender<ResponseRecord>>,
    ) -> ResponseRecord {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(CapabilityError::Failed(join_err.to_string())),
        };
        match outcome {
            Ok(audio) => record.audio = audio,
            Err(err) => {
                log::warn!("synthesis degraded for {}: {}", record.agent_id, err);
                self.emit_event(ClassroomEvent::SynthesisDegraded {
                    session_id: session.id.clone(),
                    turn: session.turn_count(),
                    agent_id: record.agent_id.clone(),
                    error: err.to_string(),
                })
                .await;
            }
        }

        if let Some(tx) = outlet {
            if tx.send(record.clone()).is_err() {
                log::debug!("response receiver dropped; continuing without emission");
            }
        }
        self.emit_event(ClassroomEvent::ResponseEmitted {
            session_id: session.id.clone(),
            turn: session.turn_count(),
            agent_id: record.agent_id.clone(),
            text_length: record.text.chars().count(),
            has_audio: record.audio.is_some(),
        })
        .await;
        record
    }

    /// Produce records for `responder_ids`, in that order.
    ///
    /// The returned list also holds silent records (their deltas still apply);
    /// only records with text are sent to `outlet`. Unknown ids are skipped.
    pub async fn run(
        &self,
        responder_ids: &[String],
        teacher_input: &str,
        session: &Session,
        outlet: Option<&mpsc::UnboundedSender<ResponseRecord>>,
    ) -> Vec<ResponseRecord> {
        let roster = session.roster();
        let mut debate = Self::prior_history(session);
        let mut records: Vec<ResponseRecord> = Vec::with_capacity(responder_ids.len());
        let mut pending: Option<(ResponseRecord, SynthesisTask)> = None;

        for agent_id in responder_ids {
            let Some(agent) = roster.get(agent_id) else {
                log::debug!("pipeline skipping unknown agent '{}'", agent_id);
                continue;
            };
            let snapshot = agent.snapshot();

            let generated = tokio::time::timeout(
                self.generation_timeout,
                self.generator
                    .generate(&snapshot, teacher_input, &debate, &session.lesson),
            )
            .await
            .unwrap_or(Err(CapabilityError::Timeout(self.generation_timeout)));

            let reply = match generated {
                Ok(reply) => reply,
                Err(err) => {
                    log::warn!("dropping responder {}: {}", agent_id, err);
                    self.emit_event(ClassroomEvent::GenerationDropped {
                        session_id: session.id.clone(),
                        turn: session.turn_count(),
                        agent_id: agent_id.clone(),
                        error: err.to_string(),
                    })
                    .await;
                    continue;
                }
            };

            let record = ResponseRecord::from_reply(&agent.id, &agent.display_name, reply);
            if !record.is_silent() {
                debate.push(DebateEntry {
                    speaker: Speaker::Agent(record.agent_id.clone()),
                    text: record.text.clone(),
                });
            }

            if let Some((previous, task)) = pending.take() {
                records.push(self.finish(session, previous, task, outlet).await);
            }

            if record.is_silent() {
                log::debug!("{} stayed silent", record.agent_id);
                records.push(record);
            } else {
                let task = self.start_synthesis(record.text.clone(), agent.voice_id.clone());
                pending = Some((record, task));
            }
        }

        if let Some((previous, task)) = pending.take() {
            records.push(self.finish(session, previous, task, outlet).await);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_clamps_and_validates() {
        let record = ResponseRecord::from_reply(
            "jake",
            "Jake",
            GeneratedReply {
                text: "  sure  ".into(),
                emotional_state: "sleepy".into(),
                comprehension_delta: 45.0,
                engagement_delta: f64::NAN,
            },
        );
        assert_eq!(record.text, "sure");
        assert_eq!(record.emotional_state, None);
        assert_eq!(record.comprehension_delta, 20.0);
        assert_eq!(record.engagement_delta, 0.0);
        assert!(!record.is_silent());
    }

    #[test]
    fn whitespace_only_text_is_silent() {
        let record = ResponseRecord::from_reply(
            "priya",
            "Priya",
            GeneratedReply {
                text: " \n ".into(),
                emotional_state: "Anxious".into(),
                comprehension_delta: -3.0,
                engagement_delta: -25.0,
            },
        );
        assert!(record.is_silent());
        assert_eq!(record.emotional_state, Some(EmotionalState::Anxious));
        assert_eq!(record.engagement_delta, -20.0);
    }
}
