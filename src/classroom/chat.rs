//! Chat-model adapters for the decision and generation capabilities.
//!
//! Any hosted language model can drive the classroom once it implements
//! [`ChatClient`]: a single request/response call over role-tagged messages. The two
//! adapters build the prompts, ask for a JSON object and parse it with `serde_json`.
//!
//! ```text
//! ChatDecision   ── roster summary ──► ChatClient ──► {"responders": [...]}
//! ChatGeneration ── agent + history ─► ChatClient ──► {"text": ..., "emotional_state": ...}
//! ```
//!
//! Transport errors become [`CapabilityError::Failed`]; replies that are not the
//! expected JSON become [`CapabilityError::Malformed`]. Both are absorbed by the
//! selector and pipeline like any other capability failure.

use crate::classroom::capability::{
    CapabilityError, Candidate, DebateEntry, DecisionCapability, GeneratedReply,
    GenerationCapability,
};
use crate::classroom::emotion::EmotionalState;
use crate::classroom::pipeline::MAX_DELTA;
use crate::classroom::roster::{AgentSnapshot, RosterSnapshot};
use crate::classroom::session::LessonConfig;
use crate::classroom::timeline::Speaker;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

/// Number of most recent history entries shown to a responder.
pub const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Minimal request/response seam to a chat model. The reply is the raw assistant text.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(&self, messages: Vec<ChatMessage>) -> Result<String, Box<dyn Error + Send + Sync>>;

    fn model_name(&self) -> &str {
        "chat"
    }
}

/// Slice out the outermost JSON object, tolerating code fences or chatter around it.
fn json_object(raw: &str) -> Result<&str, CapabilityError> {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&raw[start..=end]),
        _ => Err(CapabilityError::Malformed(format!(
            "no JSON object in reply: {}",
            crate::classroom::event::preview(raw, 80)
        ))),
    }
}

const DECISION_SYSTEM_PROMPT: &str = "You orchestrate a simulated classroom. \
Each turn you decide which students react to what the teacher just said.

Rules:
1. Pick 0, 1 or 2 students. Nobody answering is realistic and allowed.
2. Use each student's base weight, engagement, comprehension and emotional_state.
3. Skip students with consecutive_turns_speaking >= 2 unless the teacher named them.
4. Confused or anxious students tend to answer with questions.
5. Bored or distracted students rarely speak up unprompted.

Answer with JSON only, in exactly this shape:
{\"responders\": [{\"student_id\": \"<id>\", \"reason\": \"<short reason>\"}]}";

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    #[serde(default)]
    responders: Vec<DecisionEntry>,
}

#[derive(Debug, Deserialize)]
struct DecisionEntry {
    student_id: String,
    #[serde(default)]
    reason: String,
}

/// Decision capability backed by a chat model.
pub struct ChatDecision {
    client: Arc<dyn ChatClient>,
}

impl ChatDecision {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    fn roster_summary(roster: &RosterSnapshot) -> serde_json::Value {
        let students: serde_json::Map<String, serde_json::Value> = roster
            .agents
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    json!({
                        "name": a.display_name,
                        "base_weight": a.base_weight,
                        "engagement": (a.engagement * 1000.0).round() / 1000.0,
                        "comprehension": (a.comprehension * 1000.0).round() / 1000.0,
                        "emotional_state": a.emotional_state,
                        "consecutive_turns_speaking": a.consecutive_turns_speaking,
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(students)
    }

    pub fn build_messages(teacher_input: &str, roster: &RosterSnapshot) -> Vec<ChatMessage> {
        let summary = serde_json::to_string_pretty(&Self::roster_summary(roster))
            .unwrap_or_else(|_| "{}".to_string());
        vec![
            ChatMessage::system(DECISION_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Teacher said: \"{}\"\n\nCurrent student states:\n{}\n\n\
                 Pick 0-2 students to respond this turn.",
                teacher_input, summary
            )),
        ]
    }

    pub fn parse(raw: &str) -> Result<Vec<Candidate>, CapabilityError> {
        let payload: DecisionPayload = serde_json::from_str(json_object(raw)?)
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        Ok(payload
            .responders
            .into_iter()
            .map(|r| Candidate::new(r.student_id, r.reason))
            .collect())
    }
}

#[async_trait]
impl DecisionCapability for ChatDecision {
    async fn decide(
        &self,
        teacher_input: &str,
        roster: &RosterSnapshot,
    ) -> Result<Vec<Candidate>, CapabilityError> {
        let reply = self
            .client
            .send(Self::build_messages(teacher_input, roster))
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        Self::parse(&reply)
    }

    fn backend_name(&self) -> &str {
        self.client.model_name()
    }
}

/// Generation capability backed by a chat model.
///
/// Persona prompts are supplied by the host with [`ChatGeneration::with_persona_prompt`];
/// agents without one get a short generic prompt built from their display name.
pub struct ChatGeneration {
    client: Arc<dyn ChatClient>,
    persona_prompts: HashMap<String, String>,
}

impl ChatGeneration {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            persona_prompts: HashMap::new(),
        }
    }

    pub fn with_persona_prompt(mut self, agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.persona_prompts.insert(agent_id.into(), prompt.into());
        self
    }

    fn system_prompt(&self, agent: &AgentSnapshot) -> String {
        self.persona_prompts.get(&agent.id).cloned().unwrap_or_else(|| {
            format!(
                "You are {}, a student in a classroom. Stay in character and answer briefly.",
                agent.display_name
            )
        })
    }

    pub fn build_messages(
        &self,
        agent: &AgentSnapshot,
        teacher_input: &str,
        debate_history: &[DebateEntry],
        lesson: &LessonConfig,
    ) -> Vec<ChatMessage> {
        let start = debate_history.len().saturating_sub(HISTORY_WINDOW);
        let history: String = debate_history[start..]
            .iter()
            .map(|entry| {
                let speaker = match &entry.speaker {
                    Speaker::Teacher => "Teacher",
                    Speaker::Agent(id) => id.as_str(),
                };
                format!("  {}: {}\n", speaker, entry.text)
            })
            .collect();
        let history = if history.is_empty() {
            "  (start of lesson)\n".to_string()
        } else {
            history
        };

        let states: Vec<&str> = EmotionalState::ALL.iter().map(|s| s.as_str()).collect();
        let context = format!(
            "Lesson: {} / {} (grade {})\n\
             Your state: engagement {:.2}, comprehension {:.2}, feeling {}\n\
             Recent conversation:\n{}\n\
             Teacher says: \"{}\"\n\n\
             Reply with JSON only:\n\
             {{\"text\": \"<what you say, or empty to stay silent>\", \
             \"emotional_state\": \"<one of {}>\", \
             \"comprehension_delta\": <-20..20>, \"engagement_delta\": <-20..20>}}",
            lesson.subject,
            lesson.topic,
            lesson.grade_level,
            agent.engagement,
            agent.comprehension,
            agent.emotional_state,
            history,
            teacher_input,
            states.join(", ")
        );

        vec![
            ChatMessage::system(self.system_prompt(agent)),
            ChatMessage::user(context),
        ]
    }

    pub fn parse(raw: &str) -> Result<GeneratedReply, CapabilityError> {
        let mut reply: GeneratedReply = serde_json::from_str(json_object(raw)?)
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        reply.comprehension_delta = reply.comprehension_delta.clamp(-MAX_DELTA, MAX_DELTA);
        reply.engagement_delta = reply.engagement_delta.clamp(-MAX_DELTA, MAX_DELTA);
        Ok(reply)
    }
}

#[async_trait]
impl GenerationCapability for ChatGeneration {
    async fn generate(
        &self,
        agent: &AgentSnapshot,
        teacher_input: &str,
        debate_history: &[DebateEntry],
        lesson: &LessonConfig,
    ) -> Result<GeneratedReply, CapabilityError> {
        let messages = self.build_messages(agent, teacher_input, debate_history, lesson);
        let reply = self
            .client
            .send(messages)
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        Self::parse(&reply)
    }
}
