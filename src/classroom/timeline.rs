//! Append-only session transcript.
//!
//! Events are ordered by turn; within a turn the teacher's event comes first, then
//! agent events in the order the pipeline emitted them. Nothing is ever reordered
//! or edited after it is appended.

use crate::classroom::emotion::EmotionalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Who produced a timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Teacher,
    Agent(String),
}

impl Speaker {
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Speaker::Teacher => None,
            Speaker::Agent(id) => Some(id),
        }
    }
}

/// Deltas reported by the generation capability, on its ±20 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Deltas {
    pub comprehension: f64,
    pub engagement: f64,
}

/// One line of the transcript, with the speaker's state at the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// 1-based teacher turn.
    pub turn: u32,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub emotional_state: Option<EmotionalState>,
    pub engagement: Option<f64>,
    pub comprehension: Option<f64>,
    pub deltas: Option<Deltas>,
}

impl TimelineEvent {
    pub fn teacher(turn: u32, text: impl Into<String>) -> Self {
        Self {
            turn,
            speaker: Speaker::Teacher,
            text: text.into(),
            timestamp: Utc::now(),
            emotional_state: None,
            engagement: None,
            comprehension: None,
            deltas: None,
        }
    }

    pub fn agent(
        turn: u32,
        agent_id: impl Into<String>,
        text: impl Into<String>,
        emotional_state: EmotionalState,
        engagement: f64,
        comprehension: f64,
        deltas: Deltas,
    ) -> Self {
        Self {
            turn,
            speaker: Speaker::Agent(agent_id.into()),
            text: text.into(),
            timestamp: Utc::now(),
            emotional_state: Some(emotional_state),
            engagement: Some(engagement),
            comprehension: Some(comprehension),
            deltas: Some(deltas),
        }
    }

    pub fn is_from(&self, agent_id: &str) -> bool {
        self.speaker.agent_id() == Some(agent_id)
    }
}

/// One agent reply inside a [`TurnDigest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestResponse {
    pub agent_id: String,
    pub text: String,
    pub comprehension_delta: f64,
    pub engagement_delta: f64,
}

/// A teacher utterance together with every reply it drew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDigest {
    pub turn: u32,
    pub teacher_text: String,
    pub responses: Vec<DigestResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: TimelineEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events written by one agent, in append order.
    pub fn for_agent<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a TimelineEvent> {
        self.events.iter().filter(move |e| e.is_from(agent_id))
    }

    /// Agent ids that spoke on any turn `>= first_turn`.
    pub fn speakers_since(&self, first_turn: u32) -> HashSet<&str> {
        self.events
            .iter()
            .filter(|e| e.turn >= first_turn)
            .filter_map(|e| e.speaker.agent_id())
            .collect()
    }

    /// Group the transcript by teacher turn.
    ///
    /// Agent events that precede the first teacher event are ignored.
    ///
    /// ```
    /// use classroom_sim::session::Session;
    /// # use classroom_sim::{LessonConfig, Persona};
    /// # let session = Session::new(LessonConfig::default(), &Persona::default_classroom()).unwrap();
    /// assert!(session.timeline().by_turn().is_empty());
    /// ```
    pub fn by_turn(&self) -> Vec<TurnDigest> {
        let mut digests: Vec<TurnDigest> = Vec::new();
        for event in &self.events {
            match &event.speaker {
                Speaker::Teacher => digests.push(TurnDigest {
                    turn: event.turn,
                    teacher_text: event.text.clone(),
                    responses: Vec::new(),
                }),
                Speaker::Agent(id) => {
                    if let Some(current) = digests.last_mut() {
                        let deltas = event.deltas.unwrap_or_default();
                        current.responses.push(DigestResponse {
                            agent_id: id.clone(),
                            text: event.text.clone(),
                            comprehension_delta: deltas.comprehension,
                            engagement_delta: deltas.engagement,
                        });
                    }
                }
            }
        }
        digests
    }
}
