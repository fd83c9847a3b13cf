//! Per-student mutable state and the ordered roster that owns it.
//!
//! The roster keeps agents keyed by id together with their insertion order: lookups
//! are by key, iteration is always in seating order. Keys are fixed once the roster
//! is built.
//!
//! Outside the crate the roster is read-only; numeric state only changes through
//! [`StateUpdater`](crate::classroom::updater::StateUpdater).

use crate::classroom::emotion::EmotionalState;
use crate::classroom::persona::Persona;
use crate::classroom::session::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Clamp a normalised score into `0.0..=1.0`.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// One simulated student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAgent {
    pub id: String,
    pub display_name: String,
    pub voice_id: String,
    pub base_weight: f64,
    pub(crate) engagement: f64,
    pub(crate) comprehension: f64,
    pub(crate) emotional_state: EmotionalState,
    pub(crate) consecutive_turns_speaking: u32,
}

impl StudentAgent {
    /// Build an agent at its persona-defined starting point.
    pub fn from_persona(persona: &Persona) -> Self {
        Self {
            id: persona.id.clone(),
            display_name: persona.display_name.clone(),
            voice_id: persona.voice_id.clone(),
            base_weight: persona.base_weight,
            engagement: clamp_unit(persona.initial_engagement),
            comprehension: clamp_unit(persona.initial_comprehension),
            emotional_state: persona.initial_emotion,
            consecutive_turns_speaking: 0,
        }
    }

    pub fn engagement(&self) -> f64 {
        self.engagement
    }

    pub fn comprehension(&self) -> f64 {
        self.comprehension
    }

    pub fn emotional_state(&self) -> EmotionalState {
        self.emotional_state
    }

    /// Number of consecutive turns, up to and including the last one, this agent spoke.
    pub fn consecutive_turns_speaking(&self) -> u32 {
        self.consecutive_turns_speaking
    }

    /// Add `delta` to engagement, clamped to `0.0..=1.0`.
    pub(crate) fn shift_engagement(&mut self, delta: f64) {
        self.engagement = clamp_unit(self.engagement + delta);
    }

    /// Add `delta` to comprehension, clamped to `0.0..=1.0`.
    pub(crate) fn shift_comprehension(&mut self, delta: f64) {
        self.comprehension = clamp_unit(self.comprehension + delta);
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            base_weight: self.base_weight,
            engagement: self.engagement,
            comprehension: self.comprehension,
            emotional_state: self.emotional_state,
            consecutive_turns_speaking: self.consecutive_turns_speaking,
        }
    }
}

/// Public, read-only projection of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub display_name: String,
    pub base_weight: f64,
    pub engagement: f64,
    pub comprehension: f64,
    pub emotional_state: EmotionalState,
    pub consecutive_turns_speaking: u32,
}

/// Read-only projection of the whole class, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub agents: Vec<AgentSnapshot>,
    /// Mean engagement across the class ("classroom temperature").
    pub class_engagement: f64,
}

impl RosterSnapshot {
    /// Wrap agent snapshots (already in roster order) and compute the class mean.
    pub fn from_agents(agents: Vec<AgentSnapshot>) -> Self {
        let class_engagement = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.engagement).sum::<f64>() / agents.len() as f64
        };
        Self {
            agents,
            class_engagement,
        }
    }

    pub fn get(&self, id: &str) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Agents keyed by id, iterated in seating order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    agents: HashMap<String, StudentAgent>,
    order: Vec<String>,
}

impl Roster {
    /// Build a roster from personas, keeping their order.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyRoster`] for an empty slice and
    /// [`SessionError::DuplicateAgent`] when two personas share an id.
    pub fn from_personas(personas: &[Persona]) -> Result<Self, SessionError> {
        if personas.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        let mut roster = Roster::default();
        for persona in personas {
            if roster.agents.contains_key(&persona.id) {
                return Err(SessionError::DuplicateAgent(persona.id.clone()));
            }
            roster.order.push(persona.id.clone());
            roster
                .agents
                .insert(persona.id.clone(), StudentAgent::from_persona(persona));
        }
        Ok(roster)
    }

    pub fn get(&self, id: &str) -> Option<&StudentAgent> {
        self.agents.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut StudentAgent> {
        self.agents.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Agent ids in roster order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Agents in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &StudentAgent> {
        self.order.iter().filter_map(move |id| self.agents.get(id))
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot::from_agents(self.iter().map(StudentAgent::snapshot).collect())
    }

    #[cfg(test)]
    pub(crate) fn set_state(
        &mut self,
        id: &str,
        engagement: f64,
        comprehension: f64,
        emotion: EmotionalState,
        consecutive: u32,
    ) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.engagement = engagement;
            agent.comprehension = comprehension;
            agent.emotional_state = emotion;
            agent.consecutive_turns_speaking = consecutive;
        }
    }
}
