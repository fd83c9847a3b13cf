//! Rule-based coaching hints for the teacher.
//!
//! Rules are checked in priority order and the first match wins:
//!
//! 1. an agent is confused
//! 2. an agent is bored or distracted with engagement below 0.35
//! 3. an agent has not spoken within the last `silence_window` teacher turns
//! 4. an agent just came back from being bored or distracted
//! 5. the whole class is above 0.65 engagement
//! 6. fallback
//!
//! Agents are scanned in roster order, so the earliest seat wins within a rule.
//! Evaluation reads the session and never changes it.

use crate::classroom::emotion::EmotionalState;
use crate::classroom::roster::StudentAgent;
use crate::classroom::session::Session;
use serde::{Deserialize, Serialize};

const LOW_ENGAGEMENT: f64 = 0.35;
const HIGH_ENGAGEMENT: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingRule {
    Confusion,
    Disengaged,
    Silent,
    Reengaged,
    ClassEngaged,
    Default,
}

/// The hint chosen for a turn and what triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingHint {
    pub rule: CoachingRule,
    /// Agent the hint is about, if any.
    pub agent_id: Option<String>,
    pub message: String,
}

impl CoachingHint {
    fn about(rule: CoachingRule, agent: &StudentAgent, message: String) -> Self {
        Self {
            rule,
            agent_id: Some(agent.id.clone()),
            message,
        }
    }

    fn general(rule: CoachingRule, message: &str) -> Self {
        Self {
            rule,
            agent_id: None,
            message: message.to_string(),
        }
    }
}

pub struct CoachingAdvisor {
    silence_window: u32,
}

impl CoachingAdvisor {
    pub fn new(silence_window: u32) -> Self {
        Self {
            silence_window: silence_window.max(1),
        }
    }

    /// The hint text for the session's current state.
    pub fn hint(&self, session: &Session) -> String {
        self.evaluate(session).message
    }

    pub fn evaluate(&self, session: &Session) -> CoachingHint {
        let roster = session.roster();

        if let Some(agent) = roster
            .iter()
            .find(|a| a.emotional_state() == EmotionalState::Confused)
        {
            return CoachingHint::about(
                CoachingRule::Confusion,
                agent,
                format!(
                    "{} looks confused. Try simpler language or a concrete example.",
                    agent.display_name
                ),
            );
        }

        if let Some(agent) = roster
            .iter()
            .find(|a| a.engagement() < LOW_ENGAGEMENT && a.emotional_state().is_disengaged())
        {
            return CoachingHint::about(
                CoachingRule::Disengaged,
                agent,
                format!(
                    "{} is drifting away. Call on them directly to pull them back in.",
                    agent.display_name
                ),
            );
        }

        let turn = session.turn_count();
        if turn > 0 {
            // early in the lesson the window is simply every turn so far
            let first = turn.saturating_sub(self.silence_window - 1).max(1);
            let recent = session.timeline().speakers_since(first);
            if let Some(agent) = roster.iter().find(|a| !recent.contains(a.id.as_str())) {
                return CoachingHint::about(
                    CoachingRule::Silent,
                    agent,
                    format!(
                        "{} hasn't spoken in a while. Invite them in with an open question.",
                        agent.display_name
                    ),
                );
            }
        }

        if let Some(agent) = roster.iter().find(|a| just_reengaged(session, a)) {
            return CoachingHint::about(
                CoachingRule::Reengaged,
                agent,
                format!(
                    "{} just re-engaged. Build on their answer while you have them.",
                    agent.display_name
                ),
            );
        }

        if roster.iter().all(|a| a.engagement() >= HIGH_ENGAGEMENT) {
            return CoachingHint::general(
                CoachingRule::ClassEngaged,
                "The whole class is with you. Keep this pacing.",
            );
        }

        CoachingHint::general(
            CoachingRule::Default,
            "Keep going, and check for understanding with a quick question.",
        )
    }
}

/// Engaged now, and bored or distracted in the agent's latest entry before this turn.
fn just_reengaged(session: &Session, agent: &StudentAgent) -> bool {
    if agent.emotional_state() != EmotionalState::Engaged || agent.engagement() <= HIGH_ENGAGEMENT {
        return false;
    }
    let current = session.turn_count();
    session
        .timeline()
        .for_agent(&agent.id)
        .filter(|e| e.turn < current)
        .last()
        .and_then(|e| e.emotional_state)
        .map_or(false, |emotion| emotion.is_disengaged())
}
