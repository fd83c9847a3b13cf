//! Per-turn state updates: reply deltas for responders, passive drift for everyone else.
//!
//! This is the only place agent state changes. Scores stay in `0.0..=1.0`,
//! responders' `consecutive_turns_speaking` goes up by one and non-responders'
//! resets to zero.

use crate::classroom::emotion::EmotionalState;
use crate::classroom::pipeline::ResponseRecord;
use crate::classroom::roster::StudentAgent;
use crate::classroom::session::Session;
use crate::classroom::timeline::{Deltas, TimelineEvent};
use std::collections::HashSet;

/// Reply deltas are reported on a ±20 scale standing for ±100 points; scores are
/// normalised to 1.0.
pub const DELTA_SCALE: f64 = 100.0;

/// Engagement change for an agent that was not called on, by current emotion.
pub fn engagement_drift(emotion: EmotionalState) -> f64 {
    match emotion {
        EmotionalState::Bored | EmotionalState::Distracted => -0.03,
        EmotionalState::Anxious | EmotionalState::Frustrated => -0.02,
        EmotionalState::Confused => -0.01,
        EmotionalState::Engaged => 0.01,
        EmotionalState::Eager => -0.01,
    }
}

/// Comprehension change for an agent that was not called on, by current emotion.
pub fn comprehension_drift(emotion: EmotionalState) -> f64 {
    match emotion {
        EmotionalState::Confused => -0.02,
        EmotionalState::Bored | EmotionalState::Distracted => -0.01,
        _ => 0.0,
    }
}

/// Emotion implied by the scores, falling back to `prior` when none applies.
pub fn derive_emotion(engagement: f64, comprehension: f64, prior: EmotionalState) -> EmotionalState {
    if engagement >= 0.65 && comprehension >= 0.55 {
        EmotionalState::Engaged
    } else if comprehension < 0.35 {
        EmotionalState::Confused
    } else if engagement < 0.30 {
        EmotionalState::Bored
    } else if engagement < 0.45 {
        EmotionalState::Distracted
    } else {
        prior
    }
}

pub struct StateUpdater;

impl StateUpdater {
    /// Apply one turn's records to `session`.
    ///
    /// Records for unknown agents are ignored. An agent with several records in one
    /// turn only counts once towards `consecutive_turns_speaking`.
    pub fn apply(session: &mut Session, records: &[ResponseRecord]) {
        let turn = session.turn_count;
        let mut responded: HashSet<&str> = HashSet::new();

        for record in records {
            let Some(agent) = session.roster.get_mut(&record.agent_id) else {
                log::debug!("state update skipping unknown agent '{}'", record.agent_id);
                continue;
            };
            Self::apply_reply(agent, record, responded.insert(record.agent_id.as_str()));

            if !record.is_silent() {
                session.timeline.push(TimelineEvent::agent(
                    turn,
                    &agent.id,
                    &record.text,
                    agent.emotional_state,
                    agent.engagement,
                    agent.comprehension,
                    Deltas {
                        comprehension: record.comprehension_delta,
                        engagement: record.engagement_delta,
                    },
                ));
            }
        }

        let idle: Vec<String> = session
            .roster
            .ids()
            .iter()
            .filter(|id| !responded.contains(id.as_str()))
            .cloned()
            .collect();
        for id in idle {
            if let Some(agent) = session.roster.get_mut(&id) {
                Self::drift(agent);
            }
        }
    }

    fn apply_reply(agent: &mut StudentAgent, record: &ResponseRecord, first_this_turn: bool) {
        agent.shift_comprehension(record.comprehension_delta / DELTA_SCALE);
        agent.shift_engagement(record.engagement_delta / DELTA_SCALE);
        if let Some(emotion) = record.emotional_state {
            agent.emotional_state = emotion;
        }
        if first_this_turn {
            agent.consecutive_turns_speaking += 1;
        }
    }

    fn drift(agent: &mut StudentAgent) {
        let emotion = agent.emotional_state;
        agent.shift_engagement(engagement_drift(emotion));
        agent.shift_comprehension(comprehension_drift(emotion));
        agent.emotional_state = derive_emotion(agent.engagement, agent.comprehension, emotion);
        agent.consecutive_turns_speaking = 0;
    }
}
