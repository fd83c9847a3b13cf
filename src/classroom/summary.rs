//! End-of-session aggregation.
//!
//! Per-agent averages are taken over the agent's own timeline entries only; an agent
//! that never spoke is summarised by its live scores. Class averages are the
//! unweighted mean of the per-agent averages. Every reported number is rounded to
//! four decimal places.

use crate::classroom::emotion::EmotionalState;
use crate::classroom::session::{LessonConfig, Session};
use crate::classroom::timeline::{TimelineEvent, TurnDigest};
use serde::{Deserialize, Serialize};

/// Round to four decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub display_name: String,
    pub average_engagement: f64,
    pub average_comprehension: f64,
    pub turns_spoken: usize,
    pub final_engagement: f64,
    pub final_comprehension: f64,
    pub final_emotional_state: EmotionalState,
}

/// A single-step engagement drop between two of an agent's speaking turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    /// Turn of the later entry.
    pub turn: u32,
    pub agent_id: String,
    pub engagement_drop: f64,
    pub engagement_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub session_id: String,
    pub lesson: LessonConfig,
    pub total_turns: u32,
    /// In roster order.
    pub agents: Vec<AgentSummary>,
    pub class_average_engagement: f64,
    pub class_average_comprehension: f64,
    /// Agents with at least one timeline entry.
    pub distinct_speakers: usize,
    /// `distinct_speakers` over roster size.
    pub inclusivity: f64,
    /// Agent responses per teacher turn.
    pub participation_rate: f64,
    /// Ascending by turn.
    pub key_moments: Vec<KeyMoment>,
    pub turns: Vec<TurnDigest>,
}

impl SummaryReport {
    pub fn agent(&self, agent_id: &str) -> Option<&AgentSummary> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }
}

pub struct SessionSummarizer {
    key_moment_threshold: f64,
}

impl Default for SessionSummarizer {
    fn default() -> Self {
        Self::new(0.15)
    }
}

impl SessionSummarizer {
    pub fn new(key_moment_threshold: f64) -> Self {
        Self {
            key_moment_threshold,
        }
    }

    pub fn summarize(&self, session: &Session) -> SummaryReport {
        let mut agents = Vec::with_capacity(session.roster().len());
        let mut key_moments = Vec::new();

        for agent in session.roster().iter() {
            let mut spoken: Vec<&TimelineEvent> = session.timeline().for_agent(&agent.id).collect();
            spoken.sort_by_key(|e| e.turn);

            let engagements: Vec<f64> = spoken.iter().filter_map(|e| e.engagement).collect();
            let comprehensions: Vec<f64> = spoken.iter().filter_map(|e| e.comprehension).collect();

            agents.push(AgentSummary {
                agent_id: agent.id.clone(),
                display_name: agent.display_name.clone(),
                average_engagement: round4(mean(&engagements).unwrap_or(agent.engagement())),
                average_comprehension: round4(
                    mean(&comprehensions).unwrap_or(agent.comprehension()),
                ),
                turns_spoken: spoken.len(),
                final_engagement: round4(agent.engagement()),
                final_comprehension: round4(agent.comprehension()),
                final_emotional_state: agent.emotional_state(),
            });

            for pair in spoken.windows(2) {
                let (Some(before), Some(after)) = (pair[0].engagement, pair[1].engagement) else {
                    continue;
                };
                let drop = round4(before - after);
                if drop > self.key_moment_threshold {
                    key_moments.push(KeyMoment {
                        turn: pair[1].turn,
                        agent_id: agent.id.clone(),
                        engagement_drop: drop,
                        engagement_after: round4(after),
                    });
                }
            }
        }
        key_moments.sort_by_key(|m| m.turn);

        let distinct_speakers = agents.iter().filter(|a| a.turns_spoken > 0).count();
        let responses: usize = agents.iter().map(|a| a.turns_spoken).sum();

        let class_engagement: Vec<f64> = agents.iter().map(|a| a.average_engagement).collect();
        let class_comprehension: Vec<f64> =
            agents.iter().map(|a| a.average_comprehension).collect();

        log::info!(
            "summarised session {} ({} turns, {} key moments)",
            session.id,
            session.turn_count(),
            key_moments.len()
        );

        SummaryReport {
            session_id: session.id.clone(),
            lesson: session.lesson.clone(),
            total_turns: session.turn_count(),
            class_average_engagement: round4(mean(&class_engagement).unwrap_or(0.0)),
            class_average_comprehension: round4(mean(&class_comprehension).unwrap_or(0.0)),
            distinct_speakers,
            inclusivity: ratio(distinct_speakers, agents.len()),
            participation_rate: ratio(responses, session.turn_count() as usize),
            agents,
            key_moments,
            turns: session.timeline().by_turn(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round4(part as f64 / whole as f64)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
