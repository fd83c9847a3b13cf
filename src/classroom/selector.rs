//! Responder selection: deciding who answers the teacher this turn.
//!
//! # Selection paths
//!
//! | Path | Trigger | Cap |
//! |------|---------|-----|
//! | `GroupAddress` | Input addresses the whole class ("everyone", "go around", ...) | none |
//! | `Decision` | Remote decision backend answered | `max_responders` |
//! | `Heuristic` | No remote backend, remote failed, or circuit open | `max_responders` |
//! | `DirectQuestion` | Input asks a question and nobody else was picked | 1 |
//!
//! On the normal path the backend's candidates are validated against the roster,
//! agents that spoke on each of the last two turns are dropped (unless the teacher
//! named them), agents the teacher named are moved to the front, and the list is
//! capped. When a question still draws no responder, the most engaged eligible agent
//! is forced to answer.
//!
//! The remote and local backends implement the same [`DecisionCapability`] trait;
//! a small circuit breaker decides which one is asked.

use crate::classroom::capability::{CapabilityError, Candidate, DecisionCapability};
use crate::classroom::config::EngineConfig;
use crate::classroom::roster::{AgentSnapshot, RosterSnapshot};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Phrases that address the whole class rather than one student.
pub const GROUP_ADDRESS_PHRASES: &[&str] = &[
    "everyone",
    "everybody",
    "the class",
    "whole class",
    "all of you",
    "each of you",
    "go around",
    "one by one",
    "one at a time",
];

/// How the responder list of a turn was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPath {
    GroupAddress,
    Decision,
    Heuristic,
    DirectQuestion,
}

/// Why the remote decision backend was not used.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackNotice {
    pub backend: String,
    pub error: String,
}

/// Result of [`ResponderSelector::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Responders in speaking order.
    pub agent_ids: Vec<String>,
    pub path: SelectionPath,
    /// Candidates as the backend proposed them, before validation.
    pub candidates: Vec<Candidate>,
    pub fallback: Option<FallbackNotice>,
}

/// `true` when `needle` occurs in `haystack` bounded by non-alphanumeric characters.
/// Both arguments are expected in lowercase.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[start + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Does the input address the whole class?
///
/// ```
/// use classroom_sim::selector::is_group_address;
///
/// assert!(is_group_address("Okay everyone, let's go around the room"));
/// assert!(!is_group_address("Maya, what do you think?"));
/// ```
pub fn is_group_address(teacher_input: &str) -> bool {
    let lowered = teacher_input.to_lowercase();
    GROUP_ADDRESS_PHRASES
        .iter()
        .any(|phrase| contains_phrase(&lowered, phrase))
}

/// Agents the teacher addressed by id or display name, in roster order.
pub fn named_agents(teacher_input: &str, roster: &RosterSnapshot) -> Vec<String> {
    let lowered = teacher_input.to_lowercase();
    roster
        .agents
        .iter()
        .filter(|agent| {
            contains_phrase(&lowered, &agent.id.to_lowercase())
                || contains_phrase(&lowered, &agent.display_name.to_lowercase())
        })
        .map(|agent| agent.id.clone())
        .collect()
}

/// Most engaged agent below the recency limit; ties go to the earlier roster slot.
fn most_engaged_eligible(roster: &RosterSnapshot, recency_limit: u32) -> Option<&AgentSnapshot> {
    roster
        .agents
        .iter()
        .filter(|a| a.consecutive_turns_speaking < recency_limit)
        .fold(None, |best: Option<&AgentSnapshot>, agent| match best {
            Some(current) if current.engagement >= agent.engagement => Some(current),
            _ => Some(agent),
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Local decision backend: each eligible agent volunteers with probability
/// `base_weight * engagement`, and at most `max_responders` volunteers are kept.
///
/// Volunteers are collected in roster order and reduced with the backend's own
/// seeded RNG, so two backends built with the same seed make the same choices.
pub struct HeuristicDecision {
    rng: Mutex<StdRng>,
    recency_limit: u32,
    max_responders: usize,
}

impl HeuristicDecision {
    pub fn new(seed: Option<u64>, recency_limit: u32, max_responders: usize) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            recency_limit,
            max_responders,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.seed,
            config.recency_limit,
            config.heuristic_max_responders,
        )
    }
}

#[async_trait]
impl DecisionCapability for HeuristicDecision {
    async fn decide(
        &self,
        _teacher_input: &str,
        roster: &RosterSnapshot,
    ) -> Result<Vec<Candidate>, CapabilityError> {
        let mut rng = lock(&self.rng);
        let mut volunteers: Vec<Candidate> = roster
            .agents
            .iter()
            .filter(|a| a.consecutive_turns_speaking < self.recency_limit)
            .filter(|a| rng.gen::<f64>() < a.base_weight * a.engagement)
            .map(|a| Candidate::new(a.id.clone(), "heuristic fallback"))
            .collect();
        if volunteers.len() > self.max_responders {
            volunteers.shuffle(&mut *rng);
            volunteers.truncate(self.max_responders);
        }
        Ok(volunteers)
    }

    fn backend_name(&self) -> &str {
        "heuristic"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Counts consecutive remote failures and bypasses the remote backend for a
/// cooldown once the threshold is reached.
struct CircuitBreaker {
    state: Mutex<BreakerState>,
    consecutive_failures: Mutex<u32>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed),
            consecutive_failures: Mutex::new(0),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    fn allows(&self) -> bool {
        let mut state = lock(&self.state);
        match *state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    log::info!("decision circuit half-open, probing remote backend");
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        *lock(&self.consecutive_failures) = 0;
        let mut state = lock(&self.state);
        if *state != BreakerState::Closed {
            log::info!("decision circuit closed after successful call");
            *state = BreakerState::Closed;
        }
    }

    fn record_failure(&self) {
        let failures = {
            let mut count = lock(&self.consecutive_failures);
            *count += 1;
            *count
        };
        let mut state = lock(&self.state);
        let tripped = *state == BreakerState::HalfOpen
            || (*state == BreakerState::Closed && failures >= self.threshold);
        if tripped {
            log::warn!(
                "decision circuit opened after {} consecutive failures ({} ms cooldown)",
                failures,
                self.cooldown.as_millis()
            );
            *state = BreakerState::Open {
                since: Instant::now(),
            };
        }
    }

    fn is_open(&self) -> bool {
        matches!(*lock(&self.state), BreakerState::Open { .. })
    }
}

/// Picks the ordered responder list for a turn.
///
/// # Examples
///
/// ```
/// use classroom_sim::selector::{ResponderSelector, SelectionPath};
/// use classroom_sim::{EngineConfig, LessonConfig, Persona, Session};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let session = Session::new(LessonConfig::default(), &Persona::default_classroom()).unwrap();
/// let selector = ResponderSelector::new(&EngineConfig::default().with_seed(1));
///
/// let selection = selector
///     .select("Okay everyone, let's go around the room", &session.roster_snapshot(), 1)
///     .await;
/// assert_eq!(selection.path, SelectionPath::GroupAddress);
/// assert_eq!(selection.agent_ids.len(), 5);
/// # });
/// ```
pub struct ResponderSelector {
    remote: Option<Arc<dyn DecisionCapability>>,
    heuristic: HeuristicDecision,
    breaker: CircuitBreaker,
    decision_timeout: Duration,
    max_responders: usize,
    recency_limit: u32,
    group_recency_limit: u32,
}

impl ResponderSelector {
    /// Selector that only uses the local heuristic backend.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            remote: None,
            heuristic: HeuristicDecision::from_config(config),
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_cooldown,
            ),
            decision_timeout: config.decision_timeout,
            max_responders: config.max_responders,
            recency_limit: config.recency_limit,
            group_recency_limit: config.group_recency_limit,
        }
    }

    /// Prefer `remote` while it is healthy (builder pattern).
    pub fn with_remote(mut self, remote: Arc<dyn DecisionCapability>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// `true` while the remote backend is being bypassed.
    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Ask the healthiest backend for candidates. Never fails: the heuristic is the
    /// last resort.
    async fn consult(
        &self,
        teacher_input: &str,
        roster: &RosterSnapshot,
    ) -> (Vec<Candidate>, SelectionPath, Option<FallbackNotice>) {
        let fallback = match &self.remote {
            None => None,
            Some(remote) if !self.breaker.allows() => Some(FallbackNotice {
                backend: remote.backend_name().to_string(),
                error: "circuit open".to_string(),
            }),
            Some(remote) => {
                let outcome =
                    tokio::time::timeout(self.decision_timeout, remote.decide(teacher_input, roster))
                        .await
                        .unwrap_or(Err(CapabilityError::Timeout(self.decision_timeout)));
                match outcome {
                    Ok(candidates) => {
                        self.breaker.record_success();
                        return (candidates, SelectionPath::Decision, None);
                    }
                    Err(err) => {
                        self.breaker.record_failure();
                        log::warn!(
                            "decision backend '{}' failed, using heuristic: {}",
                            remote.backend_name(),
                            err
                        );
                        Some(FallbackNotice {
                            backend: remote.backend_name().to_string(),
                            error: err.to_string(),
                        })
                    }
                }
            }
        };

        let candidates = self
            .heuristic
            .decide(teacher_input, roster)
            .await
            .unwrap_or_default();
        (candidates, SelectionPath::Heuristic, fallback)
    }

    /// Return the ordered responder ids for `turn`.
    pub async fn select(&self, teacher_input: &str, roster: &RosterSnapshot, turn: u32) -> Selection {
        if is_group_address(teacher_input) {
            let agent_ids: Vec<String> = roster
                .agents
                .iter()
                .filter(|a| a.consecutive_turns_speaking < self.group_recency_limit)
                .map(|a| a.id.clone())
                .collect();
            log::debug!("turn {}: group address, {} responders", turn, agent_ids.len());
            return Selection {
                agent_ids,
                path: SelectionPath::GroupAddress,
                candidates: Vec::new(),
                fallback: None,
            };
        }

        let named = named_agents(teacher_input, roster);
        let (candidates, mut path, fallback) = self.consult(teacher_input, roster).await;

        let mut agent_ids: Vec<String> = named.clone();
        for candidate in &candidates {
            let Some(agent) = roster.get(&candidate.agent_id) else {
                log::debug!("turn {}: discarding unknown agent '{}'", turn, candidate.agent_id);
                continue;
            };
            if agent_ids.contains(&agent.id) {
                continue;
            }
            if agent.consecutive_turns_speaking >= self.recency_limit {
                continue;
            }
            agent_ids.push(agent.id.clone());
        }
        agent_ids.truncate(self.max_responders);

        if agent_ids.is_empty() && teacher_input.contains('?') {
            if let Some(agent) = most_engaged_eligible(roster, self.recency_limit) {
                agent_ids.push(agent.id.clone());
                path = SelectionPath::DirectQuestion;
            }
        }

        log::debug!("turn {}: {:?} selected {:?}", turn, path, agent_ids);
        Selection {
            agent_ids,
            path,
            candidates,
            fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::emotion::EmotionalState;

    fn agent(id: &str, engagement: f64, consecutive: u32) -> AgentSnapshot {
        AgentSnapshot {
            id: id.to_string(),
            display_name: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
            base_weight: 1.0,
            engagement,
            comprehension: 0.5,
            emotional_state: EmotionalState::Engaged,
            consecutive_turns_speaking: consecutive,
        }
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        assert!(contains_phrase("hi maya!", "maya"));
        assert!(!contains_phrase("mayan ruins", "maya"));
        assert!(contains_phrase("ask the class.", "the class"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn names_are_detected_in_roster_order() {
        let roster = RosterSnapshot::from_agents(vec![agent("maya", 0.5, 0), agent("jake", 0.5, 0)]);
        assert_eq!(named_agents("JAKE and Maya, come here", &roster), ["maya", "jake"]);
        assert!(named_agents("nobody", &roster).is_empty());
    }

    #[test]
    fn most_engaged_prefers_earlier_slot_on_ties() {
        let roster = RosterSnapshot::from_agents(vec![
            agent("a", 0.7, 0),
            agent("b", 0.7, 0),
            agent("c", 0.9, 2),
        ]);
        assert_eq!(most_engaged_eligible(&roster, 2).unwrap().id, "a");
    }

    #[tokio::test]
    async fn heuristic_is_reproducible_and_capped() {
        let roster = RosterSnapshot::from_agents(vec![
            agent("a", 1.0, 0),
            agent("b", 1.0, 0),
            agent("c", 1.0, 0),
        ]);
        let first = HeuristicDecision::new(Some(11), 2, 1);
        let second = HeuristicDecision::new(Some(11), 2, 1);
        for _ in 0..5 {
            let x = first.decide("", &roster).await.unwrap();
            let y = second.decide("", &roster).await.unwrap();
            assert_eq!(x.len(), 1);
            assert_eq!(x, y);
        }
    }

    #[tokio::test]
    async fn heuristic_skips_recent_speakers_and_zero_weights() {
        let mut quiet = agent("quiet", 1.0, 0);
        quiet.base_weight = 0.0;
        let roster = RosterSnapshot::from_agents(vec![agent("recent", 1.0, 2), quiet]);
        let heuristic = HeuristicDecision::new(Some(3), 2, 1);
        assert!(heuristic.decide("", &roster).await.unwrap().is_empty());
    }

    #[test]
    fn breaker_opens_at_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(3600));
        breaker.record_failure();
        assert!(breaker.allows());
        breaker.record_failure();
        assert!(!breaker.allows());

        let instant = CircuitBreaker::new(1, Duration::ZERO);
        instant.record_failure();
        assert!(instant.allows());
        instant.record_success();
        assert!(!instant.is_open());
    }
}
