//! Engine configuration.
//!
//! [`EngineConfig`] is a plain struct: construct it with [`Default`] and adjust
//! it with the `with_*` builders. No configuration files are read by the crate;
//! the struct derives `serde` traits so a host application can load it however it
//! likes (durations are stored as milliseconds).
//!
//! # Example
//!
//! ```rust
//! use classroom_sim::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::default()
//!     .with_seed(7)
//!     .with_generation_timeout(Duration::from_secs(5));
//!
//! assert_eq!(config.max_responders, 2);
//! assert_eq!(config.generation_timeout, Duration::from_secs(5));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for selection, pipelining, coaching and summarising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one remote decision call. A timeout counts as a failure.
    #[serde(with = "millis")]
    pub decision_timeout: Duration,

    /// Upper bound on one text-generation call. Responders that exceed it are dropped.
    #[serde(with = "millis")]
    pub generation_timeout: Duration,

    /// Upper bound on one synthesis call. Responders that exceed it keep their text
    /// but lose their audio.
    #[serde(with = "millis")]
    pub synthesis_timeout: Duration,

    /// Responder cap on the normal (non group-address) path.
    pub max_responders: usize,

    /// Agents with at least this many consecutive speaking turns are excluded from
    /// normal selection unless named by the teacher.
    pub recency_limit: u32,

    /// Group address still skips agents with at least this many consecutive turns.
    pub group_recency_limit: u32,

    /// Responder cap for the local heuristic backend.
    pub heuristic_max_responders: usize,

    /// Coaching: an agent silent for this many teacher turns gets a nudge.
    pub silence_window: u32,

    /// Summary: an engagement drop larger than this between two of an agent's
    /// speaking turns is a key moment.
    pub key_moment_threshold: f64,

    /// Consecutive decision failures before the remote backend is bypassed.
    pub breaker_failure_threshold: u32,

    /// How long the remote backend stays bypassed once the breaker opens.
    #[serde(with = "millis")]
    pub breaker_cooldown: Duration,

    /// Seed for the heuristic backend's RNG. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_secs(10),
            generation_timeout: Duration::from_secs(10),
            synthesis_timeout: Duration::from_secs(8),
            max_responders: 2,
            recency_limit: 2,
            group_recency_limit: 3,
            heuristic_max_responders: 1,
            silence_window: 5,
            key_moment_threshold: 0.15,
            breaker_failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(30),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    pub fn with_max_responders(mut self, max: usize) -> Self {
        self.max_responders = max;
        self
    }

    pub fn with_silence_window(mut self, turns: u32) -> Self {
        self.silence_window = turns;
        self
    }

    pub fn with_key_moment_threshold(mut self, threshold: f64) -> Self {
        self.key_moment_threshold = threshold;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.breaker_failure_threshold = failure_threshold;
        self.breaker_cooldown = cooldown;
        self
    }

    /// Fix the heuristic RNG seed so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
