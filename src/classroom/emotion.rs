//! Closed set of student emotional states.
//!
//! Capabilities report emotions as free text. Conversion goes through
//! [`EmotionalState::from_str`], so an unrecognised label is rejected at construction
//! time instead of being compared against a string set later on.
//!
//! ```
//! use classroom_sim::EmotionalState;
//!
//! let state: EmotionalState = "Confused".parse().unwrap();
//! assert_eq!(state, EmotionalState::Confused);
//! assert!("curious".parse::<EmotionalState>().is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// How a simulated student currently feels about the lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalState {
    Eager,
    Confused,
    Distracted,
    Anxious,
    Bored,
    Engaged,
    Frustrated,
}

impl EmotionalState {
    /// Every variant, in declaration order.
    pub const ALL: [EmotionalState; 7] = [
        EmotionalState::Eager,
        EmotionalState::Confused,
        EmotionalState::Distracted,
        EmotionalState::Anxious,
        EmotionalState::Bored,
        EmotionalState::Engaged,
        EmotionalState::Frustrated,
    ];

    /// Lowercase wire label (`"eager"`, `"confused"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalState::Eager => "eager",
            EmotionalState::Confused => "confused",
            EmotionalState::Distracted => "distracted",
            EmotionalState::Anxious => "anxious",
            EmotionalState::Bored => "bored",
            EmotionalState::Engaged => "engaged",
            EmotionalState::Frustrated => "frustrated",
        }
    }

    /// `true` for the two states that mean the student has tuned out.
    pub fn is_disengaged(&self) -> bool {
        matches!(self, EmotionalState::Bored | EmotionalState::Distracted)
    }

    /// Lenient conversion used on capability output: invalid labels become `None`.
    pub fn parse_lenient(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label is not one of the seven known states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionParseError {
    label: String,
}

impl fmt::Display for EmotionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown emotional state: {}", self.label)
    }
}

impl Error for EmotionParseError {}

impl FromStr for EmotionalState {
    type Err = EmotionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase();
        EmotionalState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == normalised)
            .ok_or(EmotionParseError {
                label: s.to_string(),
            })
    }
}
