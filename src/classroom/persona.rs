//! Persona definitions: the fixed identity and starting point of each simulated student.
//!
//! A [`Persona`] never changes during a session. It seeds the matching
//! [`StudentAgent`](crate::classroom::roster::StudentAgent) and supplies the base
//! response weight used by the heuristic selection backend.

use crate::classroom::emotion::EmotionalState;
use serde::{Deserialize, Serialize};

/// Static description of one student archetype.
///
/// # Examples
///
/// ```
/// use classroom_sim::{EmotionalState, Persona};
///
/// let persona = Persona::new("ana", "Ana", "curious newcomer")
///     .with_voice("en-US-AriaNeural")
///     .with_base_weight(0.4)
///     .with_initial_state(0.6, 0.5, EmotionalState::Eager);
///
/// assert_eq!(persona.id, "ana");
/// assert_eq!(persona.base_weight, 0.4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable agent id, also used as the roster key.
    pub id: String,
    /// Name shown to the teacher and matched when the teacher addresses a student.
    pub display_name: String,
    /// Short archetype label ("eager overachiever", ...).
    pub archetype: String,
    /// Voice handed to the synthesis capability.
    pub voice_id: String,
    /// Probability (`0.0..=1.0`) that the student volunteers at full engagement.
    pub base_weight: f64,
    pub initial_engagement: f64,
    pub initial_comprehension: f64,
    pub initial_emotion: EmotionalState,
}

impl Persona {
    /// Persona with neutral defaults: weight 0.5, engagement and comprehension 0.75,
    /// engaged, no voice.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        archetype: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            archetype: archetype.into(),
            voice_id: String::new(),
            base_weight: 0.5,
            initial_engagement: 0.75,
            initial_comprehension: 0.75,
            initial_emotion: EmotionalState::Engaged,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    /// Set the base response weight, clamped to `0.0..=1.0`.
    pub fn with_base_weight(mut self, weight: f64) -> Self {
        self.base_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Set the starting engagement, comprehension (both clamped) and emotion.
    pub fn with_initial_state(
        mut self,
        engagement: f64,
        comprehension: f64,
        emotion: EmotionalState,
    ) -> Self {
        self.initial_engagement = engagement.clamp(0.0, 1.0);
        self.initial_comprehension = comprehension.clamp(0.0, 1.0);
        self.initial_emotion = emotion;
        self
    }

    /// The standard five-student classroom, in seating (roster) order.
    ///
    /// ```
    /// use classroom_sim::Persona;
    ///
    /// let ids: Vec<_> = Persona::default_classroom().into_iter().map(|p| p.id).collect();
    /// assert_eq!(ids, ["maya", "carlos", "jake", "priya", "marcus"]);
    /// ```
    pub fn default_classroom() -> Vec<Persona> {
        vec![
            Persona::new("maya", "Maya", "eager overachiever")
                .with_voice("en-US-AriaNeural")
                .with_base_weight(0.85)
                .with_initial_state(0.95, 0.90, EmotionalState::Eager),
            Persona::new("carlos", "Carlos", "english language learner")
                .with_voice("es-MX-JorgeNeural")
                .with_base_weight(0.60)
                .with_initial_state(0.65, 0.55, EmotionalState::Confused),
            Persona::new("jake", "Jake", "class clown")
                .with_voice("en-US-GuyNeural")
                .with_base_weight(0.55)
                .with_initial_state(0.50, 0.60, EmotionalState::Distracted),
            Persona::new("priya", "Priya", "anxious and quiet")
                .with_voice("en-IN-NeerjaNeural")
                .with_base_weight(0.30)
                .with_initial_state(0.70, 0.80, EmotionalState::Anxious),
            Persona::new("marcus", "Marcus", "checked out skeptic")
                .with_voice("en-US-DavisNeural")
                .with_base_weight(0.70)
                .with_initial_state(0.20, 0.40, EmotionalState::Bored),
        ]
    }
}
