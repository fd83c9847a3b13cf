//! A single classroom session: lesson, roster, transcript and turn counter.

use crate::classroom::persona::Persona;
use crate::classroom::roster::{Roster, RosterSnapshot};
use crate::classroom::timeline::Timeline;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Lesson metadata. The engine never interprets it; it is handed to the generation
/// capability unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonConfig {
    pub subject: String,
    pub topic: String,
    pub grade_level: String,
}

impl LessonConfig {
    pub fn new(
        subject: impl Into<String>,
        topic: impl Into<String>,
        grade_level: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            topic: topic.into(),
            grade_level: grade_level.into(),
        }
    }
}

/// Errors raised while building, looking up or driving a session.
///
/// ```
/// use classroom_sim::SessionError;
///
/// let err = SessionError::NotFound("abc".into());
/// assert_eq!(err.to_string(), "Session not found: abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session with this id is held by the store.
    NotFound(String),
    /// The session was ended and no longer accepts turns.
    Ended(String),
    /// A session needs at least one persona.
    EmptyRoster,
    /// Two personas share the same id.
    DuplicateAgent(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound(id) => write!(f, "Session not found: {}", id),
            SessionError::Ended(id) => write!(f, "Session already ended: {}", id),
            SessionError::EmptyRoster => write!(f, "Session roster is empty"),
            SessionError::DuplicateAgent(id) => write!(f, "Duplicate agent id: {}", id),
        }
    }
}

impl Error for SessionError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub lesson: LessonConfig,
    pub(crate) roster: Roster,
    pub(crate) timeline: Timeline,
    pub(crate) turn_count: u32,
    pub(crate) active: bool,
}

impl Session {
    /// Create a session with a fresh v4 id.
    pub fn new(lesson: LessonConfig, personas: &[Persona]) -> Result<Self, SessionError> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), lesson, personas)
    }

    pub fn with_id(
        id: impl Into<String>,
        lesson: LessonConfig,
        personas: &[Persona],
    ) -> Result<Self, SessionError> {
        Ok(Self {
            id: id.into(),
            lesson,
            roster: Roster::from_personas(personas)?,
            timeline: Timeline::new(),
            turn_count: 0,
            active: true,
        })
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Number of teacher turns processed so far.
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Read-only projection of every agent's public state.
    pub fn roster_snapshot(&self) -> RosterSnapshot {
        self.roster.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    #[cfg(test)]
    pub(crate) fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }
}
