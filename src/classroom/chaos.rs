//! Catalog of classroom disruptions.
//!
//! A disruption is fed to the engine as if the teacher had said its `prompt`, so
//! selection, generation, state updates and coaching treat it like any other turn
//! (see [`Engine::inject_chaos`](crate::classroom::engine::Engine::inject_chaos)).
//! Most prompts mention the whole class and therefore take the group-address path.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChaosEvent {
    pub id: &'static str,
    /// Short label for buttons and logs.
    pub label: &'static str,
    pub description: &'static str,
    /// Text injected as the turn input.
    pub prompt: &'static str,
}

pub const CHAOS_EVENTS: [ChaosEvent; 8] = [
    ChaosEvent {
        id: "jake_drawing",
        label: "Jake starts drawing",
        description: "Jake has started doodling instead of listening.",
        prompt: "[CLASSROOM EVENT] Jake has tuned out and is sketching in his notebook. \
                 The class notices. React naturally: comment, whisper, or drift off too.",
    },
    ChaosEvent {
        id: "marcus_interrupts",
        label: "Marcus challenges the lesson",
        description: "Marcus cuts in: 'Why does any of this matter?'",
        prompt: "[CLASSROOM EVENT] Marcus interrupts with 'Why does any of this matter?' \
                 and questions the point of the lesson. The class reacts: agree, push back, \
                 or squirm.",
    },
    ChaosEvent {
        id: "carlos_raises_hand",
        label: "Carlos raises his hand nervously",
        description: "Carlos raises his hand but seems too nervous to speak.",
        prompt: "[CLASSROOM EVENT] Carlos has quietly put his hand up but hesitates, \
                 unsure of himself. The class notices and waits to see what happens.",
    },
    ChaosEvent {
        id: "priya_crying",
        label: "Priya looks overwhelmed",
        description: "Priya looks close to tears.",
        prompt: "[CLASSROOM EVENT] Priya is visibly overwhelmed and close to tears. \
                 The class goes quiet. React with concern, awkwardness, or an offer to help.",
    },
    ChaosEvent {
        id: "maya_wrong",
        label: "Maya gets an answer wrong",
        description: "Maya confidently gives a completely wrong answer.",
        prompt: "[CLASSROOM EVENT] Maya answered with total confidence and was completely \
                 wrong. The class is surprised since she is usually right. React: shock, \
                 stifled laughs, or a challenge.",
    },
    ChaosEvent {
        id: "jake_phone",
        label: "Jake's phone goes off",
        description: "Jake's phone rings loudly in the middle of class.",
        prompt: "[CLASSROOM EVENT] Jake's phone blares music mid-lesson and everyone turns \
                 around. Jake is embarrassed and the class bursts out for a moment.",
    },
    ChaosEvent {
        id: "marcus_walks_out",
        label: "Marcus walks out",
        description: "Marcus stands up and heads for the door.",
        prompt: "[CLASSROOM EVENT] Marcus gets up and walks slowly toward the door as if he \
                 is done for the day. The class tenses up. React: shock, whispers, worry.",
    },
    ChaosEvent {
        id: "fire_drill",
        label: "Fire drill",
        description: "The fire alarm goes off.",
        prompt: "[CLASSROOM EVENT] The fire alarm starts ringing and the lesson stops. \
                 The class reacts with excitement, confusion, relief or annoyance.",
    },
];

impl ChaosEvent {
    pub fn all() -> &'static [ChaosEvent] {
        &CHAOS_EVENTS
    }

    pub fn by_id(id: &str) -> Option<&'static ChaosEvent> {
        CHAOS_EVENTS.iter().find(|event| event.id == id)
    }

    /// Pick one event uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> &'static ChaosEvent {
        CHAOS_EVENTS.choose(rng).unwrap_or(&CHAOS_EVENTS[0])
    }
}
