//! Classroom turn orchestration engine.

pub mod advisor;
pub mod capability;
pub mod chaos;
pub mod chat;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod event;
pub mod http_chat;
pub mod persona;
pub mod pipeline;
pub mod roster;
pub mod selector;
pub mod session;
pub mod store;
pub mod summary;
pub mod timeline;
pub mod updater;

pub use engine::{Engine, TurnOutcome};
pub use session::Session;
