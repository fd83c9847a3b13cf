use async_trait::async_trait;
use classroom_sim::capability::{
    CapabilityError, Candidate, DebateEntry, DecisionCapability, GeneratedReply,
    GenerationCapability,
};
use classroom_sim::event::{ClassroomEvent, EventHandler};
use classroom_sim::pipeline::ResponseRecord;
use classroom_sim::roster::{AgentSnapshot, RosterSnapshot};
use classroom_sim::selector::SelectionPath;
use classroom_sim::store::SessionStore;
use classroom_sim::timeline::Speaker;
use classroom_sim::updater::StateUpdater;
use classroom_sim::{
    ChaosEvent, Engine, EngineConfig, LessonConfig, Persona, Session, SessionError,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Deterministic replies whose deltas depend only on the agent and its current state.
struct StubGeneration {
    failing: Vec<&'static str>,
    engagement_delta: f64,
}

impl StubGeneration {
    fn new() -> Self {
        Self {
            failing: vec![],
            engagement_delta: 5.0,
        }
    }
}

#[async_trait]
impl GenerationCapability for StubGeneration {
    async fn generate(
        &self,
        agent: &AgentSnapshot,
        teacher_input: &str,
        debate_history: &[DebateEntry],
        _lesson: &LessonConfig,
    ) -> Result<GeneratedReply, CapabilityError> {
        if self.failing.contains(&agent.id.as_str()) {
            return Err(CapabilityError::Failed("upstream 500".into()));
        }
        Ok(GeneratedReply {
            text: format!(
                "{} answers '{}' after {} lines",
                agent.display_name,
                teacher_input,
                debate_history.len()
            ),
            emotional_state: if agent.engagement > 0.5 {
                "engaged".into()
            } else {
                "confused".into()
            },
            comprehension_delta: 3.0,
            engagement_delta: self.engagement_delta,
        })
    }
}

struct StaticDecision(Vec<&'static str>);

#[async_trait]
impl DecisionCapability for StaticDecision {
    async fn decide(
        &self,
        _teacher_input: &str,
        _roster: &RosterSnapshot,
    ) -> Result<Vec<Candidate>, CapabilityError> {
        Ok(self.0.iter().map(|id| Candidate::new(*id, "stub")).collect())
    }
}

struct BrokenDecision;

#[async_trait]
impl DecisionCapability for BrokenDecision {
    async fn decide(
        &self,
        _teacher_input: &str,
        _roster: &RosterSnapshot,
    ) -> Result<Vec<Candidate>, CapabilityError> {
        Err(CapabilityError::Malformed("not json".into()))
    }

    fn backend_name(&self) -> &str {
        "broken"
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ClassroomEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_classroom_event(&self, event: &ClassroomEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn new_session() -> Session {
    Session::new(
        LessonConfig::new("Math", "Fractions", "6"),
        &Persona::default_classroom(),
    )
    .unwrap()
}

fn engine(decision: Vec<&'static str>) -> Engine {
    Engine::new(
        EngineConfig::default().with_seed(17),
        Arc::new(StubGeneration::new()),
    )
    .with_decision(Arc::new(StaticDecision(decision)))
}

fn assert_invariants(roster: &RosterSnapshot) {
    for agent in &roster.agents {
        assert!((0.0..=1.0).contains(&agent.engagement), "{:?}", agent);
        assert!((0.0..=1.0).contains(&agent.comprehension), "{:?}", agent);
    }
}

#[tokio::test]
async fn test_group_turn_updates_everyone() {
    let engine = engine(vec![]);
    let mut session = new_session();

    let outcome = engine
        .run_turn(&mut session, "Okay everyone, let's go around the room")
        .await
        .unwrap();

    assert_eq!(outcome.turn, 1);
    assert_eq!(outcome.path, SelectionPath::GroupAddress);
    assert_eq!(outcome.emitted_responses.len(), 5);
    assert!(outcome
        .roster
        .agents
        .iter()
        .all(|a| a.consecutive_turns_speaking == 1));
    // teacher line plus five replies
    assert_eq!(session.timeline().len(), 6);
    assert_eq!(session.timeline().events()[0].speaker, Speaker::Teacher);
    assert!(!outcome.coaching_hint.is_empty());
}

#[tokio::test]
async fn test_consecutive_turns_track_responders() {
    let engine = engine(vec!["carlos"]);
    let mut session = new_session();

    for turn in 1..=3u32 {
        let outcome = engine.run_turn(&mut session, "Keep going.").await.unwrap();
        let carlos = outcome.roster.get("carlos").unwrap();
        let expected = if turn <= 2 { turn } else { 0 };
        assert_eq!(carlos.consecutive_turns_speaking, expected, "turn {}", turn);
        assert!(outcome
            .roster
            .agents
            .iter()
            .filter(|a| !outcome.responders.contains(&a.id))
            .all(|a| a.consecutive_turns_speaking == 0));
    }
}

#[tokio::test]
async fn test_scores_stay_in_unit_interval_under_extreme_deltas() {
    let mut generation = StubGeneration::new();
    generation.engagement_delta = 20.0;
    let engine = Engine::new(EngineConfig::default().with_seed(5), Arc::new(generation));
    let mut session = new_session();

    for _ in 0..12 {
        let outcome = engine.run_turn(&mut session, "Everyone, again!").await.unwrap();
        assert_invariants(&outcome.roster);
    }
    for _ in 0..40 {
        let outcome = engine.run_turn(&mut session, "Quiet reading time.").await.unwrap();
        assert_invariants(&outcome.roster);
    }
}

#[tokio::test]
async fn test_runs_are_reproducible_with_fixed_seed() {
    let inputs = [
        "Good morning.",
        "What is a fraction?",
        "Jake, are you with us?",
        "Let's try another one.",
        "Everyone, write down your answer.",
        "Any questions?",
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let engine = Engine::new(
            EngineConfig::default().with_seed(99),
            Arc::new(StubGeneration::new()),
        );
        let mut session = new_session();
        let mut outcomes = Vec::new();
        for input in inputs {
            outcomes.push(engine.run_turn(&mut session, input).await.unwrap());
        }
        runs.push(outcomes);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_reversed_deltas_restore_scores() {
    let mut session = new_session();
    let before = session.roster().get("carlos").unwrap().clone();
    let record = |comp: f64, eng: f64| ResponseRecord {
        agent_id: "carlos".into(),
        display_name: "Carlos".into(),
        text: "hmm".into(),
        emotional_state: None,
        comprehension_delta: comp,
        engagement_delta: eng,
        audio: None,
    };

    StateUpdater::apply(&mut session, &[record(7.0, -5.0)]);
    StateUpdater::apply(&mut session, &[record(-7.0, 5.0)]);

    let after = session.roster().get("carlos").unwrap();
    assert!((after.engagement() - before.engagement()).abs() < 1e-9);
    assert!((after.comprehension() - before.comprehension()).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_generation_leaves_agent_passive() {
    let mut generation = StubGeneration::new();
    generation.failing.push("jake");
    let engine = Engine::new(EngineConfig::default().with_seed(1), Arc::new(generation))
        .with_decision(Arc::new(StaticDecision(vec!["jake", "maya"])));
    let mut session = new_session();

    let outcome = engine.run_turn(&mut session, "Next problem.").await.unwrap();
    assert_eq!(outcome.responders, ["maya"]);
    let jake = outcome.roster.get("jake").unwrap();
    assert_eq!(jake.consecutive_turns_speaking, 0);
    // distracted drift
    assert!((jake.engagement - 0.47).abs() < 1e-9);
    assert_eq!(session.timeline().for_agent("jake").count(), 0);
}

#[tokio::test]
async fn test_events_follow_turn_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(
        EngineConfig::default().with_seed(3),
        Arc::new(StubGeneration::new()),
    )
    .with_decision(Arc::new(BrokenDecision))
    .with_event_handler(recorder.clone());
    let mut session = new_session();

    engine.run_turn(&mut session, "Maya, why?").await.unwrap();
    engine.end_session(&mut session).await;

    let events = recorder.events.lock().unwrap();
    assert!(matches!(events[0], ClassroomEvent::TurnStarted { turn: 1, .. }));
    assert!(matches!(
        &events[1],
        ClassroomEvent::DecisionFallback { backend, .. } if backend == "broken"
    ));
    assert!(matches!(
        &events[2],
        ClassroomEvent::RespondersSelected { agent_ids, .. } if agent_ids[0] == "maya"
    ));
    assert!(matches!(
        &events[3],
        ClassroomEvent::ResponseEmitted { agent_id, .. } if agent_id == "maya"
    ));
    assert!(matches!(
        events[events.len() - 2],
        ClassroomEvent::TurnCompleted { turn: 1, .. }
    ));
    assert!(matches!(
        events[events.len() - 1],
        ClassroomEvent::SessionEnded { total_turns: 1, .. }
    ));
}

#[tokio::test]
async fn test_streaming_turn_emits_in_selection_order() {
    let engine = engine(vec!["priya", "carlos"]);
    let mut session = new_session();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = engine
        .run_turn_streaming(&mut session, "Let's compare answers.", &tx)
        .await
        .unwrap();
    drop(tx);

    let mut streamed = Vec::new();
    while let Some(record) = rx.recv().await {
        streamed.push(record);
    }
    assert_eq!(streamed, outcome.emitted_responses);
    let order: Vec<&str> = streamed.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(order, ["priya", "carlos"]);
}

#[tokio::test]
async fn test_ended_session_rejects_turns() {
    let engine = engine(vec![]);
    let mut session = new_session();
    engine.run_turn(&mut session, "Hello class").await.unwrap();

    let report = engine.end_session(&mut session).await;
    assert_eq!(report.total_turns, 1);
    assert_eq!(report.turns.len(), 1);
    assert_eq!(report.agents.len(), 5);

    let err = engine.run_turn(&mut session, "One more?").await.unwrap_err();
    assert_eq!(err, SessionError::Ended(session.id.clone()));
    assert_eq!(session.turn_count(), 1);
}

#[tokio::test]
async fn test_chaos_event_runs_as_group_turn() {
    let engine = engine(vec![]);
    let mut session = new_session();
    let fire_drill = ChaosEvent::by_id("fire_drill").unwrap();

    let outcome = engine.inject_chaos(&mut session, fire_drill).await.unwrap();
    assert_eq!(outcome.path, SelectionPath::GroupAddress);
    assert_eq!(session.timeline().events()[0].text, fire_drill.prompt);
}

#[tokio::test]
async fn test_store_sessions_run_independently() {
    let engine = Arc::new(engine(vec!["maya"]));
    let store = Arc::new(SessionStore::new());
    let personas = Persona::default_classroom();
    let first = store.create(LessonConfig::default(), &personas).await.unwrap();
    let second = store.create(LessonConfig::default(), &personas).await.unwrap();
    assert_eq!(store.active_count().await, 2);

    let (a, b) = tokio::join!(
        engine.run_stored_turn(&store, &first, "Good morning."),
        engine.run_stored_turn(&store, &second, "Everyone, stand up!"),
    );
    assert_eq!(a.unwrap().responders, ["maya"]);
    assert_eq!(b.unwrap().responders.len(), 5);

    let (session, report) = store.end(&first).await.unwrap();
    assert!(!session.is_active());
    assert_eq!(report.agent("maya").unwrap().turns_spoken, 1);
    assert!(matches!(
        engine.run_stored_turn(&store, &first, "Hello?").await,
        Err(SessionError::NotFound(_))
    ));
    assert_eq!(store.active_count().await, 1);
}

#[tokio::test]
async fn test_handle_kept_after_end_is_rejected() {
    let engine = engine(vec![]);
    let store = SessionStore::new();
    let id = store
        .create(LessonConfig::default(), &Persona::default_classroom())
        .await
        .unwrap();
    let handle = store.get(&id).await.unwrap();
    store.end(&id).await.unwrap();

    let mut session = handle.lock().await;
    assert!(matches!(
        engine.run_turn(&mut session, "Still there?").await,
        Err(SessionError::Ended(_))
    ));
}

#[tokio::test]
async fn test_ending_stored_session_goes_through_engine() {
    let recorder = Arc::new(Recorder::default());
    let mut generation = StubGeneration::new();
    generation.engagement_delta = -10.0;
    let engine = Engine::new(
        EngineConfig::default()
            .with_seed(17)
            .with_key_moment_threshold(0.05),
        Arc::new(generation),
    )
    .with_decision(Arc::new(StaticDecision(vec!["maya"])))
    .with_event_handler(recorder.clone());

    let store = SessionStore::new();
    let id = store
        .create(
            LessonConfig::new("Math", "Fractions", "6"),
            &Persona::default_classroom(),
        )
        .await
        .unwrap();
    for input in ["Maya, what is a half?", "Maya, and a quarter?"] {
        let outcome = engine.run_stored_turn(&store, &id, input).await.unwrap();
        assert_eq!(outcome.responders, ["maya"]);
    }

    let (ended, report) = engine.end_stored_session(&store, &id).await.unwrap();
    assert!(!ended.is_active());
    assert_eq!(store.active_count().await, 0);

    // a 0.10 drop only counts under the engine's lowered threshold
    assert_eq!(report.key_moments.len(), 1);
    assert_eq!(report.key_moments[0].agent_id, "maya");
    assert_eq!(report.key_moments[0].turn, 2);
    assert_eq!(report.key_moments[0].engagement_drop, 0.1);

    {
        let events = recorder.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ClassroomEvent::SessionEnded { total_turns: 2, .. })
        ));
    }

    assert!(matches!(
        engine.end_stored_session(&store, &id).await,
        Err(SessionError::NotFound(_))
    ));
}
