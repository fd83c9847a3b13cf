use async_trait::async_trait;
use classroom_sim::capability::{
    AudioPayload, CapabilityError, DebateEntry, GeneratedReply, GenerationCapability,
    SynthesisCapability,
};
use classroom_sim::pipeline::{GenerationPipeline, ResponseRecord};
use classroom_sim::roster::AgentSnapshot;
use classroom_sim::timeline::Speaker;
use classroom_sim::{EmotionalState, LessonConfig, Persona, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Replies "<name> says hi", records the debate history each agent saw.
struct ScriptedGeneration {
    log: Log,
    histories: Arc<Mutex<HashMap<String, Vec<DebateEntry>>>>,
    silent: Vec<&'static str>,
    failing: Vec<&'static str>,
    slow: Vec<&'static str>,
}

impl ScriptedGeneration {
    fn new(log: Log) -> Self {
        Self {
            log,
            histories: Arc::new(Mutex::new(HashMap::new())),
            silent: vec![],
            failing: vec![],
            slow: vec![],
        }
    }
}

#[async_trait]
impl GenerationCapability for ScriptedGeneration {
    async fn generate(
        &self,
        agent: &AgentSnapshot,
        _teacher_input: &str,
        debate_history: &[DebateEntry],
        _lesson: &LessonConfig,
    ) -> Result<GeneratedReply, CapabilityError> {
        self.log.lock().unwrap().push(format!("gen:{}", agent.id));
        self.histories
            .lock()
            .unwrap()
            .insert(agent.id.clone(), debate_history.to_vec());

        if self.slow.contains(&agent.id.as_str()) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if self.failing.contains(&agent.id.as_str()) {
            return Err(CapabilityError::Failed("bad gateway".into()));
        }
        let text = if self.silent.contains(&agent.id.as_str()) {
            String::new()
        } else {
            format!("{} says hi", agent.display_name)
        };
        Ok(GeneratedReply {
            text,
            emotional_state: "engaged".into(),
            comprehension_delta: 4.0,
            engagement_delta: 6.0,
        })
    }
}

/// Produces one byte of audio per call; per-voice delays and failures are scripted.
struct ScriptedSynthesis {
    log: Log,
    delays: HashMap<&'static str, u64>,
    failing: Vec<&'static str>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSynthesis {
    fn new(log: Log) -> Self {
        Self {
            log,
            delays: HashMap::new(),
            failing: vec![],
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SynthesisCapability for ScriptedSynthesis {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<Option<AudioPayload>, CapabilityError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("synth_start:{}", voice_id));

        let delay = self.delays.get(voice_id).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.log.lock().unwrap().push(format!("synth_end:{}", voice_id));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(&voice_id) {
            return Err(CapabilityError::Failed("tts quota".into()));
        }
        Ok(Some(AudioPayload {
            format: "audio/mpeg".into(),
            bytes: text.bytes().take(1).collect(),
        }))
    }
}

fn session() -> Session {
    Session::new(LessonConfig::default(), &Persona::default_classroom()).unwrap()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn pipeline(
    generation: Arc<ScriptedGeneration>,
    synthesis: Arc<ScriptedSynthesis>,
) -> GenerationPipeline {
    GenerationPipeline::new(
        generation,
        synthesis,
        Duration::from_millis(100),
        Duration::from_millis(100),
    )
}

#[tokio::test]
async fn test_records_follow_selection_order_even_when_audio_finishes_out_of_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let generation = Arc::new(ScriptedGeneration::new(log.clone()));
    let mut synthesis = ScriptedSynthesis::new(log.clone());
    // maya's voice is slow, carlos's is instant
    synthesis.delays.insert("en-US-AriaNeural", 60);
    let synthesis = Arc::new(synthesis);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = session();
    let records = pipeline(generation, synthesis.clone())
        .run(&ids(&["maya", "carlos", "jake"]), "Hello", &session, Some(&tx))
        .await;
    drop(tx);

    let order: Vec<&str> = records.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(order, ["maya", "carlos", "jake"]);

    let mut emitted = Vec::new();
    while let Some(record) = rx.recv().await {
        emitted.push(record.agent_id);
    }
    assert_eq!(emitted, ["maya", "carlos", "jake"]);
    assert!(records.iter().all(|r| r.audio.is_some()));
    assert_eq!(synthesis.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_next_generation_overlaps_previous_synthesis() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let generation = Arc::new(ScriptedGeneration::new(log.clone()));
    let mut synthesis = ScriptedSynthesis::new(log.clone());
    synthesis.delays.insert("en-US-AriaNeural", 50);

    let session = session();
    pipeline(generation, Arc::new(synthesis))
        .run(&ids(&["maya", "carlos"]), "Hello", &session, None)
        .await;

    let log = entries(&log);
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert!(position("gen:maya") < position("gen:carlos"));
    assert!(position("gen:carlos") < position("synth_end:en-US-AriaNeural"));
    assert!(position("synth_end:en-US-AriaNeural") < position("synth_start:es-MX-JorgeNeural"));
}

#[tokio::test]
async fn test_later_responders_see_earlier_texts() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let generation = Arc::new(ScriptedGeneration::new(log.clone()));
    let histories = generation.histories.clone();

    let session = session();
    pipeline(generation, Arc::new(ScriptedSynthesis::new(log)))
        .run(&ids(&["priya", "marcus"]), "Why?", &session, None)
        .await;

    let histories = histories.lock().unwrap();
    assert!(histories["priya"].is_empty());
    assert_eq!(
        histories["marcus"],
        vec![DebateEntry {
            speaker: Speaker::Agent("priya".into()),
            text: "Priya says hi".into(),
        }]
    );
}

#[tokio::test]
async fn test_generation_timeout_and_failure_drop_the_responder() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut generation = ScriptedGeneration::new(log.clone());
    generation.slow.push("jake");
    generation.failing.push("carlos");

    let session = session();
    let records = pipeline(Arc::new(generation), Arc::new(ScriptedSynthesis::new(log)))
        .run(&ids(&["carlos", "jake", "maya"]), "Hello", &session, None)
        .await;

    let order: Vec<&str> = records.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(order, ["maya"]);
}

#[tokio::test]
async fn test_synthesis_failure_and_timeout_keep_text_without_audio() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let generation = Arc::new(ScriptedGeneration::new(log.clone()));
    let mut synthesis = ScriptedSynthesis::new(log);
    synthesis.delays.insert("en-US-GuyNeural", 400);
    synthesis.failing.push("en-IN-NeerjaNeural");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = session();
    let records = pipeline(generation, Arc::new(synthesis))
        .run(&ids(&["jake", "priya", "maya"]), "Hello", &session, Some(&tx))
        .await;
    drop(tx);

    let audio: Vec<(&str, bool)> = records
        .iter()
        .map(|r| (r.agent_id.as_str(), r.audio.is_some()))
        .collect();
    assert_eq!(audio, [("jake", false), ("priya", false), ("maya", true)]);

    let mut emitted = 0;
    while rx.recv().await.is_some() {
        emitted += 1;
    }
    assert_eq!(emitted, 3);
}

#[tokio::test]
async fn test_silent_reply_is_returned_but_not_emitted() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut generation = ScriptedGeneration::new(log.clone());
    generation.silent.push("priya");
    let generation = Arc::new(generation);
    let histories = generation.histories.clone();

    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseRecord>();
    let session = session();
    let records = pipeline(generation, Arc::new(ScriptedSynthesis::new(log.clone())))
        .run(&ids(&["maya", "priya", "carlos"]), "Hello", &session, Some(&tx))
        .await;
    drop(tx);

    let order: Vec<&str> = records.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(order, ["maya", "priya", "carlos"]);
    assert!(records[1].is_silent());
    assert!(records[1].audio.is_none());
    assert_eq!(records[1].emotional_state, Some(EmotionalState::Engaged));

    let mut emitted = Vec::new();
    while let Some(record) = rx.recv().await {
        emitted.push(record.agent_id);
    }
    assert_eq!(emitted, ["maya", "carlos"]);
    assert!(!entries(&log).contains(&"synth_start:en-IN-NeerjaNeural".to_string()));

    // the silent agent adds nothing to the debate context
    assert_eq!(histories.lock().unwrap()["carlos"].len(), 1);
}
