//! End-to-end coaching conversations driven by a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use coach::agent::{CoachAgent, CoachDeps};
use coach::channels::CliChannel;
use coach::config::AgentConfig;
use coach::error::LlmError;
use coach::llm::{
    ChatMessage, FinishReason, LlmProvider, Role, ToolCall, ToolCompletionRequest,
    ToolCompletionResponse,
};
use coach::store::{Database, LibSqlBackend, SessionStore};
use coach::tools::CommandRegistry;
use coach::tracker::{CoachSession, ConfirmationPhase, FieldValue, RecordKind, SessionKey};

/// Replays a fixed script and records every request it receives.
struct ScriptedLlm {
    script: Mutex<VecDeque<ToolCompletionResponse>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<ToolCompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn system_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|msgs| msgs.first())
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.messages);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            })
    }
}

fn say(text: &str) -> ToolCompletionResponse {
    ToolCompletionResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        finish_reason: FinishReason::Stop,
    }
}

fn call(calls: &[(&str, serde_json::Value)]) -> ToolCompletionResponse {
    ToolCompletionResponse {
        content: None,
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
        input_tokens: 0,
        output_tokens: 0,
        finish_reason: FinishReason::ToolUse,
    }
}

async fn deps_with_db(llm: Arc<ScriptedLlm>, db: Arc<dyn Database>) -> CoachDeps {
    CoachDeps {
        llm,
        commands: Arc::new(CommandRegistry::new().with_database(Arc::clone(&db))),
        sessions: Arc::new(SessionStore::with_database(db)),
        config: AgentConfig::default(),
    }
}

#[tokio::test]
async fn profile_conversation_is_confirmed_and_saved() {
    let llm = ScriptedLlm::new(vec![
        call(&[(
            "update_multiple_fields",
            json!({"updates": {"name": "John", "age": "30 years old", "current_occupation": "teacher"}}),
        )]),
        say("Great to meet you, John! What career would you like to move into?"),
        call(&[
            (
                "update_multiple_fields",
                json!({"updates": {"desired_career": "UX designer", "work_experience": "8 years teaching"}}),
            ),
            ("present_summary", json!({})),
        ]),
        say("Here's what I have. Is everything correct?"),
        call(&[("check_completeness", json!({}))]),
        say("Your profile is saved."),
    ]);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let deps = deps_with_db(Arc::clone(&llm), Arc::clone(&db)).await;

    let session = CoachSession::profile(SessionKey::new("john", "profile_session"));
    let mut agent = CoachAgent::start(deps, session).await;

    let input: &[u8] = b"I'm John, 30, I teach\n\n   \nI'd love to be a UX designer; 8 years teaching\nYes, looks good!\n";
    let mut channel = CliChannel::new(input, Vec::new());
    let finalized = agent.run(&mut channel).await.unwrap();

    assert_eq!(finalized.len(), 1);
    let record = &finalized[0];
    assert_eq!(record.kind, RecordKind::Profile);
    assert_eq!(record.get("age"), Some(&FieldValue::Integer(30)));
    assert_eq!(record.get("desired_career").unwrap().as_text(), Some("UX designer"));

    let out = String::from_utf8(channel.into_writer()).unwrap();
    assert!(out.contains("Coach: Hi! I'm your career coach."));
    assert!(out.contains("=== Final Profile Summary ==="));
    assert!(out.contains("Name: John\n"));
    assert!(out.contains("Age: 30\n"));
    assert!(out.contains("Current Occupation: teacher\n"));
    assert!(out.contains("Thanks for talking with me. Goodbye!"));

    let saved = db
        .list_finalized_records("john", Some(RecordKind::Profile))
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, record.id);
    assert_eq!(saved[0].fields, record.fields);

    // Blank lines never reach the model: three turns, two model calls each
    assert_eq!(llm.requests.lock().unwrap().len(), 6);

    // The system prompt tracks what has been collected so far
    let prompts = llm.system_prompts();
    assert!(prompts[0].contains("- Name: Not provided"));
    assert!(prompts[2].contains("- Name: John"));
}

#[tokio::test]
async fn event_needs_explicit_confirmation_and_can_continue() {
    let llm = ScriptedLlm::new(vec![
        // Turn 1: overview and date
        call(&[(
            "update_multiple_fields",
            json!({"updates": {"event_overview": "Hiking the Alps", "when_happened": "2019"}}),
        )]),
        say("That sounds memorable. What happened on the trip?"),
        // Turn 2: the rest, then the summary
        call(&[
            (
                "update_multiple_fields",
                json!({"updates": {"what_happened": "Climbed with my brother", "peak_moment": "Sunrise at the summit"}}),
            ),
            ("present_summary", json!({})),
        ]),
        say("Here's the summary. Is it right?"),
        // Turn 3: a near-miss confirmation is not enough
        call(&[("check_completeness", json!({}))]),
        say("No problem, what would you like to change?"),
        // Turn 4: plain agreement finalizes
        call(&[("check_completeness", json!({}))]),
        say("Saved. Thank you for sharing."),
        // Next experience greeting is local; the user then leaves
    ]);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let deps = deps_with_db(Arc::clone(&llm), Arc::clone(&db)).await;

    let session = CoachSession::event(SessionKey::new("sarah_user", "experience_session_1"), 1, None);
    let mut agent = CoachAgent::start(deps, session).await;

    let input: &[u8] = b"In 2019 I hiked the Alps\nI climbed with my brother, sunrise at the summit was the best\nyes but change the year\nyes\nyes please\nbye\n";
    let mut channel = CliChannel::new(input, Vec::new());
    let finalized = agent.run(&mut channel).await.unwrap();

    assert_eq!(finalized.len(), 1);
    let event = finalized[0].to_event().unwrap();
    assert_eq!(event.event_number, 1);
    assert!(event.is_complete);
    assert_eq!(event.peak_moment.as_deref(), Some("Sunrise at the summit"));

    // The agent moved on to a fresh record for experience 2
    assert_eq!(agent.key().session_id, "experience_session_1-experience_2");
    {
        let next = agent.session().lock().await;
        assert_eq!(next.meta().sequence_number, 2);
        assert!(next.record().is_empty());
        assert_eq!(next.phase(), ConfirmationPhase::Collecting);
    }

    let out = String::from_utf8(channel.into_writer()).unwrap();
    assert!(out.contains("=== Experience 1 Summary ==="));
    assert!(out.contains("Peak Moment: Sunrise at the summit"));
    assert!(out.contains("Welcome back"));

    let saved = db
        .list_finalized_records("sarah_user", Some(RecordKind::Event))
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);
}

#[tokio::test]
async fn vague_occupation_is_not_recorded() {
    let llm = ScriptedLlm::new(vec![say("Tech covers a lot! What do you do day to day?")]);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let deps = deps_with_db(llm, db).await;

    let session = CoachSession::profile(SessionKey::new("u", "s")).with_seed([("name", "Ann")]);
    let mut agent = CoachAgent::start(deps, session).await;
    let outcome = agent.handle_message("I work in tech").await.unwrap();

    assert_eq!(outcome.tool_calls, 0);
    let session = agent.session().lock().await;
    assert!(session.record().get("current_occupation").is_none());
    assert!(
        session
            .record()
            .missing_fields()
            .contains(&"current_occupation")
    );
}

#[tokio::test]
async fn session_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coach_sessions.db");
    let key = SessionKey::new("sarah_user", "experience_session_1");

    {
        let llm = ScriptedLlm::new(vec![
            call(&[(
                "update_field",
                json!({"field_name": "event_overview", "field_value": "First marathon"}),
            )]),
            say("When was that?"),
        ]);
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let deps = deps_with_db(llm, db).await;
        let mut agent = CoachAgent::start(deps, CoachSession::event(key.clone(), 1, None)).await;
        agent.handle_message("I ran my first marathon").await.unwrap();
    }

    let llm = ScriptedLlm::new(Vec::new());
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let deps = deps_with_db(llm, db).await;
    let agent = CoachAgent::start(deps, CoachSession::event(key, 1, None)).await;

    let session = agent.session().lock().await;
    assert_eq!(
        session.record().get("event_overview").unwrap().as_text(),
        Some("First marathon")
    );
    assert_eq!(session.last_user_message(), Some("I ran my first marathon"));
}

#[tokio::test]
async fn second_run_starts_the_next_experience() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coach_sessions.db");
    let key = SessionKey::new("sarah_user", "experience_session_1");

    {
        let llm = ScriptedLlm::new(vec![
            call(&[
                (
                    "update_multiple_fields",
                    json!({"updates": {
                        "event_overview": "First marathon",
                        "when_happened": "2021",
                        "what_happened": "Ran 42km in the rain",
                        "peak_moment": "Crossing the finish line"
                    }}),
                ),
                ("present_summary", json!({})),
            ]),
            say("Is this right?"),
            call(&[("check_completeness", json!({}))]),
            say("Saved."),
        ]);
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let deps = deps_with_db(llm, db).await;
        let mut agent = CoachAgent::start(deps, CoachSession::event(key.clone(), 1, None)).await;
        agent.handle_message("I ran my first marathon in 2021").await.unwrap();
        let outcome = agent.handle_message("yes").await.unwrap();
        assert!(outcome.completed.is_some());
    }

    // A later run asks for experience 2 under the same default session id
    let llm = ScriptedLlm::new(Vec::new());
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let stored = db
        .list_finalized_records("sarah_user", Some(RecordKind::Event))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);

    let deps = deps_with_db(llm, db).await;
    let mut agent = CoachAgent::start(deps, CoachSession::event(key, 2, None)).await;
    {
        let session = agent.session().lock().await;
        assert_eq!(session.meta().sequence_number, 2);
        assert!(!session.is_complete());
        assert!(session.record().is_empty());
    }

    let input: &[u8] = b"bye\n";
    let mut channel = CliChannel::new(input, Vec::new());
    let finalized = agent.run(&mut channel).await.unwrap();
    assert!(finalized.is_empty());

    let out = String::from_utf8(channel.into_writer()).unwrap();
    assert!(!out.contains("already confirmed"));
    assert!(out.contains("Welcome back"));
}
