//! CoachAgent — runs one coaching conversation against the model.
//!
//! Each user message starts a bounded loop: the model is called with the
//! current system prompt and the coach commands, any tool calls are dispatched
//! against the session, their results are appended, and the loop repeats until
//! the model answers in plain text.

use std::sync::Arc;

use crate::agent::submission::{Submission, SubmissionParser};
use crate::channels::Channel;
use crate::config::AgentConfig;
use crate::error::Error;
use crate::llm::{
    ChatMessage, LlmProvider, Reasoning, ReasoningContext, RespondResult, TokenUsage,
};
use crate::store::{SessionHandle, SessionStore};
use crate::tools::CommandRegistry;
use crate::tracker::prompts::{greeting, system_prompt};
use crate::tracker::{CoachSession, FinalizedRecord, RecordKind, SessionKey};

const FALLBACK_REPLY: &str = "Sorry, I lost my train of thought. Could you say that again?";
const FAREWELL: &str = "Thanks for talking with me. Goodbye!";

/// Shared collaborators for a coach.
#[derive(Clone)]
pub struct CoachDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub commands: Arc<CommandRegistry>,
    pub sessions: Arc<SessionStore>,
    pub config: AgentConfig,
}

/// What happened during one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text shown to the user.
    pub reply: String,
    /// Number of tool calls the model made.
    pub tool_calls: usize,
    /// Set on the turn the record was finalized.
    pub completed: Option<FinalizedRecord>,
}

/// Drives one session through the model.
pub struct CoachAgent {
    deps: CoachDeps,
    key: SessionKey,
    /// Session id the conversation started under; later experiences derive
    /// their ids from it.
    base_session_id: String,
    session: SessionHandle,
    history: Vec<ChatMessage>,
}

impl CoachAgent {
    /// Attach to the session under `initial`'s key, resuming a stored one if
    /// present.
    pub async fn start(deps: CoachDeps, initial: CoachSession) -> Self {
        let key = initial.key().clone();
        let session = deps.sessions.get_or_create(&key, move || initial).await;
        Self {
            deps,
            base_session_id: key.session_id.clone(),
            key,
            session,
            history: Vec::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Opening line for the current session.
    pub async fn greeting(&self) -> String {
        greeting(&*self.session.lock().await)
    }

    /// Process one user message and return the coach's reply.
    pub async fn handle_message(&mut self, content: &str) -> Result<TurnOutcome, Error> {
        let (kind, was_complete) = {
            let mut session = self.session.lock().await;
            session.observe_user_message(content);
            (session.kind(), session.is_complete())
        };
        self.history.push(ChatMessage::user(content));

        let tools = self.deps.commands.tool_definitions(kind);
        let mut tool_calls_made = 0;
        let mut usage = TokenUsage::default();
        let mut reply = None;

        for iteration in 0..self.deps.config.max_tool_iterations {
            let prompt = system_prompt(&*self.session.lock().await);
            let reasoning = Reasoning::new(Arc::clone(&self.deps.llm)).with_system_prompt(prompt);
            let context = ReasoningContext::new()
                .with_messages(self.history.clone())
                .with_tools(tools.clone());

            let output = reasoning.respond_with_tools(&context).await?;
            usage.add(&output.usage);
            match output.result {
                RespondResult::Text(text) => {
                    self.history.push(ChatMessage::assistant(text.as_str()));
                    reply = Some(text);
                    break;
                }
                RespondResult::ToolCalls {
                    tool_calls,
                    content,
                } => {
                    tracing::debug!(
                        session = %self.key,
                        iteration,
                        count = tool_calls.len(),
                        "Model requested tool calls"
                    );
                    self.history
                        .push(ChatMessage::assistant_with_tool_calls(content, tool_calls.clone()));

                    for tc in tool_calls {
                        let result = {
                            let mut session = self.session.lock().await;
                            self.deps
                                .commands
                                .execute(&mut session, &tc.name, &tc.arguments)
                                .await
                        };
                        let result_content = match result {
                            Ok(output) => output.to_content(),
                            Err(e) => {
                                tracing::warn!(session = %self.key, tool = %tc.name, "Tool call failed: {}", e);
                                format!("Error: {}", e)
                            }
                        };
                        self.history
                            .push(ChatMessage::tool_result(&tc.id, &tc.name, result_content));
                        tool_calls_made += 1;
                    }
                }
            }
        }

        let reply = reply.unwrap_or_else(|| {
            tracing::warn!(
                session = %self.key,
                max = self.deps.config.max_tool_iterations,
                "Tool iteration limit reached without a reply"
            );
            self.history.push(ChatMessage::assistant(FALLBACK_REPLY));
            FALLBACK_REPLY.to_string()
        });

        tracing::debug!(
            session = %self.key,
            tool_calls = tool_calls_made,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total(),
            "Turn finished"
        );
        self.deps.sessions.persist(&self.key).await;

        let completed = {
            let session = self.session.lock().await;
            if !was_complete && session.is_complete() {
                session.finalized().cloned()
            } else {
                None
            }
        };

        Ok(TurnOutcome {
            reply,
            tool_calls: tool_calls_made,
            completed,
        })
    }

    /// Move on to the next experience for the same user.
    ///
    /// Returns `false` unless the current event record is complete.
    pub async fn start_next_event(&mut self) -> bool {
        let next = {
            let session = self.session.lock().await;
            let n = session.meta().sequence_number + 1;
            session.next_event(format!("{}-experience_{n}", self.base_session_id))
        };
        let Some(next) = next else {
            return false;
        };

        tracing::info!(
            session = %next.key(),
            event_number = next.meta().sequence_number,
            "Starting next experience"
        );
        self.key = next.key().clone();
        self.session = self.deps.sessions.insert(next).await;
        self.history.clear();
        self.deps.sessions.persist(&self.key).await;
        true
    }

    /// Run the console loop until the user quits, input ends, or the record is
    /// finalized. Returns every record finalized along the way.
    pub async fn run(&mut self, channel: &mut dyn Channel) -> Result<Vec<FinalizedRecord>, Error> {
        let mut finalized = Vec::new();

        {
            let session = self.session.lock().await;
            if let Some(record) = session.finalized() {
                channel
                    .notice("This record was already confirmed in an earlier session.")
                    .await?;
                channel.notice(&format_summary(record)).await?;
                return Ok(finalized);
            }
        }

        let opening = self.greeting().await;
        channel.respond(&opening).await?;

        while let Some(line) = channel.read_line().await? {
            let content = match SubmissionParser::parse(&line) {
                Submission::Quit => {
                    channel.respond(FAREWELL).await?;
                    break;
                }
                Submission::Empty => continue,
                Submission::UserInput { content } => content,
            };

            let outcome = match self.handle_message(&content).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(session = %self.key, "Turn failed: {}", e);
                    channel
                        .respond(&format!("Sorry, something went wrong: {e}"))
                        .await?;
                    continue;
                }
            };
            channel.respond(&outcome.reply).await?;

            let Some(record) = outcome.completed else {
                continue;
            };
            channel.notice(&format_summary(&record)).await?;
            let kind = record.kind;
            finalized.push(record);

            if kind == RecordKind::Profile || !self.offer_next_event(channel).await? {
                channel.respond(FAREWELL).await?;
                break;
            }
        }

        Ok(finalized)
    }

    /// Ask whether the user wants to share another experience and switch to a
    /// fresh record if they agree.
    async fn offer_next_event(&mut self, channel: &mut dyn Channel) -> Result<bool, Error> {
        channel
            .respond("Thank you for sharing that. Would you like to tell me about another experience?")
            .await?;
        let Some(answer) = channel.read_line().await? else {
            return Ok(false);
        };
        if !self.deps.commands.matcher().is_confirmation(&answer) || !self.start_next_event().await {
            return Ok(false);
        }
        let opening = self.greeting().await;
        channel.respond(&opening).await?;
        Ok(true)
    }
}

/// Render a finalized record with display labels.
pub fn format_summary(record: &FinalizedRecord) -> String {
    let title = match record.kind {
        RecordKind::Profile => "Final Profile Summary".to_string(),
        RecordKind::Event => format!("Experience {} Summary", record.sequence_number),
    };
    let mut out = format!("\n=== {title} ===\n");
    for (label, value) in record.summary_lines() {
        out.push_str(&format!("{label}: {value}\n"));
    }
    out
}
