//! Command registry — dispatches parsed commands against a session.

use std::sync::Arc;
use std::time::Instant;

use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::store::Database;
use crate::tools::command::CoachCommand;
use crate::tools::tool::ToolOutput;
use crate::tracker::{CoachSession, ConfirmationMatcher, RecordKind};

/// Executes coach commands and hands newly finalized records to persistence.
pub struct CommandRegistry {
    matcher: ConfirmationMatcher,
    db: Option<Arc<dyn Database>>,
}

impl CommandRegistry {
    /// Registry with the default confirmation phrases and no persistence.
    pub fn new() -> Self {
        Self {
            matcher: ConfirmationMatcher::default_phrases(),
            db: None,
        }
    }

    /// Save finalized records to `db`.
    pub fn with_database(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn matcher(&self) -> &ConfirmationMatcher {
        &self.matcher
    }

    /// Get tool definitions for LLM function calling.
    pub fn tool_definitions(&self, kind: RecordKind) -> Vec<ToolDefinition> {
        CoachCommand::definitions(kind)
    }

    /// Parse and run a raw tool call.
    pub async fn execute(
        &self,
        session: &mut CoachSession,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let command = CoachCommand::parse(name, params)?;
        self.dispatch(session, command).await
    }

    /// Run a typed command.
    pub async fn dispatch(
        &self,
        session: &mut CoachSession,
        command: CoachCommand,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = command.name();
        tracing::debug!(session = %session.key(), tool = name, "Dispatching command");

        match command {
            CoachCommand::UpdateField {
                field_name,
                field_value,
            } => {
                let message = session.set_field(&field_name, &field_value);
                Ok(ToolOutput::text(message, start.elapsed()))
            }
            CoachCommand::UpdateMultipleFields { updates } => {
                let message = session.set_fields(&updates);
                Ok(ToolOutput::text(message, start.elapsed()))
            }
            CoachCommand::PresentSummary => {
                let summary = session.present_summary();
                let value = serde_json::to_value(&summary).map_err(|e| execution_failed(name, e))?;
                Ok(ToolOutput::success(value, start.elapsed()))
            }
            CoachCommand::CheckCompleteness => {
                let report = session.check_completeness(&self.matcher);
                if report.newly_completed
                    && let Some(record) = report.finalized_record.as_ref()
                {
                    self.save(record).await;
                }
                let value = serde_json::to_value(&report).map_err(|e| execution_failed(name, e))?;
                Ok(ToolOutput::success(value, start.elapsed()))
            }
        }
    }

    async fn save(&self, record: &crate::tracker::FinalizedRecord) {
        let Some(db) = self.db.as_ref() else {
            return;
        };
        match db.save_finalized_record(record).await {
            Ok(()) => tracing::info!(
                record_id = %record.id,
                kind = %record.kind,
                user = %record.user_id,
                "Finalized record persisted"
            ),
            Err(e) => tracing::warn!(record_id = %record.id, "Failed to persist finalized record: {}", e),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn execution_failed(name: &str, e: serde_json::Error) -> ToolError {
    ToolError::ExecutionFailed {
        name: name.to_string(),
        reason: e.to_string(),
    }
}
