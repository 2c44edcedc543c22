//! CoachSession — the strongly typed state owned by one conversation.
//!
//! Holds the visible record, a retained memory copy that survives state loss
//! between turns, the confirmation phase, and the finalized snapshot once the
//! user has confirmed.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confirm::ConfirmationMatcher;
use super::model::{merge, FieldUpdate, FieldValue, FinalizedRecord, Record, RecordKind, UserProfile};
use super::state::ConfirmationPhase;

/// Identity of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

/// Identifying metadata carried into the finalized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    pub sequence_number: u32,
    pub phase_label: String,
}

impl RecordMeta {
    fn for_kind(kind: RecordKind, sequence_number: u32) -> Self {
        let phase_label = match kind {
            RecordKind::Profile => "Gather profile information".to_string(),
            RecordKind::Event => format!("Gather information for experience_{sequence_number}"),
        };
        Self {
            id: Uuid::new_v4(),
            sequence_number,
            phase_label,
        }
    }
}

/// Result of `present_summary`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutput {
    pub status: ConfirmationPhase,
    pub collected_data: BTreeMap<String, FieldValue>,
    pub missing_fields: Vec<String>,
    pub message: String,
}

/// Status reported by `check_completeness`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessStatus {
    Complete,
    Incomplete,
    AwaitingConfirmation,
}

/// Result of `check_completeness`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletenessReport {
    pub status: CompletenessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_record: Option<FinalizedRecord>,
    pub message: String,
    /// True only on the call that moved the record to Complete.
    #[serde(skip)]
    pub newly_completed: bool,
}

impl CompletenessReport {
    fn incomplete(missing: Vec<&'static str>) -> Self {
        Self {
            status: CompletenessStatus::Incomplete,
            message: format!("Still need: {}", missing.join(", ")),
            missing_fields: Some(missing.into_iter().map(String::from).collect()),
            finalized_record: None,
            newly_completed: false,
        }
    }

    fn awaiting(message: &str) -> Self {
        Self {
            status: CompletenessStatus::AwaitingConfirmation,
            missing_fields: Some(Vec::new()),
            finalized_record: None,
            message: message.to_string(),
            newly_completed: false,
        }
    }

    fn complete(record: FinalizedRecord, newly_completed: bool) -> Self {
        Self {
            status: CompletenessStatus::Complete,
            missing_fields: None,
            finalized_record: Some(record),
            message: "All required data collected successfully!".to_string(),
            newly_completed,
        }
    }
}

/// State for one coaching conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachSession {
    key: SessionKey,
    record: Record,
    memory: Record,
    meta: RecordMeta,
    phase: ConfirmationPhase,
    /// Number of user messages observed so far.
    user_turn: u64,
    last_user_message: Option<String>,
    /// User turn during which the summary was last presented.
    summary_turn: Option<u64>,
    completed: bool,
    finalized: Option<FinalizedRecord>,
    /// Completed profile the event coach was seeded with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<UserProfile>,
}

impl CoachSession {
    /// Empty profile session.
    pub fn profile(key: SessionKey) -> Self {
        Self::new(key, RecordKind::Profile, 1, None)
    }

    /// Empty event session for experience `event_number`, seeded with the
    /// user's completed profile.
    pub fn event(key: SessionKey, event_number: u32, profile: Option<UserProfile>) -> Self {
        Self::new(key, RecordKind::Event, event_number.max(1), profile)
    }

    fn new(
        key: SessionKey,
        kind: RecordKind,
        sequence_number: u32,
        profile: Option<UserProfile>,
    ) -> Self {
        Self {
            key,
            record: Record::new(kind),
            memory: Record::new(kind),
            meta: RecordMeta::for_kind(kind, sequence_number),
            phase: ConfirmationPhase::Collecting,
            user_turn: 0,
            last_user_message: None,
            summary_turn: None,
            completed: false,
            finalized: None,
            profile,
        }
    }

    /// Seed known values (e.g. a name and age passed on the command line).
    pub fn with_seed<'a, I>(mut self, seed: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.record.set_fields(seed);
        self.memory = merge(&self.memory, &self.record);
        self
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn kind(&self) -> RecordKind {
        self.record.kind
    }

    /// The externally visible record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The retained memory copy.
    pub fn memory(&self) -> &Record {
        &self.memory
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn phase(&self) -> ConfirmationPhase {
        self.phase
    }

    pub fn seed_profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Session-level completion flag. Never reverts once set.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn finalized(&self) -> Option<&FinalizedRecord> {
        self.finalized.as_ref()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.last_user_message.as_deref()
    }

    /// Record the user's message for this turn. Confirmation is judged against
    /// the most recent message only.
    pub fn observe_user_message(&mut self, text: &str) {
        self.user_turn += 1;
        self.last_user_message = Some(text.trim().to_string());
    }

    /// Set one field and return the status line for the model.
    pub fn set_field(&mut self, name: &str, value: &str) -> String {
        if let Some(msg) = self.reject_if_complete() {
            return msg;
        }

        let before = merge(&self.memory, &self.record);
        let mut working = before.clone();
        let update = working.set_field(name, value);
        match &update {
            FieldUpdate::Applied { field, value } => {
                tracing::debug!(session = %self.key, field = %field, value = %value, "Field updated");
            }
            FieldUpdate::Rejected { field, .. } => {
                tracing::warn!(session = %self.key, field = %field, "Rejected unknown field");
            }
            FieldUpdate::Ignored { field } => {
                tracing::debug!(session = %self.key, field = %field, "Ignored empty value");
            }
        }
        // Re-sending a value already held is not new data
        let changed = update.is_applied() && working != before;
        self.commit(working, changed);
        update.message()
    }

    /// Set several fields and return the status line for the model.
    pub fn set_fields(&mut self, updates: &BTreeMap<String, String>) -> String {
        if let Some(msg) = self.reject_if_complete() {
            return msg;
        }

        let before = merge(&self.memory, &self.record);
        let mut working = before.clone();
        let batch = working.set_fields(updates.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        tracing::debug!(
            session = %self.key,
            applied = ?batch.applied,
            rejected = ?batch.rejected,
            "Multiple fields updated"
        );
        let changed = working != before;
        self.commit(working, changed);

        let mut message = format!("Updated multiple fields: [{}]", batch.applied.join(", "));
        if !batch.rejected.is_empty() {
            message.push_str(&format!(
                ". Ignored unknown fields: [{}]. Valid fields: {}",
                batch.rejected.join(", "),
                self.kind().required_fields().join(", ")
            ));
        }
        message
    }

    /// Merge an externally supplied partial record into the session, writing
    /// the result back into both the visible record and memory.
    pub fn merge_incoming(&mut self, incoming: &Record) -> &Record {
        if self.completed {
            tracing::debug!(session = %self.key, "Ignoring merge into finalized record");
            return &self.record;
        }
        let merged = merge(&self.memory, &merge(&self.record, incoming));
        let changed = merged != self.record;
        self.commit(merged, changed);
        &self.record
    }

    /// Show the collected data and wait for the user's confirmation.
    pub fn present_summary(&mut self) -> SummaryOutput {
        self.record = merge(&self.memory, &self.record);

        if self.phase.is_terminal() {
            let data = self
                .finalized
                .as_ref()
                .map(|f| f.fields.clone())
                .unwrap_or_default();
            return SummaryOutput {
                status: ConfirmationPhase::Complete,
                collected_data: data,
                missing_fields: Vec::new(),
                message: "This record is already confirmed and saved.".to_string(),
            };
        }

        self.transition(ConfirmationPhase::AwaitingConfirmation);
        self.summary_turn = Some(self.user_turn);

        let missing: Vec<String> = self
            .record
            .missing_fields()
            .into_iter()
            .map(String::from)
            .collect();
        let message = if missing.is_empty() {
            "Please confirm if this information is correct".to_string()
        } else {
            format!(
                "Please confirm if this information is correct. Still missing: {}",
                missing.join(", ")
            )
        };

        SummaryOutput {
            status: self.phase,
            collected_data: self.record.fields().clone(),
            missing_fields: missing,
            message,
        }
    }

    /// Check whether the record can be finalized and finalize it if the user
    /// has confirmed the summary.
    pub fn check_completeness(&mut self, matcher: &ConfirmationMatcher) -> CompletenessReport {
        if let Some(ref finalized) = self.finalized {
            return CompletenessReport::complete(finalized.clone(), false);
        }

        self.record = merge(&self.memory, &self.record);
        let missing = self.record.missing_fields();
        if !missing.is_empty() {
            return CompletenessReport::incomplete(missing);
        }

        if self.phase != ConfirmationPhase::AwaitingConfirmation {
            return CompletenessReport::awaiting(
                "All fields collected. Present the summary and ask the user to confirm first.",
            );
        }

        let confirmed_after_summary = self
            .summary_turn
            .is_some_and(|turn| self.user_turn > turn);
        let affirmative = self
            .last_user_message
            .as_deref()
            .is_some_and(|msg| matcher.is_confirmation(msg));
        if !(confirmed_after_summary && affirmative) {
            return CompletenessReport::awaiting(
                "Waiting for the user to explicitly confirm the summary.",
            );
        }

        let finalized = self.finalize();
        CompletenessReport::complete(finalized, true)
    }

    /// Start the next experience for the same user as a fresh session.
    ///
    /// Only valid once this event record is complete; the finished snapshot is
    /// left untouched.
    pub fn next_event(&self, session_id: impl Into<String>) -> Option<CoachSession> {
        if self.kind() != RecordKind::Event || !self.completed {
            return None;
        }
        Some(CoachSession::event(
            SessionKey::new(self.key.user_id.clone(), session_id),
            self.meta.sequence_number + 1,
            self.profile.clone(),
        ))
    }

    fn finalize(&mut self) -> FinalizedRecord {
        let finalized = FinalizedRecord {
            id: self.meta.id,
            kind: self.kind(),
            sequence_number: self.meta.sequence_number,
            phase_label: self.meta.phase_label.clone(),
            user_id: self.key.user_id.clone(),
            session_id: self.key.session_id.clone(),
            fields: self.record.fields().clone(),
            is_complete: true,
            completed_at: Utc::now(),
        };
        self.transition(ConfirmationPhase::Complete);
        self.completed = true;
        self.finalized = Some(finalized.clone());
        tracing::info!(
            session = %self.key,
            kind = %finalized.kind,
            record_id = %finalized.id,
            "Record confirmed and finalized"
        );
        finalized
    }

    /// Write `working` back into both the record and memory. New data sends an
    /// awaiting record back to collecting.
    fn commit(&mut self, working: Record, changed: bool) {
        self.memory = merge(&self.memory, &working);
        self.record = working;
        if changed && self.phase == ConfirmationPhase::AwaitingConfirmation {
            self.transition(ConfirmationPhase::Collecting);
            self.summary_turn = None;
        }
    }

    fn transition(&mut self, target: ConfirmationPhase) {
        if self.phase == target && target != ConfirmationPhase::AwaitingConfirmation {
            return;
        }
        if !self.phase.can_transition_to(target) {
            tracing::warn!(
                session = %self.key,
                from = %self.phase,
                to = %target,
                "Invalid confirmation transition"
            );
            return;
        }
        tracing::debug!(session = %self.key, from = %self.phase, to = %target, "Phase transition");
        self.phase = target;
    }

    fn reject_if_complete(&self) -> Option<String> {
        self.completed.then(|| {
            "This record is already confirmed and saved; start a new record to make changes."
                .to_string()
        })
    }
}
