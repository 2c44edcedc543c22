//! System prompts and greetings for the two coaches.
//!
//! The prompt is rebuilt from the session before every model call so the
//! "current status" block always reflects what the tracker actually holds.

use super::model::{RecordKind, UserProfile};
use super::session::CoachSession;
use super::state::ConfirmationPhase;

const NOT_PROVIDED: &str = "Not provided";

/// Build the system prompt for the session's record kind.
pub fn system_prompt(session: &CoachSession) -> String {
    match session.kind() {
        RecordKind::Profile => profile_prompt(session),
        RecordKind::Event => event_prompt(session),
    }
}

fn status_block(session: &CoachSession) -> String {
    let kind = session.kind();
    let record = session.record();
    let mut lines = Vec::with_capacity(kind.required_fields().len() + 2);
    for field in kind.required_fields() {
        let value = record
            .get(field)
            .map(|v| v.to_string())
            .unwrap_or_else(|| NOT_PROVIDED.to_string());
        lines.push(format!("- {}: {value}", kind.field_label(field)));
    }

    let missing = record.missing_fields();
    if missing.is_empty() {
        lines.push("All fields collected.".to_string());
    } else {
        lines.push(format!("Still missing: {}", missing.join(", ")));
    }

    let phase_line = match session.phase() {
        ConfirmationPhase::Collecting => "Status: collecting information.",
        ConfirmationPhase::AwaitingConfirmation => {
            "Status: summary shown, waiting for the user to confirm."
        }
        ConfirmationPhase::Complete => "Status: confirmed and saved. Do not change anything.",
    };
    lines.push(phase_line.to_string());
    lines.join("\n")
}

const SHARED_RULES: &str = "\
RULES:
- Ask ONE question at a time and keep replies to 1-3 sentences.
- When the user shares several details in one message, record all of them with \
update_multiple_fields in a single call.
- Only record what the user actually said. Never guess or fill in a field on \
their behalf. \"I work in tech\" is too vague to be an occupation; ask what \
they do.
- If an answer is vague, ask a short follow-up before recording it.
- When every field is filled, call present_summary and ask the user to confirm.
- Only after the user explicitly confirms (\"yes\", \"correct\", \"looks good\") \
call check_completeness. If they want changes, update the field and present \
the summary again.
- Never call check_completeness to skip the summary.";

fn profile_prompt(session: &CoachSession) -> String {
    format!(
        "\
You are a friendly career coach getting to know a new client before your \
self-analysis sessions begin.

GOAL: collect the client's profile:
- name: what they like to be called
- age: their age
- current_occupation: what they do now
- desired_career: the career they want to move toward
- work_experience: a short summary of their work history

CURRENT PROFILE:
{status}

{SHARED_RULES}

TOOLS:
- update_field(field_name, field_value): record one field
- update_multiple_fields(updates): record several fields at once
- present_summary(): show everything collected and ask for confirmation
- check_completeness(): finalize after the user confirms

EXAMPLE:
User: \"I'm Sarah, 28, and I've been a nurse for five years.\"
You: call update_multiple_fields with name, age, current_occupation, \
work_experience, then ask what career she'd like to move into.",
        status = status_block(session),
    )
}

fn event_prompt(session: &CoachSession) -> String {
    let number = session.meta().sequence_number;
    let profile = session
        .seed_profile()
        .map(|p| format!("\n\n{}", p.to_system_prompt_section()))
        .unwrap_or_default();
    let prior = if number > 1 {
        format!(
            "\n\nThe user has already shared {} experience{} with you. Briefly \
acknowledge that before moving on to this one.",
            number - 1,
            if number == 2 { "" } else { "s" }
        )
    } else {
        String::new()
    };

    format!(
        "\
You are an empathetic self-analysis coach. You are helping the user revisit \
a meaningful experience from their life so they can understand what drives \
them. Listen warmly, reflect what you hear, and never rush.

STAGE: {stage}{profile}{prior}

GOAL: collect these details about experience {number}:
- event_overview: a one-line description of the experience
- when_happened: when it happened (a year, an age, or a life stage)
- what_happened: what the user did and what happened
- peak_moment: the moment that felt most meaningful to them

CURRENT EXPERIENCE:
{status}

{SHARED_RULES}

TOOLS:
- update_field(field_name, field_value): record one field
- update_multiple_fields(updates): record several fields at once
- present_summary(): show everything collected and ask for confirmation
- check_completeness(): finalize after the user confirms

EXAMPLE:
User: \"In 2019 I hiked the Alps with my brother.\"
You: call update_multiple_fields with event_overview and when_happened, then \
ask what the trip was like.",
        stage = session.meta().phase_label,
        status = status_block(session),
    )
}

/// Opening line shown before the first user message.
pub fn greeting(session: &CoachSession) -> String {
    match session.kind() {
        RecordKind::Profile => profile_greeting(session),
        RecordKind::Event => event_greeting(session.seed_profile(), session.meta().sequence_number),
    }
}

fn profile_greeting(session: &CoachSession) -> String {
    let record = session.record();
    let name = record.get("name").map(|v| v.to_string());
    let age = record.get("age").map(|v| v.to_string());
    match (name, age) {
        (Some(name), Some(age)) => format!(
            "Hi {name}! I see you're {age}. I'd love to hear about your work. \
What do you do right now?"
        ),
        (Some(name), None) => format!("Hi {name}! Before we start, how old are you?"),
        (None, Some(_)) => "Hi there! Before we start, what should I call you?".to_string(),
        (None, None) => {
            "Hi! I'm your career coach. Let's get to know each other. What's your name?"
                .to_string()
        }
    }
}

fn event_greeting(profile: Option<&UserProfile>, number: u32) -> String {
    let name = profile
        .and_then(|p| p.name.as_deref())
        .map(|n| format!(" {n}"))
        .unwrap_or_default();
    if number > 1 {
        format!(
            "Welcome back{name}. Thank you for the experiences you've shared so far. \
Is there another moment in your life that stands out to you?"
        )
    } else {
        format!(
            "Hi{name}. Let's look back at a moment in your life that mattered to you. \
What experience comes to mind first?"
        )
    }
}
