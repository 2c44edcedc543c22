//! Record tracker — the structured data a coaching conversation collects.
//!
//! A session gathers one profile or one life event field by field. The model
//! fills fields through tool calls, presents a summary, and the record is
//! finalized only after the user explicitly confirms it. Finalized snapshots
//! never change afterwards.

pub mod confirm;
pub mod model;
pub mod prompts;
pub mod session;
pub mod state;

pub use confirm::ConfirmationMatcher;
pub use model::{
    EventDetails, FieldUpdate, FieldValue, FinalizedRecord, Record, RecordKind, UserProfile, merge,
};
pub use session::{CoachSession, CompletenessReport, CompletenessStatus, SessionKey, SummaryOutput};
pub use state::ConfirmationPhase;
