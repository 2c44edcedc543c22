//! Agent module — the coach turn loop and console input handling.

pub mod coach;
pub mod submission;

pub use coach::{CoachAgent, CoachDeps, TurnOutcome, format_summary};
pub use submission::{Submission, SubmissionParser};
