//! Submission types for the console loop.

/// Parses a console line into a Submission.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse message content into a Submission.
    pub fn parse(content: &str) -> Submission {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "" => Submission::Empty,
            "exit" | "quit" | "bye" | "/quit" | "/exit" => Submission::Quit,
            _ => Submission::UserInput {
                content: trimmed.to_string(),
            },
        }
    }
}

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// End the session.
    Quit,
    /// Blank line, skipped.
    Empty,
    /// A message for the coach.
    UserInput { content: String },
}
