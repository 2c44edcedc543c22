//! Confirmation phrase matching.
//!
//! An utterance confirms a summary only when, after normalisation, it is made
//! up entirely of accepted phrases. "Yes!" and "yes, perfect" confirm;
//! "looks good thanks" does not.

use regex::Regex;

/// Phrases accepted as explicit agreement to finalize a record.
pub const DEFAULT_CONFIRMATION_PHRASES: &[&str] = &[
    "yes",
    "yep",
    "yeah",
    "correct",
    "thats correct",
    "thats right",
    "right",
    "looks good",
    "looks right",
    "all good",
    "confirmed",
    "confirm",
    "sounds good",
    "perfect",
    "absolutely",
    "exactly",
    "yes please",
];

/// Matches user utterances against a fixed confirmation phrase set.
#[derive(Debug, Clone)]
pub struct ConfirmationMatcher {
    /// Each phrase pre-split into normalised tokens.
    phrases: Vec<Vec<String>>,
    /// Anything that is not a letter, digit, or whitespace.
    punctuation: Regex,
}

impl ConfirmationMatcher {
    /// Matcher with the default phrase set.
    pub fn default_phrases() -> Self {
        let mut matcher = Self::empty();
        for phrase in DEFAULT_CONFIRMATION_PHRASES {
            matcher.add_phrase(phrase);
        }
        matcher
    }

    /// Matcher that accepts nothing (for testing).
    pub fn empty() -> Self {
        Self {
            phrases: Vec::new(),
            punctuation: Regex::new(r"[^\p{L}\p{N}\s]+").expect("static pattern"),
        }
    }

    /// Add an accepted phrase. Empty phrases are ignored.
    pub fn add_phrase(&mut self, phrase: &str) {
        let tokens = self.tokens(phrase);
        if !tokens.is_empty() && !self.phrases.contains(&tokens) {
            self.phrases.push(tokens);
        }
    }

    /// Whether `utterance` is an explicit confirmation.
    pub fn is_confirmation(&self, utterance: &str) -> bool {
        let tokens = self.tokens(utterance);
        if tokens.is_empty() {
            return false;
        }

        // covered[i]: tokens[i..] can be split into accepted phrases
        let n = tokens.len();
        let mut covered = vec![false; n + 1];
        covered[n] = true;
        for start in (0..n).rev() {
            covered[start] = self.phrases.iter().any(|phrase| {
                let end = start + phrase.len();
                end <= n && covered[end] && tokens[start..end] == phrase[..]
            });
        }
        covered[0]
    }

    /// Lowercase, drop apostrophes so "that's" and "thats" agree, and split on
    /// everything else that is not a word character.
    fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text
            .trim()
            .to_lowercase()
            .replace(['\'', '\u{2019}', '`'], "");
        self.punctuation
            .replace_all(&lowered, " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

impl Default for ConfirmationMatcher {
    fn default() -> Self {
        Self::default_phrases()
    }
}
