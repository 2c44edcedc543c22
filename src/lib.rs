//! Coach — conversational self-analysis coach with a confirmed record tracker.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod tools;
pub mod tracker;
