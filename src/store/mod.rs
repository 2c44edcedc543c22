//! Persistence layer — libSQL storage for finalized records and session state.

pub mod libsql_backend;
pub mod migrations;
pub mod sessions;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use sessions::{SessionHandle, SessionStore};
pub use traits::Database;
