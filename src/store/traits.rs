//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tracker::{FinalizedRecord, RecordKind};

/// Backend-agnostic database trait covering finalized records and settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Finalized records ───────────────────────────────────────────

    /// Persist a finalized record. Saving the same id twice keeps the first
    /// snapshot.
    async fn save_finalized_record(&self, record: &FinalizedRecord) -> Result<(), DatabaseError>;

    /// Get a finalized record by id.
    async fn get_finalized_record(&self, id: Uuid)
    -> Result<Option<FinalizedRecord>, DatabaseError>;

    /// List a user's finalized records, oldest first, optionally filtered by kind.
    async fn list_finalized_records(
        &self,
        user_id: &str,
        kind: Option<RecordKind>,
    ) -> Result<Vec<FinalizedRecord>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a per-user JSON setting.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a per-user JSON setting.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;
}
