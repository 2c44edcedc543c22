//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tracker::{FieldValue, FinalizedRecord, RecordKind};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn kind_to_str(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Profile => "profile",
        RecordKind::Event => "event",
    }
}

fn str_to_kind(s: &str) -> Result<RecordKind, DatabaseError> {
    match s {
        "profile" => Ok(RecordKind::Profile),
        "event" => Ok(RecordKind::Event),
        other => Err(DatabaseError::Serialization(format!(
            "unknown record kind '{other}'"
        ))),
    }
}

const RECORD_COLUMNS: &str =
    "id, user_id, session_id, kind, sequence_number, phase_label, fields, completed_at";

/// Map a libsql Row to a FinalizedRecord.
///
/// Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<FinalizedRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("read finalized record: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let user_id: String = row.get(1).map_err(read)?;
    let session_id: String = row.get(2).map_err(read)?;
    let kind_str: String = row.get(3).map_err(read)?;
    let sequence_number: i64 = row.get(4).map_err(read)?;
    let phase_label: String = row.get(5).map_err(read)?;
    let fields_json: String = row.get(6).map_err(read)?;
    let completed_str: String = row.get(7).map_err(read)?;

    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&fields_json)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    Ok(FinalizedRecord {
        id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        kind: str_to_kind(&kind_str)?,
        sequence_number: u32::try_from(sequence_number).unwrap_or_default(),
        phase_label,
        user_id,
        session_id,
        fields,
        is_complete: true,
        completed_at: parse_datetime(&completed_str),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Finalized records ───────────────────────────────────────────

    async fn save_finalized_record(&self, record: &FinalizedRecord) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let fields_json = serde_json::to_string(&record.fields)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT OR IGNORE INTO finalized_records
                (id, user_id, session_id, kind, sequence_number, phase_label, fields, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.user_id.as_str(),
                record.session_id.as_str(),
                kind_to_str(record.kind),
                i64::from(record.sequence_number),
                record.phase_label.as_str(),
                fields_json,
                record.completed_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_finalized_record: {e}")))?;

        debug!(id = %record.id, kind = %record.kind, user = %record.user_id, "Finalized record saved");
        Ok(())
    }

    async fn get_finalized_record(
        &self,
        id: Uuid,
    ) -> Result<Option<FinalizedRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM finalized_records WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_finalized_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_finalized_record: {e}"))),
        }
    }

    async fn list_finalized_records(
        &self,
        user_id: &str,
        kind: Option<RecordKind>,
    ) -> Result<Vec<FinalizedRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = match kind {
            Some(kind) => conn
                .query(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM finalized_records
                         WHERE user_id = ?1 AND kind = ?2
                         ORDER BY completed_at ASC, sequence_number ASC"
                    ),
                    params![user_id, kind_to_str(kind)],
                )
                .await,
            None => conn
                .query(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM finalized_records
                         WHERE user_id = ?1
                         ORDER BY completed_at ASC, sequence_number ASC"
                    ),
                    params![user_id],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("list_finalized_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_finalized_records: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, key, value_str, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_record(user: &str, kind: RecordKind, seq: u32) -> FinalizedRecord {
        let mut fields = BTreeMap::new();
        match kind {
            RecordKind::Profile => {
                fields.insert("name".to_string(), FieldValue::Text("Sarah".into()));
                fields.insert("age".to_string(), FieldValue::Integer(28));
            }
            RecordKind::Event => {
                fields.insert("event_overview".to_string(), FieldValue::Text("trip".into()));
                fields.insert("peak_moment".to_string(), FieldValue::Text("summit".into()));
            }
        }
        FinalizedRecord {
            id: Uuid::new_v4(),
            kind,
            sequence_number: seq,
            phase_label: format!("Gather information for experience_{seq}"),
            user_id: user.to_string(),
            session_id: "s1".to_string(),
            fields,
            is_complete: true,
            completed_at: Utc::now(),
        }
    }

    // ── Finalized record tests ──────────────────────────────────────

    #[tokio::test]
    async fn save_and_get_finalized_record() {
        let db = test_db().await;
        let record = make_record("user1", RecordKind::Profile, 1);
        db.save_finalized_record(&record).await.unwrap();

        let fetched = db.get_finalized_record(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.kind, RecordKind::Profile);
        assert_eq!(fetched.get("age"), Some(&FieldValue::Integer(28)));
        assert_eq!(fetched.get("name").unwrap().as_text(), Some("Sarah"));
        assert!(fetched.is_complete);
        assert_eq!(
            fetched.completed_at.timestamp(),
            record.completed_at.timestamp()
        );
    }

    #[tokio::test]
    async fn get_missing_record_is_none() {
        let db = test_db().await;
        assert!(db.get_finalized_record(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_twice_keeps_first_snapshot() {
        let db = test_db().await;
        let record = make_record("user1", RecordKind::Event, 1);
        db.save_finalized_record(&record).await.unwrap();

        let mut changed = record.clone();
        changed
            .fields
            .insert("peak_moment".to_string(), FieldValue::Text("other".into()));
        db.save_finalized_record(&changed).await.unwrap();

        let fetched = db.get_finalized_record(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.get("peak_moment").unwrap().as_text(), Some("summit"));
    }

    #[tokio::test]
    async fn list_filters_by_user_and_kind() {
        let db = test_db().await;
        db.save_finalized_record(&make_record("user1", RecordKind::Profile, 1))
            .await
            .unwrap();
        db.save_finalized_record(&make_record("user1", RecordKind::Event, 1))
            .await
            .unwrap();
        db.save_finalized_record(&make_record("user1", RecordKind::Event, 2))
            .await
            .unwrap();
        db.save_finalized_record(&make_record("user2", RecordKind::Event, 1))
            .await
            .unwrap();

        let all = db.list_finalized_records("user1", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let events = db
            .list_finalized_records("user1", Some(RecordKind::Event))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|r| r.kind == RecordKind::Event));

        let none = db.list_finalized_records("nobody", None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coach.db");
        let record = make_record("user1", RecordKind::Profile, 1);
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.save_finalized_record(&record).await.unwrap();
        }
        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        let fetched = reopened.get_finalized_record(record.id).await.unwrap();
        assert!(fetched.is_some());
    }

    // ── Settings tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn settings_crud() {
        let db = test_db().await;
        let value = serde_json::json!({"phase": "collecting", "user_turn": 2});

        db.set_setting("user1", "coach_session:s1", &value)
            .await
            .unwrap();

        let fetched = db
            .get_setting("user1", "coach_session:s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["phase"], "collecting");

        let updated = serde_json::json!({"phase": "complete"});
        db.set_setting("user1", "coach_session:s1", &updated)
            .await
            .unwrap();
        let fetched2 = db
            .get_setting("user1", "coach_session:s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched2["phase"], "complete");
        assert!(db.get_setting("user1", "coach_session:s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_user_isolation() {
        let db = test_db().await;

        db.set_setting("user1", "key", &serde_json::json!("val1"))
            .await
            .unwrap();
        db.set_setting("user2", "key", &serde_json::json!("val2"))
            .await
            .unwrap();

        let v1 = db.get_setting("user1", "key").await.unwrap().unwrap();
        let v2 = db.get_setting("user2", "key").await.unwrap().unwrap();
        assert_eq!(v1, "val1");
        assert_eq!(v2, "val2");
    }
}
