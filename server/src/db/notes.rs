//! Note storage backends.
//!
//! Both backends apply the engine's last-write-wins rule on every write, so a
//! client holding an older copy can never overwrite a newer one.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notesync_engine::{resolve, MergeDecision, MergePolicy, Origin, Record};
use sqlx::{PgPool, Row};

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The note was newer and is now stored
    Stored,
    /// The exact same version was already stored
    Unchanged,
    /// A winning version is stored; it is returned
    Rejected(Record),
}

/// Storage for the remote copy of every note.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// All notes ordered by key.
    async fn list(&self) -> Result<Vec<Record>>;

    /// Store `record` if it wins over the stored copy.
    async fn put_if_newer(&self, record: Record) -> Result<PutOutcome>;

    /// Remove a note. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Classify a write that did not replace `current`.
fn not_stored(current: Record, incoming: &Record) -> PutOutcome {
    if current.same_version(incoming) {
        PutOutcome::Unchanged
    } else {
        PutOutcome::Rejected(current)
    }
}

/// Notes held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryNoteRepository {
    notes: DashMap<String, Record>,
}

impl MemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteRepository for MemoryNoteRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.notes.get(key).map(|note| note.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let mut notes: Vec<Record> = self.notes.iter().map(|n| n.value().clone()).collect();
        notes.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(notes)
    }

    async fn put_if_newer(&self, record: Record) -> Result<PutOutcome> {
        match self.notes.entry(record.key().to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(PutOutcome::Stored)
            }
            Entry::Occupied(mut entry) => {
                let decision = resolve(
                    Some(entry.get()),
                    &record,
                    Origin::Remote,
                    MergePolicy::default(),
                );
                if decision == MergeDecision::Newer {
                    entry.insert(record);
                    Ok(PutOutcome::Stored)
                } else {
                    Ok(not_stored(entry.get().clone(), &record))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.notes.remove(key).is_some())
    }
}

/// A stored note row from the database.
#[derive(Debug)]
struct StoredNote {
    key: String,
    content: String,
    updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredNote {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredNote {
            key: row.try_get("key")?,
            content: row.try_get("content")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredNote {
    /// Convert a database row to an engine record.
    fn into_record(self) -> Record {
        Record::from_parts(self.key, self.content, self.updated_at.max(0) as u64)
    }
}

/// Notes persisted in the `notes` table.
#[derive(Debug, Clone)]
pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let row = sqlx::query_as::<_, StoredNote>(
            "SELECT key, content, updated_at FROM notes WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredNote::into_record))
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query_as::<_, StoredNote>(
            "SELECT key, content, updated_at FROM notes ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredNote::into_record).collect())
    }

    async fn put_if_newer(&self, record: Record) -> Result<PutOutcome> {
        let updated_at = i64::try_from(record.updated_at())
            .map_err(|_| AppError::BadRequest("updatedAt out of range".to_string()))?;

        // The WHERE clause keeps the row when the stored copy wins.
        let result = sqlx::query(
            r#"
            INSERT INTO notes (key, content, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                content = EXCLUDED.content,
                updated_at = EXCLUDED.updated_at
            WHERE notes.updated_at < EXCLUDED.updated_at
            "#,
        )
        .bind(record.key())
        .bind(record.content())
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(PutOutcome::Stored);
        }

        match self.get(record.key()).await? {
            Some(current) => Ok(not_stored(current, &record)),
            None => Err(AppError::Internal(format!(
                "note '{}' was deleted during write",
                record.key()
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
