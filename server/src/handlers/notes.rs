//! Note handlers - read, conditionally write and delete remote notes.

use crate::db::{NoteRepository, PutOutcome};
use crate::error::{AppError, Result};
use notesync_engine::Record;

/// Fetch one note.
pub async fn handle_get(notes: &dyn NoteRepository, key: &str) -> Result<Record> {
    notes
        .get(key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("note '{}'", key)))
}

/// List every note ordered by key.
pub async fn handle_list(notes: &dyn NoteRepository) -> Result<Vec<Record>> {
    notes.list().await
}

/// Store `record` under `key` if it is newer than the stored copy.
///
/// Rewriting the exact stored version succeeds so that clients can retry a
/// publish whose answer was lost.
pub async fn handle_put(notes: &dyn NoteRepository, key: &str, record: Record) -> Result<Record> {
    if record.key() != key {
        return Err(AppError::BadRequest(format!(
            "note key '{}' does not match path '{}'",
            record.key(),
            key
        )));
    }
    if i64::try_from(record.updated_at()).is_err() {
        return Err(AppError::BadRequest("updatedAt out of range".to_string()));
    }

    match notes.put_if_newer(record.clone()).await? {
        PutOutcome::Stored => {
            tracing::debug!(key = %key, updated_at = record.updated_at(), "Stored note");
            Ok(record)
        }
        PutOutcome::Unchanged => Ok(record),
        PutOutcome::Rejected(current) => Err(AppError::Conflict(Box::new(current))),
    }
}

/// Delete one note.
pub async fn handle_delete(notes: &dyn NoteRepository, key: &str) -> Result<()> {
    if notes.delete(key).await? {
        tracing::debug!(key = %key, "Deleted note");
        Ok(())
    } else {
        Err(AppError::NotFound(format!("note '{}'", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryNoteRepository;

    #[tokio::test]
    async fn put_rejects_key_mismatch() {
        let notes = MemoryNoteRepository::new();
        let result = handle_put(&notes, "todo", Record::from_parts("other", "x", 1)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(notes.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_rejects_timestamps_beyond_storage_range() {
        let notes = MemoryNoteRepository::new();
        let result = handle_put(&notes, "todo", Record::from_parts("todo", "x", u64::MAX)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn stale_put_conflicts_with_current() {
        let notes = MemoryNoteRepository::new();
        let current = Record::from_parts("todo", "new", 200);
        handle_put(&notes, "todo", current.clone()).await.unwrap();

        match handle_put(&notes, "todo", Record::from_parts("todo", "old", 100)).await {
            Err(AppError::Conflict(winner)) => assert_eq!(*winner, current),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_and_delete_missing_note() {
        let notes = MemoryNoteRepository::new();

        assert!(matches!(
            handle_get(&notes, "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            handle_delete(&notes, "nope").await,
            Err(AppError::NotFound(_))
        ));
    }
}
