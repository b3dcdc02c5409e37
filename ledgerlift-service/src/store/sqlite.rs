//! SQLite-backed durable store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::{
    Document, DocumentId, DocumentPatch, DocumentStatus, NewDocument, NewStep, ProcessingStep,
    StepId, StepName, StepPatch, StepStatus,
};
use super::{DocumentStore, StoreResult};
use crate::error::StoreError;

/// Durable store behind the same contract as [`super::MemoryStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })?;
        }

        let conn = Connection::open(path).map_err(StoreError::Connection)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(StoreError::Query)?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Connection)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            original_size INTEGER NOT NULL,
            status TEXT NOT NULL,
            source_path TEXT,
            uploaded_at TEXT NOT NULL,
            completed_at TEXT,
            error_message TEXT,
            record_count INTEGER,
            artifact_ref TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);

        CREATE TABLE IF NOT EXISTS processing_steps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            step_name TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_steps_document ON processing_steps(document_id);
        "#,
    )
    .map_err(StoreError::Query)?;

    Ok(())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn document_from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let status: String = row.get(4)?;
    let uploaded_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;

    Ok(Document {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        filename: row.get(2)?,
        original_size: row.get(3)?,
        status: DocumentStatus::from_str(&status),
        source_path: row.get(5)?,
        uploaded_at: parse_timestamp(&uploaded_at),
        completed_at: completed_at.as_deref().map(parse_timestamp),
        error_message: row.get(8)?,
        record_count: row.get(9)?,
        artifact_ref: row.get(10)?,
    })
}

fn step_from_row(row: &Row<'_>) -> Result<ProcessingStep, rusqlite::Error> {
    let step_name: String = row.get(2)?;
    let status: String = row.get(3)?;
    let started_at: Option<String> = row.get(4)?;
    let completed_at: Option<String> = row.get(5)?;

    Ok(ProcessingStep {
        id: row.get(0)?,
        document_id: row.get(1)?,
        step_name: StepName::parse(&step_name).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown step name: {step_name}"),
                )),
            )
        })?,
        status: StepStatus::from_str(&status),
        started_at: started_at.as_deref().map(parse_timestamp),
        completed_at: completed_at.as_deref().map(parse_timestamp),
        error_message: row.get(6)?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, original_size, status, source_path, \
     uploaded_at, completed_at, error_message, record_count, artifact_ref";

const STEP_COLUMNS: &str =
    "id, document_id, step_name, status, started_at, completed_at, error_message";

impl DocumentStore for SqliteStore {
    fn create_document(&self, new: NewDocument) -> StoreResult<Document> {
        let conn = self.conn.lock().unwrap();
        let uploaded_at = Utc::now();

        conn.execute(
            "INSERT INTO documents (owner_id, filename, original_size, status, source_path, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.owner_id,
                new.filename,
                new.original_size,
                new.status.as_str(),
                new.source_path,
                uploaded_at.to_rfc3339(),
            ],
        )
        .map_err(StoreError::Query)?;

        let id = conn.last_insert_rowid();
        Ok(Document {
            id,
            owner_id: new.owner_id,
            filename: new.filename,
            original_size: new.original_size,
            status: new.status,
            source_path: new.source_path,
            uploaded_at,
            completed_at: None,
            error_message: None,
            record_count: None,
            artifact_ref: None,
        })
    }

    fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            document_from_row,
        )
        .optional()
        .map_err(StoreError::Query)
    }

    fn list_documents(&self, owner_id: i64) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ?1 ORDER BY id"
            ))
            .map_err(StoreError::Query)?;

        let rows = stmt
            .query_map(params![owner_id], document_from_row)
            .map_err(StoreError::Query)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row.map_err(StoreError::Query)?);
        }
        Ok(documents)
    }

    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> StoreResult<Document> {
        let conn = self.conn.lock().unwrap();

        // Read-merge-write under the connection lock; each record has a
        // single writer so this is atomic enough for the contract.
        let mut document = conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id],
                document_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or(StoreError::NotFound {
                collection: "document",
                id,
            })?;

        if let Some(status) = patch.status {
            document.status = status;
        }
        if let Some(source_path) = patch.source_path {
            document.source_path = Some(source_path);
        }
        if let Some(completed_at) = patch.completed_at {
            document.completed_at = Some(completed_at);
        }
        if let Some(error_message) = patch.error_message {
            document.error_message = Some(error_message);
        }
        if let Some(record_count) = patch.record_count {
            document.record_count = Some(record_count);
        }
        if let Some(artifact_ref) = patch.artifact_ref {
            document.artifact_ref = Some(artifact_ref);
        }

        conn.execute(
            "UPDATE documents SET status = ?1, source_path = ?2, completed_at = ?3, \
             error_message = ?4, record_count = ?5, artifact_ref = ?6 WHERE id = ?7",
            params![
                document.status.as_str(),
                document.source_path,
                document.completed_at.map(|t| t.to_rfc3339()),
                document.error_message,
                document.record_count,
                document.artifact_ref,
                id,
            ],
        )
        .map_err(StoreError::Query)?;

        Ok(document)
    }

    fn delete_document(&self, id: DocumentId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM processing_steps WHERE document_id = ?1",
            params![id],
        )
        .map_err(StoreError::Query)?;
        let rows = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(StoreError::Query)?;
        Ok(rows > 0)
    }

    fn create_step(&self, new: NewStep) -> StoreResult<ProcessingStep> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO processing_steps (document_id, step_name, status) VALUES (?1, ?2, ?3)",
            params![new.document_id, new.step_name.as_str(), new.status.as_str()],
        )
        .map_err(StoreError::Query)?;

        Ok(ProcessingStep {
            id: conn.last_insert_rowid(),
            document_id: new.document_id,
            step_name: new.step_name,
            status: new.status,
            started_at: None,
            completed_at: None,
            error_message: None,
        })
    }

    fn steps_for_document(&self, document_id: DocumentId) -> StoreResult<Vec<ProcessingStep>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STEP_COLUMNS} FROM processing_steps WHERE document_id = ?1 ORDER BY id"
            ))
            .map_err(StoreError::Query)?;

        let rows = stmt
            .query_map(params![document_id], step_from_row)
            .map_err(StoreError::Query)?;

        let mut steps = Vec::new();
        for row in rows {
            steps.push(row.map_err(StoreError::Query)?);
        }
        steps.sort_by_key(|s| s.step_name.position());
        Ok(steps)
    }

    fn update_step(&self, id: StepId, patch: StepPatch) -> StoreResult<ProcessingStep> {
        let conn = self.conn.lock().unwrap();

        let mut step = conn
            .query_row(
                &format!("SELECT {STEP_COLUMNS} FROM processing_steps WHERE id = ?1"),
                params![id],
                step_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or(StoreError::NotFound {
                collection: "step",
                id,
            })?;

        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(started_at) = patch.started_at {
            step.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            step.completed_at = Some(completed_at);
        }
        if let Some(error_message) = patch.error_message {
            step.error_message = Some(error_message);
        }

        conn.execute(
            "UPDATE processing_steps SET status = ?1, started_at = ?2, completed_at = ?3, \
             error_message = ?4 WHERE id = ?5",
            params![
                step.status.as_str(),
                step.started_at.map(|t| t.to_rfc3339()),
                step.completed_at.map(|t| t.to_rfc3339()),
                step.error_message,
                id,
            ],
        )
        .map_err(StoreError::Query)?;

        Ok(step)
    }
}
