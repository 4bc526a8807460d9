//! File access repository — append-only audit entries written by the job
//! runner as a side effect of tool use.

use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::row_types::{AccessKind, FileAccessMetadata, FileAccessRow};

/// Options for recording a file access.
pub struct NewFileAccess<'a> {
    /// Owning session.
    pub session_id: &'a str,
    /// Accessed path.
    pub path: &'a str,
    /// Access kind.
    pub kind: AccessKind,
    /// Content snapshot (for writes).
    pub snapshot: Option<&'a str>,
    /// Descriptive metadata.
    pub metadata: Option<&'a FileAccessMetadata>,
}

/// File access repository — stateless, every method takes `&Connection`.
pub struct FileAccessRepo;

impl FileAccessRepo {
    /// Record one access. Never updated afterwards.
    pub fn record(conn: &Connection, access: &NewFileAccess<'_>) -> Result<FileAccessRow> {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
                params![access.session_id],
                |row| row.get(0),
            )?;
        if !exists {
            return Err(StoreError::SessionNotFound(access.session_id.to_owned()));
        }

        let id = format!("fa_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let metadata_json = access
            .metadata
            .map(|m| serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string()));

        let _ = conn.execute(
            "INSERT INTO file_accesses (id, session_id, path, kind, snapshot, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                access.session_id,
                access.path,
                access.kind.as_str(),
                access.snapshot,
                metadata_json,
                now,
            ],
        )?;

        Ok(FileAccessRow {
            id,
            session_id: access.session_id.to_owned(),
            path: access.path.to_owned(),
            kind: access.kind,
            snapshot: access.snapshot.map(str::to_owned),
            metadata: access.metadata.cloned(),
            created_at: now,
        })
    }

    /// List a session's accesses in creation order.
    pub fn list(conn: &Connection, session_id: &str) -> Result<Vec<FileAccessRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_accesses
             WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC",
            FileAccessRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![session_id], FileAccessRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionPool, new_in_memory};
    use crate::migrations::run_migrations;
    use crate::repositories::session::{NewSession, SessionRepo};
    use relay_core::provider::Provider;

    fn make_pool() -> ConnectionPool {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        pool
    }

    fn make_session(conn: &Connection) -> String {
        SessionRepo::create(
            conn,
            &NewSession {
                provider: Provider::Codex,
                project_path: "/work",
                context: None,
                provider_home: None,
                metadata: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn record_and_list() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);

        let read = FileAccessRepo::record(
            &conn,
            &NewFileAccess {
                session_id: &session_id,
                path: "src/main.rs",
                kind: AccessKind::Read,
                snapshot: None,
                metadata: None,
            },
        )
        .unwrap();
        let write = FileAccessRepo::record(
            &conn,
            &NewFileAccess {
                session_id: &session_id,
                path: "src/main.rs",
                kind: AccessKind::Write,
                snapshot: Some("fn main() {}"),
                metadata: Some(&FileAccessMetadata {
                    size: Some(12),
                    mime_type: Some("text/x-rust".into()),
                    encoding: Some("utf-8".into()),
                }),
            },
        )
        .unwrap();

        let accesses = FileAccessRepo::list(&conn, &session_id).unwrap();
        assert_eq!(accesses.len(), 2);
        assert_eq!(accesses[0], read);
        assert_eq!(accesses[1], write);
        assert_eq!(accesses[1].snapshot.as_deref(), Some("fn main() {}"));
        assert_eq!(accesses[1].metadata.as_ref().unwrap().size, Some(12));
    }

    #[test]
    fn record_unknown_session_fails() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let err = FileAccessRepo::record(
            &conn,
            &NewFileAccess {
                session_id: "sess_nope",
                path: "x",
                kind: AccessKind::Read,
                snapshot: None,
                metadata: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[test]
    fn delete_session_cascades_accesses() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);
        let _ = FileAccessRepo::record(
            &conn,
            &NewFileAccess {
                session_id: &session_id,
                path: "a.txt",
                kind: AccessKind::Create,
                snapshot: None,
                metadata: None,
            },
        )
        .unwrap();

        assert!(SessionRepo::delete(&conn, &session_id).unwrap());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_accesses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn kinds_roundtrip_through_storage() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);
        for kind in [
            AccessKind::Read,
            AccessKind::Write,
            AccessKind::Create,
            AccessKind::Delete,
        ] {
            let _ = FileAccessRepo::record(
                &conn,
                &NewFileAccess {
                    session_id: &session_id,
                    path: "f",
                    kind,
                    snapshot: None,
                    metadata: None,
                },
            )
            .unwrap();
        }
        let accesses = FileAccessRepo::list(&conn, &session_id).unwrap();
        let kinds: Vec<AccessKind> = accesses.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AccessKind::Read,
                AccessKind::Write,
                AccessKind::Create,
                AccessKind::Delete
            ]
        );
    }
}
