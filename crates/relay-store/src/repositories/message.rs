//! Message repository — append-only exchange turns.
//!
//! Appending bumps the owning session's running message counter in the
//! same call; messages themselves are never mutated. Ordering is by
//! creation time (ID as tiebreak — IDs are time-ordered).

use relay_core::ids::MessageId;
use rusqlite::{Connection, params};

use crate::errors::{Result, StoreError};
use crate::row_types::{MessageRole, MessageRow};

/// Options for appending a message.
pub struct NewMessage<'a> {
    /// Owning session.
    pub session_id: &'a str,
    /// Author role.
    pub role: MessageRole,
    /// Raw content payload.
    pub content: &'a str,
    /// Provider-side correlation ID (assistant turns).
    pub provider_session_id: Option<&'a str>,
}

/// Options for listing messages.
#[derive(Default)]
pub struct ListMessagesOptions {
    /// Maximum results.
    pub limit: Option<i64>,
    /// Skip results.
    pub offset: Option<i64>,
}

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Append a message and bump the session's message counter.
    pub fn append(conn: &Connection, msg: &NewMessage<'_>) -> Result<MessageRow> {
        let now = chrono::Utc::now().to_rfc3339();

        // Counter update doubles as the existence check.
        let updated = conn.execute(
            "UPDATE sessions SET message_count = message_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![msg.session_id, now],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound(msg.session_id.to_owned()));
        }

        let id = MessageId::new().into_inner();
        let _ = conn.execute(
            "INSERT INTO messages (id, session_id, role, content, provider_session_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                msg.session_id,
                msg.role.as_str(),
                msg.content,
                msg.provider_session_id,
                now,
            ],
        )?;

        Ok(MessageRow {
            id,
            session_id: msg.session_id.to_owned(),
            role: msg.role,
            content: msg.content.to_owned(),
            provider_session_id: msg.provider_session_id.map(str::to_owned),
            created_at: now,
        })
    }

    /// List a session's messages in creation order.
    pub fn list(
        conn: &Connection,
        session_id: &str,
        opts: &ListMessagesOptions,
    ) -> Result<Vec<MessageRow>> {
        let limit = opts.limit.unwrap_or(-1);
        let offset = opts.offset.unwrap_or(0);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages
             WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2 OFFSET ?3",
            MessageRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![session_id, limit, offset], MessageRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Count a session's messages.
    pub fn count(conn: &Connection, session_id: &str) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
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
                provider: Provider::ClaudeCode,
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
    fn append_and_list() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);

        let user = MessageRepo::append(
            &conn,
            &NewMessage {
                session_id: &session_id,
                role: MessageRole::User,
                content: "fix the bug",
                provider_session_id: None,
            },
        )
        .unwrap();
        let assistant = MessageRepo::append(
            &conn,
            &NewMessage {
                session_id: &session_id,
                role: MessageRole::Assistant,
                content: "done",
                provider_session_id: Some("thread_9"),
            },
        )
        .unwrap();

        let messages =
            MessageRepo::list(&conn, &session_id, &ListMessagesOptions::default()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], user);
        assert_eq!(messages[1], assistant);
        assert_eq!(messages[1].provider_session_id.as_deref(), Some("thread_9"));
    }

    #[test]
    fn append_bumps_session_counter() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);

        for i in 0..3 {
            let _ = MessageRepo::append(
                &conn,
                &NewMessage {
                    session_id: &session_id,
                    role: MessageRole::User,
                    content: &format!("m{i}"),
                    provider_session_id: None,
                },
            )
            .unwrap();
        }

        let row = SessionRepo::get(&conn, &session_id).unwrap().unwrap();
        assert_eq!(row.message_count, 3);
        assert_eq!(MessageRepo::count(&conn, &session_id).unwrap(), 3);
    }

    #[test]
    fn append_to_unknown_session_fails() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let err = MessageRepo::append(
            &conn,
            &NewMessage {
                session_id: "sess_nope",
                role: MessageRole::User,
                content: "hi",
                provider_session_id: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[test]
    fn list_respects_limit_and_offset() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);
        for i in 0..5 {
            let _ = MessageRepo::append(
                &conn,
                &NewMessage {
                    session_id: &session_id,
                    role: MessageRole::User,
                    content: &format!("m{i}"),
                    provider_session_id: None,
                },
            )
            .unwrap();
        }

        let page = MessageRepo::list(
            &conn,
            &session_id,
            &ListMessagesOptions {
                limit: Some(2),
                offset: Some(1),
            },
        )
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "m1");
        assert_eq!(page[1].content, "m2");
    }

    #[test]
    fn delete_session_cascades_messages() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let session_id = make_session(&conn);
        let _ = MessageRepo::append(
            &conn,
            &NewMessage {
                session_id: &session_id,
                role: MessageRole::User,
                content: "hi",
                provider_session_id: None,
            },
        )
        .unwrap();

        assert!(SessionRepo::delete(&conn, &session_id).unwrap());
        assert_eq!(MessageRepo::count(&conn, &session_id).unwrap(), 0);
    }

    #[test]
    fn messages_for_other_sessions_not_listed() {
        let pool = make_pool();
        let conn = pool.get().unwrap();
        let a = make_session(&conn);
        let b = make_session(&conn);
        let _ = MessageRepo::append(
            &conn,
            &NewMessage {
                session_id: &a,
                role: MessageRole::User,
                content: "for a",
                provider_session_id: None,
            },
        )
        .unwrap();

        let messages = MessageRepo::list(&conn, &b, &ListMessagesOptions::default()).unwrap();
        assert!(messages.is_empty());
    }
}
