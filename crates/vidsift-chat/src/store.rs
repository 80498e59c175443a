use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use vidsift_core::types::Citation;

use crate::db::init_db;
use crate::error::Result;
use crate::orchestrator::ChatTarget;

/// A persisted chat session tied to one video or one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: Option<String>,
    pub video_id: Option<String>,
    pub channel_id: Option<String>,
    pub title: String,
    pub message_count: u32,
    pub created_at: String,
    pub last_activity: String,
}

/// Store manager for chat sessions and their messages.
pub struct ChatStore {
    db: Mutex<Connection>,
}

impl ChatStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Load the referenced session, or create a fresh one when the id is
    /// absent or unknown. The first user message becomes the title.
    pub fn get_or_create_session(
        &self,
        session_id: Option<&str>,
        user_id: Option<&str>,
        target: &ChatTarget,
        first_message: &str,
    ) -> Result<ChatSession> {
        if let Some(id) = session_id {
            if let Some(session) = self.session(id)? {
                return Ok(session);
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let title: String = first_message.chars().take(80).collect();
        let (video_id, channel_id) = match target {
            ChatTarget::Video(v) => (Some(v.as_str()), None),
            ChatTarget::Channel(c) => (None, Some(c.as_str())),
        };

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_sessions
             (id, user_id, video_id, channel_id, title, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![id, user_id, video_id, channel_id, title, now],
        )?;
        debug!(session_id = %id, "chat session created");
        Ok(ChatSession {
            id,
            user_id: user_id.map(str::to_string),
            video_id: video_id.map(str::to_string),
            channel_id: channel_id.map(str::to_string),
            title,
            message_count: 0,
            created_at: now.clone(),
            last_activity: now,
        })
    }

    pub fn session(&self, id: &str) -> Result<Option<ChatSession>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, user_id, video_id, channel_id, title, message_count,
                    created_at, last_activity
             FROM chat_sessions WHERE id = ?1",
            [id],
            |row| {
                Ok(ChatSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    video_id: row.get(2)?,
                    channel_id: row.get(3)?,
                    title: row.get(4)?,
                    message_count: row.get(5)?,
                    created_at: row.get(6)?,
                    last_activity: row.get(7)?,
                })
            },
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist one completed turn: the user message, the assistant message
    /// with its citations, and the session activity counters, atomically.
    pub fn append_turn(
        &self,
        session_id: &str,
        user_content: &str,
        assistant_content: &str,
        citations: &[Citation],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let citations_json = serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string());

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO chat_messages (session_id, role, content, citations, created_at)
             VALUES (?1, 'user', ?2, '[]', ?3)",
            rusqlite::params![session_id, user_content, now],
        )?;
        tx.execute(
            "INSERT INTO chat_messages (session_id, role, content, citations, created_at)
             VALUES (?1, 'assistant', ?2, ?3, ?4)",
            rusqlite::params![session_id, assistant_content, citations_json, now],
        )?;
        tx.execute(
            "UPDATE chat_sessions
             SET message_count = message_count + 2, last_activity = ?2
             WHERE id = ?1",
            rusqlite::params![session_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Message count for a session (ordering is `created_at` then row id).
    pub fn message_count(&self, session_id: &str) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let count: u32 = db.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        ChatStore::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    #[test]
    fn creates_session_when_id_unknown() {
        let s = store();
        let target = ChatTarget::Video("abc123".to_string());
        let session = s
            .get_or_create_session(Some("missing"), Some("u1"), &target, "what is ownership?")
            .unwrap();
        assert_ne!(session.id, "missing");
        assert_eq!(session.video_id.as_deref(), Some("abc123"));
        assert_eq!(session.title, "what is ownership?");
    }

    #[test]
    fn reuses_existing_session() {
        let s = store();
        let target = ChatTarget::Channel("UC1".to_string());
        let first = s.get_or_create_session(None, None, &target, "hi").unwrap();
        let again = s
            .get_or_create_session(Some(&first.id), None, &target, "second")
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.title, "hi");
    }

    #[test]
    fn append_turn_bumps_counters() {
        let s = store();
        let target = ChatTarget::Video("v".to_string());
        let session = s.get_or_create_session(None, None, &target, "q").unwrap();

        s.append_turn(&session.id, "q", "a", &[]).unwrap();
        s.append_turn(&session.id, "q2", "a2", &[]).unwrap();

        let reloaded = s.session(&session.id).unwrap().expect("row");
        assert_eq!(reloaded.message_count, 4);
        assert_eq!(s.message_count(&session.id).unwrap(), 4);
        assert!(reloaded.last_activity >= reloaded.created_at);
    }

    #[test]
    fn citations_roundtrip_as_json() {
        let s = store();
        let target = ChatTarget::Video("v".to_string());
        let session = s.get_or_create_session(None, None, &target, "q").unwrap();
        let citations = vec![Citation::Extracted {
            timestamp: "00:42".to_string(),
            seconds: 42,
            text: "…".to_string(),
        }];
        s.append_turn(&session.id, "q", "a [00:42]", &citations).unwrap();

        let db = s.db.lock().unwrap();
        let stored: String = db
            .query_row(
                "SELECT citations FROM chat_messages WHERE role = 'assistant'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let parsed: Vec<Citation> = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, citations);
    }
}
