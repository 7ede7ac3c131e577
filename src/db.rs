use crate::error::{ChatError, ChatResult};
use crate::models::*;
use rusqlite::{Connection, params};
use std::sync::{Arc, Mutex, MutexGuard};

/// Typed persistence over users, messages, DM envelopes, reactions, files,
/// device sessions, and the update log. One writer connection in WAL mode;
/// every operation completes before control returns to the caller.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

/// Generate an opaque device session id: 32 hex chars.
pub fn generate_session_id() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Public,
    Dm,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db { conn: Arc::new(Mutex::new(conn)) };
        db.migrate();
        db
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                password_verifier TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                suspended INTEGER NOT NULL DEFAULT 0,
                suspension_reason TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                online INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS device_session (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                session_id TEXT NOT NULL UNIQUE,
                raw_user_agent TEXT,
                device_type TEXT,
                os_name TEXT,
                browser_name TEXT,
                model TEXT,
                created_at TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_device_session_user ON device_session(user_id);

            CREATE TABLE IF NOT EXISTS message (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id INTEGER NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                reply_to_id INTEGER REFERENCES message(id) ON DELETE SET NULL,
                is_edited INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_message_author ON message(author_id);
            CREATE INDEX IF NOT EXISTS idx_message_timestamp ON message(timestamp);

            CREATE TABLE IF NOT EXISTS message_file (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES message(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                size INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_message_file_message ON message_file(message_id);

            CREATE TABLE IF NOT EXISTS dm_envelope (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                recipient_id INTEGER NOT NULL REFERENCES users(id),
                iv TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                salt TEXT NOT NULL,
                iv2 TEXT NOT NULL,
                wrapped_mk TEXT NOT NULL,
                reply_to_id INTEGER,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dm_envelope_sender ON dm_envelope(sender_id);
            CREATE INDEX IF NOT EXISTS idx_dm_envelope_recipient ON dm_envelope(recipient_id);

            CREATE TABLE IF NOT EXISTS dm_file (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                envelope_id INTEGER NOT NULL REFERENCES dm_envelope(id) ON DELETE CASCADE,
                sender_id INTEGER NOT NULL,
                recipient_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dm_file_envelope ON dm_file(envelope_id);

            CREATE TABLE IF NOT EXISTS reaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES message(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id),
                emoji TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(message_id, user_id, emoji)
            );
            CREATE INDEX IF NOT EXISTS idx_reaction_message ON reaction(message_id);

            CREATE TABLE IF NOT EXISTS dm_reaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dm_envelope_id INTEGER NOT NULL REFERENCES dm_envelope(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id),
                emoji TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(dm_envelope_id, user_id, emoji)
            );
            CREATE INDEX IF NOT EXISTS idx_dm_reaction_envelope ON dm_reaction(dm_envelope_id);

            CREATE TABLE IF NOT EXISTS crypto_public_key (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                public_key TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS crypto_backup (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                blob_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fcm_token (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS push_subscription (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                endpoint TEXT NOT NULL,
                p256dh TEXT NOT NULL,
                auth TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_push_subscription_user ON push_subscription(user_id);

            CREATE TABLE IF NOT EXISTS update_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                sequence INTEGER NOT NULL,
                updates TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                UNIQUE(user_id, sequence)
            );
            CREATE INDEX IF NOT EXISTS idx_update_log_user_seq ON update_log(user_id, sequence);
            CREATE INDEX IF NOT EXISTS idx_update_log_timestamp ON update_log(timestamp);",
        )
        .expect("Failed to run migrations");
    }

    // --- Users ---

    fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            password_verifier: row.get(3)?,
            verified: row.get::<_, i64>(4)? != 0,
            suspended: row.get::<_, i64>(5)? != 0,
            suspension_reason: row.get(6)?,
            deleted: row.get::<_, i64>(7)? != 0,
            online: row.get::<_, i64>(8)? != 0,
            last_seen: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    const USER_COLS: &'static str = "id, username, display_name, password_verifier, verified, \
         suspended, suspension_reason, deleted, online, last_seen, created_at";

    pub fn find_user_by_id(&self, id: i64) -> ChatResult<User> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", Self::USER_COLS),
            params![id],
            Self::map_user,
        )
        .map_err(|_| ChatError::NotFound("User not found".to_string()))
    }

    pub fn find_user_by_name(&self, username: &str) -> ChatResult<User> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", Self::USER_COLS),
            params![username],
            Self::map_user,
        )
        .map_err(|_| ChatError::NotFound("User not found".to_string()))
    }

    /// Create a user. The first account ever created must carry the owner
    /// username and becomes user id 1; the check and the insert happen under
    /// the same connection lock.
    pub fn create_user(
        &self,
        username: &str,
        display_name: &str,
        password_verifier: &str,
        owner_username: &str,
    ) -> ChatResult<User> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap_or(0);
        if count == 0 && username != owner_username {
            return Err(ChatError::Forbidden(
                "The owner account must be registered first".to_string(),
            ));
        }
        match conn.execute(
            "INSERT INTO users (username, display_name, password_verifier, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![username, display_name, password_verifier, now()],
        ) {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                conn.query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", Self::USER_COLS),
                    params![id],
                    Self::map_user,
                )
                .map_err(ChatError::from)
            }
            Err(e) if e.to_string().contains("UNIQUE") => Err(ChatError::Conflict(format!(
                "Username '{username}' is already taken"
            ))),
            Err(e) => Err(ChatError::Internal(e.to_string())),
        }
    }

    pub fn set_online(&self, user_id: i64, online: bool) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE users SET online = ?1, last_seen = ?2 WHERE id = ?3",
            params![online as i64, now(), user_id],
        )?;
        Ok(())
    }

    pub fn set_suspended(&self, user_id: i64, suspended: bool, reason: Option<&str>) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE users SET suspended = ?1, suspension_reason = ?2 WHERE id = ?3",
            params![suspended as i64, reason, user_id],
        )?;
        Ok(())
    }

    pub fn set_deleted(&self, user_id: i64) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute("UPDATE users SET deleted = 1 WHERE id = ?1", params![user_id])?;
        conn.execute(
            "UPDATE device_session SET revoked = 1 WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    /// Flip the verified flag; returns the new value.
    pub fn toggle_verified(&self, user_id: i64) -> ChatResult<bool> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE users SET verified = NOT verified WHERE id = ?1",
            params![user_id],
        )?;
        if updated == 0 {
            return Err(ChatError::NotFound("User not found".to_string()));
        }
        let verified: i64 =
            conn.query_row("SELECT verified FROM users WHERE id = ?1", params![user_id], |r| {
                r.get(0)
            })?;
        Ok(verified != 0)
    }

    pub fn set_password_verifier(&self, user_id: i64, verifier: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE users SET password_verifier = ?1 WHERE id = ?2",
            params![verifier, user_id],
        )?;
        Ok(())
    }

    // --- Device sessions ---

    pub fn create_device_session(&self, user_id: i64, user_agent: Option<&str>) -> ChatResult<DeviceSession> {
        let descriptor = user_agent.map(ClientDescriptor::parse).unwrap_or_default();
        let session_id = generate_session_id();
        let ts = now();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO device_session \
             (user_id, session_id, raw_user_agent, device_type, os_name, browser_name, model, created_at, last_seen) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                user_id,
                session_id,
                user_agent,
                descriptor.device_type,
                descriptor.os_name,
                descriptor.browser_name,
                descriptor.model,
                ts
            ],
        )?;
        Ok(DeviceSession {
            id: conn.last_insert_rowid(),
            user_id,
            session_id,
            raw_user_agent: user_agent.map(String::from),
            device_type: descriptor.device_type,
            os_name: descriptor.os_name,
            browser_name: descriptor.browser_name,
            model: descriptor.model,
            created_at: ts.clone(),
            last_seen: ts,
            revoked: false,
        })
    }

    pub fn find_device_session(&self, user_id: i64, session_id: &str) -> ChatResult<DeviceSession> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, user_id, session_id, raw_user_agent, device_type, os_name, browser_name, \
             model, created_at, last_seen, revoked \
             FROM device_session WHERE user_id = ?1 AND session_id = ?2",
            params![user_id, session_id],
            |row| {
                Ok(DeviceSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    session_id: row.get(2)?,
                    raw_user_agent: row.get(3)?,
                    device_type: row.get(4)?,
                    os_name: row.get(5)?,
                    browser_name: row.get(6)?,
                    model: row.get(7)?,
                    created_at: row.get(8)?,
                    last_seen: row.get(9)?,
                    revoked: row.get::<_, i64>(10)? != 0,
                })
            },
        )
        .map_err(|_| ChatError::AuthRequired("Session not found".to_string()))
    }

    pub fn touch_session(&self, session_id: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE device_session SET last_seen = ?1 WHERE session_id = ?2",
            params![now(), session_id],
        )?;
        Ok(())
    }

    pub fn revoke_session(&self, session_id: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE device_session SET revoked = 1 WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    /// Revoke every session of the user except `keep`. Returns the count revoked.
    pub fn revoke_other_sessions(&self, user_id: i64, keep: &str) -> ChatResult<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE device_session SET revoked = 1 WHERE user_id = ?1 AND session_id != ?2 AND revoked = 0",
            params![user_id, keep],
        )?;
        Ok(n)
    }

    // --- Public messages ---

    pub fn insert_public_message(
        &self,
        author_id: i64,
        content: &str,
        reply_to_id: Option<i64>,
    ) -> ChatResult<PublicMessage> {
        let conn = self.lock();
        if let Some(reply_id) = reply_to_id {
            let exists: i64 = conn
                .query_row("SELECT COUNT(*) FROM message WHERE id = ?1", params![reply_id], |r| {
                    r.get(0)
                })
                .unwrap_or(0);
            if exists == 0 {
                return Err(ChatError::NotFound("Original message not found".to_string()));
            }
        }
        let ts = now();
        conn.execute(
            "INSERT INTO message (author_id, content, timestamp, reply_to_id) VALUES (?1, ?2, ?3, ?4)",
            params![author_id, content, ts, reply_to_id],
        )?;
        Ok(PublicMessage {
            id: conn.last_insert_rowid(),
            author_id,
            content: content.to_string(),
            timestamp: ts,
            reply_to_id,
            is_edited: false,
        })
    }

    fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PublicMessage> {
        Ok(PublicMessage {
            id: row.get(0)?,
            author_id: row.get(1)?,
            content: row.get(2)?,
            timestamp: row.get(3)?,
            reply_to_id: row.get(4)?,
            is_edited: row.get::<_, i64>(5)? != 0,
        })
    }

    pub fn find_public_message(&self, id: i64) -> ChatResult<PublicMessage> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, author_id, content, timestamp, reply_to_id, is_edited FROM message WHERE id = ?1",
            params![id],
            Self::map_message,
        )
        .map_err(|_| ChatError::NotFound("Message not found".to_string()))
    }

    /// All public messages in timeline order, each with its author's username.
    pub fn public_messages(&self) -> ChatResult<Vec<(PublicMessage, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.author_id, m.content, m.timestamp, m.reply_to_id, m.is_edited, u.username \
             FROM message m JOIN users u ON u.id = m.author_id \
             ORDER BY m.id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((Self::map_message(row)?, row.get::<_, String>(6)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn edit_public_message(&self, id: i64, actor_id: i64, content: &str) -> ChatResult<PublicMessage> {
        {
            let conn = self.lock();
            let author_id: i64 = conn
                .query_row("SELECT author_id FROM message WHERE id = ?1", params![id], |r| r.get(0))
                .map_err(|_| ChatError::NotFound("Message not found".to_string()))?;
            if author_id != actor_id {
                return Err(ChatError::Forbidden(
                    "You can only edit your own messages".to_string(),
                ));
            }
            conn.execute(
                "UPDATE message SET content = ?1, is_edited = 1 WHERE id = ?2",
                params![content, id],
            )?;
        }
        self.find_public_message(id)
    }

    /// Delete one public message. Returns `(prior content, author id)`.
    pub fn delete_public_message(&self, id: i64, actor_id: i64, is_owner: bool) -> ChatResult<(String, i64)> {
        let conn = self.lock();
        let (content, author_id): (String, i64) = conn
            .query_row(
                "SELECT content, author_id FROM message WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .map_err(|_| ChatError::NotFound("Message not found".to_string()))?;
        if !is_owner && author_id != actor_id {
            return Err(ChatError::Forbidden(
                "You can only delete your own messages".to_string(),
            ));
        }
        conn.execute("DELETE FROM message WHERE id = ?1", params![id])?;
        Ok((content, author_id))
    }

    /// Batch delete by id, used by spam enforcement. One statement per chunk
    /// to stay under the SQLite bind-variable limit.
    pub fn delete_public_messages_by_ids(&self, ids: &[i64]) -> ChatResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock();
        let mut deleted = 0usize;
        for chunk in ids.chunks(500) {
            let placeholders: Vec<String> = (0..chunk.len()).map(|i| format!("?{}", i + 1)).collect();
            let sql = format!("DELETE FROM message WHERE id IN ({})", placeholders.join(","));
            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                chunk.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
            deleted += conn.execute(&sql, params_refs.as_slice())?;
        }
        Ok(deleted)
    }

    pub fn insert_message_file(
        &self,
        message_id: i64,
        path: &str,
        filename: &str,
        content_type: &str,
        size: i64,
    ) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO message_file (message_id, path, filename, content_type, size) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message_id, path, filename, content_type, size],
        )?;
        Ok(())
    }

    pub fn message_files(&self, message_id: i64) -> ChatResult<Vec<MessageAttachment>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT path, filename, content_type, size FROM message_file WHERE message_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![message_id], |row| {
                Ok(MessageAttachment {
                    path: row.get(0)?,
                    filename: row.get(1)?,
                    content_type: row.get(2)?,
                    size: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- DM envelopes ---

    pub fn insert_dm(&self, sender_id: i64, payload: &DmSendPayload) -> ChatResult<DmEnvelope> {
        if payload.recipient_id == sender_id {
            return Err(ChatError::Validation(
                "Cannot send a direct message to yourself".to_string(),
            ));
        }
        let conn = self.lock();
        let recipient: (i64, i64) = conn
            .query_row(
                "SELECT deleted, suspended FROM users WHERE id = ?1",
                params![payload.recipient_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .map_err(|_| ChatError::NotFound("Recipient not found".to_string()))?;
        if recipient.0 != 0 || recipient.1 != 0 {
            return Err(ChatError::NotFound("Recipient not found".to_string()));
        }
        let ts = now();
        conn.execute(
            "INSERT INTO dm_envelope (sender_id, recipient_id, iv, ciphertext, salt, iv2, wrapped_mk, reply_to_id, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                sender_id,
                payload.recipient_id,
                payload.iv,
                payload.ciphertext,
                payload.salt,
                payload.iv2,
                payload.wrapped_mk,
                payload.reply_to_id,
                ts
            ],
        )?;
        Ok(DmEnvelope {
            id: conn.last_insert_rowid(),
            sender_id,
            recipient_id: payload.recipient_id,
            iv: payload.iv.clone(),
            ciphertext: payload.ciphertext.clone(),
            salt: payload.salt.clone(),
            iv2: payload.iv2.clone(),
            wrapped_mk: payload.wrapped_mk.clone(),
            reply_to_id: payload.reply_to_id,
            timestamp: ts,
        })
    }

    fn map_envelope(row: &rusqlite::Row<'_>) -> rusqlite::Result<DmEnvelope> {
        Ok(DmEnvelope {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            recipient_id: row.get(2)?,
            iv: row.get(3)?,
            ciphertext: row.get(4)?,
            salt: row.get(5)?,
            iv2: row.get(6)?,
            wrapped_mk: row.get(7)?,
            reply_to_id: row.get(8)?,
            timestamp: row.get(9)?,
        })
    }

    const ENVELOPE_COLS: &'static str =
        "id, sender_id, recipient_id, iv, ciphertext, salt, iv2, wrapped_mk, reply_to_id, timestamp";

    pub fn find_dm(&self, id: i64) -> ChatResult<DmEnvelope> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM dm_envelope WHERE id = ?1", Self::ENVELOPE_COLS),
            params![id],
            Self::map_envelope,
        )
        .map_err(|_| ChatError::NotFound("DM not found".to_string()))
    }

    pub fn edit_dm(&self, actor_id: i64, payload: &DmEditPayload) -> ChatResult<DmEnvelope> {
        {
            let conn = self.lock();
            let sender_id: i64 = conn
                .query_row(
                    "SELECT sender_id FROM dm_envelope WHERE id = ?1",
                    params![payload.id],
                    |r| r.get(0),
                )
                .map_err(|_| ChatError::NotFound("DM not found".to_string()))?;
            if sender_id != actor_id {
                return Err(ChatError::Forbidden(
                    "You can only edit your own messages".to_string(),
                ));
            }
            conn.execute(
                "UPDATE dm_envelope SET iv = ?1, ciphertext = ?2, salt = ?3, iv2 = ?4, wrapped_mk = ?5 \
                 WHERE id = ?6",
                params![
                    payload.iv,
                    payload.ciphertext,
                    payload.salt,
                    payload.iv2,
                    payload.wrapped_mk,
                    payload.id
                ],
            )?;
        }
        self.find_dm(payload.id)
    }

    /// Sender-only delete. Returns the envelope as it was for fan-out.
    pub fn delete_dm(&self, id: i64, actor_id: i64) -> ChatResult<DmEnvelope> {
        let env = self.find_dm(id)?;
        if env.sender_id != actor_id {
            return Err(ChatError::Forbidden(
                "You can only delete your own messages".to_string(),
            ));
        }
        let conn = self.lock();
        conn.execute("DELETE FROM dm_envelope WHERE id = ?1", params![id])?;
        Ok(env)
    }

    pub fn dm_history(&self, user_id: i64, other_id: i64) -> ChatResult<Vec<DmEnvelope>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dm_envelope \
             WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1) \
             ORDER BY id ASC",
            Self::ENVELOPE_COLS
        ))?;
        let rows = stmt
            .query_map(params![user_id, other_id], Self::map_envelope)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- Reactions ---

    /// Toggle membership of `(target, user, emoji)` and return the outcome
    /// plus the refreshed reaction set for the target.
    pub fn toggle_reaction(
        &self,
        kind: ReactionKind,
        target_id: i64,
        user_id: i64,
        emoji: &str,
    ) -> ChatResult<(ToggleOutcome, Vec<ReactionGroup>)> {
        let (table, target_col, target_table) = match kind {
            ReactionKind::Public => ("reaction", "message_id", "message"),
            ReactionKind::Dm => ("dm_reaction", "dm_envelope_id", "dm_envelope"),
        };
        let outcome = {
            let conn = self.lock();
            let exists: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {target_table} WHERE id = ?1"),
                    params![target_id],
                    |r| r.get(0),
                )
                .unwrap_or(0);
            if exists == 0 {
                return Err(ChatError::NotFound("Message not found".to_string()));
            }
            let removed = conn.execute(
                &format!("DELETE FROM {table} WHERE {target_col} = ?1 AND user_id = ?2 AND emoji = ?3"),
                params![target_id, user_id, emoji],
            )?;
            if removed > 0 {
                ToggleOutcome::Removed
            } else {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} ({target_col}, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4)"
                    ),
                    params![target_id, user_id, emoji, now()],
                )?;
                ToggleOutcome::Added
            }
        };
        let groups = self.reaction_set(kind, target_id)?;
        Ok((outcome, groups))
    }

    /// Grouped reactions for one target: per emoji, who reacted.
    pub fn reaction_set(&self, kind: ReactionKind, target_id: i64) -> ChatResult<Vec<ReactionGroup>> {
        let (table, target_col) = match kind {
            ReactionKind::Public => ("reaction", "message_id"),
            ReactionKind::Dm => ("dm_reaction", "dm_envelope_id"),
        };
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT r.emoji, r.user_id, u.username FROM {table} r \
             JOIN users u ON u.id = r.user_id \
             WHERE r.{target_col} = ?1 ORDER BY r.id ASC"
        ))?;
        let rows: Vec<(String, i64, String)> = stmt
            .query_map(params![target_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        let mut groups: Vec<ReactionGroup> = Vec::new();
        for (emoji, user_id, username) in rows {
            if let Some(group) = groups.iter_mut().find(|g| g.emoji == emoji) {
                group.count += 1;
                group.user_ids.push(user_id);
                group.usernames.push(username);
            } else {
                groups.push(ReactionGroup {
                    emoji,
                    count: 1,
                    user_ids: vec![user_id],
                    usernames: vec![username],
                });
            }
        }
        Ok(groups)
    }

    // --- Crypto key storage (opaque) ---

    pub fn set_public_key(&self, user_id: i64, public_key: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO crypto_public_key (user_id, public_key) VALUES (?1, ?2) \
             ON CONFLICT(user_id) DO UPDATE SET public_key = excluded.public_key",
            params![user_id, public_key],
        )?;
        Ok(())
    }

    pub fn public_key_of(&self, user_id: i64) -> ChatResult<String> {
        let conn = self.lock();
        conn.query_row(
            "SELECT public_key FROM crypto_public_key WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )
        .map_err(|_| ChatError::NotFound("No public key registered".to_string()))
    }

    pub fn set_crypto_backup(&self, user_id: i64, blob_json: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO crypto_backup (user_id, blob_json) VALUES (?1, ?2) \
             ON CONFLICT(user_id) DO UPDATE SET blob_json = excluded.blob_json",
            params![user_id, blob_json],
        )?;
        Ok(())
    }

    pub fn crypto_backup_of(&self, user_id: i64) -> ChatResult<String> {
        let conn = self.lock();
        conn.query_row(
            "SELECT blob_json FROM crypto_backup WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )
        .map_err(|_| ChatError::NotFound("No backup stored".to_string()))
    }

    // --- Push registrations ---

    pub fn register_fcm_token(&self, user_id: i64, token: &str) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO fcm_token (user_id, token, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id",
            params![user_id, token, now()],
        )?;
        Ok(())
    }

    pub fn register_push_subscription(
        &self,
        user_id: i64,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> ChatResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO push_subscription (user_id, endpoint, p256dh, auth, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, endpoint, p256dh, auth, now()],
        )?;
        Ok(())
    }

    /// Count of push targets (web push + FCM) registered for a user.
    pub fn push_target_count(&self, user_id: i64) -> ChatResult<i64> {
        let conn = self.lock();
        let subs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM push_subscription WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        let fcm: i64 = conn.query_row(
            "SELECT COUNT(*) FROM fcm_token WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(subs + fcm)
    }

    // --- Update log ---

    /// Durably record one flushed batch. Idempotent: a duplicate
    /// `(user_id, sequence)` means another path already persisted this batch.
    /// Returns whether a row was written.
    pub fn append_update_log(&self, user_id: i64, sequence: i64, updates_json: &str) -> ChatResult<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "INSERT OR IGNORE INTO update_log (user_id, sequence, updates, timestamp) \
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, sequence, updates_json, now()],
        )?;
        Ok(n > 0)
    }

    /// Ordered batches in `(from_seq, to_seq]`.
    pub fn fetch_update_log(&self, user_id: i64, from_seq: i64, to_seq: i64) -> ChatResult<Vec<UpdateBatch>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT sequence, updates FROM update_log \
             WHERE user_id = ?1 AND sequence > ?2 AND sequence <= ?3 \
             ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id, from_seq, to_seq], |row| {
                Ok(UpdateBatch { sequence: row.get(0)?, updates: row.get(1)? })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Highest logged sequence per user, for sequencer bootstrap.
    pub fn max_sequences(&self) -> ChatResult<Vec<(i64, i64)>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT user_id, MAX(sequence) FROM update_log GROUP BY user_id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Drop batches older than the cutoff. Returns the count removed.
    pub fn prune_update_log(&self, cutoff_rfc3339: &str) -> ChatResult<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM update_log WHERE timestamp < ?1",
            params![cutoff_rfc3339],
        )?;
        Ok(n)
    }
}
