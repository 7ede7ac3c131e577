use serde::Deserialize;
use serde::Serialize;

// --- Users ---

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub password_verifier: String,
    pub verified: bool,
    pub suspended: bool,
    pub suspension_reason: Option<String>,
    pub deleted: bool,
    pub online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

impl User {
    /// The owner is always user id 1 and is exempt from moderation.
    pub fn is_owner(&self) -> bool {
        self.id == 1
    }

    pub fn public_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "username": self.username,
            "display_name": self.display_name,
            "verified": self.verified,
            "online": self.online,
            "last_seen": self.last_seen,
            "created_at": self.created_at,
        })
    }
}

// --- Device sessions ---

#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub raw_user_agent: Option<String>,
    pub device_type: Option<String>,
    pub os_name: Option<String>,
    pub browser_name: Option<String>,
    pub model: Option<String>,
    pub created_at: String,
    pub last_seen: String,
    pub revoked: bool,
}

/// Best-effort client descriptor pulled out of a User-Agent header.
#[derive(Debug, Clone, Default)]
pub struct ClientDescriptor {
    pub device_type: Option<String>,
    pub os_name: Option<String>,
    pub browser_name: Option<String>,
    pub model: Option<String>,
}

impl ClientDescriptor {
    pub fn parse(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        let device_type = if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone")
        {
            Some("mobile".to_string())
        } else if ua.contains("ipad") || ua.contains("tablet") {
            Some("tablet".to_string())
        } else if ua.contains("bot") || ua.contains("curl") || ua.contains("python") {
            Some("bot".to_string())
        } else {
            Some("desktop".to_string())
        };
        let os_name = if ua.contains("windows") {
            Some("Windows".to_string())
        } else if ua.contains("android") {
            Some("Android".to_string())
        } else if ua.contains("iphone") || ua.contains("ipad") {
            Some("iOS".to_string())
        } else if ua.contains("mac os") || ua.contains("macintosh") {
            Some("macOS".to_string())
        } else if ua.contains("linux") {
            Some("Linux".to_string())
        } else {
            None
        };
        let browser_name = if ua.contains("firefox") {
            Some("Firefox".to_string())
        } else if ua.contains("edg/") {
            Some("Edge".to_string())
        } else if ua.contains("chrome") {
            Some("Chrome".to_string())
        } else if ua.contains("safari") {
            Some("Safari".to_string())
        } else {
            None
        };
        let model = if ua.contains("iphone") {
            Some("iPhone".to_string())
        } else if ua.contains("ipad") {
            Some("iPad".to_string())
        } else {
            None
        };
        Self { device_type, os_name, browser_name, model }
    }
}

// --- Public messages ---

#[derive(Debug, Clone)]
pub struct PublicMessage {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub timestamp: String,
    pub reply_to_id: Option<i64>,
    pub is_edited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageAttachment {
    pub path: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

// --- DM envelopes ---

/// Opaque ciphertext record. The server stores and echoes these fields
/// byte-for-byte and never interprets them.
#[derive(Debug, Clone)]
pub struct DmEnvelope {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub iv: String,
    pub ciphertext: String,
    pub salt: String,
    pub iv2: String,
    pub wrapped_mk: String,
    pub reply_to_id: Option<i64>,
    pub timestamp: String,
}

impl DmEnvelope {
    pub fn wire_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "senderId": self.sender_id,
            "recipientId": self.recipient_id,
            "iv": self.iv,
            "ciphertext": self.ciphertext,
            "salt": self.salt,
            "iv2": self.iv2,
            "wrappedMk": self.wrapped_mk,
            "replyToId": self.reply_to_id,
            "timestamp": self.timestamp,
        })
    }
}

// --- Reactions ---

/// One emoji bucket in a message's refreshed reaction set.
#[derive(Debug, Clone, Serialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: i64,
    pub user_ids: Vec<i64>,
    pub usernames: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

impl ToggleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleOutcome::Added => "added",
            ToggleOutcome::Removed => "removed",
        }
    }
}

// --- Update log ---

#[derive(Debug, Clone)]
pub struct UpdateBatch {
    pub sequence: i64,
    /// Serialized JSON array of `{type, data}` updates.
    pub updates: String,
}

// --- Request payloads (account routes) ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub password_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_verifier: String,
    pub new_verifier: String,
    #[serde(default)]
    pub logout_others: bool,
}

// --- Request payloads (dispatcher frames) ---

#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    pub content: String,
    #[serde(default)]
    pub reply_to_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessagePayload {
    pub message_id: i64,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessagePayload {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmSendPayload {
    pub recipient_id: i64,
    pub iv: String,
    pub ciphertext: String,
    pub salt: String,
    pub iv2: String,
    pub wrapped_mk: String,
    #[serde(default)]
    pub reply_to_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmEditPayload {
    pub id: i64,
    pub iv: String,
    pub ciphertext: String,
    pub salt: String,
    pub iv2: String,
    pub wrapped_mk: String,
}

#[derive(Debug, Deserialize)]
pub struct DmDeletePayload {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReactionPayload {
    pub message_id: i64,
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct DmReactionPayload {
    pub dm_envelope_id: i64,
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSubscribePayload {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmTypingPayload {
    pub recipient_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUpdatesPayload {
    #[serde(default)]
    pub last_seq: i64,
}

// --- Content hygiene ---

/// Escape text for storage as message content. Clients render content into
/// HTML, so angle brackets, quotes, and ampersands must not survive verbatim.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
