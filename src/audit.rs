use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

const MAX_BYTES: u64 = 5 * 1024 * 1024;
const BACKUP_COUNT: u32 = 5;

/// Append-only structured event log, one file per stream, size-rotated.
/// Entries are rendered for humans: a day separator when the date changes,
/// `HH:MM:SS` on the first line, indented continuation lines, and quoted
/// content blocks. Identical consecutive entries are collapsed.
pub struct AuditLog {
    security: Mutex<LogStream>,
    public_chat: Mutex<LogStream>,
    dm: Mutex<LogStream>,
    access: Mutex<LogStream>,
}

struct LogStream {
    path: PathBuf,
    last_date: Option<String>,
    previous_entry: Option<String>,
}

impl LogStream {
    fn new(dir: &PathBuf, filename: &str) -> Self {
        Self { path: dir.join(filename), last_date: None, previous_entry: None }
    }

    fn rotate_if_needed(&self) {
        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size < MAX_BYTES {
            return;
        }
        let gen_path = |n: u32| {
            let mut p = self.path.clone();
            p.set_extension(format!("log.{n}"));
            p
        };
        fs::remove_file(gen_path(BACKUP_COUNT)).ok();
        for n in (1..BACKUP_COUNT).rev() {
            fs::rename(gen_path(n), gen_path(n + 1)).ok();
        }
        fs::rename(&self.path, gen_path(1)).ok();
    }

    fn write(&mut self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        self.rotate_if_needed();

        let now = chrono::Local::now();
        let date_str = now.format("%d.%m.%Y").to_string();
        let time_str = now.format("%H:%M:%S").to_string();

        let mut entry_lines: Vec<String> = Vec::new();
        entry_lines.push(format!("{time_str} {}", lines[0]));
        for line in &lines[1..] {
            if line.starts_with('|') {
                entry_lines.push(format!("    {line}"));
            } else {
                entry_lines.push(format!("  ↳ {line}"));
            }
        }
        let entry_text = entry_lines.join("\n");
        if self.previous_entry.as_deref() == Some(entry_text.as_str()) {
            return;
        }

        let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&self.path)
        else {
            return;
        };
        if self.last_date.as_deref() != Some(date_str.as_str()) {
            let separator = "-".repeat(11);
            let _ = writeln!(file, "\n\n{separator}\n{date_str}\n{separator}\n");
            self.last_date = Some(date_str);
        }
        let _ = writeln!(file, "{entry_text}");
        self.previous_entry = Some(entry_text);
    }
}

fn fmt_user(username: &str, user_id: i64) -> String {
    format!("@{username} (user id {user_id})")
}

/// Reverse the storage-side HTML escaping for log readability.
fn unescape(content: &str) -> String {
    content
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn quote_content(lines: &mut Vec<String>, header: &str, content: &str) {
    lines.push(header.to_string());
    for line in unescape(content).lines() {
        lines.push(format!("| {line}"));
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

// --- Event taxonomy ---

#[derive(Debug)]
pub enum SecurityEvent {
    LoginSuccess {
        username: String,
        user_id: i64,
        session_id: String,
        client: Option<String>,
        ip: Option<String>,
    },
    LoginFailed { username: String, reason: String, ip: Option<String> },
    RegistrationSuccess {
        username: String,
        display_name: String,
        user_id: i64,
        ip: Option<String>,
        user_agent: Option<String>,
    },
    PasswordChanged { username: String, user_id: i64, logout_others: bool, ip: Option<String> },
    Logout { username: String, user_id: i64, session_id: String, ip: Option<String> },
    AutoSuspensionBurst {
        username: String,
        user_id: i64,
        count: usize,
        window_seconds: u64,
        reason: String,
    },
    AutoSuspensionSpam {
        username: String,
        user_id: i64,
        match_type: String,
        similar_messages: usize,
        window_seconds: u64,
        reason: String,
    },
    AdminSuspendUser {
        actor_username: String,
        actor_id: i64,
        target_username: String,
        target_id: i64,
        reason: Option<String>,
    },
    AdminUnsuspendUser {
        actor_username: String,
        actor_id: i64,
        target_username: String,
        target_id: i64,
    },
    AdminDeleteUser {
        actor_username: String,
        actor_id: i64,
        target_username: String,
        target_id: i64,
    },
    AdminVerifyToggle {
        actor_username: String,
        actor_id: i64,
        target_username: String,
        target_id: i64,
        verified: bool,
    },
    BlocklistAdd { actor_username: String, actor_id: i64, added: Vec<String>, total: usize },
    BlocklistRemove { actor_username: String, actor_id: i64, removed: Vec<String>, total: usize },
}

#[derive(Debug)]
pub enum PublicChatEvent {
    MessageCreated {
        message_id: i64,
        username: String,
        user_id: i64,
        reply_to: Option<i64>,
        content: String,
    },
    MessageEdited {
        message_id: i64,
        username: String,
        user_id: i64,
        previous_content: String,
        content: String,
    },
    MessageDeleted {
        message_id: i64,
        actor_username: String,
        actor_id: i64,
        original_author_id: i64,
        content: String,
    },
    ReactionUpdate {
        message_id: i64,
        action: String,
        username: String,
        user_id: i64,
        emoji: String,
    },
}

/// DM stream events. Content is ciphertext and is never logged.
#[derive(Debug)]
pub enum DmEvent {
    MessageSent {
        envelope_id: i64,
        sender_username: String,
        sender_id: i64,
        recipient_id: i64,
        reply_to: Option<i64>,
    },
    MessageEdited { envelope_id: i64, username: String, user_id: i64 },
    MessageDeleted { envelope_id: i64, username: String, user_id: i64, recipient_id: i64 },
    ReactionUpdate {
        envelope_id: i64,
        action: String,
        username: String,
        user_id: i64,
        emoji: String,
    },
}

#[derive(Debug)]
pub enum AccessEvent {
    HttpRequest { method: String, path: String, status: u16, user: Option<String>, ip: Option<String> },
    WsConnect { path: String, ip: Option<String> },
    WsDisconnect { path: String, code: Option<u16>, reason: Option<String>, ip: Option<String> },
    WsEvent {
        path: String,
        event: String,
        username: Option<String>,
        user_id: Option<i64>,
        ip: Option<String>,
    },
}

// --- Rendering ---

fn render_security(event: &SecurityEvent) -> Vec<String> {
    match event {
        SecurityEvent::LoginSuccess { username, user_id, session_id, client, ip } => {
            let mut lines = vec![format!("Login approved for {}", fmt_user(username, *user_id))];
            lines.push(format!("Session: {session_id}"));
            if let Some(client) = client {
                lines.push(format!("Client: {client}"));
            }
            if let Some(ip) = ip {
                lines.push(format!("IP address: {ip}"));
            }
            lines
        }
        SecurityEvent::LoginFailed { username, reason, ip } => {
            let mut lines = vec![format!("Login denied for @{username}")];
            lines.push(format!("Reason: {reason}"));
            if let Some(ip) = ip {
                lines.push(format!("IP address: {ip}"));
            }
            lines
        }
        SecurityEvent::RegistrationSuccess { username, display_name, user_id, ip, user_agent } => {
            let mut lines = vec!["Account registered".to_string()];
            lines.push(format!("Display name: {display_name}"));
            lines.push(format!("Username: @{username}"));
            if let Some(ip) = ip {
                lines.push(format!("IP: {ip}"));
            }
            if let Some(ua) = user_agent {
                lines.push(format!("User agent: {ua}"));
            }
            lines.push(format!("User ID: {user_id}"));
            lines
        }
        SecurityEvent::PasswordChanged { username, user_id, logout_others, ip } => {
            let mut lines =
                vec![format!("Password changed for {}", fmt_user(username, *user_id))];
            lines.push(format!("Other sessions revoked: {}", yes_no(*logout_others)));
            if let Some(ip) = ip {
                lines.push(format!("IP address: {ip}"));
            }
            lines
        }
        SecurityEvent::Logout { username, user_id, session_id, ip } => {
            let mut lines = vec![format!("Logout recorded for {}", fmt_user(username, *user_id))];
            lines.push(format!("Session: {session_id}"));
            if let Some(ip) = ip {
                lines.push(format!("IP address: {ip}"));
            }
            lines
        }
        SecurityEvent::AutoSuspensionBurst { username, user_id, count, window_seconds, reason } => {
            vec![
                format!("Automatic suspension triggered for {}", fmt_user(username, *user_id)),
                format!("Messages sent: {count} within {window_seconds} seconds"),
                format!("Reason: {reason}"),
            ]
        }
        SecurityEvent::AutoSuspensionSpam {
            username,
            user_id,
            match_type,
            similar_messages,
            window_seconds,
            reason,
        } => {
            vec![
                format!("Automatic suspension triggered for {}", fmt_user(username, *user_id)),
                format!("Match type: {match_type}"),
                format!("Similar messages detected: {similar_messages}"),
                format!("Observation window: {window_seconds} seconds"),
                format!("Reason: {reason}"),
            ]
        }
        SecurityEvent::AdminSuspendUser { actor_username, actor_id, target_username, target_id, reason } => {
            let mut lines = vec![
                "User suspension".to_string(),
                format!("Actor: {}", fmt_user(actor_username, *actor_id)),
                format!("Target: {}", fmt_user(target_username, *target_id)),
            ];
            if let Some(reason) = reason {
                lines.push(format!("Reason: {reason}"));
            }
            lines
        }
        SecurityEvent::AdminUnsuspendUser { actor_username, actor_id, target_username, target_id } => {
            vec![
                "User unsuspension".to_string(),
                format!("Actor: {}", fmt_user(actor_username, *actor_id)),
                format!("Target: {}", fmt_user(target_username, *target_id)),
            ]
        }
        SecurityEvent::AdminDeleteUser { actor_username, actor_id, target_username, target_id } => {
            vec![
                "Account removal".to_string(),
                format!("Actor: {}", fmt_user(actor_username, *actor_id)),
                format!("Target: {}", fmt_user(target_username, *target_id)),
            ]
        }
        SecurityEvent::AdminVerifyToggle {
            actor_username,
            actor_id,
            target_username,
            target_id,
            verified,
        } => {
            vec![
                "User verification".to_string(),
                format!("Actor: {}", fmt_user(actor_username, *actor_id)),
                format!("Target: {}", fmt_user(target_username, *target_id)),
                format!("Verified: {}", yes_no(*verified)),
            ]
        }
        SecurityEvent::BlocklistAdd { actor_username, actor_id, added, total } => {
            let mut lines =
                vec![format!("Blocklist updated by {}", fmt_user(actor_username, *actor_id))];
            if !added.is_empty() {
                lines.push(format!("Added entries: {}", added.join(", ")));
            }
            lines.push(format!("Total entries: {total}"));
            lines
        }
        SecurityEvent::BlocklistRemove { actor_username, actor_id, removed, total } => {
            let mut lines =
                vec![format!("Blocklist cleaned by {}", fmt_user(actor_username, *actor_id))];
            if !removed.is_empty() {
                lines.push(format!("Removed entries: {}", removed.join(", ")));
            }
            lines.push(format!("Total entries: {total}"));
            lines
        }
    }
}

fn render_public_chat(event: &PublicChatEvent) -> Vec<String> {
    match event {
        PublicChatEvent::MessageCreated { message_id, username, user_id, reply_to, content } => {
            let mut lines =
                vec![format!("Message #{message_id} sent by {}", fmt_user(username, *user_id))];
            if let Some(reply) = reply_to {
                lines.push(format!("In reply to message #{reply}"));
            }
            quote_content(&mut lines, "Content:", content);
            lines
        }
        PublicChatEvent::MessageEdited { message_id, username, user_id, previous_content, content } => {
            let mut lines =
                vec![format!("Message #{message_id} edited by {}", fmt_user(username, *user_id))];
            quote_content(&mut lines, "Previous content:", previous_content);
            quote_content(&mut lines, "New content:", content);
            lines
        }
        PublicChatEvent::MessageDeleted {
            message_id,
            actor_username,
            actor_id,
            original_author_id,
            content,
        } => {
            let mut lines = vec![
                format!("Message #{message_id} deleted"),
                format!("Actor: {}", fmt_user(actor_username, *actor_id)),
                format!("Original author: user #{original_author_id}"),
            ];
            quote_content(&mut lines, "Previous content:", content);
            lines
        }
        PublicChatEvent::ReactionUpdate { message_id, action, username, user_id, emoji } => {
            vec![
                format!("Reaction {action} on message #{message_id}"),
                format!("User: {}", fmt_user(username, *user_id)),
                format!("Emoji: {emoji}"),
            ]
        }
    }
}

fn render_dm(event: &DmEvent) -> Vec<String> {
    match event {
        DmEvent::MessageSent { envelope_id, sender_username, sender_id, recipient_id, reply_to } => {
            let mut lines = vec![
                format!("Direct message #{envelope_id} sent"),
                format!("Sender: {}", fmt_user(sender_username, *sender_id)),
                format!("Recipient: user id {recipient_id}"),
            ];
            if let Some(reply) = reply_to {
                lines.push(format!("In reply to DM #{reply}"));
            }
            lines
        }
        DmEvent::MessageEdited { envelope_id, username, user_id } => {
            vec![
                format!("Direct message #{envelope_id} edited"),
                format!("Author: {}", fmt_user(username, *user_id)),
            ]
        }
        DmEvent::MessageDeleted { envelope_id, username, user_id, recipient_id } => {
            vec![
                format!("Direct message #{envelope_id} deleted"),
                format!("Actor: {}", fmt_user(username, *user_id)),
                format!("Recipient: user id {recipient_id}"),
            ]
        }
        DmEvent::ReactionUpdate { envelope_id, action, username, user_id, emoji } => {
            vec![
                format!("Reaction {action} on DM #{envelope_id}"),
                format!("User: {}", fmt_user(username, *user_id)),
                format!("Emoji: {emoji}"),
            ]
        }
    }
}

fn localhost_display(ip: &Option<String>) -> Option<String> {
    ip.as_ref().map(|ip| {
        if ip == "127.0.0.1" || ip == "::1" { "localhost".to_string() } else { ip.clone() }
    })
}

fn render_access(event: &AccessEvent) -> Vec<String> {
    match event {
        AccessEvent::HttpRequest { method, path, status, user, ip } => {
            let mut first = format!("{method} {path}");
            if let Some(ip) = localhost_display(ip) {
                first.push_str(&format!(" from {ip}"));
            }
            first.push_str(&format!(" -> {status}"));
            let mut lines = vec![first];
            if let Some(user) = user {
                lines.push(format!("Authenticated user: @{user}"));
            }
            lines
        }
        AccessEvent::WsConnect { path, ip } => {
            let mut lines = vec!["WebSocket connected".to_string()];
            lines.push(format!("Endpoint: {path}"));
            if let Some(ip) = localhost_display(ip) {
                lines.push(format!("IP: {ip}"));
            }
            lines
        }
        AccessEvent::WsDisconnect { path, code, reason, ip } => {
            let mut lines = vec!["WebSocket disconnected".to_string()];
            lines.push(format!("Endpoint: {path}"));
            if let Some(code) = code {
                let reason = reason.clone().unwrap_or_else(|| "no reason".to_string());
                lines.push(format!("Code {code} ({reason})"));
            }
            if let Some(ip) = localhost_display(ip) {
                lines.push(format!("IP: {ip}"));
            }
            lines
        }
        AccessEvent::WsEvent { path, event, username, user_id, ip } => {
            let mut first = format!("WS {path}");
            if let Some(ip) = localhost_display(ip) {
                first.push_str(&format!(" from {ip}"));
            }
            first.push_str(&format!(" -> {event}"));
            let mut lines = vec![first];
            if let (Some(username), Some(user_id)) = (username, user_id) {
                lines.push(format!("Authenticated user: {}", fmt_user(username, *user_id)));
            }
            lines
        }
    }
}

impl AuditLog {
    pub fn new(data_dir: &str) -> Self {
        let dir = PathBuf::from(data_dir).join("logs");
        fs::create_dir_all(&dir).ok();
        Self {
            security: Mutex::new(LogStream::new(&dir, "security.log")),
            public_chat: Mutex::new(LogStream::new(&dir, "public-chat.log")),
            dm: Mutex::new(LogStream::new(&dir, "dm.log")),
            access: Mutex::new(LogStream::new(&dir, "access.log")),
        }
    }

    pub fn security(&self, event: SecurityEvent) {
        self.security
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(&render_security(&event));
    }

    pub fn public_chat(&self, event: PublicChatEvent) {
        self.public_chat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(&render_public_chat(&event));
    }

    pub fn dm(&self, event: DmEvent) {
        self.dm.lock().unwrap_or_else(|e| e.into_inner()).write(&render_dm(&event));
    }

    pub fn access(&self, event: AccessEvent) {
        self.access
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(&render_access(&event));
    }
}
