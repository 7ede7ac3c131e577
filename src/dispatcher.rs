use crate::Core;
use crate::audit::{AccessEvent, DmEvent, PublicChatEvent, SecurityEvent};
use crate::auth;
use crate::db::ReactionKind;
use crate::error::{ChatError, ChatResult};
use crate::hub::{AuthInfo, Session, Update};
use crate::models::*;
use crate::spam::{REASON_BURST, REASON_SPAM, SpamVerdict};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Inbound command table. Every entry currently requires authentication;
/// the flag is part of the record so unauthenticated commands can be added
/// without touching the dispatch flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    GetMessages,
    SendMessage,
    EditMessage,
    DeleteMessage,
    DmSend,
    DmEdit,
    DmDelete,
    AddReaction,
    AddDmReaction,
    SubscribeStatus,
    UnsubscribeStatus,
    Typing,
    StopTyping,
    DmTyping,
    StopDmTyping,
    CallSignaling,
    CallVideoToggle,
    CallScreenShareToggle,
    GetUpdates,
}

impl Command {
    pub fn parse(kind: &str) -> Option<Command> {
        Some(match kind {
            "ping" => Command::Ping,
            "getMessages" => Command::GetMessages,
            "sendMessage" => Command::SendMessage,
            "editMessage" => Command::EditMessage,
            "deleteMessage" => Command::DeleteMessage,
            "dmSend" => Command::DmSend,
            "dmEdit" => Command::DmEdit,
            "dmDelete" => Command::DmDelete,
            "addReaction" => Command::AddReaction,
            "addDmReaction" => Command::AddDmReaction,
            "subscribeStatus" => Command::SubscribeStatus,
            "unsubscribeStatus" => Command::UnsubscribeStatus,
            "typing" => Command::Typing,
            "stopTyping" => Command::StopTyping,
            "dmTyping" => Command::DmTyping,
            "stopDmTyping" => Command::StopDmTyping,
            "call_signaling" => Command::CallSignaling,
            "call_video_toggle" => Command::CallVideoToggle,
            "call_screen_share_toggle" => Command::CallScreenShareToggle,
            "getUpdates" => Command::GetUpdates,
            _ => return None,
        })
    }

    pub fn auth_required(&self) -> bool {
        true
    }

    /// Typing traffic gets no confirmation reply and no per-frame audit line.
    fn is_typing(&self) -> bool {
        matches!(
            self,
            Command::Typing | Command::StopTyping | Command::DmTyping | Command::StopDmTyping
        )
    }
}

fn payload<T: serde::de::DeserializeOwned>(frame: &serde_json::Value) -> ChatResult<T> {
    let data = frame.get("data").cloned().unwrap_or(serde_json::json!({}));
    serde_json::from_value(data).map_err(|e| ChatError::Validation(format!("Invalid payload: {e}")))
}

fn extract_token(frame: &serde_json::Value) -> Option<String> {
    frame
        .get("credentials")?
        .get("credentials")?
        .as_str()
        .map(String::from)
}

/// Route one inbound frame. Replies and fan-out go through the hub; the
/// transport never blocks on this path. No error escapes to the read loop.
pub fn dispatch(
    core: &Arc<Core>,
    session: &Arc<Session>,
    frame: serde_json::Value,
    client_ip: Option<&str>,
) {
    let kind = frame
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();
    let Some(command) = Command::parse(&kind) else {
        core.hub.direct_send(
            session,
            &serde_json::json!({"type": kind, "error": {"code": 400, "detail": "Invalid type"}}),
        );
        return;
    };

    let user = if command.auth_required() {
        let Some(token) = extract_token(&frame) else {
            reply_error(core, session, &kind, &ChatError::AuthRequired("Missing credentials".to_string()));
            return;
        };
        match auth::authenticate(&core.db, &core.config, &token) {
            Ok((user, claims)) => {
                core.hub.bind_user(
                    session,
                    AuthInfo {
                        user_id: user.id,
                        username: user.username.clone(),
                        device_session_id: claims.session_id,
                    },
                );
                user
            }
            Err(e) => {
                reply_error(core, session, &kind, &e);
                return;
            }
        }
    } else {
        unreachable!("every command in the table requires auth");
    };

    if !command.is_typing() {
        core.audit.access(AccessEvent::WsEvent {
            path: "/chat/ws".to_string(),
            event: kind.clone(),
            username: Some(user.username.clone()),
            user_id: Some(user.id),
            ip: client_ip.map(String::from),
        });
    }

    let result = match command {
        Command::Ping => handle_ping(core, &user),
        Command::GetMessages => handle_get_messages(core),
        Command::SendMessage => handle_send_message(core, &user, &frame),
        Command::EditMessage => handle_edit_message(core, &user, &frame),
        Command::DeleteMessage => handle_delete_message(core, &user, &frame),
        Command::DmSend => handle_dm_send(core, &user, &frame),
        Command::DmEdit => handle_dm_edit(core, &user, &frame),
        Command::DmDelete => handle_dm_delete(core, &user, &frame),
        Command::AddReaction => handle_add_reaction(core, &user, &frame),
        Command::AddDmReaction => handle_add_dm_reaction(core, &user, &frame),
        Command::SubscribeStatus => handle_subscribe_status(core, session, &user, &frame),
        Command::UnsubscribeStatus => handle_unsubscribe_status(session, &frame),
        Command::Typing => handle_typing(core, &user),
        Command::StopTyping => handle_stop_typing(core, &user),
        Command::DmTyping => handle_dm_typing(core, &user, &frame),
        Command::StopDmTyping => handle_stop_dm_typing(core, &user, &frame),
        Command::CallSignaling => handle_call_signaling(core, &user, &frame),
        Command::CallVideoToggle => handle_call_toggle(core, &user, &frame, "call_video_toggle"),
        Command::CallScreenShareToggle => {
            handle_call_toggle(core, &user, &frame, "call_screen_share_toggle")
        }
        Command::GetUpdates => handle_get_updates(core, session, &user, &frame),
    };

    match result {
        Ok(Some(data)) => {
            core.hub
                .direct_send(session, &serde_json::json!({"type": kind, "data": data}));
        }
        Ok(None) => {}
        Err(e) => {
            if let ChatError::Internal(detail) = &e {
                eprintln!("⚠️ Handler {kind} failed: {detail}");
            }
            reply_error(core, session, &kind, &e);
        }
    }
}

fn reply_error(core: &Arc<Core>, session: &Arc<Session>, kind: &str, error: &ChatError) {
    core.hub.direct_send(
        session,
        &serde_json::json!({"type": kind, "error": error.to_frame()}),
    );
}

// --- Message conversion ---

/// Wire shape for a public message, with its reply nested one level deep.
pub fn message_json(core: &Core, msg: &PublicMessage, username: &str) -> serde_json::Value {
    let files: Vec<serde_json::Value> = core
        .db
        .message_files(msg.id)
        .unwrap_or_default()
        .iter()
        .map(|f| {
            serde_json::json!({
                "path": f.path,
                "filename": f.filename,
                "content_type": f.content_type,
                "size": f.size,
            })
        })
        .collect();
    let reply_to = msg.reply_to_id.and_then(|reply_id| {
        let reply = core.db.find_public_message(reply_id).ok()?;
        let author = core.db.find_user_by_id(reply.author_id).ok()?;
        Some(serde_json::json!({
            "id": reply.id,
            "content": reply.content,
            "timestamp": reply.timestamp,
            "is_edited": reply.is_edited,
            "username": author.username,
        }))
    });
    let reactions = core
        .db
        .reaction_set(ReactionKind::Public, msg.id)
        .unwrap_or_default();
    serde_json::json!({
        "id": msg.id,
        "content": msg.content,
        "timestamp": msg.timestamp,
        "is_edited": msg.is_edited,
        "username": username,
        "user_id": msg.author_id,
        "reply_to": reply_to,
        "files": files,
        "reactions": reactions,
    })
}

// --- Handlers ---

fn handle_ping(core: &Arc<Core>, user: &User) -> ChatResult<Option<serde_json::Value>> {
    core.db.set_online(user.id, true)?;
    let last_seen = chrono::Utc::now().to_rfc3339();
    core.hub.notify_status(user.id, true, Some(last_seen));
    Ok(Some(serde_json::json!({"status": "success"})))
}

fn handle_get_messages(core: &Arc<Core>) -> ChatResult<Option<serde_json::Value>> {
    let rows = core.db.public_messages()?;
    let messages: Vec<serde_json::Value> = rows
        .iter()
        .map(|(msg, username)| message_json(core, msg, username))
        .collect();
    Ok(Some(serde_json::json!({"status": "success", "messages": messages})))
}

fn validate_content(core: &Core, content: &str) -> ChatResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("No content provided".to_string()));
    }
    if trimmed.chars().count() > 4096 {
        return Err(ChatError::Validation("Message too long".to_string()));
    }
    if core.profanity.contains_profanity(trimmed) {
        return Err(ChatError::ContentPolicy(
            "Message contains blocked content".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn handle_send_message(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: SendMessagePayload = payload(frame)?;
    let trimmed = validate_content(core, &request.content)?;
    let stored = escape_html(&trimmed);
    let message = core
        .db
        .insert_public_message(user.id, &stored, request.reply_to_id)?;

    core.audit.public_chat(PublicChatEvent::MessageCreated {
        message_id: message.id,
        username: user.username.clone(),
        user_id: user.id,
        reply_to: message.reply_to_id,
        content: stored.clone(),
    });

    if !user.is_owner() && !user.suspended {
        let verdict = core.spam.record(user.id, message.id, &trimmed);
        if let Some(reason) = enforce_spam(core, user, &verdict)? {
            return Err(ChatError::Suspended(reason));
        }
    }

    let converted = message_json(core, &message, &user.username);
    core.hub.broadcast(&Update::new("newMessage", converted.clone()));
    core.notifier.public_message_posted(message.id, user.id);

    Ok(Some(serde_json::json!({"status": "success", "message": converted})))
}

/// Apply a spam verdict: suspend, retract the offending rows, tell the
/// user's sessions, and record the audit trail. Returns the suspension
/// reason when enforcement fired.
fn enforce_spam(core: &Arc<Core>, user: &User, verdict: &SpamVerdict) -> ChatResult<Option<String>> {
    let (reason, message_ids) = match verdict {
        SpamVerdict::Clean => return Ok(None),
        SpamVerdict::Burst { count, message_ids } => {
            core.audit.security(SecurityEvent::AutoSuspensionBurst {
                username: user.username.clone(),
                user_id: user.id,
                count: *count,
                window_seconds: core.spam.burst_window_secs(),
                reason: REASON_BURST.to_string(),
            });
            (REASON_BURST.to_string(), message_ids.clone())
        }
        SpamVerdict::ShortRepeat { occurrences, message_ids } => {
            core.audit.security(SecurityEvent::AutoSuspensionSpam {
                username: user.username.clone(),
                user_id: user.id,
                match_type: "exact".to_string(),
                similar_messages: *occurrences,
                window_seconds: core.spam.spam_window_secs(),
                reason: REASON_SPAM.to_string(),
            });
            (REASON_SPAM.to_string(), message_ids.clone())
        }
        SpamVerdict::SimilarRepeat { similar, message_ids } => {
            core.audit.security(SecurityEvent::AutoSuspensionSpam {
                username: user.username.clone(),
                user_id: user.id,
                match_type: "similar".to_string(),
                similar_messages: *similar,
                window_seconds: core.spam.spam_window_secs(),
                reason: REASON_SPAM.to_string(),
            });
            (REASON_SPAM.to_string(), message_ids.clone())
        }
    };

    core.db.set_suspended(user.id, true, Some(&reason))?;
    core.db.delete_public_messages_by_ids(&message_ids)?;
    core.hub.to_user(
        user.id,
        &Update::new("suspended", serde_json::json!({"reason": reason})),
    );
    for message_id in &message_ids {
        core.hub.broadcast(&Update::new(
            "messageDeleted",
            serde_json::json!({"message_id": message_id}),
        ));
    }
    Ok(Some(reason))
}

fn handle_edit_message(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: EditMessagePayload = payload(frame)?;
    let trimmed = validate_content(core, &request.content)?;
    let stored = escape_html(&trimmed);
    let previous = core.db.find_public_message(request.message_id)?;
    let message = core
        .db
        .edit_public_message(request.message_id, user.id, &stored)?;

    core.audit.public_chat(PublicChatEvent::MessageEdited {
        message_id: message.id,
        username: user.username.clone(),
        user_id: user.id,
        previous_content: previous.content,
        content: stored,
    });

    let converted = message_json(core, &message, &user.username);
    core.hub.broadcast(&Update::new("messageEdited", converted.clone()));
    Ok(Some(serde_json::json!({"status": "success", "message": converted})))
}

fn handle_delete_message(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DeleteMessagePayload = payload(frame)?;
    let (content, author_id) =
        core.db
            .delete_public_message(request.message_id, user.id, user.is_owner())?;

    core.audit.public_chat(PublicChatEvent::MessageDeleted {
        message_id: request.message_id,
        actor_username: user.username.clone(),
        actor_id: user.id,
        original_author_id: author_id,
        content,
    });

    core.hub.broadcast(&Update::new(
        "messageDeleted",
        serde_json::json!({"message_id": request.message_id}),
    ));
    Ok(Some(serde_json::json!({"status": "success", "message_id": request.message_id})))
}

fn handle_dm_send(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmSendPayload = payload(frame)?;
    let envelope = core.db.insert_dm(user.id, &request)?;
    let wire = envelope.wire_json();

    core.hub.to_user(envelope.recipient_id, &Update::new("dmNew", wire.clone()));
    core.hub.to_user(envelope.sender_id, &Update::new("dmNew", wire));
    core.notifier.dm_posted(envelope.id, user.id);

    core.audit.dm(DmEvent::MessageSent {
        envelope_id: envelope.id,
        sender_username: user.username.clone(),
        sender_id: user.id,
        recipient_id: envelope.recipient_id,
        reply_to: envelope.reply_to_id,
    });

    Ok(Some(serde_json::json!({"status": "ok", "id": envelope.id})))
}

fn handle_dm_edit(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmEditPayload = payload(frame)?;
    let envelope = core.db.edit_dm(user.id, &request)?;
    let wire = envelope.wire_json();

    core.hub.to_user(envelope.recipient_id, &Update::new("dmEdited", wire.clone()));
    core.hub.to_user(envelope.sender_id, &Update::new("dmEdited", wire));

    core.audit.dm(DmEvent::MessageEdited {
        envelope_id: envelope.id,
        username: user.username.clone(),
        user_id: user.id,
    });

    Ok(Some(serde_json::json!({"status": "ok", "id": envelope.id})))
}

fn handle_dm_delete(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmDeletePayload = payload(frame)?;
    let envelope = core.db.delete_dm(request.id, user.id)?;
    let data = serde_json::json!({
        "id": envelope.id,
        "senderId": envelope.sender_id,
        "recipientId": envelope.recipient_id,
    });

    core.hub.to_user(envelope.recipient_id, &Update::new("dmDeleted", data.clone()));
    core.hub.to_user(envelope.sender_id, &Update::new("dmDeleted", data));

    core.audit.dm(DmEvent::MessageDeleted {
        envelope_id: envelope.id,
        username: user.username.clone(),
        user_id: user.id,
        recipient_id: envelope.recipient_id,
    });

    Ok(Some(serde_json::json!({"status": "ok", "id": envelope.id})))
}

fn handle_add_reaction(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: ReactionPayload = payload(frame)?;
    if request.emoji.is_empty() || request.emoji.chars().count() > 10 {
        return Err(ChatError::Validation("Invalid emoji".to_string()));
    }
    let (outcome, reactions) = core.db.toggle_reaction(
        ReactionKind::Public,
        request.message_id,
        user.id,
        &request.emoji,
    )?;

    core.hub.broadcast(&Update::new(
        "reactionUpdate",
        serde_json::json!({
            "message_id": request.message_id,
            "emoji": request.emoji,
            "action": outcome.as_str(),
            "user_id": user.id,
            "username": user.username,
            "reactions": reactions,
        }),
    ));

    core.audit.public_chat(PublicChatEvent::ReactionUpdate {
        message_id: request.message_id,
        action: outcome.as_str().to_string(),
        username: user.username.clone(),
        user_id: user.id,
        emoji: request.emoji.clone(),
    });

    Ok(Some(serde_json::json!({"status": "ok", "action": outcome.as_str(), "reactions": reactions})))
}

fn handle_add_dm_reaction(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmReactionPayload = payload(frame)?;
    if request.emoji.is_empty() || request.emoji.chars().count() > 10 {
        return Err(ChatError::Validation("Invalid emoji".to_string()));
    }
    let envelope = core.db.find_dm(request.dm_envelope_id)?;
    if user.id != envelope.sender_id && user.id != envelope.recipient_id {
        return Err(ChatError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }
    let (outcome, reactions) = core.db.toggle_reaction(
        ReactionKind::Dm,
        request.dm_envelope_id,
        user.id,
        &request.emoji,
    )?;

    let update = Update::new(
        "dmReactionUpdate",
        serde_json::json!({
            "dm_envelope_id": request.dm_envelope_id,
            "emoji": request.emoji,
            "action": outcome.as_str(),
            "user_id": user.id,
            "username": user.username,
            "reactions": reactions,
        }),
    );
    // DM metadata stays between the two participants.
    core.hub.to_user(envelope.sender_id, &update);
    core.hub.to_user(envelope.recipient_id, &update);

    core.audit.dm(DmEvent::ReactionUpdate {
        envelope_id: request.dm_envelope_id,
        action: outcome.as_str().to_string(),
        username: user.username.clone(),
        user_id: user.id,
        emoji: request.emoji.clone(),
    });

    Ok(Some(serde_json::json!({"status": "ok", "action": outcome.as_str(), "reactions": reactions})))
}

fn handle_subscribe_status(
    core: &Arc<Core>,
    session: &Arc<Session>,
    _user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: StatusSubscribePayload = payload(frame)?;
    let target = core.db.find_user_by_id(request.user_id)?;
    session
        .subscriptions
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(request.user_id);
    core.hub.direct_send(
        session,
        &serde_json::json!({
            "type": "statusUpdate",
            "data": {
                "userId": target.id,
                "online": target.online,
                "lastSeen": target.last_seen,
            }
        }),
    );
    Ok(Some(serde_json::json!({"status": "ok"})))
}

fn handle_unsubscribe_status(
    session: &Arc<Session>,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: StatusSubscribePayload = payload(frame)?;
    session
        .subscriptions
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&request.user_id);
    Ok(Some(serde_json::json!({"status": "ok"})))
}

fn handle_typing(core: &Arc<Core>, user: &User) -> ChatResult<Option<serde_json::Value>> {
    if core.typing.public_typing(user.id, &user.username) {
        core.hub.broadcast(&Update::new(
            "typing",
            serde_json::json!({"userId": user.id, "username": user.username}),
        ));
    }
    // No confirmation reply: typing traffic stays one-way.
    Ok(None)
}

fn handle_stop_typing(core: &Arc<Core>, user: &User) -> ChatResult<Option<serde_json::Value>> {
    if core.typing.public_stop(user.id) {
        core.hub.broadcast(&Update::new(
            "stopTyping",
            serde_json::json!({"userId": user.id, "username": user.username}),
        ));
    }
    Ok(None)
}

fn handle_dm_typing(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmTypingPayload = payload(frame)?;
    if core.typing.dm_typing(user.id, request.recipient_id, &user.username) {
        core.hub.to_user(
            request.recipient_id,
            &Update::new(
                "dmTyping",
                serde_json::json!({"userId": user.id, "username": user.username}),
            ),
        );
    }
    Ok(None)
}

fn handle_stop_dm_typing(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: DmTypingPayload = payload(frame)?;
    if core.typing.dm_stop(user.id, request.recipient_id) {
        core.hub.to_user(
            request.recipient_id,
            &Update::new(
                "stopDmTyping",
                serde_json::json!({"userId": user.id, "username": user.username}),
            ),
        );
    }
    Ok(None)
}

fn handle_call_signaling(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let mut data = frame.get("data").cloned().unwrap_or(serde_json::json!({}));
    let to_user_id = data
        .get("toUserId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ChatError::Validation("Missing toUserId".to_string()))?;
    // The sender identity is always set by the server.
    if let Some(obj) = data.as_object_mut() {
        obj.insert("fromUserId".to_string(), serde_json::json!(user.id));
        obj.insert("fromUsername".to_string(), serde_json::json!(user.username));
    }
    // Signaling is latency-sensitive; bypass batching.
    let frame_out = serde_json::json!({"type": "call_signaling", "data": data});
    for session in core.hub.sessions_of(to_user_id) {
        core.hub.direct_send(&session, &frame_out);
    }
    Ok(Some(serde_json::json!({"status": "ok"})))
}

fn handle_call_toggle(
    core: &Arc<Core>,
    user: &User,
    frame: &serde_json::Value,
    toggle_kind: &str,
) -> ChatResult<Option<serde_json::Value>> {
    let data = frame.get("data").cloned().unwrap_or(serde_json::json!({}));
    let to_user_id = data
        .get("toUserId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ChatError::Validation("Missing toUserId".to_string()))?;
    let enabled = data.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
    core.hub.to_user(
        to_user_id,
        &Update::new(
            "call_signaling",
            serde_json::json!({
                "type": toggle_kind,
                "fromUserId": user.id,
                "toUserId": to_user_id,
                "data": {"enabled": enabled},
            }),
        ),
    );
    Ok(Some(serde_json::json!({"status": "ok"})))
}

fn handle_get_updates(
    core: &Arc<Core>,
    session: &Arc<Session>,
    user: &User,
    frame: &serde_json::Value,
) -> ChatResult<Option<serde_json::Value>> {
    let request: GetUpdatesPayload = payload(frame)?;
    let current_seq = core.hub.sequencer().current_seq(user.id);
    let mut missed_count = 0usize;
    if request.last_seq > 0 && request.last_seq < current_seq {
        let batches = core
            .db
            .fetch_update_log(user.id, request.last_seq, current_seq)?;
        for batch in &batches {
            let updates: serde_json::Value =
                serde_json::from_str(&batch.updates).unwrap_or(serde_json::json!([]));
            core.hub.direct_send(
                session,
                &serde_json::json!({
                    "type": "updates",
                    "seq": batch.sequence,
                    "updates": updates,
                }),
            );
        }
        missed_count = batches.len();
    }
    session.last_ack_seq.store(current_seq, Ordering::SeqCst);
    Ok(Some(serde_json::json!({
        "status": "ok",
        "lastSeq": current_seq,
        "missedCount": missed_count,
    })))
}
