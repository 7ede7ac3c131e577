use crate::Core;
use crate::audit::SecurityEvent;
use crate::error::{ChatError, ChatResult};
use crate::hub::Update;
use crate::models::User;
use std::sync::Arc;

/// Owner-only mutations over account state and the blocklist. Every call
/// takes effect in the store first, then fans out to live sessions.
pub fn ensure_owner(actor: &User) -> ChatResult<()> {
    if !actor.is_owner() {
        return Err(ChatError::Forbidden(
            "Only the owner can perform this action".to_string(),
        ));
    }
    Ok(())
}

pub fn suspend_user(core: &Arc<Core>, actor: &User, target_id: i64, reason: &str) -> ChatResult<User> {
    ensure_owner(actor)?;
    let target = core.db.find_user_by_id(target_id)?;
    if target.is_owner() {
        return Err(ChatError::Forbidden("The owner cannot be suspended".to_string()));
    }
    core.db.set_suspended(target_id, true, Some(reason))?;

    // No sessions are revoked; the next authenticated request is denied by
    // policy, and live sessions learn immediately through the update.
    core.hub.to_user(
        target_id,
        &Update::new("suspended", serde_json::json!({"reason": reason})),
    );

    core.audit.security(SecurityEvent::AdminSuspendUser {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        target_username: target.username.clone(),
        target_id,
        reason: Some(reason.to_string()),
    });
    core.db.find_user_by_id(target_id)
}

pub fn unsuspend_user(core: &Arc<Core>, actor: &User, target_id: i64) -> ChatResult<User> {
    ensure_owner(actor)?;
    let target = core.db.find_user_by_id(target_id)?;
    core.db.set_suspended(target_id, false, None)?;
    core.spam.clear(target_id);

    core.audit.security(SecurityEvent::AdminUnsuspendUser {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        target_username: target.username.clone(),
        target_id,
    });
    core.db.find_user_by_id(target_id)
}

pub fn delete_user(core: &Arc<Core>, actor: &User, target_id: i64) -> ChatResult<()> {
    ensure_owner(actor)?;
    let target = core.db.find_user_by_id(target_id)?;
    if target.is_owner() {
        return Err(ChatError::Forbidden("The owner cannot be deleted".to_string()));
    }
    core.db.set_deleted(target_id)?;
    for session in core.hub.sessions_of(target_id) {
        core.hub.close_session(&session);
    }

    core.audit.security(SecurityEvent::AdminDeleteUser {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        target_username: target.username.clone(),
        target_id,
    });
    Ok(())
}

/// Toggle semantics: each call flips the flag and reports the new value.
pub fn toggle_verify(core: &Arc<Core>, actor: &User, target_id: i64) -> ChatResult<bool> {
    ensure_owner(actor)?;
    let target = core.db.find_user_by_id(target_id)?;
    let verified = core.db.toggle_verified(target_id)?;

    core.audit.security(SecurityEvent::AdminVerifyToggle {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        target_username: target.username.clone(),
        target_id,
        verified,
    });
    Ok(verified)
}

pub fn blocklist_add(core: &Arc<Core>, actor: &User, words: &[String]) -> ChatResult<(Vec<String>, Vec<String>)> {
    ensure_owner(actor)?;
    let (added, all) = core.profanity.add_terms(words);
    core.audit.security(SecurityEvent::BlocklistAdd {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        added: added.clone(),
        total: all.len(),
    });
    Ok((added, all))
}

pub fn blocklist_remove(core: &Arc<Core>, actor: &User, words: &[String]) -> ChatResult<(Vec<String>, Vec<String>)> {
    ensure_owner(actor)?;
    let (removed, all) = core.profanity.remove_terms(words);
    core.audit.security(SecurityEvent::BlocklistRemove {
        actor_username: actor.username.clone(),
        actor_id: actor.id,
        removed: removed.clone(),
        total: all.len(),
    });
    Ok((removed, all))
}

/// Drop a user's spam windows (admin rate-limit clear).
pub fn clear_rate_limits(core: &Arc<Core>, actor: &User, target_id: i64) -> ChatResult<()> {
    ensure_owner(actor)?;
    core.spam.clear(target_id);
    Ok(())
}
