use crate::Core;
use crate::audit::SecurityEvent;
use crate::auth;
use crate::error::ChatError;
use crate::models::{ChangePasswordRequest, LoginRequest, RegisterRequest};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use std::sync::Arc;

use super::{AuthedUser, ClientIp, UserAgent, http_error};

type ApiResult = Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)>;

fn validate_username(core: &Core, username: &str) -> Result<(), ChatError> {
    let len = username.chars().count();
    if len < 3 || len > 50 {
        return Err(ChatError::Validation("Username must be 3-50 characters".to_string()));
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(ChatError::Validation(
            "Username may only contain letters, digits, '_', '-', '.'".to_string(),
        ));
    }
    if core.profanity.contains_profanity(username) {
        return Err(ChatError::ContentPolicy("Username contains blocked content".to_string()));
    }
    Ok(())
}

fn validate_display_name(core: &Core, display_name: &str) -> Result<(), ChatError> {
    let len = display_name.chars().count();
    if len == 0 || len > 100 {
        return Err(ChatError::Validation(
            "Display name must be 1-100 characters".to_string(),
        ));
    }
    if core.profanity.contains_profanity(display_name) {
        return Err(ChatError::ContentPolicy(
            "Display name contains blocked content".to_string(),
        ));
    }
    Ok(())
}

#[post("/api/register", format = "json", data = "<body>")]
pub fn register(
    core: &State<Arc<Core>>,
    ip: ClientIp,
    user_agent: UserAgent,
    body: Json<RegisterRequest>,
) -> ApiResult {
    let username = body.username.trim();
    let display_name = body.display_name.trim();
    validate_username(core, username).map_err(http_error)?;
    validate_display_name(core, display_name).map_err(http_error)?;
    if body.password_verifier.is_empty() {
        return Err(http_error(ChatError::Validation("Missing password verifier".to_string())));
    }

    let user = core
        .db
        .create_user(username, display_name, &body.password_verifier, &core.config.owner_username)
        .map_err(http_error)?;

    core.audit.security(SecurityEvent::RegistrationSuccess {
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        user_id: user.id,
        ip: Some(ip.0),
        user_agent: user_agent.0,
    });

    Ok(Json(serde_json::json!({"status": "success", "user": user.public_json()})))
}

#[post("/api/login", format = "json", data = "<body>")]
pub fn login(
    core: &State<Arc<Core>>,
    ip: ClientIp,
    user_agent: UserAgent,
    body: Json<LoginRequest>,
) -> ApiResult {
    let deny = |reason: &str| {
        core.audit.security(SecurityEvent::LoginFailed {
            username: body.username.clone(),
            reason: reason.to_string(),
            ip: Some(ip.0.clone()),
        });
        http_error(ChatError::AuthRequired("Invalid username or password".to_string()))
    };

    let Ok(mut user) = core.db.find_user_by_name(body.username.trim()) else {
        return Err(deny("unknown username"));
    };
    if user.password_verifier != body.password_verifier {
        return Err(deny("verifier mismatch"));
    }
    if user.deleted {
        return Err(http_error(ChatError::Deleted));
    }
    if user.suspended {
        if user.is_owner() {
            core.db
                .set_suspended(user.id, false, None)
                .map_err(http_error)?;
            user.suspended = false;
        } else {
            return Err(http_error(ChatError::Suspended(
                user.suspension_reason.clone().unwrap_or_else(|| "No reason provided".to_string()),
            )));
        }
    }

    let session = core
        .db
        .create_device_session(user.id, user_agent.0.as_deref())
        .map_err(http_error)?;
    let token = auth::issue_token(&core.config, &user, &session.session_id);

    let client = [&session.device_type, &session.os_name, &session.browser_name]
        .iter()
        .filter_map(|part| part.as_deref())
        .collect::<Vec<_>>()
        .join(", ");
    core.audit.security(SecurityEvent::LoginSuccess {
        username: user.username.clone(),
        user_id: user.id,
        session_id: session.session_id.clone(),
        client: if client.is_empty() { None } else { Some(client) },
        ip: Some(ip.0),
    });

    Ok(Json(serde_json::json!({
        "status": "success",
        "token": token,
        "session_id": session.session_id,
        "user": user.public_json(),
    })))
}

#[post("/api/logout")]
pub fn logout(core: &State<Arc<Core>>, authed: AuthedUser, ip: ClientIp) -> ApiResult {
    core.db.revoke_session(&authed.session_id).map_err(http_error)?;
    core.audit.security(SecurityEvent::Logout {
        username: authed.user.username.clone(),
        user_id: authed.user.id,
        session_id: authed.session_id,
        ip: Some(ip.0),
    });
    Ok(Json(serde_json::json!({"status": "success"})))
}

#[post("/api/change-password", format = "json", data = "<body>")]
pub fn change_password(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    ip: ClientIp,
    body: Json<ChangePasswordRequest>,
) -> ApiResult {
    if authed.user.password_verifier != body.current_verifier {
        return Err(http_error(ChatError::Forbidden("Current password is wrong".to_string())));
    }
    if body.new_verifier.is_empty() {
        return Err(http_error(ChatError::Validation("Missing new verifier".to_string())));
    }
    core.db
        .set_password_verifier(authed.user.id, &body.new_verifier)
        .map_err(http_error)?;
    let mut revoked = 0;
    if body.logout_others {
        revoked = core
            .db
            .revoke_other_sessions(authed.user.id, &authed.session_id)
            .map_err(http_error)?;
    }
    core.audit.security(SecurityEvent::PasswordChanged {
        username: authed.user.username.clone(),
        user_id: authed.user.id,
        logout_others: body.logout_others,
        ip: Some(ip.0),
    });
    Ok(Json(serde_json::json!({"status": "success", "revoked_sessions": revoked})))
}

// --- Opaque crypto material ---

#[post("/api/crypto/public-key", format = "json", data = "<body>")]
pub fn crypto_key_put(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<serde_json::Value>,
) -> ApiResult {
    let key = body
        .get("publicKey")
        .and_then(|v| v.as_str())
        .ok_or_else(|| http_error(ChatError::Validation("Missing publicKey".to_string())))?;
    core.db.set_public_key(authed.user.id, key).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[get("/api/crypto/public-key/<user_id>")]
pub fn crypto_key_get(core: &State<Arc<Core>>, _authed: AuthedUser, user_id: i64) -> ApiResult {
    let key = core.db.public_key_of(user_id).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok", "userId": user_id, "publicKey": key})))
}

#[post("/api/crypto/backup", format = "json", data = "<body>")]
pub fn crypto_backup_put(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<serde_json::Value>,
) -> ApiResult {
    core.db
        .set_crypto_backup(authed.user.id, &body.to_string())
        .map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[get("/api/crypto/backup")]
pub fn crypto_backup_get(core: &State<Arc<Core>>, authed: AuthedUser) -> ApiResult {
    let blob = core.db.crypto_backup_of(authed.user.id).map_err(http_error)?;
    let parsed: serde_json::Value = serde_json::from_str(&blob).unwrap_or(serde_json::json!(null));
    Ok(Json(serde_json::json!({"status": "ok", "backup": parsed})))
}

// --- Push registration ---

#[post("/api/push/subscribe", format = "json", data = "<body>")]
pub fn push_subscribe(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<serde_json::Value>,
) -> ApiResult {
    let endpoint = body.get("endpoint").and_then(|v| v.as_str());
    let p256dh = body.pointer("/keys/p256dh").and_then(|v| v.as_str());
    let auth_key = body.pointer("/keys/auth").and_then(|v| v.as_str());
    let (Some(endpoint), Some(p256dh), Some(auth_key)) = (endpoint, p256dh, auth_key) else {
        return Err(http_error(ChatError::Validation(
            "Missing endpoint or keys".to_string(),
        )));
    };
    core.db
        .register_push_subscription(authed.user.id, endpoint, p256dh, auth_key)
        .map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[post("/api/push/fcm", format = "json", data = "<body>")]
pub fn push_register_fcm(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<serde_json::Value>,
) -> ApiResult {
    let token = body
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| http_error(ChatError::Validation("Missing token".to_string())))?;
    core.db
        .register_fcm_token(authed.user.id, token)
        .map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}
