use crate::config::ChatConfig;
use crate::db::Db;
use crate::error::{ChatError, ChatResult};
use crate::models::User;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a bearer token. The session id binds the token to one
/// device session; `exp` is the hard lifetime cap, while the sliding
/// inactivity window is enforced against the session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub username: String,
    pub session_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign claims into an opaque bearer token: `base64url(payload).hex(hmac)`.
pub fn issue_token(config: &ChatConfig, user: &User, session_id: &str) -> String {
    let iat = chrono::Utc::now().timestamp();
    let exp = iat + config.token_max_lifetime_days * 24 * 3600;
    let claims = TokenClaims {
        user_id: user.id,
        username: user.username.clone(),
        session_id: session_id.to_string(),
        iat,
        exp,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
    let mut mac = HmacSha256::new_from_slice(config.token_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{payload}.{signature}")
}

/// Verify a token's signature and expiry; does not consult the store.
pub fn verify_token(config: &ChatConfig, token: &str) -> ChatResult<TokenClaims> {
    let (payload, signature) = token
        .split_once('.')
        .ok_or_else(|| ChatError::AuthRequired("Invalid token".to_string()))?;
    let sig_bytes =
        hex::decode(signature).map_err(|_| ChatError::AuthRequired("Invalid token".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(config.token_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| ChatError::AuthRequired("Invalid token".to_string()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| ChatError::AuthRequired("Invalid token".to_string()))?;
    let claims: TokenClaims = serde_json::from_slice(&raw)
        .map_err(|_| ChatError::AuthRequired("Invalid token".to_string()))?;
    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(ChatError::AuthRequired("Token expired".to_string()));
    }
    Ok(claims)
}

/// Resolve a bearer token to a live user: signature, session liveness,
/// sliding inactivity, suspension, and deletion checks, in that order.
/// Touches the session's `last_seen` on success.
pub fn authenticate(db: &Db, config: &ChatConfig, token: &str) -> ChatResult<(User, TokenClaims)> {
    let claims = verify_token(config, token)?;
    let mut user = db
        .find_user_by_id(claims.user_id)
        .map_err(|_| ChatError::AuthRequired("User not found".to_string()))?;

    // The owner can never be locked out of their own instance.
    if user.is_owner() && user.suspended {
        db.set_suspended(user.id, false, None)?;
        user.suspended = false;
        user.suspension_reason = None;
    }

    let session = db.find_device_session(user.id, &claims.session_id)?;
    if session.revoked {
        return Err(ChatError::AuthRequired("Session revoked".to_string()));
    }

    let inactivity_cutoff =
        chrono::Utc::now() - chrono::Duration::days(config.token_inactivity_days);
    if let Ok(last_seen) = chrono::DateTime::parse_from_rfc3339(&session.last_seen)
        && last_seen.with_timezone(&chrono::Utc) < inactivity_cutoff
    {
        db.revoke_session(&claims.session_id)?;
        return Err(ChatError::AuthRequired(
            "Session expired due to inactivity".to_string(),
        ));
    }

    db.touch_session(&claims.session_id)?;

    if user.suspended {
        return Err(ChatError::Suspended(
            user.suspension_reason
                .clone()
                .unwrap_or_else(|| "No reason provided".to_string()),
        ));
    }
    if user.deleted {
        return Err(ChatError::Deleted);
    }

    Ok((user, claims))
}
