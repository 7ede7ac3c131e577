// Route module decomposition — each surface area in its own file.
// Shared request guards live here; route functions in submodules.

mod account;
mod files;
mod moderation_routes;
mod system;
mod ws;

pub use account::{
    change_password, crypto_backup_get, crypto_backup_put, crypto_key_get, crypto_key_put, login,
    logout, push_register_fcm, push_subscribe, register,
};
pub use files::{get_file_encrypted, get_file_normal};
pub use moderation_routes::{
    admin_clear_rate_limits, admin_delete_user, admin_suspend_user, admin_unsuspend_user,
    admin_verify_toggle, blocklist_append, blocklist_list, blocklist_remove,
};
pub use system::{health, not_found, stats, unauthorized};
pub use ws::chat_ws;

use crate::Core;
use crate::auth;
use crate::error::ChatError;
use crate::models::User;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use std::sync::Arc;

// --- Shared request guards ---

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

pub struct UserAgent(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserAgent {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(UserAgent(req.headers().get_one("User-Agent").map(String::from)))
    }
}

/// Resolves the bearer token to a live user. Token validation, session
/// liveness, the inactivity window, and suspension policy all run here,
/// before any handler body.
pub struct AuthedUser {
    pub user: User,
    pub session_id: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthedUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(token) = req
            .headers()
            .get_one("Authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "))
        else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Some(core) = req.rocket().state::<Arc<Core>>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        match auth::authenticate(&core.db, &core.config, token) {
            Ok((user, claims)) => {
                Outcome::Success(AuthedUser { user, session_id: claims.session_id })
            }
            Err(e) => Outcome::Error((Status::from_code(e.code()).unwrap_or(Status::Unauthorized), ())),
        }
    }
}

/// Map a core error onto the HTTP surface.
pub fn http_error(e: ChatError) -> (Status, Json<serde_json::Value>) {
    (
        Status::from_code(e.code()).unwrap_or(Status::InternalServerError),
        Json(serde_json::json!({"error": e.detail()})),
    )
}
