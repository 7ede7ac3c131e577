use crate::moderation;
use crate::Core;
use crate::error::ChatError;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use serde::Deserialize;
use std::sync::Arc;

use super::{AuthedUser, http_error};

type ApiResult = Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)>;

#[derive(Debug, Deserialize)]
pub struct BlocklistUpdate {
    pub words: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[get("/api/moderation/blocklist")]
pub fn blocklist_list(core: &State<Arc<Core>>, authed: AuthedUser) -> ApiResult {
    moderation::ensure_owner(&authed.user).map_err(http_error)?;
    Ok(Json(serde_json::json!({"words": core.profanity.blocklist()})))
}

#[post("/api/moderation/blocklist", format = "json", data = "<body>")]
pub fn blocklist_append(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<BlocklistUpdate>,
) -> ApiResult {
    if body.words.is_empty() {
        return Err(http_error(ChatError::Validation("No words provided".to_string())));
    }
    let (added, words) =
        moderation::blocklist_add(core.inner(), &authed.user, &body.words).map_err(http_error)?;
    Ok(Json(serde_json::json!({"added": added, "words": words})))
}

#[delete("/api/moderation/blocklist", format = "json", data = "<body>")]
pub fn blocklist_remove(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    body: Json<BlocklistUpdate>,
) -> ApiResult {
    if body.words.is_empty() {
        return Err(http_error(ChatError::Validation("No words provided".to_string())));
    }
    let (removed, words) =
        moderation::blocklist_remove(core.inner(), &authed.user, &body.words).map_err(http_error)?;
    Ok(Json(serde_json::json!({"removed": removed, "words": words})))
}

#[post("/api/moderation/users/<user_id>/suspend", format = "json", data = "<body>")]
pub fn admin_suspend_user(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    user_id: i64,
    body: Json<SuspendRequest>,
) -> ApiResult {
    let reason = body
        .reason
        .clone()
        .unwrap_or_else(|| "Suspended by moderator".to_string());
    let user = moderation::suspend_user(core.inner(), &authed.user, user_id, &reason).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok", "user": user.public_json()})))
}

#[post("/api/moderation/users/<user_id>/unsuspend")]
pub fn admin_unsuspend_user(core: &State<Arc<Core>>, authed: AuthedUser, user_id: i64) -> ApiResult {
    let user = moderation::unsuspend_user(core.inner(), &authed.user, user_id).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok", "user": user.public_json()})))
}

#[delete("/api/moderation/users/<user_id>")]
pub fn admin_delete_user(core: &State<Arc<Core>>, authed: AuthedUser, user_id: i64) -> ApiResult {
    moderation::delete_user(core.inner(), &authed.user, user_id).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[post("/api/moderation/users/<user_id>/verify")]
pub fn admin_verify_toggle(core: &State<Arc<Core>>, authed: AuthedUser, user_id: i64) -> ApiResult {
    let verified = moderation::toggle_verify(core.inner(), &authed.user, user_id).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok", "verified": verified})))
}

#[post("/api/moderation/users/<user_id>/clear-rate-limits")]
pub fn admin_clear_rate_limits(core: &State<Arc<Core>>, authed: AuthedUser, user_id: i64) -> ApiResult {
    moderation::clear_rate_limits(core.inner(), &authed.user, user_id).map_err(http_error)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}
