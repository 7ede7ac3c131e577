use crate::Core;
use rocket::serde::json::Json;
use rocket::{State, get};
use std::sync::Arc;

#[get("/api/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatcore",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/api/stats")]
pub fn stats(core: &State<Arc<Core>>) -> Json<serde_json::Value> {
    let conn = core.db.lock();
    let user_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users WHERE deleted = 0", [], |r| r.get(0))
        .unwrap_or(0);
    let message_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM message", [], |r| r.get(0))
        .unwrap_or(0);
    let dm_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM dm_envelope", [], |r| r.get(0))
        .unwrap_or(0);
    drop(conn);
    Json(serde_json::json!({
        "users": user_count,
        "messages": message_count,
        "dm_envelopes": dm_count,
        "connections": core.hub.connection_count(),
        "online_users": core.hub.online_user_count(),
    }))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Authentication required"}))
}
