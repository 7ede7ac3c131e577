use chatcore::Core;
use chatcore::auth;
use chatcore::config::ChatConfig;
use chatcore::dispatcher;
use chatcore::hub::Session;
use chatcore::models::User;
use rocket::local::blocking::Client;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique per-test paths so parallel tests never share state.
fn unique_paths() -> (String, String) {
    let tag = uuid::Uuid::new_v4().to_string().split('-').next().unwrap().to_string();
    (
        format!("/tmp/chatcore_test_{tag}.db"),
        format!("/tmp/chatcore_test_{tag}_data"),
    )
}

pub fn test_config(data_dir: &str) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.data_dir = data_dir.to_string();
    config.typing_ttl_secs = 1;
    config
}

/// Core plus its temp storage; everything is deleted on drop.
pub struct TestEnv {
    pub core: Arc<Core>,
    db_path: String,
    data_dir: String,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

pub fn test_env() -> TestEnv {
    let (db_path, data_dir) = unique_paths();
    let config = test_config(&data_dir);
    let core = chatcore::build_core(&db_path, config);
    TestEnv { core, db_path, data_dir }
}

/// The first user must carry the owner username; call this before creating
/// anyone else.
pub fn create_owner(core: &Arc<Core>) -> User {
    let owner = core.config.owner_username.clone();
    core.db
        .create_user(&owner, "The Owner", "owner-verifier", &owner)
        .expect("owner registers first")
}

pub fn create_user(core: &Arc<Core>, username: &str) -> User {
    core.db
        .create_user(
            username,
            username,
            &format!("{username}-verifier"),
            &core.config.owner_username,
        )
        .expect("user registers")
}

/// Device session + signed bearer token for a user.
pub fn login(core: &Arc<Core>, user: &User) -> String {
    let session = core
        .db
        .create_device_session(user.id, Some("test-harness/1.0"))
        .expect("session created");
    auth::issue_token(&core.config, user, &session.session_id)
}

/// Open a hub session the way the WebSocket route does, with the outbound
/// queue exposed for assertions.
pub fn open_session(core: &Arc<Core>) -> (Arc<Session>, mpsc::Receiver<String>) {
    core.hub.register()
}

pub fn frame(kind: &str, data: serde_json::Value, token: &str) -> serde_json::Value {
    serde_json::json!({
        "type": kind,
        "data": data,
        "credentials": {"scheme": "Bearer", "credentials": token},
    })
}

pub fn dispatch(core: &Arc<Core>, session: &Arc<Session>, frame: serde_json::Value) {
    dispatcher::dispatch(core, session, frame, Some("127.0.0.1"));
}

/// Next outbound frame within the timeout, parsed.
pub async fn next_frame(rx: &mut mpsc::Receiver<String>, timeout_ms: u64) -> Option<serde_json::Value> {
    let raw = tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), rx.recv())
        .await
        .ok()??;
    serde_json::from_str(&raw).ok()
}

/// Skip frames until one of the given type arrives (or the timeout passes).
pub async fn next_frame_of_type(
    rx: &mut mpsc::Receiver<String>,
    kind: &str,
    timeout_ms: u64,
) -> Option<serde_json::Value> {
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let raw = tokio::time::timeout(remaining, rx.recv()).await.ok()??;
        let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
        if parsed.get("type").and_then(|t| t.as_str()) == Some(kind) {
            return Some(parsed);
        }
    }
}

/// Updates of one kind inside an `updates` batch frame.
pub fn updates_of_kind<'a>(batch: &'a serde_json::Value, kind: &str) -> Vec<&'a serde_json::Value> {
    batch
        .get("updates")
        .and_then(|u| u.as_array())
        .map(|list| {
            list.iter()
                .filter(|u| u.get("type").and_then(|t| t.as_str()) == Some(kind))
                .collect()
        })
        .unwrap_or_default()
}

// --- HTTP surface harness ---

/// Wrapper around the blocking client that deletes its temp storage on drop.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
    data_dir: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        // Drop the client first to release the SQLite connection (WAL mode
        // holds the file).
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

impl TestClient {
    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }
}

pub fn test_client() -> TestClient {
    let (db_path, data_dir) = unique_paths();
    let config = test_config(&data_dir);
    let rocket = chatcore::rocket_with_db_and_config(&db_path, config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path, data_dir }
}

/// Register + login over HTTP; returns `(token, user json)`.
pub fn http_register_and_login(client: &Client, username: &str) -> (String, serde_json::Value) {
    use rocket::http::{ContentType, Status};
    let res = client
        .post("/api/register")
        .header(ContentType::JSON)
        .body(
            serde_json::json!({
                "username": username,
                "display_name": username,
                "password_verifier": format!("{username}-verifier"),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "registration failed for {username}");

    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(
            serde_json::json!({
                "username": username,
                "password_verifier": format!("{username}-verifier"),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "login failed for {username}");
    let body: serde_json::Value = res.into_json().unwrap();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"].clone(),
    )
}
