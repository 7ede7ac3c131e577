/// Fire-and-forget push hook. Implementations must never block dispatch;
/// failures are logged and never reach the sender.
pub trait Notifier: Send + Sync {
    fn public_message_posted(&self, message_id: i64, exclude_user_id: i64);
    fn dm_posted(&self, envelope_id: i64, sender_id: i64);
}

/// No-op implementation used in tests and when no relay is configured.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn public_message_posted(&self, _message_id: i64, _exclude_user_id: i64) {}
    fn dm_posted(&self, _envelope_id: i64, _sender_id: i64) {}
}

/// Posts push events to an external relay (Web Push / FCM fan-out happens
/// there). Each delivery runs in its own task with a hard timeout.
pub struct PushGateway {
    client: reqwest::Client,
    url: String,
}

impl PushGateway {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }

    fn deliver(&self, payload: serde_json::Value) {
        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        eprintln!("⚠️ Push delivery failed: HTTP {}", resp.status());
                    }
                }
                Err(e) => {
                    eprintln!("⚠️ Push delivery error: {e}");
                }
            }
        });
    }
}

impl Notifier for PushGateway {
    fn public_message_posted(&self, message_id: i64, exclude_user_id: i64) {
        self.deliver(serde_json::json!({
            "event": "public_message",
            "message_id": message_id,
            "exclude_user_id": exclude_user_id,
        }));
    }

    fn dm_posted(&self, envelope_id: i64, sender_id: i64) {
        self.deliver(serde_json::json!({
            "event": "dm",
            "envelope_id": envelope_id,
            "sender_id": sender_id,
        }));
    }
}
