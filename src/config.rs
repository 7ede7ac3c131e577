use std::env;

/// Runtime tunables. All read from environment variables with sensible defaults.
///
/// Environment variables:
/// - `DATA_DIR` — Root for uploads, blocklist, and audit logs (default: `data`)
/// - `TOKEN_SECRET` — HMAC key for bearer tokens (default: dev-only constant)
/// - `OWNER_USERNAME` — Username the first registered account must use (default: `owner`)
/// - `FLUSH_DELAY_MS` — Update batch debounce delay (default: 75)
/// - `RECENT_SIG_WINDOW` — Per-session dedup signature window, floor 100 (default: 512)
/// - `UPDATE_LOG_RETENTION_HOURS` — How long flushed batches stay replayable (default: 24)
/// - `TOKEN_INACTIVITY_DAYS` — Sliding session expiry (default: 30)
/// - `TOKEN_MAX_LIFETIME_DAYS` — Hard token cap (default: 365)
/// - `BURST_WINDOW_SECS` / `BURST_MAX` — Burst auto-suspension (default: 30 / 20)
/// - `SPAM_WINDOW_SECS` — Repeat-detection window (default: 45)
/// - `TYPING_TTL_SECS` — Typing indicator expiry (default: 3)
/// - `PUSH_GATEWAY_URL` — Optional push relay endpoint (default: unset)
#[derive(Clone)]
pub struct ChatConfig {
    pub data_dir: String,
    pub token_secret: String,
    pub owner_username: String,
    pub flush_delay_ms: u64,
    pub recent_sig_window: usize,
    pub update_log_retention_hours: i64,
    pub token_inactivity_days: i64,
    pub token_max_lifetime_days: i64,
    pub burst_window_secs: u64,
    pub burst_max: usize,
    pub spam_window_secs: u64,
    pub typing_ttl_secs: u64,
    pub push_gateway_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            token_secret: "default-token-secret-for-development".to_string(),
            owner_username: "owner".to_string(),
            flush_delay_ms: 75,
            recent_sig_window: 512,
            update_log_retention_hours: 24,
            token_inactivity_days: 30,
            token_max_lifetime_days: 365,
            burst_window_secs: 30,
            burst_max: 20,
            spam_window_secs: 45,
            typing_ttl_secs: 3,
            push_gateway_url: None,
        }
    }
}

impl ChatConfig {
    /// Create a ChatConfig from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("DATA_DIR")
            && !val.is_empty()
        {
            config.data_dir = val;
        }
        if let Ok(val) = env::var("TOKEN_SECRET")
            && !val.is_empty()
        {
            config.token_secret = val;
        }
        if let Ok(val) = env::var("OWNER_USERNAME")
            && !val.is_empty()
        {
            config.owner_username = val;
        }
        if let Ok(val) = env::var("FLUSH_DELAY_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.flush_delay_ms = n;
        }
        if let Ok(val) = env::var("RECENT_SIG_WINDOW")
            && let Ok(n) = val.parse::<usize>()
        {
            // Below ~100 signatures the window stops being useful under
            // bursty fan-out, so clamp rather than trust the operator.
            config.recent_sig_window = n.max(100);
        }
        if let Ok(val) = env::var("UPDATE_LOG_RETENTION_HOURS")
            && let Ok(n) = val.parse::<i64>()
        {
            config.update_log_retention_hours = n.max(1);
        }
        if let Ok(val) = env::var("TOKEN_INACTIVITY_DAYS")
            && let Ok(n) = val.parse::<i64>()
        {
            config.token_inactivity_days = n;
        }
        if let Ok(val) = env::var("TOKEN_MAX_LIFETIME_DAYS")
            && let Ok(n) = val.parse::<i64>()
        {
            config.token_max_lifetime_days = n;
        }
        if let Ok(val) = env::var("BURST_WINDOW_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.burst_window_secs = n;
        }
        if let Ok(val) = env::var("BURST_MAX")
            && let Ok(n) = val.parse::<usize>()
        {
            config.burst_max = n;
        }
        if let Ok(val) = env::var("SPAM_WINDOW_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.spam_window_secs = n;
        }
        if let Ok(val) = env::var("TYPING_TTL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.typing_ttl_secs = n;
        }
        if let Ok(val) = env::var("PUSH_GATEWAY_URL")
            && !val.is_empty()
        {
            config.push_gateway_url = Some(val);
        }

        config
    }
}
