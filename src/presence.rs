use crate::hub::{SessionHub, Update};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Interval between typing TTL sweeps.
const SWEEP_INTERVAL_SECS: u64 = 1;

/// Edge-triggered typing state for the public room and per DM pair.
/// Timestamps refresh on every event; only transitions produce broadcasts.
pub struct TypingTracker {
    ttl: Duration,
    public_state: Mutex<HashMap<i64, TypingEntry>>,
    dm_state: Mutex<HashMap<(i64, i64), TypingEntry>>,
}

struct TypingEntry {
    last_event: Instant,
    username: String,
}

impl TypingTracker {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            public_state: Mutex::new(HashMap::new()),
            dm_state: Mutex::new(HashMap::new()),
        }
    }

    /// Record a public typing event. True when the user transitioned
    /// idle → typing (caller broadcasts exactly then).
    pub fn public_typing(&self, user_id: i64, username: &str) -> bool {
        let mut state = self.public_state.lock().unwrap_or_else(|e| e.into_inner());
        let started = !state.contains_key(&user_id);
        state.insert(
            user_id,
            TypingEntry { last_event: Instant::now(), username: username.to_string() },
        );
        started
    }

    /// Record a public stop. True when the user transitioned typing → idle.
    pub fn public_stop(&self, user_id: i64) -> bool {
        let mut state = self.public_state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(&user_id).is_some()
    }

    pub fn dm_typing(&self, sender_id: i64, recipient_id: i64, username: &str) -> bool {
        let mut state = self.dm_state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (sender_id, recipient_id);
        let started = !state.contains_key(&key);
        state.insert(
            key,
            TypingEntry { last_event: Instant::now(), username: username.to_string() },
        );
        started
    }

    pub fn dm_stop(&self, sender_id: i64, recipient_id: i64) -> bool {
        let mut state = self.dm_state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(&(sender_id, recipient_id)).is_some()
    }

    /// Expire stale entries. Returns the forced idle transitions:
    /// `(public users, dm pairs)` with their usernames for the broadcasts.
    /// Transitions are computed under the lock; emits happen outside it.
    pub fn sweep(&self) -> (Vec<(i64, String)>, Vec<(i64, i64, String)>) {
        let now = Instant::now();
        let mut expired_public = Vec::new();
        {
            let mut state = self.public_state.lock().unwrap_or_else(|e| e.into_inner());
            let stale: Vec<i64> = state
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_event) > self.ttl)
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                if let Some(entry) = state.remove(&id) {
                    expired_public.push((id, entry.username));
                }
            }
        }
        let mut expired_dm = Vec::new();
        {
            let mut state = self.dm_state.lock().unwrap_or_else(|e| e.into_inner());
            let stale: Vec<(i64, i64)> = state
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_event) > self.ttl)
                .map(|(key, _)| *key)
                .collect();
            for key in stale {
                if let Some(entry) = state.remove(&key) {
                    expired_dm.push((key.0, key.1, entry.username));
                }
            }
        }
        (expired_public, expired_dm)
    }
}

/// Spawns the cooperative sweeper that forces `typing → idle` after the TTL
/// and emits the corresponding broadcasts.
pub fn spawn_typing_sweeper(hub: SessionHub, tracker: Arc<TypingTracker>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
            let (expired_public, expired_dm) = tracker.sweep();
            for (user_id, username) in expired_public {
                hub.broadcast(&Update::new(
                    "stopTyping",
                    serde_json::json!({"userId": user_id, "username": username}),
                ));
            }
            for (sender_id, recipient_id, username) in expired_dm {
                hub.to_user(
                    recipient_id,
                    &Update::new(
                        "stopDmTyping",
                        serde_json::json!({"userId": sender_id, "username": username}),
                    ),
                );
            }
        }
    });
}
