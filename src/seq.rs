use crate::db::Db;
use crate::error::ChatResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-user monotonic sequence allocator backing the ordered update stream.
/// Counters live in memory for the process lifetime and are reconciled from
/// the update log at startup: the highest logged sequence per user wins.
pub struct Sequencer {
    db: Db,
    counters: Mutex<HashMap<i64, Arc<Mutex<i64>>>>,
}

impl Sequencer {
    pub fn new(db: Db) -> Self {
        let mut initial = HashMap::new();
        if let Ok(rows) = db.max_sequences() {
            for (user_id, max_seq) in rows {
                initial.insert(user_id, Arc::new(Mutex::new(max_seq)));
            }
        }
        Self { db, counters: Mutex::new(initial) }
    }

    fn counter(&self, user_id: i64) -> Arc<Mutex<i64>> {
        let mut map = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(0))).clone()
    }

    /// Strictly increasing, starting at 1, across all of the user's sessions.
    pub fn next_seq(&self, user_id: i64) -> i64 {
        let counter = self.counter(user_id);
        let mut value = counter.lock().unwrap_or_else(|e| e.into_inner());
        *value += 1;
        *value
    }

    /// The last sequence handed out for a user (0 if none yet).
    pub fn current_seq(&self, user_id: i64) -> i64 {
        let counter = self.counter(user_id);
        let value = counter.lock().unwrap_or_else(|e| e.into_inner());
        *value
    }

    /// Durably record a flushed batch. A `(user, seq)` collision means the
    /// batch was already persisted, which is not an error.
    pub fn log_batch(&self, user_id: i64, sequence: i64, updates_json: &str) -> ChatResult<bool> {
        self.db.append_update_log(user_id, sequence, updates_json)
    }
}
