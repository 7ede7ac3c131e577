use crate::config::ChatConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fuzzy-match threshold for the similar-repeat rule.
const SIMILARITY_THRESHOLD: f64 = 0.88;
/// Normalized texts at or below this length use the exact short-repeat rule.
const SHORT_TEXT_LEN: usize = 8;
/// Prior exact matches that trip the short-repeat rule.
const SHORT_REPEAT_LIMIT: usize = 4;
/// Exact-plus-fuzzy total that trips the similar-repeat rule.
const SIMILAR_REPEAT_LIMIT: usize = 5;

pub const REASON_BURST: &str = "Automatic suspension: excessive message rate";
pub const REASON_SPAM: &str = "Automatic suspension: repeated spam messages";

/// Outcome of recording one public message into the per-user windows.
#[derive(Debug, Clone, PartialEq)]
pub enum SpamVerdict {
    Clean,
    /// Too many messages inside the burst window; ids cover the window.
    Burst { count: usize, message_ids: Vec<i64> },
    /// Short text repeated verbatim; ids cover the matching messages.
    ShortRepeat { occurrences: usize, message_ids: Vec<i64> },
    /// Near-duplicate text repeated; ids cover the matching messages.
    SimilarRepeat { similar: usize, message_ids: Vec<i64> },
}

struct RateEntry {
    at: Instant,
    message_id: i64,
}

struct HistoryEntry {
    at: Instant,
    message_id: i64,
    normalized: String,
}

/// Per-user sliding windows over recent public messages. In-memory only;
/// windows reset with the process.
pub struct SpamMonitor {
    burst_window: Duration,
    burst_max: usize,
    spam_window: Duration,
    rate: Mutex<HashMap<i64, Vec<RateEntry>>>,
    history: Mutex<HashMap<i64, Vec<HistoryEntry>>>,
}

fn normalize(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let insertions = previous[j + 1] + 1;
            let deletions = current[j] + 1;
            let substitutions = previous[j] + usize::from(ca != cb);
            current.push(insertions.min(deletions).min(substitutions));
        }
        previous = current;
    }
    previous[b.len()]
}

/// Similarity in [0, 1]: 1 minus the edit distance over the longer length.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

impl SpamMonitor {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            burst_window: Duration::from_secs(config.burst_window_secs),
            burst_max: config.burst_max,
            spam_window: Duration::from_secs(config.spam_window_secs),
            rate: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Record a freshly inserted public message and evaluate the rules.
    /// Callers must skip the owner and already-suspended users.
    pub fn record(&self, user_id: i64, message_id: i64, content: &str) -> SpamVerdict {
        let now = Instant::now();

        // burst rule
        {
            let mut rate = self.rate.lock().unwrap_or_else(|e| e.into_inner());
            let entries = rate.entry(user_id).or_default();
            entries.retain(|e| now.duration_since(e.at) < self.burst_window);
            entries.push(RateEntry { at: now, message_id });
            if entries.len() >= self.burst_max {
                let ids: Vec<i64> = entries.iter().map(|e| e.message_id).collect();
                let count = ids.len();
                entries.clear();
                return SpamVerdict::Burst { count, message_ids: ids };
            }
        }

        // repeat rules
        let normalized = normalize(content);
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let entries = history.entry(user_id).or_default();
        entries.retain(|e| now.duration_since(e.at) < self.spam_window);
        entries.push(HistoryEntry { at: now, message_id, normalized: normalized.clone() });

        let exact_ids: Vec<i64> = entries
            .iter()
            .filter(|e| e.normalized == normalized)
            .map(|e| e.message_id)
            .collect();

        if normalized.chars().count() <= SHORT_TEXT_LEN && exact_ids.len() > SHORT_REPEAT_LIMIT {
            let occurrences = exact_ids.len();
            entries.retain(|e| !exact_ids.contains(&e.message_id));
            return SpamVerdict::ShortRepeat { occurrences, message_ids: exact_ids };
        }

        let similar_ids: Vec<i64> = entries
            .iter()
            .filter(|e| {
                e.normalized == normalized
                    || similarity_ratio(&e.normalized, &normalized) >= SIMILARITY_THRESHOLD
            })
            .map(|e| e.message_id)
            .collect();
        if similar_ids.len() >= SIMILAR_REPEAT_LIMIT {
            let similar = similar_ids.len();
            entries.retain(|e| !similar_ids.contains(&e.message_id));
            return SpamVerdict::SimilarRepeat { similar, message_ids: similar_ids };
        }

        SpamVerdict::Clean
    }

    /// Drop both windows for a user (admin rate-limit clear, unsuspend).
    pub fn clear(&self, user_id: i64) {
        self.rate.lock().unwrap_or_else(|e| e.into_inner()).remove(&user_id);
        self.history.lock().unwrap_or_else(|e| e.into_inner()).remove(&user_id);
    }

    pub fn burst_window_secs(&self) -> u64 {
        self.burst_window.as_secs()
    }

    pub fn spam_window_secs(&self) -> u64 {
        self.spam_window.as_secs()
    }
}
