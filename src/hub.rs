use crate::db::Db;
use crate::seq::Sequencer;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Outbound queue depth per session. A client that stops reading fills this
/// up and gets closed rather than blocking anyone else's dispatch.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// One server-originated state change awaiting delivery.
#[derive(Debug, Clone)]
pub struct Update {
    pub kind: String,
    pub data: serde_json::Value,
}

impl Update {
    pub fn new(kind: &str, data: serde_json::Value) -> Self {
        Self { kind: kind.to_string(), data }
    }

    pub fn wire_json(&self) -> serde_json::Value {
        serde_json::json!({"type": self.kind, "data": self.data})
    }

    /// Content signature used for in-flight dedup on one session. Keys are
    /// scoped by update type so an edit is never suppressed by the create
    /// that preceded it.
    pub fn signature(&self) -> String {
        let kind = self.kind.as_str();
        match kind {
            "newMessage" | "messageEdited" | "messageDeleted" => {
                let id = self.data.get("id").or_else(|| self.data.get("message_id"));
                format!("{kind}:{}", id.and_then(|v| v.as_i64()).unwrap_or(0))
            }
            "dmNew" | "dmEdited" | "dmDeleted" => {
                format!("{kind}:{}", self.data.get("id").and_then(|v| v.as_i64()).unwrap_or(0))
            }
            "reactionUpdate" => format!(
                "{kind}:{}:{}:{}",
                self.data.get("message_id").and_then(|v| v.as_i64()).unwrap_or(0),
                self.data.get("emoji").and_then(|v| v.as_str()).unwrap_or(""),
                self.data.get("user_id").and_then(|v| v.as_i64()).unwrap_or(0),
            ),
            "dmReactionUpdate" => format!(
                "{kind}:{}:{}:{}",
                self.data.get("dm_envelope_id").and_then(|v| v.as_i64()).unwrap_or(0),
                self.data.get("emoji").and_then(|v| v.as_str()).unwrap_or(""),
                self.data.get("user_id").and_then(|v| v.as_i64()).unwrap_or(0),
            ),
            "typing" | "stopTyping" | "dmTyping" | "stopDmTyping" | "statusUpdate" => {
                format!("{kind}:{}", self.data.get("userId").and_then(|v| v.as_i64()).unwrap_or(0))
            }
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(self.data.to_string().as_bytes());
                format!("{kind}:{}", hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Insertion-ordered bounded signature set.
struct SigWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SigWindow {
    fn new(cap: usize) -> Self {
        Self { seen: HashSet::new(), order: VecDeque::new(), cap }
    }

    /// Insert; false means the signature was already present.
    fn insert(&mut self, sig: String) -> bool {
        if self.seen.contains(&sig) {
            return false;
        }
        self.seen.insert(sig.clone());
        self.order.push_back(sig);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: i64,
    pub username: String,
    /// Device session id from the bearer token, for audit trails.
    pub device_session_id: String,
}

/// One live bidirectional transport, bound to at most one user.
pub struct Session {
    pub id: u64,
    outbound: mpsc::Sender<String>,
    auth: Mutex<Option<AuthInfo>>,
    pending: Mutex<Vec<Update>>,
    timer_armed: AtomicBool,
    recent_sigs: Mutex<SigWindow>,
    pub subscriptions: Mutex<HashSet<i64>>,
    pub last_ack_seq: AtomicI64,
    closed: AtomicBool,
    pub shutdown: tokio::sync::Notify,
}

impl Session {
    pub fn auth(&self) -> Option<AuthInfo> {
        self.auth.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct HubInner {
    db: Db,
    sequencer: Arc<Sequencer>,
    flush_delay_ms: u64,
    sig_window: usize,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    user_index: Mutex<HashMap<i64, HashSet<u64>>>,
}

/// Registry of live sessions plus the per-session batching machinery.
/// Cheap to clone; all clones share the same state. Never calls back into
/// the dispatcher.
#[derive(Clone)]
pub struct SessionHub {
    inner: Arc<HubInner>,
}

impl SessionHub {
    pub fn new(db: Db, sequencer: Arc<Sequencer>, flush_delay_ms: u64, sig_window: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                db,
                sequencer,
                flush_delay_ms,
                sig_window,
                next_id: AtomicU64::new(1),
                sessions: Mutex::new(HashMap::new()),
                user_index: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.inner.sequencer
    }

    /// Register a fresh, unauthenticated session. The receiver side feeds
    /// the transport's write half.
    pub fn register(&self) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let session = Arc::new(Session {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            outbound: tx,
            auth: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            timer_armed: AtomicBool::new(false),
            recent_sigs: Mutex::new(SigWindow::new(self.inner.sig_window)),
            subscriptions: Mutex::new(HashSet::new()),
            last_ack_seq: AtomicI64::new(0),
            closed: AtomicBool::new(false),
            shutdown: tokio::sync::Notify::new(),
        });
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id, session.clone());
        (session, rx)
    }

    /// Bind an authenticated user to a session. Returns true when this is
    /// the user's first live session (they just came online).
    pub fn bind_user(&self, session: &Arc<Session>, info: AuthInfo) -> bool {
        let user_id = info.user_id;
        let previous = {
            let mut auth = session.auth.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = auth.as_ref()
                && existing.user_id == user_id
            {
                return false;
            }
            let previous = auth.as_ref().map(|a| a.user_id);
            *auth = Some(info);
            previous
        };
        let mut index = self.inner.user_index.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = previous
            && let Some(set) = index.get_mut(&previous)
        {
            set.remove(&session.id);
            if set.is_empty() {
                index.remove(&previous);
            }
        }
        let set = index.entry(user_id).or_default();
        let first = set.is_empty();
        set.insert(session.id);
        first
    }

    pub fn sessions_of(&self, user_id: i64) -> Vec<Arc<Session>> {
        let ids: Vec<u64> = {
            let index = self.inner.user_index.lock().unwrap_or_else(|e| e.into_inner());
            index.get(&user_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
        };
        let sessions = self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner());
        ids.iter().filter_map(|id| sessions.get(id).cloned()).collect()
    }

    fn authenticated_sessions(&self) -> Vec<Arc<Session>> {
        let sessions = self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.values().filter(|s| s.auth().is_some()).cloned().collect()
    }

    /// Sessions that subscribed to a user's status changes.
    pub fn subscribers_of(&self, user_id: i64) -> Vec<Arc<Session>> {
        let sessions = self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .values()
            .filter(|s| {
                s.subscriptions
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .contains(&user_id)
            })
            .cloned()
            .collect()
    }

    /// Queue an update for one session: dedup by signature, append to the
    /// pending buffer, and arm the debounce timer if it is not running.
    pub fn enqueue(&self, session: &Arc<Session>, update: &Update) {
        if session.is_closed() {
            return;
        }
        {
            let mut sigs = session.recent_sigs.lock().unwrap_or_else(|e| e.into_inner());
            if !sigs.insert(update.signature()) {
                return;
            }
        }
        session
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update.clone());

        if !session.timer_armed.swap(true, Ordering::SeqCst) {
            let hub = self.clone();
            let session = session.clone();
            let delay = std::time::Duration::from_millis(self.inner.flush_delay_ms);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                hub.flush_session(&session);
            });
        }
    }

    /// Drain the pending buffer into one durable, sequenced frame.
    pub fn flush_session(&self, session: &Arc<Session>) {
        session.timer_armed.store(false, Ordering::SeqCst);
        let updates: Vec<Update> = {
            let mut pending = session.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        if updates.is_empty() {
            return;
        }
        // Unauthenticated sessions never receive batched updates.
        let Some(auth) = session.auth() else {
            return;
        };
        let list: Vec<serde_json::Value> = updates.iter().map(|u| u.wire_json()).collect();
        let seq = self.inner.sequencer.next_seq(auth.user_id);
        let serialized = serde_json::Value::Array(list.clone()).to_string();
        if let Err(e) = self.inner.sequencer.log_batch(auth.user_id, seq, &serialized) {
            eprintln!(
                "⚠️ Failed to persist update batch (user {}, seq {seq}): {e}",
                auth.user_id
            );
        }
        let frame = serde_json::json!({"type": "updates", "seq": seq, "updates": list});
        self.try_send(session, frame.to_string());
    }

    /// Queue a raw frame, bypassing batching. Used for command replies,
    /// subscribe snapshots, and gap replay.
    pub fn direct_send(&self, session: &Arc<Session>, frame: &serde_json::Value) {
        self.try_send(session, frame.to_string());
    }

    fn try_send(&self, session: &Arc<Session>, frame: String) {
        if session.is_closed() {
            return;
        }
        if session.outbound.try_send(frame).is_err() {
            // Slow or gone; cut it loose instead of buffering forever.
            eprintln!("⚠️ Session {} outbound queue overflow, closing", session.id);
            self.close_session(session);
        }
    }

    /// Enqueue on every authenticated session.
    pub fn broadcast(&self, update: &Update) {
        for session in self.authenticated_sessions() {
            self.enqueue(&session, update);
        }
    }

    /// Enqueue on every session of one user.
    pub fn to_user(&self, user_id: i64, update: &Update) {
        for session in self.sessions_of(user_id) {
            self.enqueue(&session, update);
        }
    }

    /// Status fan-out to subscribers only.
    pub fn notify_status(&self, user_id: i64, online: bool, last_seen: Option<String>) {
        let update = Update::new(
            "statusUpdate",
            serde_json::json!({"userId": user_id, "online": online, "lastSeen": last_seen}),
        );
        for session in self.subscribers_of(user_id) {
            self.enqueue(&session, &update);
        }
    }

    /// Mark a session closed and wake its read loop so it tears down.
    pub fn close_session(&self, session: &Arc<Session>) {
        session.closed.store(true, Ordering::SeqCst);
        session.shutdown.notify_waiters();
    }

    /// Final teardown on transport close: flush once, drop the session from
    /// every index, and report whether its user just went fully offline.
    pub fn disconnect(&self, session: &Arc<Session>) -> Option<i64> {
        self.flush_session(session);
        session.closed.store(true, Ordering::SeqCst);
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session.id);
        if let Some(auth) = session.auth() {
            let mut index = self.inner.user_index.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(set) = index.get_mut(&auth.user_id) {
                set.remove(&session.id);
                if set.is_empty() {
                    index.remove(&auth.user_id);
                    let _ = self.inner.db.set_online(auth.user_id, false);
                    return Some(auth.user_id);
                }
            }
        }
        None
    }

    /// Live session count, for the stats surface.
    pub fn connection_count(&self) -> usize {
        self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn online_user_count(&self) -> usize {
        self.inner.user_index.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
