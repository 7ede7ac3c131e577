use chatcore::seq::Sequencer;
use std::collections::HashSet;
use std::sync::Arc;

use crate::common::{create_owner, create_user, test_env};

#[test]
fn test_next_seq_starts_at_one_and_increases() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let sequencer = env.core.hub.sequencer();
    assert_eq!(sequencer.next_seq(owner.id), 1);
    assert_eq!(sequencer.next_seq(owner.id), 2);
    assert_eq!(sequencer.next_seq(owner.id), 3);
    assert_eq!(sequencer.current_seq(owner.id), 3);
}

#[test]
fn test_counters_are_per_user() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let other = create_user(&env.core, "frida");
    let sequencer = env.core.hub.sequencer();
    assert_eq!(sequencer.next_seq(owner.id), 1);
    assert_eq!(sequencer.next_seq(other.id), 1);
    assert_eq!(sequencer.next_seq(owner.id), 2);
}

#[test]
fn test_bootstrap_from_update_log() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let user = create_user(&env.core, "gustav");
    env.core.db.append_update_log(owner.id, 4, "[]").unwrap();
    env.core.db.append_update_log(owner.id, 7, "[]").unwrap();
    env.core.db.append_update_log(user.id, 2, "[]").unwrap();

    // a fresh process picks up the highest logged sequence per user
    let rebuilt = Sequencer::new(env.core.db.clone());
    assert_eq!(rebuilt.current_seq(owner.id), 7);
    assert_eq!(rebuilt.next_seq(owner.id), 8);
    assert_eq!(rebuilt.next_seq(user.id), 3);
}

#[test]
fn test_log_batch_is_idempotent() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let sequencer = env.core.hub.sequencer();
    assert!(sequencer.log_batch(owner.id, 1, r#"[{"type":"ping"}]"#).unwrap());
    // second persist of the same (user, seq) is a no-op, not an error
    assert!(!sequencer.log_batch(owner.id, 1, r#"[{"type":"ping"}]"#).unwrap());

    let batches = env.core.db.fetch_update_log(owner.id, 0, 1).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].updates, r#"[{"type":"ping"}]"#);
}

#[test]
fn test_concurrent_allocation_is_collision_free() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let sequencer: Arc<Sequencer> = env.core.hub.sequencer().clone();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sequencer = sequencer.clone();
        let user_id = owner.id;
        handles.push(std::thread::spawn(move || {
            (0..50).map(|_| sequencer.next_seq(user_id)).collect::<Vec<i64>>()
        }));
    }

    let mut seen = HashSet::new();
    let mut per_thread_monotone = true;
    for handle in handles {
        let values = handle.join().unwrap();
        per_thread_monotone &= values.windows(2).all(|w| w[0] < w[1]);
        for value in values {
            assert!(seen.insert(value), "duplicate sequence {value}");
        }
    }
    assert!(per_thread_monotone);
    assert_eq!(seen.len(), 400);
    assert_eq!(sequencer.current_seq(owner.id), 400);
}

#[test]
fn test_fetch_update_log_range_is_exclusive_inclusive() {
    let env = test_env();
    let owner = create_owner(&env.core);
    for seq in 1..=5 {
        env.core
            .db
            .append_update_log(owner.id, seq, &format!("[{seq}]"))
            .unwrap();
    }
    let batches = env.core.db.fetch_update_log(owner.id, 2, 4).unwrap();
    let sequences: Vec<i64> = batches.iter().map(|b| b.sequence).collect();
    assert_eq!(sequences, vec![3, 4]);
}
