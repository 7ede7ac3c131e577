use chatcore::hub::{AuthInfo, Update};

use crate::common::{create_owner, next_frame, open_session, test_env, updates_of_kind};

fn auth_info(user_id: i64, username: &str) -> AuthInfo {
    AuthInfo {
        user_id,
        username: username.to_string(),
        device_session_id: "test-session".to_string(),
    }
}

#[rocket::async_test]
async fn test_updates_batched_into_one_frame() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 1, "content": "a"})),
    );
    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 2, "content": "b"})),
    );

    let frame = next_frame(&mut rx, 500).await.expect("one batched frame");
    assert_eq!(frame["type"], "updates");
    assert_eq!(frame["seq"], 1);
    assert_eq!(frame["updates"].as_array().unwrap().len(), 2);

    // both updates rode the same flush; nothing else is in the queue
    assert!(next_frame(&mut rx, 150).await.is_none());
}

#[rocket::async_test]
async fn test_duplicate_signature_dropped() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    let update = Update::new("newMessage", serde_json::json!({"id": 42, "content": "hi"}));
    env.core.hub.enqueue(&session, &update);
    env.core.hub.enqueue(&session, &update);

    let frame = next_frame(&mut rx, 500).await.expect("one batched frame");
    assert_eq!(frame["updates"].as_array().unwrap().len(), 1);
}

#[rocket::async_test]
async fn test_edit_not_suppressed_by_create() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 9, "content": "v1"})),
    );
    env.core.hub.enqueue(
        &session,
        &Update::new("messageEdited", serde_json::json!({"id": 9, "content": "v2"})),
    );

    let frame = next_frame(&mut rx, 500).await.expect("one batched frame");
    assert_eq!(updates_of_kind(&frame, "newMessage").len(), 1);
    assert_eq!(updates_of_kind(&frame, "messageEdited").len(), 1);
}

#[rocket::async_test]
async fn test_seq_increases_across_flushes() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 1})),
    );
    let first = next_frame(&mut rx, 500).await.expect("first flush");

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 2})),
    );
    let second = next_frame(&mut rx, 500).await.expect("second flush");

    assert_eq!(first["seq"], 1);
    assert_eq!(second["seq"], 2);
}

#[rocket::async_test]
async fn test_unauthenticated_sessions_get_no_batches() {
    let env = test_env();
    create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 1})),
    );
    assert!(next_frame(&mut rx, 300).await.is_none());
}

#[rocket::async_test]
async fn test_flushed_batch_is_replayable() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 5, "content": "durable"})),
    );
    let frame = next_frame(&mut rx, 500).await.expect("flush");
    let seq = frame["seq"].as_i64().unwrap();

    // the durable log returns exactly the flushed batch for (seq-1, seq]
    let batches = env.core.db.fetch_update_log(owner.id, seq - 1, seq).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].sequence, seq);
    let logged: serde_json::Value = serde_json::from_str(&batches[0].updates).unwrap();
    assert_eq!(logged, frame["updates"]);
}

#[rocket::async_test]
async fn test_broadcast_reaches_only_authenticated_sessions() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (authed, mut authed_rx) = open_session(&env.core);
    let (anon, mut anon_rx) = open_session(&env.core);
    env.core.hub.bind_user(&authed, auth_info(owner.id, &owner.username));
    let _ = anon;

    env.core.hub.broadcast(&Update::new(
        "newMessage",
        serde_json::json!({"id": 11, "content": "for members"}),
    ));

    assert!(next_frame(&mut authed_rx, 500).await.is_some());
    assert!(next_frame(&mut anon_rx, 200).await.is_none());
}

#[rocket::async_test]
async fn test_disconnect_flushes_pending_once() {
    let env = test_env();
    let owner = create_owner(&env.core);
    let (session, mut rx) = open_session(&env.core);
    env.core.hub.bind_user(&session, auth_info(owner.id, &owner.username));

    env.core.hub.enqueue(
        &session,
        &Update::new("newMessage", serde_json::json!({"id": 1})),
    );
    // disconnect before the timer fires: the pending buffer still flushes
    let went_offline = env.core.hub.disconnect(&session);
    assert_eq!(went_offline, Some(owner.id));

    let frame = next_frame(&mut rx, 200).await.expect("final flush");
    assert_eq!(frame["type"], "updates");
    assert_eq!(updates_of_kind(&frame, "newMessage").len(), 1);
}
