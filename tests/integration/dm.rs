use crate::common::{
    create_owner, create_user, dispatch, frame, login, next_frame, next_frame_of_type,
    open_session, test_env, updates_of_kind,
};

fn envelope_payload(recipient_id: i64) -> serde_json::Value {
    serde_json::json!({
        "recipientId": recipient_id,
        "iv": "iv1",
        "ciphertext": "c1",
        "salt": "s1",
        "iv2": "i2",
        "wrappedMk": "wm",
    })
}

#[rocket::async_test]
async fn test_dm_echoes_opaque_fields_to_both_parties() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let emil = create_user(&env.core, "emil");
    let dora_token = login(&env.core, &dora);
    let emil_token = login(&env.core, &emil);

    let (d1, mut d1_rx) = open_session(&env.core);
    let (e1, mut e1_rx) = open_session(&env.core);
    dispatch(&env.core, &e1, frame("ping", serde_json::json!({}), &emil_token));
    next_frame(&mut e1_rx, 200).await.unwrap();

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(emil.id), &dora_token));

    let reply = next_frame(&mut d1_rx, 300).await.expect("dmSend reply");
    assert_eq!(reply["data"]["status"], "ok");
    let envelope_id = reply["data"]["id"].as_i64().unwrap();

    for rx in [&mut d1_rx, &mut e1_rx] {
        let batch = next_frame_of_type(rx, "updates", 500).await.expect("dmNew batch");
        let news = updates_of_kind(&batch, "dmNew");
        assert_eq!(news.len(), 1);
        let data = &news[0]["data"];
        assert_eq!(data["id"], envelope_id);
        assert_eq!(data["senderId"], dora.id);
        assert_eq!(data["recipientId"], emil.id);
        // ciphertext fields come back byte-identical
        assert_eq!(data["iv"], "iv1");
        assert_eq!(data["ciphertext"], "c1");
        assert_eq!(data["salt"], "s1");
        assert_eq!(data["iv2"], "i2");
        assert_eq!(data["wrappedMk"], "wm");
    }

    // the stored row never re-encodes the opaque fields either
    let stored = env.core.db.find_dm(envelope_id).unwrap();
    assert_eq!(stored.sender_id, dora.id);
    assert_eq!(stored.recipient_id, emil.id);
    assert_eq!(stored.iv, "iv1");
    assert_eq!(stored.ciphertext, "c1");
    assert_eq!(stored.salt, "s1");
    assert_eq!(stored.iv2, "i2");
    assert_eq!(stored.wrapped_mk, "wm");
}

#[rocket::async_test]
async fn test_dm_to_missing_or_disabled_recipient_fails() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let gone = create_user(&env.core, "gone");
    let token = login(&env.core, &dora);
    let (d1, mut d1_rx) = open_session(&env.core);

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(9999), &token));
    let reply = next_frame(&mut d1_rx, 300).await.expect("not found");
    assert_eq!(reply["error"]["code"], 404);

    env.core.db.set_suspended(gone.id, true, Some("spam")).unwrap();
    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(gone.id), &token));
    let reply = next_frame(&mut d1_rx, 300).await.expect("suspended recipient");
    assert_eq!(reply["error"]["code"], 404);
}

#[rocket::async_test]
async fn test_dm_to_self_rejected() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let token = login(&env.core, &dora);
    let (d1, mut d1_rx) = open_session(&env.core);

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(dora.id), &token));
    let reply = next_frame(&mut d1_rx, 300).await.expect("rejected");
    assert_eq!(reply["error"]["code"], 400);
}

#[rocket::async_test]
async fn test_dm_edit_is_sender_only() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let emil = create_user(&env.core, "emil");
    let dora_token = login(&env.core, &dora);
    let emil_token = login(&env.core, &emil);
    let (d1, mut d1_rx) = open_session(&env.core);
    let (e1, mut e1_rx) = open_session(&env.core);

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(emil.id), &dora_token));
    let reply = next_frame(&mut d1_rx, 300).await.unwrap();
    let envelope_id = reply["data"]["id"].as_i64().unwrap();

    // the recipient cannot rewrite the envelope
    dispatch(
        &env.core,
        &e1,
        frame(
            "dmEdit",
            serde_json::json!({
                "id": envelope_id,
                "iv": "x", "ciphertext": "x", "salt": "x", "iv2": "x", "wrappedMk": "x",
            }),
            &emil_token,
        ),
    );
    let denied = next_frame_of_type(&mut e1_rx, "dmEdit", 500).await.expect("denied");
    assert_eq!(denied["error"]["code"], 403);

    // the sender can
    dispatch(
        &env.core,
        &d1,
        frame(
            "dmEdit",
            serde_json::json!({
                "id": envelope_id,
                "iv": "iv9", "ciphertext": "c9", "salt": "s9", "iv2": "i9", "wrappedMk": "w9",
            }),
            &dora_token,
        ),
    );
    let ok = next_frame_of_type(&mut d1_rx, "dmEdit", 500).await.expect("edited");
    assert_eq!(ok["data"]["status"], "ok");

    let stored = env.core.db.find_dm(envelope_id).unwrap();
    assert_eq!(stored.ciphertext, "c9");
}

#[rocket::async_test]
async fn test_dm_delete_notifies_both_parties() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let emil = create_user(&env.core, "emil");
    let dora_token = login(&env.core, &dora);
    let emil_token = login(&env.core, &emil);
    let (d1, mut d1_rx) = open_session(&env.core);
    let (e1, mut e1_rx) = open_session(&env.core);
    dispatch(&env.core, &e1, frame("ping", serde_json::json!({}), &emil_token));
    next_frame(&mut e1_rx, 200).await.unwrap();

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(emil.id), &dora_token));
    let reply = next_frame(&mut d1_rx, 300).await.unwrap();
    let envelope_id = reply["data"]["id"].as_i64().unwrap();

    dispatch(
        &env.core,
        &d1,
        frame("dmDelete", serde_json::json!({"id": envelope_id}), &dora_token),
    );

    for rx in [&mut d1_rx, &mut e1_rx] {
        let batch = loop {
            let candidate = next_frame_of_type(rx, "updates", 500).await.expect("batch");
            if !updates_of_kind(&candidate, "dmDeleted").is_empty() {
                break candidate;
            }
        };
        let deleted = updates_of_kind(&batch, "dmDeleted");
        assert_eq!(deleted[0]["data"]["id"], envelope_id);
    }

    assert!(env.core.db.find_dm(envelope_id).is_err());
}

#[rocket::async_test]
async fn test_dm_history_covers_both_directions() {
    let env = test_env();
    create_owner(&env.core);
    let dora = create_user(&env.core, "dora");
    let emil = create_user(&env.core, "emil");
    let dora_token = login(&env.core, &dora);
    let emil_token = login(&env.core, &emil);
    let (d1, mut d1_rx) = open_session(&env.core);
    let (e1, mut e1_rx) = open_session(&env.core);

    dispatch(&env.core, &d1, frame("dmSend", envelope_payload(emil.id), &dora_token));
    next_frame(&mut d1_rx, 300).await.unwrap();
    dispatch(&env.core, &e1, frame("dmSend", envelope_payload(dora.id), &emil_token));
    next_frame(&mut e1_rx, 300).await.unwrap();

    let history = env.core.db.dm_history(dora.id, emil.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender_id, dora.id);
    assert_eq!(history[1].sender_id, emil.id);
}
