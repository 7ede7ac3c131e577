use chatcore::presence::spawn_typing_sweeper;

use crate::common::{
    create_owner, create_user, dispatch, frame, login, next_frame, next_frame_of_type,
    open_session, test_env, updates_of_kind,
};

#[rocket::async_test]
async fn test_typing_is_edge_triggered() {
    let env = test_env();
    create_owner(&env.core);
    let gwen = create_user(&env.core, "gwen");
    let hank = create_user(&env.core, "hank");
    let gwen_token = login(&env.core, &gwen);
    let hank_token = login(&env.core, &hank);

    let (g1, mut g1_rx) = open_session(&env.core);
    let (h1, mut h1_rx) = open_session(&env.core);
    dispatch(&env.core, &h1, frame("ping", serde_json::json!({}), &hank_token));
    next_frame(&mut h1_rx, 200).await.unwrap();

    // three rapid typing events, no stop in between
    for _ in 0..3 {
        dispatch(&env.core, &g1, frame("typing", serde_json::json!({}), &gwen_token));
    }

    let batch = next_frame_of_type(&mut h1_rx, "updates", 500).await.expect("typing batch");
    let typing = updates_of_kind(&batch, "typing");
    assert_eq!(typing.len(), 1, "exactly one typing broadcast");
    assert_eq!(typing[0]["data"]["userId"], gwen.id);

    // an explicit stop produces exactly one stopTyping
    dispatch(&env.core, &g1, frame("stopTyping", serde_json::json!({}), &gwen_token));
    dispatch(&env.core, &g1, frame("stopTyping", serde_json::json!({}), &gwen_token));
    let batch = next_frame_of_type(&mut h1_rx, "updates", 500).await.expect("stop batch");
    assert_eq!(updates_of_kind(&batch, "stopTyping").len(), 1);

    // the typist never gets a direct confirmation reply, only the broadcast
    let own = next_frame(&mut g1_rx, 300).await.expect("own broadcast batch");
    assert_eq!(own["type"], "updates");
}

#[rocket::async_test]
async fn test_typing_expires_via_sweeper() {
    let env = test_env();
    create_owner(&env.core);
    let gwen = create_user(&env.core, "gwen");
    let hank = create_user(&env.core, "hank");
    let gwen_token = login(&env.core, &gwen);
    let hank_token = login(&env.core, &hank);

    spawn_typing_sweeper(env.core.hub.clone(), env.core.typing.clone());

    let (g1, _g1_rx) = open_session(&env.core);
    let (h1, mut h1_rx) = open_session(&env.core);
    dispatch(&env.core, &h1, frame("ping", serde_json::json!({}), &hank_token));
    next_frame(&mut h1_rx, 200).await.unwrap();

    dispatch(&env.core, &g1, frame("typing", serde_json::json!({}), &gwen_token));
    let batch = next_frame_of_type(&mut h1_rx, "updates", 500).await.expect("typing batch");
    assert_eq!(updates_of_kind(&batch, "typing").len(), 1);

    // TTL is 1 s in tests; the sweeper runs every second
    let batch = next_frame_of_type(&mut h1_rx, "updates", 3500)
        .await
        .expect("expiry batch");
    let stops = updates_of_kind(&batch, "stopTyping");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0]["data"]["userId"], gwen.id);
}

#[rocket::async_test]
async fn test_dm_typing_goes_only_to_recipient() {
    let env = test_env();
    create_owner(&env.core);
    let gwen = create_user(&env.core, "gwen");
    let hank = create_user(&env.core, "hank");
    let ivan = create_user(&env.core, "ivan");
    let gwen_token = login(&env.core, &gwen);
    let hank_token = login(&env.core, &hank);
    let ivan_token = login(&env.core, &ivan);

    let (g1, _g1_rx) = open_session(&env.core);
    let (h1, mut h1_rx) = open_session(&env.core);
    let (i1, mut i1_rx) = open_session(&env.core);
    dispatch(&env.core, &h1, frame("ping", serde_json::json!({}), &hank_token));
    dispatch(&env.core, &i1, frame("ping", serde_json::json!({}), &ivan_token));
    next_frame(&mut h1_rx, 200).await.unwrap();
    next_frame(&mut i1_rx, 200).await.unwrap();

    dispatch(
        &env.core,
        &g1,
        frame("dmTyping", serde_json::json!({"recipientId": hank.id}), &gwen_token),
    );

    let batch = next_frame_of_type(&mut h1_rx, "updates", 500).await.expect("dm typing");
    assert_eq!(updates_of_kind(&batch, "dmTyping").len(), 1);
    // the bystander hears nothing
    assert!(next_frame_of_type(&mut i1_rx, "updates", 200).await.is_none());
}

#[rocket::async_test]
async fn test_typing_state_is_per_dm_pair() {
    let env = test_env();
    create_owner(&env.core);
    let gwen = create_user(&env.core, "gwen");
    let hank = create_user(&env.core, "hank");
    let ivan = create_user(&env.core, "ivan");
    let gwen_token = login(&env.core, &gwen);
    let hank_token = login(&env.core, &hank);
    let ivan_token = login(&env.core, &ivan);

    let (g1, _g1_rx) = open_session(&env.core);
    let (h1, mut h1_rx) = open_session(&env.core);
    let (i1, mut i1_rx) = open_session(&env.core);
    dispatch(&env.core, &h1, frame("ping", serde_json::json!({}), &hank_token));
    dispatch(&env.core, &i1, frame("ping", serde_json::json!({}), &ivan_token));
    next_frame(&mut h1_rx, 200).await.unwrap();
    next_frame(&mut i1_rx, 200).await.unwrap();

    // typing toward hank, then toward ivan: both transitions broadcast
    dispatch(
        &env.core,
        &g1,
        frame("dmTyping", serde_json::json!({"recipientId": hank.id}), &gwen_token),
    );
    dispatch(
        &env.core,
        &g1,
        frame("dmTyping", serde_json::json!({"recipientId": ivan.id}), &gwen_token),
    );

    let h_batch = next_frame_of_type(&mut h1_rx, "updates", 500).await.expect("hank batch");
    let i_batch = next_frame_of_type(&mut i1_rx, "updates", 500).await.expect("ivan batch");
    assert_eq!(updates_of_kind(&h_batch, "dmTyping").len(), 1);
    assert_eq!(updates_of_kind(&i_batch, "dmTyping").len(), 1);
}
