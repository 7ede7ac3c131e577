use rocket::http::{ContentType, Header, Status};

use crate::common::{http_register_and_login, test_client};

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

#[test]
fn test_suspend_and_unsuspend_cycle() {
    let client = test_client();
    let (owner_token, _) = http_register_and_login(&client, "owner");
    let (target_token, target) = http_register_and_login(&client, "miscreant");
    let target_id = target["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/moderation/users/{target_id}/suspend"))
        .header(ContentType::JSON)
        .header(bearer(&owner_token))
        .body(r#"{"reason": "being a nuisance"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // the suspended account is denied on its next request
    let res = client
        .post("/api/logout")
        .header(bearer(&target_token))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    // suspended users cannot log in again either
    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(r#"{"username": "miscreant", "password_verifier": "miscreant-verifier"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .post(format!("/api/moderation/users/{target_id}/unsuspend"))
        .header(bearer(&owner_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(r#"{"username": "miscreant", "password_verifier": "miscreant-verifier"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn test_only_owner_may_moderate() {
    let client = test_client();
    http_register_and_login(&client, "owner");
    let (peon_token, _) = http_register_and_login(&client, "peon");
    let (_, victim) = http_register_and_login(&client, "victim");
    let victim_id = victim["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/moderation/users/{victim_id}/suspend"))
        .header(ContentType::JSON)
        .header(bearer(&peon_token))
        .body(r#"{"reason": "jealousy"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_owner_cannot_be_suspended_or_deleted() {
    let client = test_client();
    let (owner_token, owner) = http_register_and_login(&client, "owner");
    let owner_id = owner["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/moderation/users/{owner_id}/suspend"))
        .header(ContentType::JSON)
        .header(bearer(&owner_token))
        .body(r#"{"reason": "self-harm"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .delete(format!("/api/moderation/users/{owner_id}"))
        .header(bearer(&owner_token))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_delete_user_is_sticky() {
    let client = test_client();
    let (owner_token, _) = http_register_and_login(&client, "owner");
    let (gone_token, gone) = http_register_and_login(&client, "goner");
    let gone_id = gone["id"].as_i64().unwrap();

    let res = client
        .delete(format!("/api/moderation/users/{gone_id}"))
        .header(bearer(&owner_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // sessions are revoked on delete, so the old token reads as unauthorized
    let res = client.post("/api/logout").header(bearer(&gone_token)).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(r#"{"username": "goner", "password_verifier": "goner-verifier"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_verify_toggle_flips_each_call() {
    let client = test_client();
    let (owner_token, _) = http_register_and_login(&client, "owner");
    let (_, target) = http_register_and_login(&client, "worthy");
    let target_id = target["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/moderation/users/{target_id}/verify"))
        .header(bearer(&owner_token))
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["verified"], true);

    let res = client
        .post(format!("/api/moderation/users/{target_id}/verify"))
        .header(bearer(&owner_token))
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["verified"], false);
}

#[test]
fn test_blocklist_crud_applies_immediately() {
    let client = test_client();
    let (owner_token, _) = http_register_and_login(&client, "owner");

    let res = client
        .post("/api/moderation/blocklist")
        .header(ContentType::JSON)
        .header(bearer(&owner_token))
        .body(r#"{"words": ["Crypto Scam", "zzfiller"]}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let added: Vec<&str> = body["added"].as_array().unwrap().iter().map(|w| w.as_str().unwrap()).collect();
    assert_eq!(added, vec!["crypto scam", "zzfiller"]);

    let res = client
        .get("/api/moderation/blocklist")
        .header(bearer(&owner_token))
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body["words"].as_array().unwrap().iter().any(|w| w == "zzfiller"));

    let res = client
        .delete("/api/moderation/blocklist")
        .header(ContentType::JSON)
        .header(bearer(&owner_token))
        .body(r#"{"words": ["zzfiller"]}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["removed"].as_array().unwrap().len(), 1);
    assert!(!body["words"].as_array().unwrap().iter().any(|w| w == "zzfiller"));
}

#[test]
fn test_clear_rate_limits_requires_owner() {
    let client = test_client();
    let (owner_token, _) = http_register_and_login(&client, "owner");
    let (peon_token, peon) = http_register_and_login(&client, "peon");
    let peon_id = peon["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/moderation/users/{peon_id}/clear-rate-limits"))
        .header(bearer(&peon_token))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .post(format!("/api/moderation/users/{peon_id}/clear-rate-limits"))
        .header(bearer(&owner_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}
