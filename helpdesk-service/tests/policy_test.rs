mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use helpdesk_service::{
    models::UserType,
    services::{bootstrap::ADMIN_ROLE_ID, PolicyEvaluator},
};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_policy_grant_and_delete_flow() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;
    let r1 = app.create_role("R1").await;
    let r2 = app.create_role("R2").await;
    let ticket = app.object_id("ticket").await;

    assert!(!app.enforcer.enforce_any(&[r1.role_id], "ticket", "create").unwrap());

    let (status, policy) = app
        .request(
            Method::POST,
            "/policies",
            Some(&token),
            Some(json!({ "role_id": r1.role_id, "object_id": ticket, "action": "create" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(policy["action"], "create");
    assert_eq!(policy["is_standard"], false);
    assert!(app.enforcer.enforce_any(&[r1.role_id], "ticket", "create").unwrap());

    let uri = format!("/policies/{}", policy["policy_id"].as_str().unwrap());
    let (status, body) = app.request(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Policy deleted");
    assert!(!app.enforcer.enforce_any(&[r1.role_id], "ticket", "create").unwrap());

    let u1 = app.create_user("u1@example.com", UserType::Agent, r2.role_id).await;
    let (status, grant) = app
        .request(
            Method::POST,
            &format!("/users/{}/role/{}", u1.user_id, r1.role_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(grant["role_id"], r1.role_id.to_string());

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/users/{}/role/{}", u1.user_id, r2.role_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_created_policy_admits_role_holder() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let auditor = app.create_role("auditor").await;
    let user = app.create_user("auditor@example.com", UserType::Agent, auditor.role_id).await;
    let token = app.token_for(&user);

    let (status, _) = app.request(Method::GET, "/policies", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            "/policies",
            Some(&admin_token),
            Some(json!({
                "role_id": auditor.role_id,
                "object_id": app.object_id("policy").await,
                "action": "LIST"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.request(Method::GET, "/policies", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_policy_conflicts() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;
    let role = app.create_role("triage").await;
    let body = json!({
        "role_id": role.role_id,
        "object_id": app.object_id("note").await,
        "action": "view"
    });

    let (status, _) = app.request(Method::POST, "/policies", Some(&token), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.request(Method::POST, "/policies", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_policy_for_unknown_references() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;
    let ticket = app.object_id("ticket").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/policies",
            Some(&token),
            Some(json!({ "role_id": Uuid::new_v4(), "object_id": ticket, "action": "view" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = app
        .request(
            Method::POST,
            "/policies",
            Some(&token),
            Some(json!({ "role_id": ADMIN_ROLE_ID, "object_id": Uuid::new_v4(), "action": "view" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_policy_request_validation() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/policies",
            Some(&token),
            Some(json!({
                "role_id": ADMIN_ROLE_ID,
                "object_id": app.object_id("ticket").await,
                "action": ""
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .request(Method::POST, "/policies", Some(&token), Some(json!({ "role_id": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_get_and_list_policies() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;

    let (status, list) = app.request(Method::GET, "/policies", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let policies = list.as_array().unwrap();
    assert_eq!(policies.len(), 15 * 5);

    let id = policies[0]["policy_id"].as_str().unwrap();
    let (status, policy) = app
        .request(Method::GET, &format!("/policies/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(policy["policy_id"], id);

    let (status, _) = app
        .request(Method::GET, &format!("/policies/{}", Uuid::new_v4()), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(Method::GET, "/policies/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_standard_policy_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;

    let (_, list) = app.request(Method::GET, "/policies", Some(&token), None).await;
    let id = list[0]["policy_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(Method::DELETE, &format!("/policies/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert!(app.enforcer.enforce_any(&[ADMIN_ROLE_ID], "ticket", "delete").unwrap());
}

#[tokio::test]
async fn test_reload_counts_rules() {
    let app = TestApp::spawn().await;
    let (_, token) = app.admin().await;

    let (status, body) = app.request(Method::POST, "/enforcer/reload", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let rules = body["rules"].as_u64().unwrap();
    assert!(rules >= 15 * 5);
    assert!(app.enforcer.enforce_any(&[ADMIN_ROLE_ID], "policy", "create").unwrap());
}
