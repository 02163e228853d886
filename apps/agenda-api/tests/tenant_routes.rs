mod common;

use axum::http::StatusCode;
use common::{join_as_client, setup_test_app, tenant_with_admin, token_for};
use core_lib::domain::appointment::BookingPolicy;
use serde_json::{Value, json};

#[tokio::test]
async fn health_needs_no_token() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn api_rejects_missing_or_forged_tokens() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let response = app.server.get("/api/users/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .get("/api/users/me")
        .authorization_bearer("not-a-jwt")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unregistered_caller_has_no_profile() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let response = app
        .server
        .get("/api/users/me")
        .authorization_bearer(&token_for("ghost", "Ghost"))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_user_cannot_bootstrap_the_platform() {
    let app = setup_test_app(BookingPolicy::Permissive);
    tenant_with_admin(&app.server).await;

    let response = app
        .server
        .post("/api/users/sync")
        .authorization_bearer(&token_for("intruder", "Intruder"))
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invite_code_only_makes_one_admin() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, owner, admin) = tenant_with_admin(&app.server).await;

    let tenant: Value = app
        .server
        .get(&format!("/api/negocios/{}", negocio_id))
        .authorization_bearer(&owner)
        .await
        .json();
    let code = tenant["invite_code"].as_str().unwrap().to_string();
    assert_eq!(tenant["has_admin"], true);

    // The code is spent once the tenant has an admin.
    let late = token_for("late", "Late Comer");
    let response = app
        .server
        .post("/api/users/sync")
        .authorization_bearer(&late)
        .json(&json!({ "negocio_id": negocio_id, "invite_code": code }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["role"], "client");

    let as_client: Value = app
        .server
        .get(&format!("/api/negocios/{}", negocio_id))
        .authorization_bearer(&late)
        .await
        .json();
    assert!(as_client.get("invite_code").is_none());

    let as_admin: Value = app
        .server
        .get(&format!("/api/negocios/{}", negocio_id))
        .authorization_bearer(&admin)
        .await
        .json();
    assert_eq!(as_admin["invite_code"], code.as_str());
}

#[tokio::test]
async fn only_super_admin_creates_tenants() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (_, _, admin) = tenant_with_admin(&app.server).await;
    let response = app
        .server
        .post("/api/negocios")
        .authorization_bearer(&admin)
        .json(&json!({ "name": "Outra" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_promotes_client_to_professional() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "maria").await;

    let path = format!("/api/negocios/{}/users/maria/role", negocio_id);
    let response = app
        .server
        .patch(&path)
        .authorization_bearer(&client)
        .json(&json!({ "role": "professional" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app
        .server
        .patch(&path)
        .authorization_bearer(&admin)
        .json(&json!({ "role": "professional" }))
        .await;
    response.assert_status_ok();
    let change: Value = response.json();
    assert_eq!(change["old_role"], "client");
    assert_eq!(change["new_role"], "professional");

    let professionals: Vec<Value> = app
        .server
        .get(&format!("/api/negocios/{}/profissionais", negocio_id))
        .authorization_bearer(&client)
        .await
        .json();
    let ids: Vec<&str> = professionals
        .iter()
        .filter_map(|p| p["usuario_id"].as_str())
        .collect();
    assert!(ids.contains(&"maria"));
    assert!(ids.contains(&"admin"));

    let users: Vec<Value> = app
        .server
        .get(&format!("/api/negocios/{}/users", negocio_id))
        .authorization_bearer(&admin)
        .await
        .json();
    assert_eq!(users.len(), 2);

    let audit: Vec<Value> = app
        .server
        .get(&format!("/api/negocios/{}/audit", negocio_id))
        .authorization_bearer(&admin)
        .await
        .json();
    assert!(audit.len() >= 2);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    join_as_client(&app.server, &negocio_id, "maria").await;

    let response = app
        .server
        .patch(&format!("/api/negocios/{}/users/maria/role", negocio_id))
        .authorization_bearer(&admin)
        .json(&json!({ "role": "wizard" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inactive_member_loses_access() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "joao").await;

    let response = app
        .server
        .patch(&format!("/api/negocios/{}/users/joao/status", negocio_id))
        .authorization_bearer(&admin)
        .json(&json!({ "status": "inactive" }))
        .await;
    response.assert_status_ok();

    let response = app
        .server
        .get(&format!("/api/negocios/{}", negocio_id))
        .authorization_bearer(&client)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_update_round_trips_through_encryption() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, _) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "bia").await;

    let response = app
        .server
        .patch("/api/users/me")
        .authorization_bearer(&client)
        .json(&json!({
            "name": "Bia Souza",
            "phone": "(11) 98765-4321",
            "address": { "postal_code": "01310-100", "city": "São Paulo" }
        }))
        .await;
    response.assert_status_ok();

    let me: Value = app
        .server
        .get("/api/users/me")
        .authorization_bearer(&client)
        .await
        .json();
    assert_eq!(me["name"], "Bia Souza");
    assert_eq!(me["phone"], "11987654321");
    assert_eq!(me["address"]["city"], "São Paulo");
    assert_eq!(me["roles"][negocio_id.as_str()], "client");

    let response = app
        .server
        .put("/api/users/me/consent")
        .authorization_bearer(&client)
        .json(&json!({ "accepted": true, "version": "2024-01" }))
        .await;
    response.assert_status_ok();

    let response = app
        .server
        .post("/api/users/me/push-tokens")
        .authorization_bearer(&client)
        .json(&json!({ "token": "device-1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}
