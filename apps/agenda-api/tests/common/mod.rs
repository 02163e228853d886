#![allow(dead_code)]

use agenda_api::application::dispatcher::NotificationDispatcher;
use agenda_api::application::identity::JwtIdentityVerifier;
use agenda_api::{AppState, create_app};
use axum_test::TestServer;
use core_lib::adapters::{
    in_memory_cache::InMemoryCache, in_memory_event_bus::InMemoryEventBus,
    in_memory_store::InMemoryDocumentStore, logging_push_gateway::LoggingPushGateway,
};
use core_lib::crypto::{EncryptionKey, FieldCipher};
use core_lib::domain::appointment::BookingPolicy;
use core_lib::domain::event::APPOINTMENTS_TOPIC;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret";
const ISSUER: &str = "agenda-idp";
const AUDIENCE: &str = "agenda-api";

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryDocumentStore>,
}

pub fn setup_test_app(booking_policy: BookingPolicy) -> TestApp {
    let store = Arc::new(InMemoryDocumentStore::default());
    let event_bus = Arc::new(InMemoryEventBus::default());
    NotificationDispatcher::new(store.clone(), Arc::new(LoggingPushGateway))
        .spawn(event_bus.subscribe(APPOINTMENTS_TOPIC));

    let app_state = AppState {
        store: store.clone(),
        event_bus,
        cache: Arc::new(InMemoryCache::new(1_000, 60)),
        cipher: Arc::new(FieldCipher::new(&EncryptionKey::generate()).expect("cipher")),
        identity: Arc::new(JwtIdentityVerifier::new(SECRET, ISSUER, AUDIENCE)),
        token_cache_ttl_seconds: 60,
        booking_policy,
        cors_allowed_origin: None,
    };
    let server = TestServer::new(create_app(app_state)).expect("Failed to create TestServer");
    TestApp { server, store }
}

/// An identity token as the provider would issue it for `uid`.
pub fn token_for(uid: &str, name: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let claims = json!({
        "sub": uid,
        "email": format!("{}@example.com", uid),
        "name": name,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": exp,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

/// Bootstraps the platform owner, creates a tenant and joins an admin
/// through the invite code. Returns (tenant id, owner token, admin token).
pub async fn tenant_with_admin(server: &TestServer) -> (String, String, String) {
    let owner = token_for("owner", "Dona Plataforma");
    let response = server
        .post("/api/users/sync")
        .authorization_bearer(&owner)
        .json(&json!({}))
        .await;
    response.assert_status_ok();

    let response = server
        .post("/api/negocios")
        .authorization_bearer(&owner)
        .json(&json!({ "name": "Clínica Central" }))
        .await;
    response.assert_status(http::StatusCode::CREATED);
    let tenant: Value = response.json();
    let negocio_id = tenant["id"].as_str().expect("tenant id").to_string();
    let invite_code = tenant["invite_code"].as_str().expect("invite code").to_string();

    let admin = token_for("admin", "Ana Admin");
    let response = server
        .post("/api/users/sync")
        .authorization_bearer(&admin)
        .json(&json!({ "negocio_id": negocio_id, "invite_code": invite_code }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["role"], "admin");

    (negocio_id, owner, admin)
}

/// Joins `uid` to the tenant as a client and returns their token.
pub async fn join_as_client(server: &TestServer, negocio_id: &str, uid: &str) -> String {
    let token = token_for(uid, "Cliente Teste");
    let response = server
        .post("/api/users/sync")
        .authorization_bearer(&token)
        .json(&json!({ "negocio_id": negocio_id }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["role"], "client");
    token
}
