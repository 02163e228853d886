mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{join_as_client, setup_test_app, tenant_with_admin};
use core_lib::domain::appointment::BookingPolicy;
use serde_json::{Value, json};
use std::time::Duration;

// 2030-06-03 is a Monday.
const DAY: &str = "2030-06-03";

async fn open_mornings(server: &TestServer, negocio_id: &str, admin: &str) {
    let response = server
        .put(&format!(
            "/api/negocios/{}/profissionais/admin/horarios",
            negocio_id
        ))
        .authorization_bearer(admin)
        .json(&json!({
            "windows": [{ "weekday": "Mon", "start": "09:00", "end": "12:00" }]
        }))
        .await;
    response.assert_status_ok();
}

async fn slots(server: &TestServer, negocio_id: &str, token: &str) -> Vec<String> {
    let response = server
        .get(&format!(
            "/api/negocios/{}/profissionais/admin/slots?date={}&duration=60",
            negocio_id, DAY
        ))
        .authorization_bearer(token)
        .await;
    response.assert_status_ok();
    response.json()
}

async fn book(server: &TestServer, negocio_id: &str, token: &str, start: &str) -> axum_test::TestResponse {
    server
        .post(&format!("/api/negocios/{}/agendamentos", negocio_id))
        .authorization_bearer(token)
        .json(&json!({
            "profissional_id": "admin",
            "service": "Consulta",
            "start": format!("{}T{}", DAY, start),
            "duration": 60
        }))
        .await
}

#[tokio::test]
async fn booking_removes_the_slot_and_cancel_restores_it() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "carla").await;
    open_mornings(&app.server, &negocio_id, &admin).await;

    assert_eq!(
        slots(&app.server, &negocio_id, &client).await,
        vec!["09:00", "10:00", "11:00"]
    );

    let response = book(&app.server, &negocio_id, &client, "10:00").await;
    response.assert_status(StatusCode::CREATED);
    let appointment: Value = response.json();
    assert_eq!(appointment["cliente_id"], "carla");
    assert_eq!(appointment["status"], "scheduled");
    let id = appointment["id"].as_str().unwrap().to_string();

    assert_eq!(
        slots(&app.server, &negocio_id, &client).await,
        vec!["09:00", "11:00"]
    );

    let response = app
        .server
        .post(&format!("/api/negocios/{}/agendamentos/{}/cancel", negocio_id, id))
        .authorization_bearer(&client)
        .json(&json!({ "reason": "imprevisto" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "canceled");

    assert_eq!(
        slots(&app.server, &negocio_id, &client).await,
        vec!["09:00", "10:00", "11:00"]
    );
}

#[tokio::test]
async fn client_cannot_confirm_but_professional_can() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "carla").await;

    let appointment: Value = book(&app.server, &negocio_id, &client, "09:00").await.json();
    let path = format!(
        "/api/negocios/{}/agendamentos/{}/confirm",
        negocio_id,
        appointment["id"].as_str().unwrap()
    );

    let response = app.server.post(&path).authorization_bearer(&client).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app.server.post(&path).authorization_bearer(&admin).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "confirmed");
}

#[tokio::test]
async fn clients_only_see_their_own_appointments() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let carla = join_as_client(&app.server, &negocio_id, "carla").await;
    let davi = join_as_client(&app.server, &negocio_id, "davi").await;

    book(&app.server, &negocio_id, &carla, "09:00")
        .await
        .assert_status(StatusCode::CREATED);
    book(&app.server, &negocio_id, &davi, "11:00")
        .await
        .assert_status(StatusCode::CREATED);

    let path = format!("/api/negocios/{}/agendamentos?date={}", negocio_id, DAY);
    let mine: Vec<Value> = app.server.get(&path).authorization_bearer(&davi).await.json();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["cliente_id"], "davi");

    let all: Vec<Value> = app.server.get(&path).authorization_bearer(&admin).await.json();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["cliente_id"], "carla");
}

#[tokio::test]
async fn strict_policy_refuses_double_booking() {
    let app = setup_test_app(BookingPolicy::RejectOverlaps);
    let (negocio_id, _, _) = tenant_with_admin(&app.server).await;
    let carla = join_as_client(&app.server, &negocio_id, "carla").await;
    let davi = join_as_client(&app.server, &negocio_id, "davi").await;

    book(&app.server, &negocio_id, &carla, "10:00")
        .await
        .assert_status(StatusCode::CREATED);
    let response = book(&app.server, &negocio_id, &davi, "10:30").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn blocking_period_hides_slots() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "carla").await;
    open_mornings(&app.server, &negocio_id, &admin).await;

    let blocks = format!("/api/negocios/{}/profissionais/admin/bloqueios", negocio_id);
    let response = app
        .server
        .post(&blocks)
        .authorization_bearer(&client)
        .json(&json!({ "start": format!("{}T09:00", DAY), "end": format!("{}T11:00", DAY) }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app
        .server
        .post(&blocks)
        .authorization_bearer(&admin)
        .json(&json!({
            "start": format!("{}T09:00:00", DAY),
            "end": format!("{}T11:00:00", DAY),
            "reason": "congresso"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let block: Value = response.json();

    assert_eq!(slots(&app.server, &negocio_id, &client).await, vec!["11:00"]);

    let listed: Vec<Value> = app.server.get(&blocks).authorization_bearer(&admin).await.json();
    assert_eq!(listed.len(), 1);

    let response = app
        .server
        .delete(&format!("{}/{}", blocks, block["id"].as_str().unwrap()))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    assert_eq!(slots(&app.server, &negocio_id, &client).await.len(), 3);
}

#[tokio::test]
async fn booking_notifies_the_professional() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let client = join_as_client(&app.server, &negocio_id, "carla").await;
    book(&app.server, &negocio_id, &client, "09:00")
        .await
        .assert_status(StatusCode::CREATED);

    let path = format!("/api/negocios/{}/notificacoes", negocio_id);
    let mut inbox: Vec<Value> = Vec::new();
    for _ in 0..50 {
        inbox = app.server.get(&path).authorization_bearer(&admin).await.json();
        if !inbox.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["title"], "Novo agendamento");
    assert_eq!(inbox[0]["read"], false);

    // The client booked it, so the client is not notified.
    let theirs: Vec<Value> = app.server.get(&path).authorization_bearer(&client).await.json();
    assert!(theirs.is_empty());

    let response = app
        .server
        .post(&format!("{}/{}/read", path, inbox[0]["id"].as_str().unwrap()))
        .authorization_bearer(&admin)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["read"], true);
}
