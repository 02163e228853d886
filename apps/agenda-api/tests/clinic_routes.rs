mod common;

use axum::http::StatusCode;
use common::{join_as_client, setup_test_app, tenant_with_admin};
use core_lib::domain::appointment::BookingPolicy;
use serde_json::{Value, json};

#[tokio::test]
async fn staff_write_records_and_patients_read_their_own() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let carla = join_as_client(&app.server, &negocio_id, "carla").await;
    let davi = join_as_client(&app.server, &negocio_id, "davi").await;
    let path = format!("/api/negocios/{}/pacientes/carla/anamneses", negocio_id);

    let response = app
        .server
        .post(&path)
        .authorization_bearer(&carla)
        .json(&json!({ "content": { "queixa": "dor de cabeça" } }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app
        .server
        .post(&path)
        .authorization_bearer(&admin)
        .json(&json!({ "content": { "queixa": "dor de cabeça" } }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let record: Value = response.json();
    assert_eq!(record["author_id"], "admin");

    let own: Vec<Value> = app.server.get(&path).authorization_bearer(&carla).await.json();
    assert_eq!(own.len(), 1);

    let response = app.server.get(&path).authorization_bearer(&davi).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app
        .server
        .delete(&format!("{}/{}", path, record["id"].as_str().unwrap()))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let own: Vec<Value> = app.server.get(&path).authorization_bearer(&carla).await.json();
    assert!(own.is_empty());
}

#[tokio::test]
async fn record_paths_and_bodies_are_validated() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    join_as_client(&app.server, &negocio_id, "carla").await;

    let response = app
        .server
        .post(&format!("/api/negocios/{}/pacientes/carla/receitas", negocio_id))
        .authorization_bearer(&admin)
        .json(&json!({ "content": { "x": 1 } }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app
        .server
        .post(&format!("/api/negocios/{}/pacientes/stranger/exames", negocio_id))
        .authorization_bearer(&admin)
        .json(&json!({ "content": { "x": 1 } }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app
        .server
        .post(&format!("/api/negocios/{}/pacientes/carla/exames", negocio_id))
        .authorization_bearer(&admin)
        .json(&json!({ "content": "texto solto" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn feed_posts_likes_and_comments() {
    let app = setup_test_app(BookingPolicy::Permissive);
    let (negocio_id, _, admin) = tenant_with_admin(&app.server).await;
    let carla = join_as_client(&app.server, &negocio_id, "carla").await;
    let davi = join_as_client(&app.server, &negocio_id, "davi").await;
    let posts = format!("/api/negocios/{}/posts", negocio_id);

    let response = app
        .server
        .post(&posts)
        .authorization_bearer(&carla)
        .json(&json!({ "content": "Bom dia, clínica!" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let post: Value = response.json();
    let post_path = format!("{}/{}", posts, post["id"].as_str().unwrap());

    let like: Value = app
        .server
        .post(&format!("{}/like", post_path))
        .authorization_bearer(&davi)
        .await
        .json();
    assert_eq!(like, json!({ "liked": true, "like_count": 1 }));
    let unlike: Value = app
        .server
        .post(&format!("{}/like", post_path))
        .authorization_bearer(&davi)
        .await
        .json();
    assert_eq!(unlike, json!({ "liked": false, "like_count": 0 }));

    let response = app
        .server
        .post(&format!("{}/comments", post_path))
        .authorization_bearer(&davi)
        .json(&json!({ "content": "Bom dia!" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let comments: Vec<Value> = app
        .server
        .get(&format!("{}/comments", post_path))
        .authorization_bearer(&carla)
        .await
        .json();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author_id"], "davi");

    let listed: Vec<Value> = app.server.get(&posts).authorization_bearer(&davi).await.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["comment_count"], 1);

    let response = app.server.delete(&post_path).authorization_bearer(&davi).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = app.server.delete(&post_path).authorization_bearer(&admin).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let listed: Vec<Value> = app.server.get(&posts).authorization_bearer(&davi).await.json();
    assert!(listed.is_empty());
}
