use axum::{
    Router,
    middleware,
    routing::{delete, get, patch, post, put},
};
use core_lib::domain::appointment::BookingPolicy;
use core_lib::{Cache, DocumentStore, EventPublisher, crypto::FieldCipher};
use http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod application;
pub mod config;
pub mod error;

use application::commands::{
    appointments::{
        handle_book_appointment_request, handle_cancel_appointment_request,
        handle_confirm_appointment_request,
    },
    change_role::handle_change_role_request,
    create_tenant::handle_create_tenant_request,
    feed::{
        handle_add_comment_request, handle_create_post_request, handle_delete_post_request,
        handle_toggle_like_request,
    },
    notifications::handle_mark_notification_read_request,
    professionals::{
        handle_add_blocking_period_request, handle_remove_blocking_period_request,
        handle_set_working_hours_request, handle_update_professional_request,
    },
    records::{
        handle_create_record_request, handle_delete_record_request, handle_update_record_request,
    },
    set_status::handle_set_status_request,
    sync_user::handle_sync_user_request,
    update_profile::{
        handle_add_push_token_request, handle_record_consent_request,
        handle_remove_push_token_request, handle_update_profile_request,
    },
};
use application::identity::IdentityVerifier;
use application::middleware::bearer_auth;
use application::query::{
    handle_available_slots, handle_get_me, handle_get_tenant, handle_list_appointments,
    handle_list_audit, handle_list_blocking_periods, handle_list_comments,
    handle_list_notifications, handle_list_posts, handle_list_professionals, handle_list_records,
    handle_list_tenant_users,
};

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub event_bus: Arc<dyn EventPublisher>,
    pub cache: Arc<dyn Cache>,
    pub cipher: Arc<FieldCipher>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub token_cache_ttl_seconds: u64,
    pub booking_policy: BookingPolicy,
    pub cors_allowed_origin: Option<String>,
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!("ignoring invalid CORS_ALLOWED_ORIGIN: {}", e);
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn health() -> &'static str {
    "ok"
}

// Function to create the main Axum router with state
pub fn create_app(app_state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route("/", post(handle_create_tenant_request))
        .route("/{id}", get(handle_get_tenant))
        .route("/{id}/audit", get(handle_list_audit))
        .route("/{id}/users", get(handle_list_tenant_users))
        .route("/{id}/users/{uid}/role", patch(handle_change_role_request))
        .route("/{id}/users/{uid}/status", patch(handle_set_status_request))
        .route("/{id}/profissionais", get(handle_list_professionals))
        .route(
            "/{id}/profissionais/{pid}",
            patch(handle_update_professional_request),
        )
        .route(
            "/{id}/profissionais/{pid}/horarios",
            put(handle_set_working_hours_request),
        )
        .route(
            "/{id}/profissionais/{pid}/bloqueios",
            post(handle_add_blocking_period_request).get(handle_list_blocking_periods),
        )
        .route(
            "/{id}/profissionais/{pid}/bloqueios/{bid}",
            delete(handle_remove_blocking_period_request),
        )
        .route("/{id}/profissionais/{pid}/slots", get(handle_available_slots))
        .route(
            "/{id}/agendamentos",
            post(handle_book_appointment_request).get(handle_list_appointments),
        )
        .route(
            "/{id}/agendamentos/{aid}/cancel",
            post(handle_cancel_appointment_request),
        )
        .route(
            "/{id}/agendamentos/{aid}/confirm",
            post(handle_confirm_appointment_request),
        )
        .route(
            "/{id}/pacientes/{patient}/{kind}",
            post(handle_create_record_request).get(handle_list_records),
        )
        .route(
            "/{id}/pacientes/{patient}/{kind}/{rid}",
            put(handle_update_record_request).delete(handle_delete_record_request),
        )
        .route(
            "/{id}/posts",
            post(handle_create_post_request).get(handle_list_posts),
        )
        .route(
            "/{id}/posts/{pid}",
            delete(handle_delete_post_request),
        )
        .route(
            "/{id}/posts/{pid}/comments",
            post(handle_add_comment_request).get(handle_list_comments),
        )
        .route("/{id}/posts/{pid}/like", post(handle_toggle_like_request))
        .route("/{id}/notificacoes", get(handle_list_notifications))
        .route(
            "/{id}/notificacoes/{nid}/read",
            post(handle_mark_notification_read_request),
        );

    let api_routes = Router::new()
        .route("/users/sync", post(handle_sync_user_request))
        .route(
            "/users/me",
            get(handle_get_me).patch(handle_update_profile_request),
        )
        .route(
            "/users/me/push-tokens",
            post(handle_add_push_token_request).delete(handle_remove_push_token_request),
        )
        .route("/users/me/consent", put(handle_record_consent_request))
        .nest("/negocios", tenant_routes)
        // Every API route needs a verified identity token.
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            bearer_auth,
        ));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .layer(cors_layer(app_state.cors_allowed_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
