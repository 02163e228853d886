use axum::{
    Json,
    extract::{Extension, Path, Query as QueryParams, State},
};
use chrono::{NaiveDate, NaiveTime};
use core_lib::domain::appointment::{
    APPOINTMENTS, Appointment, available_slots, day_interval, minutes, overlapping_dates,
    validate_duration,
};
use core_lib::domain::audit::{AUDIT_LOG, AuditEntry};
use core_lib::domain::clinical::{ClinicalRecord, RecordKind};
use core_lib::domain::feed::{Comment, POSTS, Post, page_size};
use core_lib::domain::notification::{NOTIFICATIONS, Notification};
use core_lib::domain::professional::{
    BLOCKING_PERIODS, BlockingPeriod, PROFESSIONALS, ProfessionalProfile, profile_id,
};
use core_lib::domain::role::{Role, UserStatus};
use core_lib::domain::tenant::{TENANTS, Tenant, TenantView};
use core_lib::domain::timestamp::format_clock;
use core_lib::domain::user::{USERS, UserProfile, UserRecord};
use core_lib::{CoreError, DocumentStore, Filter, Query};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::authz::{Requirement, require};
use super::commands::feed::comments_of;
use super::middleware::AuthenticatedUser;
use super::{decode_all, load};
use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize, Default)]
pub struct Pagination {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TenantMember {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct SlotParams {
    pub date: NaiveDate,
    pub duration: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppointmentFilter {
    pub profissional_id: Option<String>,
    pub date: Option<NaiveDate>,
}

async fn list<T: serde::de::DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    query: Query,
) -> Result<Vec<T>, CoreError> {
    decode_all(store.query(collection, &query).await?)
}

// GET /api/users/me
pub async fn handle_get_me(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
) -> ApiResult<Json<UserProfile>> {
    if !ctx.registered {
        return Err(ApiError::not_found("user"));
    }
    let record: UserRecord = load(app_state.store.as_ref(), USERS, &ctx.uid, "user").await?;
    Ok(Json(record.to_profile(&app_state.cipher)))
}

// GET /api/negocios/{id}
pub async fn handle_get_tenant(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
) -> ApiResult<Json<TenantView>> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    let tenant: Tenant = load(app_state.store.as_ref(), TENANTS, &negocio_id, "tenant").await?;
    Ok(Json(tenant.view(access.is_admin())))
}

// GET /api/negocios/{id}/audit
pub async fn handle_list_audit(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    QueryParams(page): QueryParams<Pagination>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    require(&ctx, &negocio_id, Requirement::Admin)?;
    let entries = list(
        app_state.store.as_ref(),
        AUDIT_LOG,
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .order_by("timestamp", true)
            .limit(page_size(page.limit)),
    )
    .await?;
    Ok(Json(entries))
}

// GET /api/negocios/{id}/users
pub async fn handle_list_tenant_users(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
) -> ApiResult<Json<Vec<TenantMember>>> {
    require(&ctx, &negocio_id, Requirement::Admin)?;
    let records: Vec<UserRecord> = list(
        app_state.store.as_ref(),
        USERS,
        Query::new()
            .filter(Filter::exists(format!("roles.{}", negocio_id)))
            .order_by("email", false),
    )
    .await?;
    let members = records
        .into_iter()
        .filter_map(|record| {
            let role = record.role_in(&negocio_id)?;
            Some(TenantMember {
                name: app_state.cipher.decrypt_for_display(&record.name),
                status: record.status_in(&negocio_id),
                uid: record.uid,
                email: record.email,
                role,
            })
        })
        .collect::<Vec<_>>();
    debug!(negocio_id = %negocio_id, count = members.len(), "listed tenant members");
    Ok(Json(members))
}

// GET /api/negocios/{id}/profissionais
pub async fn handle_list_professionals(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
) -> ApiResult<Json<Vec<ProfessionalProfile>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let profiles = list(
        app_state.store.as_ref(),
        PROFESSIONALS,
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .where_eq("active", true),
    )
    .await?;
    Ok(Json(profiles))
}

// GET /api/negocios/{id}/profissionais/{pid}/bloqueios
pub async fn handle_list_blocking_periods(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid)): Path<(String, String)>,
) -> ApiResult<Json<Vec<BlockingPeriod>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let blocks = list(
        app_state.store.as_ref(),
        BLOCKING_PERIODS,
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .where_eq("profissional_id", pid.as_str())
            .order_by("start", false),
    )
    .await?;
    Ok(Json(blocks))
}

/// Free start times for one professional on one day. An inactive
/// professional has none.
pub async fn compute_available_slots(
    store: &dyn DocumentStore,
    negocio_id: &str,
    profissional_id: &str,
    date: NaiveDate,
    duration_minutes: u32,
) -> Result<Vec<NaiveTime>, CoreError> {
    validate_duration(duration_minutes)?;
    let profile: ProfessionalProfile = load(
        store,
        PROFESSIONALS,
        &profile_id(negocio_id, profissional_id),
        "professional",
    )
    .await?;
    if !profile.active {
        return Ok(Vec::new());
    }
    // Late bookings from the previous day can run into this one.
    let mut appointments: Vec<Appointment> = Vec::new();
    for day in overlapping_dates(&day_interval(date)) {
        appointments.extend(
            list::<Appointment>(
                store,
                APPOINTMENTS,
                Query::new()
                    .where_eq("negocio_id", negocio_id)
                    .where_eq("profissional_id", profissional_id)
                    .where_eq("date", day.to_string()),
            )
            .await?,
        );
    }
    let blocks: Vec<BlockingPeriod> = list(
        store,
        BLOCKING_PERIODS,
        Query::new()
            .where_eq("negocio_id", negocio_id)
            .where_eq("profissional_id", profissional_id),
    )
    .await?;
    Ok(available_slots(
        &profile.working_hours,
        date,
        minutes(duration_minutes),
        &appointments,
        &blocks,
    ))
}

// GET /api/negocios/{id}/profissionais/{pid}/slots?date=&duration=
pub async fn handle_available_slots(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid)): Path<(String, String)>,
    QueryParams(params): QueryParams<SlotParams>,
) -> ApiResult<Json<Vec<String>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let slots = compute_available_slots(
        app_state.store.as_ref(),
        &negocio_id,
        &pid,
        params.date,
        params.duration,
    )
    .await?;
    Ok(Json(slots.iter().map(format_clock).collect()))
}

// GET /api/negocios/{id}/agendamentos?profissional_id=&date=
pub async fn handle_list_appointments(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    QueryParams(filter): QueryParams<AppointmentFilter>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    let mut query = Query::new().where_eq("negocio_id", negocio_id.as_str());
    if !access.is_staff() {
        query = query.where_eq("cliente_id", ctx.uid.as_str());
    }
    if let Some(pid) = &filter.profissional_id {
        query = query.where_eq("profissional_id", pid.as_str());
    }
    if let Some(date) = filter.date {
        query = query.where_eq("date", date.to_string());
    }
    let appointments = list(
        app_state.store.as_ref(),
        APPOINTMENTS,
        query.order_by("start", false),
    )
    .await?;
    Ok(Json(appointments))
}

// GET /api/negocios/{id}/pacientes/{patient}/{kind}
pub async fn handle_list_records(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, paciente_id, kind)): Path<(String, String, String)>,
) -> ApiResult<Json<Vec<ClinicalRecord>>> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    if !access.is_staff() && ctx.uid != paciente_id {
        return Err(ApiError::forbidden());
    }
    let kind: RecordKind = kind.parse()?;
    let records = list(
        app_state.store.as_ref(),
        kind.collection(),
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .where_eq("paciente_id", paciente_id.as_str())
            .order_by("created_at", true),
    )
    .await?;
    Ok(Json(records))
}

// GET /api/negocios/{id}/posts?limit=
pub async fn handle_list_posts(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    QueryParams(page): QueryParams<Pagination>,
) -> ApiResult<Json<Vec<Post>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let posts = list(
        app_state.store.as_ref(),
        POSTS,
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .order_by("created_at", true)
            .limit(page_size(page.limit)),
    )
    .await?;
    Ok(Json(posts))
}

// GET /api/negocios/{id}/posts/{pid}/comments
pub async fn handle_list_comments(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, post_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Comment>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let post: Post = load(app_state.store.as_ref(), POSTS, &post_id, "post").await?;
    if post.negocio_id != negocio_id {
        return Err(ApiError::not_found("post"));
    }
    Ok(Json(comments_of(app_state.store.as_ref(), &post.id).await?))
}

// GET /api/negocios/{id}/notificacoes
pub async fn handle_list_notifications(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    QueryParams(page): QueryParams<Pagination>,
) -> ApiResult<Json<Vec<Notification>>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let notifications = list(
        app_state.store.as_ref(),
        NOTIFICATIONS,
        Query::new()
            .where_eq("negocio_id", negocio_id.as_str())
            .where_eq("usuario_id", ctx.uid.as_str())
            .order_by("created_at", true)
            .limit(page_size(page.limit)),
    )
    .await?;
    Ok(Json(notifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use core_lib::adapters::in_memory_store::InMemoryDocumentStore;
    use core_lib::document::encode;
    use core_lib::domain::appointment::NewAppointment;
    use core_lib::domain::professional::WorkingWindow;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn slots_account_for_bookings_and_inactive_profiles() {
        let store = InMemoryDocumentStore::default();
        // 2024-06-03 is a Monday.
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let mut profile = ProfessionalProfile::new("n1", "pro");
        profile.working_hours = vec![WorkingWindow {
            weekday: Weekday::Mon,
            start: time(9, 0),
            end: time(12, 0),
        }];
        store.set(PROFESSIONALS, &profile.id, encode(&profile).unwrap()).await.unwrap();
        let booked = Appointment::schedule(NewAppointment {
            negocio_id: "n1".into(),
            profissional_id: "pro".into(),
            cliente_id: "cli".into(),
            service: None,
            start: date.and_time(time(10, 0)),
            duration_minutes: 60,
            notes: None,
            created_by: "cli".into(),
        })
        .unwrap();
        store.set(APPOINTMENTS, &booked.id, encode(&booked).unwrap()).await.unwrap();

        let slots = compute_available_slots(&store, "n1", "pro", date, 60).await.unwrap();
        assert_eq!(slots, vec![time(9, 0), time(11, 0)]);

        // Other days and other tenants are unaffected.
        let tuesday = date.succ_opt().unwrap();
        assert!(compute_available_slots(&store, "n1", "pro", tuesday, 60).await.unwrap().is_empty());
        assert!(matches!(
            compute_available_slots(&store, "n2", "pro", date, 60).await,
            Err(CoreError::NotFound(_))
        ));

        profile.active = false;
        store.set(PROFESSIONALS, &profile.id, encode(&profile).unwrap()).await.unwrap();
        assert!(compute_available_slots(&store, "n1", "pro", date, 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn late_booking_hides_next_morning_slots() {
        let store = InMemoryDocumentStore::default();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let tuesday = monday.succ_opt().unwrap();
        let mut profile = ProfessionalProfile::new("n1", "pro");
        profile.working_hours = vec![WorkingWindow {
            weekday: Weekday::Tue,
            start: time(0, 0),
            end: time(3, 0),
        }];
        store.set(PROFESSIONALS, &profile.id, encode(&profile).unwrap()).await.unwrap();
        let late = Appointment::schedule(NewAppointment {
            negocio_id: "n1".into(),
            profissional_id: "pro".into(),
            cliente_id: "cli".into(),
            service: None,
            start: monday.and_time(time(23, 0)),
            duration_minutes: 120,
            notes: None,
            created_by: "cli".into(),
        })
        .unwrap();
        store.set(APPOINTMENTS, &late.id, encode(&late).unwrap()).await.unwrap();

        let slots = compute_available_slots(&store, "n1", "pro", tuesday, 60).await.unwrap();
        assert_eq!(slots, vec![time(1, 0), time(2, 0)]);
    }

    #[tokio::test]
    async fn zero_duration_is_invalid() {
        let store = InMemoryDocumentStore::default();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let res = compute_available_slots(&store, "n1", "pro", date, 0).await;
        assert!(matches!(res, Err(CoreError::Validation(_))));
    }
}
