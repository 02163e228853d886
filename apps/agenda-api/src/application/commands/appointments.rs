use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::middleware::AuthenticatedUser;
use crate::application::{decode_all, fetch};
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDateTime;
use core_lib::domain::appointment::{
    APPOINTMENTS, Appointment, BookingPolicy, Interval, NewAppointment, find_conflict,
    overlapping_dates, validate_duration,
};
use core_lib::domain::event::{APPOINTMENTS_TOPIC, AppointmentEvent};
use core_lib::domain::professional::{
    BLOCKING_PERIODS, BlockingPeriod, PROFESSIONALS, ProfessionalProfile, profile_id,
};
use core_lib::domain::timestamp::wall_clock;
use core_lib::domain::user::{USERS, UserRecord};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, EventPublisher, Query, Transaction,
    document::encode, run_in_transaction,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BookAppointment {
    pub actor: String,
    pub actor_is_staff: bool,
    pub negocio_id: String,
    pub profissional_id: String,
    /// Defaults to the actor.
    pub cliente_id: Option<String>,
    pub service: Option<String>,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelAppointment {
    pub actor: String,
    pub actor_is_admin: bool,
    pub negocio_id: String,
    pub appointment_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmAppointment {
    pub actor: String,
    pub actor_is_admin: bool,
    pub negocio_id: String,
    pub appointment_id: String,
}

impl Command for BookAppointment {}
impl Command for CancelAppointment {}
impl Command for ConfirmAppointment {}

pub struct AppointmentsHandler {
    store: Arc<dyn DocumentStore>,
    event_bus: Arc<dyn EventPublisher>,
    policy: BookingPolicy,
}

impl AppointmentsHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        event_bus: Arc<dyn EventPublisher>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            event_bus,
            policy,
        }
    }

    /// Events are best effort: a failed publish is logged, the write stands.
    async fn publish(&self, event: AppointmentEvent) {
        let appointment_id = event.appointment().appointment_id.clone();
        let result = match event.to_payload() {
            Ok(payload) => {
                self.event_bus
                    .publish(APPOINTMENTS_TOPIC, event.event_type(), &payload)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(
                event_type = event.event_type(),
                %appointment_id,
                "failed to publish appointment event: {}",
                e
            );
        }
    }

    async fn modify<F>(
        &self,
        operation: &str,
        negocio_id: &str,
        appointment_id: &str,
        apply: F,
    ) -> Result<Appointment, CoreError>
    where
        F: Fn(&mut Appointment) -> Result<(), CoreError> + Send + Sync,
    {
        let apply = &apply;
        run_in_transaction(self.store.as_ref(), operation, |mut tx| async move {
            let mut appointment = fetch::<Appointment>(tx.as_mut(), APPOINTMENTS, appointment_id)
                .await?
                .filter(|a| a.negocio_id == negocio_id)
                .ok_or_else(|| CoreError::NotFound("appointment".into()))?;
            apply(&mut appointment)?;
            tx.set(APPOINTMENTS, appointment_id, encode(&appointment)?);
            Ok::<_, CoreError>((tx, appointment))
        })
        .await
    }
}

/// Overlap re-check used by the rejecting policy. Reading the nearby
/// appointments and the professional's blocks inside the transaction makes
/// a concurrent booking of the same professional fail the commit.
async fn ensure_free(
    tx: &mut dyn Transaction,
    candidate: &Appointment,
) -> Result<(), CoreError> {
    let slot = candidate.interval();
    let mut nearby: Vec<Appointment> = Vec::new();
    for date in overlapping_dates(&slot) {
        let docs = tx
            .query(
                APPOINTMENTS,
                &Query::new()
                    .where_eq("negocio_id", candidate.negocio_id.as_str())
                    .where_eq("profissional_id", candidate.profissional_id.as_str())
                    .where_eq("date", date.to_string()),
            )
            .await?;
        nearby.extend(decode_all::<Appointment>(docs)?);
    }
    if let Some(existing) = find_conflict(&nearby, &slot) {
        warn!(
            negocio_id = %candidate.negocio_id,
            profissional_id = %candidate.profissional_id,
            conflicting = %existing.id,
            "booking rejected, slot already taken"
        );
        return Err(CoreError::AlreadyExists(
            "the professional already has an appointment at this time".into(),
        ));
    }

    let blocks = tx
        .query(
            BLOCKING_PERIODS,
            &Query::new()
                .where_eq("negocio_id", candidate.negocio_id.as_str())
                .where_eq("profissional_id", candidate.profissional_id.as_str()),
        )
        .await?;
    let blocks: Vec<BlockingPeriod> = decode_all(blocks)?;
    if blocks.iter().any(|b| Interval::from(b).overlaps(&slot)) {
        return Err(CoreError::AlreadyExists(
            "the professional is unavailable at this time".into(),
        ));
    }
    Ok(())
}

impl CommandHandler<BookAppointment> for AppointmentsHandler {
    type Output = Appointment;

    async fn handle(&self, command: BookAppointment) -> Result<Appointment, CoreError> {
        validate_duration(command.duration_minutes)?;
        let cliente_id = command
            .cliente_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| command.actor.clone());
        if cliente_id != command.actor && !command.actor_is_staff {
            return Err(CoreError::Unauthorized(
                "clients may only book for themselves".into(),
            ));
        }

        let appointment = Appointment::schedule(NewAppointment {
            negocio_id: command.negocio_id.clone(),
            profissional_id: command.profissional_id.clone(),
            cliente_id,
            service: command.service.clone(),
            start: command.start,
            duration_minutes: command.duration_minutes,
            notes: command.notes.clone(),
            created_by: command.actor.clone(),
        })?;

        let (candidate, policy, actor) = (&appointment, self.policy, command.actor.as_str());
        run_in_transaction(self.store.as_ref(), "book_appointment", |mut tx| async move {
            let pid = profile_id(&candidate.negocio_id, &candidate.profissional_id);
            let profile = fetch::<ProfessionalProfile>(tx.as_mut(), PROFESSIONALS, &pid)
                .await?
                .ok_or_else(|| CoreError::NotFound("professional".into()))?;
            if !profile.active {
                return Err(CoreError::InvalidOperation(
                    "the professional is not accepting appointments".into(),
                ));
            }
            if candidate.cliente_id != actor {
                let member = fetch::<UserRecord>(tx.as_mut(), USERS, &candidate.cliente_id)
                    .await?
                    .is_some_and(|u| u.role_in(&candidate.negocio_id).is_some());
                if !member {
                    return Err(CoreError::NotFound("client in this tenant".into()));
                }
            }
            if policy == BookingPolicy::RejectOverlaps {
                ensure_free(tx.as_mut(), candidate).await?;
            }
            tx.create(APPOINTMENTS, &candidate.id, encode(candidate)?);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;

        info!(
            negocio_id = %appointment.negocio_id,
            appointment_id = %appointment.id,
            profissional_id = %appointment.profissional_id,
            start = %appointment.start,
            "appointment booked"
        );
        self.publish(AppointmentEvent::Booked {
            appointment: (&appointment).into(),
            actor: command.actor,
        })
        .await;
        Ok(appointment)
    }
}

impl CommandHandler<CancelAppointment> for AppointmentsHandler {
    type Output = Appointment;

    async fn handle(&self, command: CancelAppointment) -> Result<Appointment, CoreError> {
        let cmd = &command;
        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let appointment = self
            .modify("cancel_appointment", &cmd.negocio_id, &cmd.appointment_id, |a| {
                let allowed = cmd.actor_is_admin
                    || a.cliente_id == cmd.actor
                    || a.profissional_id == cmd.actor;
                if !allowed {
                    return Err(CoreError::Unauthorized(
                        "only the client, the professional or an admin may cancel".into(),
                    ));
                }
                a.cancel(reason.clone(), &cmd.actor);
                Ok(())
            })
            .await?;

        info!(
            negocio_id = %appointment.negocio_id,
            appointment_id = %appointment.id,
            actor = %command.actor,
            "appointment canceled"
        );
        self.publish(AppointmentEvent::Canceled {
            appointment: (&appointment).into(),
            actor: command.actor,
            reason: appointment.cancellation_reason.clone(),
        })
        .await;
        Ok(appointment)
    }
}

impl CommandHandler<ConfirmAppointment> for AppointmentsHandler {
    type Output = Appointment;

    async fn handle(&self, command: ConfirmAppointment) -> Result<Appointment, CoreError> {
        let cmd = &command;
        let appointment = self
            .modify("confirm_appointment", &cmd.negocio_id, &cmd.appointment_id, |a| {
                if !cmd.actor_is_admin && a.profissional_id != cmd.actor {
                    return Err(CoreError::Unauthorized(
                        "only the professional or an admin may confirm".into(),
                    ));
                }
                a.confirm()
            })
            .await?;

        info!(
            negocio_id = %appointment.negocio_id,
            appointment_id = %appointment.id,
            "appointment confirmed"
        );
        self.publish(AppointmentEvent::Confirmed {
            appointment: (&appointment).into(),
            actor: command.actor,
        })
        .await;
        Ok(appointment)
    }
}

#[derive(Deserialize, Debug)]
pub struct BookAppointmentDto {
    profissional_id: String,
    cliente_id: Option<String>,
    service: Option<String>,
    #[serde(with = "wall_clock")]
    start: NaiveDateTime,
    #[serde(alias = "duration")]
    duration_minutes: u32,
    notes: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CancelAppointmentDto {
    reason: Option<String>,
}

fn handler(state: &AppState) -> AppointmentsHandler {
    AppointmentsHandler::new(
        state.store.clone(),
        state.event_bus.clone(),
        state.booking_policy,
    )
}

// --- Axum Route Handlers ---

pub async fn handle_book_appointment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path(negocio_id): Path<String>,
    Json(payload): Json<BookAppointmentDto>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    let appointment = handler(&state)
        .handle(BookAppointment {
            actor: ctx.uid,
            actor_is_staff: access.is_staff(),
            negocio_id,
            profissional_id: payload.profissional_id,
            cliente_id: payload.cliente_id,
            service: payload.service,
            start: payload.start,
            duration_minutes: payload.duration_minutes,
            notes: payload.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn handle_cancel_appointment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, appointment_id)): Path<(String, String)>,
    payload: Option<Json<CancelAppointmentDto>>,
) -> ApiResult<Json<Appointment>> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    let Json(payload) = payload.unwrap_or_default();
    let appointment = handler(&state)
        .handle(CancelAppointment {
            actor: ctx.uid,
            actor_is_admin: access.is_admin(),
            negocio_id,
            appointment_id,
            reason: payload.reason,
        })
        .await?;
    Ok(Json(appointment))
}

pub async fn handle_confirm_appointment_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, appointment_id)): Path<(String, String)>,
) -> ApiResult<Json<Appointment>> {
    let access = require(&ctx, &negocio_id, Requirement::Member)?;
    let appointment = handler(&state)
        .handle(ConfirmAppointment {
            actor: ctx.uid,
            actor_is_admin: access.is_admin(),
            negocio_id,
            appointment_id,
        })
        .await?;
    Ok(Json(appointment))
}
