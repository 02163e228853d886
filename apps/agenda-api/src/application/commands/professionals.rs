use crate::AppState;
use crate::application::authz::require_self_or_admin;
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDateTime;
use core_lib::domain::professional::{
    BLOCKING_PERIODS, BlockingPeriod, PROFESSIONALS, ProfessionalProfile, WorkingWindow,
    profile_id, validate_windows,
};
use core_lib::domain::timestamp::{self, wall_clock};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, Transaction, document::encode,
    run_in_transaction,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

const MAX_SPECIALTIES: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct UpdateProfessional {
    pub negocio_id: String,
    pub usuario_id: String,
    pub specialties: Option<Vec<String>>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetWorkingHours {
    pub negocio_id: String,
    pub usuario_id: String,
    pub windows: Vec<WorkingWindow>,
}

#[derive(Debug, Clone)]
pub struct AddBlockingPeriod {
    pub negocio_id: String,
    pub usuario_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: Option<String>,
    pub actor: String,
}

#[derive(Debug, Clone)]
pub struct RemoveBlockingPeriod {
    pub negocio_id: String,
    pub usuario_id: String,
    pub block_id: String,
}

impl Command for UpdateProfessional {}
impl Command for SetWorkingHours {}
impl Command for AddBlockingPeriod {}
impl Command for RemoveBlockingPeriod {}

pub struct ProfessionalsHandler {
    store: Arc<dyn DocumentStore>,
}

impl ProfessionalsHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Read-modify-write of one profile inside a transaction.
    async fn modify<F>(
        &self,
        operation: &str,
        negocio_id: &str,
        usuario_id: &str,
        apply: F,
    ) -> Result<ProfessionalProfile, CoreError>
    where
        F: Fn(&mut ProfessionalProfile) + Send + Sync,
    {
        let apply = &apply;
        let pid = profile_id(negocio_id, usuario_id);
        let pid = pid.as_str();
        run_in_transaction(self.store.as_ref(), operation, |mut tx| async move {
            let mut profile = existing_profile(tx.as_mut(), pid).await?;
            apply(&mut profile);
            profile.updated_at = timestamp::now();
            tx.set(PROFESSIONALS, pid, encode(&profile)?);
            Ok::<_, CoreError>((tx, profile))
        })
        .await
    }
}

async fn existing_profile(
    tx: &mut dyn Transaction,
    pid: &str,
) -> Result<ProfessionalProfile, CoreError> {
    fetch(tx, PROFESSIONALS, pid)
        .await?
        .ok_or_else(|| CoreError::NotFound("professional".into()))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CommandHandler<UpdateProfessional> for ProfessionalsHandler {
    type Output = ProfessionalProfile;

    async fn handle(&self, command: UpdateProfessional) -> Result<ProfessionalProfile, CoreError> {
        let specialties = command.specialties.map(|list| {
            // First occurrence wins.
            let mut seen = HashSet::new();
            list.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && seen.insert(s.clone()))
                .collect::<Vec<String>>()
        });
        if specialties.as_ref().is_some_and(|s| s.len() > MAX_SPECIALTIES) {
            return Err(CoreError::Validation(format!(
                "at most {} specialties",
                MAX_SPECIALTIES
            )));
        }
        let bio = command.bio.map(|b| clean(Some(b)));
        let photo_url = command.photo_url.map(|u| clean(Some(u)));

        self.modify(
            "update_professional",
            &command.negocio_id,
            &command.usuario_id,
            |profile| {
                if let Some(specialties) = &specialties {
                    profile.specialties = specialties.clone();
                }
                if let Some(bio) = &bio {
                    profile.bio = bio.clone();
                }
                if let Some(photo_url) = &photo_url {
                    profile.photo_url = photo_url.clone();
                }
            },
        )
        .await
    }
}

impl CommandHandler<SetWorkingHours> for ProfessionalsHandler {
    type Output = ProfessionalProfile;

    async fn handle(&self, command: SetWorkingHours) -> Result<ProfessionalProfile, CoreError> {
        validate_windows(&command.windows)?;
        let windows = &command.windows;
        let profile = self
            .modify(
                "set_working_hours",
                &command.negocio_id,
                &command.usuario_id,
                |profile| profile.working_hours = windows.clone(),
            )
            .await?;
        info!(
            negocio_id = %command.negocio_id,
            profissional_id = %command.usuario_id,
            windows = profile.working_hours.len(),
            "working hours replaced"
        );
        Ok(profile)
    }
}

impl CommandHandler<AddBlockingPeriod> for ProfessionalsHandler {
    type Output = BlockingPeriod;

    async fn handle(&self, command: AddBlockingPeriod) -> Result<BlockingPeriod, CoreError> {
        let block = BlockingPeriod::new(
            &command.negocio_id,
            &command.usuario_id,
            command.start,
            command.end,
            clean(command.reason.clone()),
            &command.actor,
        )?;
        let pid = profile_id(&command.negocio_id, &command.usuario_id);
        let (pid, block_ref) = (pid.as_str(), &block);
        run_in_transaction(self.store.as_ref(), "add_blocking_period", |mut tx| async move {
            existing_profile(tx.as_mut(), pid).await?;
            tx.create(BLOCKING_PERIODS, &block_ref.id, encode(block_ref)?);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;
        info!(
            negocio_id = %block.negocio_id,
            profissional_id = %block.profissional_id,
            block_id = %block.id,
            "blocking period added"
        );
        Ok(block)
    }
}

impl CommandHandler<RemoveBlockingPeriod> for ProfessionalsHandler {
    type Output = ();

    async fn handle(&self, command: RemoveBlockingPeriod) -> Result<(), CoreError> {
        let cmd = &command;
        run_in_transaction(self.store.as_ref(), "remove_blocking_period", |mut tx| async move {
            let block = fetch::<BlockingPeriod>(tx.as_mut(), BLOCKING_PERIODS, &cmd.block_id)
                .await?
                .filter(|b| b.negocio_id == cmd.negocio_id && b.profissional_id == cmd.usuario_id)
                .ok_or_else(|| CoreError::NotFound("blocking period".into()))?;
            tx.delete(BLOCKING_PERIODS, &block.id);
            Ok::<_, CoreError>((tx, ()))
        })
        .await
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateProfessionalDto {
    specialties: Option<Vec<String>>,
    bio: Option<String>,
    photo_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct WorkingHoursDto {
    windows: Vec<WorkingWindow>,
}

#[derive(Deserialize, Debug)]
pub struct BlockingPeriodDto {
    #[serde(with = "wall_clock")]
    start: NaiveDateTime,
    #[serde(with = "wall_clock")]
    end: NaiveDateTime,
    reason: Option<String>,
}

// --- Axum Route Handlers ---

pub async fn handle_update_professional_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid)): Path<(String, String)>,
    Json(payload): Json<UpdateProfessionalDto>,
) -> ApiResult<Json<ProfessionalProfile>> {
    require_self_or_admin(&ctx, &negocio_id, &pid)?;
    let handler = ProfessionalsHandler::new(state.store.clone());
    let profile = handler
        .handle(UpdateProfessional {
            negocio_id,
            usuario_id: pid,
            specialties: payload.specialties,
            bio: payload.bio,
            photo_url: payload.photo_url,
        })
        .await?;
    Ok(Json(profile))
}

pub async fn handle_set_working_hours_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid)): Path<(String, String)>,
    Json(payload): Json<WorkingHoursDto>,
) -> ApiResult<Json<ProfessionalProfile>> {
    require_self_or_admin(&ctx, &negocio_id, &pid)?;
    let handler = ProfessionalsHandler::new(state.store.clone());
    let profile = handler
        .handle(SetWorkingHours {
            negocio_id,
            usuario_id: pid,
            windows: payload.windows,
        })
        .await?;
    Ok(Json(profile))
}

pub async fn handle_add_blocking_period_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid)): Path<(String, String)>,
    Json(payload): Json<BlockingPeriodDto>,
) -> ApiResult<(StatusCode, Json<BlockingPeriod>)> {
    require_self_or_admin(&ctx, &negocio_id, &pid)?;
    let handler = ProfessionalsHandler::new(state.store.clone());
    let block = handler
        .handle(AddBlockingPeriod {
            negocio_id,
            usuario_id: pid,
            start: payload.start,
            end: payload.end,
            reason: payload.reason,
            actor: ctx.uid,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn handle_remove_blocking_period_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, pid, block_id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    require_self_or_admin(&ctx, &negocio_id, &pid)?;
    let handler = ProfessionalsHandler::new(state.store.clone());
    handler
        .handle(RemoveBlockingPeriod {
            negocio_id,
            usuario_id: pid,
            block_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
