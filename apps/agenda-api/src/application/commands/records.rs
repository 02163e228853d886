use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use core_lib::domain::clinical::{ClinicalRecord, RecordKind};
use core_lib::domain::user::{USERS, UserRecord};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, document::encode, run_in_transaction,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreateRecord {
    pub actor: String,
    pub negocio_id: String,
    pub paciente_id: String,
    pub kind: RecordKind,
    pub consulta_id: Option<String>,
    pub content: Value,
}

#[derive(Debug, Clone)]
pub struct UpdateRecord {
    pub actor: String,
    pub actor_is_admin: bool,
    pub negocio_id: String,
    pub paciente_id: String,
    pub kind: RecordKind,
    pub record_id: String,
    pub content: Value,
}

#[derive(Debug, Clone)]
pub struct DeleteRecord {
    pub actor: String,
    pub actor_is_admin: bool,
    pub negocio_id: String,
    pub paciente_id: String,
    pub kind: RecordKind,
    pub record_id: String,
}

impl Command for CreateRecord {}
impl Command for UpdateRecord {}
impl Command for DeleteRecord {}

pub struct RecordsHandler {
    store: Arc<dyn DocumentStore>,
}

impl RecordsHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

/// The record must belong to the tenant and patient named in the path.
fn owned_by(record: &ClinicalRecord, negocio_id: &str, paciente_id: &str) -> bool {
    record.negocio_id == negocio_id && record.paciente_id == paciente_id
}

fn ensure_author_or_admin(
    record: &ClinicalRecord,
    actor: &str,
    actor_is_admin: bool,
) -> Result<(), CoreError> {
    if actor_is_admin || record.author_id == actor {
        Ok(())
    } else {
        Err(CoreError::Unauthorized(
            "only the author or an admin may change this record".into(),
        ))
    }
}

impl CommandHandler<CreateRecord> for RecordsHandler {
    type Output = ClinicalRecord;

    async fn handle(&self, command: CreateRecord) -> Result<ClinicalRecord, CoreError> {
        let consulta_id = command.consulta_id.filter(|c| !c.trim().is_empty());
        let record = ClinicalRecord::new(
            command.kind,
            &command.negocio_id,
            &command.paciente_id,
            &command.actor,
            consulta_id,
            command.content,
        )?;

        let rec = &record;
        run_in_transaction(self.store.as_ref(), "create_record", |mut tx| async move {
            let is_patient = fetch::<UserRecord>(tx.as_mut(), USERS, &rec.paciente_id)
                .await?
                .is_some_and(|u| u.role_in(&rec.negocio_id).is_some());
            if !is_patient {
                return Err(CoreError::NotFound("patient".into()));
            }
            if let Some(consulta_id) = &rec.consulta_id {
                let parent = fetch::<ClinicalRecord>(
                    tx.as_mut(),
                    RecordKind::Consultas.collection(),
                    consulta_id,
                )
                .await?;
                if !parent.is_some_and(|p| owned_by(&p, &rec.negocio_id, &rec.paciente_id)) {
                    return Err(CoreError::NotFound("consultation".into()));
                }
            }
            tx.create(rec.kind.collection(), &rec.id, encode(rec)?);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;

        info!(
            negocio_id = %record.negocio_id,
            kind = %record.kind,
            record_id = %record.id,
            author = %record.author_id,
            "clinical record created"
        );
        Ok(record)
    }
}

impl CommandHandler<UpdateRecord> for RecordsHandler {
    type Output = ClinicalRecord;

    async fn handle(&self, command: UpdateRecord) -> Result<ClinicalRecord, CoreError> {
        let cmd = &command;
        let collection = cmd.kind.collection();
        let record = run_in_transaction(self.store.as_ref(), "update_record", |mut tx| async move {
            let mut record = fetch::<ClinicalRecord>(tx.as_mut(), collection, &cmd.record_id)
                .await?
                .filter(|r| owned_by(r, &cmd.negocio_id, &cmd.paciente_id))
                .ok_or_else(|| CoreError::NotFound("record".into()))?;
            ensure_author_or_admin(&record, &cmd.actor, cmd.actor_is_admin)?;
            record.replace_content(cmd.content.clone())?;
            tx.set(collection, &record.id, encode(&record)?);
            Ok::<_, CoreError>((tx, record))
        })
        .await?;
        info!(kind = %record.kind, record_id = %record.id, actor = %command.actor, "clinical record updated");
        Ok(record)
    }
}

impl CommandHandler<DeleteRecord> for RecordsHandler {
    type Output = ();

    async fn handle(&self, command: DeleteRecord) -> Result<(), CoreError> {
        let cmd = &command;
        let collection = cmd.kind.collection();
        run_in_transaction(self.store.as_ref(), "delete_record", |mut tx| async move {
            let record = fetch::<ClinicalRecord>(tx.as_mut(), collection, &cmd.record_id)
                .await?
                .filter(|r| owned_by(r, &cmd.negocio_id, &cmd.paciente_id))
                .ok_or_else(|| CoreError::NotFound("record".into()))?;
            ensure_author_or_admin(&record, &cmd.actor, cmd.actor_is_admin)?;
            tx.delete(collection, &record.id);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;
        info!(kind = %command.kind, record_id = %command.record_id, actor = %command.actor, "clinical record deleted");
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateRecordDto {
    consulta_id: Option<String>,
    content: Value,
}

#[derive(Deserialize, Debug)]
pub struct UpdateRecordDto {
    content: Value,
}

// --- Axum Route Handlers ---

pub async fn handle_create_record_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, paciente_id, kind)): Path<(String, String, String)>,
    Json(payload): Json<CreateRecordDto>,
) -> ApiResult<(StatusCode, Json<ClinicalRecord>)> {
    require(&ctx, &negocio_id, Requirement::Staff)?;
    let kind: RecordKind = kind.parse()?;
    let record = RecordsHandler::new(state.store.clone())
        .handle(CreateRecord {
            actor: ctx.uid,
            negocio_id,
            paciente_id,
            kind,
            consulta_id: payload.consulta_id,
            content: payload.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn handle_update_record_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, paciente_id, kind, record_id)): Path<(String, String, String, String)>,
    Json(payload): Json<UpdateRecordDto>,
) -> ApiResult<Json<ClinicalRecord>> {
    let access = require(&ctx, &negocio_id, Requirement::Staff)?;
    let kind: RecordKind = kind.parse()?;
    let record = RecordsHandler::new(state.store.clone())
        .handle(UpdateRecord {
            actor: ctx.uid,
            actor_is_admin: access.is_admin(),
            negocio_id,
            paciente_id,
            kind,
            record_id,
            content: payload.content,
        })
        .await?;
    Ok(Json(record))
}

pub async fn handle_delete_record_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, paciente_id, kind, record_id)): Path<(String, String, String, String)>,
) -> ApiResult<StatusCode> {
    let access = require(&ctx, &negocio_id, Requirement::Staff)?;
    let kind: RecordKind = kind.parse()?;
    RecordsHandler::new(state.store.clone())
        .handle(DeleteRecord {
            actor: ctx.uid,
            actor_is_admin: access.is_admin(),
            negocio_id,
            paciente_id,
            kind,
            record_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
