use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use core_lib::domain::audit::{AUDIT_LOG, AuditEntry};
use core_lib::domain::professional::{
    PROFESSIONALS, profile_id, reconcile_profile, set_profile_active,
};
use core_lib::domain::role::{Role, UserStatus};
use core_lib::domain::tenant::{TENANTS, Tenant};
use core_lib::domain::user::{USERS, UserRecord};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, Transaction, document::encode,
    run_in_transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ChangeRole {
    pub actor: String,
    pub negocio_id: String,
    pub target: String,
    pub new_role: Role,
}

impl Command for ChangeRole {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleChange {
    pub uid: String,
    pub negocio_id: String,
    pub old_role: Role,
    pub new_role: Role,
}

pub struct ChangeRoleHandler {
    store: Arc<dyn DocumentStore>,
}

impl ChangeRoleHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

/// Bring the (tenant, user) professional profile in line with a status
/// change: only active professionals and admins keep an active one.
pub(crate) async fn sync_professional_profile(
    tx: &mut dyn Transaction,
    negocio_id: &str,
    usuario_id: &str,
    role: Role,
    status: UserStatus,
) -> Result<(), CoreError> {
    let pid = profile_id(negocio_id, usuario_id);
    let current = fetch(tx, PROFESSIONALS, &pid).await?;
    let wanted = role.requires_professional_profile() && status == UserStatus::Active;
    if let Some(profile) = set_profile_active(current, negocio_id, usuario_id, wanted) {
        tx.set(PROFESSIONALS, &pid, encode(&profile)?);
    }
    Ok(())
}

impl CommandHandler<ChangeRole> for ChangeRoleHandler {
    type Output = RoleChange;

    async fn handle(&self, command: ChangeRole) -> Result<RoleChange, CoreError> {
        if command.new_role == Role::SuperAdmin {
            return Err(CoreError::Validation(
                "super_admin cannot be assigned within a tenant".into(),
            ));
        }
        if command.actor == command.target {
            return Err(CoreError::InvalidOperation(
                "admins cannot change their own role".into(),
            ));
        }

        let cmd = &command;
        let change = run_in_transaction(self.store.as_ref(), "change_role", |mut tx| async move {
            let mut record = fetch::<UserRecord>(tx.as_mut(), USERS, &cmd.target)
                .await?
                .ok_or_else(|| CoreError::NotFound("user".into()))?;
            let old_role = record
                .role_in(&cmd.negocio_id)
                .ok_or_else(|| CoreError::NotFound("user in this tenant".into()))?;
            let change = RoleChange {
                uid: cmd.target.clone(),
                negocio_id: cmd.negocio_id.clone(),
                old_role,
                new_role: cmd.new_role,
            };
            if old_role == cmd.new_role {
                return Ok((tx, change));
            }

            record.roles.insert(cmd.negocio_id.clone(), cmd.new_role);
            record.touch();
            tx.set(USERS, &cmd.target, encode(&record)?);

            // The role alone decides the profile here; status changes are
            // applied by set_status.
            let pid = profile_id(&cmd.negocio_id, &cmd.target);
            let current = fetch(tx.as_mut(), PROFESSIONALS, &pid).await?;
            if let Some(profile) =
                reconcile_profile(current, &cmd.negocio_id, &cmd.target, cmd.new_role)
            {
                tx.set(PROFESSIONALS, &pid, encode(&profile)?);
            }

            if cmd.new_role == Role::Admin {
                let mut tenant = fetch::<Tenant>(tx.as_mut(), TENANTS, &cmd.negocio_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("tenant".into()))?;
                if !tenant.has_admin() {
                    tenant.admin_uid = Some(cmd.target.clone());
                    tx.set(TENANTS, &cmd.negocio_id, encode(&tenant)?);
                }
            }

            let entry = AuditEntry::role_changed(
                &cmd.actor,
                &cmd.negocio_id,
                &cmd.target,
                old_role,
                cmd.new_role,
            );
            tx.create(AUDIT_LOG, &entry.id, encode(&entry)?);
            Ok::<_, CoreError>((tx, change))
        })
        .await?;

        if change.old_role != change.new_role {
            info!(
                negocio_id = %change.negocio_id,
                target = %change.uid,
                actor = %command.actor,
                from = %change.old_role,
                to = %change.new_role,
                "role changed"
            );
        }
        Ok(change)
    }
}

#[derive(Deserialize, Debug)]
pub struct ChangeRoleDto {
    role: String,
}

// --- Axum Route Handler ---

pub async fn handle_change_role_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, uid)): Path<(String, String)>,
    Json(payload): Json<ChangeRoleDto>,
) -> ApiResult<Json<RoleChange>> {
    require(&ctx, &negocio_id, Requirement::Admin)?;
    let new_role = Role::parse_assignable(&payload.role)?;

    let handler = ChangeRoleHandler::new(state.store.clone());
    let change = handler
        .handle(ChangeRole {
            actor: ctx.uid,
            negocio_id,
            target: uid,
            new_role,
        })
        .await?;
    Ok(Json(change))
}
