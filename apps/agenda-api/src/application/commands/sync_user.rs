use crate::AppState;
use crate::application::middleware::AuthenticatedUser;
use crate::application::{fetch, query_is_empty};
use crate::error::ApiResult;
use axum::{Extension, Json, extract::State};
use core_lib::domain::audit::{AUDIT_LOG, AuditEntry};
use core_lib::domain::professional::{PROFESSIONALS, profile_id, reconcile_profile};
use core_lib::domain::role::{PLATFORM_TENANT, Role};
use core_lib::domain::tenant::{TENANTS, Tenant};
use core_lib::domain::user::{USERS, UserProfile, UserRecord};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, crypto::FieldCipher, document::encode,
    run_in_transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Reconcile an identity-provider subject with its stored profile.
#[derive(Debug, Clone)]
pub struct SyncUser {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub negocio_id: Option<String>,
    pub invite_code: Option<String>,
}

impl Command for SyncUser {}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub profile: UserProfile,
    pub negocio_id: String,
    pub role: Role,
    pub created: bool,
}

pub struct SyncUserHandler {
    store: Arc<dyn DocumentStore>,
    cipher: Arc<FieldCipher>,
}

impl SyncUserHandler {
    pub fn new(store: Arc<dyn DocumentStore>, cipher: Arc<FieldCipher>) -> Self {
        Self { store, cipher }
    }

    // No tenant: only the very first user of the platform may register,
    // and becomes super-admin.
    async fn bootstrap(&self, command: &SyncUser) -> Result<SyncOutcome, CoreError> {
        let cipher = self.cipher.as_ref();
        let (record, created) =
            run_in_transaction(self.store.as_ref(), "bootstrap_super_admin", |mut tx| async move {
                if let Some(existing) = fetch::<UserRecord>(tx.as_mut(), USERS, &command.uid).await? {
                    if existing.role_in(PLATFORM_TENANT) == Some(Role::SuperAdmin) {
                        return Ok((tx, (existing, false)));
                    }
                    return Err(CoreError::InvalidOperation(
                        "cannot register without a tenant".into(),
                    ));
                }
                if !query_is_empty(tx.as_mut(), USERS).await? {
                    return Err(CoreError::InvalidOperation(
                        "cannot register without a tenant".into(),
                    ));
                }
                require_identity(command)?;
                let mut record = UserRecord::new(
                    &command.uid,
                    &command.name,
                    &command.email,
                    command.phone.as_deref(),
                    cipher,
                )?;
                record.grant(PLATFORM_TENANT, Role::SuperAdmin);
                tx.set(USERS, &command.uid, encode(&record)?);
                Ok::<_, CoreError>((tx, (record, true)))
            })
            .await?;

        if created {
            info!(uid = %command.uid, "platform super-admin bootstrapped");
        }
        Ok(SyncOutcome {
            profile: record.to_profile(cipher),
            negocio_id: PLATFORM_TENANT.to_string(),
            role: Role::SuperAdmin,
            created,
        })
    }

    async fn join_tenant(&self, command: &SyncUser, negocio_id: &str) -> Result<SyncOutcome, CoreError> {
        let cipher = self.cipher.as_ref();
        let (record, role, created) =
            run_in_transaction(self.store.as_ref(), "sync_user", |mut tx| async move {
                let mut tenant = fetch::<Tenant>(tx.as_mut(), TENANTS, negocio_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("tenant".into()))?;
                let existing = fetch::<UserRecord>(tx.as_mut(), USERS, &command.uid).await?;

                if let Some(record) = &existing {
                    if let Some(role) = record.role_in(negocio_id) {
                        return Ok((tx, (record.clone(), role, false)));
                    }
                }

                let role = tenant.role_for_newcomer(command.invite_code.as_deref());
                let created = existing.is_none();
                let mut record = match existing {
                    Some(record) => record,
                    None => {
                        require_identity(command)?;
                        UserRecord::new(
                            &command.uid,
                            &command.name,
                            &command.email,
                            command.phone.as_deref(),
                            cipher,
                        )?
                    }
                };
                record.grant(negocio_id, role);
                tx.set(USERS, &command.uid, encode(&record)?);

                if role == Role::Admin {
                    tenant.admin_uid = Some(command.uid.clone());
                    tx.set(TENANTS, negocio_id, encode(&tenant)?);

                    let pid = profile_id(negocio_id, &command.uid);
                    let current = fetch(tx.as_mut(), PROFESSIONALS, &pid).await?;
                    if let Some(profile) = reconcile_profile(current, negocio_id, &command.uid, role) {
                        tx.set(PROFESSIONALS, &pid, encode(&profile)?);
                    }

                    let entry = AuditEntry::admin_granted(&command.uid, negocio_id);
                    tx.create(AUDIT_LOG, &entry.id, encode(&entry)?);
                }
                Ok::<_, CoreError>((tx, (record, role, created)))
            })
            .await?;

        if created || role == Role::Admin {
            info!(uid = %command.uid, negocio_id, %role, created, "user joined tenant");
        }
        Ok(SyncOutcome {
            profile: record.to_profile(cipher),
            negocio_id: negocio_id.to_string(),
            role,
            created,
        })
    }
}

// Only a new record needs these; returning members keep what is stored.
fn require_identity(command: &SyncUser) -> Result<(), CoreError> {
    if command.email.trim().is_empty() {
        return Err(CoreError::Validation("email is required".into()));
    }
    if command.name.trim().is_empty() {
        return Err(CoreError::Validation("name is required".into()));
    }
    Ok(())
}

impl CommandHandler<SyncUser> for SyncUserHandler {
    type Output = SyncOutcome;

    async fn handle(&self, command: SyncUser) -> Result<SyncOutcome, CoreError> {
        match command.negocio_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => self.join_tenant(&command, id).await,
            _ => self.bootstrap(&command).await,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SyncUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub negocio_id: Option<String>,
    pub invite_code: Option<String>,
}

// --- Axum Route Handler ---

pub async fn handle_sync_user_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<SyncUserRequest>,
) -> ApiResult<Json<SyncOutcome>> {
    // Body values win over token claims.
    let command = SyncUser {
        uid: ctx.uid,
        name: payload.name.or(ctx.name).unwrap_or_default(),
        email: payload.email.or(ctx.email).unwrap_or_default(),
        phone: payload.phone.or(ctx.phone_number),
        negocio_id: payload.negocio_id,
        invite_code: payload.invite_code,
    };
    let handler = SyncUserHandler::new(state.store.clone(), state.cipher.clone());
    Ok(Json(handler.handle(command).await?))
}
