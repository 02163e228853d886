use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::commands::change_role::sync_professional_profile;
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use core_lib::domain::audit::{AUDIT_LOG, AuditEntry};
use core_lib::domain::role::UserStatus;
use core_lib::domain::user::{USERS, UserRecord};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, document::encode, run_in_transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SetStatus {
    pub actor: String,
    pub negocio_id: String,
    pub target: String,
    pub status: UserStatus,
}

impl Command for SetStatus {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub uid: String,
    pub negocio_id: String,
    pub old_status: UserStatus,
    pub new_status: UserStatus,
}

pub struct SetStatusHandler {
    store: Arc<dyn DocumentStore>,
}

impl SetStatusHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl CommandHandler<SetStatus> for SetStatusHandler {
    type Output = StatusChange;

    async fn handle(&self, command: SetStatus) -> Result<StatusChange, CoreError> {
        if command.actor == command.target {
            return Err(CoreError::InvalidOperation(
                "admins cannot change their own status".into(),
            ));
        }
        let cmd = &command;
        let change = run_in_transaction(self.store.as_ref(), "set_status", |mut tx| async move {
            let mut record = fetch::<UserRecord>(tx.as_mut(), USERS, &cmd.target)
                .await?
                .ok_or_else(|| CoreError::NotFound("user".into()))?;
            let role = record
                .role_in(&cmd.negocio_id)
                .ok_or_else(|| CoreError::NotFound("user in this tenant".into()))?;
            let old_status = record.status_in(&cmd.negocio_id);
            let change = StatusChange {
                uid: cmd.target.clone(),
                negocio_id: cmd.negocio_id.clone(),
                old_status,
                new_status: cmd.status,
            };
            if old_status == cmd.status {
                return Ok((tx, change));
            }

            record
                .status_per_tenant
                .insert(cmd.negocio_id.clone(), cmd.status);
            record.touch();
            tx.set(USERS, &cmd.target, encode(&record)?);

            sync_professional_profile(tx.as_mut(), &cmd.negocio_id, &cmd.target, role, cmd.status)
                .await?;

            let entry = AuditEntry::status_changed(
                &cmd.actor,
                &cmd.negocio_id,
                &cmd.target,
                old_status,
                cmd.status,
            );
            tx.create(AUDIT_LOG, &entry.id, encode(&entry)?);
            Ok::<_, CoreError>((tx, change))
        })
        .await?;

        if change.old_status != change.new_status {
            info!(
                negocio_id = %change.negocio_id,
                target = %change.uid,
                actor = %command.actor,
                status = change.new_status.as_str(),
                "user status changed"
            );
        }
        Ok(change)
    }
}

#[derive(Deserialize, Debug)]
pub struct SetStatusDto {
    status: UserStatus,
}

// --- Axum Route Handler ---

pub async fn handle_set_status_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, uid)): Path<(String, String)>,
    Json(payload): Json<SetStatusDto>,
) -> ApiResult<Json<StatusChange>> {
    require(&ctx, &negocio_id, Requirement::Admin)?;

    let handler = SetStatusHandler::new(state.store.clone());
    let change = handler
        .handle(SetStatus {
            actor: ctx.uid,
            negocio_id,
            target: uid,
            status: payload.status,
        })
        .await?;
    Ok(Json(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::adapters::in_memory_store::InMemoryDocumentStore;
    use core_lib::crypto::{EncryptionKey, FieldCipher};
    use core_lib::domain::professional::{PROFESSIONALS, ProfessionalProfile, profile_id};
    use core_lib::domain::role::Role;

    async fn seed(store: &InMemoryDocumentStore, role: Role) {
        let cipher = FieldCipher::new(&EncryptionKey::generate()).unwrap();
        let mut record = UserRecord::new("u1", "Nome", "x@y.z", None, &cipher).unwrap();
        record.grant("n1", role);
        store.set(USERS, "u1", encode(&record).unwrap()).await.unwrap();
        if role.requires_professional_profile() {
            let profile = ProfessionalProfile::new("n1", "u1");
            store
                .set(PROFESSIONALS, &profile.id, encode(&profile).unwrap())
                .await
                .unwrap();
        }
    }

    fn set(status: UserStatus) -> SetStatus {
        SetStatus {
            actor: "admin".into(),
            negocio_id: "n1".into(),
            target: "u1".into(),
            status,
        }
    }

    async fn profile_active(store: &InMemoryDocumentStore) -> bool {
        let profile: ProfessionalProfile = store
            .get(PROFESSIONALS, &profile_id("n1", "u1"))
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        profile.active
    }

    #[tokio::test]
    async fn deactivation_cascades_to_profile_and_back() {
        let store = Arc::new(InMemoryDocumentStore::default());
        seed(&store, Role::Professional).await;
        let handler = SetStatusHandler::new(store.clone());

        let change = handler.handle(set(UserStatus::Inactive)).await.unwrap();
        assert_eq!(change.old_status, UserStatus::Active);
        assert!(!profile_active(&store).await);

        handler.handle(set(UserStatus::Active)).await.unwrap();
        assert!(profile_active(&store).await);
    }

    #[tokio::test]
    async fn reactivating_a_client_creates_no_profile() {
        let store = Arc::new(InMemoryDocumentStore::default());
        seed(&store, Role::Client).await;
        let handler = SetStatusHandler::new(store.clone());

        handler.handle(set(UserStatus::Inactive)).await.unwrap();
        handler.handle(set(UserStatus::Active)).await.unwrap();
        assert!(store
            .get(PROFESSIONALS, &profile_id("n1", "u1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn non_member_is_not_found() {
        let store = Arc::new(InMemoryDocumentStore::default());
        seed(&store, Role::Client).await;
        let handler = SetStatusHandler::new(store.clone());
        let mut cmd = set(UserStatus::Inactive);
        cmd.negocio_id = "n2".into();
        assert!(matches!(handler.handle(cmd).await, Err(CoreError::NotFound(_))));
    }
}
