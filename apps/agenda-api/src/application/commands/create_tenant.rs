use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{Extension, Json, extract::State, http::StatusCode};
use core_lib::domain::audit::{AUDIT_LOG, AuditEntry};
use core_lib::domain::role::PLATFORM_TENANT;
use core_lib::domain::tenant::{TENANTS, Tenant, TenantView};
use core_lib::{Command, CommandHandler, CoreError, DocumentStore, document::encode, run_in_transaction};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub owner_id: String,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Command for CreateTenant {}

pub struct CreateTenantHandler {
    store: Arc<dyn DocumentStore>,
}

impl CreateTenantHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl CommandHandler<CreateTenant> for CreateTenantHandler {
    type Output = Tenant;

    async fn handle(&self, command: CreateTenant) -> Result<Tenant, CoreError> {
        let tenant = Tenant::new(&command.name, &command.owner_id, command.settings)?;
        let entry = AuditEntry::tenant_created(&command.owner_id, &tenant.id, &tenant.name);

        let tenant_ref = &tenant;
        let entry_ref = &entry;
        run_in_transaction(self.store.as_ref(), "create_tenant", |mut tx| async move {
            tx.create(TENANTS, &tenant_ref.id, encode(tenant_ref)?);
            tx.create(AUDIT_LOG, &entry_ref.id, encode(entry_ref)?);
            Ok::<_, CoreError>((tx, ()))
        })
        .await?;

        info!(negocio_id = %tenant.id, owner = %command.owner_id, "tenant created");
        Ok(tenant)
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateTenantDto {
    name: String,
    #[serde(default)]
    settings: serde_json::Map<String, serde_json::Value>,
}

// --- Axum Route Handler ---

pub async fn handle_create_tenant_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateTenantDto>,
) -> ApiResult<(StatusCode, Json<TenantView>)> {
    require(&ctx, PLATFORM_TENANT, Requirement::SuperAdmin)?;

    let handler = CreateTenantHandler::new(state.store.clone());
    let tenant = handler
        .handle(CreateTenant {
            name: payload.name,
            owner_id: ctx.uid,
            settings: payload.settings,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tenant.view(true))))
}
