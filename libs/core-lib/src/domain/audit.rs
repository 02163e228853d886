use super::role::{Role, UserStatus};
use super::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const AUDIT_LOG: &str = "auditoria";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TenantCreated,
    AdminGranted,
    RoleChanged,
    StatusChanged,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    /// Acting user.
    pub usuario_id: String,
    pub negocio_id: String,
    pub detalhes: Value,
    #[serde(with = "timestamp")]
    pub timestamp: Timestamp,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: &str, negocio_id: &str, detalhes: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            usuario_id: actor.to_string(),
            negocio_id: negocio_id.to_string(),
            detalhes,
            timestamp: timestamp::now(),
        }
    }

    pub fn role_changed(
        actor: &str,
        negocio_id: &str,
        target: &str,
        old_role: Role,
        new_role: Role,
    ) -> Self {
        Self::new(
            AuditAction::RoleChanged,
            actor,
            negocio_id,
            json!({ "target_uid": target, "old_role": old_role, "new_role": new_role }),
        )
    }

    pub fn status_changed(
        actor: &str,
        negocio_id: &str,
        target: &str,
        old_status: UserStatus,
        new_status: UserStatus,
    ) -> Self {
        Self::new(
            AuditAction::StatusChanged,
            actor,
            negocio_id,
            json!({ "target_uid": target, "old_status": old_status, "new_status": new_status }),
        )
    }

    pub fn admin_granted(uid: &str, negocio_id: &str) -> Self {
        Self::new(
            AuditAction::AdminGranted,
            uid,
            negocio_id,
            json!({ "target_uid": uid, "via": "invite_code" }),
        )
    }

    pub fn tenant_created(actor: &str, negocio_id: &str, name: &str) -> Self {
        Self::new(
            AuditAction::TenantCreated,
            actor,
            negocio_id,
            json!({ "name": name }),
        )
    }
}
