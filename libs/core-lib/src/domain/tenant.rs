use super::role::Role;
use super::timestamp::{self, Timestamp};
use crate::CoreError;
use serde::{Deserialize, Serialize};

pub const TENANTS: &str = "negocios";

const MAX_NAME_LEN: usize = 120;

// --- Tenant ("negocio") ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub invite_code: String,
    /// Subject of the first user who redeemed the invite code. Set once.
    #[serde(default)]
    pub admin_uid: Option<String>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl Tenant {
    pub fn new(
        name: &str,
        owner_id: &str,
        settings: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("tenant name cannot be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "tenant name is limited to {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            invite_code: generate_invite_code(),
            admin_uid: None,
            settings,
            created_at: timestamp::now(),
        })
    }

    pub fn has_admin(&self) -> bool {
        self.admin_uid.is_some()
    }

    pub fn invite_code_matches(&self, supplied: &str) -> bool {
        normalize_invite_code(supplied) == self.invite_code
    }

    /// Role for a user joining this tenant: admin for whoever presents the
    /// right code while no admin exists yet, client for everyone else.
    pub fn role_for_newcomer(&self, invite_code: Option<&str>) -> Role {
        match invite_code {
            Some(code) if !self.has_admin() && self.invite_code_matches(code) => Role::Admin,
            _ => Role::Client,
        }
    }

    /// Public view; the invite code is only shown to admins.
    pub fn view(&self, include_invite_code: bool) -> TenantView {
        TenantView {
            id: self.id.clone(),
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            has_admin: self.has_admin(),
            invite_code: include_invite_code.then(|| self.invite_code.clone()),
            settings: self.settings.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TenantView {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub has_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

/// Eight uppercase hex characters.
pub fn generate_invite_code() -> String {
    format!("{:08X}", rand::random::<u32>())
}

pub fn normalize_invite_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant::new("Clínica Bem Estar", "root", Default::default()).unwrap()
    }

    #[test]
    fn test_new_tenant_has_code_and_no_admin() {
        let t = tenant();
        assert_eq!(t.invite_code.len(), 8);
        assert!(t.invite_code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert!(!t.has_admin());
    }

    #[test]
    fn test_rejects_blank_name() {
        assert!(matches!(
            Tenant::new("   ", "root", Default::default()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_code_match_is_normalized() {
        let mut t = tenant();
        t.invite_code = "A1B2C3D4".into();
        assert!(t.invite_code_matches(" a1b2c3d4 "));
        assert!(!t.invite_code_matches("A1B2C3D5"));
        assert!(!t.invite_code_matches("A1B2C3D"));
    }

    #[test]
    fn test_newcomer_role() {
        let mut t = tenant();
        t.invite_code = "A1B2C3D4".into();
        assert_eq!(t.role_for_newcomer(None), Role::Client);
        assert_eq!(t.role_for_newcomer(Some("wrong")), Role::Client);
        assert_eq!(t.role_for_newcomer(Some("a1b2c3d4")), Role::Admin);

        t.admin_uid = Some("first".into());
        assert_eq!(t.role_for_newcomer(Some("A1B2C3D4")), Role::Client);
    }

    #[test]
    fn test_view_hides_invite_code() {
        let t = tenant();
        let json = serde_json::to_value(t.view(false)).unwrap();
        assert!(json.get("invite_code").is_none());
        assert_eq!(t.view(true).invite_code, Some(t.invite_code.clone()));
    }
}
