use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Virtual tenant holding the platform super-admin role.
pub const PLATFORM_TENANT: &str = "platform";

/// Role of a user within one tenant. Roles are a flat set, not a ladder.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Professional,
    Technician,
    Doctor,
    Admin,
    /// Only ever granted on [`PLATFORM_TENANT`] by the bootstrap path.
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Professional => "professional",
            Role::Technician => "technician",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Roles that must own an active professional profile in the tenant.
    pub fn requires_professional_profile(&self) -> bool {
        matches!(self, Role::Professional | Role::Admin)
    }

    /// Everyone who works for the tenant rather than being served by it.
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            Role::Professional | Role::Technician | Role::Doctor | Role::Admin
        )
    }

    /// Parse a role an admin may assign inside a tenant.
    pub fn parse_assignable(raw: &str) -> Result<Role, CoreError> {
        match raw.parse::<Role>()? {
            Role::SuperAdmin => Err(CoreError::Validation(
                "super_admin cannot be assigned within a tenant".into(),
            )),
            role => Ok(role),
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "client" => Ok(Role::Client),
            "professional" => Ok(Role::Professional),
            "technician" => Ok(Role::Technician),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(CoreError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}
