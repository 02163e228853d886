use core_lib::domain::role::Role;
use tracing::warn;

use super::middleware::AuthenticatedUser;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any role in the tenant.
    Member,
    /// Professional, technician, doctor or admin.
    Staff,
    Admin,
    SuperAdmin,
}

/// What the caller may do inside one tenant once a requirement passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub role: Option<Role>,
    pub super_admin: bool,
}

impl Access {
    pub fn is_admin(&self) -> bool {
        self.super_admin || self.role == Some(Role::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.super_admin || self.role.is_some_and(|r| r.is_staff())
    }
}

pub fn require(
    ctx: &AuthenticatedUser,
    negocio_id: &str,
    requirement: Requirement,
) -> Result<Access, ApiError> {
    let role = ctx.role_in(negocio_id);
    if ctx.is_super_admin() {
        return Ok(Access {
            role,
            super_admin: true,
        });
    }
    if requirement == Requirement::SuperAdmin {
        return Err(deny(ctx, negocio_id, requirement));
    }
    let Some(role) = role else {
        return Err(deny(ctx, negocio_id, requirement));
    };
    if !ctx.is_active_in(negocio_id) {
        return Err(deny(ctx, negocio_id, requirement));
    }
    let allowed = match requirement {
        Requirement::Member => true,
        Requirement::Staff => role.is_staff(),
        Requirement::Admin => role == Role::Admin,
        Requirement::SuperAdmin => false,
    };
    if allowed {
        Ok(Access {
            role: Some(role),
            super_admin: false,
        })
    } else {
        Err(deny(ctx, negocio_id, requirement))
    }
}

/// Member of the tenant acting on their own resource, or an admin.
pub fn require_self_or_admin(
    ctx: &AuthenticatedUser,
    negocio_id: &str,
    owner_uid: &str,
) -> Result<Access, ApiError> {
    let access = require(ctx, negocio_id, Requirement::Member)?;
    if ctx.uid == owner_uid || access.is_admin() {
        Ok(access)
    } else {
        Err(deny(ctx, negocio_id, Requirement::Admin))
    }
}

fn deny(ctx: &AuthenticatedUser, negocio_id: &str, requirement: Requirement) -> ApiError {
    warn!(uid = %ctx.uid, negocio_id, ?requirement, "access denied");
    ApiError::forbidden()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::domain::role::{PLATFORM_TENANT, UserStatus};

    fn user(roles: &[(&str, Role)]) -> AuthenticatedUser {
        AuthenticatedUser {
            uid: "u1".into(),
            email: None,
            name: None,
            phone_number: None,
            roles: roles.iter().map(|(t, r)| (t.to_string(), *r)).collect(),
            status_per_tenant: Default::default(),
            registered: true,
        }
    }

    #[test]
    fn members_and_staff() {
        let client = user(&[("n1", Role::Client)]);
        assert!(require(&client, "n1", Requirement::Member).is_ok());
        assert!(require(&client, "n1", Requirement::Staff).is_err());
        assert!(require(&client, "n2", Requirement::Member).is_err());

        let doctor = user(&[("n1", Role::Doctor)]);
        let access = require(&doctor, "n1", Requirement::Staff).unwrap();
        assert!(access.is_staff());
        assert!(!access.is_admin());
        assert!(require(&doctor, "n1", Requirement::Admin).is_err());
    }

    #[test]
    fn inactive_users_fail_every_requirement() {
        let mut admin = user(&[("n1", Role::Admin)]);
        admin.status_per_tenant.insert("n1".into(), UserStatus::Inactive);
        assert!(require(&admin, "n1", Requirement::Member).is_err());
        assert!(require(&admin, "n1", Requirement::Admin).is_err());
    }

    #[test]
    fn self_or_admin() {
        let client = user(&[("n1", Role::Client)]);
        assert!(require_self_or_admin(&client, "n1", "u1").is_ok());
        assert!(require_self_or_admin(&client, "n1", "u2").is_err());
        let admin = user(&[("n1", Role::Admin)]);
        assert!(require_self_or_admin(&admin, "n1", "u2").is_ok());
    }

    #[test]
    fn super_admin_passes_everything() {
        let root = user(&[(PLATFORM_TENANT, Role::SuperAdmin)]);
        let access = require(&root, "any-tenant", Requirement::Admin).unwrap();
        assert!(access.is_admin());
        assert!(require(&root, "any-tenant", Requirement::SuperAdmin).is_ok());

        let admin = user(&[("n1", Role::Admin)]);
        assert!(require(&admin, "n1", Requirement::SuperAdmin).is_err());
    }
}
