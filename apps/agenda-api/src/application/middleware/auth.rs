use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use core_lib::domain::role::{PLATFORM_TENANT, Role, UserStatus};
use core_lib::domain::user::{USERS, UserRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::super::identity::IdentityClaims;
use crate::AppState;
use crate::error::ApiError;

/// Caller identity attached to every authenticated request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub roles: BTreeMap<String, Role>,
    pub status_per_tenant: BTreeMap<String, UserStatus>,
    /// Whether a user document exists for this subject yet.
    pub registered: bool,
}

impl AuthenticatedUser {
    pub fn role_in(&self, negocio_id: &str) -> Option<Role> {
        self.roles.get(negocio_id).copied()
    }

    pub fn is_active_in(&self, negocio_id: &str) -> bool {
        self.status_per_tenant.get(negocio_id).copied().unwrap_or_default() == UserStatus::Active
    }

    pub fn is_super_admin(&self) -> bool {
        self.role_in(PLATFORM_TENANT) == Some(Role::SuperAdmin) && self.is_active_in(PLATFORM_TENANT)
    }
}

pub fn token_cache_key(token: &str) -> String {
    format!("idp:token:{}", token)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn verified_claims(app_state: &AppState, token: &str) -> Result<IdentityClaims, ApiError> {
    let cache_key = token_cache_key(token);
    let now = chrono::Utc::now().timestamp().max(0) as u64;

    match app_state.cache.get(&cache_key).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<IdentityClaims>(&bytes) {
            Ok(claims) if claims.exp > now => {
                debug!(uid = %claims.sub, "token cache hit");
                return Ok(claims);
            }
            Ok(_) => {}
            Err(e) => warn!("discarding unreadable cached claims: {}", e),
        },
        Ok(None) => {}
        Err(e) => warn!("token cache unavailable, verifying directly: {}", e),
    }

    let claims = app_state.identity.verify(token).await.map_err(|e| {
        warn!("token verification failed: {}", e);
        ApiError::unauthenticated()
    })?;

    let ttl = app_state
        .token_cache_ttl_seconds
        .min(claims.exp.saturating_sub(now));
    if ttl > 0 {
        match serde_json::to_vec(&claims) {
            Ok(bytes) => {
                if let Err(e) = app_state.cache.set(&cache_key, &bytes, Some(ttl)).await {
                    warn!("failed to cache verified token: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize claims for cache: {}", e),
        }
    }
    Ok(claims)
}

/// Authenticates `Authorization: Bearer <id token>` against the identity
/// provider and attaches the caller's stored roles.
pub async fn bearer_auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(&req) else {
        warn!("missing or malformed Authorization header");
        return Err(ApiError::unauthenticated());
    };
    let claims = verified_claims(&app_state, token).await?;

    let record = match app_state.store.get(USERS, &claims.sub).await? {
        Some(doc) => Some(doc.decode::<UserRecord>()?),
        None => None,
    };
    let (roles, status_per_tenant) = match &record {
        Some(r) => (r.roles.clone(), r.status_per_tenant.clone()),
        None => Default::default(),
    };

    let user = AuthenticatedUser {
        uid: claims.sub,
        email: claims.email,
        name: claims.name,
        phone_number: claims.phone_number,
        roles,
        status_per_tenant,
        registered: record.is_some(),
    };
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
