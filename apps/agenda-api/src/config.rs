use std::env;

use anyhow::{Context, Result};
use core_lib::domain::appointment::BookingPolicy;
use url::Url;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_TOKEN_CACHE_TTL_SECONDS: u64 = 300;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub encryption_key: String,
    pub idp_jwt_secret: String,
    pub idp_issuer: String,
    pub idp_audience: String,
    pub token_cache_ttl_seconds: u64,
    pub booking_policy: BookingPolicy,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let database_url = non_empty("DATABASE_URL");
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let redis_url = non_empty("REDIS_URL");
        let encryption_key = env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?;
        let idp_jwt_secret = env::var("IDP_JWT_SECRET").context("IDP_JWT_SECRET must be set")?;
        let idp_issuer = env::var("IDP_ISSUER").unwrap_or_else(|_| "agenda-idp".to_string());
        let idp_audience = env::var("IDP_AUDIENCE").unwrap_or_else(|_| "agenda-api".to_string());
        let token_cache_ttl_seconds = env::var("TOKEN_CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_CACHE_TTL_SECONDS.to_string())
            .parse()
            .context("TOKEN_CACHE_TTL_SECONDS must be an integer")?;
        let booking_policy = env::var("BOOKING_POLICY")
            .unwrap_or_else(|_| "permissive".to_string())
            .parse()
            .context("BOOKING_POLICY must be 'permissive' or 'reject_overlaps'")?;
        let cors_allowed_origin = non_empty("CORS_ALLOWED_ORIGIN");

        Ok(Self {
            server_host,
            server_port,
            database_url,
            database_max_connections,
            redis_url,
            encryption_key,
            idp_jwt_secret,
            idp_issuer,
            idp_audience,
            token_cache_ttl_seconds,
            booking_policy,
            cors_allowed_origin,
        })
    }

    pub fn redacted_database_url(&self) -> Option<String> {
        self.database_url.as_deref().map(redact_database_url)
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
