use async_trait::async_trait;
use core_lib::CoreError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

/// Claims of a verified identity-provider token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub exp: u64,
}

// Port for the external identity provider
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, CoreError>;
}

/// Verifies HS256 tokens signed with the provider's shared secret.
#[derive(Clone)]
pub struct JwtIdentityVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, CoreError> {
        let data = decode::<IdentityClaims>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => CoreError::Unauthenticated("token expired".into()),
                ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                    CoreError::Unauthenticated("token not issued for this service".into())
                }
                _ => CoreError::Unauthenticated(format!("invalid token: {}", e)),
            },
        )?;
        if data.claims.sub.trim().is_empty() {
            return Err(CoreError::Unauthenticated("token has no subject".into()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(secret: &str, iss: &str, aud: &str, exp_offset: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset;
        let claims = json!({
            "sub": "firebase-uid-1",
            "email": "ana@example.com",
            "name": "Ana",
            "iss": iss,
            "aud": aud,
            "exp": exp,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> JwtIdentityVerifier {
        JwtIdentityVerifier::new("s3cret", "agenda-idp", "agenda-api")
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let claims = verifier()
            .verify(&token("s3cret", "agenda-idp", "agenda-api", 600))
            .await
            .unwrap();
        assert_eq!(claims.sub, "firebase-uid-1");
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
        assert_eq!(claims.phone_number, None);
    }

    #[tokio::test]
    async fn rejects_wrong_secret_issuer_audience_and_expired() {
        let v = verifier();
        for bad in [
            token("other", "agenda-idp", "agenda-api", 600),
            token("s3cret", "someone-else", "agenda-api", 600),
            token("s3cret", "agenda-idp", "another-api", 600),
            token("s3cret", "agenda-idp", "agenda-api", -600),
            "not-a-jwt".to_string(),
        ] {
            assert!(matches!(
                v.verify(&bad).await,
                Err(CoreError::Unauthenticated(_))
            ));
        }
    }
}
