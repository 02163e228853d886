use crate::AppState;
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{Extension, Json, extract::State, http::StatusCode};
use core_lib::domain::timestamp;
use core_lib::domain::user::{
    Consent, USERS, UserProfile, UserRecord, normalize_phone, seal_address,
};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, crypto::FieldCipher, document::encode,
    run_in_transaction,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const MAX_PUSH_TOKEN_LEN: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub uid: String,
    pub name: Option<String>,
    /// An empty string clears the stored phone.
    pub phone: Option<String>,
    pub address: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub enum PushTokenChange {
    Add { uid: String, token: String },
    Remove { uid: String, token: String },
}

#[derive(Debug, Clone)]
pub struct RecordConsent {
    pub uid: String,
    pub accepted: bool,
    pub version: String,
}

impl Command for UpdateProfile {}
impl Command for PushTokenChange {}
impl Command for RecordConsent {}

/// Self-service changes to the caller's own user document.
pub struct ProfileHandler {
    store: Arc<dyn DocumentStore>,
    cipher: Arc<FieldCipher>,
}

impl ProfileHandler {
    pub fn new(store: Arc<dyn DocumentStore>, cipher: Arc<FieldCipher>) -> Self {
        Self { store, cipher }
    }

    async fn modify<F>(&self, operation: &str, uid: &str, apply: F) -> Result<UserRecord, CoreError>
    where
        F: Fn(&mut UserRecord) -> Result<bool, CoreError> + Send + Sync,
    {
        let apply = &apply;
        run_in_transaction(self.store.as_ref(), operation, |mut tx| async move {
            let mut record = fetch::<UserRecord>(tx.as_mut(), USERS, uid)
                .await?
                .ok_or_else(|| CoreError::NotFound("user".into()))?;
            if apply(&mut record)? {
                record.touch();
                tx.set(USERS, uid, encode(&record)?);
            }
            Ok::<_, CoreError>((tx, record))
        })
        .await
    }
}

impl CommandHandler<UpdateProfile> for ProfileHandler {
    type Output = UserProfile;

    async fn handle(&self, command: UpdateProfile) -> Result<UserProfile, CoreError> {
        let cipher = self.cipher.as_ref();

        // Validate and seal before touching the store; encryption failure
        // aborts the write.
        let name = match command.name.as_deref().map(str::trim) {
            Some("") => return Err(CoreError::Validation("name cannot be empty".into())),
            Some(name) => Some(cipher.encrypt(name)?),
            None => None,
        };
        let phone = match command.phone.as_deref().map(str::trim) {
            Some("") => Some(None),
            Some(raw) => Some(Some(cipher.encrypt(&normalize_phone(raw)?)?)),
            None => None,
        };
        let address = command.address.as_ref();

        let record = self
            .modify("update_profile", &command.uid, |record| {
                if let Some(name) = &name {
                    record.name = name.clone();
                }
                if let Some(phone) = &phone {
                    record.phone = phone.clone();
                }
                if let Some(changes) = address {
                    record.address = seal_address(&record.address, changes, cipher)?;
                }
                Ok(true)
            })
            .await?;
        info!(uid = %command.uid, "profile updated");
        Ok(record.to_profile(cipher))
    }
}

impl CommandHandler<PushTokenChange> for ProfileHandler {
    type Output = usize;

    async fn handle(&self, command: PushTokenChange) -> Result<usize, CoreError> {
        let (uid, token, add) = match &command {
            PushTokenChange::Add { uid, token } => (uid, token.trim(), true),
            PushTokenChange::Remove { uid, token } => (uid, token.trim(), false),
        };
        if token.is_empty() || token.len() > MAX_PUSH_TOKEN_LEN {
            return Err(CoreError::Validation("invalid push token".into()));
        }
        let record = self
            .modify("push_tokens", uid, |record| {
                Ok(if add {
                    record.push_tokens.insert(token.to_string())
                } else {
                    record.push_tokens.remove(token)
                })
            })
            .await?;
        Ok(record.push_tokens.len())
    }
}

impl CommandHandler<RecordConsent> for ProfileHandler {
    type Output = Consent;

    async fn handle(&self, command: RecordConsent) -> Result<Consent, CoreError> {
        let version = command.version.trim();
        if version.is_empty() {
            return Err(CoreError::Validation("consent version is required".into()));
        }
        let consent = Consent {
            accepted: command.accepted,
            version: version.to_string(),
            recorded_at: timestamp::now(),
        };
        self.modify("record_consent", &command.uid, |record| {
            record.consent = Some(consent.clone());
            Ok(true)
        })
        .await?;
        info!(uid = %command.uid, accepted = consent.accepted, version = %consent.version, "consent recorded");
        Ok(consent)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateProfileDto {
    name: Option<String>,
    phone: Option<String>,
    address: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug)]
pub struct PushTokenDto {
    token: String,
}

#[derive(Deserialize, Debug)]
pub struct ConsentDto {
    accepted: bool,
    version: String,
}

// --- Axum Route Handlers ---

pub async fn handle_update_profile_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<UpdateProfileDto>,
) -> ApiResult<Json<UserProfile>> {
    let handler = ProfileHandler::new(state.store.clone(), state.cipher.clone());
    let profile = handler
        .handle(UpdateProfile {
            uid: ctx.uid,
            name: payload.name,
            phone: payload.phone,
            address: payload.address,
        })
        .await?;
    Ok(Json(profile))
}

pub async fn handle_add_push_token_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<PushTokenDto>,
) -> ApiResult<StatusCode> {
    let handler = ProfileHandler::new(state.store.clone(), state.cipher.clone());
    handler
        .handle(PushTokenChange::Add {
            uid: ctx.uid,
            token: payload.token,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_remove_push_token_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<PushTokenDto>,
) -> ApiResult<StatusCode> {
    let handler = ProfileHandler::new(state.store.clone(), state.cipher.clone());
    handler
        .handle(PushTokenChange::Remove {
            uid: ctx.uid,
            token: payload.token,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_record_consent_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Json(payload): Json<ConsentDto>,
) -> ApiResult<Json<Consent>> {
    let handler = ProfileHandler::new(state.store.clone(), state.cipher.clone());
    let consent = handler
        .handle(RecordConsent {
            uid: ctx.uid,
            accepted: payload.accepted,
            version: payload.version,
        })
        .await?;
    Ok(Json(consent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::adapters::in_memory_store::InMemoryDocumentStore;
    use core_lib::crypto::EncryptionKey;

    async fn setup() -> (Arc<InMemoryDocumentStore>, ProfileHandler, Arc<FieldCipher>) {
        let store = Arc::new(InMemoryDocumentStore::default());
        let cipher = Arc::new(FieldCipher::new(&EncryptionKey::generate()).unwrap());
        let record = UserRecord::new("u1", "Ana", "ana@x.com", None, &cipher).unwrap();
        store.set(USERS, "u1", encode(&record).unwrap()).await.unwrap();
        let handler = ProfileHandler::new(store.clone(), cipher.clone());
        (store, handler, cipher)
    }

    async fn stored(store: &InMemoryDocumentStore) -> UserRecord {
        store.get(USERS, "u1").await.unwrap().unwrap().decode().unwrap()
    }

    #[tokio::test]
    async fn updates_are_encrypted_at_rest() {
        let (store, handler, cipher) = setup().await;
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), "Recife".to_string());
        address.insert("postal_code".to_string(), "50000-000".to_string());

        let profile = handler
            .handle(UpdateProfile {
                uid: "u1".into(),
                name: Some("Ana Clara".into()),
                phone: Some("(81) 99999-0000".into()),
                address: Some(address),
            })
            .await
            .unwrap();
        assert_eq!(profile.name, "Ana Clara");
        assert_eq!(profile.phone.as_deref(), Some("81999990000"));
        assert_eq!(profile.address["postal_code"], "50000000");

        let raw = stored(&store).await;
        assert_ne!(raw.name, "Ana Clara");
        assert_eq!(cipher.decrypt(&raw.name).unwrap(), "Ana Clara");
        assert_ne!(raw.address["city"], "Recife");
    }

    #[tokio::test]
    async fn invalid_phone_or_postal_code_rejected_without_write() {
        let (store, handler, _) = setup().await;
        let before = store.get(USERS, "u1").await.unwrap().unwrap().version;

        let res = handler
            .handle(UpdateProfile {
                uid: "u1".into(),
                phone: Some("123".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(CoreError::Validation(_))));

        let mut address = BTreeMap::new();
        address.insert("postal_code".to_string(), "123".to_string());
        let res = handler
            .handle(UpdateProfile {
                uid: "u1".into(),
                address: Some(address),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(CoreError::Validation(_))));

        let after = store.get(USERS, "u1").await.unwrap().unwrap().version;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn empty_phone_clears_it() {
        let (store, handler, _) = setup().await;
        handler
            .handle(UpdateProfile {
                uid: "u1".into(),
                phone: Some("11912345678".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        handler
            .handle(UpdateProfile {
                uid: "u1".into(),
                phone: Some("".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stored(&store).await.phone, None);
    }

    #[tokio::test]
    async fn push_tokens_have_set_semantics() {
        let (store, handler, _) = setup().await;
        let add = |t: &str| PushTokenChange::Add {
            uid: "u1".into(),
            token: t.into(),
        };
        assert_eq!(handler.handle(add("tok-a")).await.unwrap(), 1);
        assert_eq!(handler.handle(add("tok-a")).await.unwrap(), 1);
        assert_eq!(handler.handle(add("tok-b")).await.unwrap(), 2);
        let removed = handler
            .handle(PushTokenChange::Remove {
                uid: "u1".into(),
                token: "tok-a".into(),
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(stored(&store).await.push_tokens.contains("tok-b"));
    }

    #[tokio::test]
    async fn consent_is_stamped() {
        let (store, handler, _) = setup().await;
        let consent = handler
            .handle(RecordConsent {
                uid: "u1".into(),
                accepted: true,
                version: "2024-01".into(),
            })
            .await
            .unwrap();
        assert!(consent.accepted);
        assert_eq!(stored(&store).await.consent, Some(consent));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_, handler, _) = setup().await;
        let res = handler
            .handle(UpdateProfile {
                uid: "ghost".into(),
                name: Some("X".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(CoreError::NotFound(_))));
    }
}
