use super::role::{Role, UserStatus};
use super::timestamp::{self, Timestamp};
use crate::crypto::FieldCipher;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const USERS: &str = "usuarios";

pub const ADDRESS_FIELDS: [&str; 7] = [
    "street",
    "number",
    "complement",
    "district",
    "city",
    "state",
    "postal_code",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Consent {
    pub accepted: bool,
    pub version: String,
    #[serde(with = "timestamp")]
    pub recorded_at: Timestamp,
}

/// Stored user document, keyed by identity-provider subject id.
/// `name`, `phone` and every address value hold encrypted tokens.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: BTreeMap<String, String>,
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub status_per_tenant: BTreeMap<String, UserStatus>,
    #[serde(default)]
    pub push_tokens: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<Consent>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "timestamp")]
    pub updated_at: Timestamp,
}

impl UserRecord {
    /// Build a record with sensitive fields sealed. Encryption failure
    /// aborts the write.
    pub fn new(
        uid: &str,
        name: &str,
        email: &str,
        phone: Option<&str>,
        cipher: &FieldCipher,
    ) -> Result<Self, CoreError> {
        if uid.trim().is_empty() {
            return Err(CoreError::Validation("subject id is required".into()));
        }
        let phone = match phone {
            Some(raw) if !raw.trim().is_empty() => Some(cipher.encrypt(&normalize_phone(raw)?)?),
            _ => None,
        };
        let now = timestamp::now();
        Ok(Self {
            uid: uid.to_string(),
            name: cipher.encrypt(name.trim())?,
            email: email.trim().to_lowercase(),
            phone,
            address: BTreeMap::new(),
            roles: BTreeMap::new(),
            status_per_tenant: BTreeMap::new(),
            push_tokens: BTreeSet::new(),
            consent: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn role_in(&self, negocio_id: &str) -> Option<Role> {
        self.roles.get(negocio_id).copied()
    }

    pub fn status_in(&self, negocio_id: &str) -> UserStatus {
        self.status_per_tenant
            .get(negocio_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn grant(&mut self, negocio_id: &str, role: Role) {
        self.roles.insert(negocio_id.to_string(), role);
        self.status_per_tenant
            .entry(negocio_id.to_string())
            .or_insert(UserStatus::Active);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = timestamp::now();
    }

    /// Decrypted view for API responses. Unreadable fields become the
    /// display sentinel instead of failing the read.
    pub fn to_profile(&self, cipher: &FieldCipher) -> UserProfile {
        UserProfile {
            uid: self.uid.clone(),
            name: cipher.decrypt_for_display(&self.name),
            email: self.email.clone(),
            phone: self.phone.as_deref().map(|p| cipher.decrypt_for_display(p)),
            address: self
                .address
                .iter()
                .map(|(k, v)| (k.clone(), cipher.decrypt_for_display(v)))
                .collect(),
            roles: self.roles.clone(),
            status_per_tenant: self.status_per_tenant.clone(),
            consent: self.consent.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: BTreeMap<String, String>,
    pub roles: BTreeMap<String, Role>,
    pub status_per_tenant: BTreeMap<String, UserStatus>,
    pub consent: Option<Consent>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "timestamp")]
    pub updated_at: Timestamp,
}

fn digits_only(raw: &str, allowed: &[char]) -> Result<String, CoreError> {
    let mut digits = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !allowed.contains(&c) {
            return Err(CoreError::Validation(format!("unexpected character '{}'", c)));
        }
    }
    Ok(digits)
}

/// Strip punctuation and require 10 to 13 digits.
pub fn normalize_phone(raw: &str) -> Result<String, CoreError> {
    let digits = digits_only(raw, &[' ', '-', '(', ')', '+', '.'])
        .map_err(|_| CoreError::Validation("phone may contain only digits and punctuation".into()))?;
    if !(10..=13).contains(&digits.len()) {
        return Err(CoreError::Validation(
            "phone must have between 10 and 13 digits".into(),
        ));
    }
    Ok(digits)
}

/// Postal code (CEP): exactly 8 digits once punctuation is removed.
pub fn normalize_postal_code(raw: &str) -> Result<String, CoreError> {
    let digits = digits_only(raw, &[' ', '-', '.'])
        .map_err(|_| CoreError::Validation("postal code may contain only digits".into()))?;
    if digits.len() != 8 {
        return Err(CoreError::Validation("postal code must have 8 digits".into()));
    }
    Ok(digits)
}

/// Validate and seal address fields. Unknown keys are rejected; empty
/// values remove the field.
pub fn seal_address(
    current: &BTreeMap<String, String>,
    changes: &BTreeMap<String, String>,
    cipher: &FieldCipher,
) -> Result<BTreeMap<String, String>, CoreError> {
    let mut sealed = current.clone();
    for (field, value) in changes {
        if !ADDRESS_FIELDS.contains(&field.as_str()) {
            return Err(CoreError::Validation(format!(
                "unknown address field '{}'",
                field
            )));
        }
        let value = value.trim();
        if value.is_empty() {
            sealed.remove(field);
            continue;
        }
        let value = if field == "postal_code" {
            normalize_postal_code(value)?
        } else {
            value.to_string()
        };
        sealed.insert(field.clone(), cipher.encrypt(&value)?);
    }
    Ok(sealed)
}
