use super::role::Role;
use super::timestamp::{self, Timestamp};
use crate::CoreError;
use chrono::{NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const PROFESSIONALS: &str = "profissionais";
pub const BLOCKING_PERIODS: &str = "bloqueios";

/// One profile per (tenant, user).
pub fn profile_id(negocio_id: &str, usuario_id: &str) -> String {
    format!("{}_{}", negocio_id, usuario_id)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    pub weekday: Weekday,
    #[serde(with = "timestamp::clock")]
    pub start: NaiveTime,
    #[serde(with = "timestamp::clock")]
    pub end: NaiveTime,
}

pub fn validate_windows(windows: &[WorkingWindow]) -> Result<(), CoreError> {
    for w in windows {
        if w.start >= w.end {
            return Err(CoreError::Validation(format!(
                "working window on {} must start before it ends",
                w.weekday
            )));
        }
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfessionalProfile {
    pub id: String,
    pub negocio_id: String,
    pub usuario_id: String,
    pub active: bool,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub working_hours: Vec<WorkingWindow>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "timestamp")]
    pub updated_at: Timestamp,
}

impl ProfessionalProfile {
    pub fn new(negocio_id: &str, usuario_id: &str) -> Self {
        let now = timestamp::now();
        Self {
            id: profile_id(negocio_id, usuario_id),
            negocio_id: negocio_id.to_string(),
            usuario_id: usuario_id.to_string(),
            active: true,
            specialties: Vec::new(),
            bio: None,
            photo_url: None,
            working_hours: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn windows_on(&self, weekday: Weekday) -> impl Iterator<Item = &WorkingWindow> {
        self.working_hours.iter().filter(move |w| w.weekday == weekday)
    }
}

/// Profile write implied by a user's role in a tenant: create or
/// reactivate for professional/admin, deactivate for anything else.
/// `None` means the stored state already conforms.
pub fn reconcile_profile(
    existing: Option<ProfessionalProfile>,
    negocio_id: &str,
    usuario_id: &str,
    role: Role,
) -> Option<ProfessionalProfile> {
    set_profile_active(existing, negocio_id, usuario_id, role.requires_professional_profile())
}

/// Force the active flag. Creating a profile only happens when activating.
pub fn set_profile_active(
    existing: Option<ProfessionalProfile>,
    negocio_id: &str,
    usuario_id: &str,
    active: bool,
) -> Option<ProfessionalProfile> {
    match (existing, active) {
        (None, true) => Some(ProfessionalProfile::new(negocio_id, usuario_id)),
        (None, false) => None,
        (Some(profile), wanted) if profile.active == wanted => None,
        (Some(mut profile), wanted) => {
            profile.active = wanted;
            profile.updated_at = timestamp::now();
            Some(profile)
        }
    }
}

/// Explicit unavailability of a professional, overriding working hours.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockingPeriod {
    pub id: String,
    pub negocio_id: String,
    pub profissional_id: String,
    #[serde(with = "timestamp::wall_clock")]
    pub start: NaiveDateTime,
    #[serde(with = "timestamp::wall_clock")]
    pub end: NaiveDateTime,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_by: String,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl BlockingPeriod {
    pub fn new(
        negocio_id: &str,
        profissional_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        reason: Option<String>,
        created_by: &str,
    ) -> Result<Self, CoreError> {
        if start >= end {
            return Err(CoreError::Validation(
                "blocking period must start before it ends".into(),
            ));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: negocio_id.to_string(),
            profissional_id: profissional_id.to_string(),
            start,
            end,
            reason,
            created_by: created_by.to_string(),
            created_at: timestamp::now(),
        })
    }
}
