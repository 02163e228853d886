use super::appointment::Appointment;
use super::timestamp;
use crate::CoreError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Topic carrying appointment lifecycle events.
pub const APPOINTMENTS_TOPIC: &str = "agendamentos";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppointmentRef {
    pub appointment_id: String,
    pub negocio_id: String,
    pub profissional_id: String,
    pub cliente_id: String,
    #[serde(with = "timestamp::wall_clock")]
    pub start: NaiveDateTime,
}

impl From<&Appointment> for AppointmentRef {
    fn from(a: &Appointment) -> Self {
        Self {
            appointment_id: a.id.clone(),
            negocio_id: a.negocio_id.clone(),
            profissional_id: a.profissional_id.clone(),
            cliente_id: a.cliente_id.clone(),
            start: a.start,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppointmentEvent {
    Booked {
        #[serde(flatten)]
        appointment: AppointmentRef,
        actor: String,
    },
    Confirmed {
        #[serde(flatten)]
        appointment: AppointmentRef,
        actor: String,
    },
    Canceled {
        #[serde(flatten)]
        appointment: AppointmentRef,
        actor: String,
        reason: Option<String>,
    },
}

impl AppointmentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AppointmentEvent::Booked { .. } => "appointment_booked",
            AppointmentEvent::Confirmed { .. } => "appointment_confirmed",
            AppointmentEvent::Canceled { .. } => "appointment_canceled",
        }
    }

    pub fn appointment(&self) -> &AppointmentRef {
        match self {
            AppointmentEvent::Booked { appointment, .. }
            | AppointmentEvent::Confirmed { appointment, .. }
            | AppointmentEvent::Canceled { appointment, .. } => appointment,
        }
    }

    pub fn actor(&self) -> &str {
        match self {
            AppointmentEvent::Booked { actor, .. }
            | AppointmentEvent::Confirmed { actor, .. }
            | AppointmentEvent::Canceled { actor, .. } => actor,
        }
    }

    /// Client and professional, minus whoever caused the event.
    pub fn recipients(&self) -> Vec<&str> {
        let a = self.appointment();
        let mut out: Vec<&str> = [a.cliente_id.as_str(), a.profissional_id.as_str()]
            .into_iter()
            .filter(|uid| *uid != self.actor())
            .collect();
        out.dedup();
        out
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
