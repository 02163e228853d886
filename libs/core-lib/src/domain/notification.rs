use super::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};

pub const NOTIFICATIONS: &str = "notificacoes";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub negocio_id: String,
    pub usuario_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, with = "timestamp::option")]
    pub read_at: Option<Timestamp>,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
}

impl Notification {
    pub fn new(
        negocio_id: &str,
        usuario_id: &str,
        title: &str,
        body: &str,
        appointment_id: Option<&str>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: negocio_id.to_string(),
            usuario_id: usuario_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            appointment_id: appointment_id.map(str::to_string),
            read: false,
            read_at: None,
            created_at: timestamp::now(),
        }
    }

    /// Returns false when it was already read.
    pub fn mark_read(&mut self) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(timestamp::now());
        true
    }
}
