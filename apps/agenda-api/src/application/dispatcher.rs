use core_lib::adapters::in_memory_event_bus::BusMessage;
use core_lib::document::encode;
use core_lib::domain::event::AppointmentEvent;
use core_lib::domain::notification::{NOTIFICATIONS, Notification};
use core_lib::domain::user::{USERS, UserRecord};
use core_lib::{CoreError, DocumentStore, PushGateway};
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Turns appointment events into stored notifications and push messages.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    push: Arc<dyn PushGateway>,
}

fn message_for(event: &AppointmentEvent) -> (&'static str, String) {
    let when = event.appointment().start.format("%d/%m/%Y %H:%M");
    match event {
        AppointmentEvent::Booked { .. } => ("Novo agendamento", format!("Agendamento para {}", when)),
        AppointmentEvent::Confirmed { .. } => {
            ("Agendamento confirmado", format!("Agendamento de {} confirmado", when))
        }
        AppointmentEvent::Canceled { reason, .. } => {
            let body = match reason {
                Some(reason) => format!("Agendamento de {} cancelado: {}", when, reason),
                None => format!("Agendamento de {} cancelado", when),
            };
            ("Agendamento cancelado", body)
        }
    }
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, push: Arc<dyn PushGateway>) -> Self {
        Self { store, push }
    }

    /// Consume the receiver until the bus goes away.
    pub fn spawn(self, mut receiver: Receiver<BusMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("notification dispatcher listening for appointment events");
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if let Err(e) = self.handle_message(&message).await {
                            error!(event_type = %message.event_type, "failed to dispatch notifications: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification dispatcher lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        warn!("event bus closed, notification dispatcher stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_message(&self, message: &BusMessage) -> Result<usize, CoreError> {
        let event = AppointmentEvent::from_payload(&message.payload)?;
        self.dispatch(&event).await
    }

    /// Store one notification per recipient and push to their devices.
    /// Returns how many users were notified.
    pub async fn dispatch(&self, event: &AppointmentEvent) -> Result<usize, CoreError> {
        let appointment = event.appointment();
        let (title, body) = message_for(event);
        let mut delivered = 0;

        for uid in event.recipients() {
            let notification = Notification::new(
                &appointment.negocio_id,
                uid,
                title,
                &body,
                Some(appointment.appointment_id.as_str()),
            );
            self.store
                .create(NOTIFICATIONS, &notification.id, encode(&notification)?)
                .await?;
            delivered += 1;

            let tokens: Vec<String> = match self.store.get(USERS, uid).await {
                Ok(Some(doc)) => doc
                    .decode::<UserRecord>()
                    .map(|u| u.push_tokens.into_iter().collect())
                    .unwrap_or_default(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(uid, "could not load push tokens: {}", e);
                    Vec::new()
                }
            };
            // Push is best effort; the stored notification is the record.
            if let Err(e) = self.push.send(&tokens, title, &body).await {
                warn!(uid, appointment_id = %appointment.appointment_id, "push delivery failed: {}", e);
            }
        }

        info!(
            event_type = event.event_type(),
            appointment_id = %appointment.appointment_id,
            recipients = delivered,
            "notifications dispatched"
        );
        Ok(delivered)
    }
}
