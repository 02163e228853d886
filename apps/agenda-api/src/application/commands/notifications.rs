use crate::AppState;
use crate::application::authz::{Requirement, require};
use crate::application::fetch;
use crate::application::middleware::AuthenticatedUser;
use crate::error::ApiResult;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use core_lib::domain::notification::{NOTIFICATIONS, Notification};
use core_lib::{
    Command, CommandHandler, CoreError, DocumentStore, document::encode, run_in_transaction,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MarkNotificationRead {
    pub actor: String,
    pub negocio_id: String,
    pub notification_id: String,
}

impl Command for MarkNotificationRead {}

pub struct NotificationsHandler {
    store: Arc<dyn DocumentStore>,
}

impl NotificationsHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl CommandHandler<MarkNotificationRead> for NotificationsHandler {
    type Output = Notification;

    async fn handle(&self, command: MarkNotificationRead) -> Result<Notification, CoreError> {
        let cmd = &command;
        run_in_transaction(self.store.as_ref(), "mark_notification_read", |mut tx| async move {
            // Someone else's notification looks exactly like a missing one.
            let mut notification =
                fetch::<Notification>(tx.as_mut(), NOTIFICATIONS, &cmd.notification_id)
                    .await?
                    .filter(|n| n.usuario_id == cmd.actor && n.negocio_id == cmd.negocio_id)
                    .ok_or_else(|| CoreError::NotFound("notification".into()))?;
            if notification.mark_read() {
                tx.set(NOTIFICATIONS, &notification.id, encode(&notification)?);
            }
            Ok::<_, CoreError>((tx, notification))
        })
        .await
    }
}

// --- Axum Route Handler ---

pub async fn handle_mark_notification_read_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
    Path((negocio_id, notification_id)): Path<(String, String)>,
) -> ApiResult<Json<Notification>> {
    require(&ctx, &negocio_id, Requirement::Member)?;
    let notification = NotificationsHandler::new(state.store.clone())
        .handle(MarkNotificationRead {
            actor: ctx.uid,
            negocio_id,
            notification_id,
        })
        .await?;
    Ok(Json(notification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::adapters::in_memory_store::InMemoryDocumentStore;

    #[tokio::test]
    async fn marks_own_notification_once() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let n = Notification::new("n1", "u1", "Agendamento confirmado", "10:00", Some("a1"));
        store.set(NOTIFICATIONS, &n.id, encode(&n).unwrap()).await.unwrap();
        let handler = NotificationsHandler::new(store.clone());
        let mark = |actor: &str| MarkNotificationRead {
            actor: actor.into(),
            negocio_id: "n1".into(),
            notification_id: n.id.clone(),
        };

        assert!(matches!(handler.handle(mark("u2")).await, Err(CoreError::NotFound(_))));

        let first = handler.handle(mark("u1")).await.unwrap();
        assert!(first.read);
        let second = handler.handle(mark("u1")).await.unwrap();
        assert_eq!(second.read_at, first.read_at);
    }
}
