use crate::{CoreError, PushGateway};
use async_trait::async_trait;
use tracing::info;

/// Stand-in for the mobile messaging gateway: records what would have
/// been sent. Token values are not logged.
#[derive(Debug, Clone, Default)]
pub struct LoggingPushGateway;

#[async_trait]
impl PushGateway for LoggingPushGateway {
    async fn send(&self, tokens: &[String], title: &str, _body: &str) -> Result<(), CoreError> {
        if tokens.is_empty() {
            return Ok(());
        }
        info!(devices = tokens.len(), title, "push notification dispatched");
        Ok(())
    }
}
