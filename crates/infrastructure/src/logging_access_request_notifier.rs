//! Notifier that reports request events to tracing output.

use async_trait::async_trait;
use rolegate_application::{AccessRequestEvent, AccessRequestNotifier};
use rolegate_core::AppResult;
use tracing::info;

/// Development notifier that logs every access request event.
#[derive(Clone, Default)]
pub struct LoggingAccessRequestNotifier;

impl LoggingAccessRequestNotifier {
    /// Creates a new logging notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessRequestNotifier for LoggingAccessRequestNotifier {
    async fn notify(&self, event: &AccessRequestEvent) -> AppResult<()> {
        info!(
            request_id = %event.request_id,
            requester = %event.requester,
            target = %event.target.target_key(),
            previous_status = event.previous_status.map(|status| status.as_str()),
            new_status = %event.new_status,
            updated_by = %event.updated_by,
            "access request status changed"
        );

        Ok(())
    }
}
