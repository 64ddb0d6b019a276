use std::time::Duration;

use async_trait::async_trait;
use rolegate_application::{AccessRequestEvent, AccessRequestNotifier};
use rolegate_core::{AppError, AppResult};

/// Notifier that POSTs every access request event to a webhook.
pub struct WebhookAccessRequestNotifier {
    http_client: reqwest::Client,
    endpoint: String,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl WebhookAccessRequestNotifier {
    /// Creates a new webhook notifier.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: impl Into<String>,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            max_attempts: max_attempts.max(1),
            retry_backoff_ms: retry_backoff_ms.max(50),
        }
    }
}

#[async_trait]
impl AccessRequestNotifier for WebhookAccessRequestNotifier {
    async fn notify(&self, event: &AccessRequestEvent) -> AppResult<()> {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let response = self
                .http_client
                .post(self.endpoint.as_str())
                .header("X-Rolegate-Request", event.request_id.as_str())
                .header("X-Rolegate-Event", event.new_status.as_str())
                .json(event)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} for access request notification '{}'",
                        response.status(),
                        event.request_id
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Validation(format!(
                        "access request notification failed with status {status}: {body}"
                    )));
                }
                Err(error) => {
                    last_error = Some(format!(
                        "access request notification transport error: {error}"
                    ));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            "access request notification exhausted retries".to_owned()
        })))
    }
}
