//! In-memory adapter for tests and local development.

use async_trait::async_trait;
use serde::Serialize;
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const PROVIDER: &str = "mock";

/// A message accepted by [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub id: String,
    pub to: Vec<String>,
    pub params: TemplateParams,
}

/// Accepts every request, remembers it and answers with a generated id.
#[derive(Debug, Default)]
pub struct MockClient {
    sent: Mutex<Vec<SentMessage>>,
    failure: Option<String>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that rejects every send with `SmsError::Provider(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<SentMessage>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.log().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.log().len()
    }
}

#[async_trait]
impl SmsClient for MockClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        if let Some(message) = &self.failure {
            return Err(SmsError::Provider(message.clone()));
        }

        let message = SentMessage {
            id: sms_core::fallback_id(),
            to: req.to.iter().map(|n| n.to_string()).collect(),
            params: req.params.clone(),
        };
        info!(
            "Mock SMS accepted for {} recipient(s) with id: {}",
            message.to.len(),
            message.id
        );
        let raw = serde_json::to_value(&message).map_err(|e| SmsError::Unexpected(e.to_string()))?;
        let id = message.id.clone();
        self.log().push(message);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_every_send() {
        let client = MockClient::new();
        let params = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let res = client
            .send(SendRequest::new(&params, &["+8613800000000", "+8613900000000"]))
            .await
            .unwrap();

        assert_eq!(res.provider, "mock");
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, res.id);
        assert_eq!(sent[0].to, vec!["+8613800000000", "+8613900000000"]);
        assert_eq!(res.raw["params"]["code"], "1234");
    }

    #[tokio::test]
    async fn failing_mock_records_nothing() {
        let client = MockClient::failing("quota exhausted");
        let params = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&params, &["+1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Provider(ref m) if m == "quota exhausted"));
        assert_eq!(client.sent_count(), 0);
    }
}
