//! # Azure Communication Services SMS Provider
//!
//! Azure ACS `POST {endpoint}/sms` backend for sms-sender. The first number of
//! the recipient list is the ACS sender number; each following number receives
//! its own request. `{name}` placeholders in the template are replaced by the
//! matching parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::template::substitute;
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "azure";
const API_VERSION: &str = "2021-03-07";

/// Azure ACS SMS client.
#[derive(Clone, Debug)]
pub struct AzureClient {
    api_key: String,
    /// Resource endpoint, e.g. `https://my-acs.communication.azure.com`.
    endpoint: String,
    template: String,
    http: reqwest::Client,
}

impl AzureClient {
    pub fn new<S: Into<String>>(api_key: S, template: S, endpoint: S) -> Self {
        Self {
            api_key: api_key.into(),
            template: template.into(),
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/sms?api-version={}",
            self.endpoint.trim_end_matches('/'),
            API_VERSION
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcsSendRequest<'a> {
    from: &'a str,
    sms_recipients: [AcsRecipient<'a>; 1],
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct AcsRecipient<'a> {
    to: &'a str,
}

#[derive(Debug, Deserialize)]
struct AcsSendResponse {
    #[serde(default)]
    value: Vec<AcsSendResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcsSendResult {
    message_id: Option<String>,
    #[serde(default)]
    successful: bool,
    error_message: Option<String>,
}

#[async_trait]
impl SmsClient for AzureClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let (from, recipients) = match req.to {
            [from, rest @ ..] if !rest.is_empty() => (*from, rest),
            _ => {
                return Err(SmsError::Invalid(
                    "bad parameter: targetPhoneNumber needs a sender and at least one recipient"
                        .into(),
                ))
            }
        };

        let message = substitute(&self.template, req.params);
        let url = self.url();

        let mut ids = Vec::with_capacity(recipients.len());
        let mut raws = Vec::with_capacity(recipients.len());
        for to in recipients {
            debug!("Sending Azure ACS SMS from {} to {}", from, to);
            let res = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&AcsSendRequest {
                    from,
                    sms_recipients: [AcsRecipient { to }],
                    message: &message,
                })
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            if status == reqwest::StatusCode::UNAUTHORIZED {
                warn!("Azure ACS rejected credentials");
                return Err(SmsError::Auth(raw_text));
            }
            if !status.is_success() {
                warn!("Azure ACS send to {} failed: HTTP {}", to, status);
                return Err(sms_core::status_error(status, &raw_text));
            }

            let parsed: Option<AcsSendResponse> = serde_json::from_str(&raw_text).ok();
            let result = parsed.and_then(|p| p.value.into_iter().next());
            if let Some(AcsSendResult {
                successful: false,
                error_message,
                ..
            }) = &result
            {
                let msg = error_message.clone().unwrap_or_default();
                warn!("Azure ACS rejected {}: {}", to, msg);
                return Err(SmsError::Provider(msg));
            }

            ids.push(
                result
                    .and_then(|r| r.message_id)
                    .unwrap_or_else(sms_core::fallback_id),
            );
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via Azure ACS to {} recipient(s)", ids.len());
        Ok(SendResponse {
            id: ids.swap_remove(0),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}
