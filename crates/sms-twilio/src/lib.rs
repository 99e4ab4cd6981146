//! # Twilio SMS Provider
//!
//! Twilio Programmable Messaging backend for sms-sender.
//!
//! The first entry of the recipient list is the sender number; every following
//! entry receives its own `Messages.json` request with the template filled
//! with the `code` parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::template::{fill_code, require_code};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "twilio";

/// Twilio REST client.
#[derive(Clone, Debug)]
pub struct TwilioClient {
    /// Account SID, also the basic-auth username.
    account_sid: String,
    auth_token: String,
    template: String,
    /// API base URL; override for testing/mocking.
    base_url: String,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S, template: S) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            template: template.into(),
            base_url: "https://api.twilio.com".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[derive(Debug, Serialize)]
struct TwilioSendRequest<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<i64>,
    message: String,
}

#[async_trait]
impl SmsClient for TwilioClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let (from, recipients) = match req.to {
            [from, rest @ ..] if !rest.is_empty() => (*from, rest),
            _ => {
                return Err(SmsError::Invalid(
                    "bad parameter: targetPhoneNumber needs a sender and at least one recipient"
                        .into(),
                ))
            }
        };

        let body = fill_code(&self.template, code);
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        );

        let mut sids = Vec::with_capacity(recipients.len());
        let mut raws = Vec::with_capacity(recipients.len());
        for to in recipients {
            debug!("Sending Twilio SMS from {} to {}", from, to);
            let res = self
                .http
                .post(&url)
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&TwilioSendRequest {
                    to,
                    from,
                    body: &body,
                })
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            if !status.is_success() {
                let err = serde_json::from_str::<TwilioError>(&raw_text).ok();
                warn!("Twilio rejected message to {}: HTTP {}", to, status);
                return Err(match err {
                    Some(err) if status == reqwest::StatusCode::UNAUTHORIZED => {
                        SmsError::Auth(err.message)
                    }
                    Some(err) => SmsError::Provider(match err.code {
                        Some(code) => format!("{}: {}", code, err.message),
                        None => err.message,
                    }),
                    None => sms_core::status_error(status, &raw_text),
                });
            }

            let message: TwilioMessage = serde_json::from_str(&raw_text)
                .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
            sids.push(message.sid);
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via Twilio to {} recipient(s)", sids.len());
        Ok(SendResponse {
            id: sids.swap_remove(0),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}
