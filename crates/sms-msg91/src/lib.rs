//! # Msg91 SMS Provider
//!
//! Msg91 Flow API (`/api/v5/flow/`) backend for sms-sender. Template variables
//! are merged into the top level of the flow payload; every recipient gets its
//! own request.

use async_trait::async_trait;
use serde::Deserialize;
use sms_core::template::{require_targets, strip_plus};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use tracing::{debug, info, warn};

const PROVIDER: &str = "msg91";

/// Msg91 client.
#[derive(Clone, Debug)]
pub struct Msg91Client {
    sender_id: String,
    auth_key: String,
    template_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl Msg91Client {
    pub fn new<S: Into<String>>(sender_id: S, auth_key: S, template_id: S) -> Self {
        Self {
            sender_id: sender_id.into(),
            auth_key: auth_key.into(),
            template_id: template_id.into(),
            base_url: "https://control.msg91.com".to_string(),
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

    /// Flow payload for one mobile. Reserved keys win over template variables.
    pub fn payload(&self, mobile: &str, params: &TemplateParams) -> serde_json::Value {
        let mut payload: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        payload.insert("template_id".into(), self.template_id.clone().into());
        payload.insert("sender".into(), self.sender_id.clone().into());
        payload.insert("short_url".into(), "0".into());
        payload.insert("mobiles".into(), strip_plus(mobile).into());
        serde_json::Value::Object(payload)
    }
}

#[derive(Debug, Deserialize)]
struct Msg91Response {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl SmsClient for Msg91Client {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let url = format!("{}/api/v5/flow/", self.base_url.trim_end_matches('/'));

        let mut ids = Vec::with_capacity(to.len());
        let mut raws = Vec::with_capacity(to.len());
        for mobile in to {
            debug!("Sending Msg91 flow {} to {}", self.template_id, mobile);
            let res = self
                .http
                .post(&url)
                .header("authkey", &self.auth_key)
                .header("accept", "application/json")
                .json(&self.payload(mobile, req.params))
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            let parsed: Msg91Response = match serde_json::from_str(&raw_text) {
                Ok(parsed) => parsed,
                Err(_) => return Err(sms_core::status_error(status, &raw_text)),
            };
            if parsed.kind == "error" {
                warn!("Msg91 rejected {}: {}", mobile, parsed.message);
                return Err(match status {
                    reqwest::StatusCode::UNAUTHORIZED => SmsError::Auth(parsed.message),
                    _ => SmsError::Provider(parsed.message),
                });
            }
            if !status.is_success() {
                return Err(sms_core::status_error(status, &raw_text));
            }

            // Success responses carry the request id in `message`.
            ids.push(if parsed.message.is_empty() {
                sms_core::fallback_id()
            } else {
                parsed.message
            });
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via Msg91 to {} recipient(s)", ids.len());
        Ok(SendResponse {
            id: ids.swap_remove(0),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}
