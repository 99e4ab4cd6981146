//! # GCCPAY SMS Provider
//!
//! GCCPAY (sgate.sa) SMS center backend for sms-sender.
//!
//! The request body is a JSON object keyed by random base64 ids, one entry per
//! mobile. Authentication is a trio of headers: `clientname`, `timestamp` and
//! `sign = md5(clientname + timestamp + secret)`.

use async_trait::async_trait;
use serde::Serialize;
use sms_core::sign::{base64_encode, hex_md5, random_bytes};
use sms_core::template::{require_code, require_targets, strip_plus};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "gccpay";

/// GCCPAY client.
#[derive(Clone, Debug)]
pub struct GccpayClient {
    client_name: String,
    secret: String,
    template: String,
    base_url: String,
    http: reqwest::Client,
}

impl GccpayClient {
    pub fn new<S: Into<String>>(client_name: S, secret: S, template: S) -> Self {
        Self {
            client_name: client_name.into(),
            secret: secret.into(),
            template: template.into(),
            base_url: "https://smscenter.sgate.sa".to_string(),
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

/// Request signature for the given unix timestamp.
pub fn sign(client_name: &str, timestamp: i64, secret: &str) -> String {
    hex_md5(format!("{}{}{}", client_name, timestamp, secret).as_bytes())
}

#[derive(Debug, Serialize)]
struct GccpayMessage<'a> {
    mobile: &'a str,
    template_code: &'a str,
    template_params: &'a TemplateParams,
}

fn message_batch<'a>(
    template: &'a str,
    params: &'a TemplateParams,
    to: &'a [&'a str],
) -> BTreeMap<String, GccpayMessage<'a>> {
    to.iter()
        .map(|mobile| {
            (
                base64_encode(&random_bytes(16)),
                GccpayMessage {
                    mobile: strip_plus(mobile),
                    template_code: template,
                    template_params: params,
                },
            )
        })
        .collect()
}

#[async_trait]
impl SmsClient for GccpayClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        require_code(req.params)?;
        let to = require_targets(req.to)?;

        let batch = message_batch(&self.template, req.params, to);
        let timestamp = datetime::now_unix();
        debug!("Sending GCCPAY SMS to {} recipient(s)", to.len());

        let res = self
            .http
            .post(format!(
                "{}/api/v1/client/sendSms",
                self.base_url.trim_end_matches('/')
            ))
            .header("clientname", &self.client_name)
            .header("timestamp", timestamp.to_string())
            .header("sign", sign(&self.client_name, timestamp, &self.secret))
            .json(&batch)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        if !status.is_success() {
            warn!("GCCPAY sendSms failed: HTTP {}", status);
            return Err(sms_core::status_error(status, &raw_text));
        }

        let raw = sms_core::raw_json(&raw_text);
        // `code` is returned as a number or a numeric string depending on the endpoint.
        let code = raw.get("code").and_then(|c| match c {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        });
        if let Some(code) = code.filter(|c| *c != 0) {
            let msg = raw
                .get("msg")
                .or_else(|| raw.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            warn!("GCCPAY rejected request: {} {}", code, msg);
            return Err(SmsError::Provider(format!("{}: {}", code, msg)));
        }

        let id = sms_core::fallback_id();
        info!("SMS sent successfully via GCCPAY, request {}", id);
        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw,
        })
    }
}
