//! # SmsBao SMS Provider
//!
//! smsbao.com HTTP interface for sms-sender. Every mobile gets its own `GET /sms`
//! request and the plain-text response body is a status code: `0` on success.

use async_trait::async_trait;
use sms_core::template::{fill_code, require_code, require_targets};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "smsbao";
const SUCCESS: &str = "0";

/// SmsBao client.
#[derive(Clone, Debug)]
pub struct SmsBaoClient {
    username: String,
    api_key: String,
    sign: String,
    template: String,
    /// Product id for dedicated channels; empty for the default channel.
    goods_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl SmsBaoClient {
    pub fn new<S: Into<String>>(username: S, api_key: S, sign: S, template: S) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            sign: sign.into(),
            template: template.into(),
            goods_id: String::new(),
            base_url: "https://api.smsbao.com".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_goods_id(mut self, goods_id: impl Into<String>) -> Self {
        self.goods_id = goods_id.into();
        self
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

/// Human readable text for a SmsBao status code, `None` for unknown codes.
pub fn status_message(code: &str) -> Option<&'static str> {
    match code {
        "30" => Some("password error"),
        "40" => Some("account not exist"),
        "41" => Some("overdue account"),
        "43" => Some("IP address limit"),
        "50" => Some("content contain forbidden words"),
        "51" => Some("phone number incorrect"),
        _ => None,
    }
}

#[async_trait]
impl SmsClient for SmsBaoClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;

        let content = format!("【{}】{}", self.sign, fill_code(&self.template, code));
        let url = format!("{}/sms", self.base_url.trim_end_matches('/'));

        let mut raws = Vec::with_capacity(to.len());
        for mobile in to {
            debug!("Sending SmsBao SMS to {}", mobile);
            let res = self
                .http
                .get(&url)
                .query(&[
                    ("u", self.username.as_str()),
                    ("p", self.api_key.as_str()),
                    ("g", self.goods_id.as_str()),
                    ("m", *mobile),
                    ("c", content.as_str()),
                ])
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let body = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            if !status.is_success() {
                return Err(sms_core::status_error(status, &body));
            }

            let body = body.trim();
            if body != SUCCESS {
                warn!("SmsBao rejected {}: {}", mobile, body);
                return Err(match body {
                    "30" => SmsError::Auth("password error".into()),
                    other => SmsError::Provider(
                        status_message(other)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("unknown status: {}", other)),
                    ),
                });
            }
            raws.push(serde_json::Value::String(body.to_string()));
        }

        info!("SMS sent successfully via SmsBao to {} recipient(s)", raws.len());
        Ok(SendResponse {
            id: sms_core::fallback_id(),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}
