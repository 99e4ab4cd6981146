//! # UniSMS Provider
//!
//! UniSMS (apistd.com) `sms.message.send` backend for sms-sender.
//!
//! Authentication lives in the query string: `accessKeyId`, `algorithm`,
//! `timestamp` and `nonce` are sorted, url-encoded and signed with
//! HMAC-SHA256 keyed by the access key secret.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::{hex_hmac_sha256, nonce, percent_encode};
use sms_core::template::require_targets;
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "unisms";
const ACTION: &str = "sms.message.send";
const ALGORITHM: &str = "hmac-sha256";

/// UniSMS client.
#[derive(Clone, Debug)]
pub struct UnismsClient {
    access_key_id: String,
    access_key_secret: String,
    signature: String,
    template_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl UnismsClient {
    pub fn new<S: Into<String>>(
        access_key_id: S,
        access_key_secret: S,
        signature: S,
        template_id: S,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            signature: signature.into(),
            template_id: template_id.into(),
            base_url: "https://uni.apistd.com".to_string(),
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

/// Signed authentication query (without `action`), sorted by key.
pub fn signed_query(
    access_key_id: &str,
    access_key_secret: &str,
    timestamp: i64,
    nonce: &str,
) -> BTreeMap<&'static str, String> {
    let mut query = BTreeMap::from([
        ("accessKeyId", access_key_id.to_string()),
        ("algorithm", ALGORITHM.to_string()),
        ("nonce", nonce.to_string()),
        ("timestamp", timestamp.to_string()),
    ]);
    let string_to_sign = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    query.insert(
        "signature",
        hex_hmac_sha256(access_key_secret.as_bytes(), string_to_sign.as_bytes()),
    );
    query
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UniSendRequest<'a> {
    to: &'a [&'a str],
    signature: &'a str,
    template_id: &'a str,
    template_data: &'a TemplateParams,
}

#[derive(Debug, Deserialize)]
struct UniResponse {
    code: String,
    #[serde(default)]
    message: String,
    data: Option<UniData>,
}

#[derive(Debug, Deserialize)]
struct UniData {
    #[serde(default)]
    messages: Vec<UniMessage>,
}

#[derive(Debug, Deserialize)]
struct UniMessage {
    id: Option<String>,
}

#[async_trait]
impl SmsClient for UnismsClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;

        let query = signed_query(
            &self.access_key_id,
            &self.access_key_secret,
            datetime::now_unix(),
            &nonce(8),
        );
        let body = UniSendRequest {
            to,
            signature: &self.signature,
            template_id: &self.template_id,
            template_data: req.params,
        };
        debug!(
            "Sending UniSMS template {} to {} recipient(s)",
            self.template_id,
            to.len()
        );

        let res = self
            .http
            .post(format!("{}/", self.base_url.trim_end_matches('/')))
            .query(&[("action", ACTION)])
            .query(&query)
            .json(&body)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let parsed: UniResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => return Err(sms_core::status_error(status, &raw_text)),
        };

        if parsed.code != "0" {
            warn!("UniSMS send failed: [{}] {}", parsed.code, parsed.message);
            // 1041xx codes are access key / signature failures.
            return Err(if parsed.code.starts_with("1041") {
                SmsError::Auth(format!("[{}] {}", parsed.code, parsed.message))
            } else {
                SmsError::Provider(parsed.message)
            });
        }

        let id = parsed
            .data
            .and_then(|d| d.messages.into_iter().find_map(|m| m.id))
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via UniSMS with id: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}
