//! # OSON SMS Provider
//!
//! OSON SMS (`sendsms_v1.php`) backend for sms-sender.
//!
//! Each number is sent with its own transaction id and
//! `str_hash = sha256_hex("txn_id;login;from;phone_number;hash")`.

use async_trait::async_trait;
use serde::Deserialize;
use sms_core::sign::hex_sha256;
use sms_core::template::{require_targets, CODE};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use tracing::{debug, info, warn};

const PROVIDER: &str = "oson";
const DEFAULT_MESSAGE: &str = "Hello. Your authorization code: ";

/// OSON SMS client.
#[derive(Clone, Debug)]
pub struct OsonClient {
    login: String,
    secret_hash: String,
    /// Sender name shown to the recipient (`from`).
    sign: String,
    message: String,
    base_url: String,
    http: reqwest::Client,
}

impl OsonClient {
    pub fn new<S: Into<String>>(login: S, secret_hash: S, sign: S, message: S) -> Self {
        Self {
            login: login.into(),
            secret_hash: secret_hash.into(),
            sign: sign.into(),
            message: message.into(),
            base_url: "https://api.osonsms.com".to_string(),
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

    /// Message text: the configured prefix (or a default greeting) followed by the code.
    pub fn message(&self, params: &TemplateParams) -> String {
        let code = params.get(CODE).map(String::as_str).unwrap_or_default();
        if self.message.is_empty() {
            format!("{}{}", DEFAULT_MESSAGE, code)
        } else {
            format!("{}{}", self.message, code)
        }
    }
}

pub fn str_hash(txn_id: &str, login: &str, from: &str, phone: &str, secret_hash: &str) -> String {
    hex_sha256([txn_id, login, from, phone, secret_hash].join(";").as_bytes())
}

#[derive(Debug, Deserialize)]
struct OsonResponse {
    status: Option<String>,
    msg_id: Option<serde_json::Value>,
    error: Option<OsonError>,
}

#[derive(Debug, Deserialize)]
struct OsonError {
    code: Option<i64>,
    msg: Option<String>,
}

#[async_trait]
impl SmsClient for OsonClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let message = self.message(req.params);
        let url = format!("{}/sendsms_v1.php", self.base_url.trim_end_matches('/'));

        let mut ids = Vec::with_capacity(to.len());
        let mut raws = Vec::with_capacity(to.len());
        for phone in to {
            let txn_id = uuid::Uuid::new_v4().to_string();
            let hash = str_hash(&txn_id, &self.login, &self.sign, phone, &self.secret_hash);
            debug!("Sending OSON SMS to {} with txn_id {}", phone, txn_id);

            let res = self
                .http
                .get(&url)
                .query(&[
                    ("from", self.sign.as_str()),
                    ("phone_number", *phone),
                    ("msg", message.as_str()),
                    ("str_hash", hash.as_str()),
                    ("txn_id", txn_id.as_str()),
                    ("login", self.login.as_str()),
                ])
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            let parsed: OsonResponse = match serde_json::from_str(&raw_text) {
                Ok(parsed) => parsed,
                Err(_) => return Err(sms_core::status_error(status, &raw_text)),
            };

            if parsed.status.as_deref() != Some("ok") {
                warn!("OSON rejected {}: HTTP {}", phone, status);
                return Err(match parsed.error {
                    Some(OsonError {
                        code: Some(code),
                        msg: Some(msg),
                    }) => SmsError::Provider(format!("{}: {}", code, msg)),
                    Some(OsonError { msg: Some(msg), .. }) => SmsError::Provider(msg),
                    _ => SmsError::Provider(format!(
                        "status code: {}, body: {}",
                        status.as_u16(),
                        raw_text
                    )),
                });
            }

            ids.push(match parsed.msg_id {
                Some(serde_json::Value::String(id)) => id,
                Some(serde_json::Value::Number(id)) => id.to_string(),
                _ => txn_id,
            });
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via OSON to {} recipient(s)", ids.len());
        Ok(SendResponse {
            id: ids.swap_remove(0),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}
