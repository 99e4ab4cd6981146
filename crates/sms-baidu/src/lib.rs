//! # Baidu Cloud SMS Provider
//!
//! Baidu AI Cloud SMS v3 (`POST /api/v3/sendSms`) backend for sms-sender.
//!
//! Requests are signed with `bce-auth-v1`:
//!
//! 1. `signing_key = hex(hmac_sha256(sk, "bce-auth-v1/{ak}/{timestamp}/{expiration}"))`
//! 2. the canonical request is `METHOD\nURI\nQUERY\nHEADERS` where only `host`
//!    and `x-bce-date` are signed
//! 3. `signature = hex(hmac_sha256(signing_key, canonical_request))`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::{hex_hmac_sha256, percent_encode};
use sms_core::template::{join_numbers, require_code, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "baidu";
const SUCCESS_CODE: &str = "1000";
const EXPIRATION_SECONDS: u32 = 1800;
const SEND_PATH: &str = "/api/v3/sendSms";

/// Baidu Cloud SMS client.
#[derive(Clone, Debug)]
pub struct BaiduClient {
    access_key_id: String,
    secret_access_key: String,
    /// Signature id registered in the console.
    signature_id: String,
    template: String,
    endpoint: String,
    http: reqwest::Client,
}

impl BaiduClient {
    /// `endpoint` is the regional host, e.g. `smsv3.bj.baidubce.com`; a scheme
    /// is optional and defaults to https.
    pub fn new<S: Into<String>>(
        access_key_id: S,
        secret_access_key: S,
        signature_id: S,
        template: S,
        endpoint: S,
    ) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.contains("://") {
            endpoint
        } else {
            format!("https://{}", endpoint)
        };
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            signature_id: signature_id.into(),
            template: template.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Compute the `Authorization` header for a request with the given signed headers.
///
/// Header names must already be lowercase.
pub fn bce_authorization(
    access_key_id: &str,
    secret_access_key: &str,
    method: &str,
    path: &str,
    signed_headers: &BTreeMap<&str, &str>,
    timestamp: &str,
) -> String {
    let auth_prefix = format!(
        "bce-auth-v1/{}/{}/{}",
        access_key_id, timestamp, EXPIRATION_SECONDS
    );
    let signing_key = hex_hmac_sha256(secret_access_key.as_bytes(), auth_prefix.as_bytes());

    let canonical_uri = path
        .split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/");
    let mut canonical_headers = signed_headers
        .iter()
        .map(|(k, v)| format!("{}:{}", percent_encode(k), percent_encode(v.trim())))
        .collect::<Vec<_>>();
    canonical_headers.sort();

    let canonical_request = format!(
        "{}\n{}\n\n{}",
        method,
        canonical_uri,
        canonical_headers.join("\n")
    );
    let signature = hex_hmac_sha256(signing_key.as_bytes(), canonical_request.as_bytes());
    let header_names = signed_headers.keys().copied().collect::<Vec<_>>().join(";");

    format!("{}/{}/{}", auth_prefix, header_names, signature)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BaiduSendRequest<'a> {
    mobile: String,
    template: &'a str,
    signature_id: &'a str,
    content_var: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct BaiduResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<BaiduSendResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaiduSendResult {
    code: Option<String>,
    mobile: Option<String>,
    message: Option<String>,
    message_id: Option<String>,
}

#[async_trait]
impl SmsClient for BaiduClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;

        let body = BaiduSendRequest {
            mobile: join_numbers(to),
            template: &self.template,
            signature_id: &self.signature_id,
            content_var: BTreeMap::from([("code", code)]),
        };
        let host = sms_core::host_header(&self.endpoint)?;
        let timestamp = datetime::format(datetime::now(), datetime::ISO8601);
        let authorization = bce_authorization(
            &self.access_key_id,
            &self.secret_access_key,
            "POST",
            SEND_PATH,
            &BTreeMap::from([("host", host.as_str()), ("x-bce-date", timestamp.as_str())]),
            &timestamp,
        );
        debug!(
            "Sending Baidu SMS template {} to {} recipient(s)",
            self.template,
            to.len()
        );

        let res = self
            .http
            .post(format!("{}{}", self.endpoint, SEND_PATH))
            .header("host", &host)
            .header("x-bce-date", &timestamp)
            .header("Authorization", authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let parsed: BaiduResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => return Err(sms_core::status_error(status, &raw_text)),
        };

        if parsed.code != SUCCESS_CODE {
            warn!("Baidu sendSms failed: {} {}", parsed.code, parsed.message);
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    SmsError::Auth(parsed.message)
                }
                _ => SmsError::Provider(format!("{}: {}", parsed.code, parsed.message)),
            });
        }

        let rejected: Vec<String> = parsed
            .data
            .iter()
            .filter(|d| d.code.as_deref().is_some_and(|c| c != SUCCESS_CODE))
            .map(|d| {
                format!(
                    "{}: {}",
                    d.mobile.as_deref().unwrap_or_default(),
                    d.message.as_deref().unwrap_or_default()
                )
            })
            .collect();
        if !rejected.is_empty() {
            warn!("Baidu rejected recipients: {:?}", rejected);
            return Err(SmsError::Provider(rejected.join("|")));
        }

        let id = parsed
            .data
            .into_iter()
            .find_map(|d| d.message_id)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Baidu with messageId: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}
