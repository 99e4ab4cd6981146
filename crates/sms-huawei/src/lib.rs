//! # Huawei Cloud SMS Provider
//!
//! Huawei Cloud Message & SMS (`batchSendSms/v1`) backend for sms-sender.
//!
//! Authentication uses the WSSE `UsernameToken` profile: the `X-WSSE` header
//! carries a fresh nonce, the creation time and
//! `base64(sha256(nonce + created + app_secret))`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::base64_sha256;
use sms_core::template::{join_numbers, require_code, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "huawei";
const AUTH_HEADER_VALUE: &str = r#"WSSE realm="SDP",profile="UsernameToken",type="Appkey""#;
const SUCCESS_CODE: &str = "000000";

/// Huawei Cloud SMS client.
#[derive(Clone, Debug)]
pub struct HuaweiClient {
    app_key: String,
    app_secret: String,
    signature: String,
    template_id: String,
    /// Channel number the messages are sent from.
    sender: String,
    /// Full `batchSendSms` endpoint derived from the API address.
    api_url: String,
    http: reqwest::Client,
}

impl HuaweiClient {
    /// `api_address` is the application access address from the console, e.g.
    /// `https://smsapi.cn-north-4.myhuaweicloud.com:443`.
    pub fn new<S: Into<String>>(
        app_key: S,
        app_secret: S,
        signature: S,
        template_id: S,
        api_address: S,
        sender: S,
    ) -> Self {
        let api_address = api_address.into();
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            signature: signature.into(),
            template_id: template_id.into(),
            sender: sender.into(),
            api_url: format!(
                "{}/sms/batchSendSms/v1",
                api_address.trim_end_matches('/')
            ),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// `X-WSSE` header value for the given nonce and creation time.
pub fn wsse_header(app_key: &str, app_secret: &str, nonce: &str, created: &str) -> String {
    let digest = base64_sha256(format!("{}{}{}", nonce, created, app_secret).as_bytes());
    format!(
        r#"UsernameToken Username="{}",PasswordDigest="{}",Nonce="{}",Created="{}""#,
        app_key, digest, nonce, created
    )
}

#[derive(Debug, Serialize)]
struct HuaweiForm<'a> {
    from: &'a str,
    to: String,
    #[serde(rename = "templateId")]
    template_id: &'a str,
    #[serde(rename = "templateParas")]
    template_paras: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct HuaweiResponse {
    code: String,
    description: Option<String>,
    #[serde(default)]
    result: Vec<HuaweiResult>,
}

#[derive(Debug, Deserialize)]
struct HuaweiResult {
    #[serde(rename = "smsMsgId")]
    sms_msg_id: Option<String>,
    #[serde(rename = "originTo")]
    origin_to: Option<String>,
    status: Option<String>,
}

#[async_trait]
impl SmsClient for HuaweiClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;

        let form = HuaweiForm {
            from: &self.sender,
            to: join_numbers(to),
            template_id: &self.template_id,
            template_paras: serde_json::to_string(&[code])
                .map_err(|e| SmsError::Invalid(e.to_string()))?,
            signature: &self.signature,
        };
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let created = datetime::format(datetime::now(), datetime::ISO8601);
        debug!(
            "Sending Huawei SMS template {} to {} recipient(s)",
            self.template_id,
            to.len()
        );

        let res = self
            .http
            .post(&self.api_url)
            .header("Authorization", AUTH_HEADER_VALUE)
            .header(
                "X-WSSE",
                wsse_header(&self.app_key, &self.app_secret, &nonce, &created),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let parsed: HuaweiResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => return Err(sms_core::status_error(status, &raw_text)),
        };

        if parsed.code != SUCCESS_CODE {
            let description = parsed.description.unwrap_or_default();
            warn!("Huawei batchSendSms failed: {} {}", parsed.code, description);
            return Err(if status == reqwest::StatusCode::UNAUTHORIZED {
                SmsError::Auth(description)
            } else {
                SmsError::Provider(format!("{}: {}", parsed.code, description))
            });
        }

        let rejected: Vec<String> = parsed
            .result
            .iter()
            .filter(|r| r.status.as_deref().is_some_and(|s| s != SUCCESS_CODE))
            .map(|r| {
                format!(
                    "{}: {}",
                    r.origin_to.as_deref().unwrap_or_default(),
                    r.status.as_deref().unwrap_or_default()
                )
            })
            .collect();
        if !rejected.is_empty() {
            warn!("Huawei rejected recipients: {:?}", rejected);
            return Err(SmsError::Provider(rejected.join("|")));
        }

        let id = parsed
            .result
            .into_iter()
            .find_map(|r| r.sms_msg_id)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Huawei with smsMsgId: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}
