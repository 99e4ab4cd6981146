//! # Tencent Cloud SMS Provider
//!
//! Tencent Cloud SMS (`SendSms`, API version 2021-01-11) backend for sms-sender.
//!
//! Template parameters are positional: the adapter reads `"0"`, `"1"`, ... from
//! the request parameters and sends them as `TemplateParamSet`. Requests are
//! signed with TC3-HMAC-SHA256.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use sms_core::template::{positional, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "tencent";
const SERVICE: &str = "sms";
const ACTION: &str = "SendSms";
const API_VERSION: &str = "2021-01-11";
const DEFAULT_REGION: &str = "ap-guangzhou";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Tencent Cloud SMS client.
#[derive(Clone, Debug)]
pub struct TencentClient {
    secret_id: String,
    secret_key: String,
    sign_name: String,
    template_id: String,
    sdk_app_id: String,
    region: String,
    /// API base URL; override for testing/mocking.
    base_url: String,
    http: reqwest::Client,
}

impl TencentClient {
    pub fn new<S: Into<String>>(
        secret_id: S,
        secret_key: S,
        sign_name: S,
        template_id: S,
        sdk_app_id: S,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            sign_name: sign_name.into(),
            template_id: template_id.into(),
            sdk_app_id: sdk_app_id.into(),
            region: DEFAULT_REGION.to_string(),
            base_url: "https://sms.tencentcloudapi.com".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
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

/// Build the TC3-HMAC-SHA256 `Authorization` header for a JSON POST to `/`.
pub fn tc3_authorization(
    secret_id: &str,
    secret_key: &str,
    host: &str,
    service: &str,
    timestamp: i64,
    payload: &str,
) -> Result<String, SmsError> {
    let date = datetime::format(datetime::from_unix(timestamp)?, datetime::DATE_DASHED);

    let signed_headers = "content-type;host";
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        host,
        signed_headers,
        hex_sha256(payload.as_bytes())
    );
    let scope = format!("{}/{}/tc3_request", date, service);
    let string_to_sign = format!(
        "TC3-HMAC-SHA256\n{}\n{}\n{}",
        timestamp,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(format!("TC3{}", secret_key).as_bytes(), date.as_bytes());
    let secret_service = hmac_sha256(&secret_date, service.as_bytes());
    let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
    let signature = hex_hmac_sha256(&secret_signing, string_to_sign.as_bytes());

    Ok(format!(
        "TC3-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        secret_id, scope, signed_headers, signature
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TencentSendRequest<'a> {
    phone_number_set: &'a [&'a str],
    sms_sdk_app_id: &'a str,
    sign_name: &'a str,
    template_id: &'a str,
    template_param_set: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TencentEnvelope {
    response: TencentResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TencentResponse {
    #[serde(default)]
    send_status_set: Vec<SendStatus>,
    error: Option<TencentError>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendStatus {
    serial_no: Option<String>,
    phone_number: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TencentError {
    code: String,
    message: String,
}

#[async_trait]
impl SmsClient for TencentClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let payload = TencentSendRequest {
            phone_number_set: to,
            sms_sdk_app_id: &self.sdk_app_id,
            sign_name: &self.sign_name,
            template_id: &self.template_id,
            template_param_set: positional(req.params),
        };
        let body = serde_json::to_string(&payload).map_err(|e| SmsError::Invalid(e.to_string()))?;

        let host = sms_core::host_header(&self.base_url)?;
        let timestamp = datetime::now_unix();
        let authorization = tc3_authorization(
            &self.secret_id,
            &self.secret_key,
            &host,
            SERVICE,
            timestamp,
            &body,
        )?;
        debug!(
            "Sending Tencent SMS template {} with {} parameter(s) to {} recipient(s)",
            self.template_id,
            payload.template_param_set.len(),
            to.len()
        );

        let res = self
            .http
            .post(&self.base_url)
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-TC-Action", ACTION)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", &self.region)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            return Err(sms_core::status_error(status, &body));
        }

        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let envelope: TencentEnvelope = serde_json::from_str(&raw_text)
            .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
        let response = envelope.response;

        if let Some(err) = response.error {
            warn!("Tencent SendSms failed: {} {}", err.code, err.message);
            return Err(if err.code.starts_with("AuthFailure") {
                SmsError::Auth(err.message)
            } else {
                SmsError::Provider(format!("{}: {}", err.code, err.message))
            });
        }

        let failures: Vec<String> = response
            .send_status_set
            .iter()
            .filter(|s| s.code.as_deref().is_some_and(|c| c != "Ok"))
            .map(|s| {
                format!(
                    "{}: {}",
                    s.phone_number.as_deref().unwrap_or_default(),
                    s.message.as_deref().unwrap_or_default()
                )
            })
            .collect();
        if !failures.is_empty() {
            warn!("Tencent SendSms rejected recipients: {:?}", failures);
            return Err(SmsError::Provider(failures.join("|")));
        }

        let id = response
            .send_status_set
            .iter()
            .find_map(|s| s.serial_no.clone())
            .or(response.request_id)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Tencent with SerialNo: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}
