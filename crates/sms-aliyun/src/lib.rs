//! # Aliyun SMS Provider
//!
//! Alibaba Cloud Dysmsapi (`SendSms`, API version 2017-05-25) backend for sms-sender.
//!
//! Requests use the RPC signature scheme: every parameter is percent-encoded,
//! sorted, joined and signed with HMAC-SHA1 keyed by `AccessKeySecret&`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_aliyun::AliyunClient;
//! use sms_core::{SendRequest, SmsClient, TemplateParams};
//!
//! let client = AliyunClient::new("access_id", "access_secret", "MySign", "SMS_123456");
//! let params = TemplateParams::from([("code".to_string(), "123456".to_string())]);
//! client.send(SendRequest::new(&params, &["13800000000"])).await?;
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use sms_core::sign::{base64_hmac_sha1, percent_encode};
use sms_core::template::{join_numbers, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "aliyun";
const DEFAULT_REGION: &str = "cn-hangzhou";
const API_VERSION: &str = "2017-05-25";

/// Aliyun Dysmsapi client.
#[derive(Clone, Debug)]
pub struct AliyunClient {
    access_key_id: String,
    access_key_secret: String,
    sign_name: String,
    template_code: String,
    region: String,
    /// API base URL; override for testing/mocking.
    base_url: String,
    http: reqwest::Client,
}

impl AliyunClient {
    pub fn new<S: Into<String>>(
        access_key_id: S,
        access_key_secret: S,
        sign_name: S,
        template_code: S,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            sign_name: sign_name.into(),
            template_code: template_code.into(),
            region: DEFAULT_REGION.to_string(),
            base_url: "https://dysmsapi.aliyuncs.com".to_string(),
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

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Build the full, signed parameter set for one `SendSms` call.
    fn signed_params(
        &self,
        phone_numbers: String,
        template_param: String,
        nonce: String,
        timestamp: String,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("AccessKeyId".to_string(), self.access_key_id.clone());
        params.insert("Action".to_string(), "SendSms".to_string());
        params.insert("Format".to_string(), "JSON".to_string());
        params.insert("PhoneNumbers".to_string(), phone_numbers);
        params.insert("RegionId".to_string(), self.region.clone());
        params.insert("SignName".to_string(), self.sign_name.clone());
        params.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
        params.insert("SignatureNonce".to_string(), nonce);
        params.insert("SignatureVersion".to_string(), "1.0".to_string());
        params.insert("TemplateCode".to_string(), self.template_code.clone());
        params.insert("TemplateParam".to_string(), template_param);
        params.insert("Timestamp".to_string(), timestamp);
        params.insert("Version".to_string(), API_VERSION.to_string());

        let signature = rpc_signature(&self.access_key_secret, "POST", &params);
        params.insert("Signature".to_string(), signature);
        params
    }
}

/// RPC signature v1.0 over an already sorted parameter set.
pub fn rpc_signature(secret: &str, method: &str, params: &BTreeMap<String, String>) -> String {
    let canonical = params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let string_to_sign = format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonical)
    );
    base64_hmac_sha1(format!("{}&", secret).as_bytes(), string_to_sign.as_bytes())
}

#[derive(Debug, Deserialize)]
struct AliyunSendResponse {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "BizId")]
    biz_id: Option<String>,
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
}

#[async_trait]
impl SmsClient for AliyunClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let template_param =
            serde_json::to_string(req.params).map_err(|e| SmsError::Invalid(e.to_string()))?;

        let params = self.signed_params(
            join_numbers(to),
            template_param,
            uuid::Uuid::new_v4().to_string(),
            datetime::format(datetime::now(), datetime::ISO8601),
        );
        debug!(
            "Sending Aliyun SMS template {} to {} recipient(s)",
            self.template_code,
            to.len()
        );

        let res = self
            .http
            .post(format!("{}/", self.base_url.trim_end_matches('/')))
            .form(&params)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        // Aliyun answers rejected requests with 4xx plus the same JSON envelope.
        let parsed: AliyunSendResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(sms_core::status_error(status, &raw_text));
            }
            Err(e) => {
                return Err(SmsError::Provider(format!("malformed response: {}", e)));
            }
        };

        if parsed.code.as_deref() != Some("OK") {
            let message = parsed
                .message
                .or(parsed.code)
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!("Aliyun SendSms rejected: {}", message);
            return Err(SmsError::Provider(message));
        }

        let id = parsed
            .biz_id
            .or(parsed.request_id)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Aliyun with BizId: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::TemplateParams;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "1234".to_string())])
    }

    #[test]
    fn signature_matches_reference_vector() {
        let mut p = BTreeMap::new();
        for (k, v) in [
            ("AccessKeyId", "testid"),
            ("Action", "SendSms"),
            ("Format", "XML"),
            ("OutId", "123"),
            ("PhoneNumbers", "15300000001"),
            ("RegionId", "cn-hangzhou"),
            ("SignName", "阿里云短信测试专用"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "45e25e9b-0a6f-4070-8c85-2956eda1b466"),
            ("SignatureVersion", "1.0"),
            ("TemplateCode", "SMS_71390007"),
            ("TemplateParam", r#"{"customer":"test"}"#),
            ("Timestamp", "2017-07-12T02:42:19Z"),
            ("Version", "2017-05-25"),
        ] {
            p.insert(k.to_string(), v.to_string());
        }
        assert_eq!(
            rpc_signature("testsecret", "GET", &p),
            "LxugEBqtL8lacmz/6I2QOoMzw+Y="
        );
        assert_eq!(
            rpc_signature("testsecret", "POST", &p),
            "ZGMzl3BUSQWysIxwVJlE/Dv+GXI="
        );
    }

    #[test]
    fn signed_params_carry_request_fields() {
        let client = AliyunClient::new("id", "secret", "Sign", "SMS_1").with_region("cn-shanghai");
        let p = client.signed_params(
            "1,2".into(),
            r#"{"code":"1234"}"#.into(),
            "nonce".into(),
            "2024-01-01T00:00:00Z".into(),
        );
        assert_eq!(p["PhoneNumbers"], "1,2");
        assert_eq!(p["RegionId"], "cn-shanghai");
        assert_eq!(p["TemplateParam"], r#"{"code":"1234"}"#);

        let mut unsigned = p.clone();
        let signature = unsigned.remove("Signature").unwrap();
        assert_eq!(signature, rpc_signature("secret", "POST", &unsigned));
    }

    #[tokio::test]
    async fn sends_and_reads_biz_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Action=SendSms"))
            .and(body_string_contains("PhoneNumbers=13800000000%2C13900000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Message": "OK",
                "RequestId": "req-1",
                "BizId": "biz-1",
                "Code": "OK"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AliyunClient::new("id", "secret", "Sign", "SMS_1").with_base_url(server.uri());
        let p = params();
        let res = client
            .send(SendRequest::new(&p, &["13800000000", "13900000000"]))
            .await
            .unwrap();
        assert_eq!(res.id, "biz-1");
        assert_eq!(res.provider, "aliyun");
    }

    #[tokio::test]
    async fn vendor_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "Message": "Specified signature is not matched with our calculation.",
                "RequestId": "req-2",
                "Code": "SignatureDoesNotMatch"
            })))
            .mount(&server)
            .await;

        let client = AliyunClient::new("id", "bad", "Sign", "SMS_1").with_base_url(server.uri());
        let p = params();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        match err {
            SmsError::Provider(msg) => assert!(msg.contains("signature is not matched")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = AliyunClient::new("id", "secret", "Sign", "SMS_1").with_base_url(server.uri());
        let p = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let err = client.send(SendRequest::new(&p, &[])).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }
}
