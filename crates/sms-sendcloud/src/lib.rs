//! # SendCloud SMS Provider
//!
//! SendCloud `smsapi/send` backend for sms-sender.
//!
//! The form is signed with `sha256_hex(urlencode(sorted params) + "&key=" + sms_key)`
//! and may address at most [`MAX_RECEIVERS`] numbers.

use async_trait::async_trait;
use serde::Deserialize;
use sms_core::sign::hex_sha256;
use sms_core::template::join_numbers;
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "sendcloud";
const SEND_PATH: &str = "/smsapi/send";

/// Largest recipient list a single request accepts.
pub const MAX_RECEIVERS: usize = 100;

/// SendCloud client.
#[derive(Clone, Debug)]
pub struct SendCloudClient {
    sms_user: String,
    sms_key: String,
    template_id: u32,
    /// 0 for SMS, 1 for MMS, 2 for international SMS.
    msg_type: u8,
    base_url: String,
    http: reqwest::Client,
}

impl SendCloudClient {
    /// `template_id` must be the numeric id assigned by SendCloud.
    pub fn new<S: Into<String>>(sms_user: S, sms_key: S, template_id: S) -> Result<Self, SmsError> {
        let template_id = template_id
            .into()
            .parse()
            .map_err(|_| SmsError::Invalid("template id should be number".into()))?;
        Ok(Self {
            sms_user: sms_user.into(),
            sms_key: sms_key.into(),
            template_id,
            msg_type: 0,
            base_url: "https://api.sendcloud.net".to_string(),
            http: reqwest::Client::new(),
        })
    }

    pub fn with_msg_type(mut self, msg_type: u8) -> Self {
        self.msg_type = msg_type;
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

    fn validate(&self, to: &[&str]) -> Result<(), SmsError> {
        if self.template_id == 0 {
            return Err(SmsError::Invalid("templateId cannot be zero".into()));
        }
        if to.is_empty() {
            return Err(SmsError::Invalid("phone cannot be empty".into()));
        }
        if to.len() > MAX_RECEIVERS {
            return Err(SmsError::Invalid(format!(
                "too many receivers: {} > {}",
                to.len(),
                MAX_RECEIVERS
            )));
        }
        Ok(())
    }

    fn params(
        &self,
        vars: &TemplateParams,
        to: &[&str],
        timestamp: i64,
    ) -> Result<BTreeMap<&'static str, String>, SmsError> {
        let mut params = BTreeMap::from([
            ("smsUser", self.sms_user.clone()),
            ("msgType", self.msg_type.to_string()),
            ("phone", join_numbers(to)),
            ("templateId", self.template_id.to_string()),
            ("timestamp", timestamp.to_string()),
        ]);
        if !vars.is_empty() {
            params.insert(
                "vars",
                serde_json::to_string(vars).map_err(|e| SmsError::Invalid(e.to_string()))?,
            );
        }
        Ok(params)
    }
}

/// Request signature over the already sorted parameters.
pub fn signature(params: &BTreeMap<&str, String>, key: &str) -> Result<String, SmsError> {
    let encoded =
        serde_urlencoded::to_string(params).map_err(|e| SmsError::Invalid(e.to_string()))?;
    Ok(hex_sha256(format!("{}&key={}", encoded, key).as_bytes()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCloudResponse {
    result: bool,
    status_code: Option<i64>,
    #[serde(default)]
    message: String,
    info: Option<serde_json::Value>,
}

#[async_trait]
impl SmsClient for SendCloudClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        self.validate(req.to)?;

        let mut params = self.params(req.params, req.to, datetime::now_unix_millis())?;
        let signature = signature(&params, &self.sms_key)?;
        params.insert("signature", signature);
        debug!(
            "Sending SendCloud template {} to {} recipient(s)",
            self.template_id,
            req.to.len()
        );

        let res = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), SEND_PATH))
            .form(&params)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(sms_core::status_error(status, &raw_text));
        }

        let parsed: SendCloudResponse = serde_json::from_str(&raw_text)
            .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
        if !parsed.result {
            warn!(
                "SendCloud rejected request: {:?} {}",
                parsed.status_code, parsed.message
            );
            return Err(SmsError::Provider(parsed.message));
        }

        let id = parsed
            .info
            .as_ref()
            .and_then(|info| info.get("smsIds"))
            .and_then(|ids| ids.get(0))
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via SendCloud with smsId: {}", id);

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
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn code() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "1".to_string())])
    }

    #[test]
    fn signature_matches_reference_vector() {
        let client = SendCloudClient::new("user", "key", "1234").unwrap();
        let params = client
            .params(&code(), &["13800000000", "13900000000"], 1_700_000_000_000)
            .unwrap();
        assert_eq!(
            signature(&params, "key").unwrap(),
            "ec81d93a7c6e87bd16ee95aa1d7be8081168685c11d963f8cd6a55d5c9df657b"
        );
    }

    #[test]
    fn template_must_be_numeric() {
        let err = SendCloudClient::new("user", "key", "abc").unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }

    #[tokio::test]
    async fn receivers_are_validated() {
        let client = SendCloudClient::new("user", "key", "0").unwrap();
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "templateId cannot be zero"));

        let client = SendCloudClient::new("user", "key", "1234").unwrap();
        let numbers: Vec<String> = (0..101).map(|i| format!("1380000{:04}", i)).collect();
        let to: Vec<&str> = numbers.iter().map(String::as_str).collect();
        let err = client.send(SendRequest::new(&p, &to)).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }

    #[tokio::test]
    async fn sends_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/smsapi/send"))
            .and(body_string_contains("smsUser=user"))
            .and(body_string_contains("templateId=1234"))
            .and(body_string_contains("signature="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": true,
                "statusCode": 200,
                "message": "请求成功",
                "info": {"successCount": 1, "smsIds": ["1700000000000_15_1_0_abc$13800000000"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SendCloudClient::new("user", "key", "1234")
            .unwrap()
            .with_base_url(server.uri());
        let p = code();
        let res = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap();
        assert_eq!(res.id, "1700000000000_15_1_0_abc$13800000000");
    }

    #[tokio::test]
    async fn failed_result_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": false, "statusCode": 412, "message": "手机号格式错误", "info": {}
            })))
            .mount(&server)
            .await;

        let client = SendCloudClient::new("user", "key", "1234")
            .unwrap()
            .with_base_url(server.uri());
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Provider(ref m) if m == "手机号格式错误"));
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SendCloudClient::new("user", "key", "1234")
            .unwrap()
            .with_base_url(server.uri());
        let p = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let err = client.send(SendRequest::new(&p, &[])).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }
}
