//! # UCloud SMS Provider
//!
//! UCloud USMS (`SendUSMSMessage`) backend for sms-sender.
//!
//! UCloud signs the flat parameter map: keys are sorted, every `key + value`
//! is concatenated, the private key is appended and the SHA-1 hex digest of
//! that string becomes the `Signature` parameter.

use async_trait::async_trait;
use serde::Deserialize;
use sms_core::sign::hex_sha1;
use sms_core::template::{require_code, require_targets};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "ucloud";
const ACTION: &str = "SendUSMSMessage";

/// UCloud USMS client.
#[derive(Clone, Debug)]
pub struct UcloudClient {
    public_key: String,
    private_key: String,
    sign: String,
    template_id: String,
    project_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl UcloudClient {
    pub fn new<S: Into<String>>(
        public_key: S,
        private_key: S,
        sign: S,
        template_id: S,
        project_id: S,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
            sign: sign.into(),
            template_id: template_id.into(),
            project_id: project_id.into(),
            base_url: "https://api.ucloud.cn".to_string(),
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

    fn params(&self, code: &str, to: &[&str]) -> BTreeMap<String, String> {
        let mut params = BTreeMap::from([
            ("Action".to_string(), ACTION.to_string()),
            ("ProjectId".to_string(), self.project_id.clone()),
            ("PublicKey".to_string(), self.public_key.clone()),
            ("SigContent".to_string(), self.sign.clone()),
            ("TemplateId".to_string(), self.template_id.clone()),
            ("TemplateParams.0".to_string(), code.to_string()),
        ]);
        for (i, number) in to.iter().enumerate() {
            params.insert(format!("PhoneNumbers.{}", i), number.to_string());
        }
        params
    }
}

pub fn signature(params: &BTreeMap<String, String>, private_key: &str) -> String {
    let mut content: String = params.iter().map(|(k, v)| format!("{}{}", k, v)).collect();
    content.push_str(private_key);
    hex_sha1(content.as_bytes())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UcloudResponse {
    ret_code: i64,
    #[serde(default)]
    message: String,
    session_no: Option<String>,
}

#[async_trait]
impl SmsClient for UcloudClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;

        let mut params = self.params(code, to);
        let signature = signature(&params, &self.private_key);
        params.insert("Signature".to_string(), signature);
        debug!(
            "Sending UCloud USMS template {} to {} recipient(s)",
            self.template_id,
            to.len()
        );

        let res = self
            .http
            .post(&self.base_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let parsed: UcloudResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => return Err(sms_core::status_error(status, &raw_text)),
        };

        if parsed.ret_code != 0 {
            warn!(
                "UCloud SendUSMSMessage failed: {} {}",
                parsed.ret_code, parsed.message
            );
            // 171: bad signature, 172: unknown public key
            return Err(match parsed.ret_code {
                171 | 172 => SmsError::Auth(parsed.message),
                _ => SmsError::Provider(parsed.message),
            });
        }

        let id = parsed.session_no.unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via UCloud with SessionNo: {}", id);
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
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> UcloudClient {
        UcloudClient::new("pub", "priv", "Sign", "UTA1", "org-1")
    }

    fn code() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "1234".to_string())])
    }

    #[test]
    fn signature_matches_reference_vector() {
        let params = client().params("1234", &["13800000000", "13900000000"]);
        assert_eq!(
            signature(&params, "priv"),
            "a407efc2ec490f83c3cb167b48171e3d97194253"
        );
    }

    #[tokio::test]
    async fn sends_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=SendUSMSMessage"))
            .and(body_string_contains("PhoneNumbers.0=13800000000"))
            .and(body_string_contains("TemplateParams.0=1234"))
            .and(body_string_contains("Signature="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Action": "SendUSMSMessageResponse",
                "RetCode": 0,
                "SessionNo": "6a9f8b2c-0000-0000-0000-000000000000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client().with_base_url(server.uri());
        let p = code();
        let res = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap();
        assert_eq!(res.id, "6a9f8b2c-0000-0000-0000-000000000000");
    }

    #[tokio::test]
    async fn ret_code_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Action": "SendUSMSMessageResponse",
                "RetCode": 215,
                "Message": "Template not found"
            })))
            .mount(&server)
            .await;

        let client = client().with_base_url(server.uri());
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Provider(ref m) if m == "Template not found"));
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client().with_base_url(server.uri());
        let p = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let err = client.send(SendRequest::new(&p, &[])).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }

    #[tokio::test]
    async fn missing_code_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client().with_base_url(server.uri());
        let p = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "missing parameter: code"));
    }
}
