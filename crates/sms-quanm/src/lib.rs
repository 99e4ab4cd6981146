//! # Quanm SMS Provider
//!
//! quanmwl.com SMS backend for sms-sender. Every number is posted separately
//! with `sign = md5(openID + apiKey + tel)`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::hex_md5;
use sms_core::template::{require_code, require_targets};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROVIDER: &str = "quanm";
const SUCCESS_STATE: &str = "200";

/// Quanm SMS client.
#[derive(Clone, Debug)]
pub struct QuanmClient {
    open_id: String,
    api_key: String,
    /// Numeric template id as configured in the console.
    template_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl QuanmClient {
    pub fn new<S: Into<String>>(open_id: S, api_key: S, template_id: S) -> Self {
        Self {
            open_id: open_id.into(),
            api_key: api_key.into(),
            template_id: template_id.into(),
            base_url: "https://dev.quanmwl.com".to_string(),
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

pub fn sign(open_id: &str, api_key: &str, tel: &str) -> String {
    hex_md5(format!("{}{}{}", open_id, api_key, tel).as_bytes())
}

/// Description of a documented failure state.
pub fn state_message(state: &str) -> Option<&'static str> {
    Some(match state {
        "201" => "refusal to send due to security reasons",
        "202" => "account repeat",
        "203" => "server error,Please try again later",
        "205" => "illegal request",
        "207" => "insufficient balance",
        "208" => "verification failed",
        "209" => "insufficient permissions",
        "210" => "account frozen",
        "211" => "parameter too long",
        "212" => "insufficient permissions or using someone else's template",
        "213" => "status error",
        "215" => "content restricted",
        "216" => "content violation",
        _ => return None,
    })
}

#[derive(Debug, Serialize)]
struct QuanmForm<'a> {
    #[serde(rename = "openID")]
    open_id: &'a str,
    tel: &'a str,
    sign: String,
    mod_id: u32,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct QuanmResponse {
    state: serde_json::Value,
    #[serde(default)]
    mess: String,
}

#[async_trait]
impl SmsClient for QuanmClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;
        let mod_id: u32 = self
            .template_id
            .parse()
            .map_err(|_| SmsError::Invalid("template id error".into()))?;
        let data = serde_json::to_string(&BTreeMap::from([("code", code)]))
            .map_err(|e| SmsError::Invalid(e.to_string()))?;
        let url = format!("{}/v1/sms", self.base_url.trim_end_matches('/'));

        let mut raws = Vec::with_capacity(to.len());
        for tel in to {
            debug!("Sending Quanm SMS template {} to {}", mod_id, tel);
            let res = self
                .http
                .post(&url)
                .form(&QuanmForm {
                    open_id: &self.open_id,
                    tel,
                    sign: sign(&self.open_id, &self.api_key, tel),
                    mod_id,
                    data: &data,
                })
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            let parsed: QuanmResponse = match serde_json::from_str(&raw_text) {
                Ok(parsed) => parsed,
                Err(_) => return Err(sms_core::status_error(status, &raw_text)),
            };

            let state = match &parsed.state {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if state != SUCCESS_STATE {
                warn!("Quanm rejected {}: {} {}", tel, state, parsed.mess);
                let msg = state_message(&state)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}: {}", state, parsed.mess));
                return Err(if state == "208" {
                    SmsError::Auth(msg)
                } else {
                    SmsError::Provider(msg)
                });
            }
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via Quanm to {} recipient(s)", raws.len());
        Ok(SendResponse {
            id: sms_core::fallback_id(),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::TemplateParams;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn code() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "6543".to_string())])
    }

    #[test]
    fn sign_concatenates_openid_key_tel() {
        assert_eq!(
            sign("open", "key", "13800000000"),
            hex_md5(b"openkey13800000000")
        );
    }

    #[tokio::test]
    async fn posts_form_per_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sms"))
            .and(body_string_contains("openID=open"))
            .and(body_string_contains("mod_id=3"))
            .and(body_string_contains("data=%7B%22code%22%3A%226543%22%7D"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "200", "mess": "ok"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = QuanmClient::new("open", "key", "3").with_base_url(server.uri());
        let p = code();
        let res = client
            .send(SendRequest::new(&p, &["13800000000", "13900000000"]))
            .await
            .unwrap();
        assert_eq!(res.raw.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn documented_state_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": 207, "mess": "余额不足"
            })))
            .mount(&server)
            .await;

        let client = QuanmClient::new("open", "key", "3").with_base_url(server.uri());
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Provider(ref m) if m == "insufficient balance"));
    }

    #[tokio::test]
    async fn non_numeric_template_is_rejected() {
        let client = QuanmClient::new("open", "key", "abc");
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "template id error"));
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = QuanmClient::new("open", "key", "1").with_base_url(server.uri());
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

        let client = QuanmClient::new("open", "key", "1").with_base_url(server.uri());
        let p = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "missing parameter: code"));
    }
}
