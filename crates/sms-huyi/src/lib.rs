//! # Huyi SMS Provider
//!
//! ihuyi.com `Submit` backend for sms-sender. Each recipient gets its own
//! request whose `password` is the MD5 of
//! `account + apikey + mobile + content + time`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::hex_md5;
use sms_core::template::{fill_code, require_code, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "huyi";
const SUCCESS_CODE: i64 = 2;

/// Huyi SMS client.
#[derive(Clone, Debug)]
pub struct HuyiClient {
    app_id: String,
    app_key: String,
    template: String,
    /// API base URL; override for testing/mocking.
    base_url: String,
    http: reqwest::Client,
}

impl HuyiClient {
    pub fn new<S: Into<String>>(app_id: S, app_key: S, template: S) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            template: template.into(),
            base_url: "http://106.ihuyi.com".to_string(),
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

    fn form<'a>(&'a self, mobile: &'a str, content: &'a str, time: &'a str) -> HuyiForm<'a> {
        HuyiForm {
            account: &self.app_id,
            password: password(&self.app_id, &self.app_key, mobile, content, time),
            mobile,
            content,
            time,
        }
    }
}

/// Dynamic password: MD5 of account, key, mobile, content and unix time, concatenated.
pub fn password(account: &str, key: &str, mobile: &str, content: &str, time: &str) -> String {
    hex_md5(format!("{}{}{}{}{}", account, key, mobile, content, time).as_bytes())
}

#[derive(Debug, Serialize)]
struct HuyiForm<'a> {
    account: &'a str,
    password: String,
    mobile: &'a str,
    content: &'a str,
    time: &'a str,
}

#[derive(Debug, Deserialize)]
struct HuyiResponse {
    code: i64,
    msg: Option<String>,
    smsid: Option<String>,
}

#[async_trait]
impl SmsClient for HuyiClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;

        let content = fill_code(&self.template, code);
        let now = datetime::now_unix().to_string();
        let url = format!(
            "{}/webservice/sms.php?method=Submit&format=json",
            self.base_url.trim_end_matches('/')
        );

        let mut ids = Vec::with_capacity(to.len());
        let mut raws = Vec::with_capacity(to.len());
        for mobile in to {
            debug!("Sending Huyi SMS to {}", mobile);
            let res = self
                .http
                .post(&url)
                .form(&self.form(mobile, &content, &now))
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(sms_core::status_error(status, &body));
            }

            let raw_text = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            let parsed: HuyiResponse = serde_json::from_str(&raw_text)
                .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
            if parsed.code != SUCCESS_CODE {
                let msg = parsed.msg.unwrap_or_default();
                warn!("Huyi rejected {}: {} {}", mobile, parsed.code, msg);
                return Err(SmsError::Provider(format!("{}: {}", parsed.code, msg)));
            }

            ids.push(parsed.smsid.unwrap_or_else(sms_core::fallback_id));
            raws.push(sms_core::raw_json(&raw_text));
        }

        info!("SMS sent successfully via Huyi to {} recipient(s)", ids.len());
        Ok(SendResponse {
            id: ids.swap_remove(0),
            provider: PROVIDER,
            raw: serde_json::Value::Array(raws),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::TemplateParams;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn code() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "4821".to_string())])
    }

    #[test]
    fn password_is_md5_of_concatenation() {
        assert_eq!(
            password("C123", "key", "13800000000", "code 4821", "1700000000"),
            hex_md5(b"C123key13800000000code 48211700000000")
        );
    }

    #[tokio::test]
    async fn one_request_per_mobile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webservice/sms.php"))
            .and(query_param("method", "Submit"))
            .and(body_string_contains("account=C123"))
            .and(body_string_contains("content=Your+code+is+4821"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 2, "msg": "提交成功", "smsid": "14731231"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = HuyiClient::new("C123", "key", "Your code is %s").with_base_url(server.uri());
        let p = code();
        let res = client
            .send(SendRequest::new(&p, &["13800000000", "13900000000"]))
            .await
            .unwrap();
        assert_eq!(res.id, "14731231");
        assert_eq!(res.raw.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn vendor_code_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 405, "msg": "API ID or API KEY is incorrect", "smsid": "0"
            })))
            .mount(&server)
            .await;

        let client = HuyiClient::new("C123", "bad", "").with_base_url(server.uri());
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        match err {
            SmsError::Provider(msg) => assert!(msg.starts_with("405")),
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

        let client = HuyiClient::new("C123", "key", "Code %s").with_base_url(server.uri());
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

        let client = HuyiClient::new("C123", "key", "Code %s").with_base_url(server.uri());
        let p = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&p, &["13800000000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "missing parameter: code"));
    }
}
