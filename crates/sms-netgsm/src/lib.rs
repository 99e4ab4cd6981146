//! # Netgsm SMS Provider
//!
//! Netgsm OTP (`/sms/send/otp`) backend for sms-sender. The credentials travel
//! inside the XML request body and every number is sent separately.

use async_trait::async_trait;
use quick_xml::de;
use quick_xml::escape::escape;
use serde::Deserialize;
use sms_core::template::{fill_code, CODE};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "netgsm";
const SUCCESS_CODE: &str = "0";

/// Netgsm client.
#[derive(Clone, Debug)]
pub struct NetgsmClient {
    user_code: String,
    password: String,
    /// Approved message header (sender name).
    msg_header: String,
    template: String,
    base_url: String,
    http: reqwest::Client,
}

impl NetgsmClient {
    pub fn new<S: Into<String>>(user_code: S, password: S, msg_header: S, template: S) -> Self {
        Self {
            user_code: user_code.into(),
            password: password.into(),
            msg_header: msg_header.into(),
            template: template.into(),
            base_url: "https://api.netgsm.com.tr".to_string(),
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

    /// XML body for a single number.
    pub fn request_body(&self, message: &str, number: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<mainbody>\
<header>\
<usercode>{}</usercode>\
<password>{}</password>\
<msgheader>{}</msgheader>\
</header>\
<body>\
<msg><![CDATA[{}]]></msg>\
<no>{}</no>\
</body>\
</mainbody>",
            escape(self.user_code.as_str()),
            escape(self.password.as_str()),
            escape(self.msg_header.as_str()),
            message.replace("]]>", "]]]]><![CDATA[>"),
            escape(number),
        )
    }
}

#[derive(Debug, Deserialize)]
struct NetgsmResponse {
    main: NetgsmMain,
}

#[derive(Debug, Deserialize)]
struct NetgsmMain {
    code: String,
    #[serde(rename = "jobID")]
    job_id: Option<String>,
    error: Option<String>,
}

fn parse_response(body: &str) -> Result<Option<String>, SmsError> {
    let parsed: NetgsmResponse = de::from_str(body)
        .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
    let main = parsed.main;
    if main.code.trim() != SUCCESS_CODE {
        return Err(SmsError::Provider(
            main.error.unwrap_or_else(|| format!("code {}", main.code.trim())),
        ));
    }
    Ok(main.job_id)
}

#[async_trait]
impl SmsClient for NetgsmClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = req.to;
        if to.is_empty() {
            debug!("Netgsm send called without recipients, nothing to do");
            return Ok(SendResponse {
                id: sms_core::fallback_id(),
                provider: PROVIDER,
                raw: serde_json::Value::Array(Vec::new()),
            });
        }

        let message = match req.params.get(CODE) {
            Some(code) => fill_code(&self.template, code),
            None => self.template.clone(),
        };
        let url = format!("{}/sms/send/otp", self.base_url.trim_end_matches('/'));

        let mut ids = Vec::with_capacity(to.len());
        let mut raws = Vec::with_capacity(to.len());
        for number in to {
            debug!("Sending Netgsm OTP to {}", number);
            let res = self
                .http
                .post(&url)
                .header("Content-Type", "application/xml")
                .body(self.request_body(&message, number))
                .send()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;

            let status = res.status();
            let body = res
                .text()
                .await
                .map_err(|e| SmsError::Http(e.to_string()))?;
            if !status.is_success() {
                return Err(sms_core::status_error(status, &body));
            }

            let job_id = parse_response(&body).inspect_err(|e| {
                warn!("Netgsm rejected {}: {}", number, e);
            })?;
            ids.push(job_id.unwrap_or_else(sms_core::fallback_id));
            raws.push(serde_json::Value::String(body));
        }

        info!("SMS sent successfully via Netgsm to {} recipient(s)", ids.len());
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
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OK_BODY: &str = r#"<?xml version="1.0"?>
<xml>
    <main>
        <code>0</code>
        <jobID>123456789</jobID>
    </main>
</xml>"#;

    #[test]
    fn request_body_escapes_credentials() {
        let client = NetgsmClient::new("user", "p<&>ss", "HEADER", "");
        let body = client.request_body("a]]>b", "5551234567");
        assert!(body.contains("<password>p&lt;&amp;&gt;ss</password>"));
        assert!(body.contains("<msg><![CDATA[a]]]]><![CDATA[>b]]></msg>"));
        assert!(body.contains("<no>5551234567</no>"));
    }

    #[test]
    fn parses_error_response() {
        let body = r#"<?xml version="1.0"?>
<xml>
    <main>
        <code>30</code>
        <error>Invalid username or password</error>
    </main>
</xml>"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, SmsError::Provider(ref m) if m == "Invalid username or password"));
        assert_eq!(parse_response(OK_BODY).unwrap().as_deref(), Some("123456789"));
    }

    #[tokio::test]
    async fn posts_xml_per_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/send/otp"))
            .and(header("Content-Type", "application/xml"))
            .and(body_string_contains("<msg><![CDATA[Kod: 4242]]></msg>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OK_BODY))
            .expect(2)
            .mount(&server)
            .await;

        let client =
            NetgsmClient::new("user", "pass", "HEADER", "Kod: %s").with_base_url(server.uri());
        let p = TemplateParams::from([("code".to_string(), "4242".to_string())]);
        let res = client
            .send(SendRequest::new(&p, &["5551234567", "5551234568"]))
            .await
            .unwrap();
        assert_eq!(res.id, "123456789");
    }

    #[tokio::test]
    async fn no_recipients_sends_nothing() {
        let client = NetgsmClient::new("user", "pass", "HEADER", "%s")
            .with_base_url("http://127.0.0.1:9");
        let p = TemplateParams::new();
        let res = client.send(SendRequest::new(&p, &[])).await.unwrap();
        assert_eq!(res.raw, serde_json::json!([]));
    }
}
