//! # Volcengine SMS Provider
//!
//! Volcengine SMS (`SendSms`, API version 2020-01-01) backend for sms-sender.
//!
//! Requests are signed with Volcengine's HMAC-SHA256 scheme over the
//! `content-type`, `host`, `x-content-sha256` and `x-date` headers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::sign::{hex_hmac_sha256, hex_sha256, hmac_sha256, percent_encode};
use sms_core::template::{join_numbers, require_targets};
use sms_core::{datetime, SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "volcengine";
const SERVICE: &str = "volcSMS";
const DEFAULT_REGION: &str = "cn-north-1";
const ACTION: &str = "SendSms";
const API_VERSION: &str = "2020-01-01";
const CONTENT_TYPE: &str = "application/json";
const SIGNED_HEADERS: &str = "content-type;host;x-content-sha256;x-date";

/// Volcengine SMS client.
#[derive(Clone, Debug)]
pub struct VolcClient {
    access_key: String,
    secret_key: String,
    sign: String,
    template_id: String,
    sms_account: String,
    region: String,
    /// API base URL; override for testing/mocking.
    base_url: String,
    http: reqwest::Client,
}

impl VolcClient {
    pub fn new<S: Into<String>>(
        access_key: S,
        secret_key: S,
        sign: S,
        template_id: S,
        sms_account: S,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            sign: sign.into(),
            template_id: template_id.into(),
            sms_account: sms_account.into(),
            region: DEFAULT_REGION.to_string(),
            base_url: "https://sms.volcengineapi.com".to_string(),
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

/// Sorted, RFC 3986 encoded query string.
fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parts of a request that go into the Volcengine signature.
#[derive(Debug)]
pub struct SigningInput<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub host: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    /// `X-Date` value, `20060102T150405Z`.
    pub x_date: &'a str,
    /// Hex SHA-256 of the body, also sent as `X-Content-Sha256`.
    pub body_hash: &'a str,
}

/// Build the `Authorization` header for a JSON POST to `/`.
pub fn authorization(input: &SigningInput<'_>) -> String {
    let date = input.x_date.get(..8).unwrap_or(input.x_date);
    let canonical_headers = format!(
        "content-type:{}\nhost:{}\nx-content-sha256:{}\nx-date:{}\n",
        CONTENT_TYPE, input.host, input.body_hash, input.x_date
    );
    let query = canonical_query(input.query);
    let canonical_request = [
        "POST",
        "/",
        query.as_str(),
        canonical_headers.as_str(),
        SIGNED_HEADERS,
        input.body_hash,
    ]
    .join("\n");

    let scope = format!("{}/{}/{}/request", date, input.region, input.service);
    let string_to_sign = format!(
        "HMAC-SHA256\n{}\n{}\n{}",
        input.x_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(input.secret_key.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, input.region.as_bytes());
    let k_service = hmac_sha256(&k_region, input.service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"request");
    let signature = hex_hmac_sha256(&k_signing, string_to_sign.as_bytes());

    format!(
        "HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        input.access_key, scope, SIGNED_HEADERS, signature
    )
}

#[derive(Debug, Serialize)]
struct VolcSendRequest<'a> {
    #[serde(rename = "SmsAccount")]
    sms_account: &'a str,
    #[serde(rename = "Sign")]
    sign: &'a str,
    #[serde(rename = "TemplateID")]
    template_id: &'a str,
    #[serde(rename = "TemplateParam")]
    template_param: String,
    #[serde(rename = "PhoneNumbers")]
    phone_numbers: String,
}

#[derive(Debug, Deserialize)]
struct VolcSendResponse {
    #[serde(rename = "ResponseMetadata")]
    metadata: ResponseMetadata,
    #[serde(rename = "Result")]
    result: Option<VolcResult>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
    #[serde(rename = "Error")]
    error: Option<VolcError>,
}

#[derive(Debug, Deserialize)]
struct VolcError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct VolcResult {
    #[serde(rename = "MessageID", default)]
    message_id: Vec<String>,
}

#[async_trait]
impl SmsClient for VolcClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let payload = VolcSendRequest {
            sms_account: &self.sms_account,
            sign: &self.sign,
            template_id: &self.template_id,
            template_param: serde_json::to_string(req.params)
                .map_err(|e| SmsError::Invalid(e.to_string()))?,
            phone_numbers: join_numbers(to),
        };
        let body = serde_json::to_string(&payload).map_err(|e| SmsError::Invalid(e.to_string()))?;
        let body_hash = hex_sha256(body.as_bytes());
        let x_date = datetime::format(datetime::now(), datetime::COMPACT_ISO8601);
        let host = sms_core::host_header(&self.base_url)?;
        let query = [("Action", ACTION), ("Version", API_VERSION)];

        let auth = authorization(&SigningInput {
            access_key: &self.access_key,
            secret_key: &self.secret_key,
            region: &self.region,
            service: SERVICE,
            host: &host,
            query: &query,
            x_date: &x_date,
            body_hash: &body_hash,
        });
        debug!(
            "Sending Volcengine SMS template {} to {} recipient(s)",
            self.template_id,
            to.len()
        );

        let res = self
            .http
            .post(format!(
                "{}/?{}",
                self.base_url.trim_end_matches('/'),
                canonical_query(&query)
            ))
            .header("Authorization", auth)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Date", &x_date)
            .header("X-Content-Sha256", &body_hash)
            .body(body)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        if !status.is_success() {
            warn!("Volcengine SendSms returned HTTP {}", status);
            return Err(SmsError::Provider(format!(
                "send message failed, statusCode: {}, body: {}",
                status.as_u16(),
                raw_text
            )));
        }

        let parsed: VolcSendResponse = serde_json::from_str(&raw_text)
            .map_err(|e| SmsError::Provider(format!("malformed response: {}", e)))?;
        if let Some(err) = parsed.metadata.error {
            warn!("Volcengine SendSms failed: {} {}", err.code, err.message);
            return Err(SmsError::Provider(format!(
                "send message failed, code: {:?}, message: {:?}",
                err.code, err.message
            )));
        }

        let id = parsed
            .result
            .and_then(|r| r.message_id.into_iter().next())
            .or(parsed.metadata.request_id)
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Volcengine with MessageID: {}", id);

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
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn signature_matches_reference_vector() {
        let body = r#"{"SmsAccount":"7a2b0000","Sign":"Sign","TemplateID":"ST_1","TemplateParam":"{\"code\":\"1234\"}","PhoneNumbers":"13800000000"}"#;
        let body_hash = hex_sha256(body.as_bytes());
        assert_eq!(
            body_hash,
            "4ef5265be243833c35c96103c20904ea4c5e519a2d2079e32a5b36f5f4f32c8c"
        );

        let auth = authorization(&SigningInput {
            access_key: "AKLTexample",
            secret_key: "c2VjcmV0",
            region: "cn-north-1",
            service: "volcSMS",
            host: "sms.volcengineapi.com",
            query: &[("Version", "2020-01-01"), ("Action", "SendSms")],
            x_date: "20240102T030405Z",
            body_hash: &body_hash,
        });
        assert_eq!(
            auth,
            "HMAC-SHA256 Credential=AKLTexample/20240102/cn-north-1/volcSMS/request, \
             SignedHeaders=content-type;host;x-content-sha256;x-date, \
             Signature=50f7cfad59791d5bda6a0da4f0cad35ba2dbf48a20c9fe76dbb020b5ba998967"
        );
    }

    #[test]
    fn non_ascii_date_is_used_whole() {
        let auth = authorization(&SigningInput {
            access_key: "ak",
            secret_key: "sk",
            region: "cn-north-1",
            service: "volcSMS",
            host: "sms.volcengineapi.com",
            query: &[],
            x_date: "20年01月02日",
            body_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        });
        assert!(auth.starts_with("HMAC-SHA256 Credential=ak/20年01月02日/cn-north-1/volcSMS/request"));
    }

    #[test]
    fn request_body_layout() {
        let payload = VolcSendRequest {
            sms_account: "7a2b0000",
            sign: "Sign",
            template_id: "ST_1",
            template_param: r#"{"code":"1234"}"#.into(),
            phone_numbers: "13800000000".into(),
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"SmsAccount":"7a2b0000","Sign":"Sign","TemplateID":"ST_1","TemplateParam":"{\"code\":\"1234\"}","PhoneNumbers":"13800000000"}"#
        );
    }

    #[tokio::test]
    async fn sends_and_reads_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(query_param("Action", "SendSms"))
            .and(query_param("Version", "2020-01-01"))
            .and(header_exists("X-Date"))
            .and(header_exists("X-Content-Sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ResponseMetadata": {
                    "RequestId": "req-1",
                    "Action": "SendSms",
                    "Version": "2020-01-01",
                    "Service": "volcSMS",
                    "Region": "cn-north-1"
                },
                "Result": { "MessageID": ["msg-1"] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VolcClient::new("ak", "sk", "Sign", "ST_1", "7a2b0000").with_base_url(server.uri());
        let params = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let res = client
            .send(SendRequest::new(&params, &["13800000000"]))
            .await
            .unwrap();
        assert_eq!(res.id, "msg-1");
    }

    #[tokio::test]
    async fn metadata_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ResponseMetadata": {
                    "RequestId": "req-2",
                    "Error": { "Code": "RE:0005", "Message": "SignatureDoesNotMatch" }
                }
            })))
            .mount(&server)
            .await;

        let client = VolcClient::new("ak", "sk", "Sign", "ST_1", "acct").with_base_url(server.uri());
        let params = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&params, &["13800000000"]))
            .await
            .unwrap_err();
        match err {
            SmsError::Provider(msg) => assert!(msg.contains("SignatureDoesNotMatch")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = VolcClient::new("ak", "sk", "Sign", "ST_1", "acct").with_base_url(server.uri());
        let params = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&params, &["13800000000"]))
            .await
            .unwrap_err();
        match err {
            SmsError::Provider(msg) => assert!(msg.contains("statusCode: 503")),
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

        let client = VolcClient::new("ak", "sk", "Sign", "SMS_1", "acct").with_base_url(server.uri());
        let p = TemplateParams::from([("code".to_string(), "1234".to_string())]);
        let err = client.send(SendRequest::new(&p, &[])).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
    }
}
