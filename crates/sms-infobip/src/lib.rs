//! # Infobip SMS Provider
//!
//! Infobip `sms/2/text/advanced` backend for sms-sender.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::template::{fill_code, require_code, require_targets};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use tracing::{debug, info, warn};

const PROVIDER: &str = "infobip";

/// Infobip client.
#[derive(Clone, Debug)]
pub struct InfobipClient {
    sender: String,
    api_key: String,
    template: String,
    /// Account specific base URL, e.g. `https://xxxxx.api.infobip.com`.
    base_url: String,
    http: reqwest::Client,
}

impl InfobipClient {
    pub fn new<S: Into<String>>(sender: S, api_key: S, template: S, base_url: S) -> Self {
        Self {
            sender: sender.into(),
            api_key: api_key.into(),
            template: template.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Normalize a destination: a national `0` prefix becomes `886` and `+` is dropped.
pub fn normalize_destination(mobile: &str) -> String {
    let mobile = match mobile.strip_prefix('0') {
        Some(rest) => format!("886{}", rest),
        None => mobile.to_string(),
    };
    match mobile.strip_prefix('+') {
        Some(rest) => rest.to_string(),
        None => mobile,
    }
}

#[derive(Debug, Serialize)]
struct MessageData<'a> {
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    from: &'a str,
    destinations: [Destination; 1],
    text: String,
}

#[derive(Debug, Serialize)]
struct Destination {
    to: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfobipResponse {
    bulk_id: Option<String>,
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentMessage {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfobipError {
    request_error: RequestError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestError {
    service_exception: ServiceException,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceException {
    message_id: Option<String>,
    text: String,
}

#[async_trait]
impl SmsClient for InfobipClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let code = require_code(req.params)?;
        let to = require_targets(req.to)?;
        if to.len() > 1 {
            warn!(
                ignored = to.len() - 1,
                "Infobip sends to the first recipient only"
            );
        }

        let destination = normalize_destination(to[0]);
        let body = MessageData {
            messages: [Message {
                from: &self.sender,
                destinations: [Destination {
                    to: destination.clone(),
                }],
                text: fill_code(&self.template, code),
            }],
        };
        debug!("Sending Infobip SMS to {}", destination);

        let res = self
            .http
            .post(format!(
                "{}/sms/2/text/advanced",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("App {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        if !status.is_success() {
            warn!("Infobip send failed: HTTP {}", status);
            return Err(match serde_json::from_str::<InfobipError>(&raw_text) {
                Ok(err) if status == reqwest::StatusCode::UNAUTHORIZED => {
                    SmsError::Auth(err.request_error.service_exception.text)
                }
                Ok(err) => {
                    let exception = err.request_error.service_exception;
                    SmsError::Provider(match exception.message_id {
                        Some(id) => format!("{}: {}", id, exception.text),
                        None => exception.text,
                    })
                }
                Err(_) => sms_core::status_error(status, &raw_text),
            });
        }

        let parsed: Option<InfobipResponse> = serde_json::from_str(&raw_text).ok();
        let id = parsed
            .and_then(|p| {
                p.messages
                    .into_iter()
                    .find_map(|m| m.message_id)
                    .or(p.bulk_id)
            })
            .unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via Infobip with messageId: {}", id);

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
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn code() -> TemplateParams {
        TemplateParams::from([("code".to_string(), "314".to_string())])
    }

    #[test]
    fn destinations_are_normalized() {
        assert_eq!(normalize_destination("0912345678"), "886912345678");
        assert_eq!(normalize_destination("+41793026727"), "41793026727");
        assert_eq!(normalize_destination("41793026727"), "41793026727");
    }

    #[tokio::test]
    async fn only_first_recipient_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/2/text/advanced"))
            .and(header("Authorization", "App secret-key"))
            .and(body_json(serde_json::json!({
                "messages": [{
                    "from": "InfoSMS",
                    "destinations": [{"to": "41793026727"}],
                    "text": "Your code: 314"
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bulkId": "2034072219640523072",
                "messages": [{
                    "messageId": "2250be2d4219-3af1-78856-aabe-1362af1edfd2",
                    "status": {"groupId": 1, "groupName": "PENDING", "name": "PENDING_ENROUTE"},
                    "to": "41793026727"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = InfobipClient::new(
            "InfoSMS",
            "secret-key",
            "Your code: %s",
            server.uri().as_str(),
        );
        let p = code();
        let res = client
            .send(SendRequest::new(&p, &["+41793026727", "+41793026728"]))
            .await
            .unwrap();
        assert_eq!(res.id, "2250be2d4219-3af1-78856-aabe-1362af1edfd2");
    }

    #[tokio::test]
    async fn request_error_text_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "requestError": {
                    "serviceException": {"messageId": "UNAUTHORIZED", "text": "Invalid login details"}
                }
            })))
            .mount(&server)
            .await;

        let client = InfobipClient::new("InfoSMS", "bad", "", server.uri().as_str());
        let p = code();
        let err = client
            .send(SendRequest::new(&p, &["0912345678"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Auth(ref m) if m == "Invalid login details"));
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = InfobipClient::new("Acme", "key", "%s", server.uri().as_str());
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

        let client = InfobipClient::new("Acme", "key", "%s", server.uri().as_str());
        let p = TemplateParams::new();
        let err = client
            .send(SendRequest::new(&p, &["0912345678"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SmsError::Invalid(ref m) if m == "missing parameter: code"));
    }
}
