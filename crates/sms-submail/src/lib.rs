//! # SUBMAIL SMS Provider
//!
//! SUBMAIL `sms/multixsend` backend for sms-sender: one multipart request
//! carries every recipient together with the template variables.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::template::require_targets;
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use tracing::{debug, info, warn};

const PROVIDER: &str = "submail";
const SUCCESS: &str = "success";

/// SUBMAIL client.
#[derive(Clone, Debug)]
pub struct SubmailClient {
    app_id: String,
    /// App key sent as the `signature` field.
    signature: String,
    /// Template (project) id.
    project: String,
    base_url: String,
    http: reqwest::Client,
}

impl SubmailClient {
    pub fn new<S: Into<String>>(app_id: S, signature: S, project: S) -> Self {
        Self {
            app_id: app_id.into(),
            signature: signature.into(),
            project: project.into(),
            base_url: "https://api-v4.mysubmail.com".to_string(),
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

#[derive(Debug, Serialize)]
struct MultiItem<'a> {
    to: &'a str,
    vars: &'a TemplateParams,
}

/// `multi` field: JSON array with one `{to, vars}` entry per recipient.
pub fn multi_field(params: &TemplateParams, to: &[&str]) -> Result<String, SmsError> {
    let items: Vec<MultiItem<'_>> = to.iter().map(|to| MultiItem { to, vars: params }).collect();
    serde_json::to_string(&items).map_err(|e| SmsError::Invalid(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct SubmailResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    send_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubmailResponse {
    Batch(Vec<SubmailResult>),
    Single(SubmailResult),
}

fn check_results(response: SubmailResponse) -> Result<Option<String>, SmsError> {
    let results = match response {
        SubmailResponse::Batch(results) => results,
        SubmailResponse::Single(err) if err.status != SUCCESS => {
            return Err(SmsError::Provider(if err.msg.is_empty() {
                format!("{}, {}", err.status, err.code)
            } else {
                err.msg
            }))
        }
        SubmailResponse::Single(ok) => vec![ok],
    };

    let failures: Vec<String> = results
        .iter()
        .filter(|r| r.status != SUCCESS)
        .map(|r| format!("{}, {}, {}", r.status, r.code, r.msg))
        .collect();
    if !failures.is_empty() {
        return Err(SmsError::Provider(failures.join("|")));
    }
    Ok(results.into_iter().find_map(|r| r.send_id))
}

#[async_trait]
impl SmsClient for SubmailClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;

        let form = reqwest::multipart::Form::new()
            .text("appid", self.app_id.clone())
            .text("signature", self.signature.clone())
            .text("project", self.project.clone())
            .text("multi", multi_field(req.params, to)?);
        debug!(
            "Sending SUBMAIL project {} to {} recipient(s)",
            self.project,
            to.len()
        );

        let res = self
            .http
            .post(format!(
                "{}/sms/multixsend",
                self.base_url.trim_end_matches('/')
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let parsed: SubmailResponse = match serde_json::from_str(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => return Err(sms_core::status_error(status, &raw_text)),
        };

        let send_id = check_results(parsed).inspect_err(|e| {
            warn!("SUBMAIL multixsend failed: {}", e);
        })?;
        let id = send_id.unwrap_or_else(sms_core::fallback_id);
        info!("SMS sent successfully via SUBMAIL with send_id: {}", id);

        Ok(SendResponse {
            id,
            provider: PROVIDER,
            raw: sms_core::raw_json(&raw_text),
        })
    }
}
