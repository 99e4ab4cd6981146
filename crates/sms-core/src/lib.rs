//! # SMS Core
//!
//! Core traits and types for the sms-sender multi-provider SMS abstraction.
//!
//! This crate provides the fundamental building blocks shared by every vendor adapter:
//! - [`SmsClient`] trait, the single sending contract
//! - [`SendRequest`] / [`SendResponse`] and the [`SmsError`] type
//! - [`sign`] hashing helpers used to authenticate vendor requests
//! - [`template`] helpers for filling vendor templates and validating recipients
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{SendRequest, SmsClient, TemplateParams};
//!
//! let mut params = TemplateParams::new();
//! params.insert("code".into(), "123456".into());
//!
//! // Any SMS provider implements SmsClient
//! let response = client.send(SendRequest::new(&params, &["+8613800000000"])).await?;
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub mod datetime;
pub mod sign;
pub mod template;

/// Errors that can occur during SMS operations
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// HTTP communication error
    #[error("http error: {0}")]
    Http(String),
    /// Authentication/authorization error
    #[error("authentication error: {0}")]
    Auth(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
    /// SMS provider returned an error
    #[error("provider error: {0}")]
    Provider(String),
    /// Outbound send budget for this provider is exhausted
    #[error("rate limited: retry after {0:?}")]
    RateLimited(Duration),
    /// Unexpected error occurred
    #[error("unexpected: {0}")]
    Unexpected(String),
}

/// Named template parameters, e.g. `{"code": "123456"}`.
///
/// Kept ordered so every JSON encoding of the parameters is deterministic.
pub type TemplateParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SendRequest<'a> {
    /// Values substituted into the vendor template.
    pub params: &'a TemplateParams,
    /// Recipient phone numbers. Some vendors read the sender from the first entry.
    pub to: &'a [&'a str],
}

impl<'a> SendRequest<'a> {
    pub fn new(params: &'a TemplateParams, to: &'a [&'a str]) -> Self {
        Self { params, to }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub id: String,
    /// Name of the backend/provider that produced the response, e.g. "aliyun".
    pub provider: &'static str,
    /// Raw provider payload for debugging / audit.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait SmsClient: Send + Sync {
    /// Stable provider key, e.g., "aliyun", "tencent", etc.
    fn provider(&self) -> &'static str;

    /// Send the configured template, filled with `req.params`, to every recipient in `req.to`.
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError>;
}

#[async_trait]
impl<T: SmsClient + ?Sized> SmsClient for std::sync::Arc<T> {
    fn provider(&self) -> &'static str {
        (**self).provider()
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        (**self).send(req).await
    }
}

/// Utility to create a pseudo id if a provider doesn't return one.
pub fn fallback_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a vendor body as JSON, keeping non-JSON bodies under a `raw` key.
pub fn raw_json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({ "raw": body }))
}

/// `host[:port]` of a base URL, as sent in the `Host` header.
pub fn host_header(base_url: &str) -> Result<String, SmsError> {
    let url = url::Url::parse(base_url)
        .map_err(|e| SmsError::Invalid(format!("invalid base url {}: {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| SmsError::Invalid(format!("base url {} has no host", base_url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Build the error returned for a non-2xx vendor response.
pub fn status_error(status: impl std::fmt::Display, body: &str) -> SmsError {
    SmsError::Provider(format!("HTTP {}: {}", status, body))
}
