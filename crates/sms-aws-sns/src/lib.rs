//! # Amazon SNS SMS Provider
//!
//! Amazon SNS backend for sms-sender, built on the official `aws-sdk-sns`.
//!
//! Every recipient gets its own `Publish` call. The message body is the
//! configured template, and each template parameter travels as a `String`
//! message attribute.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{SendRequest, SmsClient, TemplateParams};
//! use sms_aws_sns::AwsSnsClient;
//!
//! let client = AwsSnsClient::new("us-east-1", "access_key", "secret_key", "Your code is ready");
//! let params = TemplateParams::new();
//! let response = client.send(SendRequest::new(&params, &["+1234567890"])).await?;
//! ```

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns::operation::publish::PublishError;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::{config::Credentials, Client as SnsClient, Config as SnsConfig};
use sms_core::template::require_targets;
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};
use std::collections::HashMap;
use tracing::{debug, error, info};

const PROVIDER: &str = "aws-sns";

/// AWS SNS SMS client
#[derive(Debug, Clone)]
pub struct AwsSnsClient {
    client: SnsClient,
    region: String,
    template: String,
}

impl AwsSnsClient {
    /// Create a client with static credentials.
    pub fn new(
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "sms-sender",
        );

        let config = SnsConfig::builder()
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .behavior_version(BehaviorVersion::latest())
            .build();

        Self {
            client: SnsClient::from_conf(config),
            region,
            template: template.into(),
        }
    }

    /// Create a client using the default AWS credential chain
    pub async fn with_default_credentials(
        region: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        Self {
            client: SnsClient::new(&config),
            region,
            template: template.into(),
        }
    }

    /// Route requests to a different SNS endpoint (LocalStack, mocks).
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        let config = self
            .client
            .config()
            .to_builder()
            .endpoint_url(endpoint_url)
            .build();
        self.client = SnsClient::from_conf(config);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

fn message_attributes(
    params: &TemplateParams,
) -> Result<HashMap<String, MessageAttributeValue>, SmsError> {
    params
        .iter()
        .map(|(k, v)| {
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(v)
                .build()
                .map(|attr| (k.clone(), attr))
                .map_err(|e| SmsError::Invalid(format!("message attribute {}: {}", k, e)))
        })
        .collect()
}

fn publish_error(err: PublishError) -> SmsError {
    match err {
        PublishError::AuthorizationErrorException(_) => {
            SmsError::Auth("AWS authorization failed".to_string())
        }
        PublishError::InvalidParameterException(e) => {
            SmsError::Invalid(e.message().unwrap_or("Invalid parameter").to_string())
        }
        PublishError::InvalidParameterValueException(e) => {
            SmsError::Invalid(e.message().unwrap_or("Invalid parameter value").to_string())
        }
        PublishError::ThrottledException(e) => {
            SmsError::Provider(e.message().unwrap_or("Throttled").to_string())
        }
        e => SmsError::Provider(format!("AWS SNS error: {}", e)),
    }
}

#[async_trait]
impl SmsClient for AwsSnsClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let to = require_targets(req.to)?;
        let attributes = message_attributes(req.params)?;
        debug!(
            "Publishing SNS SMS to {} recipient(s) with attributes: {:?}",
            to.len(),
            attributes.keys().collect::<Vec<_>>()
        );

        let mut ids = Vec::with_capacity(to.len());
        for phone in to {
            let result = self
                .client
                .publish()
                .phone_number(*phone)
                .message(&self.template)
                .set_message_attributes(Some(attributes.clone()))
                .send()
                .await
                .map_err(|e| {
                    error!("AWS SNS publish to {} failed: {}", phone, e);
                    publish_error(e.into_service_error())
                })?;
            ids.push(
                result
                    .message_id()
                    .map(str::to_string)
                    .unwrap_or_else(sms_core::fallback_id),
            );
        }

        info!(
            "SMS sent successfully via AWS SNS with MessageId(s): {:?}",
            ids
        );

        let raw = serde_json::json!({
            "MessageIds": ids,
            "Region": self.region,
        });
        Ok(SendResponse {
            id: ids.swap_remove(0),
            provider: PROVIDER,
            raw,
        })
    }
}
