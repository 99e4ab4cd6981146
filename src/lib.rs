//! # sms-sender
//!
//! One sending interface over twenty SMS vendors.
//!
//! Every vendor lives in its own `sms-<vendor>` crate and implements
//! [`sms_core::SmsClient`]: it fills the configured template with the request
//! parameters, signs the call the way the vendor documents, and maps the
//! vendor's answer to [`SmsError`]. This crate ties them together:
//!
//! - [`Provider`]: the catalogue of vendors, parsed from display names or keys
//! - [`new_sms_client`]: build any adapter from a generic [`ProviderConfig`]
//! - [`SenderRegistry`]: named clients built from [`AppConfig`]
//! - [`RateLimitedClient`]: an outbound send budget per client
//! - [`MockClient`]: an in-memory adapter for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sms_sender::prelude::*;
//!
//! # async fn run() -> Result<(), SmsError> {
//! let config = ProviderConfig::new(Provider::Aliyun)
//!     .credentials("access_key_id", "access_key_secret")
//!     .sign("Acme")
//!     .template("SMS_123456789");
//! let client = new_sms_client(&config, &reqwest::Client::new())?;
//!
//! let mut params = TemplateParams::new();
//! params.insert("code".into(), "123456".into());
//! let response = client
//!     .send(SendRequest::new(&params, &["+8613800000000"]))
//!     .await?;
//! println!("sent {} via {}", response.id, response.provider);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use sms_sender::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! sms_sender::telemetry::init_tracing(&config.logging)?;
//! let registry = SenderRegistry::from_config(&config)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod factory;
pub mod mock;
pub mod provider;
pub mod rate_limiter;
pub mod registry;
pub mod telemetry;

pub use config::{AppConfig, HttpConfig, LoggingConfig};
pub use factory::{new_sms_client, ProviderConfig};
pub use mock::MockClient;
pub use provider::Provider;
pub use rate_limiter::{RateLimitConfig, RateLimitedClient, RateLimiter};
pub use registry::SenderRegistry;
pub use sms_core::{SendRequest, SendResponse, SmsClient, SmsError, TemplateParams};

/// Common imports for sms-sender usage
pub mod prelude {
    pub use crate::config::{AppConfig, HttpConfig, LoggingConfig};
    pub use crate::factory::{new_sms_client, ProviderConfig};
    pub use crate::mock::MockClient;
    pub use crate::provider::Provider;
    pub use crate::rate_limiter::{
        DefaultKeyGenerator, KeyGenerator, ProviderRateLimit, RateLimitConfig, RateLimitResult,
        RateLimitedClient, RateLimiter,
    };
    pub use crate::registry::SenderRegistry;
    pub use sms_core::*;
}
