//! Send a verification code through any supported vendor.
//!
//! ```text
//! cargo run --example send_sms -- --provider aliyun --access-id ... --access-key ... \
//!     --sign Acme --template SMS_123456789 --to +8613800000000 --code 123456
//! ```
use sms_sender::prelude::*;
use sms_sender::telemetry::init_tracing;

use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&LoggingConfig {
        format: "pretty".to_string(),
        ..LoggingConfig::default()
    })?;

    let provider: Provider = arg_or_env("--provider", "SMS_PROVIDER")?.parse()?;
    let mut config = ProviderConfig::new(provider)
        .credentials(
            arg_or_env("--access-id", "SMS_ACCESS_ID")?,
            arg_or_env("--access-key", "SMS_ACCESS_KEY")?,
        )
        .sign(optional_arg_or_env("--sign", "SMS_SIGN").unwrap_or_default())
        .template(arg_or_env("--template", "SMS_TEMPLATE")?);
    if let Some(other) = optional_arg_or_env("--other", "SMS_OTHER") {
        config.other = other.split(',').map(str::to_string).collect();
    }

    let to = arg_or_env("--to", "SMS_TO")?;
    let recipients: Vec<&str> = to.split(',').map(str::trim).collect();
    let mut params = TemplateParams::new();
    params.insert("code".into(), arg_or_env("--code", "SMS_CODE")?);

    let client = new_sms_client(&config, &HttpConfig::default().build_client()?)?;
    let res = client.send(SendRequest::new(&params, &recipients)).await?;
    println!(
        "Sent via {} with id {}\nRaw: {}",
        res.provider,
        res.id,
        serde_json::to_string_pretty(&res.raw)?
    );
    Ok(())
}

fn optional_arg_or_env(flag: &str, env_key: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(idx) = args.iter().position(|a| a == flag) {
        if idx + 1 < args.len() {
            return Some(args[idx + 1].clone());
        }
    }
    env::var(env_key).ok()
}

fn arg_or_env(flag: &str, env_key: &str) -> Result<String, String> {
    optional_arg_or_env(flag, env_key)
        .ok_or_else(|| format!("missing {} (arg {} or env {})", flag, flag, env_key))
}
