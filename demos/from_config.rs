//! Build every sender declared in `config/` and send one code through the named one.
//!
//! ```text
//! # config/local.toml
//! [providers.verify]
//! provider = "Tencent Cloud SMS"
//! access_id = "AKID..."
//! access_key = "..."
//! sign = "Acme"
//! template = "1234567"
//! other = ["1400000000"]
//!
//! cargo run --example from_config -- verify +8613800000000 123456
//! ```
use sms_sender::prelude::*;
use sms_sender::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    let registry = SenderRegistry::from_config(&config)?;
    println!("Configured senders: {:?}", registry.names());

    let mut args = std::env::args().skip(1);
    let (Some(name), Some(to), Some(code)) = (args.next(), args.next(), args.next()) else {
        eprintln!("usage: from_config <sender> <number[,number...]> <code>");
        return Ok(());
    };

    let recipients: Vec<&str> = to.split(',').collect();
    let params = TemplateParams::from([("code".to_string(), code)]);
    match registry.send(&name, SendRequest::new(&params, &recipients)).await {
        Ok(res) => println!("Sent via {} with id {}", res.provider, res.id),
        Err(SmsError::RateLimited(retry_after)) => {
            println!("Send budget exhausted, retry in {:?}", retry_after)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
