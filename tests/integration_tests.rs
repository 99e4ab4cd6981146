use sms_sender::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn code(value: &str) -> TemplateParams {
    TemplateParams::from([("code".to_string(), value.to_string())])
}

fn config_with(providers: Vec<(&str, ProviderConfig)>, rate_limit: RateLimitConfig) -> AppConfig {
    AppConfig {
        providers: providers
            .into_iter()
            .map(|(name, config)| (name.to_string(), config))
            .collect(),
        rate_limit,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_registry_sends_through_configured_vendor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sms"))
        .and(query_param("api-version", "2021-03-07"))
        .and(header("Authorization", "Bearer acs-key"))
        .and(body_json(serde_json::json!({
            "from": "+18005550100",
            "smsRecipients": [{"to": "+14255550123"}],
            "message": "Your code is 4711"
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "value": [{
                "to": "+14255550123",
                "messageId": "Outgoing_20240101_abc",
                "httpStatusCode": 202,
                "successful": true
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = ProviderConfig::new(Provider::AzureAcs)
        .credentials("", "acs-key")
        .template("Your code is {code}")
        .other(server.uri());
    let config = config_with(vec![("notify", azure)], RateLimitConfig::default());
    let registry = SenderRegistry::from_config(&config).unwrap();

    let params = code("4711");
    let res = registry
        .send(
            "notify",
            SendRequest::new(&params, &["+18005550100", "+14255550123"]),
        )
        .await
        .unwrap();
    assert_eq!(res.provider, "azure");
    assert_eq!(res.id, "Outgoing_20240101_abc");
}

#[tokio::test]
async fn test_registry_unknown_sender() {
    let registry = SenderRegistry::new();
    let params = TemplateParams::new();
    let err = registry
        .send("missing", SendRequest::new(&params, &["+1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, SmsError::Invalid(ref m) if m == "unknown sender: missing"));
}

#[tokio::test]
async fn test_registry_rejects_incomplete_provider() {
    let tencent = ProviderConfig::new(Provider::TencentCloud).credentials("sid", "skey");
    let config = config_with(vec![("verify", tencent)], RateLimitConfig::default());
    let err = SenderRegistry::from_config(&config).unwrap_err();
    assert!(matches!(err, SmsError::Invalid(ref m) if m == "missing parameter: appId"));
}

#[tokio::test]
async fn test_registry_applies_per_provider_rate_limit() {
    let mut rate_limit = RateLimitConfig::default();
    rate_limit.per_provider.insert(
        "mock".to_string(),
        ProviderRateLimit {
            max_requests: 2,
            window_seconds: 60,
        },
    );
    let config = config_with(
        vec![
            ("a", ProviderConfig::new(Provider::Mock)),
            ("b", ProviderConfig::new(Provider::Mock)),
        ],
        rate_limit,
    );
    let registry = SenderRegistry::from_config(&config).unwrap();
    assert_eq!(registry.names(), vec!["a", "b"]);

    let params = code("1");
    let to = ["+8613800000000"];
    for _ in 0..2 {
        registry.send("a", SendRequest::new(&params, &to)).await.unwrap();
    }
    let err = registry
        .send("a", SendRequest::new(&params, &to))
        .await
        .unwrap_err();
    assert!(matches!(err, SmsError::RateLimited(d) if d > Duration::ZERO));

    // Each registry name has its own bucket.
    registry.send("b", SendRequest::new(&params, &to)).await.unwrap();
}

#[tokio::test]
async fn test_registry_without_rate_limit() {
    let rate_limit = RateLimitConfig {
        max_requests: 1,
        enabled: false,
        ..RateLimitConfig::default()
    };
    let config = config_with(vec![("dev", ProviderConfig::new(Provider::Mock))], rate_limit);
    let registry = SenderRegistry::from_config(&config).unwrap();

    let params = code("1");
    for _ in 0..5 {
        registry
            .send("dev", SendRequest::new(&params, &["+1"]))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_sends_share_one_mock() {
    use futures::future;

    let mock = Arc::new(MockClient::new());
    let mut registry = SenderRegistry::new();
    registry.insert("mock", mock.clone());

    let sends = (0..10).map(|i| {
        let registry = registry.clone();
        async move {
            let params = code(&format!("{:04}", i));
            registry
                .send("mock", SendRequest::new(&params, &["+8613800000000"]))
                .await
        }
    });

    let responses = future::join_all(sends).await;
    assert_eq!(responses.len(), 10);
    assert!(responses.iter().all(|r| r.is_ok()));
    assert_eq!(mock.sent_count(), 10);
}

#[tokio::test]
async fn test_vendor_error_passes_through_registry() {
    let mut registry = SenderRegistry::new();
    let failing: Arc<dyn SmsClient> = Arc::new(MockClient::failing("isv.BUSINESS_LIMIT_CONTROL"));
    let previous = registry.insert("flaky", failing);
    assert!(previous.is_none());

    let params = code("1");
    let err = registry
        .send("flaky", SendRequest::new(&params, &["+1"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "provider error: isv.BUSINESS_LIMIT_CONTROL");
}

#[test]
fn test_every_provider_name_round_trips() {
    for provider in Provider::ALL {
        let parsed: Provider = provider.to_string().parse().unwrap();
        assert_eq!(parsed, provider);
        let parsed: Provider = provider.key().parse().unwrap();
        assert_eq!(parsed, provider);
    }
}
