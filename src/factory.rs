//! Build any adapter from one generic set of arguments.

use crate::mock::MockClient;
use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use sms_core::{SmsClient, SmsError};
use std::sync::Arc;
use tracing::debug;

use sms_aliyun::AliyunClient;
use sms_aws_sns::AwsSnsClient;
use sms_azure::AzureClient;
use sms_baidu::BaiduClient;
use sms_gccpay::GccpayClient;
use sms_huawei::HuaweiClient;
use sms_huyi::HuyiClient;
use sms_infobip::InfobipClient;
use sms_msg91::Msg91Client;
use sms_netgsm::NetgsmClient;
use sms_oson::OsonClient;
use sms_quanm::QuanmClient;
use sms_sendcloud::SendCloudClient;
use sms_smsbao::SmsBaoClient;
use sms_submail::SubmailClient;
use sms_tencent::TencentClient;
use sms_twilio::TwilioClient;
use sms_ucloud::UcloudClient;
use sms_unisms::UnismsClient;
use sms_volcengine::VolcClient;

/// Constructor arguments shared by every vendor.
///
/// What `access_id`, `access_key`, `sign` and `template` mean depends on the
/// vendor; `other` carries the positional extras a few vendors need:
///
/// | provider | `other` |
/// |---|---|
/// | Aliyun | `[region]` (optional) |
/// | Tencent Cloud | `[app id]` |
/// | Volc Engine | `[sms account]` |
/// | Huawei Cloud | `[api address, sender]` |
/// | SmsBao | `[goods id]` (optional) |
/// | Amazon SNS | `[region]` |
/// | Azure ACS | `[endpoint]` |
/// | Baidu Cloud | `[endpoint]` |
/// | Infobip | `[base url]` |
/// | UCloud | `[project id]` |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    #[serde(default)]
    pub access_id: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub other: Vec<String>,
}

impl ProviderConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            access_id: String::new(),
            access_key: String::new(),
            sign: String::new(),
            template: String::new(),
            other: Vec::new(),
        }
    }

    pub fn credentials(mut self, access_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        self.access_id = access_id.into();
        self.access_key = access_key.into();
        self
    }

    pub fn sign(mut self, sign: impl Into<String>) -> Self {
        self.sign = sign.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn other(mut self, value: impl Into<String>) -> Self {
        self.other.push(value.into());
        self
    }

    fn extra(&self, index: usize) -> Option<&str> {
        self.other
            .get(index)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require_extra(&self, index: usize, name: &str) -> Result<&str, SmsError> {
        self.extra(index)
            .ok_or_else(|| SmsError::Invalid(format!("missing parameter: {}", name)))
    }
}

/// Build the adapter selected by `config.provider`, sending through `http`.
pub fn new_sms_client(
    config: &ProviderConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn SmsClient>, SmsError> {
    let c = config;
    let http = http.clone();
    debug!("Building {} client", c.provider);

    let client: Arc<dyn SmsClient> = match c.provider {
        Provider::Aliyun => {
            let mut client = AliyunClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
            );
            if let Some(region) = c.extra(0) {
                client = client.with_region(region);
            }
            Arc::new(client.with_http_client(http))
        }
        Provider::TencentCloud => Arc::new(
            TencentClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
                c.require_extra(0, "appId")?,
            )
            .with_http_client(http),
        ),
        Provider::VolcEngine => Arc::new(
            VolcClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
                c.require_extra(0, "smsAccount")?,
            )
            .with_http_client(http),
        ),
        Provider::Huyi => Arc::new(
            HuyiClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::HuaweiCloud => {
            let (Some(api_address), Some(sender)) = (c.extra(0), c.extra(1)) else {
                return Err(SmsError::Invalid(
                    "missing parameter: apiAddress or sender".into(),
                ));
            };
            Arc::new(
                HuaweiClient::new(
                    c.access_id.as_str(),
                    c.access_key.as_str(),
                    c.sign.as_str(),
                    c.template.as_str(),
                    api_address,
                    sender,
                )
                .with_http_client(http),
            )
        }
        Provider::Twilio => Arc::new(
            TwilioClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::SmsBao => {
            let mut client = SmsBaoClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
            );
            if let Some(goods_id) = c.extra(0) {
                client = client.with_goods_id(goods_id);
            }
            Arc::new(client.with_http_client(http))
        }
        Provider::Submail => Arc::new(
            SubmailClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::Mock => Arc::new(MockClient::new()),
        Provider::AmazonSns => Arc::new(AwsSnsClient::new(
            c.require_extra(0, "region")?,
            c.access_id.as_str(),
            c.access_key.as_str(),
            c.template.as_str(),
        )),
        Provider::AzureAcs => Arc::new(
            AzureClient::new(
                c.access_key.as_str(),
                c.template.as_str(),
                c.require_extra(0, "endpoint")?,
            )
            .with_http_client(http),
        ),
        Provider::BaiduCloud => Arc::new(
            BaiduClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
                c.require_extra(0, "endpoint")?,
            )
            .with_http_client(http),
        ),
        Provider::Gccpay => Arc::new(
            GccpayClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::Infobip => Arc::new(
            InfobipClient::new(
                c.sign.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
                c.require_extra(0, "baseUrl")?,
            )
            .with_http_client(http),
        ),
        Provider::Msg91 => Arc::new(
            Msg91Client::new(
                c.sign.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::Netgsm => Arc::new(
            NetgsmClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::Oson => Arc::new(
            OsonClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::Quanm => Arc::new(
            QuanmClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
        Provider::SendCloud => Arc::new(
            SendCloudClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.template.as_str(),
            )?
            .with_http_client(http),
        ),
        Provider::Ucloud => Arc::new(
            UcloudClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
                c.require_extra(0, "projectId")?,
            )
            .with_http_client(http),
        ),
        Provider::Unisms => Arc::new(
            UnismsClient::new(
                c.access_id.as_str(),
                c.access_key.as_str(),
                c.sign.as_str(),
                c.template.as_str(),
            )
            .with_http_client(http),
        ),
    };
    Ok(client)
}
