//! Catalogue of supported vendors.

use serde::{Deserialize, Serialize};
use sms_core::SmsError;
use std::fmt;
use std::str::FromStr;

/// Every vendor [`crate::new_sms_client`] can build.
///
/// Parsed from either the display name (`"Aliyun SMS"`) or the provider key
/// (`"aliyun"`), and serialized as the display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    Aliyun,
    TencentCloud,
    VolcEngine,
    Huyi,
    HuaweiCloud,
    Twilio,
    SmsBao,
    Submail,
    Mock,
    AmazonSns,
    AzureAcs,
    BaiduCloud,
    Gccpay,
    Infobip,
    Msg91,
    Netgsm,
    Oson,
    Quanm,
    SendCloud,
    Ucloud,
    Unisms,
}

impl Provider {
    pub const ALL: [Provider; 21] = [
        Provider::Aliyun,
        Provider::TencentCloud,
        Provider::VolcEngine,
        Provider::Huyi,
        Provider::HuaweiCloud,
        Provider::Twilio,
        Provider::SmsBao,
        Provider::Submail,
        Provider::Mock,
        Provider::AmazonSns,
        Provider::AzureAcs,
        Provider::BaiduCloud,
        Provider::Gccpay,
        Provider::Infobip,
        Provider::Msg91,
        Provider::Netgsm,
        Provider::Oson,
        Provider::Quanm,
        Provider::SendCloud,
        Provider::Ucloud,
        Provider::Unisms,
    ];

    /// Vendor display name.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Aliyun => "Aliyun SMS",
            Provider::TencentCloud => "Tencent Cloud SMS",
            Provider::VolcEngine => "Volc Engine SMS",
            Provider::Huyi => "Huyi SMS",
            Provider::HuaweiCloud => "Huawei Cloud SMS",
            Provider::Twilio => "Twilio SMS",
            Provider::SmsBao => "SmsBao SMS",
            Provider::Submail => "SUBMAIL SMS",
            Provider::Mock => "Mock SMS",
            Provider::AmazonSns => "Amazon SNS",
            Provider::AzureAcs => "Azure ACS",
            Provider::BaiduCloud => "Baidu Cloud SMS",
            Provider::Gccpay => "GCCPAY SMS",
            Provider::Infobip => "Infobip SMS",
            Provider::Msg91 => "Msg91 SMS",
            Provider::Netgsm => "Netgsm SMS",
            Provider::Oson => "OSON SMS",
            Provider::Quanm => "Quanm SMS",
            Provider::SendCloud => "SendCloud SMS",
            Provider::Ucloud => "UCloud SMS",
            Provider::Unisms => "Uni SMS",
        }
    }

    /// Provider key, identical to [`sms_core::SmsClient::provider`] of the built client.
    pub fn key(self) -> &'static str {
        match self {
            Provider::Aliyun => "aliyun",
            Provider::TencentCloud => "tencent",
            Provider::VolcEngine => "volcengine",
            Provider::Huyi => "huyi",
            Provider::HuaweiCloud => "huawei",
            Provider::Twilio => "twilio",
            Provider::SmsBao => "smsbao",
            Provider::Submail => "submail",
            Provider::Mock => "mock",
            Provider::AmazonSns => "aws-sns",
            Provider::AzureAcs => "azure",
            Provider::BaiduCloud => "baidu",
            Provider::Gccpay => "gccpay",
            Provider::Infobip => "infobip",
            Provider::Msg91 => "msg91",
            Provider::Netgsm => "netgsm",
            Provider::Oson => "oson",
            Provider::Quanm => "quanm",
            Provider::SendCloud => "sendcloud",
            Provider::Ucloud => "ucloud",
            Provider::Unisms => "unisms",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Provider::ALL
            .into_iter()
            .find(|p| p.display_name() == name || p.key() == name)
            .ok_or_else(|| SmsError::Invalid(format!("unsupported provider: {}", s)))
    }
}

impl TryFrom<String> for Provider {
    type Error = SmsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(value: Provider) -> Self {
        value.display_name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_display_names_and_keys() {
        assert_eq!("Aliyun SMS".parse::<Provider>().unwrap(), Provider::Aliyun);
        assert_eq!("aws-sns".parse::<Provider>().unwrap(), Provider::AmazonSns);
        assert_eq!("Uni SMS".parse::<Provider>().unwrap(), Provider::Unisms);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = "Carrier Pigeon".parse::<Provider>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request: unsupported provider: Carrier Pigeon"
        );
    }

    #[test]
    fn names_and_keys_are_unique() {
        let names: HashSet<_> = Provider::ALL.iter().map(|p| p.display_name()).collect();
        let keys: HashSet<_> = Provider::ALL.iter().map(|p| p.key()).collect();
        assert_eq!(names.len(), Provider::ALL.len());
        assert_eq!(keys.len(), Provider::ALL.len());
        for p in Provider::ALL {
            assert_eq!(p.to_string().parse::<Provider>().unwrap(), p);
        }
    }

    #[test]
    fn serde_uses_display_name() {
        let json = serde_json::to_string(&Provider::HuaweiCloud).unwrap();
        assert_eq!(json, "\"Huawei Cloud SMS\"");
        let parsed: Provider = serde_json::from_str("\"tencent\"").unwrap();
        assert_eq!(parsed, Provider::TencentCloud);
    }
}
