//! Request attributes consumed by rule evaluation.
//!
//! Attributes are populated upstream (see `http::middleware`); the engine
//! itself never looks at raw request headers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Account fields exposed to rule expressions under `user`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountFields {
    pub role: u8,
    pub channel: String,
    pub platform: String,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub phone_num: String,
    pub email: String,
    pub source: u8,
    pub extra: String,
    pub vip_expire_timestamp: u32,
    pub ctime: u32,
    pub template_ids: Vec<String>,
    pub business: String,
    pub union_id: String,
}

/// Everything a rule may look at for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestAttributes {
    /// Caller identity (account id). Drives allow/deny lists and bucketing.
    pub identity: String,
    pub device: String,
    pub platform: String,
    pub app_type: String,
    pub version: String,
    pub business: String,
    pub account: AccountFields,
    /// Extra targeting dimensions supplied by the embedding service.
    pub raw: HashMap<String, Value>,
}

impl RequestAttributes {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    pub fn with_device(mut self, device: impl AsRef<str>) -> Self {
        self.device = device.as_ref().to_lowercase();
        self
    }

    pub fn with_platform(mut self, platform: impl AsRef<str>) -> Self {
        self.platform = platform.as_ref().to_lowercase();
        self
    }

    pub fn with_app_type(mut self, app_type: impl AsRef<str>) -> Self {
        self.app_type = app_type.as_ref().to_lowercase();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_business(mut self, business: impl Into<String>) -> Self {
        self.business = business.into();
        self
    }

    pub fn with_account(mut self, account: AccountFields) -> Self {
        self.account = account;
        self
    }

    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Resolve a targeting dimension to its textual value.
    ///
    /// Built-in dimensions read the typed fields; any other name is looked
    /// up in `raw`. Strings are borrowed, numbers and booleans rendered.
    /// Values of [`BUILTIN_DIMENSIONS`] always come back lowercased, even
    /// when the field was assigned directly rather than through a builder.
    pub fn dimension(&self, name: &str) -> Option<Cow<'_, str>> {
        let typed = match name {
            "device" => Some(&self.device),
            "platform" => Some(&self.platform),
            "app_type" => Some(&self.app_type),
            "version" => Some(&self.version),
            "business" => Some(&self.business),
            _ => None,
        };
        if let Some(value) = typed {
            if BUILTIN_DIMENSIONS.contains(&name) && value.chars().any(char::is_uppercase) {
                return Some(Cow::Owned(value.to_lowercase()));
            }
            return Some(Cow::Borrowed(value.as_str()));
        }

        match self.raw.get(name)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

/// Dimensions backed by typed, lowercased attributes.
pub const BUILTIN_DIMENSIONS: [&str; 3] = ["device", "platform", "app_type"];
