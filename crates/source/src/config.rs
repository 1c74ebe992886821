use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.yext.com";
pub const DEFAULT_ACCOUNT: &str = "me";
pub const DEFAULT_API_VERSION: &str = "20180205";

/// Listing endpoint. `/me/` is replaced by the configured account.
pub const LOCATIONS_PATH: &str = "/v2/accounts/me/locations";

/// Connection settings for the listing API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: String,
    pub account: String,
    pub api_version: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            account: DEFAULT_ACCOUNT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}
