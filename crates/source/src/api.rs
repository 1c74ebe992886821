//! REST client for the location listing API.
//!
//! Builds listing and single-record URLs, refuses calls that are known to
//! fail (empty API key, offset above the documented maximum) before making
//! them, unwraps the `{"response": ...}` envelope and downloads headshot
//! images.

use async_trait::async_trait;
use locsync_core::error::SyncResult;
use locsync_core::source::{Asset, SourceClient, SourcePage, MAX_OFFSET, PAGE_LIMIT};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;

use crate::config::{SourceConfig, LOCATIONS_PATH};
use crate::error::SourceApiError;

/// Shown instead of the API key in logs and connection test output.
pub const API_KEY_PLACEHOLDER: &str = "API-KEY-HIDDEN-FOR-SECURITY";

/// Content types accepted for headshot images.
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Result of probing the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    /// Detail with the API key redacted.
    pub more: String,
}

/// Replace every occurrence of `key` in `text`.
pub fn redact(text: &str, key: &str) -> String {
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, API_KEY_PLACEHOLDER)
}

/// HTTP client for one account of the listing API.
pub struct LocationApi {
    client: reqwest::Client,
    config: SourceConfig,
}

impl LocationApi {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Build a request URL for `path`.
    ///
    /// `/me/` in the path becomes the configured account. Fails before any
    /// network activity when the key is empty or `offset` exceeds
    /// [`MAX_OFFSET`].
    pub fn build_url(&self, path: &str, filters: &[Value], offset: u32) -> Result<Url, SourceApiError> {
        if offset > MAX_OFFSET {
            return Err(SourceApiError::OffsetLimit {
                offset,
                max: MAX_OFFSET,
            });
        }
        let key = self.config.api_key.as_str();
        if key.is_empty() {
            return Err(SourceApiError::MissingApiKey);
        }

        let path = path.replace("/me/", &format!("/{}/", self.config.account));
        let base = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let mut params = vec![
            ("limit", PAGE_LIMIT.to_string()),
            ("offset", offset.to_string()),
            ("api_key", key.to_string()),
            ("v", self.config.api_version.clone()),
        ];
        if !filters.is_empty() {
            params.push(("filters", Value::Array(filters.to_vec()).to_string()));
        }

        let url = Url::parse_with_params(&base, &params)
            .map_err(|e| SourceApiError::InvalidUrl(format!("{}: {e}", redact(&base, key))))?;
        tracing::debug!(url = %redact(url.as_str(), key), "Built source URL");
        Ok(url)
    }

    /// URL of a single location. `id` is appended as one escaped path
    /// segment.
    pub fn record_url(&self, id: &str) -> Result<Url, SourceApiError> {
        let mut url = self.build_url(LOCATIONS_PATH, &[], 0)?;
        url.path_segments_mut()
            .map_err(|_| SourceApiError::InvalidUrl("base URL cannot carry a path".into()))?
            .push(id);
        Ok(url)
    }

    /// Fetch one page of the location listing.
    pub async fn query_locations(&self, filters: &[Value], offset: u32) -> Result<SourcePage, SourceApiError> {
        let url = self.build_url(LOCATIONS_PATH, filters, offset)?;
        let response = self.client.get(url).send().await?;
        let body: Value = Self::parse_response(response).await?;
        parse_listing(body)
    }

    /// Fetch a single location. A 404 is [`SourceApiError::NotFound`].
    pub async fn record_by_id(&self, id: &str) -> Result<Value, SourceApiError> {
        let url = self.record_url(id)?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceApiError::NotFound(id.to_string()));
        }
        let body: Value = Self::parse_response(response).await?;
        parse_single(body)
    }

    /// Download an image, validating status, content type and length.
    pub async fn download_asset(&self, url: &str) -> Result<Asset, SourceApiError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let declared_len = response.content_length();
        let bytes = response.bytes().await?.to_vec();
        validate_asset(url, status, content_type.as_deref(), declared_len, bytes)
    }

    /// Probe the listing endpoint with the configured key and account.
    pub async fn test_connection(&self) -> ConnectionTest {
        let key = self.config.api_key.clone();
        let result = match self.build_url(LOCATIONS_PATH, &[], 0) {
            Ok(url) => match self.client.get(url).send().await {
                Ok(response) => Self::ensure_success(response)
                    .await
                    .map(|r| format!("Call to server resulted in status {}", r.status())),
                Err(e) => Err(SourceApiError::Request(e)),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(more) => ConnectionTest {
                success: true,
                message: "Connection successful".to_string(),
                more: redact(&more, &key),
            },
            Err(e @ (SourceApiError::MissingApiKey | SourceApiError::InvalidUrl(_))) => ConnectionTest {
                success: false,
                message: "Exception thrown while connecting".to_string(),
                more: redact(&e.to_string(), &key),
            },
            Err(e) => {
                tracing::warn!(error = %redact(&e.to_string(), &key), "Source connection test failed");
                ConnectionTest {
                    success: false,
                    message: "Connection failed".to_string(),
                    more: redact(&e.to_string(), &key),
                }
            }
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into
    /// [`SourceApiError::ApiError`] carrying the body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SourceApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SourceApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SourceApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SourceClient for LocationApi {
    async fn fetch_page(&self, filters: &[Value], offset: u32) -> SyncResult<SourcePage> {
        Ok(self.query_locations(filters, offset).await?)
    }

    async fn fetch_by_id(&self, external_id: &str) -> SyncResult<Value> {
        Ok(self.record_by_id(external_id).await?)
    }

    async fn fetch_asset(&self, url: &str) -> SyncResult<Asset> {
        Ok(self.download_asset(url).await?)
    }
}

// ---------------------------------------------------------------------------
// Envelope and asset validation
// ---------------------------------------------------------------------------

/// Unwrap `{"response": {"count": n, "locations": [...]}}`.
pub fn parse_listing(body: Value) -> Result<SourcePage, SourceApiError> {
    let Value::Object(mut root) = body else {
        return Err(SourceApiError::Envelope("body is not an object".into()));
    };
    let Some(Value::Object(mut response)) = root.remove("response") else {
        return Err(SourceApiError::Envelope("missing 'response' object".into()));
    };
    let count = response
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| SourceApiError::Envelope("missing numeric 'response.count'".into()))?;
    let items = match response.remove("locations") {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(SourceApiError::Envelope("'response.locations' is not an array".into()))
        }
    };
    Ok(SourcePage { count, items })
}

/// Unwrap `{"response": {...}}`; an empty response is an error.
pub fn parse_single(body: Value) -> Result<Value, SourceApiError> {
    match body.get("response") {
        Some(Value::Object(obj)) if !obj.is_empty() => Ok(Value::Object(obj.clone())),
        _ => Err(SourceApiError::Envelope(
            "got data from the source but it does not contain a 'response' key".into(),
        )),
    }
}

/// Accept a downloaded image only with status 200, a JPEG or PNG content
/// type and a body matching the declared length.
pub fn validate_asset(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    declared_len: Option<u64>,
    bytes: Vec<u8>,
) -> Result<Asset, SourceApiError> {
    if status != 200 {
        return Err(SourceApiError::Asset(format!("{url} results in response code {status}")));
    }
    let content_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(SourceApiError::Asset(format!(
            "{url} has content type '{content_type}', expected one of {}",
            ACCEPTED_IMAGE_TYPES.join(", ")
        )));
    }
    if let Some(expected) = declared_len {
        if expected != bytes.len() as u64 {
            return Err(SourceApiError::Asset(format!(
                "{url} declared {expected} bytes but {} were received",
                bytes.len()
            )));
        }
    }
    Ok(Asset {
        url: url.to_string(),
        content_type,
        bytes,
    })
}
