use locsync_core::error::SyncError;

/// Errors from the listing API client.
#[derive(Debug, thiserror::Error)]
pub enum SourceApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("Source API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Source has no record with ID {0}")]
    NotFound(String),

    #[error("Refusing to call the source API with an empty API key")]
    MissingApiKey,

    #[error("Refusing to request offset {offset}; the source API fails above {max}")]
    OffsetLimit { offset: u32, max: u32 },

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    /// The body decoded but lacks the expected `response` envelope.
    #[error("Unexpected response envelope: {0}")]
    Envelope(String),

    #[error("Asset download failed: {0}")]
    Asset(String),
}

impl From<SourceApiError> for SyncError {
    fn from(err: SourceApiError) -> Self {
        match err {
            SourceApiError::NotFound(id) => SyncError::NotFound(id),
            SourceApiError::OffsetLimit { offset, max } => SyncError::OffsetLimit { offset, max },
            SourceApiError::Envelope(msg) => SyncError::MalformedResponse(msg),
            SourceApiError::Asset(msg) => SyncError::AssetFetch(msg),
            e @ (SourceApiError::MissingApiKey | SourceApiError::InvalidUrl(_)) => {
                SyncError::Config(e.to_string())
            }
            e @ (SourceApiError::Request(_) | SourceApiError::ApiError { .. }) => {
                SyncError::Transport(e.to_string())
            }
        }
    }
}
