use crate::types::DbId;

/// Errors raised by the synchronization engine and its collaborators.
///
/// Any error raised while importing a single item is caught at the per-item
/// boundary of a crawl and recorded as a failure. Errors from fetching a page,
/// preloading its records or touching persisted state abort the invocation and
/// leave the checkpoint in place for the next one.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Required field '{field}' missing from source record: {message}")]
    RequiredFieldMissing {
        field: &'static str,
        message: &'static str,
    },

    #[error(
        "More than one record has the value '{value}' which should be unique for {field}: \
         {kept_id} and {conflicting_id}"
    )]
    DuplicateKey {
        field: String,
        value: String,
        kept_id: DbId,
        conflicting_id: DbId,
    },

    #[error("Source transport error: {0}")]
    Transport(String),

    #[error("Source record not found: {0}")]
    NotFound(String),

    #[error("Asset fetch failed: {0}")]
    AssetFetch(String),

    #[error("Offset {offset} exceeds the maximum of {max} supported by the source API")]
    OffsetLimit { offset: u32, max: u32 },

    #[error("Malformed source response: {0}")]
    MalformedResponse(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_names_both_records() {
        let err = SyncError::DuplicateKey {
            field: "field_yext_unique_id".to_string(),
            value: "12345".to_string(),
            kept_id: 3,
            conflicting_id: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("field_yext_unique_id"));
        assert!(msg.contains("12345"));
        assert!(msg.contains("3 and 7"));
    }
}
