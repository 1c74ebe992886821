//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use locsync_core::config::{FieldMap, SyncConfig};
use locsync_source::SourceConfig;

const DEFAULT_IMPORT_INTERVAL_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_ASSET_DIR: &str = "./assets";

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the worker needs to build and schedule the engine.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub asset_dir: PathBuf,
    pub import_interval: Duration,
    pub sweep_interval: Duration,
    /// Persisted on startup when set; otherwise the stored value is kept.
    pub sweep_batch_size: Option<usize>,
    /// Fields that exist on the target type; the field map is checked
    /// against them on startup when set.
    pub known_fields: Option<Vec<String>>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default                   |
    /// |---------------------------------|---------------------------|
    /// | `DATABASE_URL`                  | required                  |
    /// | `SOURCE_API_KEY`                | required                  |
    /// | `SOURCE_BASE_URL`               | `https://api.yext.com`    |
    /// | `SOURCE_ACCOUNT`                | `me`                      |
    /// | `SOURCE_API_VERSION`            | `20180205`                |
    /// | `SYNC_RECORD_TYPE`              | `article`                 |
    /// | `SYNC_EXTERNAL_ID_FIELD`        | `field_yext_unique_id`    |
    /// | `SYNC_LAST_UPDATED_FIELD`       | `field_yext_last_updated` |
    /// | `SYNC_BIO_FIELD`                | unset                     |
    /// | `SYNC_HEADSHOT_FIELD`           | unset                     |
    /// | `SYNC_GEO_FIELD`                | unset                     |
    /// | `SYNC_RAW_FIELD`                | `field_yext_raw`          |
    /// | `SYNC_CUSTOM_FIELDS`            | empty (`id\|field` lines) |
    /// | `SYNC_FILTERS`                  | empty (JSON per line)     |
    /// | `SYNC_AUTO_DELETE_DUPLICATES`   | `false`                   |
    /// | `SYNC_UNPUBLISH_ON_INVALID_ID`  | `false`                   |
    /// | `SYNC_UPDATE_RAW_ON_SAVE`       | `false`                   |
    /// | `SYNC_FIND_BY_TITLE`            | `false`                   |
    /// | `SYNC_DRY_RUN`                  | `false`                   |
    /// | `ASSET_DIR`                     | `./assets`                |
    /// | `IMPORT_INTERVAL_SECS`          | `300`                     |
    /// | `SWEEP_INTERVAL_SECS`           | `60`                      |
    /// | `SWEEP_BATCH_SIZE`              | unset                     |
    /// | `SYNC_KNOWN_FIELDS`             | unset (comma-separated)   |
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(WorkerConfigError::Missing("DATABASE_URL"))?;
        let api_key = var("SOURCE_API_KEY").ok_or(WorkerConfigError::Missing("SOURCE_API_KEY"))?;

        let source_defaults = SourceConfig::default();
        let source = SourceConfig {
            base_url: var("SOURCE_BASE_URL").unwrap_or(source_defaults.base_url),
            api_key,
            account: var("SOURCE_ACCOUNT").unwrap_or(source_defaults.account),
            api_version: var("SOURCE_API_VERSION").unwrap_or(source_defaults.api_version),
        };

        let sync_defaults = SyncConfig::default();
        let custom_text = var("SYNC_CUSTOM_FIELDS").unwrap_or_default();
        let custom = FieldMap::parse_custom(&custom_text).map_err(|e| WorkerConfigError::Invalid {
            var: "SYNC_CUSTOM_FIELDS",
            value: custom_text.clone(),
            reason: e.to_string(),
        })?;
        let field_map = FieldMap {
            bio: var("SYNC_BIO_FIELD"),
            headshot: var("SYNC_HEADSHOT_FIELD"),
            geo: var("SYNC_GEO_FIELD"),
            raw: var("SYNC_RAW_FIELD").or(sync_defaults.field_map.raw),
            custom,
        };

        let sync = SyncConfig {
            record_type: var("SYNC_RECORD_TYPE").unwrap_or(sync_defaults.record_type),
            external_id_field: var("SYNC_EXTERNAL_ID_FIELD")
                .unwrap_or(sync_defaults.external_id_field),
            last_updated_field: var("SYNC_LAST_UPDATED_FIELD")
                .unwrap_or(sync_defaults.last_updated_field),
            field_map,
            filters: lookup("SYNC_FILTERS").unwrap_or_default(),
            auto_delete_duplicates: parse_flag(&var, "SYNC_AUTO_DELETE_DUPLICATES")?,
            unpublish_on_invalid_id: parse_flag(&var, "SYNC_UNPUBLISH_ON_INVALID_ID")?,
            update_raw_on_save: parse_flag(&var, "SYNC_UPDATE_RAW_ON_SAVE")?,
            find_by_title: parse_flag(&var, "SYNC_FIND_BY_TITLE")?,
            dry_run: parse_flag(&var, "SYNC_DRY_RUN")?,
        };

        let import_secs = parse_number(&var, "IMPORT_INTERVAL_SECS")?.unwrap_or(DEFAULT_IMPORT_INTERVAL_SECS);
        let sweep_secs = parse_number(&var, "SWEEP_INTERVAL_SECS")?.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        for (name, secs) in [("IMPORT_INTERVAL_SECS", import_secs), ("SWEEP_INTERVAL_SECS", sweep_secs)] {
            if secs == 0 {
                return Err(WorkerConfigError::Invalid {
                    var: name,
                    value: "0".into(),
                    reason: "interval must be positive".into(),
                });
            }
        }

        let sweep_batch_size = parse_number::<usize>(&var, "SWEEP_BATCH_SIZE")?;
        if sweep_batch_size == Some(0) {
            return Err(WorkerConfigError::Invalid {
                var: "SWEEP_BATCH_SIZE",
                value: "0".into(),
                reason: "batch size must be at least 1".into(),
            });
        }

        Ok(Self {
            database_url,
            source,
            sync,
            asset_dir: PathBuf::from(var("ASSET_DIR").unwrap_or_else(|| DEFAULT_ASSET_DIR.into())),
            import_interval: Duration::from_secs(import_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            sweep_batch_size,
            known_fields: var("SYNC_KNOWN_FIELDS").map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }
}

fn parse_flag(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<bool, WorkerConfigError> {
    match var(name) {
        None => Ok(false),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(WorkerConfigError::Invalid {
                var: name,
                value,
                reason: "expected a boolean".into(),
            }),
        },
    }
}

fn parse_number<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, WorkerConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| WorkerConfigError::Invalid {
                var: name,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, WorkerConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/locsync"),
        ("SOURCE_API_KEY", "k"),
    ];

    #[test]
    fn defaults_with_required_vars_only() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.source.base_url, "https://api.yext.com");
        assert_eq!(config.source.account, "me");
        assert_eq!(config.sync.record_type, "article");
        assert_eq!(config.sync.field_map.raw.as_deref(), Some("field_yext_raw"));
        assert!(config.sync.field_map.custom.is_empty());
        assert_eq!(config.import_interval, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.sweep_batch_size, None);
        assert_eq!(config.known_fields, None);
        assert!(!config.sync.dry_run);
    }

    #[test]
    fn missing_required_vars() {
        assert_matches!(
            load(&[("SOURCE_API_KEY", "k")]),
            Err(WorkerConfigError::Missing("DATABASE_URL"))
        );
        assert_matches!(
            load(&[("DATABASE_URL", "postgres://x"), ("SOURCE_API_KEY", "  ")]),
            Err(WorkerConfigError::Missing("SOURCE_API_KEY"))
        );
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("SOURCE_ACCOUNT", "4242"),
            ("SYNC_RECORD_TYPE", "person"),
            ("SYNC_BIO_FIELD", "field_bio"),
            ("SYNC_CUSTOM_FIELDS", "12819|field_profile\nc_x][y|field_y"),
            ("SYNC_FILTERS", "{\"a\":1}\n[{\"b\":2}]"),
            ("SYNC_DRY_RUN", "yes"),
            ("SYNC_FIND_BY_TITLE", "1"),
            ("SWEEP_BATCH_SIZE", "25"),
            ("IMPORT_INTERVAL_SECS", "30"),
            ("SYNC_KNOWN_FIELDS", "field_bio, field_profile,,"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.source.account, "4242");
        assert_eq!(config.sync.record_type, "person");
        assert_eq!(config.sync.field_map.bio.as_deref(), Some("field_bio"));
        assert_eq!(config.sync.field_map.custom.len(), 2);
        assert_eq!(config.sync.field_map.custom[1].source_id, "c_x][y");
        assert!(config.sync.filters.contains("\"b\":2"));
        assert!(config.sync.dry_run);
        assert!(config.sync.find_by_title);
        assert_eq!(config.sweep_batch_size, Some(25));
        assert_eq!(config.import_interval, Duration::from_secs(30));
        assert_eq!(
            config.known_fields,
            Some(vec!["field_bio".to_string(), "field_profile".to_string()])
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_DRY_RUN", "maybe"));
        assert_matches!(
            load(&vars),
            Err(WorkerConfigError::Invalid { var: "SYNC_DRY_RUN", .. })
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("SWEEP_BATCH_SIZE", "0"));
        assert_matches!(
            load(&vars),
            Err(WorkerConfigError::Invalid { var: "SWEEP_BATCH_SIZE", .. })
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("IMPORT_INTERVAL_SECS", "soon"));
        assert_matches!(
            load(&vars),
            Err(WorkerConfigError::Invalid { var: "IMPORT_INTERVAL_SECS", .. })
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_CUSTOM_FIELDS", "missing-separator"));
        assert_matches!(
            load(&vars),
            Err(WorkerConfigError::Invalid { var: "SYNC_CUSTOM_FIELDS", .. })
        );
    }
}
