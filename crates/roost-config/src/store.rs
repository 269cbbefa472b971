//! The roost.json store configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use indexmap::IndexMap;
use roost_common::{is_compatible, INDEX_COLUMN, SCHEMA_VERSION};
use roost_core::{ColumnType, HookEvent, StoreOptions, DEFAULT_PROMOTION_CACHE_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::logging::{LogConfig, LogFormat, LogLevel};

/// Export sink implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Parquet,
    Feather,
    ArrowStream,
    Csv,
    JsonlStage,
}

impl SinkKind {
    /// Whether this sink consumes individual records rather than the store.
    pub fn is_stage_sink(&self) -> bool {
        matches!(self, SinkKind::JsonlStage)
    }

    /// Trigger used when a sink spec does not name one.
    pub fn default_trigger(&self) -> SinkTrigger {
        match self {
            SinkKind::Parquet | SinkKind::Feather => SinkTrigger::Finalize,
            SinkKind::ArrowStream | SinkKind::Csv => SinkTrigger::Commit,
            SinkKind::JsonlStage => SinkTrigger::Stage,
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Parquet => write!(f, "parquet"),
            SinkKind::Feather => write!(f, "feather"),
            SinkKind::ArrowStream => write!(f, "arrow_stream"),
            SinkKind::Csv => write!(f, "csv"),
            SinkKind::JsonlStage => write!(f, "jsonl_stage"),
        }
    }
}

/// Lifecycle event a sink is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkTrigger {
    Stage,
    Add,
    Commit,
    Batch,
    Finalize,
}

impl SinkTrigger {
    pub fn event(&self) -> HookEvent {
        match self {
            SinkTrigger::Stage => HookEvent::Stage,
            SinkTrigger::Add => HookEvent::Add,
            SinkTrigger::Commit => HookEvent::Commit,
            SinkTrigger::Batch => HookEvent::Batch,
            SinkTrigger::Finalize => HookEvent::Finalize,
        }
    }
}

/// Compression for columnar file sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionSpec {
    #[default]
    Zstd,
    Snappy,
    #[serde(rename = "none")]
    Uncompressed,
}

/// One configured export sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub kind: SinkKind,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<SinkTrigger>,
    #[serde(default)]
    pub compression: CompressionSpec,
}

impl SinkSpec {
    pub fn new(kind: SinkKind, path: impl Into<PathBuf>) -> Self {
        SinkSpec {
            kind,
            path: path.into(),
            trigger: None,
            compression: CompressionSpec::default(),
        }
    }

    pub fn with_trigger(mut self, trigger: SinkTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_compression(mut self, compression: CompressionSpec) -> Self {
        self.compression = compression;
        self
    }

    /// The configured trigger, or the kind's default.
    pub fn effective_trigger(&self) -> SinkTrigger {
        self.trigger.unwrap_or_else(|| self.kind.default_trigger())
    }
}

/// Logging section of roost.json.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_PROMOTION_CACHE_CAPACITY
}

/// Store configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default = "default_cache_capacity")]
    pub promotion_cache_capacity: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_threshold: Option<usize>,

    /// Declared schemas: key → (field → type name).
    #[serde(default)]
    pub schemas: IndexMap<String, IndexMap<String, String>>,

    #[serde(default)]
    pub sinks: Vec<SinkSpec>,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            schema_version: default_schema_version(),
            promotion_cache_capacity: default_cache_capacity(),
            batch_threshold: None,
            schemas: IndexMap::new(),
            sinks: Vec::new(),
            logging: LoggingSection::default(),
        }
    }
}

impl StoreConfig {
    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Parse config from a JSON string.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Json(format!("Invalid JSON: {}", e)))
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Semantic validation.
    pub fn validate(&self) -> ConfigResult<()> {
        if !is_compatible(&self.schema_version) {
            return Err(ConfigError::VersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if self.batch_threshold == Some(0) {
            return Err(ConfigError::invalid(
                "batch_threshold",
                "must be at least 1",
            ));
        }

        for (key, fields) in &self.schemas {
            for (name, type_name) in fields {
                if name == INDEX_COLUMN {
                    return Err(ConfigError::invalid(
                        format!("schemas.{}.{}", key, name),
                        "field name is reserved",
                    ));
                }
                parse_type(key, name, type_name)?;
            }
        }

        for (i, sink) in self.sinks.iter().enumerate() {
            if sink.path.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    format!("sinks[{}].path", i),
                    "must not be empty",
                ));
            }
            let trigger = sink.effective_trigger();
            if sink.kind.is_stage_sink() != trigger.event().is_record_event() {
                return Err(ConfigError::invalid(
                    format!("sinks[{}].trigger", i),
                    format!("{} sink cannot run on {}", sink.kind, trigger.event()),
                ));
            }
        }

        Ok(())
    }

    /// Store options built from this config.
    pub fn store_options(&self) -> ConfigResult<StoreOptions> {
        let mut options = StoreOptions::default()
            .with_promotion_cache_capacity(self.promotion_cache_capacity);
        if let Some(rows) = self.batch_threshold {
            options = options.with_batch_threshold(rows);
        }

        for (key, fields) in &self.schemas {
            let fields = fields
                .iter()
                .map(|(name, type_name)| {
                    parse_type(key, name, type_name).map(|ty| ty.field(name))
                })
                .collect::<ConfigResult<Vec<Field>>>()?;
            options = options.with_schema(key.clone(), Arc::new(Schema::new(fields)));
        }

        Ok(options)
    }

    /// Logging config: file values, then environment, then explicit overrides.
    pub fn log_config(
        &self,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> LogConfig {
        let mut base = LogConfig::default();
        if let Some(level) = self.logging.level {
            base.level = level;
        }
        if let Some(format) = self.logging.format {
            base.format = format;
        }
        LogConfig::resolve(base, cli_level, cli_format)
    }
}

fn parse_type(key: &str, name: &str, type_name: &str) -> ConfigResult<ColumnType> {
    type_name
        .parse::<ColumnType>()
        .map_err(|_| ConfigError::UnknownType {
            field: format!("schemas.{}.{}", key, name),
            type_name: type_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    const SAMPLE: &str = r#"{
        "schema_version": "1.0.0",
        "batch_threshold": 100,
        "schemas": {
            "imu": { "t": "timestamp[ms]", "ax": "float32", "mode": "dictionary" }
        },
        "sinks": [
            { "kind": "parquet", "path": "out/roost.parquet", "compression": "snappy" },
            { "kind": "csv", "path": "out/roost.csv", "trigger": "batch" },
            { "kind": "jsonl_stage", "path": "out/staged.jsonl" }
        ],
        "logging": { "level": "debug" }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = StoreConfig::from_json_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.batch_threshold, Some(100));
        assert_eq!(config.promotion_cache_capacity, DEFAULT_PROMOTION_CACHE_CAPACITY);
        assert_eq!(config.sinks[0].compression, CompressionSpec::Snappy);
        assert_eq!(config.sinks[0].effective_trigger(), SinkTrigger::Finalize);
        assert_eq!(config.sinks[1].effective_trigger(), SinkTrigger::Batch);
        assert_eq!(config.sinks[2].effective_trigger(), SinkTrigger::Stage);
    }

    #[test]
    fn test_store_options_schemas() {
        let config = StoreConfig::from_json_str(SAMPLE).unwrap();
        let options = config.store_options().unwrap();
        assert_eq!(options.batch_threshold, Some(100));
        let schema = &options.schemas["imu"];
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["t", "ax", "mode"]);
        assert_eq!(schema.field(1).data_type(), &DataType::Float32);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        config.validate().unwrap();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(StoreConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_unknown_type() {
        let config = StoreConfig::from_json_str(r#"{"schemas": {"k": {"x": "decimal"}}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType { .. }));
        assert!(err.to_string().contains("schemas.k.x"));
    }

    #[test]
    fn test_rejects_reserved_field() {
        let config =
            StoreConfig::from_json_str(r#"{"schemas": {"k": {"index": "int64"}}}"#).unwrap();
        assert_eq!(config.validate().unwrap_err().code(), 72);
    }

    #[test]
    fn test_rejects_mismatched_trigger() {
        let config = StoreConfig {
            sinks: vec![
                SinkSpec::new(SinkKind::Parquet, "x.parquet").with_trigger(SinkTrigger::Stage)
            ],
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            sinks: vec![
                SinkSpec::new(SinkKind::JsonlStage, "x.jsonl").with_trigger(SinkTrigger::Commit)
            ],
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_incompatible_version() {
        let config = StoreConfig {
            schema_version: "2.0.0".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = StoreConfig {
            batch_threshold: Some(0),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = StoreConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.code(), 71);
    }
}
