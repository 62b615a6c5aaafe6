//! Translator configuration.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::metadata::short_name;

/// Default suffix of deduced relation table names.
pub const DEFAULT_RELATION_TABLE_SUFFIX: &str = "Table";

/// Default separator between path segments and in nested column names.
pub const DEFAULT_SEPARATOR: &str = ".";

/// How principal table names are derived from type names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub enum TableNaming {
    /// Full qualified type name.
    #[default]
    Qualified,
    /// Type name without its namespace prefix.
    Unqualified,
    /// Type name with one namespace prefix removed when present.
    StripPrefix(String),
}

impl TableNaming {
    /// Table name for a qualified type name.
    pub fn table_name(&self, type_name: &str) -> String {
        match self {
            TableNaming::Qualified => type_name.to_string(),
            TableNaming::Unqualified => short_name(type_name).to_string(),
            TableNaming::StripPrefix(prefix) => type_name
                .strip_prefix(prefix.as_str())
                .filter(|rest| !rest.is_empty())
                .unwrap_or(type_name)
                .to_string(),
        }
    }
}

/// Translator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Principal table naming.
    pub table_naming: TableNaming,

    /// Suffix of deduced relation table names.
    pub relation_table_suffix: String,

    /// Path and column-name separator.
    pub separator: String,

    /// Maximum worker threads per translation layer.
    pub workers: usize,
}

impl TranslatorConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            table_naming: TableNaming::default(),
            relation_table_suffix: DEFAULT_RELATION_TABLE_SUFFIX.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            workers: default_workers(),
        }
    }

    /// Load a configuration from a JSON document. Missing settings keep
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TranslatorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings for values the translator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "separator",
                reason: "must not be empty".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Set the table naming rule.
    pub fn with_table_naming(mut self, naming: TableNaming) -> Self {
        self.table_naming = naming;
        self
    }

    /// Set the relation table suffix.
    pub fn with_relation_table_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.relation_table_suffix = suffix.into();
        self
    }

    /// Set the separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the number of worker threads. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
