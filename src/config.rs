//! TOML configuration.
//!
//! ```toml
//! dialect = "sqlite"
//!
//! [database]
//! path = "chinook.db"
//!
//! [tables.genres]
//! get = 'SELECT "GenreId", "Name" FROM "Genres" {0} {1} {2};'
//!
//! [[tables.genres.operations]]
//! kind = "filter"
//! name = "NameEquals"
//! template = '"Name" = {0}'
//! parameters = [{ name = "name", type = "string" }]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{WeaveError, WeaveResult};
use crate::formatter::Dialect;
use crate::metadata::{Operation, OperationKind, OperationTable, ParameterMetadata};
use crate::sqlite::SqliteConfig;
use crate::template::Template;
use crate::value::{DbType, Value};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "SQLWEAVE_CONFIG";

const FILE_NAME: &str = "sqlweave.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    pub dialect: Dialect,
    pub database: Option<SqliteConfig>,
    pub tables: BTreeMap<String, TableConfig>,
}

impl WeaveConfig {
    pub fn from_toml(content: &str) -> WeaveResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> WeaveResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `explicit`, else the first existing default location.
    ///
    /// An explicit path or `SQLWEAVE_CONFIG` must exist. With neither set and
    /// no file found, an empty configuration is returned.
    pub fn load(explicit: Option<&Path>) -> WeaveResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(path);
        }
        match default_locations().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn table(&self, name: &str) -> WeaveResult<&TableConfig> {
        self.tables
            .get(name)
            .ok_or_else(|| WeaveError::Config(format!("unknown table '{}'", name)))
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("sqlweave").join("config.toml"));
    }
    paths.push(PathBuf::from(FILE_NAME));
    paths
}

/// Base statement kinds a table can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Get,
    Delete,
    Update,
    Insert,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Get => write!(f, "get"),
            StatementKind::Delete => write!(f, "delete"),
            StatementKind::Update => write!(f, "update"),
            StatementKind::Insert => write!(f, "insert"),
        }
    }
}

/// One table: its base statements and operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableConfig {
    pub get: Option<String>,
    pub delete: Option<String>,
    pub update: Option<String>,
    pub insert: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

impl TableConfig {
    /// Build the operation table.
    pub fn build(&self, name: &str) -> WeaveResult<OperationTable> {
        let mut table = OperationTable::new(name);
        for operation in &self.operations {
            table.insert(operation.build()?)?;
        }
        Ok(table)
    }

    /// Parse the base statement of `kind`.
    pub fn statement(&self, table: &str, kind: StatementKind) -> WeaveResult<Template> {
        let source = match kind {
            StatementKind::Get => &self.get,
            StatementKind::Delete => &self.delete,
            StatementKind::Update => &self.update,
            StatementKind::Insert => &self.insert,
        };
        let source = source.as_deref().ok_or_else(|| {
            WeaveError::Config(format!("table '{}' has no {} statement", table, kind))
        })?;
        Template::parse(source)
    }
}

/// One operation entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    pub kind: OperationKind,
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    /// Merge operations only.
    pub column: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl OperationConfig {
    pub fn build(&self) -> WeaveResult<Operation> {
        let parameters: Vec<ParameterMetadata> =
            self.parameters.iter().map(ParameterConfig::build).collect();
        match self.kind {
            OperationKind::Filter => Operation::filter(&self.name, &self.template, parameters),
            OperationKind::Order => Operation::order(&self.name, &self.template, parameters),
            OperationKind::Merge => {
                let column = self.column.as_deref().ok_or_else(|| {
                    WeaveError::Config(format!("merge operation '{}' needs a column", self.name))
                })?;
                Operation::merge(&self.name, &self.template, parameters, column, self.required)
            }
        }
    }
}

/// One parameter declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub db_type: DbType,
    #[serde(default)]
    pub has_default: bool,
    pub default: Option<Value>,
}

impl ParameterConfig {
    pub fn build(&self) -> ParameterMetadata {
        ParameterMetadata::declare(
            &self.name,
            self.db_type,
            self.has_default,
            self.default.clone(),
        )
    }
}
