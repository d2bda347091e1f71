//! Pipeline configuration
//!
//! Handles loading and saving the `landing-elt.toml` file that names the
//! source and warehouse connections, the table sets and the downstream
//! transformation phases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::database::{ConnectionParams, PoolSettings};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::orchestrator::{DEFAULT_FACT_CHUNK_SIZE, DEFAULT_TARGET_SCHEMA};
use crate::pipeline::{LoadKind, RunSettings, TableSource};
use crate::transform::TransformPhase;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "landing-elt.toml";

/// Environment variable for the target schema
pub const ENV_TARGET_SCHEMA: &str = "LANDING_ELT_TARGET_SCHEMA";

/// Environment variable for the current window boundary
pub const ENV_DS: &str = "LANDING_ELT_DS";

/// Environment variable for the previous window boundary
pub const ENV_PREV_DS: &str = "LANDING_ELT_PREV_DS";

/// Table set of one load kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableSection {
    /// Tables to load, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,

    /// Directory of `<table>.sql` files; replaces `tables` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_dir: Option<PathBuf>,

    /// Rows per insert statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Per-table extraction queries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub queries: BTreeMap<String, String>,
}

impl TableSection {
    fn is_configured(&self) -> bool {
        self.query_dir.is_some() || !self.tables.is_empty()
    }
}

/// Downstream transformation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransformSection {
    #[serde(default)]
    pub phases: Vec<TransformPhase>,
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Warehouse schema receiving extracted tables
    #[serde(default = "default_target_schema")]
    pub target_schema: String,

    /// Name of the source entry in `connections`
    pub source_connection: String,

    /// Name of the warehouse entry in `connections`
    pub warehouse_connection: String,

    /// DDL file executed by `init`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_ddl: Option<PathBuf>,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionParams>,

    #[serde(default)]
    pub dimension: TableSection,

    #[serde(default)]
    pub fact: TableSection,

    #[serde(default)]
    pub transform: TransformSection,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

fn default_target_schema() -> String {
    DEFAULT_TARGET_SCHEMA.to_string()
}

impl PipelineConfig {
    /// Load configuration from a file, then apply environment overrides
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content)?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> PipelineResult<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| PipelineError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(schema) = std::env::var(ENV_TARGET_SCHEMA)
            && !schema.trim().is_empty()
        {
            self.target_schema = schema;
        }
    }

    /// Parameters of the connection `name`, with its environment overrides
    pub fn connection(&self, name: &str) -> PipelineResult<ConnectionParams> {
        let mut params = self.connections.get(name).cloned().ok_or_else(|| {
            PipelineError::config(format!("Connection '{}' is not configured", name))
        })?;
        params.apply_env_overrides(name);
        Ok(params)
    }

    pub fn source(&self) -> PipelineResult<ConnectionParams> {
        self.connection(&self.source_connection)
    }

    pub fn warehouse(&self) -> PipelineResult<ConnectionParams> {
        self.connection(&self.warehouse_connection)
    }

    fn section(&self, kind: LoadKind) -> &TableSection {
        match kind {
            LoadKind::Dimension => &self.dimension,
            LoadKind::Fact => &self.fact,
        }
    }

    /// Whether any tables are configured for `kind`
    pub fn has_tables(&self, kind: LoadKind) -> bool {
        self.section(kind).is_configured()
    }

    /// Where the tables of `kind` come from
    pub fn table_source(&self, kind: LoadKind) -> PipelineResult<TableSource> {
        let section = self.section(kind);
        if let Some(dir) = &section.query_dir {
            return Ok(TableSource::Directory(self.resolve_path(dir)));
        }
        if section.tables.is_empty() {
            return Err(PipelineError::config(format!(
                "No {} tables configured",
                kind
            )));
        }
        Ok(TableSource::Names {
            names: section.tables.clone(),
            queries: section.queries.clone(),
        })
    }

    /// Load settings for a run
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            target_schema: self.target_schema.clone(),
            dimension_chunk_size: self.dimension.chunk_size,
            fact_chunk_size: self.fact.chunk_size.or(Some(DEFAULT_FACT_CHUNK_SIZE)),
        }
    }

    /// Bootstrap DDL path, resolved against the config file's directory
    pub fn bootstrap_path(&self) -> Option<PathBuf> {
        self.bootstrap_ddl.as_deref().map(|p| self.resolve_path(p))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Window boundaries from `LANDING_ELT_PREV_DS` and `LANDING_ELT_DS`
///
/// # Returns
/// `(previous, current)`; either is `None` when its variable is unset
pub fn schedule_dates_from_env() -> PipelineResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    let read = |var: &str| -> PipelineResult<Option<NaiveDate>> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => parse_date(value.trim()).map(Some),
            _ => Ok(None),
        }
    };
    Ok((read(ENV_PREV_DS)?, read(ENV_DS)?))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> PipelineResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        PipelineError::config(format!("Invalid date '{}' (expected YYYY-MM-DD): {}", value, e))
    })
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# landing-elt configuration

# Warehouse schema extracted tables are loaded into
target_schema = "landing"

# Connection names below; every field can be overridden with
# LANDING_ELT_<NAME>_<FIELD>, e.g. LANDING_ELT_SOURCE_DB_PASSWORD
source_connection = "source_db"
warehouse_connection = "warehouse"

# DDL run by `landing-elt init`
bootstrap_ddl = "sql/create_tables.sql"

[pool]
max_persistent = 2
max_overflow = 2
acquire_timeout_secs = 60
recycle_age_secs = 6000
pre_ping = true

[connections.source_db]
backend = "postgres"
host = "localhost"
port = 5432
database = "retail"
login = "etl"

[connections.warehouse]
backend = "duckdb"
database = "warehouse.duckdb"

[dimension]
tables = ["products", "suppliers"]

[fact]
query_dir = "sql/fact"
chunk_size = 100000

[[transform.phases]]
name = "validate-sources"
command = ["dbt", "test", "--select", "source:*"]

[[transform.phases]]
name = "run"
command = ["dbt", "run"]

[[transform.phases]]
name = "validate-outputs"
command = ["dbt", "test", "--select", "path:models/*"]

[[transform.phases]]
name = "snapshot"
command = ["dbt", "snapshot"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
source_connection = "src"
warehouse_connection = "dw"

[connections.src]
backend = "duckdb"
database = "source.duckdb"

[connections.dw]
backend = "duckdb"
database = ":memory:"

[dimension]
tables = ["products"]
queries = { products = "SELECT id, name FROM products" }
"#;

    #[test]
    fn test_sample_config_is_valid() {
        let config = PipelineConfig::parse(sample_config()).unwrap();
        assert_eq!(config.target_schema, "landing");
        assert_eq!(config.transform.phases.len(), 4);
        assert_eq!(config.transform.phases[0].name, "validate-sources");
        assert_eq!(config.fact.chunk_size, Some(100_000));
    }

    #[test]
    fn test_parse_minimal() {
        let config = PipelineConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.target_schema, "landing");
        assert_eq!(config.pool, PoolSettings::default());
        assert!(config.transform.phases.is_empty());
        assert!(config.has_tables(LoadKind::Dimension));
        assert!(!config.has_tables(LoadKind::Fact));

        match config.table_source(LoadKind::Dimension).unwrap() {
            TableSource::Names { names, queries } => {
                assert_eq!(names, vec!["products"]);
                assert_eq!(queries["products"], "SELECT id, name FROM products");
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert!(config.table_source(LoadKind::Fact).unwrap_err().is_configuration());
    }

    #[test]
    fn test_missing_connection() {
        let config = PipelineConfig::parse(MINIMAL).unwrap();
        assert!(config.source().is_ok());
        assert!(config.connection("nope").unwrap_err().is_configuration());
    }

    #[test]
    fn test_run_settings_defaults() {
        let config = PipelineConfig::parse(MINIMAL).unwrap();
        let settings = config.run_settings();
        assert_eq!(settings.dimension_chunk_size, None);
        assert_eq!(settings.fact_chunk_size, Some(100_000));
    }

    #[test]
    fn test_save_and_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);

        let mut config = PipelineConfig::parse(MINIMAL).unwrap();
        config.bootstrap_ddl = Some(PathBuf::from("ddl.sql"));
        config.fact.query_dir = Some(PathBuf::from("fact"));
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.bootstrap_path(), Some(dir.path().join("ddl.sql")));
        assert_eq!(
            loaded.table_source(LoadKind::Fact).unwrap(),
            TableSource::Directory(dir.path().join("fact"))
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PipelineConfig::parse("target_schema = ").is_err());
        // Connection names are required
        assert!(PipelineConfig::parse("target_schema = \"x\"").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2025-08-29").unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 29).unwrap()
        );
        assert!(parse_date("29/08/2025").unwrap_err().is_configuration());
    }
}
