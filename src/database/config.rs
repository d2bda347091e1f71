//! Connection parameters and pool settings
//!
//! The shape every credential source has to provide for a logical
//! connection, plus the pooling knobs applied when a handle is opened.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix for per-connection overrides
///
/// A connection named `source_db` reads `LANDING_ELT_SOURCE_DB_PASSWORD`,
/// `LANDING_ELT_SOURCE_DB_HOST`, and so on.
pub const ENV_CONNECTION_PREFIX: &str = "LANDING_ELT";

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// DuckDB embedded database
    DuckDB,
    /// PostgreSQL database
    Postgres,
    /// MySQL or MariaDB server, source side only
    MySql,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(BackendType::DuckDB),
            "postgres" | "postgresql" => Ok(BackendType::Postgres),
            "mysql" | "mariadb" => Ok(BackendType::MySql),
            _ => Err(format!(
                "Unknown database backend: {}. Use 'duckdb', 'postgres' or 'mysql'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::DuckDB => write!(f, "duckdb"),
            BackendType::Postgres => write!(f, "postgres"),
            BackendType::MySql => write!(f, "mysql"),
        }
    }
}

/// Credentials and location of one logical connection
///
/// `backend` is kept as the raw type tag; it is only interpreted when the
/// handle is opened so that an unknown tag surfaces as a connection error.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionParams {
    /// Backend type tag ("duckdb", "postgres", "mysql")
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Host name (or, for DuckDB, unused)
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name (or, for DuckDB, the database file path / `:memory:`)
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Warehouse account identifier, when the warehouse is account-addressed
    #[serde(default)]
    pub account: Option<String>,
    /// Compute warehouse name, when the warehouse has one
    #[serde(default)]
    pub warehouse: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("backend", &self.backend)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .finish()
    }
}

impl ConnectionParams {
    /// Parameters for a DuckDB database file (or `:memory:`)
    pub fn duckdb(path: impl Into<String>) -> Self {
        Self {
            backend: BackendType::DuckDB.to_string(),
            database: Some(path.into()),
            ..Default::default()
        }
    }

    /// Parameters for a PostgreSQL server
    pub fn postgres(
        host: impl Into<String>,
        database: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend: BackendType::Postgres.to_string(),
            host: Some(host.into()),
            port: Some(5432),
            database: Some(database.into()),
            login: Some(login.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// Parameters for a MySQL server
    pub fn mysql(
        host: impl Into<String>,
        database: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend: BackendType::MySql.to_string(),
            port: Some(3306),
            ..Self::postgres(host, database, login, password)
        }
    }

        /// Where this connection points, without any secret material
    pub fn identity(&self) -> String {
        let location = match (&self.account, &self.host) {
            (Some(account), _) => account.clone(),
            (None, Some(host)) => match self.port {
                Some(port) => format!("{}:{}", host, port),
                None => host.clone(),
            },
            (None, None) => "local".to_string(),
        };
        let database = self.database.as_deref().unwrap_or("-");
        match &self.schema {
            Some(schema) => format!("{}/{}/{}", location, database, schema),
            None => format!("{}/{}", location, database),
        }
    }

    /// Apply environment variable overrides for the connection `name`
    pub fn apply_env_overrides(&mut self, name: &str) {
        self.apply_overrides_from(name, |key| std::env::var(key).ok());
    }

    /// Apply overrides for connection `name`, reading variables through `lookup`
    pub fn apply_overrides_from(&mut self, name: &str, lookup: impl Fn(&str) -> Option<String>) {
        let prefix = format!(
            "{}_{}_",
            ENV_CONNECTION_PREFIX,
            name.to_uppercase().replace(['-', '.'], "_")
        );
        let var = |field: &str| lookup(&format!("{}{}", prefix, field));

        if let Some(backend) = var("BACKEND") {
            self.backend = backend;
        }
        if let Some(login) = var("LOGIN") {
            self.login = Some(login);
        }
        if let Some(password) = var("PASSWORD") {
            self.password = Some(password);
        }
        if let Some(host) = var("HOST") {
            self.host = Some(host);
        }
        if let Some(port) = var("PORT")
            && let Ok(port) = port.parse()
        {
            self.port = Some(port);
        }
        if let Some(database) = var("DATABASE") {
            self.database = Some(database);
        }
        if let Some(schema) = var("SCHEMA") {
            self.schema = Some(schema);
        }
        if let Some(role) = var("ROLE") {
            self.role = Some(role);
        }
        if let Some(account) = var("ACCOUNT") {
            self.account = Some(account);
        }
        if let Some(warehouse) = var("WAREHOUSE") {
            self.warehouse = Some(warehouse);
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSettings {
    /// Connections kept open in the pool
    #[serde(default = "default_max_persistent")]
    pub max_persistent: usize,

    /// Extra connections allowed under contention
    #[serde(default = "default_max_overflow")]
    pub max_overflow: usize,

    /// Seconds to wait for a free connection before failing
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Seconds after which a connection is replaced instead of reused
    #[serde(default = "default_recycle_age_secs")]
    pub recycle_age_secs: u64,

    /// Verify a connection is alive before handing it out
    #[serde(default = "default_pre_ping")]
    pub pre_ping: bool,
}

fn default_max_persistent() -> usize {
    2
}

fn default_max_overflow() -> usize {
    2
}

fn default_acquire_timeout_secs() -> u64 {
    60
}

fn default_recycle_age_secs() -> u64 {
    6000
}

fn default_pre_ping() -> bool {
    true
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_persistent: default_max_persistent(),
            max_overflow: default_max_overflow(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            recycle_age_secs: default_recycle_age_secs(),
            pre_ping: default_pre_ping(),
        }
    }
}

impl PoolSettings {
    /// Upper bound on simultaneously open connections
    pub fn max_size(&self) -> usize {
        (self.max_persistent + self.max_overflow).max(1)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn recycle_age(&self) -> Duration {
        Duration::from_secs(self.recycle_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            "duckdb".parse::<BackendType>().unwrap(),
            BackendType::DuckDB
        );
        assert_eq!(
            "postgres".parse::<BackendType>().unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            "PostgreSQL".parse::<BackendType>().unwrap(),
            BackendType::Postgres
        );
        assert_eq!("mysql".parse::<BackendType>().unwrap(), BackendType::MySql);
        assert_eq!("MariaDB".parse::<BackendType>().unwrap(), BackendType::MySql);
        assert!("snowflake".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_pool_defaults() {
        let pool = PoolSettings::default();
        assert_eq!(pool.max_persistent, 2);
        assert_eq!(pool.max_overflow, 2);
        assert_eq!(pool.max_size(), 4);
        assert_eq!(pool.acquire_timeout(), Duration::from_secs(60));
        assert_eq!(pool.recycle_age(), Duration::from_secs(6000));
        assert!(pool.pre_ping);
    }

    #[test]
    fn test_partial_pool_section() {
        let pool: PoolSettings = toml::from_str("max_overflow = 0\npre_ping = false").unwrap();
        assert_eq!(pool.max_persistent, 2);
        assert_eq!(pool.max_size(), 2);
        assert!(!pool.pre_ping);
    }

    #[test]
    fn test_debug_masks_password() {
        let params = ConnectionParams::postgres("db.internal", "retail", "etl", "hunter2");
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_mysql_params() {
        let params = ConnectionParams::mysql("db.internal", "retail", "etl", "hunter2");
        assert_eq!(params.backend, "mysql");
        assert_eq!(params.port, Some(3306));
        assert_eq!(params.identity(), "db.internal:3306/retail");
    }

    #[test]
    fn test_identity() {
        let mut params = ConnectionParams::postgres("db.internal", "retail", "etl", "hunter2");
        params.schema = Some("public".to_string());
        assert_eq!(params.identity(), "db.internal:5432/retail/public");

        params.account = Some("xy12345.eu-west-1".to_string());
        assert_eq!(params.identity(), "xy12345.eu-west-1/retail/public");

        let duck = ConnectionParams::duckdb(":memory:");
        assert_eq!(duck.identity(), "local/:memory:");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LANDING_ELT_ENV_OVERRIDE_TEST_PASSWORD", "from-env"),
            ("LANDING_ELT_ENV_OVERRIDE_TEST_PORT", "6543"),
            ("LANDING_ELT_OTHER_HOST", "elsewhere"),
        ]
        .into_iter()
        .collect();

        let mut params = ConnectionParams::postgres("h", "d", "u", "p");
        params.apply_overrides_from("env-override-test", |key| {
            env.get(key).map(|v| v.to_string())
        });
        assert_eq!(params.password.as_deref(), Some("from-env"));
        assert_eq!(params.port, Some(6543));
        assert_eq!(params.host.as_deref(), Some("h"));
    }

    #[test]
    fn test_unparseable_port_is_ignored() {
        let mut params = ConnectionParams::postgres("h", "d", "u", "p");
        params.apply_overrides_from("src", |key| {
            (key == "LANDING_ELT_SRC_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(params.port, Some(5432));
    }
}
