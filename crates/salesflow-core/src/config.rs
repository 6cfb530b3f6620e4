use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{
    input_column_names, is_valid_identifier, ColumnPolicy, ConversionTable, DestinationSchema,
    SourceDescriptor, SourceLocation, TableRef, INR_AMOUNT,
};

pub const DEFAULT_CONFIG_PATH: &str = "salesflow.toml";
pub const DEFAULT_DESTINATION: &str = "salesdataset.output";
pub const DEFAULT_WAREHOUSE_URL_ENV: &str = "SALESFLOW_WAREHOUSE_URL";

static DEFAULT_RATES: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| {
    vec![
        ("India", 1.0),
        ("Japan", 0.57),
        ("Norway", 8.21),
        ("SriLanka", 0.25),
        ("Hong Kong", 10.93),
        ("Oman", 215.54),
        ("Germany", 89.34),
        ("Qatar", 22.87),
    ]
});

static DEFAULT_SOURCES: Lazy<Vec<SourceDescriptor>> = Lazy::new(|| {
    vec![
        SourceDescriptor::file("csv", "sales_analysis_japan", "japan_sales_data.csv"),
        SourceDescriptor::file("json", "sales_analysis_srilanka", "sri_lanka_sales_data.json"),
        SourceDescriptor::file("xlsx", "sales_analysis_hongkong", "hong_kong_sales_data.xlsx"),
        SourceDescriptor::database("mysql_oman", "oman_sales_data"),
        SourceDescriptor::database("postgres_norway", "norway_sales_data")
            .with_columns(ColumnPolicy::Normalize),
        SourceDescriptor::database("mssql_india", "india_sales"),
        SourceDescriptor::database("mysql_germany", "germany_sales_data"),
        SourceDescriptor::database("mysql_qatar", "qatar_sales_data"),
    ]
});

static DEFAULT_ALIASES: Lazy<BTreeMap<String, String>> =
    Lazy::new(|| BTreeMap::from([("Saleid".to_string(), "SaleId".to_string())]));

/// Raw TOML document. Every section is optional and falls back to the built-in
/// deployment defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub destination: DestinationSection,
    pub rates: Option<BTreeMap<String, f64>>,
    pub sources: Option<Vec<SourceEntry>>,
    pub reconcile: ReconcileSection,
    pub connections: BTreeMap<String, ConnectionSettings>,
    pub object_store: ObjectStoreSettings,
    pub warehouse: WarehouseSettings,
    pub staging: StagingSettings,
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationSection {
    pub table: String,
}

impl Default for DestinationSection {
    fn default() -> Self {
        Self {
            table: DEFAULT_DESTINATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSection {
    pub aliases: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEntry {
    File {
        format: String,
        bucket: String,
        key: String,
        #[serde(default)]
        columns: ColumnPolicy,
        #[serde(default)]
        rename: BTreeMap<String, String>,
    },
    Database {
        connection: String,
        table: String,
        #[serde(default)]
        columns: ColumnPolicy,
        #[serde(default)]
        rename: BTreeMap<String, String>,
    },
}

impl SourceEntry {
    fn into_descriptor(self) -> SourceDescriptor {
        let (location, columns, rename) = match self {
            SourceEntry::File {
                format,
                bucket,
                key,
                columns,
                rename,
            } => (
                SourceLocation::File {
                    format,
                    bucket,
                    key,
                },
                columns,
                rename,
            ),
            SourceEntry::Database {
                connection,
                table,
                columns,
                rename,
            } => (SourceLocation::Database { connection, table }, columns, rename),
        };
        SourceDescriptor {
            location,
            columns,
            rename,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    /// Environment variable holding the connection URL.
    pub url_env: Option<String>,
}

impl ConnectionSettings {
    pub fn env_var(&self, connection_id: &str) -> String {
        self.url_env
            .clone()
            .unwrap_or_else(|| format!("SALESFLOW_{}_URL", connection_id.to_ascii_uppercase()))
    }

    pub fn resolve_url(&self, connection_id: &str) -> Result<String, String> {
        let var = self.env_var(connection_id);
        std::env::var(&var).map_err(|_| format!("connection URL variable {var} is not set"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreBackend {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectStoreSettings {
    pub backend: ObjectStoreBackend,
    /// Root directory holding `<bucket>/<key>` for the local backend.
    pub root: PathBuf,
    pub region: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::Local,
            root: PathBuf::from("data/objects"),
            region: "us-east-1".to_string(),
            endpoint: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseBackend {
    Postgres,
    #[default]
    Parquet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseSettings {
    pub backend: WarehouseBackend,
    pub url_env: String,
    /// Directory receiving parquet part files for the parquet backend.
    pub root: PathBuf,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::Parquet,
            url_env: DEFAULT_WAREHOUSE_URL_ENV.to_string(),
            root: PathBuf::from("data/warehouse"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingSettings {
    /// Parent directory for per-run staging directories; the system temp dir when unset.
    pub dir: Option<PathBuf>,
}

/// Trigger policy owned by the external scheduler. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    pub interval: String,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub catchup: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval: "@daily".to_string(),
            retries: 1,
            retry_delay_secs: 120,
            catchup: false,
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub destination: TableRef,
    pub schema: DestinationSchema,
    pub rates: ConversionTable,
    pub sources: Vec<SourceDescriptor>,
    pub aliases: BTreeMap<String, String>,
    pub connections: BTreeMap<String, ConnectionSettings>,
    pub object_store: ObjectStoreSettings,
    pub warehouse: WarehouseSettings,
    pub staging: StagingSettings,
    pub schedule: ScheduleSettings,
}

impl RunConfig {
    /// The deployment defaults: eight sources, eight rates, `salesdataset.output`.
    pub fn builtin() -> Result<Self, ConfigError> {
        ConfigFile::default().resolve()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.resolve()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        file.resolve()
    }

    pub fn connection(&self, connection_id: &str) -> ConnectionSettings {
        self.connections
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl ConfigFile {
    pub fn resolve(self) -> Result<RunConfig, ConfigError> {
        let destination = TableRef::parse(&self.destination.table)?;

        let rates = match self.rates {
            Some(rates) => ConversionTable::new(rates)?,
            None => ConversionTable::new(DEFAULT_RATES.iter().copied())?,
        };

        let sources: Vec<SourceDescriptor> = match self.sources {
            Some(entries) => entries.into_iter().map(SourceEntry::into_descriptor).collect(),
            None => DEFAULT_SOURCES.clone(),
        };
        validate_sources(&sources)?;

        let aliases = self
            .reconcile
            .aliases
            .unwrap_or_else(|| DEFAULT_ALIASES.clone());
        for (from, to) in &aliases {
            validate_alias(from, to)?;
        }
        for source in &sources {
            for (from, to) in &source.rename {
                validate_alias(from, to)?;
            }
        }

        Ok(RunConfig {
            destination,
            schema: DestinationSchema::sales_output(),
            rates,
            sources,
            aliases,
            connections: self.connections,
            object_store: self.object_store,
            warehouse: self.warehouse,
            staging: self.staging,
            schedule: self.schedule,
        })
    }
}

fn validate_sources(sources: &[SourceDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for source in sources {
        match &source.location {
            SourceLocation::File { bucket, key, .. } => {
                if bucket.trim().is_empty() || key.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "file source {source} needs a bucket and key"
                    )));
                }
            }
            SourceLocation::Database { connection, table } => {
                if connection.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "database source {source} needs a connection id"
                    )));
                }
                if !is_valid_identifier(table) {
                    return Err(ConfigError::InvalidIdentifier(table.clone()));
                }
            }
        }
        if !seen.insert(source.name()) {
            return Err(ConfigError::DuplicateSource(source.name()));
        }
    }
    Ok(())
}

fn validate_alias(from: &str, to: &str) -> Result<(), ConfigError> {
    let canonical = input_column_names().any(|name| name == to) || to == INR_AMOUNT;
    if from.trim().is_empty() || !canonical {
        return Err(ConfigError::InvalidAlias {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_deployment_defaults() {
        let config = RunConfig::builtin().unwrap();
        assert_eq!(config.destination.to_string(), "salesdataset.output");
        assert_eq!(config.sources.len(), 8);
        assert_eq!(config.rates.len(), 8);
        assert_eq!(config.rates.rate("Oman"), 215.54);
        assert_eq!(config.aliases.get("Saleid").map(String::as_str), Some("SaleId"));
        assert_eq!(config.sources[4].columns, ColumnPolicy::Normalize);
        assert_eq!(config.schedule.retries, 1);
        assert_eq!(config.schedule.retry_delay_secs, 120);
    }

    #[test]
    fn parses_sources_and_rates_from_toml() {
        let config = RunConfig::from_toml_str(
            r#"
            [destination]
            table = "analytics.sales"

            [rates]
            Japan = 0.57
            "Hong Kong" = 10.93

            [[sources]]
            kind = "file"
            format = "csv"
            bucket = "landing"
            key = "japan.csv"

            [[sources]]
            kind = "database"
            connection = "postgres_norway"
            table = "norway_sales_data"
            columns = "normalize"
            rename = { Sale_Id = "SaleId" }

            [connections.postgres_norway]
            url_env = "NORWAY_DB"
            "#,
        )
        .unwrap();

        assert_eq!(config.destination.to_string(), "analytics.sales");
        assert_eq!(config.rates.rate("Hong Kong"), 10.93);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].columns, ColumnPolicy::Normalize);
        assert_eq!(
            config.sources[1].rename.get("Sale_Id").map(String::as_str),
            Some("SaleId")
        );
        assert_eq!(config.connection("postgres_norway").env_var("postgres_norway"), "NORWAY_DB");
        assert_eq!(
            config.connection("mysql_oman").env_var("mysql_oman"),
            "SALESFLOW_MYSQL_OMAN_URL"
        );
    }

    #[test]
    fn rejects_unsafe_table_identifiers() {
        let err = RunConfig::from_toml_str(
            r#"
            [[sources]]
            kind = "database"
            connection = "mysql_oman"
            table = "oman; DROP TABLE x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_duplicate_sources() {
        let err = RunConfig::from_toml_str(
            r#"
            [[sources]]
            kind = "database"
            connection = "mysql_oman"
            table = "oman_sales_data"

            [[sources]]
            kind = "database"
            connection = "mysql_oman"
            table = "oman_sales_data"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSource(_)));
    }

    #[test]
    fn rejects_alias_to_unknown_column() {
        let err = RunConfig::from_toml_str(
            r#"
            [reconcile.aliases]
            Saleid = "SaleIdentifier"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAlias { .. }));
    }

    #[test]
    fn rejects_negative_rate() {
        let err = RunConfig::from_toml_str(
            r#"
            [rates]
            Qatar = -22.87
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRate { .. }));
    }
}
