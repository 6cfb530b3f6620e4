use std::collections::{BTreeMap, HashMap};
use std::fmt;

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SALE_ID: &str = "SaleId";
pub const COUNTRY: &str = "Country";
pub const CATEGORY: &str = "Category";
pub const PRODUCT: &str = "Product";
pub const QTY: &str = "Qty";
pub const PRICE: &str = "Price";
pub const AMOUNT: &str = "Amount";
pub const INR_AMOUNT: &str = "INR_Amount";

/// Multiplier applied to countries missing from the conversion table.
pub const IDENTITY_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Integer,
    String,
    Float,
}

impl FieldType {
    pub fn dtype(&self) -> DataType {
        match self {
            FieldType::Integer => DataType::Int64,
            FieldType::String => DataType::String,
            FieldType::Float => DataType::Float64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::String => "STRING",
            FieldType::Float => "FLOAT",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub field_type: FieldType,
}

impl SchemaField {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type }
    }
}

/// Columns every source must provide once reconciled, in canonical order.
pub const INPUT_COLUMNS: [SchemaField; 7] = [
    SchemaField::new(SALE_ID, FieldType::Integer),
    SchemaField::new(COUNTRY, FieldType::String),
    SchemaField::new(CATEGORY, FieldType::String),
    SchemaField::new(PRODUCT, FieldType::String),
    SchemaField::new(QTY, FieldType::Integer),
    SchemaField::new(PRICE, FieldType::Float),
    SchemaField::new(AMOUNT, FieldType::Float),
];

pub fn input_column_names() -> impl Iterator<Item = &'static str> {
    INPUT_COLUMNS.iter().map(|field| field.name)
}

/// The fixed contract of the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSchema {
    fields: Vec<SchemaField>,
}

impl DestinationSchema {
    pub fn sales_output() -> Self {
        let mut fields = INPUT_COLUMNS.to_vec();
        fields.push(SchemaField::new(INR_AMOUNT, FieldType::Float));
        Self { fields }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|field| field.name).collect()
    }
}

impl Default for DestinationSchema {
    fn default() -> Self {
        Self::sales_output()
    }
}

/// A dotted warehouse table identifier such as `salesdataset.output`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    parts: Vec<String>,
}

impl TableRef {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if !is_valid_identifier(value) {
            return Err(ConfigError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self {
            parts: value.split('.').map(str::to_string).collect(),
        })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

/// ASCII alphanumerics and `_`, optionally dotted into non-empty segments.
pub fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        })
}

/// How a source's native column names are mapped onto canonical names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPolicy {
    /// Names are used exactly as the source reports them.
    #[default]
    Verbatim,
    /// Trim, title-case, then apply the alias table.
    Normalize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File {
        format: String,
        bucket: String,
        key: String,
    },
    Database {
        connection: String,
        table: String,
    },
}

/// One configured input. Immutable once the run configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub location: SourceLocation,
    pub columns: ColumnPolicy,
    pub rename: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn file(format: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: SourceLocation::File {
                format: format.into(),
                bucket: bucket.into(),
                key: key.into(),
            },
            columns: ColumnPolicy::Verbatim,
            rename: BTreeMap::new(),
        }
    }

    pub fn database(connection: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            location: SourceLocation::Database {
                connection: connection.into(),
                table: table.into(),
            },
            columns: ColumnPolicy::Verbatim,
            rename: BTreeMap::new(),
        }
    }

    pub fn with_columns(mut self, policy: ColumnPolicy) -> Self {
        self.columns = policy;
        self
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }

    /// Stable display name, e.g. `csv:bucket/key` or `mysql_oman.oman_sales_data`.
    pub fn name(&self) -> String {
        match &self.location {
            SourceLocation::File {
                format,
                bucket,
                key,
            } => format!("{format}:{bucket}/{key}"),
            SourceLocation::Database { connection, table } => format!("{connection}.{table}"),
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Rows produced by exactly one source.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub source: String,
    pub frame: DataFrame,
}

impl RowSet {
    pub fn new(source: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            source: source.into(),
            frame,
        }
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Country to reference-currency multiplier. Built once per run, never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionTable {
    rates: HashMap<String, f64>,
}

impl ConversionTable {
    pub fn new<I, K>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut rates = HashMap::new();
        for (country, rate) in entries {
            let country = country.into();
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::InvalidRate { country, rate });
            }
            rates.insert(country, rate);
        }
        Ok(Self { rates })
    }

    /// Configured multiplier, or [`IDENTITY_RATE`] when the country is unknown.
    pub fn rate(&self, country: &str) -> f64 {
        self.rates.get(country).copied().unwrap_or(IDENTITY_RATE)
    }

    pub fn contains(&self, country: &str) -> bool {
        self.rates.contains_key(country)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Entries sorted by country name.
    pub fn entries(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> = self
            .rates
            .iter()
            .map(|(country, rate)| (country.as_str(), *rate))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
