//! Declared record shapes.
//!
//! A [`RecordSchema`] is the first-class description of one reconciled record
//! type: its ordered [`FieldSpec`]s (name, source column, scalar type,
//! nullability, ignore flag) and the [`KeyRule`] used to match records across
//! the two sides. Schemas are built in code or loaded from YAML and are
//! validated on construction, so every other module can rely on them.
//!
//! ```yaml
//! name: card_counts
//! fields:
//!   - name: WorkOrderNumber
//!     datatype: string
//!   - name: RoutineT35
//!     datatype: int
//!     nullable: true
//!   - name: RecordCreatedAt
//!     datatype: timestamp
//!     nullable: true
//!     ignore: true
//! key:
//!   fields: [WorkOrderNumber]
//! ```

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::value::Value;

pub const DEFAULT_KEY_SEPARATOR: &str = "_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema '{0}' does not declare any fields")]
    NoFields(String),
    #[error("schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },
    #[error("schema '{schema}' reads column '{column}' into more than one field")]
    DuplicateSource { schema: String, column: String },
    #[error("schema '{0}' has an empty key rule")]
    EmptyKey(String),
    #[error("schema '{schema}' key references unknown field '{field}'")]
    UnknownKeyField { schema: String, field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int32,
    Int64,
    Decimal,
    Float,
    Boolean,
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Decimal => "decimal",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string",
            "int32",
            "int64",
            "decimal",
            "float",
            "boolean",
            "timestamp",
        ]
    }

    /// Value a non-nullable field of this type holds when the source has none.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Int32 | FieldType::Int64 => Value::Integer(0),
            FieldType::Decimal => Value::Decimal(Decimal::ZERO),
            FieldType::Float => Value::Float(0.0),
            FieldType::Boolean => Value::Boolean(false),
            FieldType::Timestamp => Value::Null,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "text" | "varchar" => Ok(FieldType::String),
            "int" | "int32" | "integer" => Ok(FieldType::Int32),
            "long" | "int64" | "bigint" => Ok(FieldType::Int64),
            "decimal" | "numeric" | "money" => Ok(FieldType::Decimal),
            "float" | "double" | "real" => Ok(FieldType::Float),
            "bool" | "boolean" => Ok(FieldType::Boolean),
            "timestamp" | "datetime" | "date-time" => Ok(FieldType::Timestamp),
            _ => Err(anyhow!(
                "Unknown field type '{value}'. Supported types: {}",
                FieldType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        FieldType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    /// Raw column to read when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(alias = "type")]
    pub datatype: FieldType,
    #[serde(default)]
    pub nullable: bool,
    /// Excluded from comparison; still mapped and reported.
    #[serde(default)]
    pub ignore: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, datatype: FieldType) -> Self {
        Self {
            name: name.into(),
            source: None,
            datatype,
            nullable: false,
            ignore: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn from_column(mut self, column: impl Into<String>) -> Self {
        self.source = Some(column.into());
        self
    }

    pub fn source_column(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    pub fn zero_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.datatype.zero_value()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRule {
    pub fields: Vec<String>,
    #[serde(default = "KeyRule::default_separator")]
    pub separator: String,
    /// Fields used ahead of the unique suffix when the natural key is blank.
    /// Empty means every declared field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<String>,
}

impl KeyRule {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            separator: Self::default_separator(),
            fallback: Vec::new(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_fallback<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_separator() -> String {
        DEFAULT_KEY_SEPARATOR.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    name: String,
    fields: Vec<FieldSpec>,
    key: KeyRule,
}

/// Validated declaration of a record type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "SchemaDocument")]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldSpec>,
    key: KeyRule,
    #[serde(skip)]
    key_indices: Vec<usize>,
    #[serde(skip)]
    fallback_indices: Vec<usize>,
}

impl TryFrom<SchemaDocument> for RecordSchema {
    type Error = SchemaError;

    fn try_from(document: SchemaDocument) -> Result<Self, Self::Error> {
        RecordSchema::new(document.name, document.fields, document.key)
    }
}

impl RecordSchema {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldSpec>,
        key: KeyRule,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if fields.is_empty() {
            return Err(SchemaError::NoFields(name));
        }

        let mut names = HashSet::new();
        let mut sources = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.to_lowercase()) {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    field: field.name.clone(),
                });
            }
            if !sources.insert(field.source_column().to_lowercase()) {
                return Err(SchemaError::DuplicateSource {
                    schema: name,
                    column: field.source_column().to_string(),
                });
            }
        }

        if key.fields.is_empty() {
            return Err(SchemaError::EmptyKey(name));
        }
        let resolve = |wanted: &[String]| -> Result<Vec<usize>, SchemaError> {
            wanted
                .iter()
                .map(|field| {
                    fields
                        .iter()
                        .position(|f| &f.name == field)
                        .ok_or_else(|| SchemaError::UnknownKeyField {
                            schema: name.clone(),
                            field: field.clone(),
                        })
                })
                .collect()
        };
        let key_indices = resolve(&key.fields)?;
        let fallback_indices = if key.fallback.is_empty() {
            (0..fields.len()).collect()
        } else {
            resolve(&key.fallback)?
        };

        Ok(Self {
            name,
            fields,
            key,
            key_indices,
            fallback_indices,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("Parsing schema YAML {path:?}"))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing schema YAML")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn key(&self) -> &KeyRule {
        &self.key
    }

    pub(crate) fn key_indices(&self) -> &[usize] {
        &self.key_indices
    }

    pub(crate) fn fallback_indices(&self) -> &[usize] {
        &self.fallback_indices
    }

    /// Indices of fields that take part in comparison, in declaration order.
    pub fn compared_indices(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.ignore)
            .map(|(idx, _)| idx)
            .collect()
    }
}
