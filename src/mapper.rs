//! Raw rows and the row mapper.
//!
//! A [`RawRow`] is one result row as a data source produced it: column names
//! paired with loosely-typed scalars. [`RowMapper`] turns it into a record of
//! a declared [`RecordSchema`], coercing each value into its field's type.
//! Mapping never fails: absent, null and uncoercible values leave the field at
//! its zero value, and coercion failures are logged and collected.

use std::collections::HashMap;

use log::warn;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use thiserror::Error;

use crate::{
    record::{FromValues, MappedRecord},
    schema::{FieldSpec, FieldType, RecordSchema},
    value::{Value, parse_boolean, parse_decimal_literal, parse_naive_datetime},
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    columns: Vec<(String, Value)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Builder form of [`RawRow::push`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// First value whose column matches `column` ignoring case.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let wanted = column.to_lowercase();
        self.columns
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S, V> FromIterator<(S, V)> for RawRow
where
    S: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoercionError {
    #[error("cannot coerce {from} value into {to}")]
    Unsupported { from: &'static str, to: FieldType },
    #[error("value {value} is out of range for {to}")]
    OutOfRange { value: String, to: FieldType },
    #[error("cannot parse '{value}' as {to}")]
    Parse { value: String, to: FieldType },
}

/// A field left at its zero value because its raw value could not be coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    /// Zero-based position of the row within the mapped batch.
    pub row: usize,
    pub field: String,
    pub column: String,
    pub error: CoercionError,
}

/// Records mapped from a batch of raw rows.
#[derive(Debug, Clone)]
pub struct MappedBatch<T> {
    pub records: Vec<T>,
    pub failures: Vec<CoercionFailure>,
}

pub struct RowMapper<'a> {
    schema: &'a RecordSchema,
    columns: HashMap<String, usize>,
}

impl<'a> RowMapper<'a> {
    pub fn new(schema: &'a RecordSchema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.source_column().to_lowercase(), idx))
            .collect();
        Self { schema, columns }
    }

    pub fn schema(&self) -> &RecordSchema {
        self.schema
    }

    pub fn map_row<T: FromValues>(&self, row: &RawRow) -> T {
        let mut failures = Vec::new();
        T::from_values(self.map_values(row, 0, &mut failures))
    }

    pub fn map_record(&self, row: &RawRow) -> MappedRecord {
        self.map_row(row)
    }

    pub fn map_rows<T: FromValues>(&self, rows: &[RawRow]) -> MappedBatch<T> {
        let mut failures = Vec::new();
        let records = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| T::from_values(self.map_values(row, idx, &mut failures)))
            .collect();
        MappedBatch { records, failures }
    }

    /// Values for every declared field of `row`, in declaration order.
    pub fn map_values(
        &self,
        row: &RawRow,
        row_index: usize,
        failures: &mut Vec<CoercionFailure>,
    ) -> Vec<Value> {
        let fields = self.schema.fields();
        let mut values: Vec<Value> = fields.iter().map(FieldSpec::zero_value).collect();
        let mut assigned = vec![false; fields.len()];

        for (column, raw) in row.columns() {
            let Some(&idx) = self.columns.get(&column.to_lowercase()) else {
                continue;
            };
            if assigned[idx] {
                continue;
            }
            assigned[idx] = true;
            if raw.is_null() {
                continue;
            }
            let field = &fields[idx];
            match coerce(raw, field.datatype) {
                Ok(Value::Null) => {}
                Ok(value) => values[idx] = value,
                Err(error) => {
                    warn!(
                        "Schema '{}' row {}: field '{}' (column '{}') left at zero value: {}",
                        self.schema.name(),
                        row_index + 1,
                        field.name,
                        column,
                        error
                    );
                    failures.push(CoercionFailure {
                        row: row_index,
                        field: field.name.clone(),
                        column: column.to_string(),
                        error,
                    });
                }
            }
        }
        values
    }
}

/// Coerces a raw scalar into `target`.
///
/// Returns `Value::Null` for a blank string aimed at a non-string field, which
/// callers treat like an absent value.
pub fn coerce(value: &Value, target: FieldType) -> Result<Value, CoercionError> {
    let unsupported = || CoercionError::Unsupported {
        from: value.kind(),
        to: target,
    };
    let out_of_range = |shown: String| CoercionError::OutOfRange {
        value: shown,
        to: target,
    };

    if let Value::String(s) = value
        && target != FieldType::String
    {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        return parse_string(trimmed, target);
    }

    match (target, value) {
        (_, Value::Null) => Ok(Value::Null),
        (FieldType::String, Value::String(s)) => Ok(Value::String(s.clone())),
        (FieldType::String, _) => Err(unsupported()),

        (FieldType::Int32, Value::Integer(i)) => i32::try_from(*i)
            .map(|narrowed| Value::Integer(i64::from(narrowed)))
            .map_err(|_| out_of_range(i.to_string())),
        (FieldType::Int64, Value::Integer(i)) => Ok(Value::Integer(*i)),
        (FieldType::Int32 | FieldType::Int64, Value::Float(f)) => {
            let integral = f.is_finite()
                && f.fract() == 0.0
                && *f >= i64::MIN as f64
                && *f < i64::MAX as f64;
            if !integral {
                return Err(out_of_range(f.to_string()));
            }
            narrow_integer(*f as i64, target).ok_or_else(|| out_of_range(f.to_string()))
        }
        (FieldType::Int32 | FieldType::Int64, Value::Decimal(d)) => {
            integral_decimal(*d, target).ok_or_else(|| out_of_range(d.to_string()))
        }

        (FieldType::Decimal, Value::Decimal(d)) => Ok(Value::Decimal(*d)),
        (FieldType::Decimal, Value::Integer(i)) => Ok(Value::Decimal(Decimal::from(*i))),
        (FieldType::Decimal, Value::Float(f)) => Decimal::from_f64(*f)
            .map(Value::Decimal)
            .ok_or_else(|| out_of_range(f.to_string())),

        (FieldType::Float, Value::Float(f)) => Ok(Value::Float(*f)),
        (FieldType::Float, Value::Integer(i)) => Ok(Value::Float(*i as f64)),
        (FieldType::Float, Value::Decimal(d)) => d
            .to_f64()
            .map(Value::Float)
            .ok_or_else(|| out_of_range(d.to_string())),

        (FieldType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(*b)),
        (FieldType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(*ts)),

        _ => Err(unsupported()),
    }
}

fn parse_string(trimmed: &str, target: FieldType) -> Result<Value, CoercionError> {
    let parse_error = || CoercionError::Parse {
        value: trimmed.to_string(),
        to: target,
    };
    match target {
        FieldType::String => Ok(Value::String(trimmed.to_string())),
        FieldType::Int32 | FieldType::Int64 => match trimmed.parse::<i64>() {
            Ok(i) => narrow_integer(i, target).ok_or_else(parse_error),
            // Exports sometimes print whole numbers as `12.0` or `1,200`.
            Err(_) => parse_decimal_literal(trimmed)
                .ok()
                .and_then(|d| integral_decimal(d, target))
                .ok_or_else(parse_error),
        },
        FieldType::Decimal => parse_decimal_literal(trimmed)
            .map(Value::Decimal)
            .map_err(|_| parse_error()),
        FieldType::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| parse_error()),
        FieldType::Boolean => parse_boolean(trimmed)
            .map(Value::Boolean)
            .map_err(|_| parse_error()),
        FieldType::Timestamp => parse_naive_datetime(trimmed)
            .map(Value::Timestamp)
            .map_err(|_| parse_error()),
    }
}

/// Integer value of `d` when it has no fractional part and fits `target`.
fn integral_decimal(d: Decimal, target: FieldType) -> Option<Value> {
    if !d.fract().is_zero() {
        return None;
    }
    d.to_i64().and_then(|i| narrow_integer(i, target))
}

fn narrow_integer(value: i64, target: FieldType) -> Option<Value> {
    match target {
        FieldType::Int32 => i32::try_from(value)
            .ok()
            .map(|narrowed| Value::Integer(i64::from(narrowed))),
        _ => Some(Value::Integer(value)),
    }
}
