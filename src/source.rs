//! Raw row sources.
//!
//! Loads an exported result set into memory as [`RawRow`]s, preserving row
//! order. The format follows the file extension:
//!
//! - `.json`: an array of objects;
//! - `.jsonl` / `.ndjson`: one object per line;
//! - anything else: delimited text with a header row (`.tsv` is tab-separated).
//!
//! Empty CSV cells become nulls and all other cells stay strings; the row
//! mapper parses them into the declared types. JSON scalars keep their native
//! type.

use std::{
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};

use crate::{io_utils, mapper::RawRow, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    JsonArray,
    JsonLines,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => SourceFormat::JsonArray,
            Some("jsonl" | "ndjson") => SourceFormat::JsonLines,
            _ => SourceFormat::Delimited,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

pub fn load_raw_rows(path: &Path, options: &SourceOptions) -> Result<Vec<RawRow>> {
    let rows = match SourceFormat::from_path(path) {
        SourceFormat::Delimited => load_delimited(path, options),
        SourceFormat::JsonArray => load_json_array(path),
        SourceFormat::JsonLines => load_json_lines(path),
    }?;
    debug!("Loaded {} raw row(s) from {:?}", rows.len(), path);
    Ok(rows)
}

fn load_delimited(path: &Path, options: &SourceOptions) -> Result<Vec<RawRow>> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;

    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} in {:?}", row_idx + 2, path))?;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {} in {:?}", row_idx + 2, path))?;
        let mut row = RawRow::with_capacity(headers.len());
        for (header, cell) in headers.iter().zip(decoded) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell)
            };
            row.push(header.as_str(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn load_json_array(path: &Path) -> Result<Vec<RawRow>> {
    let reader = io_utils::open_input(path)?;
    let document: JsonValue = serde_json::from_reader(BufReader::new(reader))
        .with_context(|| format!("Parsing JSON from {path:?}"))?;
    let JsonValue::Array(items) = document else {
        bail!("Expected a JSON array of objects in {path:?}");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            JsonValue::Object(object) => Ok(object_to_row(object, path, idx + 1)),
            other => bail!(
                "Element {} in {:?} is not an object: {}",
                idx + 1,
                path,
                other
            ),
        })
        .collect()
}

fn load_json_lines(path: &Path) -> Result<Vec<RawRow>> {
    let reader = BufReader::new(io_utils::open_input(path)?);
    let mut rows = Vec::new();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Reading line {} in {:?}", line_idx + 1, path))?;
        if line.trim().is_empty() {
            continue;
        }
        let object: Map<String, JsonValue> = serde_json::from_str(&line)
            .with_context(|| format!("Parsing line {} in {:?}", line_idx + 1, path))?;
        rows.push(object_to_row(object, path, line_idx + 1));
    }
    Ok(rows)
}

fn object_to_row(object: Map<String, JsonValue>, path: &Path, position: usize) -> RawRow {
    let mut row = RawRow::with_capacity(object.len());
    for (column, json) in object {
        let value = json_to_value(&json).unwrap_or_else(|| {
            warn!(
                "{:?} row {}: column '{}' holds a non-scalar value; treating it as null",
                path, position, column
            );
            Value::Null
        });
        row.push(column, value);
    }
    row
}

/// Scalar form of a JSON value; `None` for arrays and objects.
pub fn json_to_value(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => Some(Value::Null),
        JsonValue::Bool(b) => Some(Value::Boolean(*b)),
        JsonValue::Number(n) => Some(
            n.as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
        ),
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("db1.JSON")),
            SourceFormat::JsonArray
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("db1.ndjson")),
            SourceFormat::JsonLines
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("db1.tsv")),
            SourceFormat::Delimited
        );
    }

    #[test]
    fn json_scalars_keep_their_type() {
        assert_eq!(json_to_value(&json!(5)), Some(Value::Integer(5)));
        assert_eq!(json_to_value(&json!(2.5)), Some(Value::Float(2.5)));
        assert_eq!(json_to_value(&json!(true)), Some(Value::Boolean(true)));
        assert_eq!(json_to_value(&json!(null)), Some(Value::Null));
        assert_eq!(json_to_value(&json!("x")), Some(Value::from("x")));
        assert_eq!(json_to_value(&json!([1, 2])), None);
    }
}
