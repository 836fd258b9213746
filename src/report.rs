//! Report projection and file sinks.
//!
//! A [`ReconciliationResult`] is projected into plain tables: one per
//! partition with the declared fields as columns, a side-by-side differences
//! table for changed records, and a summary. The tables are written as CSV
//! files, or the whole result as a single JSON document.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::ValueEnum;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    io_utils,
    record::{NamedRecord, Record},
    reconcile::{ChangedRecord, ReconciliationResult, ReconciliationSummary},
    schema::RecordSchema,
};

pub const STATUS_DIFFERENT: &str = "DIFFERENT";
pub const STATUS_SAME: &str = "Same";
pub const STATUS_IGNORED: &str = "Ignored";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

/// Display names for the two sides, e.g. the databases they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideLabels {
    pub left: String,
    pub right: String,
}

impl Default for SideLabels {
    fn default() -> Self {
        Self {
            left: "left".to_string(),
            right: "right".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub labels: SideLabels,
    pub format: ReportFormat,
    pub encoding: &'static Encoding,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            labels: SideLabels::default(),
            format: ReportFormat::Csv,
            encoding: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One row per record, one column per declared field.
pub fn records_table<T: Record>(schema: &RecordSchema, records: &[T]) -> Table {
    let width = schema.fields().len();
    Table {
        headers: schema.field_names(),
        rows: records
            .iter()
            .map(|record| {
                (0..width)
                    .map(|idx| record.value(idx).as_display())
                    .collect()
            })
            .collect(),
    }
}

/// Every declared field of every changed record, both sides next to each other.
pub fn differences_table<T: Record>(
    schema: &RecordSchema,
    changed: &[ChangedRecord<T>],
    labels: &SideLabels,
) -> Table {
    let mut rows = Vec::new();
    for change in changed {
        for (idx, field) in schema.fields().iter().enumerate() {
            let status = if field.ignore {
                STATUS_IGNORED
            } else if change.differing_fields.contains(&field.name) {
                STATUS_DIFFERENT
            } else {
                STATUS_SAME
            };
            rows.push(vec![
                change.key.clone(),
                field.name.clone(),
                change.left.value(idx).as_display(),
                change.right.value(idx).as_display(),
                status.to_string(),
            ]);
        }
    }
    Table {
        headers: vec![
            "key".to_string(),
            "field".to_string(),
            labels.left.clone(),
            labels.right.clone(),
            "status".to_string(),
        ],
        rows,
    }
}

pub fn summary_table(summary: &ReconciliationSummary, labels: &SideLabels) -> Table {
    let line = |metric: String, count: usize| vec![metric, count.to_string()];
    Table {
        headers: vec!["metric".to_string(), "count".to_string()],
        rows: vec![
            line(format!("Records in {}", labels.left), summary.left_records),
            line(format!("Records in {}", labels.right), summary.right_records),
            line("Matching records".to_string(), summary.matched),
            line(format!("Only in {}", labels.left), summary.left_only),
            line(format!("Only in {}", labels.right), summary.right_only),
            line("Records with differences".to_string(), summary.changed),
            line(
                format!("Duplicate keys in {}", labels.left),
                summary.left_duplicate_keys,
            ),
            line(
                format!("Duplicate keys in {}", labels.right),
                summary.right_duplicate_keys,
            ),
        ],
    }
}

/// Directory for one report run, e.g. `out/work_orders_20250701_080000`.
pub fn report_dir(output_dir: &Path, report_name: &str, started_at: NaiveDateTime) -> PathBuf {
    output_dir.join(format!(
        "{}_{}",
        report_name,
        started_at.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the report files into `dir` (created if missing) and returns their paths.
pub fn write_report<T: Record>(
    dir: &Path,
    schema: &RecordSchema,
    result: &ReconciliationResult<T>,
    options: &ReportOptions,
) -> Result<Vec<PathBuf>> {
    io_utils::ensure_dir(dir)?;
    match options.format {
        ReportFormat::Csv => write_csv_report(dir, schema, result, options),
        ReportFormat::Json => {
            let path = dir.join("report.json");
            write_json_report(&path, schema, result, options)?;
            Ok(vec![path])
        }
    }
}

fn write_csv_report<T: Record>(
    dir: &Path,
    schema: &RecordSchema,
    result: &ReconciliationResult<T>,
    options: &ReportOptions,
) -> Result<Vec<PathBuf>> {
    let labels = &options.labels;
    let tables = [
        ("summary.csv", summary_table(&result.summary, labels)),
        ("matched.csv", records_table(schema, &result.matched)),
        ("left_only.csv", records_table(schema, &result.left_only)),
        ("right_only.csv", records_table(schema, &result.right_only)),
        (
            "differences.csv",
            differences_table(schema, &result.changed, labels),
        ),
    ];
    let mut written = Vec::with_capacity(tables.len());
    for (file_name, table) in tables {
        let path = dir.join(file_name);
        write_csv_table(&path, &table, options.encoding)?;
        written.push(path);
    }
    Ok(written)
}

pub fn write_csv_table(path: &Path, table: &Table, encoding: &'static Encoding) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path, encoding)?;
    writer
        .write_record(&table.headers)
        .with_context(|| format!("Writing headers to {path:?}"))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))
}

#[derive(Serialize)]
struct JsonReport<'a> {
    schema: &'a str,
    left_label: &'a str,
    right_label: &'a str,
    summary: &'a ReconciliationSummary,
    matched: Vec<NamedRecord<'a>>,
    left_only: Vec<NamedRecord<'a>>,
    right_only: Vec<NamedRecord<'a>>,
    changed: Vec<JsonChange<'a>>,
}

#[derive(Serialize)]
struct JsonChange<'a> {
    key: &'a str,
    differing_fields: &'a [String],
    left: NamedRecord<'a>,
    right: NamedRecord<'a>,
}

fn write_json_report<T: Record>(
    path: &Path,
    schema: &RecordSchema,
    result: &ReconciliationResult<T>,
    options: &ReportOptions,
) -> Result<()> {
    let named = |records: &[T]| {
        records
            .iter()
            .map(|record| NamedRecord::new(schema, record))
            .collect::<Vec<_>>()
    };
    let report = JsonReport {
        schema: schema.name(),
        left_label: &options.labels.left,
        right_label: &options.labels.right,
        summary: &result.summary,
        matched: named(&result.matched),
        left_only: named(&result.left_only),
        right_only: named(&result.right_only),
        changed: result
            .changed
            .iter()
            .map(|change| JsonChange {
                key: &change.key,
                differing_fields: &change.differing_fields,
                left: NamedRecord::new(schema, &change.left),
                right: NamedRecord::new(schema, &change.right),
            })
            .collect(),
    };
    let mut writer = io_utils::open_writer(path, options.encoding)?;
    serde_json::to_writer_pretty(&mut writer, &report)
        .with_context(|| format!("Writing JSON report to {path:?}"))?;
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reconcile::Reconciler,
        record::MappedRecord,
        schema::{FieldSpec, FieldType, KeyRule},
    };

    fn schema() -> RecordSchema {
        RecordSchema::new(
            "wo",
            vec![
                FieldSpec::new("id", FieldType::String),
                FieldSpec::new("qty", FieldType::Int32).nullable(),
                FieldSpec::new("seen", FieldType::String).ignored(),
            ],
            KeyRule::new(["id"]),
        )
        .unwrap()
    }

    #[test]
    fn differences_table_marks_each_field() {
        let schema = schema();
        let left = vec![MappedRecord::new(vec!["A".into(), 1.into(), "x".into()])];
        let right = vec![MappedRecord::new(vec![
            "A".into(),
            Option::<i32>::None.into(),
            "y".into(),
        ])];
        let result = Reconciler::new(&schema).reconcile(&left, &right);
        let labels = SideLabels {
            left: "DB1".to_string(),
            right: "DB2".to_string(),
        };
        let table = differences_table(&schema, &result.changed, &labels);
        assert_eq!(table.headers, vec!["key", "field", "DB1", "DB2", "status"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["A", "id", "A", "A", "Same"],
                vec!["A", "qty", "1", "", "DIFFERENT"],
                vec!["A", "seen", "x", "y", "Ignored"],
            ]
        );
    }

    #[test]
    fn records_table_uses_declared_fields() {
        let schema = schema();
        let records = vec![MappedRecord::new(vec!["B".into(), 4.into(), "".into()])];
        let table = records_table(&schema, &records);
        assert_eq!(table.headers, vec!["id", "qty", "seen"]);
        assert_eq!(table.rows, vec![vec!["B", "4", ""]]);
    }

    #[test]
    fn report_dir_is_timestamped() {
        let started =
            NaiveDateTime::parse_from_str("2025-07-01 08:05:09", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            report_dir(Path::new("out"), "kpi", started),
            PathBuf::from("out/kpi_20250701_080509")
        );
    }
}
