use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::report::ReportFormat;

#[derive(Debug, Parser)]
#[command(author, version, about = "Reconcile two exports of the same records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare a left and a right export against a record schema
    Reconcile(ReconcileArgs),
    /// Run every report defined in a YAML job file
    Run(RunArgs),
    /// List the fields declared by a record schema
    Fields(FieldsArgs),
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Record schema (YAML) describing fields and the match key
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Left export (.csv, .tsv, .json or .jsonl; '-' for stdin)
    #[arg(short, long)]
    pub left: PathBuf,
    /// Right export (.csv, .tsv, .json or .jsonl)
    #[arg(short, long)]
    pub right: PathBuf,
    /// Directory receiving the timestamped report directory
    #[arg(short = 'o', long = "output-dir", default_value = "reports")]
    pub output_dir: PathBuf,
    /// Report name used for the output directory (defaults to the schema name)
    #[arg(long)]
    pub name: Option<String>,
    /// Display name of the left side
    #[arg(long = "left-label", default_value = "left")]
    pub left_label: String,
    /// Display name of the right side
    #[arg(long = "right-label", default_value = "right")]
    pub right_label: String,
    /// Timestamps closer than this many milliseconds compare equal
    #[arg(long = "tolerance-ms", default_value_t = 1000)]
    pub tolerance_ms: u32,
    /// Report file format
    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    pub format: ReportFormat,
    /// CSV delimiter character for both inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of both inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding of the report files (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Exit with status 2 when any record is unmatched or changed
    #[arg(long = "fail-on-diff")]
    pub fail_on_diff: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Job file (YAML) listing the reports to run
    #[arg(short, long)]
    pub job: PathBuf,
    /// Exit with status 2 when any report has differences
    #[arg(long = "fail-on-diff")]
    pub fail_on_diff: bool,
}

#[derive(Debug, Args)]
pub struct FieldsArgs {
    /// Record schema (YAML) to list
    #[arg(short, long)]
    pub schema: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
