pub mod cli;
pub mod config;
pub mod io_utils;
pub mod key;
pub mod mapper;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod schema;
pub mod source;
pub mod table;
pub mod value;

pub use mapper::{RawRow, RowMapper};
pub use reconcile::{ReconciliationResult, Reconciler};
pub use record::{FromValues, MappedRecord, Record};
pub use schema::{FieldSpec, FieldType, KeyRule, RecordSchema};
pub use value::Value;

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Local, TimeDelta};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::ReconcileJob,
    reconcile::ReconciliationSummary,
    report::{ReportOptions, SideLabels},
    source::SourceOptions,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("report_recon", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// Outcome of a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    /// `--fail-on-diff` was given and at least one report has differences.
    Differences,
}

pub fn run() -> Result<RunStatus> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Reconcile(args) => handle_reconcile(&args),
        Commands::Run(args) => handle_run(&args),
        Commands::Fields(args) => handle_fields(&args),
    }
}

/// One side of a report: where to read it and how.
struct SideInput<'a> {
    path: &'a Path,
    options: SourceOptions,
}

struct ReportSettings {
    output_dir: PathBuf,
    tolerance: TimeDelta,
    options: ReportOptions,
}

fn handle_reconcile(args: &cli::ReconcileArgs) -> Result<RunStatus> {
    if io_utils::is_dash(&args.left) && io_utils::is_dash(&args.right) {
        bail!("Only one side can be read from stdin");
    }
    let schema = RecordSchema::load(&args.schema)?;
    let input = SourceOptions {
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    };
    if let Some(delimiter) = args.delimiter {
        debug!("Reading both sides with delimiter '{}'", printable_delimiter(delimiter));
    }
    let settings = ReportSettings {
        output_dir: args.output_dir.clone(),
        tolerance: TimeDelta::milliseconds(i64::from(args.tolerance_ms)),
        options: ReportOptions {
            labels: SideLabels {
                left: args.left_label.clone(),
                right: args.right_label.clone(),
            },
            format: args.format,
            encoding: io_utils::resolve_encoding(args.output_encoding.as_deref())?,
        },
    };
    let name = args.name.as_deref().unwrap_or(schema.name());
    let summary = run_report(
        name,
        &schema,
        SideInput {
            path: &args.left,
            options: input,
        },
        SideInput {
            path: &args.right,
            options: input,
        },
        &settings,
    )?;
    Ok(status(args.fail_on_diff, summary.has_differences()))
}

fn handle_run(args: &cli::RunArgs) -> Result<RunStatus> {
    let job = ReconcileJob::load(&args.job)?;
    info!(
        "Running {} report(s) from {:?}",
        job.reports.len(),
        args.job
    );
    let settings = ReportSettings {
        output_dir: job.output_dir.clone(),
        tolerance: job.timestamp_tolerance(),
        options: ReportOptions {
            labels: job.labels(),
            format: job.format,
            encoding: io_utils::resolve_encoding(job.output_encoding.as_deref())?,
        },
    };
    let mut any_differences = false;
    for report in &job.reports {
        let schema = RecordSchema::load(&report.schema)
            .with_context(|| format!("Report '{}'", report.name))?;
        let summary = run_report(
            &report.name,
            &schema,
            SideInput {
                path: report.left.path(),
                options: report.left.options()?,
            },
            SideInput {
                path: report.right.path(),
                options: report.right.options()?,
            },
            &settings,
        )
        .with_context(|| format!("Report '{}'", report.name))?;
        any_differences |= summary.has_differences();
    }
    Ok(status(args.fail_on_diff, any_differences))
}

fn handle_fields(args: &cli::FieldsArgs) -> Result<RunStatus> {
    let schema = RecordSchema::load(&args.schema)?;
    let key = schema.key();
    let headers = ["#", "name", "column", "type", "nullable", "key", "compared"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let key_position = key
                .fields
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&field.name))
                .map(|pos| (pos + 1).to_string())
                .unwrap_or_default();
            vec![
                (idx + 1).to_string(),
                field.name.clone(),
                field.source_column().to_string(),
                field.datatype.to_string(),
                yes_no(field.nullable),
                key_position,
                yes_no(!field.ignore),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(RunStatus::Clean)
}

fn run_report(
    name: &str,
    schema: &RecordSchema,
    left: SideInput<'_>,
    right: SideInput<'_>,
    settings: &ReportSettings,
) -> Result<ReconciliationSummary> {
    let started_at = Local::now().naive_local();
    info!(
        "Reconciling '{}': {:?} against {:?}",
        name, left.path, right.path
    );
    let (left_rows, right_rows) = thread::scope(|scope| -> Result<_> {
        let left_loader = scope.spawn(|| source::load_raw_rows(left.path, &left.options));
        let right_loader = scope.spawn(|| source::load_raw_rows(right.path, &right.options));
        let left_rows = left_loader
            .join()
            .map_err(|_| anyhow!("Loader for {:?} panicked", left.path))??;
        let right_rows = right_loader
            .join()
            .map_err(|_| anyhow!("Loader for {:?} panicked", right.path))??;
        Ok((left_rows, right_rows))
    })?;

    let mapper = RowMapper::new(schema);
    let left_batch = mapper.map_rows::<MappedRecord>(&left_rows);
    let right_batch = mapper.map_rows::<MappedRecord>(&right_rows);
    let labels = &settings.options.labels;
    for (label, failures) in [
        (&labels.left, left_batch.failures.len()),
        (&labels.right, right_batch.failures.len()),
    ] {
        if failures > 0 {
            warn!("{failures} value(s) in {label} could not be coerced and were left at zero");
        }
    }

    let result = Reconciler::new(schema)
        .with_timestamp_tolerance(settings.tolerance)
        .reconcile(&left_batch.records, &right_batch.records);
    let summary = result.summary;

    let dir = report::report_dir(&settings.output_dir, name, started_at);
    let written = report::write_report(&dir, schema, &result, &settings.options)
        .with_context(|| format!("Writing report to {dir:?}"))?;

    let summary_table = report::summary_table(&summary, labels);
    println!("{name}");
    table::print_table(&summary_table.headers, &summary_table.rows);
    info!(
        "'{}': {} matched, {} only in {}, {} only in {}, {} changed",
        name,
        summary.matched,
        summary.left_only,
        labels.left,
        summary.right_only,
        labels.right,
        summary.changed
    );
    for path in &written {
        info!("Wrote {path:?}");
    }
    Ok(summary)
}

fn status(fail_on_diff: bool, differences: bool) -> RunStatus {
    if fail_on_diff && differences {
        RunStatus::Differences
    } else {
        RunStatus::Clean
    }
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "yes" } else { "no" };
    text.to_string()
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
