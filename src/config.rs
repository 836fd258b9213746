//! Reconciliation job files.
//!
//! A job lists one or more reports, each pairing a record schema with a left
//! and a right export. Relative paths are resolved against the directory of
//! the job file so a job can travel together with its inputs.
//!
//! ```yaml
//! output_dir: out
//! left_label: DB1
//! right_label: DB2
//! timestamp_tolerance_ms: 1000
//! reports:
//!   - name: work_orders
//!     schema: schemas/work_orders.yaml
//!     left: db1/work_orders.csv
//!     right:
//!       path: db2/work_orders.tsv
//!       encoding: windows-1252
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::TimeDelta;
use serde::Deserialize;

use crate::{
    io_utils,
    report::{ReportFormat, SideLabels},
    source::SourceOptions,
    value::DEFAULT_TIMESTAMP_TOLERANCE,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileJob {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_left_label")]
    pub left_label: String,
    #[serde(default = "default_right_label")]
    pub right_label: String,
    #[serde(default)]
    pub timestamp_tolerance_ms: Option<i64>,
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default)]
    pub output_encoding: Option<String>,
    pub reports: Vec<ReportJob>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportJob {
    pub name: String,
    pub schema: PathBuf,
    pub left: SourceSpec,
    pub right: SourceSpec,
}

/// A source is either a bare path or a path with reader settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Path(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        delimiter: Option<String>,
        #[serde(default)]
        encoding: Option<String>,
    },
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_left_label() -> String {
    SideLabels::default().left
}

fn default_right_label() -> String {
    SideLabels::default().right
}

impl ReconcileJob {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Reading job file {path:?}"))?;
        let mut job = Self::from_yaml_str(&text)
            .with_context(|| format!("Parsing job file {path:?}"))?;
        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        Ok(job)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let job: ReconcileJob = serde_yaml::from_str(text)?;
        job.validate()?;
        Ok(job)
    }

    fn validate(&self) -> Result<()> {
        if self.reports.is_empty() {
            bail!("Job defines no reports");
        }
        let mut seen = Vec::with_capacity(self.reports.len());
        for report in &self.reports {
            let name = report.name.trim();
            if name.is_empty() {
                bail!("Report names cannot be empty");
            }
            if seen.contains(&name) {
                bail!("Report '{name}' is defined more than once");
            }
            seen.push(name);
        }
        if let Some(ms) = self.timestamp_tolerance_ms
            && ms < 0
        {
            bail!("timestamp_tolerance_ms cannot be negative (got {ms})");
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.output_dir = resolve(base, &self.output_dir);
        for report in &mut self.reports {
            report.schema = resolve(base, &report.schema);
            report.left.resolve(base);
            report.right.resolve(base);
        }
    }

    pub fn labels(&self) -> SideLabels {
        SideLabels {
            left: self.left_label.clone(),
            right: self.right_label.clone(),
        }
    }

    pub fn timestamp_tolerance(&self) -> TimeDelta {
        self.timestamp_tolerance_ms
            .map(TimeDelta::milliseconds)
            .unwrap_or(DEFAULT_TIMESTAMP_TOLERANCE)
    }
}

impl SourceSpec {
    pub fn path(&self) -> &Path {
        match self {
            SourceSpec::Path(path) => path,
            SourceSpec::Detailed { path, .. } => path,
        }
    }

    pub fn options(&self) -> Result<SourceOptions> {
        match self {
            SourceSpec::Path(_) => Ok(SourceOptions::default()),
            SourceSpec::Detailed {
                delimiter,
                encoding,
                ..
            } => Ok(SourceOptions {
                delimiter: delimiter
                    .as_deref()
                    .map(crate::cli::parse_delimiter)
                    .transpose()
                    .map_err(|err| anyhow!(err))?,
                encoding: io_utils::resolve_encoding(encoding.as_deref())?,
            }),
        }
    }

    fn resolve(&mut self, base: &Path) {
        match self {
            SourceSpec::Path(path) => *path = resolve(base, path),
            SourceSpec::Detailed { path, .. } => *path = resolve(base, path),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || io_utils::is_dash(path) {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
output_dir: out
left_label: DB1
right_label: DB2
timestamp_tolerance_ms: 250
format: json
reports:
  - name: work_orders
    schema: schemas/wo.yaml
    left: db1/wo.csv
    right:
      path: db2/wo.tsv
      delimiter: tab
      encoding: latin1
"#;

    #[test]
    fn job_parses_both_source_forms() {
        let job = ReconcileJob::from_yaml_str(JOB).unwrap();
        assert_eq!(job.format, ReportFormat::Json);
        assert_eq!(job.timestamp_tolerance(), TimeDelta::milliseconds(250));
        assert_eq!(job.labels().left, "DB1");
        let report = &job.reports[0];
        assert_eq!(report.left, SourceSpec::Path(PathBuf::from("db1/wo.csv")));
        let options = report.right.options().unwrap();
        assert_eq!(options.delimiter, Some(b'\t'));
        assert_eq!(options.encoding.name(), "windows-1252");
    }

    #[test]
    fn relative_paths_follow_the_job_file() {
        let mut job = ReconcileJob::from_yaml_str(JOB).unwrap();
        job.resolve_paths(Path::new("/jobs/nightly"));
        assert_eq!(job.output_dir, PathBuf::from("/jobs/nightly/out"));
        assert_eq!(
            job.reports[0].right.path(),
            Path::new("/jobs/nightly/db2/wo.tsv")
        );
        assert_eq!(
            job.reports[0].schema,
            PathBuf::from("/jobs/nightly/schemas/wo.yaml")
        );
    }

    #[test]
    fn labels_default_to_sides() {
        let job = ReconcileJob::from_yaml_str(
            "reports:\n  - { name: a, schema: s.yaml, left: l.csv, right: r.csv }\n",
        )
        .unwrap();
        assert_eq!(job.left_label, "left");
        assert_eq!(job.right_label, "right");
        assert_eq!(job.timestamp_tolerance(), DEFAULT_TIMESTAMP_TOLERANCE);
        assert_eq!(job.format, ReportFormat::Csv);
    }

    #[test]
    fn duplicate_report_names_are_rejected() {
        let report = "  - { name: a, schema: s, left: l, right: r }\n";
        let err = ReconcileJob::from_yaml_str(&format!("reports:\n{report}{report}")).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
