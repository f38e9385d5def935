//! Report definitions and their rendering into pivot tables.

use crate::{
    aggregate::Aggregate,
    pivot::{pivot, Cells, Reducer, Table, Value},
};
use falcon_ingest::{Latency, ResultRecord};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to write {0:?}")]
    Write(PathBuf, #[source] std::io::Error),
}

const SYSTEMS: [&str; 7] = [
    "Falcon(DRAM Index)",
    "Falcon(All Flush)",
    "Falcon(No Flush)",
    "Inp",
    "Outp",
    "ZenS(No Flush)",
    "ZenS",
];
const SCALING_SYSTEMS: [&str; 5] = [
    "Inp",
    "Falcon(All Flush)",
    "Inp(No Flush)",
    "Inp(Hot Tuple Cache)",
    "Falcon(DRAM Index)",
];
const SCHEMES: [&str; 6] = ["2PL", "TO", "OCC", "MV2PL", "MVTO", "MVOCC"];
const TRANSACTIONS: [&str; 2] = ["new_order", "payment"];
const LATENCY_COLUMNS: [&str; 4] = ["new_order-avg", "new_order-95", "payment-avg", "payment-95"];
const WORKLOAD_CODES: [&str; 4] = ["aU", "aZ", "fU", "fZ"];
const THREADS: [u32; 7] = [1, 2, 4, 8, 16, 32, 48];

const YCSB_LETTERS: [(&str, char); 6] = [
    ("ycsb_a", 'a'),
    ("ycsb_b", 'b'),
    ("ycsb_c", 'c'),
    ("ycsb_d", 'd'),
    ("ycsb_e", 'e'),
    ("ycsb_f", 'f'),
];
const HIGH_SKEW: &str = "zipf_theta = 0.99";
const NO_SKEW: &str = "zipf_theta = 0";

/// TPC-C transaction a workload label refers to
pub fn tpcc_transaction(workload: &str) -> Option<&'static str> {
    TRANSACTIONS
        .iter()
        .find(|transaction| workload.contains(*transaction))
        .copied()
}

/// latency figure shown in its own column of the latency report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LatencyField {
    Average,
    Tail,
}

impl LatencyField {
    const ALL: [Self; 2] = [Self::Average, Self::Tail];

    fn suffix(self) -> &'static str {
        match self {
            Self::Average => "avg",
            Self::Tail => "95",
        }
    }

    fn read(self, latency: &Latency) -> f64 {
        match self {
            Self::Average => latency.average,
            Self::Tail => latency.p95,
        }
    }
}

/// Short column code of a workload label.
///
/// YCSB workloads become their letter followed by `Z` for high and `U` for no
/// skew, TPC-C transactions become `N` or `P`.
pub fn workload_code(workload: &str) -> Option<String> {
    match tpcc_transaction(workload) {
        Some("new_order") => return Some("N".to_string()),
        Some(_) => return Some("P".to_string()),
        None => {}
    }

    let mut code: String = YCSB_LETTERS
        .iter()
        .filter(|(token, _)| workload.contains(token))
        .map(|(_, letter)| *letter)
        .collect();

    // the prefix check for the uniform case would also match 0.99
    if workload.contains(HIGH_SKEW) {
        code.push('Z');
    } else if workload.contains(NO_SKEW) {
        code.push('U');
    }

    (!code.is_empty()).then_some(code)
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// committed transactions per system and concurrency control scheme
    SchemeCommits,
    /// average and 95th percentile latency per system and TPC-C transaction
    TransactionLatency,
    /// committed transactions per system and workload
    WorkloadThroughput,
    /// committed transactions per thread count and system
    ThreadScaling,
}

impl ReportKind {
    fn default_rows(self) -> Vec<String> {
        match self {
            Self::ThreadScaling => THREADS.iter().map(u32::to_string).collect(),
            _ => SYSTEMS.iter().map(|system| system.to_string()).collect(),
        }
    }

    fn default_columns(self) -> Vec<String> {
        let columns: &[&str] = match self {
            Self::SchemeCommits => &SCHEMES,
            Self::TransactionLatency => &LATENCY_COLUMNS,
            Self::WorkloadThroughput => &WORKLOAD_CODES,
            Self::ThreadScaling => &SCALING_SYSTEMS,
        };

        columns.iter().map(|column| column.to_string()).collect()
    }

    fn corner(self) -> &'static str {
        match self {
            Self::ThreadScaling => "threads",
            _ => "sysname",
        }
    }

    fn default_header(self, columns: &[String]) -> Vec<String> {
        let mut header = vec![self.corner().to_string()];
        header.extend(columns.iter().cloned());
        header
    }

    /// group records into the cells of this kind of report
    pub fn pivot<'r, I: IntoIterator<Item = &'r ResultRecord>>(self, records: I) -> Cells {
        let system = |r: &ResultRecord| Some(r.system.clone());
        let commits = |r: &ResultRecord| Some(Value::Count(r.commits));

        match self {
            Self::SchemeCommits => pivot(records, system, |r| Some(r.cc.clone()), commits, Reducer::Sum),
            // one column per transaction and latency figure, repetitions keep the first run
            Self::TransactionLatency => pivot(
                records
                    .into_iter()
                    .flat_map(|record| LatencyField::ALL.map(|field| (record, field))),
                |(record, _)| Some(record.system.clone()),
                |(record, field)| {
                    tpcc_transaction(&record.workload)
                        .map(|transaction| format!("{transaction}-{}", field.suffix()))
                },
                |(record, field)| record.latency.as_ref().map(|latency| Value::Number(field.read(latency))),
                Reducer::First,
            ),
            Self::WorkloadThroughput => {
                pivot(records, system, |r| workload_code(&r.workload), commits, Reducer::First)
            }
            Self::ThreadScaling => pivot(
                records,
                |r| Some(r.threads.to_string()),
                system,
                commits,
                Reducer::First,
            ),
        }
    }
}

/// restricts which records feed a report, all set conditions must hold
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecordFilter {
    /// exact concurrency control label, e.g. `OCC`
    pub scheme: Option<String>,
    pub workload_contains: Option<String>,
    pub workload_suffix: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ResultRecord) -> bool {
        self.scheme.as_ref().map_or(true, |scheme| &record.cc == scheme)
            && self
                .workload_contains
                .as_ref()
                .map_or(true, |part| record.workload.contains(part.as_str()))
            && self
                .workload_suffix
                .as_ref()
                .map_or(true, |suffix| record.workload.ends_with(suffix.as_str()))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub title: String,
    /// batches whose records feed the report, in order
    pub batches: Vec<String>,
    pub kind: ReportKind,
    #[serde(default)]
    pub filter: RecordFilter,
    pub rows: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
    pub header: Option<Vec<String>>,
}

impl ReportConfig {
    pub fn rows(&self) -> Vec<String> {
        self.rows.clone().unwrap_or_else(|| self.kind.default_rows())
    }

    pub fn columns(&self) -> Vec<String> {
        self.columns.clone().unwrap_or_else(|| self.kind.default_columns())
    }

    pub fn header(&self) -> Vec<String> {
        self.header
            .clone()
            .unwrap_or_else(|| self.kind.default_header(&self.columns()))
    }

    /// build the table of this report from an unfiltered record stream
    pub fn build<'r, I: IntoIterator<Item = &'r ResultRecord>>(&self, records: I) -> Table {
        let cells = self
            .kind
            .pivot(records.into_iter().filter(|record| self.filter.matches(record)));

        if cells.is_empty() {
            debug!(report = %self.title, "Report has no matching records");
        }

        cells.render(&self.title, &self.header(), &self.rows(), &self.columns())
    }
}

/// every report rendered from the collected batches, tables separated by blank lines
#[instrument(skip_all, fields(reports = reports.len()))]
pub fn render(reports: &[ReportConfig], aggregate: &Aggregate) -> String {
    let mut output = String::new();

    for report in reports {
        let table = report.build(aggregate.records_of(&report.batches));
        info!(report = %report.title, rows = table.rows.len(), "Rendered report");

        output.push_str(&table.to_string());
        output.push('\n');
    }

    output
}

/// write the rendered reports to `output` and the concatenated records to `raw`
pub fn write_outputs(
    reports: &[ReportConfig],
    aggregate: &Aggregate,
    output: &Path,
    raw: &Path,
) -> Result<(), AnalysisError> {
    fs::write(output, render(reports, aggregate))
        .map_err(|error| AnalysisError::Write(output.to_path_buf(), error))?;
    info!(path = ?output, "Wrote reports");

    fs::write(raw, aggregate.raw()).map_err(|error| AnalysisError::Write(raw.to_path_buf(), error))?;
    info!(path = ?raw, "Wrote raw data");

    Ok(())
}
