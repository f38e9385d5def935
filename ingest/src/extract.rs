use crate::{
    identity::{self, Catalog, Features, IndexMode},
    record::{Latency, ResultRecord},
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, trace};

/// default marker identifying result lines in the captured output
pub const DEFAULT_MARKER: &str = "total";

static TXN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"txn (\d+) of (\d+) txns").expect("txn pattern is valid"));
static LATENCY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"avg_txn: (\d+\.?\d*), 10.: (\d+\.?\d*), 95.: (\d+\.?\d*), 99.: (\d+\.?\d*)")
        .expect("latency pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Result line has no transaction count")]
    MissingTransactions,
    #[error("Failed to read number {0:?}")]
    InvalidNumber(String),
    #[error("Committed transactions ({commits}) exceed total transactions ({total})")]
    CommitsExceedTotal { commits: u64, total: u64 },
}

/// a result line that could not be turned into a record
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// 1-based line number in the captured text
    pub line: usize,
    pub content: String,
    pub error: ExtractError,
}

/// records of a single run, in line order, plus the lines that were rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<ResultRecord>,
    pub rejected: Vec<Rejected>,
}

/// Scrapes result records from captured benchmark output.
///
/// The extractor holds no state between calls, the same flags and text always
/// yield the same records.
#[derive(Debug, Clone)]
pub struct Extractor<'a> {
    catalog: &'a Catalog,
    mode: IndexMode,
    marker: &'a str,
}

fn capture<T: std::str::FromStr>(captures: &Captures, group: usize) -> Result<T, ExtractError> {
    let text = captures.get(group).map_or("", |value| value.as_str());

    text.parse()
        .map_err(|_| ExtractError::InvalidNumber(text.to_string()))
}

/// committed and total transaction count of a result line
pub fn transactions(line: &str) -> Result<(u64, u64), ExtractError> {
    let captures = TXN_PATTERN
        .captures(line)
        .ok_or(ExtractError::MissingTransactions)?;
    let commits = capture(&captures, 1)?;
    let total = capture(&captures, 2)?;

    if commits > total {
        Err(ExtractError::CommitsExceedTotal { commits, total })
    } else {
        Ok((commits, total))
    }
}

/// latency figures of a result line, `None` if the line has no latency report
pub fn latency(line: &str) -> Result<Option<Latency>, ExtractError> {
    match LATENCY_PATTERN.captures(line) {
        Some(captures) => Ok(Some(Latency {
            average: capture(&captures, 1)?,
            p10: capture(&captures, 2)?,
            p95: capture(&captures, 3)?,
            p99: capture(&captures, 4)?,
        })),
        None => Ok(None),
    }
}

impl<'a> Extractor<'a> {
    pub fn new(catalog: &'a Catalog, mode: IndexMode) -> Self {
        Self {
            catalog,
            mode,
            marker: DEFAULT_MARKER,
        }
    }

    pub fn with_marker(mut self, marker: &'a str) -> Self {
        self.marker = marker;
        self
    }

    /// build the record of a single result line
    ///
    /// `text` is the complete output the line belongs to, it is only consulted
    /// for the skew parameter when the line itself does not report one
    pub fn extract_line(
        &self,
        features: &Features,
        threads: u32,
        line: &str,
        text: &str,
    ) -> Result<ResultRecord, ExtractError> {
        let (commits, total) = transactions(line)?;

        Ok(ResultRecord {
            system: self.catalog.resolve_system(features, self.mode).to_string(),
            workload: identity::resolve_workload(features, &[line, text]),
            threads,
            cc: identity::resolve_cc(features),
            commits,
            total,
            latency: latency(line)?,
        })
    }

    /// extract every result line of `text`
    pub fn extract<S: AsRef<str>>(&self, flags: &[S], threads: u32, text: &str) -> Extraction {
        let features = Features::new(flags.iter().map(|flag| flag.as_ref()));
        let mut extraction = Extraction::default();

        for (index, line) in text
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(self.marker))
        {
            trace!(line = line, "Found result line");

            match self.extract_line(&features, threads, line, text) {
                Ok(record) => extraction.records.push(record),
                Err(error) => {
                    debug!(line = index + 1, error = %error, "Rejected result line");

                    extraction.rejected.push(Rejected {
                        line: index + 1,
                        content: line.to_string(),
                        error,
                    })
                }
            }
        }

        extraction
    }
}
