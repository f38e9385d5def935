use itertools::Itertools;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// header line written in front of concatenated record files
pub const RECORD_HEADER: &str =
    "sysname,workload,threads,cc,commit txns,total txns,avg latency,10% latency,95% latency,99% latency";

const SHORT_FIELDS: usize = 6;
const FULL_FIELDS: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Expected {SHORT_FIELDS} or {FULL_FIELDS} fields, found {0}")]
    FieldCount(usize),
    #[error("Field {field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("Committed transactions ({commits}) exceed total transactions ({total})")]
    CommitsExceedTotal { commits: u64, total: u64 },
}

/// latency figures reported by a single run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    pub average: f64,
    pub p10: f64,
    pub p95: f64,
    pub p99: f64,
}

/// One parsed result line of a benchmark run.
///
/// The delimited form is
/// `system,workload,threads,cc,commits,total[,avg,p10,p95,p99]`, the latency
/// fields are left out entirely when the run did not report them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub system: String,
    pub workload: String,
    pub threads: u32,
    pub cc: String,
    pub commits: u64,
    pub total: u64,
    pub latency: Option<Latency>,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.system, self.workload, self.threads, self.cc, self.commits, self.total
        )?;

        if let Some(latency) = self.latency {
            write!(
                f,
                ",{},{},{},{}",
                latency.average, latency.p10, latency.p95, latency.p99
            )?;
        }

        Ok(())
    }
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn latency_figure(field: &'static str, value: &str) -> Result<f64, RecordError> {
    let figure: f64 = number(field, value)?;

    if figure.is_finite() && figure >= 0.0 {
        Ok(figure)
    } else {
        Err(RecordError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }
}

impl FromStr for ResultRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = line.trim_end_matches(['\r', '\n']).split(',').collect_vec();

        if fields.len() != SHORT_FIELDS && fields.len() != FULL_FIELDS {
            return Err(RecordError::FieldCount(fields.len()));
        }

        let commits = number("commits", fields[4])?;
        let total = number("total", fields[5])?;

        if commits > total {
            return Err(RecordError::CommitsExceedTotal { commits, total });
        }

        let latency = if fields.len() == FULL_FIELDS {
            Some(Latency {
                average: latency_figure("avg latency", fields[6])?,
                p10: latency_figure("10% latency", fields[7])?,
                p95: latency_figure("95% latency", fields[8])?,
                p99: latency_figure("99% latency", fields[9])?,
            })
        } else {
            None
        };

        Ok(Self {
            system: fields[0].to_string(),
            workload: fields[1].to_string(),
            threads: number("threads", fields[2])?,
            cc: fields[3].to_string(),
            commits,
            total,
            latency,
        })
    }
}

/// render records as the content of a `{n}.csv` artifact, one line per record
pub fn to_csv<'a, I: IntoIterator<Item = &'a ResultRecord>>(records: I) -> String {
    records
        .into_iter()
        .map(|record| format!("{record}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(latency: Option<Latency>) -> ResultRecord {
        ResultRecord {
            system: "Falcon(DRAM Index)".to_string(),
            workload: "ycsb_a zipf_theta = 0.99".to_string(),
            threads: 48,
            cc: "MVOCC".to_string(),
            commits: 950,
            total: 1000,
            latency,
        }
    }

    #[test]
    fn full_record_survives_a_line() {
        let original = record(Some(Latency {
            average: 1.2,
            p10: 0.5,
            p95: 3.1,
            p99: 4.0,
        }));
        let line = original.to_string();

        assert_eq!(
            line,
            "Falcon(DRAM Index),ycsb_a zipf_theta = 0.99,48,MVOCC,950,1000,1.2,0.5,3.1,4"
        );
        assert_eq!(line.parse::<ResultRecord>(), Ok(original));
    }

    #[test]
    fn missing_latency_stays_missing() {
        let original = record(None);
        let line = original.to_string();

        assert_eq!(line.split(',').count(), 6);
        assert_eq!(line.parse::<ResultRecord>().unwrap().latency, None);
    }

    #[test]
    fn rejects_partial_latency() {
        assert_eq!(
            "Inp,TPC-C-NP,16,OCC,1,2,0.1,0.2".parse::<ResultRecord>(),
            Err(RecordError::FieldCount(8))
        );
    }

    #[test]
    fn rejects_more_commits_than_total() {
        assert_eq!(
            "Inp,TPC-C-NP,16,OCC,3,2".parse::<ResultRecord>(),
            Err(RecordError::CommitsExceedTotal {
                commits: 3,
                total: 2
            })
        );
    }

    #[test]
    fn rejects_negative_numbers() {
        assert!(matches!(
            "Inp,TPC-C-NP,16,OCC,-1,2".parse::<ResultRecord>(),
            Err(RecordError::InvalidNumber { field: "commits", .. })
        ));
        assert!(matches!(
            "Inp,TPC-C-NP,16,OCC,1,2,-0.5,1,1,1".parse::<ResultRecord>(),
            Err(RecordError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn csv_has_one_line_per_record() {
        let records = [record(None), record(None)];

        assert_eq!(to_csv(&records).lines().count(), 2);
        assert!(to_csv(&records).ends_with('\n'));
        assert_eq!(to_csv(&[]), "");
    }
}
