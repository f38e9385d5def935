//! Reading batch artifacts back into records.
//!
//! Missing data is never an error here: a batch without a directory, an
//! unreadable file or a broken line only shrinks the result, it is reported
//! through the returned [`BatchLoad`] values and the log.

use falcon_ingest::{
    layout::{self, RECORDS_EXTENSION},
    ResultRecord, RunId, RECORD_HEADER,
};
use itertools::Itertools;
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("batch directory {0:?} does not exist")]
    Missing(PathBuf),
    #[error("batch directory {0:?} could not be read")]
    Unreadable(PathBuf, #[source] io::Error),
}

/// everything read from one batch directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchData {
    pub name: String,
    /// run ids whose record file was consumed, ascending
    pub runs: Vec<RunId>,
    pub records: Vec<ResultRecord>,
    /// verbatim content of all consumed record files in run order
    pub raw: String,
    /// lines that did not parse as a record
    pub bad_lines: usize,
}

#[derive(Debug)]
pub enum BatchLoad {
    Loaded(BatchData),
    Skipped { name: String, reason: SkipReason },
}

impl BatchLoad {
    pub fn name(&self) -> &str {
        match self {
            Self::Loaded(data) => &data.name,
            Self::Skipped { name, .. } => name,
        }
    }

    pub fn records(&self) -> &[ResultRecord] {
        match self {
            Self::Loaded(data) => &data.records,
            Self::Skipped { .. } => &[],
        }
    }
}

/// record files of a batch directory ordered by run id, gaps are fine
fn record_files(dir: &Path) -> io::Result<Vec<(RunId, PathBuf)>> {
    Ok(fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(error) => {
                warn!(dir = ?dir, error = %error, "Failed to read directory entry");
                None
            }
        })
        .filter_map(|path| layout::run_id(&path, RECORDS_EXTENSION).map(|run| (run, path)))
        .sorted_by_key(|(run, _)| *run)
        .collect())
}

/// read every `{n}.csv` of batch `name` below `root`
pub fn load_batch(root: &Path, name: &str) -> BatchLoad {
    let dir = layout::batch_dir(root, name);

    let files = match record_files(&dir) {
        Ok(files) => files,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return BatchLoad::Skipped {
                name: name.to_string(),
                reason: SkipReason::Missing(dir),
            }
        }
        Err(error) => {
            return BatchLoad::Skipped {
                name: name.to_string(),
                reason: SkipReason::Unreadable(dir, error),
            }
        }
    };

    let mut data = BatchData {
        name: name.to_string(),
        ..Default::default()
    };

    for (run, path) in files {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = ?path, error = %error, "Skipping unreadable record file");
                continue;
            }
        };

        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match line.parse::<ResultRecord>() {
                Ok(record) => data.records.push(record),
                Err(error) => {
                    warn!(path = ?path, line = line, "Skipping malformed record: {error}");
                    data.bad_lines += 1;
                }
            }
        }

        data.raw.push_str(&content);
        data.runs.push(run);
    }

    debug!(
        batch = name,
        runs = data.runs.len(),
        records = data.records.len(),
        "Loaded batch"
    );

    BatchLoad::Loaded(data)
}

/// All batches consumed by one report phase, each loaded once.
#[derive(Debug)]
pub struct Aggregate {
    batches: Vec<BatchLoad>,
}

impl Aggregate {
    /// load the named batches below `root`, in order and without duplicates
    pub fn load<S: AsRef<str>>(root: &Path, names: &[S]) -> Self {
        let batches = names
            .iter()
            .map(|name| name.as_ref())
            .unique()
            .map(|name| load_batch(root, name))
            .collect_vec();

        for batch in batches.iter() {
            match batch {
                BatchLoad::Loaded(data) => info!(
                    batch = %data.name,
                    runs = data.runs.len(),
                    records = data.records.len(),
                    bad_lines = data.bad_lines,
                    "Collected batch"
                ),
                BatchLoad::Skipped { name, reason } => {
                    warn!(batch = %name, "Skipping batch: {reason}")
                }
            }
        }

        Self { batches }
    }

    pub fn batches(&self) -> &[BatchLoad] {
        &self.batches
    }

    /// records of the named batches, batch by batch in the given order
    pub fn records_of<'a, S: AsRef<str>>(
        &'a self,
        names: &'a [S],
    ) -> impl Iterator<Item = &'a ResultRecord> + 'a {
        names.iter().flat_map(move |name| {
            self.batches
                .iter()
                .filter(move |batch| batch.name() == name.as_ref())
                .take(1)
                .flat_map(BatchLoad::records)
        })
    }

    /// header line, then every loaded batch as its name followed by its record files
    pub fn raw(&self) -> String {
        let mut raw = format!("{RECORD_HEADER}\n");

        for batch in self.batches.iter() {
            if let BatchLoad::Loaded(data) = batch {
                raw.push_str(&data.name);
                raw.push('\n');
                raw.push_str(&data.raw);
            }
        }

        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, batch: &str, file: &str, content: &str) {
        let dir = root.join(batch);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn reads_runs_in_numeric_order_with_gaps() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "tpcc_dram", "10.csv", "Inp,TPC-C-NP payment,48,OCC,10,20\n");
        write(root.path(), "tpcc_dram", "2.csv", "Outp,TPC-C-NP payment,48,OCC,2,4\n");
        write(root.path(), "tpcc_dram", "2.txt", "txn 2 of 4 txns\n");
        write(root.path(), "tpcc_dram", "7.timeout", "tpcc_dram\n7\ncargo test\n");
        write(root.path(), "tpcc_dram", "7.csv", "");

        match load_batch(root.path(), "tpcc_dram") {
            BatchLoad::Loaded(data) => {
                assert_eq!(data.runs, vec![2, 7, 10]);
                assert_eq!(
                    data.records.iter().map(|record| record.commits).collect_vec(),
                    vec![2, 10]
                );
                assert_eq!(
                    data.raw,
                    "Outp,TPC-C-NP payment,48,OCC,2,4\nInp,TPC-C-NP payment,48,OCC,10,20\n"
                );
                assert_eq!(data.bad_lines, 0);
            }
            skipped => panic!("unexpected {skipped:?}"),
        }
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path(),
            "ycsb_dram",
            "1.csv",
            "ZenS,ycsb_a zipf_theta = 0,48,OCC,5,6\nnot,a,record\n\n",
        );

        match load_batch(root.path(), "ycsb_dram") {
            BatchLoad::Loaded(data) => {
                assert_eq!(data.records.len(), 1);
                assert_eq!(data.bad_lines, 1);
            }
            skipped => panic!("unexpected {skipped:?}"),
        }
    }

    #[test]
    fn missing_batch_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "ycsb_dram", "1.csv", "ZenS,ycsb_a zipf_theta = 0,48,OCC,5,6\n");

        let aggregate = Aggregate::load(root.path(), &["ycsb_dram", "tpcc_dram", "ycsb_dram"]);

        assert_eq!(aggregate.batches().len(), 2);
        assert!(matches!(
            &aggregate.batches()[1],
            BatchLoad::Skipped { name, reason: SkipReason::Missing(_) } if name == "tpcc_dram"
        ));
        assert_eq!(aggregate.records_of(&["tpcc_dram", "ycsb_dram"]).count(), 1);
        assert_eq!(
            aggregate.raw(),
            format!("{RECORD_HEADER}\nycsb_dram\nZenS,ycsb_a zipf_theta = 0,48,OCC,5,6\n")
        );
    }
}
