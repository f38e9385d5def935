use falcon_ingest::{
    layout::{self, RECORDS_EXTENSION, TEXT_EXTENSION, TIMEOUT_EXTENSION},
    record, ResultRecord, RunId,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create result directory {0:?}")]
    CreateDir(PathBuf, #[source] std::io::Error),
    #[error("Failed to write artifact {0:?}")]
    Write(PathBuf, #[source] std::io::Error),
}

/// Write-once storage for the artifacts of a single batch.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    name: String,
    dir: PathBuf,
}

impl ArtifactStore {
    /// open the directory of batch `name` below `root`, creating it if needed
    pub fn open(root: &Path, name: &str) -> Result<Self, StorageError> {
        let dir = layout::batch_dir(root, name);

        fs::create_dir_all(&dir).map_err(|error| StorageError::CreateDir(dir.clone(), error))?;

        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, run: RunId, extension: &str, content: &str) -> Result<(), StorageError> {
        let path = layout::artifact_path(&self.dir, run, extension);

        fs::write(&path, content).map_err(|error| StorageError::Write(path.clone(), error))?;
        debug!(path = ?path, bytes = content.len(), "Wrote artifact");

        Ok(())
    }

    /// persist records and captured text of run `run`
    pub fn write(&self, run: RunId, records: &[ResultRecord], text: &str) -> Result<(), StorageError> {
        self.write_file(run, RECORDS_EXTENSION, &record::to_csv(records))?;
        self.write_file(run, TEXT_EXTENSION, text)
    }

    /// persist an empty artifact plus a marker describing the timed out invocation
    pub fn write_timeout(&self, run: RunId, invocation: &str) -> Result<(), StorageError> {
        self.write(run, &[], "")?;
        self.write_file(
            run,
            TIMEOUT_EXTENSION,
            &format!("{}\n{run}\n{invocation}\n", self.name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falcon_ingest::Latency;

    #[test]
    fn writes_records_and_text() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(root.path(), "ycsb_nvm").unwrap();
        let record = ResultRecord {
            system: "Falcon".to_string(),
            workload: "ycsb_a zipf_theta = 0.99".to_string(),
            threads: 48,
            cc: "OCC".to_string(),
            commits: 950,
            total: 1000,
            latency: Some(Latency {
                average: 1.2,
                p10: 0.5,
                p95: 3.1,
                p99: 4.5,
            }),
        };

        store.write(3, &[record.clone()], "raw output\n").unwrap();

        let dir = root.path().join("ycsb_nvm");
        assert_eq!(
            fs::read_to_string(dir.join("3.csv")).unwrap(),
            "Falcon,ycsb_a zipf_theta = 0.99,48,OCC,950,1000,1.2,0.5,3.1,4.5\n"
        );
        assert_eq!(fs::read_to_string(dir.join("3.txt")).unwrap(), "raw output\n");
        assert!(!dir.join("3.timeout").exists());
    }

    #[test]
    fn timeout_leaves_marker() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(root.path(), "tpcc_nvm").unwrap();

        store.write_timeout(12, "cargo test tpcc_test_sync").unwrap();

        let dir = store.dir();
        assert_eq!(fs::read_to_string(dir.join("12.csv")).unwrap(), "");
        assert_eq!(fs::read_to_string(dir.join("12.txt")).unwrap(), "");
        assert_eq!(
            fs::read_to_string(dir.join("12.timeout")).unwrap(),
            "tpcc_nvm\n12\ncargo test tpcc_test_sync\n"
        );
    }
}
