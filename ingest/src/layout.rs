//! On-disk layout of run artifacts, shared by the run and the report phase.
//!
//! ```text
//! <root>/<batch>/<n>.csv      records of run n
//! <root>/<batch>/<n>.txt      captured output of run n
//! <root>/<batch>/<n>.timeout  marker for a run that hit its timeout
//! ```

use crate::RunId;
use std::path::{Path, PathBuf};

pub const RECORDS_EXTENSION: &str = "csv";
pub const TEXT_EXTENSION: &str = "txt";
pub const TIMEOUT_EXTENSION: &str = "timeout";

pub fn batch_dir(root: &Path, batch: &str) -> PathBuf {
    root.join(batch)
}

pub fn artifact_path(dir: &Path, run: RunId, extension: &str) -> PathBuf {
    dir.join(format!("{run}.{extension}"))
}

/// run id of an artifact file with the given extension, `None` for anything else
pub fn run_id(path: &Path, extension: &str) -> Option<RunId> {
    if path.extension()? != extension {
        return None;
    }

    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_from_file_names() {
        let dir = batch_dir(Path::new("result"), "ycsb_nvm");

        assert_eq!(
            artifact_path(&dir, 7, RECORDS_EXTENSION),
            PathBuf::from("result/ycsb_nvm/7.csv")
        );
        assert_eq!(run_id(Path::new("result/ycsb_nvm/7.csv"), RECORDS_EXTENSION), Some(7));
        assert_eq!(run_id(Path::new("result/ycsb_nvm/7.txt"), RECORDS_EXTENSION), None);
        assert_eq!(run_id(Path::new("result/ycsb_nvm/x7.csv"), RECORDS_EXTENSION), None);
        assert_eq!(run_id(Path::new("result/ycsb_nvm/.csv"), RECORDS_EXTENSION), None);
    }
}
