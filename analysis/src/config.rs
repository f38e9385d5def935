use crate::report::ReportConfig;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Error, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file")]
    ReadConfig(#[source] Error),
    #[error("Failed to parse config file")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks")]
    Preflight,
}

fn default_results() -> PathBuf {
    PathBuf::from("result")
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// directory holding one subdirectory per batch
    #[serde(default = "default_results")]
    pub results: PathBuf,
    /// tables in output order
    pub reports: Vec<ReportConfig>,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(ConfigErrors::ReadConfig)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    /// every batch referenced by any report, first mention first
    pub fn batches(&self) -> Vec<&str> {
        self.reports
            .iter()
            .flat_map(|report| report.batches.iter().map(String::as_str))
            .unique()
            .collect()
    }

    /// Check the whole config, logging every problem found.
    ///
    /// Returns true if the config contains errors.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.reports.is_empty() {
            warn!("No reports configured, only the raw data file will be written");
        }

        for (index, report) in self.reports.iter().enumerate() {
            if report.title.trim().is_empty() {
                error!("reports[{index}].title cannot be empty");
                contains_error = true;
            }

            if report.batches.is_empty() {
                error!("reports[{index}] ({}) does not name any batch", report.title);
                contains_error = true;
            }

            let rows = report.rows();
            if let Some(duplicate) = rows.iter().duplicates().next() {
                error!("reports[{index}] ({}) lists row {duplicate} twice", report.title);
                contains_error = true;
            }

            let columns = report.columns();
            if let Some(duplicate) = columns.iter().duplicates().next() {
                error!("reports[{index}] ({}) lists column {duplicate} twice", report.title);
                contains_error = true;
            }

            if report.header.is_some() && report.header().is_empty() {
                warn!("reports[{index}] ({}) has an empty header line", report.title);
            }
        }

        contains_error
    }
}
