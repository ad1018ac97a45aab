//! Run command - the startup trigger
//!
//! Scanning is cheap and processing spends OCR quota, so each step can be
//! switched on or off independently.

use crate::commands::{cmd_process, cmd_scan, print_batch_report, print_scan_stats, ScanStats};
use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::queue::BatchReport;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which pipeline steps to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub scan: bool,
    pub process: bool,
}

impl RunOptions {
    /// Explicit flags (or their environment variables) win over the config file
    pub fn resolve(config: &Config, scan: Option<bool>, process: Option<bool>) -> Self {
        Self {
            scan: scan.unwrap_or(config.pipeline.scan_on_start),
            process: process.unwrap_or(config.pipeline.process_on_start),
        }
    }
}

/// Results of the steps that ran
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub scan: Option<ScanStats>,
    pub process: Option<BatchReport>,
}

/// Run the enabled pipeline steps, scan first
pub async fn cmd_run(
    config: &Config,
    db: &MetaDb,
    options: RunOptions,
    show_progress: bool,
) -> Result<RunReport> {
    info!(scan = options.scan, process = options.process, "Starting pipeline");

    let mut report = RunReport::default();

    if options.scan {
        report.scan = Some(cmd_scan(config, db).await?);
    }

    if options.process {
        report.process = Some(cmd_process(config, db, None, show_progress).await?);
    }

    Ok(report)
}

/// Print pipeline results to console
pub fn print_run_report(report: &RunReport) {
    if report.scan.is_none() && report.process.is_none() {
        println!("Scanning and processing are both disabled; nothing to do.");
        return;
    }
    if let Some(scan) = &report.scan {
        print_scan_stats(scan);
    }
    if let Some(batch) = &report.process {
        print_batch_report(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_prefers_flags() {
        let mut config = Config::default();
        config.pipeline.process_on_start = false;

        let defaults = RunOptions::resolve(&config, None, None);
        assert!(defaults.scan);
        assert!(!defaults.process);

        let overridden = RunOptions::resolve(&config, Some(false), Some(true));
        assert!(!overridden.scan);
        assert!(overridden.process);
    }

    #[tokio::test]
    async fn test_scan_only_run() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        let db = MetaDb::connect(&config).await.unwrap();
        std::fs::create_dir_all(config.documents_dir()).unwrap();
        std::fs::write(config.documents_dir().join("notes.pdf"), b"%PDF").unwrap();

        let options = RunOptions {
            scan: true,
            process: false,
        };
        let report = cmd_run(&config, &db, options, false).await.unwrap();
        assert_eq!(report.scan.unwrap().enqueued, 1);
        assert!(report.process.is_none());
    }
}
