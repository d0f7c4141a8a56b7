//! Batch processing of every scan below a data root.
//!
//! Scans run in parallel on a dedicated rayon pool. A failing or panicking
//! scan is logged and recorded in the [`BatchReport`], the others carry on.

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{error, info};
use rayon::prelude::*;
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::{
    engine::VolumeEngine,
    fallback::SliceLoader,
    processor::{ReconstructionPath, ScanPaths, ScanProcessor},
};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Data root {} is not valid UTF-8", .0.display())]
    NonUtf8Root(PathBuf),

    #[error("Invalid scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Listing scans: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Building worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Progress bar template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),
}

/// Tally of a batch run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Scans written successfully, by either path
    pub processed: usize,
    /// Successful scans that needed the raw stacking path
    pub fell_back: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// All directories named `input_dir_name` below `root`, sorted
pub fn discover_scans(root: &Path, input_dir_name: &str) -> Result<Vec<PathBuf>, BatchError> {
    let root_str = root
        .to_str()
        .ok_or_else(|| BatchError::NonUtf8Root(root.to_path_buf()))?;
    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(root_str),
        glob::Pattern::escape(input_dir_name)
    );

    let mut scans = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_dir() {
            scans.push(path);
        }
    }
    scans.sort();
    Ok(scans)
}

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

fn run_one<E: VolumeEngine, L: SliceLoader>(
    processor: &ScanProcessor<E, L>,
    scan_dir: &Path,
    output_dir_name: &str,
) -> Result<ReconstructionPath, String> {
    let paths = ScanPaths::mirrored(scan_dir, output_dir_name).map_err(|e| e.to_string())?;
    match catch_unwind(AssertUnwindSafe(|| processor.process_scan(&paths))) {
        Ok(Ok(outcome)) => Ok(outcome.path),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Process `scans` on `workers` threads (all cores when `None`)
pub fn run_batch<E: VolumeEngine, L: SliceLoader>(
    processor: &ScanProcessor<E, L>,
    scans: &[PathBuf],
    output_dir_name: &str,
    workers: Option<usize>,
) -> Result<BatchReport, BatchError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .build()?;
    info!(
        "Processing {} scans on {} workers",
        scans.len(),
        pool.current_num_threads()
    );

    let pb = ProgressBar::new(scans.len() as u64);
    pb.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?.progress_chars("#>-"));

    let results: Vec<(PathBuf, Result<ReconstructionPath, String>)> = pool.install(|| {
        scans
            .par_iter()
            .progress_with(pb)
            .map(|scan_dir| {
                let result = run_one(processor, scan_dir, output_dir_name);
                if let Err(e) = &result {
                    error!("{}: {e}", scan_dir.display());
                }
                (scan_dir.clone(), result)
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for (scan_dir, result) in results {
        match result {
            Ok(path) => {
                report.processed += 1;
                if path == ReconstructionPath::Fallback {
                    report.fell_back += 1;
                }
            }
            Err(e) => report.failed.push((scan_dir, e)),
        }
    }
    info!(
        "{} scans written ({} from raw slices), {} failed",
        report.processed,
        report.fell_back,
        report.failed.len()
    );
    Ok(report)
}
