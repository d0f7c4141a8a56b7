use anyhow::{Context, bail};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use dicom_reslice::{
    batch::{discover_scans, run_batch},
    config::ProcessingConfig,
    enums::SpacingPolicy,
    processor::ScanProcessor,
};

#[derive(Parser)]
#[command(author, version, about = "Tilt-corrected, cropped CT volumes from DICOM series")]
struct Args {
    /// Directory searched recursively for scan directories
    data_root: PathBuf,
    /// Load processing settings from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scans processed in parallel
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    out_width: Option<usize>,
    #[arg(long)]
    out_height: Option<usize>,
    /// `auto`, `none` or `x,y,z` in millimetres
    #[arg(long)]
    spacing: Option<SpacingPolicy>,
    /// Write a PNG of the centre slice of every scan
    #[arg(long, default_value_t = false)]
    preview: bool,
    #[arg(long, default_value = "dicom")]
    input_dir_name: String,
    #[arg(long, default_value = "3d")]
    output_dir_name: String,
}

impl Args {
    fn processing_config(&self) -> anyhow::Result<ProcessingConfig> {
        let mut config = match &self.config {
            Some(path) => ProcessingConfig::load(path)?,
            None => ProcessingConfig::default(),
        };
        if let Some(width) = self.out_width {
            config.out_size.0 = width;
        }
        if let Some(height) = self.out_height {
            config.out_size.1 = height;
        }
        if let Some(spacing) = self.spacing {
            config.spacing = spacing;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        config.preview |= self.preview;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.processing_config()?;

    let scans = discover_scans(&args.data_root, &args.input_dir_name)
        .with_context(|| format!("searching {}", args.data_root.display()))?;
    info!(
        "Found {} `{}` directories below {}",
        scans.len(),
        args.input_dir_name,
        args.data_root.display()
    );

    let workers = config.workers;
    let processor = ScanProcessor::native(config);
    let report = run_batch(&processor, &scans, &args.output_dir_name, workers)?;

    for (scan, reason) in &report.failed {
        eprintln!("failed: {} ({reason})", scan.display());
    }
    if !report.is_success() {
        bail!("{} of {} scans failed", report.failed.len(), scans.len());
    }
    Ok(())
}
