//! Command-line interface for the aligner.

use clap::Parser;
use log::{error, info};
use nalgebra::Matrix4;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{AlignConfig, GlobalMethod};
use crate::pipeline::{align_dataset, prepare_dataset, write_registration_result, AlignmentReport};
use cv_core::Result;
use cv_registration::RegistrationResult;

#[derive(Parser, Debug)]
#[command(name = "cv-align")]
#[command(about = "Align a source point cloud onto a target point cloud", version)]
pub struct Cli {
    /// Source point cloud (.ply, .pcd, .xyz)
    pub source: PathBuf,

    /// Target point cloud
    pub target: PathBuf,

    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Voxel size for downsampling (overrides config)
    #[arg(long)]
    pub voxel_size: Option<f32>,

    /// Uniform scale applied to the source about its centroid
    #[arg(long)]
    pub source_scale: Option<f32>,

    /// Uniform scale applied to the target about its centroid
    #[arg(long)]
    pub target_scale: Option<f32>,

    /// Global registration method
    #[arg(short, long, value_enum)]
    pub method: Option<GlobalMethod>,

    /// RNG seed for reproducible global registration
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (defaults to CV_ALIGN_THREADS or all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Write fitness, RMSE and transforms as YAML
    #[arg(long)]
    pub output_report: Option<PathBuf>,

    /// Write the aligned source (red) merged with the target (blue)
    #[arg(long)]
    pub output_cloud: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// File config (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<AlignConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let cfg = AlignConfig::from_yaml(path)?;
                info!("Loaded config from: {}", path.display());
                cfg
            }
            None => AlignConfig::default(),
        };

        if let Some(v) = self.voxel_size {
            config.voxel_size = v;
        }
        if let Some(s) = self.source_scale {
            config.source_scale = s;
        }
        if let Some(s) = self.target_scale {
            config.target_scale = s;
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_matrix(t: &Matrix4<f32>) {
    for r in 0..4 {
        println!(
            "  [{:>12.6} {:>12.6} {:>12.6} {:>12.6}]",
            t[(r, 0)],
            t[(r, 1)],
            t[(r, 2)],
            t[(r, 3)]
        );
    }
}

fn print_stage(name: &str, result: &RegistrationResult) {
    println!(
        "{:<8} fitness = {:.6}, inlier_rmse = {:.6}, correspondences = {}",
        name,
        result.fitness,
        result.inlier_rmse,
        result.correspondence_set.len()
    );
}

fn print_report(report: &AlignmentReport) {
    print_stage("global", &report.global);
    print_stage("local", &report.local);
    println!("transformation:");
    print_matrix(report.transformation());
}

/// Run the full pipeline for parsed arguments.
pub fn execute(cli: &Cli) -> Result<AlignmentReport> {
    crate::runtime::init_thread_pool(cli.threads)?;
    let config = cli.resolve_config()?;
    info!(
        "Aligning {} onto {} (voxel size {}, method {:?}, {} threads)",
        cli.source.display(),
        cli.target.display(),
        config.voxel_size,
        config.method,
        crate::runtime::current_threads()
    );

    let start = Instant::now();
    let dataset = prepare_dataset(&cli.source, &cli.target, &config)?;
    let report = align_dataset(&dataset, &config)?;
    info!("Alignment finished in {:.2?}", start.elapsed());

    if let Some(path) = &cli.output_report {
        report.to_yaml(path)?;
        info!("Wrote report to {}", path.display());
    }
    if let Some(path) = &cli.output_cloud {
        write_registration_result(path, &dataset.source, &dataset.target, report.transformation())?;
        info!("Wrote merged cloud to {}", path.display());
    }
    Ok(report)
}

pub fn run() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    match execute(&cli) {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!("Alignment failed: {}", e);
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "cv-align",
            "a.ply",
            "b.pcd",
            "--voxel-size",
            "0.1",
            "--method",
            "fgr",
            "--seed",
            "3",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.voxel_size, 0.1);
        assert_eq!(config.method, GlobalMethod::Fgr);
        assert_eq!(config.ransac.seed, Some(3));
        assert_eq!(config.fgr.seed, Some(3));
    }

    #[test]
    fn test_bad_override_rejected() {
        let cli = Cli::parse_from(["cv-align", "a.ply", "b.ply", "--voxel-size=-1"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::parse_from(["cv-align", "a.ply", "b.ply", "-c", "/nonexistent/align.yaml"]);
        assert!(matches!(cli.resolve_config(), Err(cv_core::Error::Io(_))));
    }
}
