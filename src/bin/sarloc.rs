//! sarloc command line tool
//!
//! Usage:
//!   sarloc validate product.json [--degree 8] [--bistatic] [--symmetric-bursts] [--calibrate]
//!                   [--line-tol 0.5 --sample-tol 0.5 --az-tol-us 100 --range-time-tol 1e-9]
//!                   [--forward-tol 1.0]
//!   sarloc mock product.json --mode iw --gcps 5

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sarloc::core::{BistaticCorrection, BurstAnchor, InverseLocator, ResidualTolerance, ResidualValidator};
use sarloc::io::{MockAcquisition, MockMode, ProductReader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sarloc", about = "SAR sensor inverse location and GCP validation")]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate every GCP of a product and report residuals
    Validate {
        /// Product geometry JSON file
        product: PathBuf,

        /// State vectors per Lagrange interpolation window
        #[arg(long)]
        degree: Option<usize>,

        /// Apply a single-pass bistatic azimuth correction
        #[arg(long)]
        bistatic: bool,

        /// Anchor out-of-burst times on the last valid line of the preceding burst
        #[arg(long)]
        symmetric_bursts: bool,

        /// Estimate azimuth/range time offsets from the GCPs before validating
        #[arg(long)]
        calibrate: bool,

        /// Maximum |line| residual (pixels)
        #[arg(long)]
        line_tol: Option<f64>,

        /// Maximum |sample| residual (pixels)
        #[arg(long)]
        sample_tol: Option<f64>,

        /// Maximum |azimuth time| residual (microseconds)
        #[arg(long)]
        az_tol_us: Option<f64>,

        /// Maximum |slant range time| residual (seconds)
        #[arg(long)]
        range_time_tol: Option<f64>,

        /// Also check the forward model on alternate GCPs, with this distance tolerance (meters)
        #[arg(long)]
        forward_tol: Option<f64>,
    },

    /// Write a synthetic product geometry file
    Mock {
        /// Output JSON file
        output: PathBuf,

        /// Product flavour: slc, iw or grd
        #[arg(long, default_value = "slc")]
        mode: MockMode,

        /// GCP grid size per axis
        #[arg(long, default_value_t = 5)]
        gcps: usize,
    },
}

/// Format with 9 significant digits
fn sig9(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let exponent = value.abs().log10().floor() as i32;
    if (-5..9).contains(&exponent) {
        format!("{:.*}", (8 - exponent).max(0) as usize, value)
    } else {
        format!("{:.8e}", value)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Command::Validate {
            product,
            degree,
            bistatic,
            symmetric_bursts,
            calibrate,
            line_tol,
            sample_tol,
            az_tol_us,
            range_time_tol,
            forward_tol,
        } => {
            let product = ProductReader::read_product_file(&product)
                .with_context(|| format!("Failed to load product {}", product.display()))?;

            let mut config = product.locator_config.clone();
            if let Some(degree) = degree {
                config.interpolation_degree = degree;
            }
            if bistatic {
                config.bistatic_correction = BistaticCorrection::SinglePass;
            }
            if symmetric_bursts {
                config.burst_anchor = BurstAnchor::LastValid;
            }

            let gcps = &product.ground_control_points;
            if calibrate {
                let locator = InverseLocator::new(&product.context).with_config(config.clone());
                let offsets = ResidualValidator::new(&locator).estimate_time_offsets(gcps)?;
                println!(
                    "Time offsets from {} GCPs: azimuth {} us, range {} s",
                    offsets.samples_used,
                    sig9(offsets.azimuth_time_us),
                    sig9(offsets.range_time)
                );
                config = offsets.apply_to(&config);
            }

            let locator = InverseLocator::new(&product.context).with_config(config);
            let validator = ResidualValidator::new(&locator);
            let report = validator.validate(gcps);

            for residual in &report.residuals {
                let gcp = &gcps[residual.index];
                println!("GCP #{}", residual.index);
                println!(
                    "  Azimuth time: ref={}, predicted={}, res={} us",
                    gcp.azimuth_time.format("%Y-%m-%dT%H:%M:%S%.6f"),
                    residual.estimate.azimuth_time.format("%Y-%m-%dT%H:%M:%S%.6f"),
                    sig9(residual.azimuth_time_us)
                );
                println!(
                    "  Slant range time: ref={}, predicted={}, res={}",
                    sig9(gcp.slant_range_time),
                    sig9(residual.estimate.slant_range_time),
                    sig9(residual.slant_range_time)
                );
                println!(
                    "  Image point: ref=({}, {}), predicted=({}, {}), res=({}, {})",
                    sig9(residual.reference.line),
                    sig9(residual.reference.sample),
                    sig9(residual.estimate.line),
                    sig9(residual.estimate.sample),
                    sig9(residual.line),
                    sig9(residual.sample)
                );
            }
            for failure in &report.failures {
                println!("GCP #{} failed: {}", failure.index, failure.reason);
            }

            let summary = report.summary();
            println!(
                "{} GCPs located, {} failed; RMS line {}, RMS sample {}, max |az| {} us",
                summary.located,
                summary.failed,
                sig9(summary.line.rms),
                sig9(summary.sample.rms),
                sig9(summary.azimuth_time_us.max_abs)
            );

            let mut success = true;

            if line_tol.is_some() || sample_tol.is_some() || az_tol_us.is_some() || range_time_tol.is_some() {
                let defaults = ResidualTolerance::default();
                let tolerance = ResidualTolerance {
                    line: line_tol.unwrap_or(defaults.line),
                    sample: sample_tol.unwrap_or(defaults.sample),
                    azimuth_time_us: az_tol_us.unwrap_or(defaults.azimuth_time_us),
                    slant_range_time: range_time_tol.unwrap_or(defaults.slant_range_time),
                };
                if report.within(&tolerance) {
                    println!(
                        "All GCPs within {} line, {} sample, {} us azimuth time, {} s range time",
                        tolerance.line, tolerance.sample, tolerance.azimuth_time_us, tolerance.slant_range_time
                    );
                } else {
                    println!("Inverse model residuals exceed tolerance");
                    success = false;
                }
            }

            if let Some(tolerance_m) = forward_tol {
                let forward = validator.validate_forward(gcps, tolerance_m)?;
                for residual in &forward.residuals {
                    println!(
                        "GCP #{} forward: ref=({}, {}, {}), predicted=({}, {}, {}), res={} m",
                        residual.index,
                        sig9(residual.reference.latitude),
                        sig9(residual.reference.longitude),
                        sig9(residual.reference.height),
                        sig9(residual.estimate.latitude),
                        sig9(residual.estimate.longitude),
                        sig9(residual.estimate.height),
                        sig9(residual.distance_m)
                    );
                }
                if !forward.passed() {
                    println!("Forward model residuals exceed {} m", tolerance_m);
                    success = false;
                }
            }

            if !success {
                std::process::exit(1);
            }
        }

        Command::Mock { output, mode, gcps } => {
            let product = MockAcquisition::new(mode).product(gcps)?;
            ProductReader::write_product_file(&product, &output)?;
            println!(
                "Wrote {:?} product with {} GCPs to {}",
                mode,
                product.ground_control_points.len(),
                output.display()
            );
        }
    }

    Ok(())
}
