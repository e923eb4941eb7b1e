// main.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Error, Result};
use clap::Parser;
use log::info;
use std::time::Instant;

use sim_qc::{output, qc, sim::Sim};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting sim_qc with args: {:?}", cli_args);

    if cli_args.magnitude_out.is_none() && cli_args.xydiff_out.is_none() {
        return Err(anyhow!(
            "Nothing to do: request at least one metric with --magnitude and/or --xydiff."
        ));
    }

    // --- 1. Open the SIM file and report its header ---
    let mut sim = Sim::open(&cli_args.infile)
        .map_err(|e| anyhow!("Failed to open SIM file {}: {}", cli_args.infile.display(), e))?;
    info!(
        "Opened SIM file {}: {} samples, {} probes, {} channels, {:?} intensities.",
        cli_args.infile.display(),
        sim.num_samples,
        sim.num_probes,
        sim.num_channels,
        sim.number_format
    );

    // --- 2. Run the requested metrics sequentially on the one handle ---
    if let Some(magnitude_out) = &cli_args.magnitude_out {
        let metrics = qc::sample_magnitudes(&mut sim)?;
        output::write_metrics(magnitude_out, &metrics)?;
        info!("Finished magnitude for {} samples.", metrics.len());
    }

    if let Some(xydiff_out) = &cli_args.xydiff_out {
        let metrics = qc::sample_xydiffs(&mut sim)?;
        output::write_metrics(xydiff_out, &metrics)?;
        info!("Finished xydiff for {} samples.", metrics.len());
    }

    info!(
        "sim_qc finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use clap::Parser; // For the derive macro to find Parser
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "QC metrics (magnitude, xydiff) from binary SIM intensity files.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        #[arg(short = 'i', long = "infile", required = true)]
        pub(crate) infile: PathBuf,

        /// Compute probe-normalized sample magnitudes and write them here.
        #[arg(long = "magnitude")]
        pub(crate) magnitude_out: Option<PathBuf>,

        /// Compute XY intensity differences and write them here.
        #[arg(long = "xydiff")]
        pub(crate) xydiff_out: Option<PathBuf>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }
}
