//! showertile command-line interface.
//!
//! `partial` converts one CORSIKA particle file into a partial tile file,
//! `merge` sums partial files of one shower, `info` summarizes a particle file.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use showertile_algorithms::TabulatedEnergyLoss;
use showertile_core::{EventHeader, ParticleCuts, ParticleRecord, ShowerTileConfig, TileGeometry};
use showertile_io::{merge_partial_files, read_list_file, CorsikaFileReader, PartialRun};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    ShowertileIo(#[from] showertile_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] showertile_core::Error),

    #[error("no partial files given; pass them as arguments or with --list")]
    NoInputs,
}

/// Converts CORSIKA air-shower particle output into detector tile files.
#[derive(Parser)]
#[command(name = "showertile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one particle file into a partial tile file
    Partial {
        /// CORSIKA particle file
        particle_file: PathBuf,

        /// Energy-loss table (JSON)
        eloss_table: PathBuf,

        /// Partial tile file to write
        output: PathBuf,

        /// Also dump the observed minimum arrival times here
        #[arg(long)]
        times: Option<PathBuf>,

        /// Run configuration (JSON); defaults apply otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed of the detector-response random stream
        #[arg(long)]
        seed: Option<u64>,

        /// Time bins per accumulation batch (default: sized from memory)
        #[arg(long)]
        bins_per_batch: Option<usize>,

        /// Fraction of available memory a batch may use
        #[arg(long)]
        memory_fraction: Option<f64>,
    },

    /// Sum partial tile files of one shower into a tile file
    Merge {
        /// Tile file to write
        output: PathBuf,

        /// Partial tile files
        inputs: Vec<PathBuf>,

        /// File listing partial tile files, one per line
        #[arg(short, long)]
        list: Option<PathBuf>,

        /// Run configuration (JSON); must match the partial runs
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the event header and particle counts of a particle file
    Info {
        /// CORSIKA particle file
        input: PathBuf,

        /// Run configuration (JSON), for the grid and observation level
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ShowerTileConfig> {
    let config = match path {
        Some(path) => ShowerTileConfig::from_file(path)?,
        None => ShowerTileConfig::default(),
    };
    Ok(config)
}

fn print_header(header: &EventHeader) {
    println!("Primary: {}", header.primary_id());
    println!("Energy: {:.4e} GeV", header.primary_energy_gev());
    println!(
        "First interaction: {:.1} m",
        header.first_interaction_height_cm() / 100.0
    );
    println!(
        "Zenith: {:.2} deg, azimuth: {:.2} deg",
        header.zenith_rad().to_degrees(),
        header.azimuth_rad().to_degrees()
    );
    println!("Core reference time: {:.3} ns", header.reference_time_ns());
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Partial {
            particle_file,
            eloss_table,
            output,
            times,
            config,
            seed,
            bins_per_batch,
            memory_fraction,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            if let Some(bins) = bins_per_batch {
                config = config.with_bins_per_batch(bins);
            }
            if let Some(fraction) = memory_fraction {
                config.batching.memory_fraction = fraction;
            }

            let start = Instant::now();
            let sampler = TabulatedEnergyLoss::from_file(&eloss_table)?;
            let mut run = PartialRun::new(config)?;
            if let Some(times) = times {
                run = run.with_times_dump(times);
            }
            let summary = run.run(sampler, &particle_file, &output)?;

            println!(
                "Processed {} in {:.2}s",
                particle_file.display(),
                start.elapsed().as_secs_f64()
            );
            println!("Particles: {}", summary.stream.particles);
            println!(
                "Accepted: {} ({} outliers)",
                summary.arrival.accepted, summary.arrival.outliers
            );
            println!(
                "Batches: {} of {} bins",
                summary.batches_run, summary.bins_per_batch
            );
            println!(
                "Core disk radius: {:.1} m, {} core particles skipped",
                summary.disk_radius_m, summary.batches.core_skipped
            );
            println!("Beyond time window: {}", summary.batches.beyond_window);
            println!("Records: {} -> {}", summary.records, output.display());
        }

        Commands::Merge {
            output,
            mut inputs,
            list,
            config,
        } => {
            if let Some(list) = list {
                inputs.extend(read_list_file(list)?);
            }
            if inputs.is_empty() {
                return Err(CliError::NoInputs);
            }
            let config = load_config(config.as_ref())?;

            let start = Instant::now();
            let summary = merge_partial_files(&config, &inputs, &output)?;
            println!(
                "Merged {} files in {:.2}s",
                summary.files,
                start.elapsed().as_secs_f64()
            );
            println!(
                "Records: {} read, {} written -> {}",
                summary.input_records,
                summary.records,
                output.display()
            );
        }

        Commands::Info { input, config } => {
            let config = load_config(config.as_ref())?;
            let geometry = TileGeometry::from_config(&config.grid)?;
            let cuts = ParticleCuts::new(&geometry, &config.cuts);
            let reader = CorsikaFileReader::open(&input, config.observation_level_cm)?;

            let mut accepted = 0usize;
            let mut time_range = (f64::INFINITY, f64::NEG_INFINITY);
            let mut count = |p: &ParticleRecord, _: &EventHeader| -> showertile_core::Result<()> {
                if cuts.accepts(p) {
                    accepted += 1;
                    time_range.0 = time_range.0.min(p.time_ns());
                    time_range.1 = time_range.1.max(p.time_ns());
                }
                Ok(())
            };
            let summary = reader.for_each_particle(&mut count)?;

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                reader.len(),
                reader.len() as f64 / 1_000_000.0
            );
            print_header(&summary.header);
            let stats = &summary.stats;
            println!("Blocks: {}", stats.blocks);
            println!(
                "Sub-blocks: RUNH {}, EVTH {}, LONG {}, EVTE {}, RUNE {}, particle {}",
                stats.run_headers,
                stats.event_headers,
                stats.longitudinal,
                stats.event_ends,
                stats.run_ends,
                stats.particle_subblocks
            );
            println!("Particles: {}", summary.stats.particles);
            println!("Inside footprint and cuts: {}", accepted);
            if accepted > 0 {
                println!("Time range: {:.1} - {:.1} ns", time_range.0, time_range.1);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
