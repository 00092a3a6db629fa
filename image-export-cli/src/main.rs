//! Image Export Bridge CLI Application
//!
//! Command-line driver for the image-export-bridge library. It:
//! - Builds generated reference images from a TOML config or quick-mode flags
//! - Exports each one through a bridge and its C callback table
//! - Pulls the data back with the built-in importer or a foreign consumer
//! - Writes raw buffers with JSON sidecars and prints a summary

use anyhow::{Context, Result};
use clap::Parser;
use image_export_bridge::{Extent, Pattern, ScalarType, SourceConfig};
use rayon::prelude::*;
use std::path::PathBuf;

mod config;
mod consumer;
mod report;
mod session;

use config::{AppConfig, OutputConfig, SessionConfig};
use consumer::ForeignConsumer;

/// Image Export Bridge - Export generated images through the C callback table
#[derive(Parser, Debug)]
#[command(name = "image-export-cli")]
#[command(about = "Export images through a C callback table and pull them back", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scalar type for quick mode (e.g. "float", "unsigned short")
    #[arg(long, value_name = "TYPE")]
    scalar_type: Option<ScalarType>,

    /// Whole extent for quick mode: xmin,xmax,ymin,ymax,zmin,zmax
    #[arg(long, value_name = "EXTENT", allow_hyphen_values = true)]
    extent: Option<Extent>,

    /// Components per point for quick mode
    #[arg(long, value_name = "N")]
    components: Option<usize>,

    /// Fill pattern for quick mode: constant:V, ramp[:SCALE], checkerboard[:SQUARE]
    #[arg(long, value_name = "PATTERN", value_parser = config::parse_pattern)]
    pattern: Option<Pattern>,

    /// Number of pull rounds for quick mode
    #[arg(long, value_name = "COUNT", default_value_t = 1)]
    rounds: usize,

    /// Directory for raw buffers and sidecars (overrides the config file)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Image Export CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bridge library v{}", image_export_bridge::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => quick_config(&args)?,
    };
    if args.output_dir.is_some() {
        config.output.output_dir = args.output_dir.clone();
    }

    let consumer = match &config.consumer {
        // SAFETY: the consumer library is named explicitly by the user.
        Some(consumer_config) => Some(unsafe { ForeignConsumer::load(consumer_config) }?),
        None => None,
    };
    if let Some(consumer) = &consumer {
        log::info!("Rounds are driven by '{}' from {:?}", consumer.symbol(), consumer.path());
    }

    // Each session keeps its bridge on the worker thread that runs it
    let reports = config
        .sessions
        .par_iter()
        .map(|session| session::run_session(session, consumer.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    if let Some(dir) = &config.output.output_dir {
        for session_report in &reports {
            let written = report::write_session(dir, session_report, config.output.sidecar)
                .with_context(|| format!("Failed to write output for session '{}'", session_report.name))?;
            log::info!("Session '{}': wrote {} raw files to {:?}", session_report.name, written.len(), dir);
        }
    }

    if !args.quiet {
        report::print_summary(&reports);
    }

    Ok(())
}

/// Quick mode - a single session described by command-line flags
fn quick_config(args: &Args) -> Result<AppConfig> {
    let mut source = SourceConfig::new();
    if let Some(scalar_type) = args.scalar_type {
        source = source.with_scalar_type(scalar_type);
    }
    if let Some(extent) = args.extent {
        source = source.with_whole_extent(extent);
    }
    if let Some(components) = args.components {
        source = source.with_components(components);
    }
    if let Some(pattern) = &args.pattern {
        source = source.with_pattern(pattern.clone());
    }

    let config = AppConfig {
        sessions: vec![SessionConfig {
            name: "quick".to_string(),
            source,
            rounds: args.rounds,
            update_extent: None,
            modify_between_rounds: true,
        }],
        output: OutputConfig {
            output_dir: None,
            sidecar: true,
        },
        consumer: None,
    };
    config.validate().context("Invalid quick-mode arguments")?;
    Ok(config)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
