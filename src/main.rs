mod cli;
mod compare;
mod error;
mod ffmpeg;
mod frame;
mod metrics;
mod output;
mod plot;
mod report;

use crate::cli::CliArgs;
use crate::compare::CompareOptions;
use crate::error::Result;
use chrono::Local;
use log::{LevelFilter, debug, error, info};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();

    let args = cli::parse_args();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!("Arguments: {:?}", args);

    let (first, second) = match check_arguments(&args, &mut io::stdout().lock()) {
        Ok(pair) => pair,
        Err(status) => return ExitCode::from(status),
    };

    match run(&args, first, second) {
        Ok(()) => {
            info!("Comparison finished in {:.2?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Comparison failed after {:.2?}: {}", start_time.elapsed(), e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_status())
        }
    }
}

/// Picks the two videos to compare, or prints `invalid arguments` and returns
/// the exit status.
fn check_arguments<'a, W: Write>(
    args: &'a CliArgs,
    out: &mut W,
) -> std::result::Result<(&'a Path, &'a Path), u8> {
    args.video_pair().map_err(|e| {
        error!("{}", e);
        if let Err(write_err) = writeln!(out, "invalid arguments").and_then(|_| out.flush()) {
            error!("Could not write to stdout: {}", write_err);
        }
        e.exit_status()
    })
}

/// Sets up logging to stderr and optionally to a file. Stdout is reserved for
/// the JSON result lines.
fn setup_logging(args: &CliArgs) -> std::result::Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("vidsim", LevelFilter::Debug);

    let console_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };
    let console_config = fern::Dispatch::new()
        .level(console_level)
        .chain(io::stderr());

    let mut logger = base_config.chain(console_config);

    let mut log_path = None;
    if args.log {
        let log_dir = args.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir)?;
        }
        let path = log_dir.join(format!("vidsim_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
        logger = logger.chain(fern::log_file(&path)?);
        log_path = Some(path);
    }

    logger.apply()?;
    if let Some(path) = log_path {
        info!("Logging to file: {}", path.display());
    }
    Ok(())
}

/// Main application logic
fn run(args: &CliArgs, first: &Path, second: &Path) -> Result<()> {
    info!("First video: {}", first.display());
    info!("Second video: {}", second.display());

    let options = CompareOptions {
        tools: args.toolchain(),
        decoder_threads: args.decoder_threads(),
    };
    let stdout = io::stdout();
    let comparison = compare::compare(first, second, &options, &mut stdout.lock())?;

    if comparison.result.avg_sim().is_none() {
        return Ok(());
    }
    if let Some(report_path) = &args.report {
        report::write_report(first, second, &comparison, report_path)?;
    }
    if let Some(plot_path) = &args.plot {
        plot::generate_plot(&comparison.frame_scores, plot_path)?;
    }
    Ok(())
}
