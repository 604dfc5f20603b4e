//! # fp_converter_cli
//!
//! Part of the fp_converter crate family.
//!
//! Command line application that converts a batch of fiber photometry sessions into
//! standardized HDF5 files.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! fp_converter_cli -p config.yml new
//! ```
//!
//! fill it out, then convert every session of the manifest with
//!
//! ```bash
//! fp_converter_cli -p config.yml
//! ```
//!
//! Library messages are written to `./fp_converter.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libfp_converter::config::Config;
use libfp_converter::error::ProcessorError;
use libfp_converter::manifest::SessionManifest;
use libfp_converter::process::{create_subsets, process_subset};
use libfp_converter::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    match config.write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./fp_converter.log"))
            .formatter(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            ))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::RED => "red",
        BarColor::GREEN => "green",
    };
    ProgressStyle::with_template(&format!(
        "[worker {{prefix}}] {{bar:40.{color}/blue}} {{pos:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() {
    // Create a cli
    let matches = Command::new("fp_converter_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file, library messages will be lost: {e}");
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required.");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Manifest Path: {}", config.manifest_path.to_string_lossy());
    log::info!("Data Path: {}", config.data_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    match config.instrument_path.as_ref() {
        Some(path) => log::info!("Instrument Path: {}", path.to_string_lossy()),
        None => log::info!("Instrument Path: bundled default"),
    }
    log::info!(
        "Overwrite: {} Stub Test: {} Workers: {}",
        config.overwrite,
        config.stub_test,
        config.n_threads
    );

    let manifest = match SessionManifest::read(&config.manifest_path) {
        Ok(m) => m,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Found {} sessions in the manifest.", manifest.len());
    if manifest.is_empty() {
        return;
    }

    // Spawn the workers, each with its own bar
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers: Vec<std::thread::JoinHandle<Result<(), ProcessorError>>> = Vec::new();
    let mut bars: Vec<ProgressBar> = Vec::new();
    for (idx, subset) in create_subsets(&config, &manifest.sessions)
        .into_iter()
        .enumerate()
    {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(&BarColor::CYAN));
        bar.set_prefix(format!("{idx}"));
        bars.push(bar);
        let conf = config.clone();
        let worker_tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, worker_tx, idx, subset)
        }));
    }
    drop(tx);

    // Receiving ends once every worker has dropped its sender
    for status in rx.iter() {
        if let Some(bar) = bars.get(status.worker_id) {
            bar.set_style(bar_style(&status.color));
            bar.set_message(status.session_id.clone());
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    for (idx, handle) in workers.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => log::info!("Worker {idx} finished."),
            Ok(Err(e)) => log::error!("Worker {idx} failed with error: {e}"),
            Err(_) => log::error!("Failed to join worker {idx}!"),
        }
        if let Some(bar) = bars.get(idx) {
            bar.finish();
        }
    }

    log::info!("Done. See ./fp_converter.log for details on each session.");
}
